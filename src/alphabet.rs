//! Alphabets translate between label ids and symbols. The algorithms only ever see label ids,
//! symbols are needed for textual output and for translating labels between automata that use
//! different alphabets.
//!
//! Alphabets can be supplied by external components (e.g. a lexicon). Such a component only has to
//! implement [`Alphabet`]; nothing else about it is ever inspected.
use std::cell::Cell;
use std::fmt::Debug;
use std::rc::Rc;

use crate::math::{Bijection, Map};
use crate::types::*;

/// Symbol used for [`EPSILON`] in textual formats.
pub const EPSILON_SYMBOL: &str = "*EPS*";
/// Symbol used for [`ANY`].
pub const ANY_SYMBOL: &str = "*ANY*";
/// Symbol used for [`FAILURE`].
pub const FAILURE_SYMBOL: &str = "*FAILURE*";
/// Symbol used for [`ELSE`].
pub const ELSE_SYMBOL: &str = "*ELSE*";

/// Returns the symbol of a reserved label.
pub fn special_symbol(label: LabelId) -> Option<&'static str> {
    match label {
        EPSILON => Some(EPSILON_SYMBOL),
        ANY => Some(ANY_SYMBOL),
        FAILURE => Some(FAILURE_SYMBOL),
        ELSE => Some(ELSE_SYMBOL),
        _ => None,
    }
}

/// Inverse of [`special_symbol`].
pub fn special_index(symbol: &str) -> Option<LabelId> {
    match symbol {
        EPSILON_SYMBOL => Some(EPSILON),
        ANY_SYMBOL => Some(ANY),
        FAILURE_SYMBOL => Some(FAILURE),
        ELSE_SYMBOL => Some(ELSE),
        _ => None,
    }
}

/// Symbol of the `n`-th disambiguator.
pub fn disambiguator_symbol(n: u32) -> String {
    format!("#{n}")
}

fn parse_disambiguator(symbol: &str) -> Option<u32> {
    symbol.strip_prefix('#')?.parse().ok()
}

/// Bidirectional mapping between label ids and symbols. Label ids in `0..end()` are regular
/// symbols, ids from `end()` on are disambiguators which are allocated on demand.
pub trait Alphabet: Debug {
    /// Returns the label of `symbol`, [`INVALID_LABEL_ID`] if it is unknown.
    fn index(&self, symbol: &str) -> LabelId;
    /// Returns the symbol of `label`, `None` if it is unknown.
    fn symbol(&self, label: LabelId) -> Option<String>;
    /// One past the largest regular label.
    fn end(&self) -> LabelId;
    /// Number of disambiguators handed out so far.
    fn n_disambiguators(&self) -> u32;
    /// Returns the label of the `n`-th disambiguator, allocating it if necessary.
    fn disambiguator(&self, n: u32) -> LabelId;

    /// Whether `label` is a disambiguator of this alphabet.
    fn is_disambiguator(&self, label: LabelId) -> bool {
        label >= self.end() && label <= LAST_LABEL_ID
    }

    /// All regular labels that have a symbol.
    fn labels(&self) -> Vec<LabelId> {
        (FIRST_LABEL_ID..self.end())
            .filter(|l| self.symbol(*l).is_some())
            .collect()
    }

    /// The symbol of `label` or a placeholder that makes the label recognizable in debug output.
    fn symbol_or_id(&self, label: LabelId) -> String {
        self.symbol(label).unwrap_or_else(|| format!("<{label}>"))
    }
}

/// Shared reference to an alphabet.
pub type ConstAlphabetRef = Rc<dyn Alphabet>;

/// An alphabet that stores its symbols in memory.
#[derive(Debug, Default, Clone)]
pub struct StaticAlphabet {
    symbols: Bijection<LabelId, String>,
    end: LabelId,
    n_disambiguators: Cell<u32>,
}

impl StaticAlphabet {
    /// Creates an empty alphabet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an alphabet that numbers the given symbols consecutively, starting at zero.
    /// Repeated symbols keep their first label.
    pub fn from_symbols<'a, I: IntoIterator<Item = &'a str>>(symbols: I) -> Self {
        let mut alphabet = Self::new();
        for symbol in symbols {
            alphabet.add_symbol(symbol);
        }
        alphabet
    }

    /// Returns the label of `symbol`, adding it with the next free label if it is unknown.
    pub fn add_symbol(&mut self, symbol: &str) -> LabelId {
        if let Some(label) = special_index(symbol) {
            return label;
        }
        if let Some(label) = self.symbols.get_by_right(symbol) {
            return *label;
        }
        let label = self.end;
        self.symbols.insert(label, symbol.to_string());
        self.end += 1;
        label
    }

    /// Adds `symbol` under the given label. Labels do not need to be dense.
    pub fn add_indexed_symbol(&mut self, symbol: &str, label: LabelId) {
        assert!(
            (FIRST_LABEL_ID..=LAST_LABEL_ID).contains(&label),
            "label {label} is reserved"
        );
        self.symbols.insert(label, symbol.to_string());
        self.end = self.end.max(label + 1);
    }

    /// Number of regular symbols.
    pub fn size(&self) -> usize {
        self.symbols.len()
    }

    /// Copies all regular symbols of another alphabet.
    pub fn copy_of(other: &dyn Alphabet) -> Self {
        let mut alphabet = Self::new();
        for label in other.labels() {
            if let Some(symbol) = other.symbol(label) {
                alphabet.add_indexed_symbol(&symbol, label);
            }
        }
        alphabet.n_disambiguators.set(other.n_disambiguators());
        alphabet
    }
}

impl Alphabet for StaticAlphabet {
    fn index(&self, symbol: &str) -> LabelId {
        if let Some(label) = special_index(symbol) {
            return label;
        }
        if let Some(label) = self.symbols.get_by_right(symbol) {
            return *label;
        }
        match parse_disambiguator(symbol) {
            Some(n) => self.disambiguator(n),
            None => INVALID_LABEL_ID,
        }
    }

    fn symbol(&self, label: LabelId) -> Option<String> {
        if let Some(symbol) = special_symbol(label) {
            return Some(symbol.to_string());
        }
        if let Some(symbol) = self.symbols.get_by_left(&label) {
            return Some(symbol.clone());
        }
        if self.is_disambiguator(label) {
            return Some(disambiguator_symbol((label - self.end) as u32));
        }
        None
    }

    fn end(&self) -> LabelId {
        self.end
    }

    fn n_disambiguators(&self) -> u32 {
        self.n_disambiguators.get()
    }

    fn disambiguator(&self, n: u32) -> LabelId {
        if n >= self.n_disambiguators.get() {
            self.n_disambiguators.set(n + 1);
        }
        self.end + n as LabelId
    }
}

/// Returns true if both references denote the same alphabet, either because they point to the
/// same object or because they contain the same symbols under the same labels.
pub fn equal_alphabets(a: &ConstAlphabetRef, b: &ConstAlphabetRef) -> bool {
    if Rc::ptr_eq(a, b) {
        return true;
    }
    a.end() == b.end()
        && (FIRST_LABEL_ID..a.end()).all(|label| a.symbol(label) == b.symbol(label))
}

/// How much an [`AlphabetMapping`] changes the labels it is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingType {
    /// Source and target alphabet are the same.
    Identity,
    /// Every label keeps its id, only the alphabet reference changes.
    Unmapped,
    /// Every label has an image.
    Complete,
    /// Some labels have no image, arcs carrying them are dropped.
    Partial,
}

/// Translation of label ids from one alphabet to another via their symbols.
#[derive(Debug, Clone)]
pub struct AlphabetMapping {
    from: ConstAlphabetRef,
    to: ConstAlphabetRef,
    kind: MappingType,
    labels: Map<LabelId, LabelId>,
}

impl AlphabetMapping {
    /// Builds the mapping from `from` to `to`. Symbols unknown to `to` are mapped to `unknown`,
    /// which may be [`INVALID_LABEL_ID`] to drop them; at most `report_unknowns` of them are
    /// reported.
    pub fn new(
        from: ConstAlphabetRef,
        to: ConstAlphabetRef,
        unknown: LabelId,
        report_unknowns: u32,
    ) -> Self {
        if Rc::ptr_eq(&from, &to) {
            return Self {
                from,
                to,
                kind: MappingType::Identity,
                labels: Map::default(),
            };
        }
        let mut labels = Map::default();
        let mut n_unknowns = 0u32;
        let mut unmapped = true;
        let disambiguators = (0..from.n_disambiguators()).map(|n| from.disambiguator(n));
        for label in from.labels().into_iter().chain(disambiguators) {
            let Some(symbol) = from.symbol(label) else {
                continue;
            };
            let mut target = to.index(&symbol);
            if target == INVALID_LABEL_ID {
                if n_unknowns < report_unknowns {
                    tracing::warn!("unknown symbol \"{symbol}\" mapped to {unknown}");
                }
                n_unknowns += 1;
                target = unknown;
            }
            unmapped &= target == label;
            labels.insert(label, target);
        }
        if n_unknowns > report_unknowns {
            tracing::warn!("{} unknown symbols in total", n_unknowns);
        }
        let kind = if unmapped {
            MappingType::Unmapped
        } else if labels.values().all(|l| *l != INVALID_LABEL_ID) {
            MappingType::Complete
        } else {
            MappingType::Partial
        };
        Self {
            from,
            to,
            kind,
            labels,
        }
    }

    /// The kind of the mapping.
    pub fn kind(&self) -> MappingType {
        self.kind
    }

    /// Source alphabet.
    pub fn from(&self) -> &ConstAlphabetRef {
        &self.from
    }

    /// Target alphabet.
    pub fn to(&self) -> &ConstAlphabetRef {
        &self.to
    }

    /// Whether applying the mapping changes labels.
    pub fn is_modifying(&self) -> bool {
        matches!(self.kind, MappingType::Complete | MappingType::Partial)
    }

    /// The image of `label`. Reserved labels map to themselves, labels without image map to
    /// [`INVALID_LABEL_ID`].
    pub fn map(&self, label: LabelId) -> LabelId {
        if label == EPSILON || is_special_label(label) || self.kind == MappingType::Identity {
            return label;
        }
        self.labels.get(&label).copied().unwrap_or(INVALID_LABEL_ID)
    }
}
