//! Rational operations: union, concatenation, fusion, closure and complement.
//!
//! [`unite`], [`concat`] and [`fuse`] combine several automata into one [`CombinedAutomaton`]
//! whose state ids interleave those of the operands: state `n * s + k + 1` is state `s` of
//! operand `k` out of `n`, state 0 is a new initial state. The alphabets of the operands are
//! united and the labels of every operand are mapped onto the united alphabet.
use std::fmt;
use std::rc::{Rc, Weak};

use crate::alphabet::{Alphabet, AlphabetMapping, ConstAlphabetRef, StaticAlphabet};
use crate::automaton::{
    Automaton, ConstAutomatonRef, ConstMappingRef, ConstStateRef, Mapping, Properties, State,
};
use crate::semiring::{same_semiring, ConstSemiringRef, Weight};
use crate::types::*;
use crate::views::ModifyAutomaton;

/// Unites the given alphabets. The first alphabet is returned as it is if it contains every
/// symbol of the others, otherwise a copy is extended by the missing symbols.
fn unite_alphabets(alphabets: &[Option<ConstAlphabetRef>]) -> Option<ConstAlphabetRef> {
    let mut present = alphabets.iter().flatten();
    let first = present.next()?.clone();
    let mut merged: Option<StaticAlphabet> = None;
    for alphabet in present {
        for label in alphabet.labels() {
            let Some(symbol) = alphabet.symbol(label) else {
                continue;
            };
            let known = match &merged {
                Some(merged) => merged.index(&symbol),
                None => first.index(&symbol),
            };
            if known == INVALID_LABEL_ID {
                merged
                    .get_or_insert_with(|| StaticAlphabet::copy_of(first.as_ref()))
                    .add_symbol(&symbol);
            }
        }
    }
    match merged {
        Some(merged) => Some(Rc::new(merged)),
        None => Some(first),
    }
}

fn mappings(
    alphabets: Vec<Option<ConstAlphabetRef>>,
    united: &Option<ConstAlphabetRef>,
) -> Vec<Option<AlphabetMapping>> {
    alphabets
        .into_iter()
        .map(|alphabet| match (alphabet, united) {
            (Some(from), Some(to)) => {
                Some(AlphabetMapping::new(from, to.clone(), INVALID_LABEL_ID, 0))
            }
            _ => None,
        })
        .collect()
}

fn map_label(mapping: &Option<AlphabetMapping>, label: LabelId) -> LabelId {
    match mapping {
        Some(mapping) => mapping.map(label),
        None => label,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Combination {
    Concat,
    Unite(Vec<Weight>),
    Fuse,
}

impl Combination {
    fn name(&self) -> &'static str {
        match self {
            Combination::Concat => "concat",
            Combination::Unite(_) => "unite",
            Combination::Fuse => "fuse",
        }
    }
}

/// Several automata combined by [`unite`], [`concat`] or [`fuse`].
pub struct CombinedAutomaton {
    fsas: Vec<ConstAutomatonRef>,
    combination: Combination,
    kind: Type,
    semiring: ConstSemiringRef,
    properties: Properties,
    input_alphabet: Option<ConstAlphabetRef>,
    output_alphabet: Option<ConstAlphabetRef>,
    input_mappings: Vec<Option<AlphabetMapping>>,
    output_mappings: Vec<Option<AlphabetMapping>>,
}

impl CombinedAutomaton {
    fn new(fsas: Vec<ConstAutomatonRef>, combination: Combination) -> Self {
        let kind = if fsas.iter().any(|f| f.kind() == Type::Transducer) {
            Type::Transducer
        } else {
            Type::Acceptor
        };
        let semiring = fsas[0].semiring();
        if fsas.iter().any(|f| !same_semiring(f.semiring(), semiring)) {
            tracing::warn!(
                "mixed semirings in {}, using {}",
                combination.name(),
                semiring.name()
            );
        }
        let inputs: Vec<_> = fsas.iter().map(|f| f.input_alphabet()).collect();
        let outputs: Vec<_> = fsas.iter().map(|f| f.output_alphabet()).collect();
        let input_alphabet = unite_alphabets(&inputs);
        let output_alphabet = unite_alphabets(&outputs);
        Self {
            input_mappings: mappings(inputs, &input_alphabet),
            output_mappings: mappings(outputs, &output_alphabet),
            input_alphabet,
            output_alphabet,
            kind,
            semiring,
            properties: Properties::with(PROPERTY_STORAGE | PROPERTY_CACHED, PROPERTY_NONE),
            combination,
            fsas,
        }
    }

    /// Id of state `s` of operand `k`.
    fn combined_state_id(&self, k: usize, s: StateId) -> StateId {
        if s == INVALID_STATE_ID {
            return INVALID_STATE_ID;
        }
        (self.fsas.len() as StateId)
            .checked_mul(s)
            .and_then(|id| id.checked_add(k as StateId + 1))
            .filter(|id| *id <= MAX_STATE_ID)
            .unwrap_or(INVALID_STATE_ID)
    }

    /// Index of the operand state `s` belongs to, `None` for the initial state.
    pub fn operand(&self, s: StateId) -> Option<usize> {
        (s != 0).then(|| ((s - 1) % self.fsas.len() as StateId) as usize)
    }

    /// Id of `s` within its operand, [`INVALID_STATE_ID`] for the initial state.
    pub fn operand_state_id(&self, s: StateId) -> StateId {
        match s {
            0 => INVALID_STATE_ID,
            s => (s - 1) / self.fsas.len() as StateId,
        }
    }

    /// Copies the arcs of `sp`, a state of operand `k`, onto `state` with targets and labels
    /// translated.
    fn copy_arcs(&self, k: usize, sp: &State, state: &mut State) {
        let initial = self.fsas[k].initial_state_id();
        for a in sp.iter() {
            let target = match self.combination {
                Combination::Fuse if a.target == initial => 0,
                _ => self.combined_state_id(k, a.target),
            };
            let input = map_label(&self.input_mappings[k], a.input);
            let output = map_label(&self.output_mappings[k], a.output);
            if target == INVALID_STATE_ID || input == INVALID_LABEL_ID || output == INVALID_LABEL_ID
            {
                continue;
            }
            state.new_arc(target, a.weight, input, output);
        }
    }

    fn initial_state(&self) -> State {
        let one = self.semiring.one();
        let mut state = State::new(0);
        match &self.combination {
            Combination::Concat => {
                let target = self.combined_state_id(0, self.fsas[0].initial_state_id());
                if target != INVALID_STATE_ID {
                    state.new_arc(target, one, EPSILON, EPSILON);
                }
            }
            Combination::Unite(weights) => {
                for (k, f) in self.fsas.iter().enumerate() {
                    let target = self.combined_state_id(k, f.initial_state_id());
                    if target != INVALID_STATE_ID {
                        state.new_arc(target, weights[k], EPSILON, EPSILON);
                    }
                }
            }
            Combination::Fuse => {
                for (k, f) in self.fsas.iter().enumerate() {
                    let Some(sp) = f.get_state(f.initial_state_id()) else {
                        continue;
                    };
                    self.copy_arcs(k, &sp, &mut state);
                    if sp.is_final() {
                        let weight = if state.is_final() {
                            self.semiring.collect(state.weight, sp.weight)
                        } else {
                            sp.weight
                        };
                        state.set_final(weight);
                    }
                }
            }
        }
        state
    }
}

impl Automaton for CombinedAutomaton {
    fn kind(&self) -> Type {
        self.kind
    }

    fn properties(&self) -> &Properties {
        &self.properties
    }

    fn semiring(&self) -> ConstSemiringRef {
        self.semiring
    }

    fn initial_state_id(&self) -> StateId {
        0
    }

    fn input_alphabet(&self) -> Option<ConstAlphabetRef> {
        self.input_alphabet.clone()
    }

    fn output_alphabet(&self) -> Option<ConstAlphabetRef> {
        match self.kind {
            Type::Acceptor => self.input_alphabet.clone(),
            _ => self.output_alphabet.clone(),
        }
    }

    fn get_state(&self, s: StateId) -> Option<ConstStateRef> {
        let Some(k) = self.operand(s) else {
            return Some(Rc::new(self.initial_state()));
        };
        let sp = self.fsas[k].get_state(self.operand_state_id(s))?;
        let mut state = State::with_tags(s, sp.tags(), sp.weight);
        self.copy_arcs(k, &sp, &mut state);
        if self.combination == Combination::Concat && k + 1 < self.fsas.len() && sp.is_final() {
            let next = self.combined_state_id(k + 1, self.fsas[k + 1].initial_state_id());
            if next != INVALID_STATE_ID {
                state.new_arc(next, sp.weight, EPSILON, EPSILON);
            }
            state.unset_final();
        }
        Some(Rc::new(state))
    }

    fn dump_state(&self, s: StateId, out: &mut dyn fmt::Write) -> fmt::Result {
        match self.operand(s) {
            Some(k) => {
                write!(out, "{k},")?;
                self.fsas[k].dump_state(self.operand_state_id(s), out)
            }
            None => write!(out, "initial"),
        }
    }

    fn describe(&self) -> String {
        let operands: Vec<String> = self.fsas.iter().map(|f| f.describe()).collect();
        format!("{}({})", self.combination.name(), operands.join(","))
    }
}

/// The union of `fsas`: the initial state has an epsilon arc to the initial state of every
/// operand. `None` if `fsas` is empty.
pub fn unite(fsas: Vec<ConstAutomatonRef>) -> Option<Rc<CombinedAutomaton>> {
    let weights = fsas.iter().map(|f| f.semiring().one()).collect();
    unite_weighted(fsas, weights)
}

/// [`unite`] with the weights of the arcs into the operands given explicitly. `None` if `fsas` is
/// empty or the number of weights does not match.
pub fn unite_weighted(
    fsas: Vec<ConstAutomatonRef>,
    initial_weights: Vec<Weight>,
) -> Option<Rc<CombinedAutomaton>> {
    if fsas.is_empty() {
        return None;
    }
    if fsas.len() != initial_weights.len() {
        tracing::error!(
            "union of {} automata got {} initial weights",
            fsas.len(),
            initial_weights.len()
        );
        return None;
    }
    Some(Rc::new(CombinedAutomaton::new(
        fsas,
        Combination::Unite(initial_weights),
    )))
}

/// The concatenation of `fsas`: final states of one operand lose their finality and continue
/// with an epsilon arc, carrying the final weight, to the initial state of the next operand.
/// A single automaton is returned as it is, `None` if `fsas` is empty.
pub fn concat(mut fsas: Vec<ConstAutomatonRef>) -> Option<ConstAutomatonRef> {
    match fsas.len() {
        0 => None,
        1 => fsas.pop(),
        _ => Some(Rc::new(CombinedAutomaton::new(fsas, Combination::Concat))),
    }
}

/// Like [`unite`], but without epsilon arcs: the initial states of all operands are merged into
/// one. Arcs back into the initial state of an operand lead to the merged initial state.
/// A single automaton is returned as it is, `None` if `fsas` is empty.
pub fn fuse(mut fsas: Vec<ConstAutomatonRef>) -> Option<ConstAutomatonRef> {
    match fsas.len() {
        0 => None,
        1 => fsas.pop(),
        _ => Some(Rc::new(CombinedAutomaton::new(fsas, Combination::Fuse))),
    }
}

struct OperandMapping {
    fsa: Weak<CombinedAutomaton>,
    operand: usize,
}

impl Mapping for OperandMapping {
    fn map(&self, s: StateId) -> StateId {
        match self.fsa.upgrade() {
            Some(fsa) if fsa.operand(s) == Some(self.operand) => fsa.operand_state_id(s),
            _ => INVALID_STATE_ID,
        }
    }
}

/// Maps the states of a combined automaton to the states of its `operand`-th operand. States of
/// other operands map to [`INVALID_STATE_ID`]. The mapping does not keep `f` alive.
pub fn map_to_operand(f: &Rc<CombinedAutomaton>, operand: usize) -> ConstMappingRef {
    Rc::new(OperandMapping {
        fsa: Rc::downgrade(f),
        operand,
    })
}

/// Accepts one or more repetitions of the language of `f`: every final state other than the
/// initial one gets an epsilon arc, carrying its final weight, back to the initial state, unless
/// it has an arc there already.
pub fn closure(f: ConstAutomatonRef) -> ConstAutomatonRef {
    let initial = f.initial_state_id();
    let description = format!("closure({})", f.describe());
    Rc::new(
        ModifyAutomaton::new(f, description, move |state: &mut State| {
            if !state.is_final() || state.id() == initial {
                return;
            }
            if state.iter().all(|a| a.target != initial) {
                let weight = state.weight;
                state.new_arc(initial, weight, EPSILON, EPSILON);
            }
        })
        .map_base(|base| {
            base.without_properties(PROPERTY_SORTED | PROPERTY_ACYCLIC | PROPERTY_LINEAR)
        }),
    )
}

/// An automaton whose state 0 is `first` and whose states `s + 1` are the states `s` of `fsa`,
/// edited by `modify`.
struct PrefixedAutomaton {
    fsa: ConstAutomatonRef,
    properties: Properties,
    initial: StateId,
    first: ConstStateRef,
    modify: Box<dyn Fn(&mut State)>,
    description: String,
}

impl Automaton for PrefixedAutomaton {
    fn kind(&self) -> Type {
        self.fsa.kind()
    }

    fn properties(&self) -> &Properties {
        &self.properties
    }

    fn semiring(&self) -> ConstSemiringRef {
        self.fsa.semiring()
    }

    fn initial_state_id(&self) -> StateId {
        self.initial
    }

    fn input_alphabet(&self) -> Option<ConstAlphabetRef> {
        self.fsa.input_alphabet()
    }

    fn output_alphabet(&self) -> Option<ConstAlphabetRef> {
        self.fsa.output_alphabet()
    }

    fn get_state(&self, s: StateId) -> Option<ConstStateRef> {
        if s == 0 {
            return Some(self.first.clone());
        }
        let sp = self.fsa.get_state(s - 1)?;
        let mut state = State::clone(&sp);
        state.set_id(s);
        for a in state.arcs_mut() {
            a.target += 1;
        }
        (self.modify)(&mut state);
        Some(Rc::new(state))
    }

    fn dump_state(&self, s: StateId, out: &mut dyn fmt::Write) -> fmt::Result {
        match s {
            0 => write!(out, "new"),
            s => self.fsa.dump_state(s - 1, out),
        }
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

fn shifted(s: StateId) -> StateId {
    if s == INVALID_STATE_ID || s >= MAX_STATE_ID {
        INVALID_STATE_ID
    } else {
        s + 1
    }
}

fn prefixed_properties() -> Properties {
    Properties::with(PROPERTY_STORAGE | PROPERTY_CACHED, PROPERTY_NONE)
}

/// Accepts zero or more repetitions of the language of `f`. If the initial state of `f` is not
/// final, a new final initial state with an epsilon arc into [`closure`] of `f` is put in front
/// and the states of `f` are shifted by one.
pub fn kleene_closure(f: ConstAutomatonRef) -> ConstAutomatonRef {
    let description = format!("kleene-closure({})", f.describe());
    let plus = closure(f);
    let initial = plus.initial_state_id();
    if plus.get_state(initial).is_some_and(|sp| sp.is_final()) {
        return plus;
    }
    let semiring = plus.semiring();
    let mut first = State::new_final(0, semiring.one());
    let target = shifted(initial);
    if target != INVALID_STATE_ID {
        first.new_arc(target, semiring.one(), EPSILON, EPSILON);
    }
    Rc::new(PrefixedAutomaton {
        properties: prefixed_properties(),
        fsa: plus,
        initial: 0,
        first: Rc::new(first),
        modify: Box::new(|_| {}),
        description,
    })
}

/// The complement of the acceptor `f` with respect to all strings: state 0 is a new final sink
/// that accepts everything, the states of `f` are shifted by one and toggle their finality.
/// States with arcs fail over to the sink, states without arcs lead there on any label. The
/// result is only correct for deterministic `f`; transducers are returned unchanged.
pub fn complement(f: ConstAutomatonRef) -> ConstAutomatonRef {
    if f.kind() != Type::Acceptor {
        tracing::error!("complement is only defined for acceptors, {} is none", f.describe());
        return f;
    }
    let one = f.semiring().one();
    let mut sink = State::new_final(0, one);
    sink.new_acceptor_arc(0, one, ANY);
    let initial = match shifted(f.initial_state_id()) {
        INVALID_STATE_ID => 0,
        s => s,
    };
    Rc::new(PrefixedAutomaton {
        properties: prefixed_properties(),
        description: format!("complement({})", f.describe()),
        first: Rc::new(sink),
        initial,
        modify: Box::new(move |state: &mut State| {
            if state.is_final() {
                state.unset_final();
            } else {
                state.set_final(one);
            }
            let label = if state.has_arcs() { FAILURE } else { ANY };
            state.new_acceptor_arc(0, one, label);
        }),
        fsa: f,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::prelude::*;
    use crate::sssp::count_paths;

    fn word(symbols: &[&str], weight: f32) -> ConstAutomatonRef {
        let alphabet = fixtures::alphabet(symbols);
        let arcs = (0..symbols.len()).map(|i| (i as StateId, i as StateId + 1, i as LabelId, 0.0));
        StaticAutomaton::builder(Type::Acceptor, tropical())
            .with_alphabet(alphabet)
            .with_arcs(arcs)
            .with_finals([(symbols.len() as StateId, weight)])
            .build()
            .into_ref()
    }

    fn symbols_of_best(f: ConstAutomatonRef) -> String {
        let mut out = vec![];
        crate::io::write_linear(best(f).as_ref(), &mut out).unwrap();
        String::from_utf8(out).unwrap().trim().to_string()
    }

    #[test_log::test]
    fn union_alternates_between_operands() {
        let ab = word(&["a", "b"], 2.0);
        let cb = word(&["c", "b"], 1.0);
        let u = unite(vec![ab.clone(), cb.clone()]).unwrap();
        assert!(u.describe().starts_with("unite("));
        let alphabet = u.input_alphabet().unwrap();
        assert_eq!(alphabet.index("a"), 0);
        assert_eq!(alphabet.index("c"), 2);

        let initial = u.get_state(0).unwrap();
        assert_eq!(initial.n_arcs(), 2);
        assert!(initial.iter().all(|a| a.input == EPSILON));
        assert_eq!(bestscore(u.clone()), Weight::Real(1.0));
        assert_eq!(count_paths(u.clone()), Weight::Count(2));
        assert_eq!(symbols_of_best(u.clone()), "c b");

        // "c" of the second operand is relabeled, "b" is shared
        let second = u.get_state(initial[1].target).unwrap();
        assert_eq!(second[0].input, alphabet.index("c"));
        let to_second = map_to_operand(&u, 1);
        assert_eq!(to_second.map(second[0].target), 1);
        assert_eq!(to_second.map(initial[0].target), INVALID_STATE_ID);
        assert_eq!(map_to_operand(&u, 0).map(initial[0].target), 0);
        assert_eq!(crate::automaton::state_name(u.as_ref(), initial[1].target), "1,0");
    }

    #[test]
    fn weighted_union() {
        let fsas = vec![word(&["a"], 0.0), word(&["b"], 0.0)];
        let u = unite_weighted(fsas.clone(), vec![Weight::Real(4.0), Weight::Real(3.0)]);
        let u = u.unwrap();
        assert_eq!(bestscore(u.clone()), Weight::Real(3.0));
        assert_eq!(symbols_of_best(u), "b");
        assert!(unite_weighted(fsas, vec![Weight::Real(1.0)]).is_none());
        assert!(unite(vec![]).is_none());
    }

    #[test_log::test]
    fn concatenation_chains_the_operands() {
        let ab = word(&["a", "b"], 2.0);
        let cb = word(&["c", "b"], 1.0);
        let f = concat(vec![ab.clone(), cb, ab.clone()]).unwrap();
        assert_eq!(bestscore(f.clone()), Weight::Real(5.0));
        assert_eq!(symbols_of_best(f.clone()), "a b c b a b");
        assert_eq!(count(f.as_ref()).n_finals, 1);
        assert!(Rc::ptr_eq(&concat(vec![ab.clone()]).unwrap(), &ab));
        assert!(concat(vec![]).is_none());
    }

    #[test]
    fn fusion_merges_initial_states() {
        let a = word(&["a"], 1.0);
        let b = word(&["b"], 2.0);
        let f = fuse(vec![a, b]).unwrap();
        let initial = f.get_state(0).unwrap();
        assert_eq!(initial.n_arcs(), 2);
        assert!(!initial.is_final());
        assert_eq!(count_paths(f.clone()), Weight::Count(2));
        assert_eq!(bestscore(f.clone()), Weight::Real(1.0));

        // a loop on an initial state becomes a loop on the merged one
        let looping = StaticAutomaton::builder(Type::Acceptor, tropical())
            .with_alphabet(fixtures::alphabet(&["a"]))
            .with_arcs([(0, 0, 0, 1.0)])
            .with_finals([(0, 0.5)])
            .build()
            .into_ref();
        let g = fuse(vec![looping, word(&["a"], 0.0)]).unwrap();
        let initial = g.get_state(0).unwrap();
        assert!(initial.is_final());
        assert_eq!(initial.weight, Weight::Real(0.5));
        assert_eq!(initial[0].target, 0);
    }

    #[test_log::test]
    fn closures_repeat_the_language() {
        let ab = word(&["a", "b"], 1.0);
        let plus = closure(ab.clone());
        let last = plus.get_state(2).unwrap();
        assert!(last.is_final());
        assert_eq!((last[0].target, last[0].input), (0, EPSILON));
        assert_eq!(last[0].weight, Weight::Real(1.0));
        assert!(!is_acyclic(plus.as_ref(), false));
        assert!(!plus.get_state(0).unwrap().is_final());

        let star = kleene_closure(ab);
        assert_eq!(star.initial_state_id(), 0);
        let initial = star.get_state(0).unwrap();
        assert!(initial.is_final());
        assert_eq!((initial[0].target, initial[0].input), (1, EPSILON));
        assert_eq!(bestscore(star.clone()), Weight::Real(0.0));
        let last = star.get_state(3).unwrap();
        assert_eq!(last[0].target, 1);
        assert!(star.describe().starts_with("kleene-closure("));

        // an initial final state already accepts the empty string
        let optional = StaticAutomaton::builder(Type::Acceptor, tropical())
            .with_arcs([(0, 1, 0, 0.0)])
            .with_finals([(0, 0.0), (1, 0.0)])
            .build()
            .into_ref();
        assert!(kleene_closure(optional).describe().starts_with("closure("));
    }

    #[test]
    fn complement_swaps_acceptance() {
        let ab = word(&["a", "b"], 0.0);
        let c = complement(ab);
        assert_eq!(c.initial_state_id(), 1);
        let sink = c.get_state(0).unwrap();
        assert!(sink.is_final());
        assert_eq!((sink[0].target, sink[0].input), (0, ANY));

        let initial = c.get_state(1).unwrap();
        assert!(initial.is_final());
        assert_eq!(initial.n_arcs(), 2);
        assert_eq!((initial[0].target, initial[0].input), (2, 0));
        assert_eq!((initial[1].target, initial[1].input), (0, FAILURE));
        let end = c.get_state(3).unwrap();
        assert!(!end.is_final());
        assert_eq!((end[0].target, end[0].input), (0, ANY));

        let empty = complement(StaticAutomaton::new(Type::Acceptor, tropical()).into_ref());
        assert_eq!(empty.initial_state_id(), 0);
        assert!(empty.get_state(0).unwrap().is_final());

        let transducer = StaticAutomaton::new(Type::Transducer, tropical()).into_ref();
        assert!(Rc::ptr_eq(&complement(transducer.clone()), &transducer));
    }
}
