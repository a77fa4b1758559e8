//! Weighted determinization.
//!
//! Every state of a [`DeterminizeAutomaton`] stands for a subset of upstream states, each paired
//! with a residual weight and a pending output string. Arcs leaving a subset are grouped by input
//! label. The group's weight is the collection of the member weights, and only the longest common
//! prefix of the members' output strings goes on the arc. What is left of each weight and string
//! moves on into the target subset. Epsilon is treated like any other input label.
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::alphabet::ConstAlphabetRef;
use crate::automaton::{Automaton, ConstAutomatonRef, ConstStateRef, Properties, State};
use crate::info::for_each_reachable;
use crate::math::{Interner, Map, Set};
use crate::semiring::{ConstSemiringRef, Weight};
use crate::sssp::require_invert;
use crate::types::*;
use crate::views::{sort, sort_arcs, ModifyAutomaton, SortType};

/// Id of the empty output string.
const EMPTY: u32 = 0;

/// Position of a substate: the determinized state and the index within its subset.
type Cursor = (StateId, u32);

#[derive(Debug, Clone)]
struct Substate {
    state: StateId,
    output: u32,
    weight: Weight,
    disconnect: bool,
    predecessors: Vec<Cursor>,
}

impl Substate {
    fn new(state: StateId, output: u32, weight: Weight) -> Self {
        Self {
            state,
            output,
            weight,
            disconnect: false,
            predecessors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct Subset {
    substates: Rc<[Substate]>,
    /// Output still to be emitted before the subset is expanded.
    output: u32,
    /// The state only flushes the pending output of a final substate and has no other arcs.
    flush: bool,
}

#[derive(Debug, Default)]
struct Tables {
    subsets: Vec<Subset>,
    buckets: Map<u64, Vec<StateId>>,
    outputs: Interner<Vec<LabelId>>,
}

/// An arc of the upstream automaton, seen from a subset, before arcs are grouped by input.
struct PendingArc {
    predecessor: Cursor,
    input: LabelId,
    target: StateId,
    weight: Weight,
    output: Vec<LabelId>,
}

/// The determinization of an automaton, see [`determinize`].
pub struct DeterminizeAutomaton {
    fsa: ConstAutomatonRef,
    disambiguate: bool,
    properties: Properties,
    tables: RefCell<Tables>,
}

impl DeterminizeAutomaton {
    fn new(f: ConstAutomatonRef, disambiguate: bool) -> Self {
        let fsa = sort(f, SortType::ByInput);
        let properties = Properties::copied(fsa.properties(), PROPERTY_LINEAR | PROPERTY_ACYCLIC);
        properties.set(PROPERTY_STORAGE | PROPERTY_CACHED | PROPERTY_SORTED, PROPERTY_NONE);
        properties.add(SortType::ByInput.properties(fsa.kind()));
        let mut tables = Tables::default();
        let empty = tables.outputs.insert(Vec::new());
        debug_assert_eq!(empty, EMPTY);
        Self {
            fsa,
            disambiguate,
            properties,
            tables: RefCell::new(tables),
        }
    }

    fn output_string(&self, id: u32) -> Vec<LabelId> {
        let tables = self.tables.borrow();
        tables.outputs.get(id).cloned().unwrap_or_default()
    }

    fn intern(&self, output: &[LabelId]) -> u32 {
        if output.is_empty() {
            return EMPTY;
        }
        self.tables.borrow_mut().outputs.insert(output.to_vec())
    }

    /// The input label of arcs that only emit output.
    fn output_only_input(&self, label: LabelId) -> LabelId {
        match self.fsa.kind() {
            Type::Acceptor => label,
            _ => EPSILON,
        }
    }

    /// Sorts the substates by state and output and merges duplicates.
    fn canonicalize(&self, mut substates: Vec<Substate>) -> Vec<Substate> {
        let semiring = self.semiring();
        substates.sort_by_key(|sub| (sub.state, sub.output));
        let mut merged: Vec<Substate> = Vec::with_capacity(substates.len());
        for sub in substates {
            match merged.last_mut() {
                Some(last) if last.state == sub.state && last.output == sub.output => {
                    last.weight = semiring.collect(last.weight, sub.weight);
                    last.predecessors.extend(sub.predecessors);
                    last.disconnect |= sub.disconnect;
                }
                _ => merged.push(sub),
            }
        }
        merged
    }

    /// Marks the substates that carry a residual and whose predecessor chain passes through
    /// their own upstream state.
    fn mark_ambiguous_cycles(&self, substates: &mut [Substate]) {
        let semiring = self.semiring();
        let tables = self.tables.borrow();
        for sub in substates.iter_mut() {
            if sub.output == EMPTY && semiring.is_default(sub.weight) {
                continue;
            }
            let mut stack = sub.predecessors.clone();
            let mut seen = Set::default();
            while let Some(cursor) = stack.pop() {
                if !seen.insert(cursor) {
                    continue;
                }
                let (s, index) = cursor;
                let Some(predecessor) = tables.subsets[s as usize].substates.get(index as usize)
                else {
                    continue;
                };
                if predecessor.state == sub.state {
                    sub.disconnect = true;
                    break;
                }
                stack.extend_from_slice(&predecessor.predecessors);
            }
        }
    }

    fn key(substates: &[Substate], output: u32, flush: bool) -> u64 {
        let states: Vec<(StateId, u32)> = substates.iter().map(|s| (s.state, s.output)).collect();
        fxhash::hash64(&(states, output, flush))
    }

    fn equal(&self, a: &[Substate], b: &[Substate]) -> bool {
        let semiring = self.semiring();
        a.len() == b.len()
            && a.iter().zip(b).all(|(x, y)| {
                x.state == y.state
                    && x.output == y.output
                    && semiring.compare(x.weight, y.weight).is_eq()
            })
    }

    /// Returns the state for the given subset, creating it if it is new.
    fn insert_state(&self, substates: Vec<Substate>, output: u32, flush: bool) -> StateId {
        let mut substates = self.canonicalize(substates);
        if self.disambiguate {
            self.mark_ambiguous_cycles(&mut substates);
        }
        let key = Self::key(&substates, output, flush);
        let mut tables = self.tables.borrow_mut();
        if let Some(bucket) = tables.buckets.get(&key) {
            for &id in bucket {
                let known = &tables.subsets[id as usize];
                if known.output == output
                    && known.flush == flush
                    && self.equal(&known.substates, &substates)
                {
                    return id;
                }
            }
        }
        let id = tables.subsets.len() as StateId;
        assert!(id <= MAX_STATE_ID, "determinization ran out of state ids");
        tables.subsets.push(Subset {
            substates: substates.into(),
            output,
            flush,
        });
        tables.buckets.entry(key).or_default().push(id);
        id
    }

    /// Number of states discovered so far.
    pub fn n_discovered(&self) -> usize {
        self.tables.borrow().subsets.len()
    }

    fn expand(&self, s: StateId, subset: &Subset, sp: &mut State) {
        let semiring = self.semiring();
        let mut pending = Vec::new();
        let mut final_weight = semiring.zero();
        let mut is_final = false;
        let mut user_tag = false;
        for (index, sub) in subset.substates.iter().enumerate() {
            let Some(q) = self.fsa.get_state(sub.state) else {
                tracing::warn!("state {} of {} is not available", sub.state, self.fsa.describe());
                continue;
            };
            let prefix = self.output_string(sub.output);
            if sub.disconnect {
                let (label, rest) = match prefix.split_first() {
                    Some((&first, rest)) => (first, self.intern(rest)),
                    None => (EPSILON, EMPTY),
                };
                let singleton = vec![Substate::new(sub.state, EMPTY, semiring.one())];
                let target = self.insert_state(singleton, rest, false);
                sp.new_arc(target, sub.weight, self.output_only_input(label), label);
                continue;
            }
            user_tag |= q.has_tags(STATE_TAG_USER);
            for a in q.iter() {
                let mut output = prefix.clone();
                if a.output != EPSILON {
                    output.push(a.output);
                }
                pending.push(PendingArc {
                    predecessor: (s, index as u32),
                    input: a.input,
                    target: a.target,
                    weight: semiring.extend(sub.weight, a.weight),
                    output,
                });
            }
            if !q.is_final() {
                continue;
            }
            match prefix.split_first() {
                Some((&first, rest)) => {
                    let rest = self.intern(rest);
                    let flushed = vec![Substate::new(sub.state, EMPTY, sub.weight)];
                    let target = self.insert_state(flushed, rest, true);
                    sp.new_arc(target, semiring.one(), self.output_only_input(first), first);
                }
                None => {
                    let weight = semiring.extend(sub.weight, q.weight);
                    final_weight = semiring.collect(final_weight, weight);
                    is_final = true;
                }
            }
        }
        if is_final {
            sp.set_final(final_weight);
        }
        if user_tag {
            sp.add_tags(STATE_TAG_USER);
        }

        pending.sort_by_key(|a| a.input);
        let mut start = 0;
        while start < pending.len() {
            let input = pending[start].input;
            let end = start + pending[start..].iter().take_while(|a| a.input == input).count();
            let group = &pending[start..end];
            start = end;
            let weight = group
                .iter()
                .skip(1)
                .fold(group[0].weight, |w, a| semiring.collect(w, a.weight));
            if weight == semiring.zero() {
                continue;
            }
            let lcp = group.iter().skip(1).fold(group[0].output.len(), |n, a| {
                group[0].output[..n]
                    .iter()
                    .zip(&a.output)
                    .take_while(|(x, y)| x == y)
                    .count()
            });
            let common = &group[0].output[..lcp];
            let (label, rest) = match common.split_first() {
                Some((&first, rest)) => (first, self.intern(rest)),
                None => (EPSILON, EMPTY),
            };
            let inverse = semiring.invert(weight);
            let substates = group
                .iter()
                .map(|a| {
                    let mut sub = Substate::new(
                        a.target,
                        self.intern(&a.output[lcp..]),
                        semiring.extend(inverse, a.weight),
                    );
                    if self.disambiguate {
                        sub.predecessors.push(a.predecessor);
                    }
                    sub
                })
                .collect();
            let target = self.insert_state(substates, rest, false);
            sp.new_arc(target, weight, input, label);
        }
    }

    fn write_output(&self, id: u32, out: &mut dyn fmt::Write) -> fmt::Result {
        let output = self.output_string(id);
        if output.is_empty() {
            return write!(out, "eps");
        }
        let alphabet = self.fsa.output_alphabet();
        for (i, &label) in output.iter().enumerate() {
            if i > 0 {
                write!(out, " ")?;
            }
            match &alphabet {
                Some(alphabet) => write!(out, "{}", alphabet.symbol_or_id(label))?,
                None => write!(out, "{label}")?,
            }
        }
        Ok(())
    }
}

impl Automaton for DeterminizeAutomaton {
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
        let initial = self.fsa.initial_state_id();
        if initial == INVALID_STATE_ID {
            return INVALID_STATE_ID;
        }
        let one = self.semiring().one();
        self.insert_state(vec![Substate::new(initial, EMPTY, one)], EMPTY, false)
    }

    fn input_alphabet(&self) -> Option<ConstAlphabetRef> {
        self.fsa.input_alphabet()
    }

    fn output_alphabet(&self) -> Option<ConstAlphabetRef> {
        self.fsa.output_alphabet()
    }

    fn get_state(&self, s: StateId) -> Option<ConstStateRef> {
        let subset = self.tables.borrow().subsets.get(s as usize)?.clone();
        let semiring = self.semiring();
        let mut sp = State::new(s);
        let pending = self.output_string(subset.output);
        if let Some((&first, rest)) = pending.split_first() {
            let rest = self.intern(rest);
            let target = self.insert_state(subset.substates.to_vec(), rest, subset.flush);
            sp.new_arc(target, semiring.one(), self.output_only_input(first), first);
        } else if subset.flush {
            let weight = subset
                .substates
                .iter()
                .filter_map(|sub| {
                    let q = self.fsa.get_state(sub.state)?;
                    q.is_final().then(|| semiring.extend(sub.weight, q.weight))
                })
                .fold(semiring.zero(), |w, v| semiring.collect(w, v));
            sp.set_final(weight);
        } else {
            self.expand(s, &subset, &mut sp);
        }
        Some(Rc::new(sp))
    }

    fn dump_state(&self, s: StateId, out: &mut dyn fmt::Write) -> fmt::Result {
        let Some(subset) = self.tables.borrow().subsets.get(s as usize).cloned() else {
            return write!(out, "unknown");
        };
        let semiring = self.semiring();
        for (i, sub) in subset.substates.iter().enumerate() {
            if i > 0 {
                write!(out, ",")?;
            }
            write!(out, "(")?;
            if sub.disconnect {
                write!(out, "+")?;
            }
            self.fsa.dump_state(sub.state, out)?;
            if !semiring.is_default(sub.weight) {
                write!(out, ",{}", semiring.format(sub.weight))?;
            }
            if sub.output != EMPTY {
                write!(out, ",")?;
                self.write_output(sub.output, out)?;
            }
            write!(out, ")")?;
        }
        if subset.output != EMPTY {
            write!(out, " [")?;
            self.write_output(subset.output, out)?;
            write!(out, "]")?;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        let name = if self.disambiguate {
            "disambiguate"
        } else {
            "determinize"
        };
        format!("{name}({})", self.fsa.describe())
    }
}

/// Determinizes `f` lazily. The result has at most one arc per input label and state, except
/// for epsilon-input arcs of transducers that emit output left over at final states.
///
/// Needs a semiring with inverse; otherwise `f` is returned unchanged and an error is logged.
/// Terminates only if `f` is determinizable, e.g. acyclic or free of ambiguous cycles with
/// differing weights.
pub fn determinize(f: ConstAutomatonRef) -> ConstAutomatonRef {
    if !require_invert(f.as_ref(), "determinization") {
        return f;
    }
    Rc::new(DeterminizeAutomaton::new(f, false))
}

/// Like [`determinize`], but substates whose history passes through their own upstream state
/// while carrying a residual weight or output are split off into a subset of their own instead
/// of being carried along. This is a heuristic that stops expansion on some ambiguous cycles, it
/// does not make every automaton determinizable.
pub fn disambiguate(f: ConstAutomatonRef) -> ConstAutomatonRef {
    if !require_invert(f.as_ref(), "disambiguation") {
        return f;
    }
    Rc::new(DeterminizeAutomaton::new(f, true))
}

/// Merges parallel arcs, i.e. arcs with the same labels and target, by collecting their weights.
pub fn local_determinize(f: ConstAutomatonRef) -> ConstAutomatonRef {
    let semiring = f.semiring();
    let description = format!("local-determinize({})", f.describe());
    let kind = f.kind();
    let view = ModifyAutomaton::new(f, description, move |state: &mut State| {
        if state.n_arcs() <= 1 {
            return;
        }
        sort_arcs(state, SortType::ByArc, semiring);
        let arcs = std::mem::take(state.arcs_mut());
        let merged = state.arcs_mut();
        for arc in arcs {
            match merged.last_mut() {
                Some(last)
                    if (last.input, last.output, last.target)
                        == (arc.input, arc.output, arc.target) =>
                {
                    last.weight = semiring.collect(last.weight, arc.weight);
                }
                _ => merged.push(arc),
            }
        }
    })
    .map_base(|base| {
        base.without_properties(PROPERTY_SORTED)
            .with_properties(SortType::ByArc.properties(kind), PROPERTY_ALL)
    });
    Rc::new(view)
}

/// Replaces every disambiguator label, on the input side per the input alphabet and on the output
/// side per the output alphabet, by `replacement`.
pub fn replace_disambiguation_symbols(
    f: ConstAutomatonRef,
    replacement: LabelId,
) -> ConstAutomatonRef {
    let input = f.input_alphabet();
    let output = f.output_alphabet();
    if input.is_none() && output.is_none() {
        tracing::warn!("{} has no alphabets, no disambiguators to replace", f.describe());
        return f;
    }
    let description = format!("replace-disambiguators({})", f.describe());
    let is_disambiguator = |alphabet: &Option<ConstAlphabetRef>, label: LabelId| {
        alphabet.as_ref().is_some_and(|a| a.is_disambiguator(label))
    };
    let view = ModifyAutomaton::new(f, description, move |state: &mut State| {
        for arc in state.arcs_mut() {
            if is_disambiguator(&input, arc.input) {
                arc.input = replacement;
            }
            if is_disambiguator(&output, arc.output) {
                arc.output = replacement;
            }
        }
    })
    .map_base(|base| base.without_properties(PROPERTY_SORTED));
    Rc::new(view)
}

/// Replaces every disambiguator label by epsilon.
pub fn remove_disambiguation_symbols(f: ConstAutomatonRef) -> ConstAutomatonRef {
    replace_disambiguation_symbols(f, EPSILON)
}

/// Whether no reachable state of `f` has two arcs with the same input label.
pub fn is_deterministic(f: &dyn Automaton) -> bool {
    let mut deterministic = true;
    for_each_reachable(f, |state| {
        let mut inputs: Vec<LabelId> = state.iter().map(|a| a.input).collect();
        inputs.sort_unstable();
        if inputs.windows(2).any(|w| w[0] == w[1]) {
            deterministic = false;
        }
    });
    deterministic
}
