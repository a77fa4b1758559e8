//! Lazy composition of weighted transducers.
//!
//! A state of the composition is a triple of a left state, a filter phase and a right state. The
//! filter phase decides which epsilon moves are allowed next so that every pair of matching paths
//! produces exactly one path of the result:
//! - the matching filter lets both sides move on epsilon at the same time in phase 0, phase 1
//!   only follows epsilon outputs of the left side and phase 2 only epsilon inputs of the right
//!   side,
//! - the sequencing filter lets the left side move on epsilon first (phase 0) and then the right
//!   side (phase 1).
//!
//! Arcs of the right side whose input is one of the special labels [`ANY`], [`ELSE`] or
//! [`FAILURE`] act as default transitions, see [`compose_matching`].
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::alphabet::ConstAlphabetRef;
use crate::automaton::{
    Arc, Automaton, ConstAutomatonRef, ConstMappingRef, ConstStateRef, Properties, State,
    WeakMapping,
};
use crate::config::Config;
use crate::math::Interner;
use crate::semiring::{same_semiring, ConstSemiringRef, Weight};
use crate::types::*;
use crate::views::{cache, map_output_with, sort, SortType};

/// The epsilon filter of a composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeFilter {
    /// Epsilon moves of both sides may be taken together.
    Matching,
    /// Epsilon moves of the left side come before those of the right side.
    Sequencing,
}

/// Packs a filter phase into the two tag bits above a left state id.
fn pack(l: StateId, phase: u32) -> StateId {
    debug_assert!(phase < 4);
    l | (phase << STATE_ID_BITS)
}

/// Inverse of [`pack`].
fn unpack(packed: StateId) -> (StateId, u32) {
    (packed & STATE_ID_MASK, packed >> STATE_ID_BITS)
}

/// The composition of two automata, see [`compose_matching`] and [`compose_sequencing`].
pub struct ComposeAutomaton {
    left: ConstAutomatonRef,
    right: ConstAutomatonRef,
    filter: ComposeFilter,
    kind: Type,
    properties: Properties,
    states: RefCell<Interner<(StateId, StateId)>>,
}

impl ComposeAutomaton {
    fn new(
        left: ConstAutomatonRef,
        right: ConstAutomatonRef,
        filter: ComposeFilter,
        config: &Config,
    ) -> Option<Self> {
        if !same_semiring(left.semiring(), right.semiring()) {
            tracing::error!(
                "cannot compose {} over {} with {} over {}",
                left.describe(),
                left.semiring().name(),
                right.describe(),
                right.semiring().name()
            );
            return None;
        }
        let kind = if left.kind() == Type::Acceptor && right.kind() == Type::Acceptor {
            Type::Acceptor
        } else {
            Type::Transducer
        };
        let left = match right.input_alphabet() {
            Some(alphabet) => map_output_with(left, alphabet, config),
            None => left,
        };
        let left = cache(sort(left, SortType::ByOutput), config.compose_cache_max_age);
        let right = cache(sort(right, SortType::ByInput), config.compose_cache_max_age);
        let properties = Properties::new();
        properties.set(PROPERTY_STORAGE | PROPERTY_CACHED | PROPERTY_SORTED, PROPERTY_NONE);
        if left.has_property(PROPERTY_ACYCLIC) && right.has_property(PROPERTY_ACYCLIC) {
            properties.add(PROPERTY_ACYCLIC);
        }
        Some(Self {
            left,
            right,
            filter,
            kind,
            properties,
            states: RefCell::new(Interner::new()),
        })
    }

    fn insert_state(&self, l: StateId, phase: u32, r: StateId) -> StateId {
        let id = self.states.borrow_mut().insert((pack(l, phase), r));
        assert!(id <= MAX_STATE_ID, "composition ran out of state ids");
        id
    }

    fn lookup(&self, s: StateId) -> Option<(StateId, u32, StateId)> {
        let states = self.states.borrow();
        let &(packed, r) = states.get(s)?;
        let (l, phase) = unpack(packed);
        Some((l, phase, r))
    }

    /// The state of the left operand that `s` corresponds to.
    pub fn left_state_id(&self, s: StateId) -> StateId {
        self.lookup(s).map_or(INVALID_STATE_ID, |(l, _, _)| l)
    }

    /// The state of the right operand that `s` corresponds to.
    pub fn right_state_id(&self, s: StateId) -> StateId {
        self.lookup(s).map_or(INVALID_STATE_ID, |(_, _, r)| r)
    }

    /// The filter phase of `s`.
    pub fn filter_phase(&self, s: StateId) -> Option<u32> {
        self.lookup(s).map(|(_, phase, _)| phase)
    }

    fn extend(&self, a: &Arc, b: &Arc) -> Weight {
        self.semiring().extend(a.weight, b.weight)
    }

    /// Arcs for pairs of left and right arcs with matching labels, starting at the given
    /// positions. Stops at the first special label on either side.
    fn compose_arcs(&self, sp: &mut State, sl: &State, sr: &State, al: usize, ar: usize) {
        let (left, right) = (sl.arcs(), sr.arcs());
        let (nl, nr) = (left.len(), right.len());
        let (mut i, mut j) = (al, ar);
        let galloping = (nl << 2) < nr || nl > (nr << 2);
        while i < nl && j < nr {
            let (lo, ri) = (left[i].output, right[j].input);
            if lo > LAST_LABEL_ID || ri > LAST_LABEL_ID {
                break;
            }
            if lo == ri {
                for b in right[j..].iter().take_while(|b| b.input == lo) {
                    let target = self.insert_state(left[i].target, 0, b.target);
                    sp.new_arc(target, self.extend(&left[i], b), left[i].input, b.output);
                }
                i += 1;
            } else if lo > ri {
                j = if galloping {
                    j + right[j..].partition_point(|b| b.input < lo)
                } else {
                    j + 1
                };
            } else {
                i = if galloping {
                    i + left[i..].partition_point(|a| a.output < ri)
                } else {
                    i + 1
                };
            }
        }
    }

    fn has_regular_match(sr: &State, label: LabelId) -> bool {
        sr.arcs().binary_search_by(|b| b.input.cmp(&label)).is_ok()
    }

    /// Arcs for the special labels of the right side, which are sorted behind all other labels.
    fn compose_special_arcs(&self, sp: &mut State, sl: &State, sr: &State) {
        let l = sl.id();
        let regular = |a: &&Arc| (FIRST_LABEL_ID..=LAST_LABEL_ID).contains(&a.output);
        let right_acceptor = self.right.kind() == Type::Acceptor;
        for sar in sr.arcs().iter().rev().take_while(|b| is_special_label(b.input)) {
            match sar.input {
                ANY | ELSE => {
                    for al in sl.arcs().iter().filter(regular) {
                        if sar.input == ELSE && Self::has_regular_match(sr, al.output) {
                            continue;
                        }
                        let output = if right_acceptor { al.output } else { sar.output };
                        let target = self.insert_state(al.target, 0, sar.target);
                        sp.new_arc(target, self.extend(al, sar), al.input, output);
                    }
                }
                FAILURE => {
                    let unmatched = sl
                        .arcs()
                        .iter()
                        .filter(regular)
                        .any(|al| !Self::has_regular_match(sr, al.output));
                    if unmatched {
                        let output = if self.kind == Type::Acceptor {
                            FAILURE
                        } else {
                            sar.output
                        };
                        let target = self.insert_state(l, 0, sar.target);
                        sp.new_arc(target, sar.weight, FAILURE, output);
                    }
                }
                _ => {}
            }
        }
    }

    fn left_epsilon_arcs(&self, sp: &mut State, sl: &State, r: StateId, phase: u32) {
        for al in sl.iter().take_while(|a| a.output == EPSILON) {
            let target = self.insert_state(al.target, phase, r);
            sp.new_arc(target, al.weight, al.input, EPSILON);
        }
    }

    fn right_epsilon_arcs(&self, sp: &mut State, l: StateId, sr: &State, phase: u32) {
        for ar in sr.iter().take_while(|a| a.input == EPSILON) {
            let target = self.insert_state(l, phase, ar.target);
            sp.new_arc(target, ar.weight, EPSILON, ar.output);
        }
    }
}

impl Automaton for ComposeAutomaton {
    fn kind(&self) -> Type {
        self.kind
    }

    fn properties(&self) -> &Properties {
        &self.properties
    }

    fn semiring(&self) -> ConstSemiringRef {
        self.left.semiring()
    }

    fn initial_state_id(&self) -> StateId {
        let l = self.left.initial_state_id();
        let r = self.right.initial_state_id();
        if l == INVALID_STATE_ID || r == INVALID_STATE_ID {
            return INVALID_STATE_ID;
        }
        self.insert_state(l, 0, r)
    }

    fn input_alphabet(&self) -> Option<ConstAlphabetRef> {
        match self.kind {
            Type::Acceptor => self.right.input_alphabet(),
            _ => self.left.input_alphabet(),
        }
    }

    fn output_alphabet(&self) -> Option<ConstAlphabetRef> {
        match self.kind {
            Type::Acceptor => self.right.input_alphabet(),
            _ => self.right.output_alphabet(),
        }
    }

    fn get_state(&self, s: StateId) -> Option<ConstStateRef> {
        let (l, phase, r) = self.lookup(s)?;
        let sl = self.left.get_state(l)?;
        let sr = self.right.get_state(r)?;
        let mut sp = State::new(s);
        let n_left_eps = sl.iter().take_while(|a| a.output == EPSILON).count();
        let n_right_eps = sr.iter().take_while(|a| a.input == EPSILON).count();
        let (al, ar) = match (self.filter, phase) {
            (ComposeFilter::Matching, 0) => {
                if n_left_eps > 0 && (n_right_eps < sr.n_arcs() || sr.is_final()) {
                    self.left_epsilon_arcs(&mut sp, &sl, r, 1);
                }
                if n_right_eps > 0 && (n_left_eps < sl.n_arcs() || sl.is_final()) {
                    self.right_epsilon_arcs(&mut sp, l, &sr, 2);
                }
                (0, 0)
            }
            (ComposeFilter::Matching, 1) => {
                self.left_epsilon_arcs(&mut sp, &sl, r, 1);
                (n_left_eps, 0)
            }
            (ComposeFilter::Matching, 2) => {
                self.right_epsilon_arcs(&mut sp, l, &sr, 2);
                (0, n_right_eps)
            }
            (ComposeFilter::Sequencing, 0) => {
                self.left_epsilon_arcs(&mut sp, &sl, r, 0);
                self.right_epsilon_arcs(&mut sp, l, &sr, 1);
                (n_left_eps, n_right_eps)
            }
            (ComposeFilter::Sequencing, 1) => {
                self.right_epsilon_arcs(&mut sp, l, &sr, 1);
                (n_left_eps, n_right_eps)
            }
            _ => unreachable!("filter phase {phase} does not exist"),
        };
        self.compose_arcs(&mut sp, &sl, &sr, al, ar);
        self.compose_special_arcs(&mut sp, &sl, &sr);
        if sl.is_final() && sr.is_final() {
            sp.set_final(self.semiring().extend(sl.weight, sr.weight));
        }
        tracing::trace!("composed state {s} = ({l}, {phase}, {r}) with {} arcs", sp.n_arcs());
        Some(Rc::new(sp))
    }

    fn dump_state(&self, s: StateId, out: &mut dyn fmt::Write) -> fmt::Result {
        match self.lookup(s) {
            Some((l, phase, r)) => {
                write!(out, "(")?;
                self.left.dump_state(l, out)?;
                write!(out, ", {phase}, ")?;
                self.right.dump_state(r, out)?;
                write!(out, ")")
            }
            None => write!(out, "unknown"),
        }
    }

    fn describe(&self) -> String {
        let name = match self.filter {
            ComposeFilter::Matching => "compose-matching",
            ComposeFilter::Sequencing => "compose-sequencing",
        };
        format!("{name}({},{})", self.left.describe(), self.right.describe())
    }
}

/// Composes `left` with `right` using the matching filter.
///
/// The output labels of `left` are mapped onto the input alphabet of `right` by their symbols
/// first. Arcs of `right` with special input labels work as follows:
/// - [`ANY`] matches every regular output label of the left state,
/// - [`ELSE`] matches every regular output label of the left state that no regular arc of the
///   right state matches,
/// - [`FAILURE`] is taken without consuming anything from the left side if some output label of
///   the left state is not matched by a regular arc of the right state.
///
/// Returns `None` if the semirings of the operands differ.
pub fn compose_matching(
    left: ConstAutomatonRef,
    right: ConstAutomatonRef,
) -> Option<Rc<ComposeAutomaton>> {
    compose_matching_with(left, right, &Config::default())
}

/// [`compose_matching`] with explicit cache sizes and unknown symbol reporting.
pub fn compose_matching_with(
    left: ConstAutomatonRef,
    right: ConstAutomatonRef,
    config: &Config,
) -> Option<Rc<ComposeAutomaton>> {
    ComposeAutomaton::new(left, right, ComposeFilter::Matching, config).map(Rc::new)
}

/// Composes `left` with `right` using the sequencing filter, see [`compose_matching`].
pub fn compose_sequencing(
    left: ConstAutomatonRef,
    right: ConstAutomatonRef,
) -> Option<Rc<ComposeAutomaton>> {
    compose_sequencing_with(left, right, &Config::default())
}

/// [`compose_sequencing`] with explicit cache sizes and unknown symbol reporting.
pub fn compose_sequencing_with(
    left: ConstAutomatonRef,
    right: ConstAutomatonRef,
    config: &Config,
) -> Option<Rc<ComposeAutomaton>> {
    ComposeAutomaton::new(left, right, ComposeFilter::Sequencing, config).map(Rc::new)
}

/// Maps the states of a composition to the states of its left operand. The mapping does not keep
/// the composition alive.
pub fn map_to_left(f: &Rc<ComposeAutomaton>) -> ConstMappingRef {
    Rc::new(WeakMapping::new(f, ComposeAutomaton::left_state_id))
}

/// Maps the states of a composition to the states of its right operand.
pub fn map_to_right(f: &Rc<ComposeAutomaton>) -> ConstMappingRef {
    Rc::new(WeakMapping::new(f, ComposeAutomaton::right_state_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::prelude::*;
    use crate::sssp::count_paths;

    fn abx() -> ConstAlphabetRef {
        fixtures::alphabet(&["a", "b", "x", "y"])
    }

    fn transducer<I>(arcs: I, finals: &[StateId]) -> ConstAutomatonRef
    where
        I: IntoIterator<Item = (StateId, StateId, LabelId, LabelId, f32)>,
    {
        StaticAutomaton::builder(Type::Transducer, tropical())
            .with_alphabet(abx())
            .with_transducer_arcs(arcs)
            .with_finals(finals.iter().map(|&s| (s, 0.0)))
            .build()
            .into_ref()
    }

    fn arcs(f: &dyn Automaton, s: StateId) -> Vec<(LabelId, LabelId, f32)> {
        let mut arcs: Vec<_> = f
            .get_state(s)
            .unwrap()
            .iter()
            .map(|a| (a.input, a.output, a.weight.value()))
            .collect();
        arcs.sort_by(|a, b| a.partial_cmp(b).unwrap());
        arcs
    }

    #[test_log::test]
    fn single_arc_with_relabeling() {
        let alphabet = abx();
        let left = StaticAutomaton::builder(Type::Acceptor, tropical())
            .with_alphabet(alphabet.clone())
            .with_arcs([(0, 1, 0, 1.0)])
            .with_finals([(1, 0.0)])
            .build();
        let right = transducer([(0, 1, 0, 2, 0.0)], &[1]);
        let composed = compose_matching(left.into_ref(), right).unwrap();
        let initial = composed.initial_state_id();
        assert_eq!(arcs(composed.as_ref(), initial), vec![(0, 2, 1.0)]);
        assert_eq!(composed.kind(), Type::Transducer);
        let target = composed.get_state(initial).unwrap()[0].target;
        assert!(composed.get_state(target).unwrap().is_final());
        assert_eq!(bestscore(composed.clone()), Weight::Real(1.0));

        let left_map = map_to_left(&composed);
        let right_map = map_to_right(&composed);
        assert_eq!((left_map.map(target), right_map.map(target)), (1, 1));
        assert_eq!(composed.filter_phase(target), Some(0));
    }

    #[test_log::test]
    fn identity_preserves_language() {
        let f = fixtures::diamond().into_ref();
        let id = identity(f.input_alphabet().unwrap(), tropical());
        let composed = compose_matching(f.clone(), id).unwrap();
        assert_eq!(composed.kind(), Type::Acceptor);
        assert_eq!(bestscore(composed.clone()), bestscore(f.clone()));
        assert_eq!(count_paths(composed.clone()), count_paths(f));
        let c = crate::info::count(composed.as_ref());
        assert_eq!((c.n_states, c.n_arcs), (4, 5));
    }

    #[test]
    fn semiring_mismatch() {
        let f = fixtures::linear_ab().into_ref();
        let g = change_semiring(f.clone(), log());
        assert!(compose_matching(f, g).is_none());
    }

    #[test]
    fn empty_operand() {
        let f = fixtures::linear_ab().into_ref();
        let empty = StaticAutomaton::new(Type::Acceptor, tropical()).into_ref();
        let composed = compose_sequencing(f, empty).unwrap();
        assert_eq!(composed.initial_state_id(), INVALID_STATE_ID);
    }

    /// Left: `a:eps` then `b:x`; right: `eps:y` then `x:x`. Both filters must produce exactly one
    /// successful path.
    #[test_log::test]
    fn epsilon_filters_produce_one_path() {
        let left = transducer([(0, 1, 0, EPSILON, 1.0), (1, 2, 1, 2, 1.0)], &[2]);
        let right = transducer([(0, 1, EPSILON, 3, 1.0), (1, 2, 2, 2, 1.0)], &[2]);
        for compose in [compose_matching, compose_sequencing] {
            let composed = compose(left.clone(), right.clone()).unwrap();
            assert_eq!(count_paths(composed.clone()), Weight::Count(1), "{}", composed.describe());
            assert_eq!(bestscore(composed.clone()), Weight::Real(4.0));
        }
    }

    #[test]
    fn epsilon_pairs_move_together_in_matching() {
        let left = transducer([(0, 1, 0, EPSILON, 1.0)], &[1]);
        let right = transducer([(0, 1, EPSILON, 3, 2.0)], &[1]);
        let composed = compose_matching(left, right).unwrap();
        let initial = composed.initial_state_id();
        assert!(arcs(composed.as_ref(), initial).contains(&(0, 3, 3.0)));
        assert_eq!(count_paths(composed), Weight::Count(1));
    }

    #[test]
    fn galloping_merge_matches_linear_merge() {
        let mut wide: Vec<_> = (0..4).map(|l| (0, 1, l, l, l as f32)).collect();
        wide.extend((0..4).map(|l| (0, 1, l, l, 10.0 + l as f32)));
        let left = transducer([(0, 1, 2, 2, 0.5)], &[1]);
        let right = transducer(wide, &[1]);
        let composed = compose_matching(left, right).unwrap();
        let initial = composed.initial_state_id();
        assert_eq!(arcs(composed.as_ref(), initial), vec![(2, 2, 2.5), (2, 2, 12.5)]);
    }

    #[test]
    fn special_labels() {
        // left offers a, b and x
        let left = StaticAutomaton::builder(Type::Acceptor, tropical())
            .with_alphabet(abx())
            .with_arcs([(0, 1, 0, 0.0), (0, 1, 1, 0.0), (0, 1, 2, 0.0)])
            .with_finals([(1, 0.0)])
            .build()
            .into_ref();
        let right = transducer(
            [
                (0, 1, 0, 0, 1.0),
                (0, 2, ELSE, 3, 2.0),
                (0, 3, FAILURE, FAILURE, 3.0),
                (0, 4, ANY, 3, 4.0),
            ],
            &[1, 2, 4],
        );
        let composed = compose_matching(left, right).unwrap();
        let initial = composed.initial_state_id();
        let result = arcs(composed.as_ref(), initial);
        assert_eq!(
            result,
            vec![
                (0, 0, 1.0),
                (0, 3, 4.0),
                (1, 3, 2.0),
                (1, 3, 4.0),
                (2, 3, 2.0),
                (2, 3, 4.0),
                (FAILURE, FAILURE, 3.0),
            ]
        );
        let failure = composed
            .get_state(initial)
            .unwrap()
            .iter()
            .find(|a| a.input == FAILURE)
            .unwrap()
            .target;
        assert_eq!(composed.left_state_id(failure), 0);
        assert_eq!(composed.right_state_id(failure), 3);
    }

    #[test]
    fn phase_packing() {
        assert_eq!(unpack(pack(MAX_STATE_ID, 2)), (MAX_STATE_ID, 2));
        assert_eq!(unpack(pack(7, 0)), (7, 0));
    }
}
