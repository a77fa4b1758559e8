//! Minimization by partition refinement.
use std::rc::Rc;

use itertools::Itertools;

use crate::automaton::{Automaton, ConstAutomatonRef, ConstStateRef, State};
use crate::determinize::determinize;
use crate::info::for_each_reachable;
use crate::math::Map;
use crate::semiring::{ConstSemiringRef, Weight};
use crate::sssp::{sssp_backward, StatePotentials};
use crate::types::*;
use crate::views::{transpose, ModifyAutomaton, SlaveAutomaton};

type ClassId = u32;

/// Everything two states must agree on to stay in the same class.
#[derive(Debug)]
struct Signature {
    class: ClassId,
    potential: Weight,
    final_weight: Option<Weight>,
    arcs: Vec<(LabelId, LabelId, ClassId, Weight)>,
}

impl Signature {
    fn new(
        state: &State,
        classes: &[ClassId],
        potentials: &StatePotentials,
        semiring: ConstSemiringRef,
    ) -> Self {
        let s = state.id();
        let mut arcs: Vec<_> = state
            .iter()
            .map(|a| (a.input, a.output, classes[a.target as usize], a.weight))
            .collect();
        arcs.sort_by(|a, b| {
            (a.0, a.1, a.2)
                .cmp(&(b.0, b.1, b.2))
                .then_with(|| semiring.compare(a.3, b.3))
        });
        Self {
            class: classes[s as usize],
            potential: potentials[s],
            final_weight: state.is_final().then_some(state.weight),
            arcs,
        }
    }

    fn key(&self, semiring: ConstSemiringRef) -> u64 {
        let arcs = self
            .arcs
            .iter()
            .map(|&(input, output, class, w)| (input, output, class, semiring.hash(w)))
            .collect_vec();
        let final_weight = self.final_weight.map(|w| semiring.hash(w));
        fxhash::hash64(&(self.class, semiring.hash(self.potential), final_weight, arcs))
    }

    fn matches(&self, other: &Signature, semiring: ConstSemiringRef) -> bool {
        let same = |a: Weight, b: Weight| semiring.compare(a, b).is_eq();
        self.class == other.class
            && same(self.potential, other.potential)
            && match (self.final_weight, other.final_weight) {
                (Some(a), Some(b)) => same(a, b),
                (None, None) => true,
                _ => false,
            }
            && self.arcs.len() == other.arcs.len()
            && self.arcs.iter().zip(&other.arcs).all(|(a, b)| {
                (a.0, a.1, a.2) == (b.0, b.1, b.2) && same(a.3, b.3)
            })
    }
}

/// Computes the coarsest partition of the reachable states of `f` into classes of states with
/// equal potential, equal final weight and arcs that agree in labels, weights and target class.
/// Returns for every state id the representative of its class, [`INVALID_STATE_ID`] for states
/// that are not reachable.
pub fn equivalence_classes(f: &ConstAutomatonRef) -> Vec<StateId> {
    let semiring = f.semiring();
    let potentials = sssp_backward(f.clone());
    let mut states: Vec<ConstStateRef> = Vec::new();
    for_each_reachable(f.as_ref(), |state| states.push(state.clone()));
    let size = states.iter().map(|s| s.id() as usize + 1).max().unwrap_or(0);

    let mut classes: Vec<ClassId> = vec![0; size];
    for state in &states {
        classes[state.id() as usize] = ClassId::from(state.is_final());
    }
    let mut n_classes = states.iter().map(|s| s.is_final()).unique().count();
    let mut pass = 0;
    loop {
        pass += 1;
        let mut buckets: Map<u64, Vec<(Signature, ClassId)>> = Map::default();
        let mut next = classes.clone();
        let mut n_next: ClassId = 0;
        for state in &states {
            let signature = Signature::new(state, &classes, &potentials, semiring);
            let bucket = buckets.entry(signature.key(semiring)).or_default();
            let class = match bucket.iter().find(|(known, _)| known.matches(&signature, semiring)) {
                Some(&(_, class)) => class,
                None => {
                    let class = n_next;
                    n_next += 1;
                    bucket.push((signature, class));
                    class
                }
            };
            next[state.id() as usize] = class;
        }
        classes = next;
        tracing::debug!("minimize pass {pass}: {n_next} classes from {} states", states.len());
        if n_next as usize == n_classes {
            break;
        }
        n_classes = n_next as usize;
    }

    let mut representatives: Map<ClassId, StateId> = Map::default();
    let mut map = vec![INVALID_STATE_ID; size];
    for state in &states {
        let s = state.id();
        map[s as usize] = *representatives.entry(classes[s as usize]).or_insert(s);
    }
    map
}

/// Merges equivalent states of `f`. The result is minimal if `f` is deterministic. State ids of
/// the result are those of the class representatives in `f`.
pub fn minimize(f: ConstAutomatonRef) -> ConstAutomatonRef {
    let map = Rc::new(equivalence_classes(&f));
    let initial = match map.get(f.initial_state_id() as usize) {
        Some(&s) => s,
        None => INVALID_STATE_ID,
    };
    let description = format!("minimize({})", f.describe());
    let targets = map.clone();
    let view = ModifyAutomaton::new(f, description, move |state: &mut State| {
        state.retain_arcs(|a| targets.get(a.target as usize).is_some());
        for arc in state.arcs_mut() {
            arc.target = targets[arc.target as usize];
        }
    })
    .map_base(|base: SlaveAutomaton| {
        base.with_initial(initial)
            .without_properties(PROPERTY_SORTED_BY_ARC | PROPERTY_LINEAR)
    });
    Rc::new(view)
}

/// Minimizes an acceptor by determinizing its reverse twice. Weights are pushed towards the
/// initial state on the way.
pub fn minimize_simple(f: ConstAutomatonRef) -> ConstAutomatonRef {
    determinize(transpose(determinize(transpose(f))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::info::count;
    use crate::prelude::*;

    /// `a c` and `b c`, both with weight `1 + w`.
    fn two_tails(w: f32) -> ConstAutomatonRef {
        StaticAutomaton::builder(Type::Acceptor, tropical())
            .with_alphabet(fixtures::alphabet(&["a", "b", "c"]))
            .with_arcs([(0, 1, 0, 1.0), (0, 2, 1, 1.0), (1, 3, 2, 0.0), (2, 4, 2, w)])
            .with_finals([(3, 0.0), (4, 0.0)])
            .build()
            .into_ref()
    }

    #[test_log::test]
    fn merges_equivalent_tails() {
        let f = two_tails(0.0);
        let m = minimize(f.clone());
        let c = count(m.as_ref());
        assert_eq!((c.n_states, c.n_arcs, c.n_finals), (3, 3, 1));
        assert_eq!(bestscore(m.clone()), bestscore(f));
        let targets: Vec<_> = m.get_state(0).unwrap().iter().map(|a| a.target).collect();
        assert_eq!(targets, vec![1, 1]);
    }

    #[test]
    fn keeps_states_with_different_futures() {
        let m = minimize(two_tails(2.0));
        assert_eq!(count(m.as_ref()).n_states, 4);
    }

    #[test]
    fn final_weights_distinguish_states() {
        let f = StaticAutomaton::builder(Type::Acceptor, log())
            .with_arcs([(0, 1, 0, 0.0), (0, 2, 1, 0.0), (1, 3, 2, 0.0)])
            .with_finals([(1, 1.0), (2, 1.0), (3, 0.5)])
            .build()
            .into_ref();
        let classes = equivalence_classes(&f);
        assert_ne!(classes[1], classes[2]);
    }

    #[test]
    fn minimal_input_is_unchanged() {
        let f = fixtures::diamond().into_ref();
        let m = minimize(f.clone());
        assert_eq!(count(m.as_ref()), count(f.as_ref()));
    }

    #[test]
    fn empty_input() {
        let f = StaticAutomaton::new(Type::Acceptor, tropical()).into_ref();
        assert!(equivalence_classes(&f).is_empty());
        assert_eq!(minimize(f).initial_state_id(), INVALID_STATE_ID);
    }

    #[test_log::test]
    fn simple_minimization_of_an_acceptor() {
        let f = StaticAutomaton::builder(Type::Acceptor, tropical())
            .with_alphabet(fixtures::alphabet(&["a", "b", "c"]))
            .with_arcs([(0, 1, 0, 1.0), (0, 2, 1, 1.0), (1, 3, 2, 0.0), (2, 3, 2, 0.0)])
            .with_finals([(3, 0.0)])
            .build()
            .into_ref();
        let m = minimize_simple(f.clone());
        let c = count(m.as_ref());
        assert_eq!((c.n_states, c.n_arcs), (3, 3));
        assert_eq!(bestscore(m), bestscore(f));
    }
}
