use std::cmp::Ordering;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::automaton::{Automaton, ConstAutomatonRef, State};
use crate::storage::StaticAutomaton;
use crate::types::*;

/// Reverses every arc of `f`. The result is materialized.
///
/// The initial state of `f` becomes the only final state, with weight one. If `f` has a single
/// final state whose weight is one, that state becomes the initial state. Otherwise a new initial
/// state is added that reaches every former final state through an epsilon arc carrying its final
/// weight. Without final states the result is empty.
pub fn transpose(f: ConstAutomatonRef) -> ConstAutomatonRef {
    let semiring = f.semiring();
    let mut result = StaticAutomaton::new(f.kind(), semiring);
    result.set_input_alphabet(f.input_alphabet());
    result.set_output_alphabet(f.output_alphabet());
    result.set_description(format!("transpose({})", f.describe()));
    let initial = f.initial_state_id();
    if initial == INVALID_STATE_ID {
        return result.into_ref();
    }

    let mut finals = Vec::new();
    let mut seen = bit_set::BitSet::new();
    let mut queue = VecDeque::from([initial]);
    seen.insert(initial as usize);
    while let Some(s) = queue.pop_front() {
        let Some(sp) = f.get_state(s) else {
            continue;
        };
        if result.get_state(s).is_none() {
            result.set_state(State::new(s));
        }
        if sp.is_final() {
            finals.push((s, sp.weight));
        }
        for arc in sp.iter() {
            if seen.insert(arc.target as usize) {
                queue.push_back(arc.target);
            }
            if result.get_state(arc.target).is_none() {
                result.set_state(State::new(arc.target));
            }
            result
                .state_mut(arc.target)
                .new_arc(s, arc.weight, arc.input, arc.output);
        }
    }
    if finals.is_empty() {
        return StaticAutomaton::new(f.kind(), semiring).into_ref();
    }
    result.state_mut(initial).set_final(semiring.one());

    match finals.as_slice() {
        [(s, weight)] if semiring.compare(*weight, semiring.one()) == Ordering::Equal => {
            result.set_initial_state_id(*s);
        }
        _ => {
            let start = result.new_state();
            let state = result.state_mut(start);
            for (s, weight) in finals {
                state.new_arc(s, weight, EPSILON, EPSILON);
            }
            result.set_initial_state_id(start);
        }
    }
    if f.has_property(PROPERTY_ACYCLIC) {
        result.add_properties(PROPERTY_ACYCLIC);
    }
    tracing::debug!("transposed {} states", result.size());
    result.into_ref()
}

#[cfg(test)]
mod tests {
    use crate::fixtures;
    use crate::prelude::*;

    #[test]
    fn single_final_state_becomes_initial() {
        let t = transpose(fixtures::linear_ab().into_ref());
        assert_eq!(t.initial_state_id(), 2);
        let arc = t.get_state(2).unwrap()[0];
        assert_eq!((arc.target, arc.input, arc.weight), (1, 1, Weight::Real(2.0)));
        assert!(t.get_state(0).unwrap().is_final());
        assert!(!t.get_state(2).unwrap().is_final());
        assert_eq!(bestscore(t), Weight::Real(3.0));
    }

    #[test]
    fn several_final_states_get_a_new_initial_state() {
        let fsa = StaticAutomaton::builder(Type::Acceptor, tropical())
            .with_alphabet(fixtures::alphabet(&["a", "b"]))
            .with_arcs([(0, 1, 0, 1.0), (0, 2, 1, 2.0)])
            .with_finals([(1, 0.5), (2, 0.0)])
            .build();
        let t = transpose(fsa.into_ref());
        assert_eq!(t.initial_state_id(), 3);
        let start = t.get_state(3).unwrap();
        assert_eq!(start.n_arcs(), 2);
        assert!(start.iter().all(|a| a.input == EPSILON));
        assert_eq!(bestscore(t), Weight::Real(1.5));
    }

    #[test]
    fn without_final_states_the_result_is_empty() {
        let fsa = StaticAutomaton::builder(Type::Acceptor, tropical())
            .with_arcs([(0, 1, 0, 1.0)])
            .build();
        let t = transpose(fsa.into_ref());
        assert_eq!(t.initial_state_id(), INVALID_STATE_ID);
    }
}
