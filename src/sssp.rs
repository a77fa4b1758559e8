//! Single-source shortest distance over arbitrary semirings (Mohri's generic algorithm) and the
//! weight pushing, posterior and path counting operations built on it.
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::ops::Index;
use std::rc::Rc;

use bit_set::BitSet;

use crate::automaton::{Automaton, ConstAutomatonRef, ConstStateRef, State};
use crate::config::Config;
use crate::info::{for_each_reachable, topological_order};
use crate::semiring::{count_semiring, ConstSemiringRef, Weight};
use crate::types::*;
use crate::views::ModifyAutomaton;

/// A weight per state. States without an entry have potential `zero`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatePotentials {
    weights: Vec<Weight>,
    zero: Weight,
}

impl StatePotentials {
    /// No state has a potential.
    pub fn new(semiring: ConstSemiringRef) -> Self {
        Self {
            weights: Vec::new(),
            zero: semiring.zero(),
        }
    }

    /// The potential of `s`.
    pub fn get(&self, s: StateId) -> Weight {
        self[s]
    }

    /// Sets the potential of `s`.
    pub fn set(&mut self, s: StateId, weight: Weight) {
        let index = s as usize;
        if index >= self.weights.len() {
            self.weights.resize(index + 1, self.zero);
        }
        self.weights[index] = weight;
    }

    /// One past the largest state with a potential.
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// Whether no state has a potential.
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Iterates over `(state, potential)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (StateId, Weight)> + '_ {
        self.weights
            .iter()
            .enumerate()
            .map(|(s, w)| (s as StateId, *w))
    }
}

impl Index<StateId> for StatePotentials {
    type Output = Weight;

    fn index(&self, s: StateId) -> &Weight {
        self.weights.get(s as usize).unwrap_or(&self.zero)
    }
}

fn is_zero(semiring: ConstSemiringRef, w: Weight) -> bool {
    semiring.compare(w, semiring.zero()) == Ordering::Equal
}

/// Shortest distance from the initial state to every state. The states are relaxed in
/// topological order if `f` is acyclic, otherwise a FIFO queue is used until no distance changes
/// anymore.
pub fn sssp(f: ConstAutomatonRef) -> StatePotentials {
    let semiring = f.semiring();
    let mut d = StatePotentials::new(semiring);
    let initial = f.initial_state_id();
    if initial == INVALID_STATE_ID {
        return d;
    }
    if let Some(order) = acyclic_order(f.as_ref()) {
        d.set(initial, semiring.one());
        for s in order {
            let Some(sp) = f.get_state(s) else {
                continue;
            };
            let ds = d[s];
            for arc in sp.iter() {
                let w = semiring.collect(d[arc.target], semiring.extend(ds, arc.weight));
                d.set(arc.target, w);
            }
        }
        return d;
    }

    let mut r = StatePotentials::new(semiring);
    d.set(initial, semiring.one());
    r.set(initial, semiring.one());
    let mut queue = VecDeque::from([initial]);
    let mut queued = BitSet::new();
    queued.insert(initial as usize);
    let mut n_relaxed = 0usize;
    while let Some(s) = queue.pop_front() {
        queued.remove(s as usize);
        let residual = r[s];
        r.set(s, semiring.zero());
        let Some(sp) = f.get_state(s) else {
            continue;
        };
        n_relaxed += 1;
        for arc in sp.iter() {
            let extended = semiring.extend(residual, arc.weight);
            let w = semiring.collect(d[arc.target], extended);
            if semiring.compare(d[arc.target], w) != Ordering::Equal {
                d.set(arc.target, w);
                r.set(arc.target, semiring.collect(r[arc.target], extended));
                if queued.insert(arc.target as usize) {
                    queue.push_back(arc.target);
                }
            }
        }
    }
    tracing::debug!("sssp relaxed {n_relaxed} states of {}", f.describe());
    d
}

/// Topological order if `f` is known or found to be acyclic.
fn acyclic_order(f: &dyn Automaton) -> Option<Vec<StateId>> {
    if f.knows_property(PROPERTY_ACYCLIC) && !f.has_property(PROPERTY_ACYCLIC) {
        return None;
    }
    let order = topological_order(f);
    if order.is_none() && f.has_property(PROPERTY_ACYCLIC) {
        tracing::warn!("{} claims to be acyclic but is not", f.describe());
    }
    order
}

/// Shortest distance from every state to the final states, including the final weights.
pub fn sssp_backward(f: ConstAutomatonRef) -> StatePotentials {
    sssp_backward_with(f, &Config::default())
}

/// [`sssp_backward`] giving up after [`Config::max_fixed_point_iterations`] passes on cyclic
/// automata.
pub fn sssp_backward_with(f: ConstAutomatonRef, config: &Config) -> StatePotentials {
    let semiring = f.semiring();
    let mut d = StatePotentials::new(semiring);
    if let Some(order) = acyclic_order(f.as_ref()) {
        for &s in order.iter().rev() {
            let Some(sp) = f.get_state(s) else {
                continue;
            };
            d.set(s, backward_potential(semiring, &sp, &d));
        }
        return d;
    }

    let mut states: Vec<ConstStateRef> = Vec::new();
    for_each_reachable(f.as_ref(), |sp| states.push(sp.clone()));
    for sp in &states {
        if sp.is_final() {
            d.set(sp.id(), sp.weight);
        }
    }
    // the states are visited in reverse discovery order so that distances travel backwards
    // quickly, each pass uses the distances updated in the same pass
    for iteration in 0.. {
        if iteration == config.max_fixed_point_iterations {
            tracing::warn!(
                "backward sssp of {} did not converge after {iteration} passes",
                f.describe()
            );
            break;
        }
        let mut changed = false;
        for sp in states.iter().rev() {
            let w = backward_potential(semiring, sp, &d);
            if semiring.compare(d[sp.id()], w) != Ordering::Equal {
                d.set(sp.id(), w);
                changed = true;
            }
        }
        if !changed {
            tracing::trace!("backward sssp converged after {} passes", iteration + 1);
            break;
        }
    }
    d
}

fn backward_potential(semiring: ConstSemiringRef, sp: &State, d: &StatePotentials) -> Weight {
    let final_weight = if sp.is_final() {
        sp.weight
    } else {
        semiring.zero()
    };
    sp.iter().fold(final_weight, |acc, arc| {
        semiring.collect(acc, semiring.extend(arc.weight, d[arc.target]))
    })
}

pub(crate) fn require_invert(f: &dyn Automaton, operation: &str) -> bool {
    if !f.semiring().has_invert() {
        tracing::error!(
            "{operation} needs a semiring with inverse, {} has none",
            f.semiring().name()
        );
        return false;
    }
    true
}

/// `a ⊗ w ⊗ b⁻¹` for the pushing operations, `zero` if `b` is zero.
fn reweight(semiring: ConstSemiringRef, a: Weight, w: Weight, b: Weight) -> Weight {
    if is_zero(semiring, a) || is_zero(semiring, b) {
        return semiring.zero();
    }
    semiring.extend(semiring.extend(a, w), semiring.invert(b))
}

/// Moves weights towards the initial state: afterwards the weights leaving every state collect
/// to `one`, except for states that cannot reach a final state. The weight of each complete path
/// is unchanged; the total weight ends up in the final weights.
pub fn push_to_initial(f: ConstAutomatonRef) -> ConstAutomatonRef {
    if !require_invert(f.as_ref(), "pushing") {
        return f;
    }
    let potentials = sssp_backward(f.clone());
    let semiring = f.semiring();
    let total = potentials[f.initial_state_id()];
    let description = format!("push-to-initial({})", f.describe());
    Rc::new(
        ModifyAutomaton::new(f, description, move |state: &mut State| {
            let s = state.id();
            for arc in state.arcs_mut() {
                arc.weight = reweight(semiring, potentials[arc.target], arc.weight, potentials[s]);
            }
            if state.is_final() {
                state.weight = reweight(semiring, total, state.weight, potentials[s]);
            }
        })
        .map_base(|base| base.without_properties(PROPERTY_SORTED_BY_WEIGHT)),
    )
}

/// Moves weights towards the final states, using the distances from the initial state.
pub fn push_to_final(f: ConstAutomatonRef) -> ConstAutomatonRef {
    if !require_invert(f.as_ref(), "pushing") {
        return f;
    }
    let potentials = sssp(f.clone());
    let semiring = f.semiring();
    let description = format!("push-to-final({})", f.describe());
    Rc::new(
        ModifyAutomaton::new(f, description, move |state: &mut State| {
            let s = state.id();
            for arc in state.arcs_mut() {
                arc.weight = reweight(semiring, potentials[s], arc.weight, potentials[arc.target]);
            }
            if state.is_final() {
                state.weight = semiring.extend(potentials[s], state.weight);
            }
        })
        .map_base(|base| base.without_properties(PROPERTY_SORTED_BY_WEIGHT)),
    )
}

/// Replaces every arc weight by the posterior weight of the arc: the weight of all paths through
/// the arc divided by the weight of all paths.
pub fn posterior(f: ConstAutomatonRef) -> ConstAutomatonRef {
    if !require_invert(f.as_ref(), "posterior") {
        return f;
    }
    let forward = sssp(f.clone());
    let backward = sssp_backward(f.clone());
    let semiring = f.semiring();
    let total = backward[f.initial_state_id()];
    let description = format!("posterior({})", f.describe());
    Rc::new(
        ModifyAutomaton::new(f, description, move |state: &mut State| {
            let s = state.id();
            for arc in state.arcs_mut() {
                let through = semiring.extend(arc.weight, backward[arc.target]);
                arc.weight = reweight(semiring, forward[s], through, total);
            }
        })
        .map_base(|base| base.without_properties(PROPERTY_SORTED_BY_WEIGHT)),
    )
}

/// Number of successful paths, as a weight of the count semiring. Saturates at `u32::MAX`, which
/// is also the result if a cycle lies on a successful path.
pub fn count_paths(f: ConstAutomatonRef) -> Weight {
    let semiring = count_semiring();
    let trimmed = crate::basic::trim(f);
    let Some(order) = topological_order(trimmed.as_ref()) else {
        return semiring.max();
    };
    let mut d = StatePotentials::new(semiring);
    for &s in order.iter().rev() {
        let Some(sp) = trimmed.get_state(s) else {
            continue;
        };
        let mut n = if sp.is_final() {
            semiring.one()
        } else {
            semiring.zero()
        };
        for arc in sp.iter() {
            n = semiring.collect(n, d[arc.target]);
        }
        d.set(s, n);
    }
    let initial = trimmed.initial_state_id();
    if initial == INVALID_STATE_ID {
        return semiring.zero();
    }
    d[initial]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::prelude::*;

    fn cyclic() -> ConstAutomatonRef {
        let mut fsa = fixtures::linear_ab();
        fsa.state_mut(1).new_acceptor_arc(0, Weight::Real(0.5), 0);
        fsa.into_ref()
    }

    #[test_log::test]
    fn forward_distances() {
        let d = sssp(fixtures::diamond().into_ref());
        assert_eq!(d[0], Weight::Real(0.0));
        assert_eq!(d[1], Weight::Real(1.0));
        assert_eq!(d[3], Weight::Real(3.0));
        assert_eq!(d[17], Weight::Real(f32::INFINITY));

        let d = sssp(cyclic());
        assert_eq!(d[2], Weight::Real(3.0));
        assert_eq!(d[0], Weight::Real(0.0));
    }

    #[test_log::test]
    fn backward_distances() {
        let d = sssp_backward(fixtures::diamond().into_ref());
        assert_eq!(d[0], Weight::Real(3.0));
        assert_eq!(d[2], Weight::Real(3.0));
        let d = sssp_backward(cyclic());
        assert_eq!(d[0], Weight::Real(3.0));
        assert_eq!(d[1], Weight::Real(2.0));
    }

    #[test]
    fn log_semiring_sums_paths() {
        let f = change_semiring(fixtures::diamond().into_ref(), log());
        let total = sssp_backward(f)[0].value() as f64;
        let expected = -((-3.0f64).exp() + (-5.0f64).exp() + (-6.0f64).exp()).ln();
        assert!((total - expected).abs() < 1e-4, "{total} {expected}");
    }

    #[test]
    fn pushing_keeps_path_weights() {
        let f = fixtures::diamond().into_ref();
        let pushed = push_to_initial(f.clone());
        let arc = pushed.get_state(0).unwrap()[0];
        assert_eq!(arc.weight, Weight::Real(0.0));
        assert_eq!(bestscore(pushed), Weight::Real(3.0));
        let pushed = push_to_final(f);
        assert_eq!(bestscore(pushed.clone()), Weight::Real(3.0));
        assert_eq!(pushed.get_state(3).unwrap().weight, Weight::Real(3.0));
        let pushed = push_to_initial(fixtures::diamond().into_ref());
        assert_eq!(pushed.describe(), "push-to-initial(static)");
    }

    #[test]
    fn posteriors() {
        let f = posterior(fixtures::diamond().into_ref());
        // the best path has posterior one in the tropical semiring
        assert_eq!(f.get_state(0).unwrap()[0].weight, Weight::Real(0.0));
        assert_eq!(f.get_state(0).unwrap()[1].weight, Weight::Real(2.0));
    }

    #[test]
    fn path_counting() {
        assert_eq!(count_paths(fixtures::diamond().into_ref()), Weight::Count(3));
        assert_eq!(count_paths(cyclic()), Weight::Count(u32::MAX));
        let empty = StaticAutomaton::new(Type::Acceptor, tropical()).into_ref();
        assert_eq!(count_paths(empty), Weight::Count(0));
    }
}
