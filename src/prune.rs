//! Pruning by posterior weight and synchronous beam pruning.
use std::collections::VecDeque;
use std::rc::Rc;

use crate::automaton::{Automaton, ConstAutomatonRef, State};
use crate::info::for_each_reachable;
use crate::math::Map;
use crate::semiring::{ConstSemiringRef, Weight};
use crate::sssp::{sssp, sssp_backward, StatePotentials};
use crate::types::*;
use crate::views::{ModifyAutomaton, SlaveAutomaton};

fn posterior(
    semiring: ConstSemiringRef,
    forward: &StatePotentials,
    backward: &StatePotentials,
    s: StateId,
    weight: Weight,
    target: StateId,
) -> Weight {
    semiring.extend(forward[s], semiring.extend(weight, backward[target]))
}

/// Removes all arcs whose posterior probability is below `threshold`. With `relative` set, the
/// posterior of an arc is measured against the best arc, otherwise against the total weight of
/// `f`. A larger threshold never keeps more arcs, `0` keeps every arc.
///
/// Pruned automata may contain states that are no longer connected, [`trim`](crate::basic::trim)
/// removes them.
pub fn prune_posterior(f: ConstAutomatonRef, threshold: f64, relative: bool) -> ConstAutomatonRef {
    let semiring = f.semiring();
    let beam = semiring.from_probability(threshold);
    if !beam.is_valid() {
        tracing::error!(
            "cannot prune with threshold {threshold} in semiring {}",
            semiring.name()
        );
        return f;
    }
    let initial = f.initial_state_id();
    if initial == INVALID_STATE_ID {
        return f;
    }
    let forward = sssp(f.clone());
    let backward = sssp_backward(f.clone());
    let reference = if relative {
        let mut best = semiring.max();
        for_each_reachable(f.as_ref(), |sp| {
            for a in sp.iter() {
                let w = posterior(semiring, &forward, &backward, sp.id(), a.weight, a.target);
                if semiring.compare(w, best).is_lt() {
                    best = w;
                }
            }
        });
        best
    } else {
        backward[initial]
    };
    let limit = semiring.extend(reference, beam);
    tracing::debug!("posterior pruning at {}", semiring.format(limit));

    let description = format!(
        "prune-posterior({},{threshold},{})",
        f.describe(),
        if relative { "relative" } else { "absolute" }
    );
    let view = ModifyAutomaton::new(f, description, move |state: &mut State| {
        let s = state.id();
        state.retain_arcs(|a| {
            let w = posterior(semiring, &forward, &backward, s, a.weight, a.target);
            semiring.compare(w, limit).is_le()
        });
    })
    .map_base(|base: SlaveAutomaton| {
        base.without_properties(PROPERTY_STORAGE | PROPERTY_CACHED)
    });
    Rc::new(view)
}

const NO_SLICE: u32 = u32::MAX;

/// Slice membership and forward potentials of the states that survive synchronous pruning.
#[derive(Debug)]
struct Slices {
    slice: Vec<u32>,
    potentials: StatePotentials,
    /// Largest admissible potential per slice.
    limits: Vec<Weight>,
}

impl Slices {
    fn slice_of(&self, s: StateId) -> u32 {
        self.slice.get(s as usize).copied().unwrap_or(NO_SLICE)
    }

    fn assign(&mut self, s: StateId, slice: u32, potential: Weight) {
        if self.slice.len() <= s as usize {
            self.slice.resize(s as usize + 1, NO_SLICE);
        }
        self.slice[s as usize] = slice;
        self.potentials.set(s, potential);
    }

    fn compute(f: &dyn Automaton, beam: Weight) -> Self {
        let semiring = f.semiring();
        let mut slices = Self {
            slice: Vec::new(),
            potentials: StatePotentials::new(semiring),
            limits: vec![semiring.max()],
        };
        let initial = f.initial_state_id();
        if initial == INVALID_STATE_ID {
            return slices;
        }
        slices.assign(initial, 0, semiring.one());
        let mut current = vec![initial];
        while !current.is_empty() {
            let k = (slices.limits.len() - 1) as u32;

            // epsilon arcs stay within the slice
            let mut queue: VecDeque<StateId> = current.iter().copied().collect();
            while let Some(s) = queue.pop_front() {
                let Some(sp) = f.get_state(s) else {
                    continue;
                };
                for a in sp.iter().filter(|a| a.input == EPSILON) {
                    let w = semiring.extend(slices.potentials[s], a.weight);
                    let t = a.target;
                    let better = match slices.slice_of(t) {
                        NO_SLICE => {
                            current.push(t);
                            true
                        }
                        slice => {
                            slice == k && semiring.compare(w, slices.potentials[t]).is_lt()
                        }
                    };
                    if better {
                        slices.assign(t, k, w);
                        queue.push_back(t);
                    }
                }
            }

            let mut candidates: Map<StateId, Weight> = Map::default();
            for &s in &current {
                let Some(sp) = f.get_state(s) else {
                    continue;
                };
                for a in sp.iter().filter(|a| a.input != EPSILON) {
                    if slices.slice_of(a.target) != NO_SLICE {
                        continue;
                    }
                    let w = semiring.extend(slices.potentials[s], a.weight);
                    let known = candidates.entry(a.target).or_insert(w);
                    if semiring.compare(w, *known).is_lt() {
                        *known = w;
                    }
                }
            }
            let best = candidates
                .values()
                .copied()
                .min_by(|a, b| semiring.compare(*a, *b))
                .unwrap_or_else(|| semiring.max());
            let limit = semiring.extend(best, beam);
            let mut next: Vec<(StateId, Weight)> = candidates
                .into_iter()
                .filter(|(_, w)| semiring.compare(*w, limit).is_le())
                .collect();
            next.sort_by_key(|(s, _)| *s);
            tracing::trace!(
                "slice {}: {} states within {}",
                k + 1,
                next.len(),
                semiring.format(limit)
            );
            slices.limits.push(limit);
            current.clear();
            for (s, w) in next {
                slices.assign(s, k + 1, w);
                current.push(s);
            }
        }
        slices
    }
}

/// Synchronous beam pruning. The states are grouped into slices by the number of non-epsilon
/// arcs needed to reach them, and in every slice only the states whose forward potential is
/// within `beam` of the best one in the slice survive. A larger beam keeps more arcs.
///
/// Each state is assigned to the first slice it is reached in, so arcs that lead back into an
/// earlier slice are only kept if they satisfy that slice's beam.
pub fn prune_sync(f: ConstAutomatonRef, beam: Weight) -> ConstAutomatonRef {
    let semiring = f.semiring();
    let slices = Slices::compute(f.as_ref(), beam);
    tracing::debug!(
        "synchronous pruning kept {} slices",
        slices.limits.len().saturating_sub(1)
    );
    let description = format!("prune-sync({},{})", f.describe(), semiring.format(beam));
    let view = ModifyAutomaton::new(f, description, move |state: &mut State| {
        let s = state.id();
        if slices.slice_of(s) == NO_SLICE {
            state.arcs_mut().clear();
            state.unset_final();
            return;
        }
        state.retain_arcs(|a| match slices.slice_of(a.target) {
            NO_SLICE => false,
            slice => {
                let w = semiring.extend(slices.potentials[s], a.weight);
                semiring.compare(w, slices.limits[slice as usize]).is_le()
            }
        });
    })
    .map_base(|base: SlaveAutomaton| {
        base.without_properties(PROPERTY_STORAGE | PROPERTY_CACHED)
    });
    Rc::new(view)
}
