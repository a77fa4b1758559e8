use std::collections::VecDeque;
use std::fmt::Display;

use bit_set::BitSet;
use itertools::Itertools;

use crate::automaton::{Automaton, ConstStateRef};
use crate::types::*;

/// Sizes of the part of an automaton that is reachable from its initial state.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Counts {
    /// Number of states.
    pub n_states: usize,
    /// Number of arcs.
    pub n_arcs: usize,
    /// Number of final states.
    pub n_finals: usize,
    /// The largest state id, `None` for the empty automaton.
    pub max_state_id: Option<StateId>,
    /// Arcs with epsilon input.
    pub n_input_epsilon_arcs: usize,
    /// Arcs with epsilon output.
    pub n_output_epsilon_arcs: usize,
    /// Arcs with epsilon input and output.
    pub n_io_epsilon_arcs: usize,
    /// Arcs with failure input.
    pub n_input_failure_arcs: usize,
    /// Arcs with failure output.
    pub n_output_failure_arcs: usize,
}

impl Display for Counts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut builder = tabled::builder::Builder::default();
        builder.push_record(["states".to_string(), self.n_states.to_string()]);
        builder.push_record(["arcs".to_string(), self.n_arcs.to_string()]);
        builder.push_record(["final states".to_string(), self.n_finals.to_string()]);
        if let Some(max) = self.max_state_id {
            builder.push_record(["max state id".to_string(), max.to_string()]);
        }
        for (name, n) in [
            ("input epsilon arcs", self.n_input_epsilon_arcs),
            ("output epsilon arcs", self.n_output_epsilon_arcs),
            ("io epsilon arcs", self.n_io_epsilon_arcs),
            ("input failure arcs", self.n_input_failure_arcs),
            ("output failure arcs", self.n_output_failure_arcs),
        ] {
            if n > 0 {
                builder.push_record([name.to_string(), n.to_string()]);
            }
        }
        write!(
            f,
            "{}",
            builder.build().with(tabled::settings::Style::rounded())
        )
    }
}

/// Visits every state reachable from the initial state in breadth first order.
pub fn for_each_reachable<F: FnMut(&ConstStateRef)>(f: &dyn Automaton, mut visit: F) {
    let initial = f.initial_state_id();
    if initial == INVALID_STATE_ID {
        return;
    }
    let mut seen = BitSet::new();
    let mut queue = VecDeque::from([initial]);
    seen.insert(initial as usize);
    while let Some(s) = queue.pop_front() {
        let Some(sp) = f.get_state(s) else {
            tracing::warn!("{}: state {s} is referenced but missing", f.describe());
            continue;
        };
        for arc in sp.iter() {
            if seen.insert(arc.target as usize) {
                queue.push_back(arc.target);
            }
        }
        visit(&sp);
    }
}

/// Counts the states and arcs reachable from the initial state.
pub fn count(f: &dyn Automaton) -> Counts {
    let mut counts = Counts::default();
    for_each_reachable(f, |sp| {
        counts.n_states += 1;
        if sp.is_final() {
            counts.n_finals += 1;
        }
        counts.max_state_id = counts.max_state_id.max(Some(sp.id()));
        for arc in sp.iter() {
            counts.n_arcs += 1;
            let (i, o) = (arc.input, arc.output);
            counts.n_input_epsilon_arcs += usize::from(i == EPSILON);
            counts.n_output_epsilon_arcs += usize::from(o == EPSILON);
            counts.n_io_epsilon_arcs += usize::from(i == EPSILON && o == EPSILON);
            counts.n_input_failure_arcs += usize::from(i == FAILURE);
            counts.n_output_failure_arcs += usize::from(o == FAILURE);
        }
    });
    counts
}

/// Whether no final state is reachable.
pub fn is_empty(f: &dyn Automaton) -> bool {
    let mut empty = true;
    for_each_reachable(f, |sp| empty &= !sp.is_final());
    empty
}

/// The reachable states in topological order, `None` if a cycle is reachable.
pub fn topological_order(f: &dyn Automaton) -> Option<Vec<StateId>> {
    let initial = f.initial_state_id();
    if initial == INVALID_STATE_ID {
        return Some(vec![]);
    }
    let mut finished = BitSet::new();
    let mut on_stack = BitSet::new();
    let mut order = Vec::new();
    let mut stack = vec![(initial, f.get_state(initial), 0usize)];
    on_stack.insert(initial as usize);
    while let Some(top) = stack.last_mut() {
        let target = top.1.as_ref().and_then(|sp| sp.arcs().get(top.2)).map(|a| a.target);
        match target {
            Some(t) => {
                top.2 += 1;
                if on_stack.contains(t as usize) {
                    return None;
                }
                if !finished.contains(t as usize) {
                    on_stack.insert(t as usize);
                    stack.push((t, f.get_state(t), 0));
                }
            }
            None => {
                let s = top.0;
                stack.pop();
                on_stack.remove(s as usize);
                finished.insert(s as usize);
                order.push(s);
            }
        }
    }
    order.reverse();
    Some(order)
}

/// Whether no cycle is reachable from the initial state. A known property is used without
/// traversal; with `remember` a computed result is recorded on `f`.
pub fn is_acyclic(f: &dyn Automaton, remember: bool) -> bool {
    if f.knows_property(PROPERTY_ACYCLIC) {
        return f.has_property(PROPERTY_ACYCLIC);
    }
    let acyclic = topological_order(f).is_some();
    if remember {
        f.properties().set(PROPERTY_ACYCLIC, if acyclic { PROPERTY_ACYCLIC } else { 0 });
    }
    acyclic
}

/// Whether every reachable state has at most one arc. See [`is_acyclic`] for `remember`.
pub fn is_linear(f: &dyn Automaton, remember: bool) -> bool {
    if f.knows_property(PROPERTY_LINEAR) {
        return f.has_property(PROPERTY_LINEAR);
    }
    let mut linear = true;
    for_each_reachable(f, |sp| linear &= sp.n_arcs() <= 1);
    if remember {
        f.properties().set(PROPERTY_LINEAR, if linear { PROPERTY_LINEAR } else { 0 });
    }
    linear
}

fn property_names(f: &dyn Automaton) -> String {
    [
        (PROPERTY_STORAGE, "storage"),
        (PROPERTY_CACHED, "cached"),
        (PROPERTY_LINEAR, "linear"),
        (PROPERTY_ACYCLIC, "acyclic"),
        (PROPERTY_SORTED_BY_INPUT, "sorted-by-input"),
        (PROPERTY_SORTED_BY_OUTPUT, "sorted-by-output"),
        (PROPERTY_SORTED_BY_INPUT_AND_OUTPUT, "sorted-by-input-and-output"),
        (PROPERTY_SORTED_BY_ARC, "sorted-by-arc"),
        (PROPERTY_SORTED_BY_WEIGHT, "sorted-by-weight"),
    ]
    .into_iter()
    .filter(|(p, _)| f.knows_property(*p))
    .map(|(p, name)| {
        if f.has_property(p) {
            name.to_string()
        } else {
            format!("!{name}")
        }
    })
    .join(" ")
}

/// A table with the type, description, properties and [`Counts`] of `f`.
pub fn info(f: &dyn Automaton) -> String {
    let mut builder = tabled::builder::Builder::default();
    builder.push_record(["type".to_string(), f.kind().name().to_string()]);
    builder.push_record(["describe".to_string(), f.describe()]);
    builder.push_record(["properties".to_string(), property_names(f)]);
    builder.push_record(["semiring".to_string(), f.semiring().name().to_string()]);
    if let Some(alphabet) = f.input_alphabet() {
        builder.push_record(["input labels".to_string(), alphabet.labels().len().to_string()]);
    }
    if f.kind() == Type::Transducer {
        if let Some(alphabet) = f.output_alphabet() {
            builder.push_record(["output labels".to_string(), alphabet.labels().len().to_string()]);
        }
    }
    if f.initial_state_id() != INVALID_STATE_ID {
        builder.push_record(["initial state".to_string(), f.initial_state_id().to_string()]);
    }
    format!(
        "{}\n{}",
        builder.build().with(tabled::settings::Style::rounded()),
        count(f)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::prelude::*;

    #[test_log::test]
    fn counts() {
        let fsa = fixtures::diamond();
        let c = count(&fsa);
        assert_eq!((c.n_states, c.n_arcs, c.n_finals), (4, 5, 1));
        assert_eq!(c.max_state_id, Some(3));
        assert_eq!(c.n_input_epsilon_arcs, 0);
        let table = info(&fsa);
        assert!(table.contains("acceptor"));
        assert!(table.contains("states"));
        assert!(!is_empty(&fsa));
        assert!(is_empty(&StaticAutomaton::new(Type::Acceptor, tropical())));
    }

    #[test]
    fn acyclic_and_linear() {
        let fsa = fixtures::diamond();
        assert!(is_acyclic(&fsa, false));
        assert!(!fsa.knows_property(PROPERTY_ACYCLIC));
        assert!(!is_linear(&fsa, true));
        assert!(fsa.knows_property(PROPERTY_LINEAR));
        assert_eq!(topological_order(&fsa).unwrap()[0], 0);
        assert_eq!(*topological_order(&fsa).unwrap().last().unwrap(), 3);

        let mut cyclic = fixtures::linear_ab();
        cyclic.state_mut(2).new_acceptor_arc(1, Weight::Real(0.0), 0);
        assert!(!is_acyclic(&cyclic, true));
        assert!(cyclic.knows_property(PROPERTY_ACYCLIC));
        assert!(topological_order(&cyclic).is_none());
        assert!(is_linear(&cyclic, false));
    }
}
