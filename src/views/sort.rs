use std::cmp::Ordering;
use std::rc::Rc;

use crate::automaton::{Arc, Automaton, ConstAutomatonRef, State};
use crate::semiring::ConstSemiringRef;
use crate::types::*;
use crate::views::ModifyAutomaton;

/// The orders arcs can be sorted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortType {
    /// By input label.
    ByInput,
    /// By output label.
    ByOutput,
    /// By input label, then output label.
    ByInputAndOutput,
    /// By input label, then target.
    ByInputAndTarget,
    /// By input label, output label and target.
    ByArc,
    /// By weight, best first.
    ByWeight,
}

impl SortType {
    fn name(self) -> &'static str {
        match self {
            SortType::ByInput => "input",
            SortType::ByOutput => "output",
            SortType::ByInputAndOutput => "input-and-output",
            SortType::ByInputAndTarget => "input-and-target",
            SortType::ByArc => "arc",
            SortType::ByWeight => "weight",
        }
    }

    /// The properties that hold after sorting an automaton of type `kind` this way.
    pub fn properties(self, kind: Type) -> Property {
        let properties = match self {
            SortType::ByInput | SortType::ByInputAndTarget => PROPERTY_SORTED_BY_INPUT,
            SortType::ByOutput => PROPERTY_SORTED_BY_OUTPUT,
            SortType::ByInputAndOutput => {
                PROPERTY_SORTED_BY_INPUT | PROPERTY_SORTED_BY_INPUT_AND_OUTPUT
            }
            SortType::ByArc => {
                PROPERTY_SORTED_BY_INPUT
                    | PROPERTY_SORTED_BY_INPUT_AND_OUTPUT
                    | PROPERTY_SORTED_BY_ARC
            }
            SortType::ByWeight => PROPERTY_SORTED_BY_WEIGHT,
        };
        if kind == Type::Acceptor && properties & PROPERTY_SORTED_BY_INPUT != 0 {
            properties | PROPERTY_SORTED_BY_OUTPUT
        } else {
            properties
        }
    }

    /// Whether an automaton with these properties is known to be sorted this way.
    fn holds_for(self, f: &dyn Automaton) -> bool {
        match self {
            // there is no property for this order
            SortType::ByInputAndTarget => f.has_property(PROPERTY_SORTED_BY_ARC)
                && f.kind() == Type::Acceptor,
            _ => {
                let wanted = self.properties(Type::Transducer);
                f.properties().known() & f.properties().values() & wanted == wanted
                    || (self == SortType::ByOutput
                        && f.kind() == Type::Acceptor
                        && f.has_property(PROPERTY_SORTED_BY_INPUT))
            }
        }
    }

    /// Compares two arcs in this order.
    pub fn compare(self, semiring: ConstSemiringRef, a: &Arc, b: &Arc) -> Ordering {
        match self {
            SortType::ByInput => a.input.cmp(&b.input),
            SortType::ByOutput => a.output.cmp(&b.output),
            SortType::ByInputAndOutput => (a.input, a.output).cmp(&(b.input, b.output)),
            SortType::ByInputAndTarget => (a.input, a.target).cmp(&(b.input, b.target)),
            SortType::ByArc => {
                (a.input, a.output, a.target).cmp(&(b.input, b.output, b.target))
            }
            SortType::ByWeight => semiring.compare(a.weight, b.weight),
        }
    }
}

/// Sorts the arcs of `state` in place.
pub fn sort_arcs(state: &mut State, sort_type: SortType, semiring: ConstSemiringRef) {
    state.sort_arcs_by(|a, b| sort_type.compare(semiring, a, b));
}

/// Sorts the arcs of every state of `f`. If `f` is known to be sorted already, it is returned
/// unchanged.
pub fn sort(f: ConstAutomatonRef, sort_type: SortType) -> ConstAutomatonRef {
    if sort_type.holds_for(f.as_ref()) {
        return f;
    }
    let semiring = f.semiring();
    let properties = sort_type.properties(f.kind());
    let description = format!("sort({},{})", f.describe(), sort_type.name());
    Rc::new(
        ModifyAutomaton::new(f, description, move |state: &mut State| {
            sort_arcs(state, sort_type, semiring)
        })
        .map_base(|base| {
            base.without_properties(PROPERTY_SORTED)
                .with_properties(properties, properties)
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::prelude::*;

    fn unsorted() -> ConstAutomatonRef {
        StaticAutomaton::builder(Type::Transducer, tropical())
            .with_alphabet(fixtures::alphabet(&["a", "b", "c"]))
            .with_transducer_arcs([
                (0, 1, 2, 0, 1.0),
                (0, 2, 0, 1, 3.0),
                (0, 1, 1, 2, 0.5),
                (0, 2, 0, 0, 2.0),
            ])
            .with_finals([(1, 0.0), (2, 0.0)])
            .build()
            .into_ref()
    }

    fn column(f: &ConstAutomatonRef, g: fn(&Arc) -> LabelId) -> Vec<LabelId> {
        f.get_state(0).unwrap().iter().map(g).collect()
    }

    #[test]
    fn sort_orders() {
        let f = unsorted();
        let by_input = sort(f.clone(), SortType::ByInput);
        assert_eq!(column(&by_input, |a| a.input), vec![0, 0, 1, 2]);
        // stable
        assert_eq!(column(&by_input, |a| a.output), vec![1, 0, 2, 0]);
        assert!(by_input.has_property(PROPERTY_SORTED_BY_INPUT));
        assert!(!by_input.has_property(PROPERTY_SORTED_BY_OUTPUT));

        let by_output = sort(f.clone(), SortType::ByOutput);
        assert_eq!(column(&by_output, |a| a.output), vec![0, 0, 1, 2]);

        let by_arc = sort(f.clone(), SortType::ByArc);
        assert_eq!(column(&by_arc, |a| a.output), vec![0, 1, 2, 0]);

        let by_weight = sort(f, SortType::ByWeight);
        let weights: Vec<f32> = by_weight
            .get_state(0)
            .unwrap()
            .iter()
            .map(|a| a.weight.value())
            .collect();
        assert_eq!(weights, vec![0.5, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn sorting_twice_is_a_no_op() {
        let once = sort(unsorted(), SortType::ByArc);
        let twice = sort(once.clone(), SortType::ByInput);
        assert!(Rc::ptr_eq(&once, &twice));
        let output = sort(once.clone(), SortType::ByOutput);
        assert!(!Rc::ptr_eq(&once, &output));
        assert!(!output.has_property(PROPERTY_SORTED_BY_INPUT));
    }

    #[test]
    fn acceptors_sorted_by_input_are_sorted_by_output() {
        let f = sort(fixtures::diamond().into_ref(), SortType::ByInput);
        assert!(f.has_property(PROPERTY_SORTED_BY_OUTPUT));
        assert!(Rc::ptr_eq(&sort(f.clone(), SortType::ByOutput), &f));
    }
}
