use std::rc::Rc;

use crate::automaton::{Automaton, ConstAutomatonRef, State};
use crate::types::*;
use crate::views::ModifyAutomaton;

/// Keeps the sort properties that survive when labels are copied from one side to the other.
fn projected_properties(f: &ConstAutomatonRef, kept: Property) -> (Property, Property) {
    let properties = f.properties();
    let sorted = properties.known() & properties.values() & kept;
    let known = if sorted != 0 {
        sorted | PROPERTY_SORTED_BY_INPUT | PROPERTY_SORTED_BY_OUTPUT
    } else {
        sorted
    };
    (known, known)
}

/// Turns `f` into the acceptor of its input labels.
pub fn project_input(f: ConstAutomatonRef) -> ConstAutomatonRef {
    if f.kind() == Type::Acceptor {
        return f;
    }
    let (known, values) = projected_properties(&f, PROPERTY_SORTED_BY_INPUT);
    let description = format!("project-input({})", f.describe());
    Rc::new(
        ModifyAutomaton::new(f, description, |state: &mut State| {
            for arc in state.arcs_mut() {
                arc.output = arc.input;
            }
        })
        .map_base(|base| {
            let alphabet = base.input_alphabet();
            base.with_kind(Type::Acceptor)
                .with_output_alphabet(alphabet)
                .without_properties(PROPERTY_SORTED)
                .with_properties(known, values)
        }),
    )
}

/// Turns `f` into the acceptor of its output labels.
pub fn project_output(f: ConstAutomatonRef) -> ConstAutomatonRef {
    if f.kind() == Type::Acceptor {
        return f;
    }
    let (known, values) = projected_properties(&f, PROPERTY_SORTED_BY_OUTPUT);
    let description = format!("project-output({})", f.describe());
    Rc::new(
        ModifyAutomaton::new(f, description, |state: &mut State| {
            for arc in state.arcs_mut() {
                arc.input = arc.output;
            }
        })
        .map_base(|base| {
            let alphabet = base.output_alphabet();
            base.with_kind(Type::Acceptor)
                .with_input_alphabet(alphabet)
                .without_properties(PROPERTY_SORTED)
                .with_properties(known, values)
        }),
    )
}

/// Swaps input and output labels.
pub fn invert(f: ConstAutomatonRef) -> ConstAutomatonRef {
    if f.kind() == Type::Acceptor {
        return f;
    }
    let properties = f.properties();
    let sorted = properties.known() & properties.values();
    let mut swapped = PROPERTY_NONE;
    if sorted & PROPERTY_SORTED_BY_INPUT != 0 {
        swapped |= PROPERTY_SORTED_BY_OUTPUT;
    }
    if sorted & PROPERTY_SORTED_BY_OUTPUT != 0 {
        swapped |= PROPERTY_SORTED_BY_INPUT;
    }
    let description = format!("invert({})", f.describe());
    Rc::new(
        ModifyAutomaton::new(f, description, |state: &mut State| {
            for arc in state.arcs_mut() {
                std::mem::swap(&mut arc.input, &mut arc.output);
            }
        })
        .map_base(|base| {
            let input = base.input_alphabet();
            let output = base.output_alphabet();
            base.with_input_alphabet(output)
                .with_output_alphabet(input)
                .without_properties(PROPERTY_SORTED)
                .with_properties(swapped, swapped)
        }),
    )
}

#[cfg(test)]
mod tests {
    use crate::fixtures;
    use crate::prelude::*;
    use crate::views::invert;
    use std::rc::Rc;

    fn transducer() -> ConstAutomatonRef {
        StaticAutomaton::builder(Type::Transducer, tropical())
            .with_alphabets(
                fixtures::alphabet(&["a", "b"]),
                fixtures::alphabet(&["x", "y", "z"]),
            )
            .with_transducer_arcs([(0, 1, 0, 2, 1.0), (1, 2, 1, 0, 1.0)])
            .with_finals([(2, 0.0)])
            .build()
            .into_ref()
    }

    #[test]
    fn projections() {
        let f = transducer();
        let input = project_input(f.clone());
        assert_eq!(input.kind(), Type::Acceptor);
        let arc = input.get_state(0).unwrap()[0];
        assert_eq!((arc.input, arc.output), (0, 0));
        assert_eq!(input.output_alphabet().unwrap().symbol(0).as_deref(), Some("a"));

        let output = project_output(f.clone());
        let arc = output.get_state(0).unwrap()[0];
        assert_eq!((arc.input, arc.output), (2, 2));
        assert_eq!(output.input_alphabet().unwrap().symbol(2).as_deref(), Some("z"));

        let acceptor = fixtures::linear_ab().into_ref();
        assert!(Rc::ptr_eq(&project_input(acceptor.clone()), &acceptor));
    }

    #[test]
    fn invert_swaps_sides() {
        let f = sort(transducer(), SortType::ByInput);
        let inverted = invert(f);
        let arc = inverted.get_state(1).unwrap()[0];
        assert_eq!((arc.input, arc.output), (0, 1));
        assert!(inverted.has_property(PROPERTY_SORTED_BY_OUTPUT));
        assert!(!inverted.has_property(PROPERTY_SORTED_BY_INPUT));
        assert_eq!(inverted.input_alphabet().unwrap().symbol(1).as_deref(), Some("y"));
    }
}
