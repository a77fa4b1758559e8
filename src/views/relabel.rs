use std::rc::Rc;

use crate::alphabet::{AlphabetMapping, ConstAlphabetRef, MappingType};
use crate::automaton::{Automaton, ConstAutomatonRef, State};
use crate::config::Config;
use crate::types::*;
use crate::views::{ModifyAutomaton, SlaveAutomaton};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Input,
    Output,
}

fn relabel(
    f: ConstAutomatonRef,
    side: Side,
    alphabet: ConstAlphabetRef,
    config: &Config,
) -> ConstAutomatonRef {
    let current = match side {
        Side::Input => f.input_alphabet(),
        Side::Output => f.output_alphabet(),
    };
    let Some(current) = current else {
        tracing::warn!("{} has no {side:?} alphabet, labels are kept", f.describe());
        return change_alphabet(f, side, alphabet);
    };
    let mapping = AlphabetMapping::new(
        current,
        alphabet.clone(),
        INVALID_LABEL_ID,
        config.report_unknowns,
    );
    match mapping.kind() {
        MappingType::Identity => f,
        MappingType::Unmapped => change_alphabet(f, side, alphabet),
        MappingType::Complete | MappingType::Partial => {
            let both = f.kind() == Type::Acceptor;
            let name = match side {
                Side::Input => "map-input",
                Side::Output => "map-output",
            };
            let description = format!("{name}({})", f.describe());
            Rc::new(
                ModifyAutomaton::new(f, description, move |state: &mut State| {
                    for arc in state.arcs_mut() {
                        if both || side == Side::Input {
                            arc.input = mapping.map(arc.input);
                        }
                        if both || side == Side::Output {
                            arc.output = mapping.map(arc.output);
                        }
                    }
                    state.retain_arcs(|arc| {
                        arc.input != INVALID_LABEL_ID && arc.output != INVALID_LABEL_ID
                    });
                })
                .map_base(|base| {
                    let base = base.without_properties(PROPERTY_SORTED);
                    match side {
                        Side::Input => base.with_input_alphabet(Some(alphabet)),
                        Side::Output if both => base.with_input_alphabet(Some(alphabet)),
                        Side::Output => base.with_output_alphabet(Some(alphabet)),
                    }
                }),
            )
        }
    }
}

fn change_alphabet(
    f: ConstAutomatonRef,
    side: Side,
    alphabet: ConstAlphabetRef,
) -> ConstAutomatonRef {
    let acceptor = f.kind() == Type::Acceptor;
    let description = format!("change-alphabet({})", f.describe());
    let slave = SlaveAutomaton::new(f, description);
    Rc::new(match side {
        Side::Input => slave.with_input_alphabet(Some(alphabet)),
        Side::Output if acceptor => slave.with_input_alphabet(Some(alphabet)),
        Side::Output => slave.with_output_alphabet(Some(alphabet)),
    })
}

/// Translates the input labels of `f` into `alphabet` through their symbols. Arcs whose symbol
/// does not exist in `alphabet` are dropped. For acceptors both sides are translated.
pub fn map_input(f: ConstAutomatonRef, alphabet: ConstAlphabetRef) -> ConstAutomatonRef {
    map_input_with(f, alphabet, &Config::default())
}

/// [`map_input`] reporting at most [`Config::report_unknowns`] unknown symbols.
pub fn map_input_with(
    f: ConstAutomatonRef,
    alphabet: ConstAlphabetRef,
    config: &Config,
) -> ConstAutomatonRef {
    relabel(f, Side::Input, alphabet, config)
}

/// Translates the output labels of `f` into `alphabet`, see [`map_input`].
pub fn map_output(f: ConstAutomatonRef, alphabet: ConstAlphabetRef) -> ConstAutomatonRef {
    map_output_with(f, alphabet, &Config::default())
}

/// [`map_output`] reporting at most [`Config::report_unknowns`] unknown symbols.
pub fn map_output_with(
    f: ConstAutomatonRef,
    alphabet: ConstAlphabetRef,
    config: &Config,
) -> ConstAutomatonRef {
    relabel(f, Side::Output, alphabet, config)
}

/// Replaces the input alphabet reference without touching any label.
pub fn change_input_alphabet(
    f: ConstAutomatonRef,
    alphabet: ConstAlphabetRef,
) -> ConstAutomatonRef {
    change_alphabet(f, Side::Input, alphabet)
}

/// Replaces the output alphabet reference without touching any label.
pub fn change_output_alphabet(
    f: ConstAutomatonRef,
    alphabet: ConstAlphabetRef,
) -> ConstAutomatonRef {
    change_alphabet(f, Side::Output, alphabet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::prelude::*;

    #[test_log::test]
    fn map_through_symbols() {
        // a=0 b=1 in the fixture, the target has b=0 and no a
        let target = fixtures::alphabet(&["b", "c"]);
        let mapped = map_input(fixtures::linear_ab().into_ref(), target.clone());
        assert_eq!(mapped.get_state(0).unwrap().n_arcs(), 0);
        let arc = mapped.get_state(1).unwrap()[0];
        assert_eq!((arc.input, arc.output), (0, 0));
        assert!(Rc::ptr_eq(&mapped.input_alphabet().unwrap(), &target));
        assert!(Rc::ptr_eq(&mapped.output_alphabet().unwrap(), &target));
    }

    #[test]
    fn unchanged_ids_only_swap_the_alphabet() {
        let f = fixtures::linear_ab().into_ref();
        let same = fixtures::alphabet(&["a", "b", "c"]);
        let mapped = map_output(f.clone(), same.clone());
        assert_eq!(mapped.get_state(0), f.get_state(0));
        assert!(Rc::ptr_eq(&mapped.input_alphabet().unwrap(), &same));
        let identical = map_input(f.clone(), f.input_alphabet().unwrap());
        assert!(Rc::ptr_eq(&identical, &f));
    }

    #[test]
    fn change_keeps_labels() {
        let f = fixtures::linear_ab().into_ref();
        let other = fixtures::alphabet(&["x"]);
        let changed = change_input_alphabet(f.clone(), other.clone());
        assert_eq!(changed.get_state(1), f.get_state(1));
        assert_eq!(changed.input_alphabet().unwrap().symbol(0).as_deref(), Some("x"));
    }
}
