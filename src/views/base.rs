use std::fmt;

use crate::alphabet::ConstAlphabetRef;
use crate::automaton::{Automaton, ConstAutomatonRef, ConstStateRef, Properties, State};
use crate::semiring::ConstSemiringRef;
use crate::types::*;

/// Forwards everything to the automaton it wraps, except for the capabilities that were
/// overridden through one of the `with_*` methods.
pub struct SlaveAutomaton {
    fsa: ConstAutomatonRef,
    properties: Properties,
    kind: Type,
    semiring: ConstSemiringRef,
    initial: Option<StateId>,
    input_alphabet: Option<ConstAlphabetRef>,
    output_alphabet: Option<ConstAlphabetRef>,
    description: String,
}

impl SlaveAutomaton {
    /// Wraps `fsa`. The properties of `fsa` are inherited, except for those describing the
    /// representation.
    pub fn new<S: Into<String>>(fsa: ConstAutomatonRef, description: S) -> Self {
        let properties = Properties::copied(
            fsa.properties(),
            PROPERTY_ALL & !(PROPERTY_STORAGE | PROPERTY_CACHED),
        );
        Self {
            kind: fsa.kind(),
            semiring: fsa.semiring(),
            input_alphabet: fsa.input_alphabet(),
            output_alphabet: fsa.output_alphabet(),
            properties,
            initial: None,
            description: description.into(),
            fsa,
        }
    }

    /// The wrapped automaton.
    pub fn upstream(&self) -> &ConstAutomatonRef {
        &self.fsa
    }

    /// Overrides the type.
    pub fn with_kind(mut self, kind: Type) -> Self {
        self.kind = kind;
        self
    }

    /// Overrides the semiring.
    pub fn with_semiring(mut self, semiring: ConstSemiringRef) -> Self {
        self.semiring = semiring;
        self
    }

    /// Overrides the initial state.
    pub fn with_initial(mut self, s: StateId) -> Self {
        self.initial = Some(s);
        self
    }

    /// Overrides the input alphabet.
    pub fn with_input_alphabet(mut self, alphabet: Option<ConstAlphabetRef>) -> Self {
        self.input_alphabet = alphabet;
        self
    }

    /// Overrides the output alphabet.
    pub fn with_output_alphabet(mut self, alphabet: Option<ConstAlphabetRef>) -> Self {
        self.output_alphabet = alphabet;
        self
    }

    /// Declares the properties in `known` with the given values.
    pub fn with_properties(self, known: Property, values: Property) -> Self {
        self.properties.set(known, values);
        self
    }

    /// Forgets the given properties.
    pub fn without_properties(self, properties: Property) -> Self {
        self.properties.unset(properties);
        self
    }
}

impl Automaton for SlaveAutomaton {
    fn kind(&self) -> Type {
        self.kind
    }

    fn properties(&self) -> &Properties {
        &self.properties
    }

    fn semiring(&self) -> ConstSemiringRef {
        self.semiring
    }

    fn initial_state_id(&self) -> StateId {
        self.initial.unwrap_or_else(|| self.fsa.initial_state_id())
    }

    fn input_alphabet(&self) -> Option<ConstAlphabetRef> {
        self.input_alphabet.clone()
    }

    fn output_alphabet(&self) -> Option<ConstAlphabetRef> {
        match self.kind {
            Type::Acceptor => self.input_alphabet.clone(),
            _ => self.output_alphabet.clone(),
        }
    }

    fn get_state(&self, s: StateId) -> Option<ConstStateRef> {
        self.fsa.get_state(s)
    }

    fn dump_state(&self, s: StateId, out: &mut dyn fmt::Write) -> fmt::Result {
        self.fsa.dump_state(s, out)
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

/// A view with the state ids of its upstream automaton whose states are edited copies of the
/// upstream states.
pub struct ModifyAutomaton {
    base: SlaveAutomaton,
    modify: Box<dyn Fn(&mut State)>,
}

impl ModifyAutomaton {
    /// Applies `modify` to a copy of every state of `fsa` that is requested. The sort properties
    /// of `fsa` are kept; views that may break them have to remove them.
    pub fn new<S, F>(fsa: ConstAutomatonRef, description: S, modify: F) -> Self
    where
        S: Into<String>,
        F: Fn(&mut State) + 'static,
    {
        Self {
            base: SlaveAutomaton::new(fsa, description),
            modify: Box::new(modify),
        }
    }

    /// Changes the forwarded capabilities, see [`SlaveAutomaton`].
    pub fn map_base<F: FnOnce(SlaveAutomaton) -> SlaveAutomaton>(self, f: F) -> Self {
        Self {
            base: f(self.base),
            modify: self.modify,
        }
    }
}

impl Automaton for ModifyAutomaton {
    fn kind(&self) -> Type {
        self.base.kind()
    }

    fn properties(&self) -> &Properties {
        self.base.properties()
    }

    fn semiring(&self) -> ConstSemiringRef {
        self.base.semiring()
    }

    fn initial_state_id(&self) -> StateId {
        self.base.initial_state_id()
    }

    fn input_alphabet(&self) -> Option<ConstAlphabetRef> {
        self.base.input_alphabet()
    }

    fn output_alphabet(&self) -> Option<ConstAlphabetRef> {
        self.base.output_alphabet()
    }

    fn get_state(&self, s: StateId) -> Option<ConstStateRef> {
        let sp = self.base.upstream().get_state(s)?;
        let mut state = State::clone(&sp);
        (self.modify)(&mut state);
        Some(std::rc::Rc::new(state))
    }

    fn dump_state(&self, s: StateId, out: &mut dyn fmt::Write) -> fmt::Result {
        self.base.dump_state(s, out)
    }

    fn describe(&self) -> String {
        self.base.describe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::prelude::*;
    use std::rc::Rc;

    #[test]
    fn slave_overrides() {
        let fsa = fixtures::linear_ab().into_ref();
        let slave = SlaveAutomaton::new(fsa.clone(), "slave")
            .with_semiring(log())
            .with_initial(1);
        assert_eq!(slave.semiring().kind(), SemiringType::Log);
        assert_eq!(slave.initial_state_id(), 1);
        assert!(!slave.has_property(PROPERTY_STORAGE));
        assert_eq!(slave.get_state(1), fsa.get_state(1));
        assert_eq!(slave.describe(), "slave");
    }

    #[test]
    fn modify_edits_copies() {
        let fsa = fixtures::linear_ab().into_ref();
        let modified = ModifyAutomaton::new(fsa.clone(), "drop arcs", |state: &mut State| {
            state.retain_arcs(|_| false)
        });
        assert_eq!(modified.get_state(0).unwrap().n_arcs(), 0);
        assert_eq!(fsa.get_state(0).unwrap().n_arcs(), 1);
        let modified: ConstAutomatonRef = Rc::new(modified);
        assert_eq!(modified.initial_state_id(), 0);
    }
}
