use std::collections::VecDeque;
use std::rc::Rc;

use crate::alphabet::ConstAlphabetRef;
use crate::automaton::{Automaton, ConstAutomatonRef, ConstStateRef, Properties, State};
use crate::semiring::{ConstSemiringRef, Weight};
use crate::types::*;

mod packed;
pub use packed::{packed_copy, PackedAutomaton};

/// An automaton whose states are kept in a vector. This is the representation algorithms
/// materialize their results into, and the one that can be modified state by state.
#[derive(Debug, Clone)]
pub struct StaticAutomaton {
    kind: Type,
    semiring: ConstSemiringRef,
    properties: Properties,
    initial: StateId,
    input_alphabet: Option<ConstAlphabetRef>,
    output_alphabet: Option<ConstAlphabetRef>,
    states: Vec<Option<ConstStateRef>>,
    description: String,
}

impl StaticAutomaton {
    /// Creates an automaton without states.
    pub fn new(kind: Type, semiring: ConstSemiringRef) -> Self {
        Self {
            kind,
            semiring,
            properties: Properties::with(PROPERTY_STORAGE, PROPERTY_STORAGE),
            initial: INVALID_STATE_ID,
            input_alphabet: None,
            output_alphabet: None,
            states: Vec::new(),
            description: "static".to_string(),
        }
    }

    /// Returns a builder, convenient for constructing small automata by hand.
    pub fn builder(kind: Type, semiring: ConstSemiringRef) -> AutomatonBuilder {
        AutomatonBuilder {
            fsa: Self::new(kind, semiring),
        }
    }

    /// Changes the type.
    pub fn set_kind(&mut self, kind: Type) {
        self.kind = kind;
    }

    /// Changes the semiring. Weights are not converted.
    pub fn set_semiring(&mut self, semiring: ConstSemiringRef) {
        self.semiring = semiring;
    }

    /// Sets the initial state.
    pub fn set_initial_state_id(&mut self, s: StateId) {
        self.initial = s;
    }

    /// Sets the input alphabet. For acceptors this is also the output alphabet.
    pub fn set_input_alphabet(&mut self, alphabet: Option<ConstAlphabetRef>) {
        self.input_alphabet = alphabet;
    }

    /// Sets the output alphabet.
    pub fn set_output_alphabet(&mut self, alphabet: Option<ConstAlphabetRef>) {
        self.output_alphabet = alphabet;
    }

    /// Sets the description returned by [`Automaton::describe`].
    pub fn set_description<S: Into<String>>(&mut self, description: S) {
        self.description = description.into();
    }

    /// Adds a non-final state with the next free id.
    pub fn new_state(&mut self) -> StateId {
        let id = self.states.len() as StateId;
        self.set_state(State::new(id));
        id
    }

    /// Adds a final state with the next free id.
    pub fn new_final_state(&mut self, weight: Weight) -> StateId {
        let id = self.states.len() as StateId;
        self.set_state(State::new_final(id, weight));
        id
    }

    /// Stores `state` under its id, replacing a previous state with the same id.
    pub fn set_state(&mut self, state: State) {
        let id = state.id() as usize;
        assert!(id as StateId <= MAX_STATE_ID, "state id {id} out of range");
        if id >= self.states.len() {
            self.states.resize(id + 1, None);
        }
        self.states[id] = Some(Rc::new(state));
        self.properties.unset(PROPERTY_SORTED | PROPERTY_ACYCLIC | PROPERTY_LINEAR);
    }

    /// Mutable access to state `s`, which has to exist.
    pub fn state_mut(&mut self, s: StateId) -> &mut State {
        self.properties.unset(PROPERTY_SORTED | PROPERTY_ACYCLIC | PROPERTY_LINEAR);
        let state = self
            .states
            .get_mut(s as usize)
            .and_then(Option::as_mut)
            .unwrap_or_else(|| panic!("state {s} does not exist"));
        Rc::make_mut(state)
    }

    /// Removes state `s`. Arcs pointing to it are left dangling.
    pub fn delete_state(&mut self, s: StateId) {
        if let Some(slot) = self.states.get_mut(s as usize) {
            *slot = None;
        }
    }

    /// One past the largest state id.
    pub fn size(&self) -> StateId {
        self.states.len() as StateId
    }

    /// Iterates over all states present.
    pub fn states(&self) -> impl Iterator<Item = &ConstStateRef> + '_ {
        self.states.iter().flatten()
    }

    /// Wraps the automaton into a shared reference.
    pub fn into_ref(self) -> ConstAutomatonRef {
        Rc::new(self)
    }
}

impl Automaton for StaticAutomaton {
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
        self.initial
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
        self.states.get(s as usize).cloned().flatten()
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

/// Builds a [`StaticAutomaton`] from lists of arcs and final states.
#[derive(Debug, Clone)]
pub struct AutomatonBuilder {
    fsa: StaticAutomaton,
}

impl AutomatonBuilder {
    fn ensure_state(&mut self, s: StateId) {
        if self.fsa.get_state(s).is_none() {
            self.fsa.set_state(State::new(s));
        }
    }

    /// Sets the alphabet used for input and output labels.
    pub fn with_alphabet(mut self, alphabet: ConstAlphabetRef) -> Self {
        self.fsa.set_input_alphabet(Some(alphabet.clone()));
        self.fsa.set_output_alphabet(Some(alphabet));
        self
    }

    /// Sets input and output alphabet separately.
    pub fn with_alphabets(mut self, input: ConstAlphabetRef, output: ConstAlphabetRef) -> Self {
        self.fsa.set_input_alphabet(Some(input));
        self.fsa.set_output_alphabet(Some(output));
        self
    }

    /// Adds acceptor arcs `(from, to, label, weight)`.
    pub fn with_arcs<W, I>(self, arcs: I) -> Self
    where
        W: Into<Weight>,
        I: IntoIterator<Item = (StateId, StateId, LabelId, W)>,
    {
        self.with_transducer_arcs(
            arcs.into_iter()
                .map(|(from, to, label, weight)| (from, to, label, label, weight)),
        )
    }

    /// Adds arcs `(from, to, input, output, weight)`.
    pub fn with_transducer_arcs<W, I>(mut self, arcs: I) -> Self
    where
        W: Into<Weight>,
        I: IntoIterator<Item = (StateId, StateId, LabelId, LabelId, W)>,
    {
        for (from, to, input, output, weight) in arcs {
            self.ensure_state(from);
            self.ensure_state(to);
            self.fsa
                .state_mut(from)
                .new_arc(to, weight.into(), input, output);
        }
        self
    }

    /// Makes the given states final.
    pub fn with_finals<W, I>(mut self, finals: I) -> Self
    where
        W: Into<Weight>,
        I: IntoIterator<Item = (StateId, W)>,
    {
        for (s, weight) in finals {
            self.ensure_state(s);
            self.fsa.state_mut(s).set_final(weight.into());
        }
        self
    }

    /// Sets the initial state. Defaults to state 0 if it exists.
    pub fn with_initial(mut self, s: StateId) -> Self {
        self.ensure_state(s);
        self.fsa.set_initial_state_id(s);
        self
    }

    /// Finishes the automaton.
    pub fn build(mut self) -> StaticAutomaton {
        if self.fsa.initial_state_id() == INVALID_STATE_ID && self.fsa.get_state(0).is_some() {
            self.fsa.set_initial_state_id(0);
        }
        self.fsa
    }
}

/// Materializes all states reachable from the initial state, keeping their ids.
pub fn static_copy(f: &dyn Automaton) -> StaticAutomaton {
    let mut copy = StaticAutomaton::new(f.kind(), f.semiring());
    copy.set_input_alphabet(f.input_alphabet());
    copy.set_output_alphabet(f.output_alphabet());
    copy.set_description(format!("static({})", f.describe()));
    let initial = f.initial_state_id();
    if initial != INVALID_STATE_ID {
        let mut seen = bit_set::BitSet::new();
        let mut queue = VecDeque::from([initial]);
        seen.insert(initial as usize);
        while let Some(s) = queue.pop_front() {
            let Some(sp) = f.get_state(s) else {
                tracing::warn!("state {s} announced but not available");
                continue;
            };
            for arc in sp.iter() {
                if seen.insert(arc.target as usize) {
                    queue.push_back(arc.target);
                }
            }
            copy.set_state(State::clone(&sp));
        }
        copy.set_initial_state_id(initial);
    }
    copy.properties.set(
        f.properties().known() & !(PROPERTY_CACHED | PROPERTY_STORAGE),
        f.properties().values(),
    );
    copy.properties.add(PROPERTY_STORAGE);
    copy
}

/// Like [`static_copy`], but returns a shared reference and leaves storage automata as they are.
pub fn static_copy_ref(f: ConstAutomatonRef) -> ConstAutomatonRef {
    if f.has_property(PROPERTY_STORAGE) {
        return f;
    }
    Rc::new(static_copy(f.as_ref()))
}
