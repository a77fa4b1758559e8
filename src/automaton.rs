//! The automaton interface. An [`Automaton`] hands out [`State`]s on demand; each state knows its
//! id, whether it is final (and with which weight) and its outgoing [`Arc`]s.
//!
//! Automata are shared through [`ConstAutomatonRef`], a reference counted trait object. Lazy
//! automata hold such references to the automata they are computed from, so a chain of
//! operations forms a DAG that only ever points upstream.
use std::cell::Cell;
use std::cmp::Ordering;
use std::fmt::{self, Debug, Write};
use std::rc::{Rc, Weak};

use crate::alphabet::ConstAlphabetRef;
use crate::semiring::{ConstSemiringRef, Weight};
use crate::types::*;

/// A transition between two states.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arc {
    /// Id of the state the arc leads to.
    pub target: StateId,
    /// Weight of the arc.
    pub weight: Weight,
    /// Input label.
    pub input: LabelId,
    /// Output label, identical to `input` for acceptors.
    pub output: LabelId,
}

impl Arc {
    /// Creates a new arc.
    pub fn new(target: StateId, weight: Weight, input: LabelId, output: LabelId) -> Self {
        Self {
            target,
            weight,
            input,
            output,
        }
    }

    /// Creates an arc whose output label equals its input label.
    pub fn acceptor(target: StateId, weight: Weight, label: LabelId) -> Self {
        Self::new(target, weight, label, label)
    }
}

/// A state together with its outgoing arcs. The id and the tags (e.g. [`STATE_TAG_FINAL`]) are
/// stored in a single word.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    id_and_tags: StateId,
    /// The final weight. Only meaningful if the state is final.
    pub weight: Weight,
    arcs: Vec<Arc>,
}

/// Shared, immutable state as returned by [`Automaton::get_state`].
pub type ConstStateRef = Rc<State>;

impl State {
    /// Creates a non-final state without arcs.
    pub fn new(id: StateId) -> Self {
        Self::with_tags(id, STATE_TAG_NONE, Weight::Invalid)
    }

    /// Creates a state with the given tags and weight.
    pub fn with_tags(id: StateId, tags: StateTag, weight: Weight) -> Self {
        Self {
            id_and_tags: (id & STATE_ID_MASK) | (tags & STATE_TAG_MASK),
            weight,
            arcs: Vec::new(),
        }
    }

    /// Creates a final state with the given final weight.
    pub fn new_final(id: StateId, weight: Weight) -> Self {
        Self::with_tags(id, STATE_TAG_FINAL, weight)
    }

    /// The id of the state.
    pub fn id(&self) -> StateId {
        self.id_and_tags & STATE_ID_MASK
    }

    /// Changes the id, keeping the tags.
    pub fn set_id(&mut self, id: StateId) {
        self.id_and_tags = (id & STATE_ID_MASK) | (self.id_and_tags & STATE_TAG_MASK);
    }

    /// The tag bits.
    pub fn tags(&self) -> StateTag {
        self.id_and_tags & STATE_TAG_MASK
    }

    /// Id and tags in one word, as stored in the binary format.
    pub fn id_and_tags(&self) -> StateId {
        self.id_and_tags
    }

    /// Adds tags.
    pub fn add_tags(&mut self, tags: StateTag) {
        assert_eq!(tags & STATE_ID_MASK, 0, "tags overlap the state id");
        self.id_and_tags |= tags;
    }

    /// Replaces all tags.
    pub fn set_tags(&mut self, tags: StateTag) {
        assert_eq!(tags & STATE_ID_MASK, 0, "tags overlap the state id");
        self.id_and_tags = (self.id_and_tags & STATE_ID_MASK) | tags;
    }

    /// Removes tags.
    pub fn unset_tags(&mut self, tags: StateTag) {
        self.id_and_tags &= !(tags & STATE_TAG_MASK);
    }

    /// Returns true if all given tags are set.
    pub fn has_tags(&self, tags: StateTag) -> bool {
        self.id_and_tags & tags == tags
    }

    /// Whether the state is final.
    pub fn is_final(&self) -> bool {
        self.has_tags(STATE_TAG_FINAL)
    }

    /// Makes the state final with the given weight.
    pub fn set_final(&mut self, weight: Weight) {
        self.add_tags(STATE_TAG_FINAL);
        self.weight = weight;
    }

    /// Makes the state non-final.
    pub fn unset_final(&mut self) {
        self.unset_tags(STATE_TAG_FINAL);
        self.weight = Weight::Invalid;
    }

    /// The outgoing arcs.
    pub fn arcs(&self) -> &[Arc] {
        &self.arcs
    }

    /// Mutable access to the outgoing arcs.
    pub fn arcs_mut(&mut self) -> &mut Vec<Arc> {
        &mut self.arcs
    }

    /// Iterates over the outgoing arcs.
    pub fn iter(&self) -> std::slice::Iter<'_, Arc> {
        self.arcs.iter()
    }

    /// Number of outgoing arcs.
    pub fn n_arcs(&self) -> usize {
        self.arcs.len()
    }

    /// Returns true if the state has no outgoing arcs.
    pub fn has_arcs(&self) -> bool {
        !self.arcs.is_empty()
    }

    /// Appends an arc.
    pub fn new_arc(&mut self, target: StateId, weight: Weight, input: LabelId, output: LabelId) {
        self.arcs.push(Arc::new(target, weight, input, output));
    }

    /// Appends an arc whose output equals its input.
    pub fn new_acceptor_arc(&mut self, target: StateId, weight: Weight, label: LabelId) {
        self.arcs.push(Arc::acceptor(target, weight, label));
    }

    /// Keeps only the arcs for which `keep` returns true.
    pub fn retain_arcs<F: FnMut(&Arc) -> bool>(&mut self, keep: F) {
        self.arcs.retain(keep);
    }

    /// Sorts the arcs with the given comparison. The sort is stable.
    pub fn sort_arcs_by<F: FnMut(&Arc, &Arc) -> Ordering>(&mut self, compare: F) {
        self.arcs.sort_by(compare);
    }
}

impl std::ops::Index<usize> for State {
    type Output = Arc;
    fn index(&self, index: usize) -> &Self::Output {
        &self.arcs[index]
    }
}

impl<'a> IntoIterator for &'a State {
    type Item = &'a Arc;
    type IntoIter = std::slice::Iter<'a, Arc>;
    fn into_iter(self) -> Self::IntoIter {
        self.arcs.iter()
    }
}

/// Properties of an automaton, split into a mask of properties whose value is known and the
/// values themselves. Both are stored in cells so that algorithms can record properties they
/// established on shared automata.
#[derive(Debug, Default, Clone)]
pub struct Properties {
    known: Cell<Property>,
    values: Cell<Property>,
}

impl Properties {
    /// No property is known.
    pub fn new() -> Self {
        Self::default()
    }

    /// Properties with the given known mask and values.
    pub fn with(known: Property, values: Property) -> Self {
        let properties = Self::new();
        properties.set(known, values);
        properties
    }

    /// Copies the properties of `other` selected by `mask`.
    pub fn copied(other: &Properties, mask: Property) -> Self {
        Self::with(other.known() & mask, other.values() & mask)
    }

    /// Declares properties as known and set.
    pub fn add(&self, properties: Property) {
        self.known.set(self.known.get() | properties);
        self.values.set(self.values.get() | properties);
    }

    /// Declares `known` as known, with the values given by `values`.
    pub fn set(&self, known: Property, values: Property) {
        self.known.set(self.known.get() | known);
        self.values.set((self.values.get() & !known) | (known & values));
    }

    /// Declares properties as unknown.
    pub fn unset(&self, properties: Property) {
        self.known.set(self.known.get() & !properties);
        self.values.set(self.values.get() & !properties);
    }

    /// The mask of known properties.
    pub fn known(&self) -> Property {
        self.known.get()
    }

    /// The property values. Only meaningful where [`Properties::known`] is set.
    pub fn values(&self) -> Property {
        self.values.get()
    }

    /// Whether the value of `property` is known.
    pub fn knows(&self, property: Property) -> bool {
        self.known.get() & property != 0
    }

    /// Whether `property` is known to hold. Never computes anything.
    pub fn has(&self, property: Property) -> bool {
        self.known.get() & self.values.get() & property != 0
    }
}

/// The capability every automaton provides.
///
/// States are requested by id through [`Automaton::get_state`]; ids that have been reported by
/// the automaton itself (as initial state or as arc target) always yield a state. Repeated
/// calls with the same id yield equal states.
pub trait Automaton {
    /// Whether the automaton is an acceptor or a transducer.
    fn kind(&self) -> Type;

    /// The properties of the automaton.
    fn properties(&self) -> &Properties;

    /// The semiring the weights are interpreted in.
    fn semiring(&self) -> ConstSemiringRef;

    /// The initial state, [`INVALID_STATE_ID`] for the empty automaton.
    fn initial_state_id(&self) -> StateId {
        INVALID_STATE_ID
    }

    /// The input alphabet, if any.
    fn input_alphabet(&self) -> Option<ConstAlphabetRef>;

    /// The output alphabet. Acceptors return their input alphabet.
    fn output_alphabet(&self) -> Option<ConstAlphabetRef> {
        self.input_alphabet()
    }

    /// Returns the state with the given id or `None` if there is no such state.
    fn get_state(&self, s: StateId) -> Option<ConstStateRef>;

    /// Writes a human readable name of state `s`.
    fn dump_state(&self, s: StateId, out: &mut dyn Write) -> fmt::Result {
        write!(out, "{s}")
    }

    /// A functional description of how the automaton was built.
    fn describe(&self) -> String;

    /// Whether `property` is known to hold. Never computes anything, see [`crate::info`] for
    /// properties that can be established by traversal.
    fn has_property(&self, property: Property) -> bool {
        self.properties().has(property)
    }

    /// Whether the value of `property` is known.
    fn knows_property(&self, property: Property) -> bool {
        self.properties().knows(property)
    }

    /// Records that `property` holds.
    fn add_properties(&self, property: Property) {
        self.properties().add(property)
    }
}

/// Shared reference to an automaton.
pub type ConstAutomatonRef = Rc<dyn Automaton>;

impl Debug for dyn Automaton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

/// Returns the name of state `s` as written by [`Automaton::dump_state`].
pub fn state_name(f: &dyn Automaton, s: StateId) -> String {
    let mut name = String::new();
    if f.dump_state(s, &mut name).is_err() {
        name = s.to_string();
    }
    name
}

/// A correspondence between the states of two automata, e.g. between the states of a composition
/// and those of one of its operands.
pub trait Mapping {
    /// Returns the image of `s`, [`INVALID_STATE_ID`] if there is none.
    fn map(&self, s: StateId) -> StateId;
}

/// Shared reference to a mapping.
pub type ConstMappingRef = Rc<dyn Mapping>;

/// Maps every state to itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityMapping;

impl Mapping for IdentityMapping {
    fn map(&self, s: StateId) -> StateId {
        s
    }
}

/// A mapping that looks up states in an automaton it does not own. When the automaton is gone,
/// every state maps to [`INVALID_STATE_ID`].
pub struct WeakMapping<A> {
    fsa: Weak<A>,
    map: fn(&A, StateId) -> StateId,
}

impl<A> WeakMapping<A> {
    /// Creates a mapping that applies `map` to the automaton behind `fsa` while it is alive.
    pub fn new(fsa: &Rc<A>, map: fn(&A, StateId) -> StateId) -> Self {
        Self {
            fsa: Rc::downgrade(fsa),
            map,
        }
    }
}

impl<A> Mapping for WeakMapping<A> {
    fn map(&self, s: StateId) -> StateId {
        match self.fsa.upgrade() {
            Some(fsa) => (self.map)(&fsa, s),
            None => INVALID_STATE_ID,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_tags_and_arcs() {
        let mut state = State::new(5);
        assert_eq!(state.id(), 5);
        assert!(!state.is_final());
        state.set_final(Weight::Real(1.5));
        assert!(state.is_final());
        assert_eq!(state.id(), 5);
        state.add_tags(STATE_TAG_USER);
        assert!(state.has_tags(STATE_TAG_USER | STATE_TAG_FINAL));
        state.set_id(7);
        assert_eq!(state.id(), 7);
        assert!(state.is_final());
        state.unset_final();
        assert!(!state.is_final());
        assert!(state.has_tags(STATE_TAG_USER));

        state.new_arc(1, Weight::Real(0.0), 3, 4);
        state.new_acceptor_arc(2, Weight::Real(1.0), 1);
        assert_eq!(state.n_arcs(), 2);
        state.sort_arcs_by(|a, b| a.input.cmp(&b.input));
        assert_eq!(state[0].target, 2);
        assert_eq!(state.iter().map(|a| a.output).collect::<Vec<_>>(), vec![1, 4]);
    }

    #[test]
    fn properties_known_and_values() {
        let p = Properties::new();
        assert!(!p.knows(PROPERTY_ACYCLIC));
        p.set(PROPERTY_ACYCLIC | PROPERTY_LINEAR, PROPERTY_ACYCLIC);
        assert!(p.has(PROPERTY_ACYCLIC));
        assert!(p.knows(PROPERTY_LINEAR));
        assert!(!p.has(PROPERTY_LINEAR));
        p.unset(PROPERTY_ACYCLIC);
        assert!(!p.has(PROPERTY_ACYCLIC));
        let q = Properties::copied(&p, PROPERTY_ALL);
        assert!(q.knows(PROPERTY_LINEAR));
    }
}
