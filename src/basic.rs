//! Structural operations that neither compute weights nor change the language: trimming,
//! renumbering, changing the initial state or the semiring, and the identity transducer.
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use bit_set::BitSet;

use crate::alphabet::ConstAlphabetRef;
use crate::automaton::{
    Automaton, ConstAutomatonRef, ConstMappingRef, ConstStateRef, Properties, State, WeakMapping,
};
use crate::math::{Interner, Map};
use crate::semiring::{convert, same_semiring, ConstSemiringRef, Weight};
use crate::storage::StaticAutomaton;
use crate::types::*;
use crate::views::{ModifyAutomaton, SlaveAutomaton};

/// Determines the states that are reachable from the initial state and from which a final state
/// can be reached.
fn connected_states(f: &dyn Automaton) -> BitSet {
    let mut predecessors: Map<StateId, Vec<StateId>> = Map::default();
    let mut finals = Vec::new();
    crate::info::for_each_reachable(f, |sp| {
        if sp.is_final() {
            finals.push(sp.id());
        }
        for arc in sp.iter() {
            predecessors.entry(arc.target).or_default().push(sp.id());
        }
    });
    let mut connected = BitSet::new();
    let mut queue = VecDeque::new();
    for s in finals {
        if connected.insert(s as usize) {
            queue.push_back(s);
        }
    }
    while let Some(s) = queue.pop_front() {
        for &p in predecessors.get(&s).into_iter().flatten() {
            if connected.insert(p as usize) {
                queue.push_back(p);
            }
        }
    }
    connected
}

/// Removes every state that is not on a path from the initial state to a final state. The
/// states are determined once, the arcs are filtered on demand.
pub fn trim(f: ConstAutomatonRef) -> ConstAutomatonRef {
    let connected = Rc::new(connected_states(f.as_ref()));
    let initial = f.initial_state_id();
    let initial = if initial != INVALID_STATE_ID && connected.contains(initial as usize) {
        initial
    } else {
        INVALID_STATE_ID
    };
    tracing::debug!("trim keeps {} states of {}", connected.len(), f.describe());
    let description = format!("trim({})", f.describe());
    Rc::new(
        ModifyAutomaton::new(f, description, move |state: &mut State| {
            state.retain_arcs(|arc| connected.contains(arc.target as usize))
        })
        .map_base(|base| base.with_initial(initial)),
    )
}

/// Renumbers the states of the automaton it wraps in the order in which they are discovered,
/// starting with 0 for the initial state.
pub struct NormalizeAutomaton {
    fsa: ConstAutomatonRef,
    properties: Properties,
    states: RefCell<Interner<StateId>>,
}

impl NormalizeAutomaton {
    /// The state of the wrapped automaton that `s` stands for.
    pub fn original_state_id(&self, s: StateId) -> StateId {
        self.states
            .borrow()
            .get(s)
            .copied()
            .unwrap_or(INVALID_STATE_ID)
    }
}

impl Automaton for NormalizeAutomaton {
    fn kind(&self) -> Type {
        self.fsa.kind()
    }

    fn properties(&self) -> &Properties {
        &self.properties
    }

    fn semiring(&self) -> ConstSemiringRef {
        self.fsa.semiring()
    }

    fn initial_state_id(&self) -> StateId {
        let s = self.fsa.initial_state_id();
        if s == INVALID_STATE_ID {
            return s;
        }
        self.states.borrow_mut().insert(s)
    }

    fn input_alphabet(&self) -> Option<ConstAlphabetRef> {
        self.fsa.input_alphabet()
    }

    fn output_alphabet(&self) -> Option<ConstAlphabetRef> {
        self.fsa.output_alphabet()
    }

    fn get_state(&self, s: StateId) -> Option<ConstStateRef> {
        let original = self.original_state_id(s);
        if original == INVALID_STATE_ID {
            return None;
        }
        let sp = self.fsa.get_state(original)?;
        let mut state = State::clone(&sp);
        state.set_id(s);
        let mut states = self.states.borrow_mut();
        for arc in state.arcs_mut() {
            arc.target = states.insert(arc.target);
        }
        Some(Rc::new(state))
    }

    fn dump_state(&self, s: StateId, out: &mut dyn fmt::Write) -> fmt::Result {
        self.fsa.dump_state(self.original_state_id(s), out)
    }

    fn describe(&self) -> String {
        format!("normalize({})", self.fsa.describe())
    }
}

/// Numbers the states of `f` consecutively in the order of discovery.
pub fn normalize(f: ConstAutomatonRef) -> Rc<NormalizeAutomaton> {
    let properties = Properties::copied(
        f.properties(),
        PROPERTY_ALL & !(PROPERTY_STORAGE | PROPERTY_CACHED),
    );
    Rc::new(NormalizeAutomaton {
        fsa: f,
        properties,
        states: RefCell::new(Interner::new()),
    })
}

/// Maps the states of a normalized automaton to the states they were numbered from. The
/// mapping does not keep the automaton alive.
pub fn map_normalized(f: &Rc<NormalizeAutomaton>) -> ConstMappingRef {
    Rc::new(WeakMapping::new(f, NormalizeAutomaton::original_state_id))
}

/// The acceptor of all strings over the labels of `alphabet`: a single state that is initial and
/// final and has a loop for every label.
pub fn identity(alphabet: ConstAlphabetRef, semiring: ConstSemiringRef) -> ConstAutomatonRef {
    let mut fsa = StaticAutomaton::new(Type::Acceptor, semiring);
    let s = fsa.new_final_state(semiring.one());
    let state = fsa.state_mut(s);
    for label in alphabet.labels() {
        state.new_acceptor_arc(s, semiring.one(), label);
    }
    fsa.set_initial_state_id(s);
    fsa.set_input_alphabet(Some(alphabet));
    fsa.set_description("identity");
    fsa.add_properties(PROPERTY_SORTED_BY_INPUT | PROPERTY_SORTED_BY_OUTPUT);
    fsa.into_ref()
}

/// `f` with `initial` as initial state.
pub fn partial(f: ConstAutomatonRef, initial: StateId) -> ConstAutomatonRef {
    let description = format!("partial({},{initial})", f.describe());
    Rc::new(SlaveAutomaton::new(f, description).with_initial(initial))
}

/// `f` with `initial` as initial state and every final weight extended by `weight`.
pub fn partial_with_weight(
    f: ConstAutomatonRef,
    initial: StateId,
    weight: Weight,
) -> ConstAutomatonRef {
    let semiring = f.semiring();
    let description = format!("partial({},{initial},{})", f.describe(), semiring.format(weight));
    Rc::new(
        ModifyAutomaton::new(f, description, move |state: &mut State| {
            if state.is_final() {
                state.weight = semiring.extend(state.weight, weight);
            }
        })
        .map_base(|base| base.with_initial(initial)),
    )
}

/// One path of an n-best automaton ([`crate::best::nbest`]) as an automaton of its own: `f`
/// started in `s`, with the weight of the arc from the initial state of `f` to `s` moved onto the
/// first arc of `s`, or onto its final weight if `s` has no arcs.
pub fn hypothesis(f: ConstAutomatonRef, s: StateId) -> ConstAutomatonRef {
    let semiring = f.semiring();
    let weight = f
        .get_state(f.initial_state_id())
        .and_then(|initial| initial.iter().find(|a| a.target == s).map(|a| a.weight))
        .unwrap_or_else(|| semiring.one());
    let description = format!("hypothesis({},{s})", f.describe());
    Rc::new(
        ModifyAutomaton::new(f, description, move |state: &mut State| {
            if state.id() != s {
                return;
            }
            if let Some(arc) = state.arcs_mut().first_mut() {
                arc.weight = semiring.extend(weight, arc.weight);
            } else if state.is_final() {
                state.weight = semiring.extend(weight, state.weight);
            }
        })
        .map_base(|base| base.with_initial(s)),
    )
}

/// `f` with its weights converted into `semiring` by [`crate::semiring::convert`]. Log and
/// tropical weights share their representation and are kept as they are.
pub fn change_semiring(f: ConstAutomatonRef, semiring: ConstSemiringRef) -> ConstAutomatonRef {
    let from = f.semiring();
    if same_semiring(from, semiring) {
        return f;
    }
    let description = format!(
        "change-semiring({};{},{})",
        f.describe(),
        from.name(),
        semiring.name()
    );
    Rc::new(
        ModifyAutomaton::new(f, description, move |state: &mut State| {
            if state.is_final() {
                state.weight = convert(state.weight, from, semiring);
            }
            for arc in state.arcs_mut() {
                arc.weight = convert(arc.weight, from, semiring);
            }
        })
        .map_base(|base| base.with_semiring(semiring)),
    )
}
