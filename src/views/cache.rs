use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::alphabet::ConstAlphabetRef;
use crate::automaton::{Automaton, ConstAutomatonRef, ConstStateRef, Properties};
use crate::config::Config;
use crate::math::Map;
use crate::semiring::ConstSemiringRef;
use crate::types::*;

const FRESH: u8 = u8::MAX;

struct CacheEntry {
    state: ConstStateRef,
    age: u8,
}

#[derive(Default)]
struct StateCache {
    entries: Map<StateId, CacheEntry>,
    misses: u32,
}

impl StateCache {
    /// Halves every age and evicts the states that reach zero.
    fn age(&mut self) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            entry.age >>= 1;
            entry.age > 0
        });
        tracing::trace!(
            "cache aging evicted {} states, {} left",
            before - self.entries.len(),
            self.entries.len()
        );
    }
}

/// Memoizes the states of the automaton it wraps.
///
/// Every cached state carries an age that is refreshed whenever the state is requested. Every
/// `max_age` misses all ages are halved and the states whose age drops to zero are evicted. A
/// state that is not requested again therefore survives eight aging passes, i.e. between seven
/// and eight times `max_age` misses, and at most eight times `max_age` states are held.
pub struct CacheAutomaton {
    fsa: ConstAutomatonRef,
    properties: Properties,
    max_age: u32,
    cache: RefCell<StateCache>,
}

impl CacheAutomaton {
    /// Wraps `fsa` into a cache.
    pub fn new(fsa: ConstAutomatonRef, max_age: u32) -> Self {
        let properties = Properties::copied(fsa.properties(), PROPERTY_ALL & !PROPERTY_STORAGE);
        properties.add(PROPERTY_CACHED);
        Self {
            fsa,
            properties,
            max_age: max_age.max(1),
            cache: RefCell::new(StateCache::default()),
        }
    }

    /// Number of states currently held.
    pub fn n_cached(&self) -> u32 {
        self.cache.borrow().entries.len() as u32
    }
}

impl Automaton for CacheAutomaton {
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
        self.fsa.initial_state_id()
    }

    fn input_alphabet(&self) -> Option<ConstAlphabetRef> {
        self.fsa.input_alphabet()
    }

    fn output_alphabet(&self) -> Option<ConstAlphabetRef> {
        self.fsa.output_alphabet()
    }

    fn get_state(&self, s: StateId) -> Option<ConstStateRef> {
        {
            let mut cache = self.cache.borrow_mut();
            if let Some(entry) = cache.entries.get_mut(&s) {
                entry.age = FRESH;
                return Some(entry.state.clone());
            }
        }
        // the upstream may be expensive, so the cache is not borrowed while it computes
        let state = self.fsa.get_state(s)?;
        let mut cache = self.cache.borrow_mut();
        cache.entries.insert(
            s,
            CacheEntry {
                state: state.clone(),
                age: FRESH,
            },
        );
        cache.misses += 1;
        if cache.misses >= self.max_age {
            cache.misses = 0;
            cache.age();
        }
        Some(state)
    }

    fn dump_state(&self, s: StateId, out: &mut dyn fmt::Write) -> fmt::Result {
        self.fsa.dump_state(s, out)
    }

    fn describe(&self) -> String {
        format!("cache({})", self.fsa.describe())
    }
}

/// Wraps `f` into a [`CacheAutomaton`]. Automata that are materialized or cached already are
/// returned as they are.
pub fn cache(f: ConstAutomatonRef, max_age: u32) -> ConstAutomatonRef {
    if f.has_property(PROPERTY_STORAGE) || f.has_property(PROPERTY_CACHED) {
        return f;
    }
    Rc::new(CacheAutomaton::new(f, max_age))
}

/// [`cache`] with [`Config::cache_max_age`].
pub fn cache_with(f: ConstAutomatonRef, config: &Config) -> ConstAutomatonRef {
    cache(f, config.cache_max_age)
}
