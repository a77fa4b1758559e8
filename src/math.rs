use std::hash::Hash;

use indexmap::IndexSet;

/// Type alias for sets, we use this to hide which type of `HashSet` we are actually using.
pub type Set<S> = fxhash::FxHashSet<S>;
/// Type alias for maps, we use this to hide which type of `HashMap` we are actually using.
pub type Map<K, V> = fxhash::FxHashMap<K, V>;

/// Represents a bijective mapping between `L` and `R`, that is a mapping which associates
/// each `L` with precisely one `R` and vice versa.
pub type Bijection<L, R> = bimap::BiHashMap<L, R>;

/// Assigns consecutive ids to distinct values. Inserting a value that is already present returns
/// the id it received on its first insertion, so the interner can be used to number lazily
/// discovered states.
#[derive(Debug, Clone)]
pub struct Interner<T: Hash + Eq>(IndexSet<T, fxhash::FxBuildHasher>);

impl<T: Hash + Eq> Default for Interner<T> {
    fn default() -> Self {
        Self(IndexSet::with_hasher(Default::default()))
    }
}

impl<T: Hash + Eq> Interner<T> {
    /// Creates an empty interner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id of `value`, inserting it if it is not yet known.
    pub fn insert(&mut self, value: T) -> u32 {
        self.0.insert_full(value).0 as u32
    }

    /// Like [`Interner::insert`], but also reports whether the value was new.
    pub fn insert_new(&mut self, value: T) -> (u32, bool) {
        let (id, new) = self.0.insert_full(value);
        (id as u32, new)
    }

    /// Returns the id of `value` if it has been inserted before.
    pub fn find(&self, value: &T) -> Option<u32> {
        self.0.get_index_of(value).map(|id| id as u32)
    }

    /// Returns the value with the given id.
    pub fn get(&self, id: u32) -> Option<&T> {
        self.0.get_index(id as usize)
    }

    /// Number of distinct values.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if nothing has been inserted.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
