use crate::map::EntityRef;
use alloc::vec::Vec;
use core::marker::PhantomData;
use core::ops::{Index, IndexMut};

/// A secondary arena, mapping the same keys as some `PrimaryMap<K, _>` to a
/// different value type, defaulting absent entries rather than requiring
/// them to exist. Used for the many per-instruction or per-value side tables
/// a pass wants without touching the primary IR storage (e.g. use counts,
/// value-to-register assignments).
#[derive(Clone, Debug)]
pub struct SecondaryMap<K, V: Clone> {
    elems: Vec<V>,
    default: V,
    unused: PhantomData<K>,
}

impl<K: EntityRef, V: Clone + Default> SecondaryMap<K, V> {
    /// Create a new empty map using `V::default()` for unset entries.
    pub fn new() -> Self {
        Self {
            elems: Vec::new(),
            default: V::default(),
            unused: PhantomData,
        }
    }
}

impl<K: EntityRef, V: Clone> SecondaryMap<K, V> {
    /// Create a new empty map using an explicit default value.
    pub fn with_default(default: V) -> Self {
        Self {
            elems: Vec::new(),
            default,
            unused: PhantomData,
        }
    }

    /// Resize so that `k` is addressable, filling new slots with the default.
    fn ensure(&mut self, k: K) {
        if k.index() >= self.elems.len() {
            self.elems.resize(k.index() + 1, self.default.clone());
        }
    }

    /// Set the value at `k`, growing the map if necessary.
    pub fn set(&mut self, k: K, v: V) {
        self.ensure(k);
        self.elems[k.index()] = v;
    }

}

impl<K: EntityRef, V: Clone + Default> Default for SecondaryMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: EntityRef, V: Clone> Index<K> for SecondaryMap<K, V> {
    type Output = V;
    fn index(&self, k: K) -> &V {
        self.elems.get(k.index()).unwrap_or(&self.default)
    }
}

impl<K: EntityRef, V: Clone> IndexMut<K> for SecondaryMap<K, V> {
    fn index_mut(&mut self, k: K) -> &mut V {
        self.ensure(k);
        &mut self.elems[k.index()]
    }
}
