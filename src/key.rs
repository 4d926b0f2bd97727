//! TypeKey identity and slot interning.
//!
//! A [`TypeKey`] is the process-local identity of a statically typed service:
//! the pair of its [`TypeId`] (for equality/hashing) and its type name (for
//! diagnostics only). The [`Interner`] hands out dense, monotonically
//! increasing slot IDs the first time a key is seen, so the snapshot layer
//! can index services by array position instead of hashing on every read.

use std::any::TypeId;
use std::sync::atomic::{AtomicU32, Ordering};

use ahash::RandomState;
use dashmap::DashMap;

/// Process-local identity of a registered type.
///
/// Equality and hashing are by [`TypeId`] only; `name` is carried purely for
/// diagnostics and does not participate in `Eq`/`Hash`.
#[derive(Debug, Clone, Copy)]
pub struct TypeKey {
    type_id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Builds the key for `T`. Pure and cheap; does not assign a slot.
    #[inline]
    pub fn of<T: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Builds a key from a runtime type identity, for callers that only
    /// carry a dynamic `TypeId` (property-wrapper-style lookups via
    /// `resolveAny`) rather than a static type parameter.
    #[inline]
    pub fn from_raw(type_id: TypeId, name: &'static str) -> Self {
        Self { type_id, name }
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}
impl Eq for TypeKey {}

impl std::hash::Hash for TypeKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl std::fmt::Display for TypeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Assigns dense integer slot IDs to [`TypeKey`]s on first registration.
///
/// Thread-safe; contention only occurs on the first assignment for a given
/// key. A slot, once assigned, is never reclaimed or reused, matching the
/// core's first invariant.
pub struct Interner {
    slots: DashMap<TypeId, u32, RandomState>,
    next: AtomicU32,
}

impl Interner {
    pub fn new() -> Self {
        Self {
            slots: DashMap::with_hasher(RandomState::new()),
            next: AtomicU32::new(0),
        }
    }

    /// Returns the slot for `key`, assigning one if this is the first call
    /// for that key. Never blocks a reader that already holds a built
    /// snapshot indexed by slot.
    pub fn slot_for(&self, key: &TypeKey) -> u32 {
        if let Some(slot) = self.slots.get(&key.type_id) {
            return *slot;
        }
        *self
            .slots
            .entry(key.type_id)
            .or_insert_with(|| self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the slot for `key` if one has already been assigned, without
    /// assigning a new one.
    pub fn existing_slot(&self, key: &TypeKey) -> Option<u32> {
        self.slots.get(&key.type_id).map(|s| *s)
    }

    /// Number of slots assigned so far. Used to size snapshot arrays.
    pub fn len(&self) -> usize {
        self.next.load(Ordering::Relaxed) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Interner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interner")
            .field("slots_assigned", &self.len())
            .finish()
    }
}
