//! The optimized snapshot layer: a published, array-indexed view of the
//! registry for lock-free hot-path reads.
//!
//! When optimization is enabled, a resolve consults an [`ArcSwap`]-published
//! [`Snapshot`] instead of the registry's concurrent map. The snapshot is
//! rebuilt on the writer path and published with a release store; readers
//! that are mid-resolution keep the snapshot they already loaded until they
//! drop it, so a write never hands a reader a torn view.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::factory::{BoxedAny, FactoryVariant};

/// One dense slot: the factory entry (if any) valid at snapshot-build time,
/// plus a fill-once cell for a singleton-eligible constructed value.
///
/// Holding the [`FactoryVariant`] itself — not just an occupied flag — is
/// what makes this the actual hot path for every factory kind rather than
/// only ones that happen to already have a cached singleton: a reader that
/// finds a slot occupied but unfilled calls the variant directly off the
/// array, without ever touching the registry's factory map.
pub struct SnapshotSlot {
    pub occupied: bool,
    variant: Option<FactoryVariant>,
    singleton_cache: OnceCell<BoxedAny>,
}

impl SnapshotSlot {
    fn empty() -> Self {
        Self {
            occupied: false,
            variant: None,
            singleton_cache: OnceCell::new(),
        }
    }

    fn occupied(variant: FactoryVariant) -> Self {
        Self {
            occupied: true,
            variant: Some(variant),
            singleton_cache: OnceCell::new(),
        }
    }

    /// The factory entry published into this slot, if occupied.
    pub fn variant(&self) -> Option<&FactoryVariant> {
        self.variant.as_ref()
    }

    /// Returns the cached singleton value if present, without running the
    /// factory.
    pub fn cached(&self) -> Option<BoxedAny> {
        self.singleton_cache.get().cloned()
    }

    /// Publishes `value` into this slot's hole. Monotonic: if another reader
    /// raced and already filled it, the existing value wins and `value` is
    /// dropped — the snapshot's generation is unaffected either way.
    pub fn fill(&self, value: BoxedAny) -> BoxedAny {
        self.singleton_cache.get_or_init(|| value).clone()
    }
}

/// An immutable, atomically-published view of the registry, indexed by
/// slot ID for lock-free reads.
pub struct Snapshot {
    slots: Vec<SnapshotSlot>,
    generation: u64,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            slots: Vec::new(),
            generation: 0,
        }
    }

    /// Builds a fresh snapshot sized to `slot_count`. `variant_for` supplies
    /// the factory entry currently registered at each slot, or `None` for an
    /// unoccupied one. Singleton caches always start empty in a freshly
    /// built snapshot; a full rebuild drops any previously cached
    /// singleton-eligible values, which is safe because the registry is the
    /// source of truth and will reconstruct them on next demand.
    pub fn build(
        slot_count: usize,
        variant_for: impl Fn(u32) -> Option<FactoryVariant>,
        generation: u64,
    ) -> Self {
        let slots = (0..slot_count as u32)
            .map(|slot| match variant_for(slot) {
                Some(variant) => SnapshotSlot::occupied(variant),
                None => SnapshotSlot::empty(),
            })
            .collect();
        Self { slots, generation }
    }

    pub fn slot(&self, slot: u32) -> Option<&SnapshotSlot> {
        self.slots.get(slot as usize)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Owns the published snapshot pointer and the enable/disable flag read
/// atomically by readers on entry.
pub struct SnapshotLayer {
    enabled: AtomicBool,
    current: ArcSwap<Snapshot>,
    generation: AtomicU64,
    rebuild_gate: Mutex<()>,
    debounce: Duration,
}

impl SnapshotLayer {
    pub fn new(enabled: bool, debounce: Duration) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            current: ArcSwap::from_pointee(Snapshot::empty()),
            generation: AtomicU64::new(0),
            rebuild_gate: Mutex::new(()),
            debounce,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    /// Acquire-loads the current snapshot. Readers hold the returned `Arc`
    /// for the duration of a single resolution.
    pub fn load(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Rebuilds and publishes a fresh snapshot. Serialized on a single
    /// writer mutex; the debounce window only affects how eagerly callers
    /// *choose* to invoke this during a registration burst (the container
    /// facade coalesces bursts), never the correctness of a single rebuild.
    pub fn rebuild(&self, slot_count: usize, variant_for: impl Fn(u32) -> Option<FactoryVariant>) {
        let _guard = self.rebuild_gate.lock();
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let snapshot = Snapshot::build(slot_count, variant_for, generation);
        self.current.store(Arc::new(snapshot));
    }

    pub fn debounce_window(&self) -> Duration {
        self.debounce
    }
}

impl std::fmt::Debug for SnapshotLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotLayer")
            .field("enabled", &self.is_enabled())
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .field("slots", &self.load().len())
            .finish()
    }
}
