//! The unified registry: authoritative factory storage and the resolution
//! entry point.

use std::any::TypeId;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::Mutex as PlMutex;

use crate::config::Config;
use crate::diagnostics::{DiagnosticsEngine, Event};
use crate::error::{DiError, Result};
use crate::factory::{downcast, BoxedAny, FactoryEntry, FactoryVariant, SyncFn};
use crate::key::{Interner, TypeKey};
use crate::provider::Injectable;
use crate::scope::{ScopeId, ScopeKind, ScopeManager};
use crate::snapshot::SnapshotLayer;

thread_local! {
    static SYNC_RESOLUTION_STACK: std::cell::RefCell<Vec<TypeKey>> =
        const { std::cell::RefCell::new(Vec::new()) };
}

tokio::task_local! {
    static TASK_RESOLUTION_STACK: std::cell::RefCell<Vec<TypeKey>>;
}

fn stack_peek() -> Option<TypeKey> {
    if let Ok(top) = TASK_RESOLUTION_STACK.try_with(|s| s.borrow().last().copied()) {
        if top.is_some() {
            return top;
        }
    }
    SYNC_RESOLUTION_STACK.with(|s| s.borrow().last().copied())
}

/// Whether `key` is already being constructed on the calling logical
/// caller's resolution stack — i.e. resolving it now would recurse back
/// into its own construction.
fn stack_contains(key: &TypeKey) -> bool {
    let in_task = TASK_RESOLUTION_STACK.try_with(|s| s.borrow().contains(key));
    if let Ok(found) = in_task {
        if found {
            return true;
        }
    }
    SYNC_RESOLUTION_STACK.with(|s| s.borrow().contains(key))
}

fn stack_push(key: TypeKey) {
    let pushed = TASK_RESOLUTION_STACK
        .try_with(|s| s.borrow_mut().push(key))
        .is_ok();
    if !pushed {
        SYNC_RESOLUTION_STACK.with(|s| s.borrow_mut().push(key));
    }
}

fn stack_pop() {
    let popped = TASK_RESOLUTION_STACK.try_with(|s| s.borrow_mut().pop()).is_ok();
    if !popped {
        SYNC_RESOLUTION_STACK.with(|s| {
            s.borrow_mut().pop();
        });
    }
}

/// Bounded edit distance between two strings, used for the "did you mean"
/// suggestion list on a miss. Returns `None` once the distance is known to
/// exceed `max`, to avoid computing an exact distance for obviously
/// unrelated names.
fn levenshtein_within(a: &str, b: &str, max: usize) -> Option<usize> {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.len().abs_diff(b.len()) > max {
        return None;
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut curr = vec![i + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr.push((prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost));
        }
        prev = curr;
    }
    let distance = prev[b.len()];
    (distance <= max).then_some(distance)
}

/// Detail attached to a miss, for the caller's own logging/diagnostics.
#[derive(Debug, Clone)]
pub struct MissDetail {
    pub requested: &'static str,
    pub similar: Vec<&'static str>,
    pub total_registered: usize,
}

/// Holds the authoritative factory maps plus C1/C3/C4/C5, and implements
/// the resolve/register/release entry points.
pub struct Registry {
    interner: Interner,
    factories: DashMap<TypeKey, FactoryEntry, RandomState>,
    slot_index: DashMap<u32, TypeKey, RandomState>,
    scopes: Arc<ScopeManager>,
    snapshot: SnapshotLayer,
    diagnostics: Arc<DiagnosticsEngine>,
    write_lock: PlMutex<()>,
    config: Config,
}

impl Registry {
    pub fn new(config: Config) -> Arc<Self> {
        let snapshot = SnapshotLayer::new(config.optimization_enabled, config.optimization_debounce);
        let diagnostics = DiagnosticsEngine::new(&config);
        Arc::new(Self {
            interner: Interner::new(),
            factories: DashMap::with_hasher(RandomState::new()),
            slot_index: DashMap::with_hasher(RandomState::new()),
            scopes: Arc::new(ScopeManager::new()),
            snapshot,
            diagnostics,
            write_lock: PlMutex::new(()),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn scopes(&self) -> &Arc<ScopeManager> {
        &self.scopes
    }

    pub fn diagnostics(&self) -> &Arc<DiagnosticsEngine> {
        &self.diagnostics
    }

    pub fn snapshot_layer(&self) -> &SnapshotLayer {
        &self.snapshot
    }

    pub fn registered_count(&self) -> usize {
        self.factories.len()
    }

    pub fn registered_names(&self) -> Vec<&'static str> {
        self.factories.iter().map(|e| e.key().name()).collect()
    }

    // ---- registration ----------------------------------------------------

    fn upsert(&self, key: TypeKey, entry: FactoryEntry) {
        let _guard = self.write_lock.lock();
        let slot = self.interner.slot_for(&key);
        self.slot_index.insert(slot, key);
        let variant_tag = entry.variant.tag();
        match self.factories.get_mut(&key) {
            Some(mut existing) => existing.replace(entry.variant),
            None => {
                self.factories.insert(key, entry);
            }
        }
        // A re-registration swaps the factory producing `key`'s instances;
        // anything already cached under the old factory is stale.
        self.scopes.release_for_key(&key);
        self.diagnostics.emit(Event::Registered {
            key,
            variant: variant_tag,
        });
        self.rebuild_snapshot();
    }

    fn rebuild_snapshot(&self) {
        let slot_count = self.interner.len();
        let slot_index = &self.slot_index;
        let factories = &self.factories;
        self.snapshot.rebuild(slot_count, |slot| {
            let key = slot_index.get(&slot)?;
            factories.get(&*key).map(|entry| entry.variant.clone())
        });
    }

    pub fn register_sync<T: Injectable>(
        &self,
        f: impl Fn() -> T + Send + Sync + 'static,
    ) -> TypeKey {
        let key = TypeKey::of::<T>();
        self.upsert(key, FactoryEntry::sync(move || Arc::new(f()) as BoxedAny));
        key
    }

    pub fn register_async<T, F, Fut>(&self, f: F) -> TypeKey
    where
        T: Injectable,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let key = TypeKey::of::<T>();
        let f = Arc::new(f);
        self.upsert(
            key,
            FactoryEntry::r#async(move || {
                let f = f.clone();
                Box::pin(async move { Arc::new(f().await) as BoxedAny })
                    as Pin<Box<dyn Future<Output = BoxedAny> + Send>>
            }),
        );
        key
    }

    pub fn register_async_once<T, F, Fut>(&self, f: F) -> TypeKey
    where
        T: Injectable,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let key = TypeKey::of::<T>();
        let f = Arc::new(f);
        self.upsert(
            key,
            FactoryEntry::async_once(move || {
                let f = f.clone();
                Box::pin(async move { Arc::new(f().await) as BoxedAny })
                    as Pin<Box<dyn Future<Output = BoxedAny> + Send>>
            }),
        );
        key
    }

    pub fn register_scoped_sync<T: Injectable>(
        &self,
        kind: ScopeKind,
        f: impl Fn() -> T + Send + Sync + 'static,
    ) -> TypeKey {
        let key = TypeKey::of::<T>();
        self.upsert(
            key,
            FactoryEntry::scoped_sync(kind, move || Arc::new(f()) as BoxedAny),
        );
        key
    }

    pub fn register_scoped_async<T, F, Fut>(&self, kind: ScopeKind, f: F) -> TypeKey
    where
        T: Injectable,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let key = TypeKey::of::<T>();
        let f = Arc::new(f);
        self.upsert(
            key,
            FactoryEntry::scoped_async(kind, move || {
                let f = f.clone();
                Box::pin(async move { Arc::new(f().await) as BoxedAny })
                    as Pin<Box<dyn Future<Output = BoxedAny> + Send>>
            }),
        );
        key
    }

    // ---- release -----------------------------------------------------

    pub fn release(&self, key: &TypeKey) -> bool {
        let _guard = self.write_lock.lock();
        let removed = self.factories.remove(key).is_some();
        if removed {
            self.scopes.release_for_key(key);
            self.diagnostics.emit(Event::Released { key: *key });
            self.rebuild_snapshot();
        }
        removed
    }

    pub fn release_all(&self) {
        let _guard = self.write_lock.lock();
        self.factories.clear();
        self.slot_index.clear();
        self.scopes.clear();
        self.rebuild_snapshot();
    }

    // ---- resolution ----------------------------------------------------

    /// Up to five similar registered names within edit distance 2, for the
    /// caller's own "did you mean" style reporting.
    pub fn miss_detail(&self, requested: &'static str) -> MissDetail {
        let mut similar: Vec<&'static str> = self
            .factories
            .iter()
            .filter_map(|e| {
                let name = e.key().name();
                levenshtein_within(requested, name, 2).map(|_| name)
            })
            .take(5)
            .collect();
        similar.sort_unstable();
        MissDetail {
            requested,
            similar,
            total_registered: self.factories.len(),
        }
    }

    fn singleton_snapshot_fill(&self, key: &TypeKey, value: BoxedAny) {
        if let Some(slot) = self.interner.existing_slot(key) {
            if let Some(snap_slot) = self.snapshot.load().slot(slot) {
                let _ = snap_slot.fill(value);
            }
        }
    }

    fn resolve_scoped_sync(&self, key: &TypeKey, kind: &ScopeKind, factory: &SyncFn) -> BoxedAny {
        match self.scopes.current_id(kind) {
            Some(instance_id) => {
                let scope = ScopeId::new(kind.clone(), instance_id);
                if let Some(cached) = self.scopes.get(key, &scope) {
                    return cached;
                }
                let value = factory();
                self.scopes.put(*key, scope, value.clone());
                if matches!(kind, ScopeKind::Singleton) {
                    self.singleton_snapshot_fill(key, value.clone());
                }
                value
            }
            None => {
                self.diagnostics.emit(Event::ScopeFallback {
                    key: *key,
                    kind: kind.clone(),
                });
                factory()
            }
        }
    }

    async fn resolve_scoped_async(
        &self,
        key: &TypeKey,
        kind: &ScopeKind,
        factory: &crate::factory::AsyncFn,
    ) -> BoxedAny {
        match self.scopes.current_id(kind) {
            Some(instance_id) => {
                let scope = ScopeId::new(kind.clone(), instance_id);
                if let Some(cached) = self.scopes.get(key, &scope) {
                    return cached;
                }
                let value = factory().await;
                self.scopes.put(*key, scope, value.clone());
                if matches!(kind, ScopeKind::Singleton) {
                    self.singleton_snapshot_fill(key, value.clone());
                }
                value
            }
            None => {
                self.diagnostics.emit(Event::ScopeFallback {
                    key: *key,
                    kind: kind.clone(),
                });
                factory().await
            }
        }
    }

    /// Dispatches an already-resolved [`FactoryVariant`] on the synchronous
    /// path, whether it came from the snapshot's dense array or the
    /// authoritative factory map. Fails if `variant` is an async-only kind
    /// (`Async`, `AsyncOnce`, `ScopedAsync`) — a sync resolve must never
    /// suspend.
    fn dispatch_sync(&self, key: &TypeKey, variant: &FactoryVariant) -> Result<BoxedAny> {
        match variant {
            FactoryVariant::Sync(f) => Ok(f()),
            FactoryVariant::ScopedSync { kind, factory } => {
                Ok(self.resolve_scoped_sync(key, kind, factory))
            }
            FactoryVariant::Async(_) | FactoryVariant::AsyncOnce { .. } | FactoryVariant::ScopedAsync { .. } => {
                Err(DiError::NotFound {
                    type_name: key.name(),
                    type_id: key.type_id(),
                })
            }
        }
    }

    /// Dispatches an already-resolved [`FactoryVariant`] on the
    /// suspension-capable path. Every variant, sync or async, produces a
    /// value.
    async fn dispatch_async(&self, key: &TypeKey, variant: FactoryVariant) -> Result<BoxedAny> {
        match variant {
            FactoryVariant::Sync(f) => Ok(f()),
            FactoryVariant::ScopedSync { kind, factory } => {
                Ok(self.resolve_scoped_sync(key, &kind, &factory))
            }
            FactoryVariant::Async(f) => Ok(f().await),
            FactoryVariant::AsyncOnce { factory, cell } => {
                Ok(cell.get_or_init(|| factory()).await.clone())
            }
            FactoryVariant::ScopedAsync { kind, factory } => {
                Ok(self.resolve_scoped_async(key, &kind, &factory).await)
            }
        }
    }

    /// The synchronous hot path. When optimization is enabled and `key` has
    /// an assigned slot, the dense snapshot array is consulted first: an
    /// already-cached singleton is returned straight away, and any other
    /// occupied slot is dispatched directly off its stored factory entry,
    /// with no lookup into the registry's factory map at all. Only a miss
    /// on both the slot and its variant falls through to the authoritative
    /// map.
    fn resolve_sync_raw(&self, key: &TypeKey) -> Result<BoxedAny> {
        if self.snapshot.is_enabled() {
            if let Some(slot) = self.interner.existing_slot(key) {
                if let Some(snap_slot) = self.snapshot.load().slot(slot) {
                    if snap_slot.occupied {
                        if let Some(cached) = snap_slot.cached() {
                            return Ok(cached);
                        }
                        if let Some(variant) = snap_slot.variant() {
                            return self.dispatch_sync(key, variant);
                        }
                    }
                }
            }
        }
        let entry = self
            .factories
            .get(key)
            .ok_or_else(|| DiError::NotFound {
                type_name: key.name(),
                type_id: key.type_id(),
            })?;
        self.dispatch_sync(key, &entry.variant)
    }

    /// The suspension-capable path. Same snapshot-first strategy as
    /// [`Registry::resolve_sync_raw`], generalized to every variant — sync
    /// or async — since this path may suspend.
    async fn resolve_async_raw(&self, key: &TypeKey) -> Result<BoxedAny> {
        if self.snapshot.is_enabled() {
            if let Some(slot) = self.interner.existing_slot(key) {
                let snapshot = self.snapshot.load();
                if let Some(snap_slot) = snapshot.slot(slot) {
                    if snap_slot.occupied {
                        if let Some(cached) = snap_slot.cached() {
                            return Ok(cached);
                        }
                        if let Some(variant) = snap_slot.variant().cloned() {
                            return self.dispatch_async(key, variant).await;
                        }
                    }
                }
            }
        }
        let variant = {
            let entry = self
                .factories
                .get(key)
                .ok_or_else(|| DiError::NotFound {
                    type_name: key.name(),
                    type_id: key.type_id(),
                })?;
            entry.variant.clone()
        };
        self.dispatch_async(key, variant).await
    }

    pub fn resolve<T: Injectable>(&self) -> Result<Arc<T>> {
        let key = TypeKey::of::<T>();
        if let Some(parent) = stack_peek() {
            self.diagnostics.emit(Event::NestedResolve { parent, child: key });
        }
        // A type already under construction on this caller's stack means its
        // own factory (transitively) depends on itself; recording the
        // closing edge above is enough for the diagnostics graph to flag the
        // cycle, so bail here instead of recursing into the same factory.
        if stack_contains(&key) {
            self.diagnostics.emit(Event::Miss { type_name: key.name() });
            return Err(DiError::circular::<T>());
        }
        stack_push(key);
        let result = self.resolve_sync_raw(&key);
        stack_pop();
        match &result {
            Ok(_) => self.diagnostics.emit(Event::Resolved { key }),
            Err(_) => self.diagnostics.emit(Event::Miss { type_name: key.name() }),
        }
        result.map(downcast::<T>)
    }

    pub async fn resolve_async<T: Injectable>(self: &Arc<Self>) -> Result<Arc<T>> {
        let key = TypeKey::of::<T>();
        if let Some(parent) = stack_peek() {
            self.diagnostics.emit(Event::NestedResolve { parent, child: key });
        }
        if stack_contains(&key) {
            self.diagnostics.emit(Event::Miss { type_name: key.name() });
            return Err(DiError::circular::<T>());
        }
        stack_push(key);
        let result = self.resolve_async_raw(&key).await;
        stack_pop();
        match &result {
            Ok(_) => self.diagnostics.emit(Event::Resolved { key }),
            Err(_) => self.diagnostics.emit(Event::Miss { type_name: key.name() }),
        }
        result.map(downcast::<T>)
    }

    /// Resolution keyed by a dynamic `TypeId`, for property-wrapper-style
    /// callers that only carry a runtime type.
    pub async fn resolve_any(self: &Arc<Self>, type_id: TypeId, type_name: &'static str) -> Result<BoxedAny> {
        let key = TypeKey::from_raw(type_id, type_name);
        if let Some(parent) = stack_peek() {
            self.diagnostics.emit(Event::NestedResolve { parent, child: key });
        }
        if stack_contains(&key) {
            self.diagnostics.emit(Event::Miss { type_name });
            return Err(DiError::Internal(format!(
                "circular dependency detected while resolving {type_name}"
            )));
        }
        stack_push(key);
        let result = self.resolve_async_raw(&key).await;
        stack_pop();
        match &result {
            Ok(_) => self.diagnostics.emit(Event::Resolved { key }),
            Err(_) => self.diagnostics.emit(Event::Miss { type_name }),
        }
        result
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("registered", &self.factories.len())
            .field("optimization_enabled", &self.snapshot.is_enabled())
            .finish()
    }
}
