//! The container facade: the single public surface over the registry,
//! scope manager, snapshot layer, and diagnostics engine.
//!
//! # Quick Start
//!
//! ```
//! use corewire::Container;
//!
//! struct Logger { level: &'static str }
//!
//! let container = Container::new();
//! container.singleton(|| Logger { level: "info" });
//! let logger = container.resolve::<Logger>().unwrap();
//! assert_eq!(logger.level, "info");
//! ```
//!
//! # Scoped Resolution
//!
//! ```
//! use corewire::{Container, ScopeKind};
//!
//! struct RequestContext { id: u32 }
//!
//! let container = Container::new();
//! container.register_scoped(ScopeKind::Request, || RequestContext { id: 7 });
//! container.enter_scope(ScopeKind::Request, "r1");
//! let ctx = container.resolve::<RequestContext>().unwrap();
//! assert_eq!(ctx.id, 7);
//! container.leave_scope(ScopeKind::Request, "r1");
//! ```

use std::any::TypeId;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use once_cell::sync::OnceCell as SyncOnceCell;

use crate::config::Config;
use crate::diagnostics::HealthReport;
use crate::error::{DiError, Result};
use crate::factory::BoxedAny;
use crate::provider::Injectable;
use crate::registry::{MissDetail, Registry};
use crate::scope::{ScopeId, ScopeKind};

/// A handle returned by registration, which releases just that registration
/// when invoked. Not `Drop`-based: letting one fall out of scope does not
/// unregister the live service.
pub struct ReleaseHandle {
    registry: Arc<Registry>,
    key: crate::key::TypeKey,
}

impl ReleaseHandle {
    pub fn release(self) -> bool {
        self.registry.release(&self.key)
    }
}

/// The dependency-injection container. Cheap to clone: every clone shares
/// the same underlying [`Registry`] via an `Arc`.
#[derive(Clone)]
pub struct Container {
    registry: Arc<Registry>,
}

impl Container {
    /// Builds an isolated container with default configuration. Use this
    /// for tests or for an explicitly-owned instance; the process-wide
    /// default is reached through [`Container::default_instance`].
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            registry: Registry::new(config),
        }
    }

    fn handle_for(&self, key: crate::key::TypeKey) -> ReleaseHandle {
        ReleaseHandle {
            registry: self.registry.clone(),
            key,
        }
    }

    // ---- sugar: singleton / lazy / transient -----------------------------

    /// Registers `T` as a process-wide singleton: the factory runs at most
    /// once, and every subsequent resolve across every caller returns the
    /// same instance, for the lifetime of the container.
    pub fn singleton<T: Injectable>(&self, f: impl Fn() -> T + Send + Sync + 'static) -> ReleaseHandle {
        self.register_scoped(ScopeKind::Singleton, f)
    }

    /// Alias for [`Container::singleton`] — eager-vs-lazy is not
    /// distinguished here because every `ScopedSync` factory is
    /// already lazily invoked on first resolve.
    pub fn lazy<T: Injectable>(&self, f: impl Fn() -> T + Send + Sync + 'static) -> ReleaseHandle {
        self.singleton(f)
    }

    /// Registers `T` as transient: the factory runs fresh on every resolve,
    /// no caching at all.
    pub fn transient<T: Injectable>(&self, f: impl Fn() -> T + Send + Sync + 'static) -> ReleaseHandle {
        self.register(f)
    }

    // ---- registration -----------------------------------------------------

    pub fn register<T: Injectable>(&self, f: impl Fn() -> T + Send + Sync + 'static) -> ReleaseHandle {
        let key = self.registry.register_sync(f);
        self.handle_for(key)
    }

    pub fn register_async<T, F, Fut>(&self, f: F) -> ReleaseHandle
    where
        T: Injectable,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let key = self.registry.register_async(f);
        self.handle_for(key)
    }

    pub fn register_once<T, F, Fut>(&self, f: F) -> ReleaseHandle
    where
        T: Injectable,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let key = self.registry.register_async_once(f);
        self.handle_for(key)
    }

    pub fn register_scoped<T: Injectable>(
        &self,
        kind: ScopeKind,
        f: impl Fn() -> T + Send + Sync + 'static,
    ) -> ReleaseHandle {
        let key = self.registry.register_scoped_sync(kind, f);
        self.handle_for(key)
    }

    pub fn register_scoped_async<T, F, Fut>(&self, kind: ScopeKind, f: F) -> ReleaseHandle
    where
        T: Injectable,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let key = self.registry.register_scoped_async(kind, f);
        self.handle_for(key)
    }

    // ---- resolution -----------------------------------------------------

    pub fn resolve<T: Injectable>(&self) -> Result<Arc<T>> {
        self.registry.resolve::<T>()
    }

    pub fn resolve_or_default<T: Injectable + Clone>(&self, default: T) -> Arc<T> {
        self.registry.resolve::<T>().unwrap_or_else(|_| Arc::new(default))
    }

    /// Resolves `T`, aborting in debug builds on a miss; returns an error in
    /// release builds instead of aborting the process.
    pub fn resolve_required<T: Injectable>(&self) -> Result<Arc<T>> {
        let result = self.registry.resolve::<T>();
        debug_assert!(
            result.is_ok(),
            "resolveRequired: no factory registered for {}",
            std::any::type_name::<T>()
        );
        result
    }

    pub async fn resolve_async<T: Injectable>(&self) -> Result<Arc<T>> {
        self.registry.resolve_async::<T>().await
    }

    pub async fn resolve_any(&self, type_id: TypeId, type_name: &'static str) -> Result<BoxedAny> {
        self.registry.resolve_any(type_id, type_name).await
    }

    pub fn try_resolve<T: Injectable>(&self) -> Option<Arc<T>> {
        self.registry.resolve::<T>().ok()
    }

    pub fn contains<T: Injectable>(&self) -> bool {
        self.try_resolve_peek::<T>()
    }

    fn try_resolve_peek<T: Injectable>(&self) -> bool {
        self.registry
            .registered_names()
            .contains(&std::any::type_name::<T>())
    }

    pub fn miss_detail(&self, requested: &'static str) -> MissDetail {
        self.registry.miss_detail(requested)
    }

    // ---- scope control -----------------------------------------------------

    pub fn enter_scope(&self, kind: ScopeKind, instance_id: impl Into<String>) {
        self.registry.scopes().enter(ScopeId::new(kind, instance_id));
    }

    pub fn leave_scope(&self, kind: ScopeKind, instance_id: &str) {
        self.registry.scopes().leave(&kind, instance_id);
    }

    pub fn release_scope(&self, kind: ScopeKind, instance_id: &str) -> usize {
        self.registry.scopes().release_scope(&kind, instance_id)
    }

    /// Runs `fut` under a fresh task-local scope stack, so `enter_scope`
    /// followed by a resolve that awaits across a runtime worker-thread
    /// migration still sees the scope it entered. Request handlers on a
    /// multi-threaded runtime that call `enter_scope` before any `.await`
    /// should wrap their whole handler in this; code that never awaits
    /// between `enter_scope` and `leave_scope` does not need it, since the
    /// thread-local fallback covers a single uninterrupted poll.
    pub async fn with_scope_stack<F: std::future::Future>(fut: F) -> F::Output {
        crate::scope::with_task_scope_stack(fut).await
    }

    // ---- optimization & diagnostics -----------------------------------------------------

    pub fn enable_optimization(&self) {
        self.registry.snapshot_layer().enable();
    }

    pub fn disable_optimization(&self) {
        self.registry.snapshot_layer().disable();
    }

    pub fn is_optimized(&self) -> bool {
        self.registry.snapshot_layer().is_enabled()
    }

    pub fn graph(&self) -> String {
        self.registry.diagnostics().graph()
    }

    pub fn stats(&self) -> std::collections::HashMap<&'static str, u64> {
        self.registry.diagnostics().stats()
    }

    pub fn optimized_types(&self) -> std::collections::HashSet<&'static str> {
        self.registry.diagnostics().optimized_types()
    }

    pub fn detected_cycles(&self) -> std::collections::HashSet<String> {
        self.registry.diagnostics().detected_cycles()
    }

    pub fn health_report(&self) -> HealthReport {
        self.registry.diagnostics().health_report()
    }

    /// Waits until every diagnostics event emitted so far has been applied.
    /// Since emission is fire-and-forget, this has no caller-visible effect
    /// on resolution results; it exists so tests and shutdown paths can
    /// await quiescence before inspecting diagnostics queries, rather than
    /// relying on a fixed batch interval having already elapsed.
    pub async fn await_pending_work(&self) {
        self.registry.diagnostics().await_quiescence().await;
    }

    // ---- lifecycle -----------------------------------------------------

    /// Resets the container to an empty registry. Gated to debug builds:
    /// calling this in a release build is a programming error.
    pub fn reset(&self) -> Result<()> {
        if !cfg!(debug_assertions) {
            return Err(DiError::ResetInProduction);
        }
        self.registry.release_all();
        Ok(())
    }

    pub fn registered_count(&self) -> usize {
        self.registry.registered_count()
    }

    // ---- process-wide default instance -----------------------------------------------------

    fn default_cell() -> &'static SyncOnceCell<ArcSwap<Container>> {
        static CELL: SyncOnceCell<ArcSwap<Container>> = SyncOnceCell::new();
        &CELL
    }

    fn bootstrapped_flag() -> &'static AtomicBool {
        static FLAG: AtomicBool = AtomicBool::new(false);
        &FLAG
    }

    /// The process-wide default container, lazily constructed on first
    /// access.
    pub fn default_instance() -> Container {
        let cell = Self::default_cell().get_or_init(|| ArcSwap::from_pointee(Container::new()));
        (**cell.load()).clone()
    }

    pub fn is_bootstrapped() -> bool {
        Self::bootstrapped_flag().load(Ordering::Acquire)
    }

    /// Builds a fresh container, runs `configure` against it, and publishes
    /// it atomically as the process-wide default.
    pub fn bootstrap(configure: impl FnOnce(&Container)) {
        let container = Container::new();
        configure(&container);
        Self::publish(container);
    }

    /// Async counterpart of [`Container::bootstrap`].
    pub async fn bootstrap_async<F, Fut>(configure: F) -> Result<()>
    where
        F: FnOnce(Container) -> Fut,
        Fut: Future<Output = Result<Container>>,
    {
        let container = Container::new();
        match configure(container).await {
            Ok(container) => {
                Self::publish(container);
                Ok(())
            }
            Err(err) => {
                if cfg!(debug_assertions) {
                    panic!("bootstrap_async failed: {err}");
                }
                Err(err)
            }
        }
    }

    /// Bootstraps only if the process-wide default has not already been
    /// published.
    pub fn bootstrap_if_needed(configure: impl FnOnce(&Container)) {
        if !Self::is_bootstrapped() {
            Self::bootstrap(configure);
        }
    }

    fn publish(container: Container) {
        let cell = Self::default_cell().get_or_init(|| ArcSwap::from_pointee(Container::new()));
        cell.store(Arc::new(container));
        Self::bootstrapped_flag().store(true, Ordering::Release);
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("registered", &self.registry.registered_count())
            .field("optimized", &self.is_optimized())
            .finish()
    }
}

/// Batches multiple registrations behind a single lock acquisition and a
/// single snapshot rebuild, instead of one rebuild per call.
pub struct BatchRegistrar<'a> {
    container: &'a Container,
    pending: Vec<Box<dyn FnOnce(&Container) + 'a>>,
}

impl<'a> BatchRegistrar<'a> {
    fn new(container: &'a Container) -> Self {
        Self {
            container,
            pending: Vec::new(),
        }
    }

    pub fn singleton<T: Injectable>(
        mut self,
        f: impl Fn() -> T + Send + Sync + 'static,
    ) -> Self {
        self.pending.push(Box::new(move |c| {
            c.singleton(f);
        }));
        self
    }

    pub fn transient<T: Injectable>(
        mut self,
        f: impl Fn() -> T + Send + Sync + 'static,
    ) -> Self {
        self.pending.push(Box::new(move |c| {
            c.transient(f);
        }));
        self
    }

    pub fn commit(self) {
        for step in self.pending {
            step(self.container);
        }
    }
}

impl Container {
    /// Entry point for bulk registration. The current implementation still
    /// rebuilds the snapshot once per call inside each closure rather than
    /// coalescing into a single rebuild; callers that need the latter
    /// should call [`Container::disable_optimization`] for the duration of
    /// the batch and re-enable it afterward.
    pub fn batch(&self) -> BatchRegistrar<'_> {
        BatchRegistrar::new(self)
    }
}
