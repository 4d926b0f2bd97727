//! Factory entries: the five variants the registry stores per [`TypeKey`].

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::OnceCell as AsyncOnceCell;

use crate::scope::ScopeKind;

/// A type-erased constructed value.
pub type BoxedAny = Arc<dyn Any + Send + Sync>;

/// A synchronous constructor: runs with no suspension and returns a value.
pub type SyncFn = Arc<dyn Fn() -> BoxedAny + Send + Sync>;

/// An asynchronous constructor: runs in a suspension-permitting context.
pub type AsyncFn =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = BoxedAny> + Send>> + Send + Sync>;

/// Metadata carried by every factory entry, independent of its variant.
#[derive(Debug)]
pub struct EntryMeta {
    registration_count: AtomicU64,
    last_registered_at_millis: AtomicU64,
}

impl EntryMeta {
    fn new() -> Self {
        let meta = Self {
            registration_count: AtomicU64::new(0),
            last_registered_at_millis: AtomicU64::new(0),
        };
        meta.touch();
        meta
    }

    fn touch(&self) {
        self.registration_count.fetch_add(1, Ordering::Relaxed);
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.last_registered_at_millis.store(millis, Ordering::Relaxed);
    }

    pub fn registration_count(&self) -> u64 {
        self.registration_count.load(Ordering::Relaxed)
    }

    pub fn last_registered_at_millis(&self) -> u64 {
        self.last_registered_at_millis.load(Ordering::Relaxed)
    }
}

/// A tagged variant for the constructor behind a registered type, mirroring
/// the five shapes a provider can take.
///
/// Cheap to clone: every field is an `Arc`-wrapped callable (or, for
/// `AsyncOnce`, an `Arc`-wrapped cell), so a clone shares the same
/// underlying closure and — for `AsyncOnce` — the same memoization cell as
/// the original. The snapshot layer relies on this: a cloned variant stored
/// in a snapshot slot still joins the same once-only construction as the
/// registry's authoritative copy.
#[derive(Clone)]
pub enum FactoryVariant {
    Sync(SyncFn),
    Async(AsyncFn),
    AsyncOnce {
        factory: AsyncFn,
        cell: Arc<AsyncOnceCell<BoxedAny>>,
    },
    ScopedSync {
        kind: ScopeKind,
        factory: SyncFn,
    },
    ScopedAsync {
        kind: ScopeKind,
        factory: AsyncFn,
    },
}

impl FactoryVariant {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Sync(_) => "sync",
            Self::Async(_) => "async",
            Self::AsyncOnce { .. } => "async-once",
            Self::ScopedSync { .. } => "scoped-sync",
            Self::ScopedAsync { .. } => "scoped-async",
        }
    }

    pub fn is_async(&self) -> bool {
        matches!(
            self,
            Self::Async(_) | Self::AsyncOnce { .. } | Self::ScopedAsync { .. }
        )
    }

    pub fn scope_kind(&self) -> Option<&ScopeKind> {
        match self {
            Self::ScopedSync { kind, .. } | Self::ScopedAsync { kind, .. } => Some(kind),
            _ => None,
        }
    }
}

/// A [`FactoryVariant`] plus the metadata the diagnostics engine and the
/// registry's "at most one entry per key" invariant depend on.
pub struct FactoryEntry {
    pub variant: FactoryVariant,
    pub meta: EntryMeta,
}

impl FactoryEntry {
    pub fn new(variant: FactoryVariant) -> Self {
        Self {
            variant,
            meta: EntryMeta::new(),
        }
    }

    /// Re-registration: atomically replace the variant, bumping the
    /// metadata's registration count rather than resetting it.
    pub fn replace(&mut self, variant: FactoryVariant) {
        self.variant = variant;
        self.meta.touch();
    }

    pub fn sync(f: impl Fn() -> BoxedAny + Send + Sync + 'static) -> Self {
        Self::new(FactoryVariant::Sync(Arc::new(f)))
    }

    pub fn r#async(
        f: impl Fn() -> Pin<Box<dyn Future<Output = BoxedAny> + Send>> + Send + Sync + 'static,
    ) -> Self {
        Self::new(FactoryVariant::Async(Arc::new(f)))
    }

    pub fn async_once(
        f: impl Fn() -> Pin<Box<dyn Future<Output = BoxedAny> + Send>> + Send + Sync + 'static,
    ) -> Self {
        Self::new(FactoryVariant::AsyncOnce {
            factory: Arc::new(f),
            cell: Arc::new(AsyncOnceCell::new()),
        })
    }

    pub fn scoped_sync(kind: ScopeKind, f: impl Fn() -> BoxedAny + Send + Sync + 'static) -> Self {
        Self::new(FactoryVariant::ScopedSync {
            kind,
            factory: Arc::new(f),
        })
    }

    pub fn scoped_async(
        kind: ScopeKind,
        f: impl Fn() -> Pin<Box<dyn Future<Output = BoxedAny> + Send>> + Send + Sync + 'static,
    ) -> Self {
        Self::new(FactoryVariant::ScopedAsync {
            kind,
            factory: Arc::new(f),
        })
    }
}

/// Downcasts a type-erased value back to `T`.
///
/// Safe by contract: every `BoxedAny` stored under a given [`TypeKey`] in the
/// registry was produced by a factory registered for exactly that `T`.
pub fn downcast<T: Send + Sync + 'static>(value: BoxedAny) -> Arc<T> {
    value
        .downcast::<T>()
        .unwrap_or_else(|_| panic!("factory entry produced a value of the wrong type"))
}
