//! # corewire - a concurrency-safe dependency injection resolution core
//!
//! A lock-free-reads-first resolution core: register factories under a
//! static type identity, resolve them as `Arc<T>`, and scope construction to
//! a request, a session, or the whole process's lifetime.
//!
//! ## Features
//!
//! - **Five factory shapes** - sync, async, async-once, scoped-sync,
//!   scoped-async, covering everything from pure-function transients to
//!   request-scoped async database pools
//! - **Lock-free-ish reads** - an `ArcSwap`-published snapshot serves hot
//!   resolves without touching the authoritative `DashMap`
//! - **Scope-aware caching** - singleton, session, request, and custom scopes
//!   each get their own `(type, scope-id)` cache
//! - **Self-diagnosing** - optional usage tracking, cycle detection, and
//!   "did you mean" suggestions on a miss
//! - **Observable** - optional tracing integration with JSON or pretty output
//!
//! ## Quick Start
//!
//! ```rust
//! use corewire::Container;
//!
//! #[derive(Clone)]
//! struct Database {
//!     url: String,
//! }
//!
//! let container = Container::new();
//! container.singleton(|| Database { url: "postgres://localhost".into() });
//!
//! let db = container.resolve::<Database>().unwrap();
//! assert_eq!(db.url, "postgres://localhost");
//! ```
//!
//! ## Scoped Resolution
//!
//! ```rust
//! use corewire::{Container, ScopeKind};
//!
//! #[derive(Clone)]
//! struct RequestContext {
//!     id: String,
//! }
//!
//! let container = Container::new();
//! container.register_scoped(ScopeKind::Request, || RequestContext { id: "anon".into() });
//!
//! container.enter_scope(ScopeKind::Request, "req-1");
//! let ctx = container.resolve::<RequestContext>().unwrap();
//! assert_eq!(ctx.id, "anon");
//! container.leave_scope(ScopeKind::Request, "req-1");
//! ```
//!
//! ## Performance
//!
//! - Registration is the only path that takes a write lock; resolution reads
//!   a published, atomically-swapped snapshot once optimization is enabled
//! - `ahash`-backed maps for `TypeId` keys throughout
//! - `Arc<T>` returns: resolving never clones the constructed value itself

mod config;
mod container;
mod diagnostics;
mod error;
mod factory;
mod key;
#[cfg(feature = "logging")]
pub mod logging;
mod provider;
mod registry;
mod scope;
mod snapshot;

pub use config::{Config, ConfigBuilder, LogLevel};
pub use container::{BatchRegistrar, Container, ReleaseHandle};
pub use diagnostics::{Event, HealthReport};
pub use error::{DiError, Result};
pub use key::TypeKey;
pub use provider::Injectable;
pub use registry::MissDetail;
pub use scope::{ScopeId, ScopeKind};

// Re-export tracing macros for convenience when logging feature is enabled
#[cfg(feature = "logging")]
pub use tracing::{debug, error, info, trace, warn};

// Re-export for convenience
pub use std::sync::Arc;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BatchRegistrar, Config, Container, DiError, Injectable, Result, ScopeId, ScopeKind,
    };
    pub use std::sync::Arc;
}
