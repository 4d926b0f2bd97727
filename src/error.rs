//! Error types for the resolution core.

use std::any::TypeId;
use thiserror::Error;

/// Errors surfaced by the `required`/`throws` resolution APIs and by
/// registration.
#[derive(Error, Debug)]
pub enum DiError {
    /// Resolve found no factory for the requested type.
    #[error("no factory registered for {type_name}")]
    NotFound {
        type_name: &'static str,
        type_id: TypeId,
    },

    /// A factory, while constructing `type_name`, resolved a type already
    /// under construction on the same caller's stack. Returned to the
    /// innermost offending call only; outer calls on the same stack that do
    /// not themselves re-enter the cycle still complete normally.
    #[error("circular dependency detected while resolving {type_name}")]
    CircularDependency { type_name: &'static str },

    /// The user-supplied constructor failed. Propagated unchanged; no
    /// partial cache entry is stored.
    #[error("failed to construct {type_name}: {reason}")]
    CreationFailed {
        type_name: &'static str,
        reason: String,
    },

    /// `reset()` was attempted outside of a debug build.
    #[error("reset() is not permitted outside debug builds")]
    ResetInProduction,

    /// Async bootstrap's user closure failed; in release builds the facade
    /// remains uninitialized rather than aborting.
    #[error("bootstrap failed: {reason}")]
    BootstrapFailed { reason: String },

    /// Internal invariant violation; never produced by correct use of the
    /// public API.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DiError {
    #[inline]
    pub fn not_found<T: 'static>() -> Self {
        Self::NotFound {
            type_name: std::any::type_name::<T>(),
            type_id: TypeId::of::<T>(),
        }
    }

    #[inline]
    pub fn creation_failed<T: 'static>(reason: impl Into<String>) -> Self {
        Self::CreationFailed {
            type_name: std::any::type_name::<T>(),
            reason: reason.into(),
        }
    }

    #[inline]
    pub fn circular<T: 'static>() -> Self {
        Self::CircularDependency {
            type_name: std::any::type_name::<T>(),
        }
    }

    #[inline]
    pub fn bootstrap_failed(reason: impl Into<String>) -> Self {
        Self::BootstrapFailed {
            reason: reason.into(),
        }
    }
}

impl Clone for DiError {
    fn clone(&self) -> Self {
        match self {
            Self::NotFound { type_name, type_id } => Self::NotFound {
                type_name,
                type_id: *type_id,
            },
            Self::CircularDependency { type_name } => Self::CircularDependency { type_name },
            Self::CreationFailed { type_name, reason } => Self::CreationFailed {
                type_name,
                reason: reason.clone(),
            },
            Self::ResetInProduction => Self::ResetInProduction,
            Self::BootstrapFailed { reason } => Self::BootstrapFailed {
                reason: reason.clone(),
            },
            Self::Internal(s) => Self::Internal(s.clone()),
        }
    }
}

/// Result type alias for resolution-core operations.
pub type Result<T> = std::result::Result<T, DiError>;

#[cfg(test)]
mod tests {
    use super::*;

    struct Widget;

    #[test]
    fn not_found_carries_type_name() {
        let err = DiError::not_found::<Widget>();
        match err {
            DiError::NotFound { type_name, .. } => assert!(type_name.contains("Widget")),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn clone_preserves_variant() {
        let err = DiError::creation_failed::<Widget>("boom");
        let cloned = err.clone();
        match (err, cloned) {
            (DiError::CreationFailed { reason: a, .. }, DiError::CreationFailed { reason: b, .. }) => {
                assert_eq!(a, b);
            }
            _ => panic!("wrong variant"),
        }
    }
}
