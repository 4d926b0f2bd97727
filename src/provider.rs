//! Marker trait satisfied by every type that can be registered.

use std::any::TypeId;

/// Satisfied by any `Send + Sync + 'static` type via a blanket impl; exists
/// so registry method signatures read in terms of the domain concept rather
/// than raw trait bounds.
pub trait Injectable: Send + Sync + 'static {
    fn type_id_of() -> TypeId
    where
        Self: Sized,
    {
        TypeId::of::<Self>()
    }

    fn type_name_of() -> &'static str
    where
        Self: Sized,
    {
        std::any::type_name::<Self>()
    }
}

impl<T: Send + Sync + 'static> Injectable for T {}
