//! Entities, the owner back-reference, and the initialization hook.
//!
//! Materialized entities may need to reach the object that owns the factory
//! (for example to navigate to related collections). That association is
//! runtime-only: it is injected by [`EntityInitHook`] after deserialisation,
//! held as a [`Weak`] reference so it never keeps the owner alive, and never
//! serialised.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::EntityKey;

// ---------------------------------------------------------------------------
// Owner handle
// ---------------------------------------------------------------------------

/// Opaque, non-owning reference to the shared owning context.
///
/// The factory forwards it unchanged to every entity initialization call.
/// Entities keep it in a `#[serde(skip)]` field and call [`OwnerHandle::upgrade`]
/// when they need the owner.
#[derive(Clone, Default)]
pub struct OwnerHandle(Option<Weak<dyn Any + Send + Sync>>);

impl OwnerHandle {
    /// Creates a handle pointing at `owner` without taking ownership.
    pub fn new<T: Any + Send + Sync>(owner: &Arc<T>) -> Self {
        let owner: Arc<dyn Any + Send + Sync> = owner.clone();
        Self(Some(Arc::downgrade(&owner)))
    }

    /// A handle pointing at nothing. [`OwnerHandle::upgrade`] always returns `None`.
    pub fn detached() -> Self {
        Self(None)
    }

    /// Returns the owner if it is still alive and has type `T`.
    pub fn upgrade<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.0.as_ref()?.upgrade()?.downcast::<T>().ok()
    }

    /// Returns `true` if both handles point at the same owner allocation.
    pub fn ptr_eq(&self, other: &OwnerHandle) -> bool {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) => Weak::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for OwnerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.0 {
            None => "detached",
            Some(w) if w.strong_count() > 0 => "live",
            Some(_) => "dropped",
        };
        f.debug_tuple("OwnerHandle").field(&state).finish()
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Capability implemented by entities that want the owner back-reference.
pub trait OwnerAware {
    /// Stores (a clone of) `owner`. Called once per materialization.
    fn init_with_owner(&mut self, owner: &OwnerHandle);
}

/// Object-safe view of a freshly materialized entity, handed to
/// reading-entity hooks.
pub trait MaterializedEntity: Any {
    /// Returns the owner-aware capability if this entity has it.
    fn owner_aware(&mut self) -> Option<&mut dyn OwnerAware> {
        None
    }
}

/// An entity type a client context can query and persist.
pub trait Entity: MaterializedEntity + Serialize + DeserializeOwned {
    /// The entity's key, or `None` for an entity the service has not yet
    /// assigned one to.
    fn key(&self) -> Option<EntityKey>;
}

// ---------------------------------------------------------------------------
// Hook
// ---------------------------------------------------------------------------

/// Callback run for every entity a context materializes from a response.
pub type ReadingEntityHook = Arc<dyn Fn(&mut dyn MaterializedEntity) + Send + Sync>;

/// Gives owner-aware entities their back-reference to the shared owner.
///
/// Entities without the capability are left untouched.
#[derive(Debug, Clone)]
pub struct EntityInitHook {
    owner: OwnerHandle,
}

impl EntityInitHook {
    /// Creates a hook forwarding `owner`.
    pub fn new(owner: OwnerHandle) -> Self {
        Self { owner }
    }

    /// Runs the hook against one entity.
    pub fn on_reading_entity(&self, entity: &mut dyn MaterializedEntity) {
        if let Some(aware) = entity.owner_aware() {
            aware.init_with_owner(&self.owner);
        }
    }

    /// Converts the hook into a callback suitable for registration on a context.
    pub fn into_callback(self) -> ReadingEntityHook {
        Arc::new(move |entity: &mut dyn MaterializedEntity| self.on_reading_entity(entity))
    }
}
