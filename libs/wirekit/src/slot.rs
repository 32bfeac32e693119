//! Property slots a component holds instead of language-level property traps.
//!
//! [`Inject<D>`] receives a dependency from the container, either eagerly or
//! as a deferred reference that is looked up on read. [`Handled<V>`] asks the
//! handler map for its value on every read.

use crate::container::Container;
use crate::definition::downcast;
use crate::error::ContainerError;
use crate::handler::HandlerBinding;
use crate::identifier::Identifier;
use crate::definition::Instance;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock, Weak};

#[derive(Clone)]
struct Deferred {
    container: Weak<Container>,
    id: Identifier,
}

/// Property-injected dependency.
pub struct Inject<D> {
    value: OnceLock<Arc<D>>,
    deferred: Mutex<Option<Deferred>>,
}

impl<D> Default for Inject<D> {
    fn default() -> Self {
        Self {
            value: OnceLock::new(),
            deferred: Mutex::new(None),
        }
    }
}

impl<D> fmt::Debug for Inject<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.value.get().is_some() {
            "filled"
        } else if self.deferred.lock().is_some() {
            "deferred"
        } else {
            "unbound"
        };
        f.debug_struct("Inject").field("state", &state).finish()
    }
}

impl<D: Send + Sync + 'static> Inject<D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The injected dependency.
    ///
    /// A deferred slot looks its partner up in the container cache on every
    /// read and fails with [`ContainerError::DependencyNotReady`] while the
    /// partner is still being built.
    pub fn get(&self) -> Result<Arc<D>, ContainerError> {
        if let Some(v) = self.value.get() {
            return Ok(v.clone());
        }
        let deferred = self.deferred.lock().clone();
        let Some(Deferred { container, id }) = deferred else {
            return Err(ContainerError::Unbound {
                slot: std::any::type_name::<D>(),
            });
        };
        let container = container.upgrade().ok_or_else(|| ContainerError::Unbound {
            slot: std::any::type_name::<D>(),
        })?;
        let instance = container
            .peek(&id)
            .ok_or(ContainerError::DependencyNotReady { id: id.clone() })?;
        downcast::<D>(&id, instance)
    }

    pub fn is_deferred(&self) -> bool {
        self.value.get().is_none() && self.deferred.lock().is_some()
    }

    pub fn is_ready(&self) -> bool {
        self.get().is_ok()
    }
}

/// Type-erased view used by the container to fill `Inject<D>` slots.
pub(crate) trait InjectSlot {
    fn fill(&self, id: &Identifier, value: Instance) -> Result<(), ContainerError>;
    fn defer(&self, container: Weak<Container>, id: Identifier);
}

impl<D: Send + Sync + 'static> InjectSlot for Inject<D> {
    fn fill(&self, id: &Identifier, value: Instance) -> Result<(), ContainerError> {
        let typed = downcast::<D>(id, value)?;
        // a slot is filled once; re-filling keeps the first value
        let _ = self.value.set(typed);
        Ok(())
    }

    fn defer(&self, container: Weak<Container>, id: Identifier) {
        *self.deferred.lock() = Some(Deferred { container, id });
    }
}

/// Handler-bound value, recomputed on every read.
pub struct Handled<V> {
    binding: OnceLock<HandlerBinding>,
    _value: PhantomData<fn() -> V>,
}

impl<V> Default for Handled<V> {
    fn default() -> Self {
        Self {
            binding: OnceLock::new(),
            _value: PhantomData,
        }
    }
}

impl<V> fmt::Debug for Handled<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handled")
            .field("binding", &self.binding.get())
            .finish()
    }
}

impl<V: Clone + Send + Sync + 'static> Handled<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value; `None` when unbound, when no handler answers, or when
    /// the handler answered with another type.
    pub fn get(&self) -> Option<V> {
        let value = self.binding.get()?.resolve()?;
        let typed = (*value).downcast_ref::<V>().cloned();
        if typed.is_none() {
            tracing::debug!(
                expected = std::any::type_name::<V>(),
                "handler returned a value of another type"
            );
        }
        typed
    }

    pub fn is_bound(&self) -> bool {
        self.binding.get().is_some()
    }
}

impl Handled<Value> {
    /// Deserialize the current configuration value.
    pub fn get_as<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        self.get().map(serde_json::from_value).transpose()
    }
}

pub(crate) trait HandledSlot {
    /// Returns false when the slot was already bound.
    fn bind(&self, binding: HandlerBinding) -> bool;
}

impl<V: Send + Sync + 'static> HandledSlot for Handled<V> {
    fn bind(&self, binding: HandlerBinding) -> bool {
        self.binding.set(binding).is_ok()
    }
}

/// Projection from an erased owner to one of its `Inject` fields.
pub(crate) trait InjectProjector: Send + Sync {
    fn project<'a>(&self, owner: &'a (dyn Any + Send + Sync)) -> Option<&'a dyn InjectSlot>;
    fn owner_type(&self) -> &'static str;
}

pub(crate) struct InjectField<T, D> {
    pub(crate) field: fn(&T) -> &Inject<D>,
}

impl<T, D> InjectProjector for InjectField<T, D>
where
    T: Send + Sync + 'static,
    D: Send + Sync + 'static,
{
    fn project<'a>(&self, owner: &'a (dyn Any + Send + Sync)) -> Option<&'a dyn InjectSlot> {
        let owner = owner.downcast_ref::<T>()?;
        Some((self.field)(owner) as &dyn InjectSlot)
    }

    fn owner_type(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

pub(crate) trait HandledProjector: Send + Sync {
    fn project<'a>(&self, owner: &'a (dyn Any + Send + Sync)) -> Option<&'a dyn HandledSlot>;
}

pub(crate) struct HandledField<T, V> {
    pub(crate) field: fn(&T) -> &Handled<V>,
}

impl<T, V> HandledProjector for HandledField<T, V>
where
    T: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn project<'a>(&self, owner: &'a (dyn Any + Send + Sync)) -> Option<&'a dyn HandledSlot> {
        let owner = owner.downcast_ref::<T>()?;
        Some((self.field)(owner) as &dyn HandledSlot)
    }
}
