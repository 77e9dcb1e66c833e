//! Host-language object references.
//!
//! A [`HostObject`] is the host side of an external: an opaque, reference
//! counted value the engine never looks inside. Engine heap values only
//! keep the non-owning [`WeakHostObject`] form.

use std::any::Any;
use std::sync::{Arc, Weak};

/// Strong, type-erased reference to a host object.
#[derive(Clone)]
pub struct HostObject(Arc<dyn Any + Send + Sync>);

impl HostObject {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Wrap an existing shared value without reallocating it.
    pub fn from_arc(value: Arc<dyn Any + Send + Sync>) -> Self {
        Self(value)
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Identity comparison (same allocation), not value equality.
    pub fn ptr_eq(&self, other: &HostObject) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakHostObject {
        WeakHostObject(Arc::downgrade(&self.0))
    }

    /// Address of the shared allocation, used to identify objects in logs.
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl std::fmt::Debug for HostObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostObject")
            .field("addr", &format_args!("{:#x}", self.addr()))
            .field("strong_count", &self.strong_count())
            .finish()
    }
}

/// Non-owning reference to a host object, as carried by an external value.
#[derive(Clone)]
pub struct WeakHostObject(Weak<dyn Any + Send + Sync>);

impl WeakHostObject {
    pub fn upgrade(&self) -> Option<HostObject> {
        self.0.upgrade().map(HostObject)
    }
}

impl std::fmt::Debug for WeakHostObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakHostObject")
            .field("alive", &(self.0.strong_count() > 0))
            .finish()
    }
}
