//! Host objects exposed to the engine as external values.
//!
//! Wrapping a host object allocates an external whose payload only points at
//! the object, plus a [`ReleaseContainer`] that owns a strong reference to it
//! and a weak handle to the external. The container frees itself once the
//! engine has collected the external:
//!
//! ```text
//! Armed ──first pass──▶ FirstPassDone ──second pass──▶ Released
//!         reset handle                  schedule release, free container
//! ```

use crate::engine::{External, Global, ValueId, WeakCallbackInfo};
use crate::error::BridgeError;
use crate::host::HostObject;
use crate::isolate::{Isolate, IsolateId};

/// A host object living in an isolate as an external value.
///
/// An `ExternalRef` does not keep its value alive; only reachability from the
/// isolate's roots does. Once the value has been collected, [`value`] reports
/// [`BridgeError::ExternalCollected`].
///
/// [`value`]: ExternalRef::value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExternalRef {
    value: ValueId,
}

impl ExternalRef {
    /// Wrap `object` into a new external value of `isolate`.
    ///
    /// Only fails if the isolate cannot allocate.
    pub fn new(isolate: &mut Isolate, object: HostObject) -> Result<Self, BridgeError> {
        let value = isolate.new_external(object.downgrade())?;
        let global = Global::<External>::new(isolate, value)?;
        let addr = object.addr();

        let container = Box::into_raw(Box::new(ReleaseContainer {
            global,
            object,
            phase: ReleasePhase::Armed,
        }));

        // SAFETY: `container` was just allocated and nothing else refers to it.
        // From here on only `ReleaseContainer::release` touches it, and it
        // frees it at the end of the second pass.
        unsafe {
            (*container).global.set_weak(container, ReleaseContainer::release);
        }

        tracing::trace!(
            "Isolate {}: wrapped host object {:#x} as {:?}",
            isolate.id(),
            addr,
            value
        );

        Ok(Self { value })
    }

    /// Recover an `ExternalRef` from a value read back out of the heap.
    ///
    /// Fails with [`BridgeError::WrongIsolate`] if `value` belongs to another
    /// isolate.
    pub fn from_value(isolate: &Isolate, value: ValueId) -> Result<Self, BridgeError> {
        isolate.external_payload(value)?;

        Ok(Self { value })
    }

    /// The wrapped host object.
    pub fn value(&self, isolate: &Isolate) -> Result<HostObject, BridgeError> {
        let payload = isolate.external_payload(self.value).map_err(|err| match err {
            BridgeError::StaleValue(value) => BridgeError::ExternalCollected(value),
            other => other,
        })?;

        payload
            .upgrade()
            .ok_or(BridgeError::ExternalCollected(self.value))
    }

    /// The external value, for storing into objects.
    pub fn handle(&self) -> ValueId {
        self.value
    }

    pub fn isolate_id(&self) -> IsolateId {
        self.value.isolate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReleasePhase {
    Armed,
    FirstPassDone,
}

/// Keeps the host object alive for as long as its external is reachable.
///
/// Allocated with `Box::into_raw` in [`ExternalRef::new`] and freed exactly
/// once, at the end of the second weak-callback pass.
struct ReleaseContainer {
    global: Global<External>,
    object: HostObject,
    phase: ReleasePhase,
}

impl ReleaseContainer {
    fn release(info: &mut WeakCallbackInfo<'_, ReleaseContainer>) {
        let container = info.parameter();

        if info.is_first_pass() {
            // SAFETY: the container stays allocated until the second pass below,
            // and the collector never runs two passes for it at once.
            let container = unsafe { &mut *container };
            assert_eq!(container.phase, ReleasePhase::Armed);

            container.global.reset();
            container.phase = ReleasePhase::FirstPassDone;
            info.set_second_pass_callback(Self::release);
        } else {
            // SAFETY: allocated by `Box::into_raw` in `ExternalRef::new`; the
            // second pass runs once, so this is the only `from_raw`.
            let container = unsafe { Box::from_raw(container) };
            assert_eq!(container.phase, ReleasePhase::FirstPassDone);

            let ReleaseContainer { object, .. } = *container;
            info.isolate().schedule_release_object(object);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Object, Value};
    use crate::limits::IsolateLimits;

    #[test]
    fn test_round_trip() {
        let mut isolate = Isolate::new(IsolateLimits::default());
        let object = HostObject::new(String::from("obj1"));

        let external = ExternalRef::new(&mut isolate, object.clone()).expect("wrap");
        let unwrapped = external.value(&isolate).expect("unwrap");

        assert!(unwrapped.ptr_eq(&object));
        assert_eq!(unwrapped.downcast_ref::<String>().map(String::as_str), Some("obj1"));
        assert_eq!(external.isolate_id(), isolate.id());
    }

    #[test]
    fn test_repeated_unwrap_is_stable() {
        let mut isolate = Isolate::new(IsolateLimits::default());
        let object = HostObject::new(42u32);
        let external = ExternalRef::new(&mut isolate, object.clone()).expect("wrap");
        let _root = Global::<Value>::new(&isolate, external.handle()).expect("root");

        for _ in 0..3 {
            let unwrapped = external.value(&isolate).expect("unwrap");
            assert!(unwrapped.ptr_eq(&object));
        }
        // Caller's clone + the container's reference.
        assert_eq!(object.strong_count(), 2);
    }

    #[test]
    fn test_wrap_arms_one_weak_callback() {
        let mut isolate = Isolate::new(IsolateLimits::default());
        ExternalRef::new(&mut isolate, HostObject::new(())).expect("wrap");

        let stats = isolate.heap_statistics();
        assert_eq!(stats.live_values, 1);
        assert_eq!(stats.live_handles, 1);
        assert_eq!(stats.armed_weak_callbacks, 1);
    }

    #[test]
    fn test_unwrap_after_collection_fails() {
        let mut isolate = Isolate::new(IsolateLimits::default());
        let external = ExternalRef::new(&mut isolate, HostObject::new(1u8)).expect("wrap");

        isolate.collect_garbage();

        assert_eq!(
            external.value(&isolate).unwrap_err(),
            BridgeError::ExternalCollected(external.handle())
        );
        let stats = isolate.heap_statistics();
        assert_eq!(stats.live_handles, 0);
        assert_eq!(stats.armed_weak_callbacks, 0);
    }

    #[test]
    fn test_wrong_isolate() {
        let mut a = Isolate::new(IsolateLimits::default());
        let b = Isolate::new(IsolateLimits::default());
        let external = ExternalRef::new(&mut a, HostObject::new(1u8)).expect("wrap");

        assert_eq!(
            external.value(&b).unwrap_err(),
            BridgeError::WrongIsolate {
                expected: a.id(),
                actual: b.id(),
            }
        );
    }

    #[test]
    fn test_from_value_rejects_foreign_handle() {
        let mut a = Isolate::new(IsolateLimits::default());
        let mut b = Isolate::new(IsolateLimits::default());
        let in_a = ExternalRef::new(&mut a, HostObject::new("A")).expect("wrap");
        let in_b = ExternalRef::new(&mut b, HostObject::new("B")).expect("wrap");

        // Both externals sit in the first slot of their heap.
        assert_ne!(in_a.handle(), in_b.handle());
        assert_eq!(
            ExternalRef::from_value(&b, in_a.handle()),
            Err(BridgeError::WrongIsolate {
                expected: a.id(),
                actual: b.id(),
            })
        );

        let unwrapped = in_a.value(&a).expect("unwrap");
        assert_eq!(unwrapped.downcast_ref::<&str>(), Some(&"A"));
    }

    #[test]
    fn test_from_value() {
        let mut isolate = Isolate::new(IsolateLimits::default());
        let object = HostObject::new(3.5f64);
        let external = ExternalRef::new(&mut isolate, object.clone()).expect("wrap");
        let holder = isolate.new_object().expect("alloc");

        assert_eq!(ExternalRef::from_value(&isolate, external.handle()), Ok(external));
        assert_eq!(
            ExternalRef::from_value(&isolate, holder),
            Err(BridgeError::NotExternal(holder))
        );

        let _root = Global::<Object>::new(&isolate, holder).expect("root");
        isolate
            .set_property(holder, "payload", external.handle())
            .expect("set");
        isolate.collect_garbage();

        let stored = isolate
            .get_property(holder, "payload")
            .expect("get")
            .expect("present");
        let recovered = ExternalRef::from_value(&isolate, stored).expect("external");
        assert!(recovered.value(&isolate).expect("unwrap").ptr_eq(&object));
    }
}
