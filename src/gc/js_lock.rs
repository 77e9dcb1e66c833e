//! JsLock - RAII safe point for deferred host releases.

use std::ops::{Deref, DerefMut};

use crate::isolate::Isolate;

/// Exclusive access to an isolate for running script work.
///
/// Acquiring and dropping the lock are both safe points: no collection is in
/// progress, so queued host objects are released.
///
/// # Example
///
/// ```ignore
/// {
///     let mut lock = JsLock::new(&mut isolate);
///     let external = ExternalRef::new(&mut lock, HostObject::new(data))?;
///     lock.collect_garbage();
/// } // releases scheduled by the collection are processed here
/// ```
pub struct JsLock<'a> {
    isolate: &'a mut Isolate,
}

impl<'a> JsLock<'a> {
    pub fn new(isolate: &'a mut Isolate) -> Self {
        let released = isolate.process_pending_releases();

        if released > 0 {
            log::trace!(
                "Isolate {}: released {} host objects on lock",
                isolate.id(),
                released
            );
        }

        Self { isolate }
    }
}

impl Deref for JsLock<'_> {
    type Target = Isolate;

    fn deref(&self) -> &Isolate {
        &*self.isolate
    }
}

impl DerefMut for JsLock<'_> {
    fn deref_mut(&mut self) -> &mut Isolate {
        &mut *self.isolate
    }
}

impl Drop for JsLock<'_> {
    fn drop(&mut self) {
        let released = self.isolate.process_pending_releases();

        if released > 0 {
            log::trace!(
                "Isolate {}: released {} host objects on unlock",
                self.isolate.id(),
                released
            );
        }
    }
}
