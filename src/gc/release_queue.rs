//! Deferred release queue for host objects.
//!
//! ## Problem
//!
//! The engine learns that an external is dead while it is collecting. Dropping
//! the host object right there would run host destructors on the collector's
//! stack, and those destructors may call back into the engine.
//!
//! ## Solution
//!
//! The second-pass weak callback hands the host object to this queue, and the
//! queue is drained at a known-safe point (`JsLock` acquisition and release, or
//! an explicit `Isolate::process_pending_releases()`).
//!
//! ## Usage
//!
//! ```ignore
//! let queue = ReleaseQueue::new();
//!
//! // From a second-pass callback
//! queue.defer(host_object);
//!
//! // Between script invocations
//! queue.process_all();
//! ```

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::host::HostObject;

/// Per-isolate queue of host objects waiting to be released.
pub struct ReleaseQueue {
    queue: Mutex<VecDeque<HostObject>>,

    /// Fast check for pending items (avoids lock acquisition on hot path)
    pending_count: AtomicU64,
}

impl Default for ReleaseQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ReleaseQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(8)),
            pending_count: AtomicU64::new(0),
        }
    }

    /// Take ownership of `object` until the next drain. Never blocks on
    /// anything but the queue mutex.
    pub fn defer(&self, object: HostObject) {
        let addr = object.addr();
        self.queue
            .lock()
            .expect("release queue poisoned")
            .push_back(object);
        self.pending_count.fetch_add(1, Ordering::Release);

        tracing::trace!(
            "Deferred release of host object {:#x} (pending: {})",
            addr,
            self.len()
        );
    }

    #[inline]
    pub fn has_pending(&self) -> bool {
        self.pending_count.load(Ordering::Acquire) > 0
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.pending_count.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.has_pending()
    }

    /// Release every queued host object. Returns how many were released.
    ///
    /// Host destructors run here, after the queue mutex has been released, so
    /// a destructor that schedules another release does not deadlock; such a
    /// release waits for the next drain.
    pub fn process_all(&self) -> usize {
        if !self.has_pending() {
            return 0;
        }

        let objects: VecDeque<HostObject> = {
            let mut queue = self.queue.lock().expect("release queue poisoned");
            std::mem::take(&mut *queue)
        };

        let count = objects.len();

        if count == 0 {
            return 0;
        }

        self.pending_count
            .fetch_sub(count as u64, Ordering::Release);

        drop(objects);

        tracing::trace!("Released {} host objects", count);
        count
    }
}

impl std::fmt::Debug for ReleaseQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleaseQueue")
            .field("pending_count", &self.len())
            .finish()
    }
}
