//! Engine instance: owns the heap, runs collections and keeps the inbox of
//! host objects awaiting release.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::engine::{
    CallbackPass, GcEvent, GcObserver, GcSummary, HandleTable, Heap, HeapStatistics, HeapValue,
    PendingWeak, ValueId, ValueKind,
};
use crate::error::BridgeError;
use crate::gc::ReleaseQueue;
use crate::host::{HostObject, WeakHostObject};
use crate::limits::IsolateLimits;

static NEXT_ISOLATE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IsolateId(u64);

impl IsolateId {
    pub(crate) fn next() -> Self {
        IsolateId(NEXT_ISOLATE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for IsolateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GcState {
    Idle,
    /// Heap traversal: first-pass callbacks and sweep.
    FirstPass,
    SecondPass,
}

/// An engine instance.
///
/// Values are only kept alive by strong `Global` handles (directly or through
/// object properties). Everything else is reclaimed by the next collection.
pub struct Isolate {
    id: IsolateId,
    limits: IsolateLimits,
    heap: Heap,
    handles: Rc<RefCell<HandleTable>>,
    release_queue: ReleaseQueue,
    observer: RefCell<Option<Box<dyn GcObserver>>>,
    gc_state: Cell<GcState>,
    allocations_since_gc: usize,
    collections: u64,
}

impl Default for Isolate {
    fn default() -> Self {
        Self::new(IsolateLimits::default())
    }
}

impl Isolate {
    pub fn new(limits: IsolateLimits) -> Self {
        let id = IsolateId::next();
        log::debug!("Creating isolate {} ({:?})", id, limits);

        Self {
            id,
            limits,
            heap: Heap::new(id),
            handles: Rc::new(RefCell::new(HandleTable::default())),
            release_queue: ReleaseQueue::new(),
            observer: RefCell::new(None),
            gc_state: Cell::new(GcState::Idle),
            allocations_since_gc: 0,
            collections: 0,
        }
    }

    pub fn id(&self) -> IsolateId {
        self.id
    }

    pub fn limits(&self) -> &IsolateLimits {
        &self.limits
    }

    pub fn set_gc_observer(&mut self, observer: impl GcObserver + 'static) {
        *self.observer.borrow_mut() = Some(Box::new(observer));
    }

    pub fn clear_gc_observer(&mut self) {
        self.observer.borrow_mut().take();
    }

    fn emit(&self, event: GcEvent) {
        if let Some(observer) = self.observer.borrow_mut().as_mut() {
            observer.on_event(&event);
        }
    }

    fn is_collecting(&self) -> bool {
        self.gc_state.get() != GcState::Idle
    }

    // ---- Values -----------------------------------------------------------

    pub(crate) fn new_external(&mut self, payload: WeakHostObject) -> Result<ValueId, BridgeError> {
        self.allocate(HeapValue::External(payload))
    }

    pub fn new_object(&mut self) -> Result<ValueId, BridgeError> {
        self.allocate(HeapValue::Object(HashMap::new()))
    }

    fn allocate(&mut self, value: HeapValue) -> Result<ValueId, BridgeError> {
        // The new value would be swept in the middle of the cycle.
        assert!(
            self.gc_state.get() != GcState::FirstPass,
            "values must not be allocated from a first-pass weak callback"
        );

        let interval = self.limits.gc_interval_allocations;
        if interval > 0 && self.allocations_since_gc >= interval && !self.is_collecting() {
            self.collect_garbage();
        }

        let limit = self.limits.max_heap_values;
        if self.heap.live() >= limit {
            if !self.is_collecting() {
                log::debug!("Isolate {}: heap limit reached, forcing collection", self.id);
                self.collect_garbage();
            }

            let live = self.heap.live();
            if live >= limit {
                log::warn!(
                    "Isolate {}: allocation failed ({} live values, limit {})",
                    self.id,
                    live,
                    limit
                );
                return Err(BridgeError::HeapExhausted { live, limit });
            }
        }

        self.allocations_since_gc += 1;
        Ok(self.heap.allocate(value))
    }

    pub fn is_alive(&self, value: ValueId) -> bool {
        self.heap.is_alive(value)
    }

    /// Rejects ids handed out by another isolate.
    fn check_owner(&self, value: ValueId) -> Result<(), BridgeError> {
        if value.isolate() == self.id {
            Ok(())
        } else {
            Err(BridgeError::WrongIsolate {
                expected: value.isolate(),
                actual: self.id,
            })
        }
    }

    pub fn value_kind(&self, value: ValueId) -> Result<ValueKind, BridgeError> {
        self.check_owner(value)?;
        self.heap
            .get(value)
            .map(HeapValue::kind)
            .ok_or(BridgeError::StaleValue(value))
    }

    pub fn set_property(
        &mut self,
        object: ValueId,
        key: impl Into<String>,
        value: ValueId,
    ) -> Result<(), BridgeError> {
        self.check_owner(object)?;
        self.check_owner(value)?;
        if !self.heap.is_alive(value) {
            return Err(BridgeError::StaleValue(value));
        }
        match self.heap.get_mut(object) {
            Some(HeapValue::Object(properties)) => {
                properties.insert(key.into(), value);
                Ok(())
            }
            Some(_) => Err(BridgeError::NotAnObject(object)),
            None => Err(BridgeError::StaleValue(object)),
        }
    }

    pub fn get_property(&self, object: ValueId, key: &str) -> Result<Option<ValueId>, BridgeError> {
        self.check_owner(object)?;
        match self.heap.get(object) {
            Some(HeapValue::Object(properties)) => Ok(properties.get(key).copied()),
            Some(_) => Err(BridgeError::NotAnObject(object)),
            None => Err(BridgeError::StaleValue(object)),
        }
    }

    pub fn delete_property(
        &mut self,
        object: ValueId,
        key: &str,
    ) -> Result<Option<ValueId>, BridgeError> {
        self.check_owner(object)?;
        match self.heap.get_mut(object) {
            Some(HeapValue::Object(properties)) => Ok(properties.remove(key)),
            Some(_) => Err(BridgeError::NotAnObject(object)),
            None => Err(BridgeError::StaleValue(object)),
        }
    }

    pub(crate) fn external_payload(&self, value: ValueId) -> Result<&WeakHostObject, BridgeError> {
        self.check_owner(value)?;
        match self.heap.get(value) {
            Some(HeapValue::External(payload)) => Ok(payload),
            Some(_) => Err(BridgeError::NotExternal(value)),
            None => Err(BridgeError::StaleValue(value)),
        }
    }

    pub(crate) fn handle_table(&self) -> &Rc<RefCell<HandleTable>> {
        &self.handles
    }

    // ---- Collection -------------------------------------------------------

    /// Run a full collection cycle.
    ///
    /// Refused (returns an empty summary) when called from inside a weak
    /// callback: the collector is not re-entrant.
    pub fn collect_garbage(&mut self) -> GcSummary {
        if self.is_collecting() {
            log::warn!(
                "Isolate {}: collection requested during {:?}; ignored",
                self.id,
                self.gc_state.get()
            );
            return GcSummary::default();
        }

        self.emit(GcEvent::Prologue);
        let mut summary = GcSummary::default();

        let roots = self.handles.borrow().strong_roots();
        let marks = self.heap.mark(roots);
        summary.marked = marks.count();

        let condemned = self
            .handles
            .borrow_mut()
            .take_condemned(|value| marks.is_marked(value));

        let rearmed = self.run_first_pass(condemned, &mut summary);

        summary.swept = self.heap.sweep(&marks);
        summary.weak_handles_cleared = self
            .handles
            .borrow_mut()
            .clear_dead_weak(|value| self.heap.is_alive(value));

        self.run_second_pass(rearmed, &mut summary);

        self.allocations_since_gc = 0;
        self.collections += 1;

        log::debug!(
            "Isolate {}: collection {} done (marked {}, swept {}, finalized {})",
            self.id,
            self.collections,
            summary.marked,
            summary.swept,
            summary.second_pass_callbacks
        );
        self.emit(GcEvent::Epilogue { summary });

        summary
    }

    /// First pass over condemned weak handles. Each callback must reset its
    /// handle; the ones that ask for a second pass are returned.
    fn run_first_pass(
        &mut self,
        condemned: Vec<PendingWeak>,
        summary: &mut GcSummary,
    ) -> Vec<PendingWeak> {
        self.gc_state.set(GcState::FirstPass);
        let mut rearmed = Vec::with_capacity(condemned.len());

        for (handle, mut callback) in condemned {
            self.emit(GcEvent::FirstPass { handle });
            summary.first_pass_callbacks += 1;

            let wants_second_pass = callback.invoke(self, CallbackPass::First);

            assert!(
                !self.handles.borrow().contains(handle),
                "weak handle {handle:?} was not reset by its first-pass callback"
            );

            if wants_second_pass {
                rearmed.push((handle, callback));
            }
        }

        rearmed
    }

    fn run_second_pass(&mut self, rearmed: Vec<PendingWeak>, summary: &mut GcSummary) {
        self.gc_state.set(GcState::SecondPass);

        for (handle, mut callback) in rearmed {
            self.emit(GcEvent::SecondPass { handle });
            summary.second_pass_callbacks += 1;
            callback.invoke(self, CallbackPass::Second);
        }

        self.gc_state.set(GcState::Idle);
    }

    // ---- Deferred release -------------------------------------------------

    /// Take ownership of `object` and release it once no collection is running.
    ///
    /// # Panics
    ///
    /// When called from a first-pass weak callback. Host-side side effects
    /// belong in the second pass.
    pub fn schedule_release_object(&self, object: HostObject) {
        assert!(
            self.gc_state.get() != GcState::FirstPass,
            "host objects must not be released from a first-pass weak callback"
        );

        self.emit(GcEvent::ReleaseScheduled {
            object: object.addr(),
        });
        self.release_queue.defer(object);
    }

    /// Release every queued host object. A no-op while a collection is in
    /// progress. Returns the number of objects released.
    pub fn process_pending_releases(&self) -> usize {
        if self.is_collecting() {
            log::trace!(
                "Isolate {}: releases deferred, collection in progress",
                self.id
            );
            return 0;
        }

        let count = self.release_queue.process_all();
        if count > 0 {
            self.emit(GcEvent::ReleasesProcessed { count });
        }
        count
    }

    pub fn pending_releases(&self) -> u64 {
        self.release_queue.len()
    }

    pub fn heap_statistics(&self) -> HeapStatistics {
        let handles = self.handles.borrow();

        HeapStatistics {
            live_values: self.heap.live(),
            heap_slots: self.heap.capacity(),
            live_handles: handles.live(),
            armed_weak_callbacks: handles.armed_callbacks(),
            collections: self.collections,
            pending_releases: self.release_queue.len(),
        }
    }

    /// Teardown: every still-armed weak callback runs both passes, as if all
    /// values had become unreachable, then the release queue is drained.
    fn finalize_all(&mut self) {
        let armed = self.handles.borrow_mut().take_all_callbacks();

        if !armed.is_empty() {
            log::debug!(
                "Isolate {}: finalizing {} armed weak handles on teardown",
                self.id,
                armed.len()
            );
        }

        let mut summary = GcSummary::default();
        let rearmed = self.run_first_pass(armed, &mut summary);
        self.run_second_pass(rearmed, &mut summary);

        let released = self.process_pending_releases();
        log::debug!(
            "Isolate {} disposed ({} host objects released)",
            self.id,
            released
        );
    }
}

impl Drop for Isolate {
    fn drop(&mut self) {
        self.finalize_all();
    }
}

impl std::fmt::Debug for Isolate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Isolate")
            .field("id", &self.id)
            .field("limits", &self.limits)
            .field("stats", &self.heap_statistics())
            .finish()
    }
}
