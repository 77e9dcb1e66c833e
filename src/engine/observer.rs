//! Collection events, in the spirit of engine GC prologue/epilogue hooks.

use super::handles::HandleId;

/// Outcome of one collection cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcSummary {
    pub marked: usize,
    pub swept: usize,
    pub first_pass_callbacks: usize,
    pub second_pass_callbacks: usize,
    pub weak_handles_cleared: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GcEvent {
    Prologue,
    FirstPass { handle: HandleId },
    SecondPass { handle: HandleId },
    /// A host object was handed to the isolate's release queue. `object` is
    /// its address (see `HostObject::addr`).
    ReleaseScheduled { object: usize },
    ReleasesProcessed { count: usize },
    Epilogue { summary: GcSummary },
}

pub trait GcObserver {
    fn on_event(&mut self, event: &GcEvent);
}

impl<F: FnMut(&GcEvent)> GcObserver for F {
    fn on_event(&mut self, event: &GcEvent) {
        self(event)
    }
}

/// Snapshot of an isolate's heap and handle bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStatistics {
    pub live_values: usize,
    pub heap_slots: usize,
    pub live_handles: usize,
    pub armed_weak_callbacks: usize,
    pub collections: u64,
    pub pending_releases: u64,
}
