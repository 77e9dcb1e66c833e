#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use external_bridge::{GcEvent, HandleId, Isolate};

/// Record every GC event emitted by `isolate`.
pub fn record_events(isolate: &mut Isolate) -> Rc<RefCell<Vec<GcEvent>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    isolate.set_gc_observer(move |event: &GcEvent| sink.borrow_mut().push(event.clone()));
    events
}

pub fn releases_of(events: &[GcEvent], addr: usize) -> usize {
    events
        .iter()
        .filter(|event| matches!(event, GcEvent::ReleaseScheduled { object } if *object == addr))
        .count()
}

pub fn first_passes(events: &[GcEvent]) -> Vec<HandleId> {
    events
        .iter()
        .filter_map(|event| match event {
            GcEvent::FirstPass { handle } => Some(*handle),
            _ => None,
        })
        .collect()
}

pub fn second_passes(events: &[GcEvent]) -> Vec<HandleId> {
    events
        .iter()
        .filter_map(|event| match event {
            GcEvent::SecondPass { handle } => Some(*handle),
            _ => None,
        })
        .collect()
}

/// Host value that counts how many times it was dropped.
pub struct Tracked {
    pub name: &'static str,
    drops: Arc<AtomicUsize>,
}

impl Tracked {
    pub fn new(name: &'static str, drops: &Arc<AtomicUsize>) -> Self {
        Self {
            name,
            drops: Arc::clone(drops),
        }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn drop_counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

pub fn drops(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}
