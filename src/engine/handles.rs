//! Persistent handles.
//!
//! Strong [`Global`]s are the collector's roots. A weak `Global` does not keep
//! its target alive; when the target dies its registered callback runs in two
//! passes (see [`super::weak_callback`]).

use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use super::heap::{HeapKind, ValueId};
use super::weak_callback::{PendingCallback, TypedCallback, WeakCallback};
use crate::error::BridgeError;
use crate::isolate::Isolate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId {
    index: u32,
    generation: u32,
}

pub(crate) enum HandleKind {
    Strong,
    /// `None` once the callback has been taken by the collector, or for a
    /// weak handle registered without callback.
    Weak(Option<Box<dyn PendingCallback>>),
}

pub(crate) struct HandleEntry {
    /// Cleared when a plain weak handle's target is swept.
    target: Option<ValueId>,
    kind: HandleKind,
}

struct HandleSlot {
    generation: u32,
    entry: Option<HandleEntry>,
}

pub(crate) type PendingWeak = (HandleId, Box<dyn PendingCallback>);

#[derive(Default)]
pub(crate) struct HandleTable {
    slots: Vec<HandleSlot>,
    free: Vec<u32>,
    live: usize,
}

impl HandleTable {
    pub fn insert(&mut self, target: ValueId) -> HandleId {
        let entry = HandleEntry {
            target: Some(target),
            kind: HandleKind::Strong,
        };
        self.live += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            return HandleId {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(HandleSlot {
            generation: 0,
            entry: Some(entry),
        });
        HandleId {
            index,
            generation: 0,
        }
    }

    fn entry(&self, id: HandleId) -> Option<&HandleEntry> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    fn entry_mut(&mut self, id: HandleId) -> Option<&mut HandleEntry> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_mut())
    }

    pub fn contains(&self, id: HandleId) -> bool {
        self.entry(id).is_some()
    }

    pub fn target(&self, id: HandleId) -> Option<ValueId> {
        self.entry(id).and_then(|entry| entry.target)
    }

    pub fn is_weak(&self, id: HandleId) -> bool {
        matches!(
            self.entry(id),
            Some(HandleEntry {
                kind: HandleKind::Weak(_),
                ..
            })
        )
    }

    /// Remove a handle. Returns the dropped callback registration, if any.
    pub fn remove(&mut self, id: HandleId) -> Option<HandleEntry> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)?;
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(entry)
    }

    pub fn make_weak(&mut self, id: HandleId, callback: Option<Box<dyn PendingCallback>>) {
        if let Some(entry) = self.entry_mut(id) {
            entry.kind = HandleKind::Weak(callback);
        }
    }

    pub fn live(&self) -> usize {
        self.live
    }

    fn entries(&self) -> impl Iterator<Item = &HandleEntry> {
        self.slots.iter().filter_map(|slot| slot.entry.as_ref())
    }

    /// Targets of all strong handles.
    pub fn strong_roots(&self) -> Vec<ValueId> {
        self.entries()
            .filter(|entry| matches!(entry.kind, HandleKind::Strong))
            .filter_map(|entry| entry.target)
            .collect()
    }

    /// Weak handles that still carry a callback.
    pub fn armed_callbacks(&self) -> usize {
        self.entries()
            .filter(|entry| matches!(entry.kind, HandleKind::Weak(Some(_))))
            .count()
    }

    /// Take the callbacks of weak handles whose target is not `live`.
    ///
    /// The handles themselves stay in the table: resetting them is the
    /// first-pass callback's job.
    pub fn take_condemned(&mut self, live: impl Fn(ValueId) -> bool) -> Vec<PendingWeak> {
        self.take_callbacks(|target| !target.is_some_and(&live))
    }

    /// Take every armed callback regardless of reachability (isolate teardown).
    pub fn take_all_callbacks(&mut self) -> Vec<PendingWeak> {
        self.take_callbacks(|_| true)
    }

    fn take_callbacks(
        &mut self,
        condemned: impl Fn(Option<ValueId>) -> bool,
    ) -> Vec<PendingWeak> {
        let mut taken = Vec::new();

        for (index, slot) in self.slots.iter_mut().enumerate() {
            let Some(entry) = slot.entry.as_mut() else {
                continue;
            };
            if let HandleKind::Weak(callback) = &mut entry.kind {
                if callback.is_some() && condemned(entry.target) {
                    let id = HandleId {
                        index: index as u32,
                        generation: slot.generation,
                    };
                    taken.extend(callback.take().map(|callback| (id, callback)));
                }
            }
        }

        taken
    }

    /// Clear plain weak handles whose target is gone. Returns how many.
    ///
    /// Handles with a callback still armed keep their target until the
    /// collector hands that callback out.
    pub fn clear_dead_weak(&mut self, alive: impl Fn(ValueId) -> bool) -> usize {
        let mut cleared = 0;

        for entry in self.slots.iter_mut().filter_map(|slot| slot.entry.as_mut()) {
            if !matches!(entry.kind, HandleKind::Weak(None)) {
                continue;
            }
            if entry.target.is_some_and(|target| !alive(target)) {
                entry.target = None;
                cleared += 1;
            }
        }

        cleared
    }
}

/// A persistent handle to a heap value of kind `T`.
///
/// Dropping a `Global` resets it. Once its isolate is gone, a `Global` is
/// inert.
pub struct Global<T> {
    id: Option<HandleId>,
    table: Weak<RefCell<HandleTable>>,
    _kind: PhantomData<T>,
}

impl<T: HeapKind> Global<T> {
    /// Create a strong handle to `value`.
    pub fn new(isolate: &Isolate, value: ValueId) -> Result<Self, BridgeError> {
        T::check(isolate.value_kind(value)?, value)?;

        let table = isolate.handle_table();
        let id = table.borrow_mut().insert(value);

        Ok(Self {
            id: Some(id),
            table: Rc::downgrade(table),
            _kind: PhantomData,
        })
    }
}

impl<T> Global<T> {
    pub fn empty() -> Self {
        Self {
            id: None,
            table: Weak::new(),
            _kind: PhantomData,
        }
    }

    pub fn id(&self) -> Option<HandleId> {
        self.id
    }

    pub fn is_empty(&self) -> bool {
        self.get().is_none()
    }

    /// The referenced value, or `None` after reset or once a weak target was
    /// collected.
    pub fn get(&self) -> Option<ValueId> {
        let id = self.id?;
        let table = self.table.upgrade()?;
        let target = table.borrow().target(id);
        target
    }

    pub fn is_weak(&self) -> bool {
        match (self.id, self.table.upgrade()) {
            (Some(id), Some(table)) => table.borrow().is_weak(id),
            _ => false,
        }
    }

    /// Make this handle weak, with a two-pass callback receiving `parameter`.
    pub fn set_weak<P: 'static>(&mut self, parameter: *mut P, callback: WeakCallback<P>) {
        self.make_weak(Some(Box::new(TypedCallback::new(parameter, callback))));
    }

    /// Make this handle weak without a callback; it is cleared when its
    /// target is collected.
    pub fn set_weak_without_callback(&mut self) {
        self.make_weak(None);
    }

    fn make_weak(&mut self, callback: Option<Box<dyn PendingCallback>>) {
        if let (Some(id), Some(table)) = (self.id, self.table.upgrade()) {
            table.borrow_mut().make_weak(id, callback);
        }
    }

    /// Release the handle. A weak callback that has not run yet is discarded.
    pub fn reset(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        if let Some(table) = self.table.upgrade() {
            let removed = table.borrow_mut().remove(id);
            // Drop any still-armed callback outside the table borrow.
            drop(removed);
        }
    }
}

impl<T> Drop for Global<T> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T> std::fmt::Debug for Global<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Global")
            .field("id", &self.id)
            .field("weak", &self.is_weak())
            .finish()
    }
}
