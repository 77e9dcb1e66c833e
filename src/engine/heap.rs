//! Slot-indexed engine heap.
//!
//! Values live in slots addressed by [`ValueId`]. Sweeping a slot bumps its
//! generation, so ids held past a collection resolve to nothing instead of
//! aliasing whatever reuses the slot. Ids also carry the owning isolate, so
//! an id from another isolate never resolves here.

use std::collections::HashMap;

use crate::error::BridgeError;
use crate::host::WeakHostObject;
use crate::isolate::IsolateId;

/// Reference to a value in an isolate's heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueId {
    isolate: IsolateId,
    index: u32,
    generation: u32,
}

impl ValueId {
    /// The isolate whose heap holds this value.
    pub fn isolate(&self) -> IsolateId {
        self.isolate
    }
}

pub(crate) enum HeapValue {
    /// Opaque pointer to a host object. Not owning: the host side keeps the
    /// object alive.
    External(WeakHostObject),
    Object(HashMap<String, ValueId>),
}

impl HeapValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            HeapValue::External(_) => ValueKind::External,
            HeapValue::Object(_) => ValueKind::Object,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    External,
    Object,
}

/// Kind marker for typed handles.
pub trait HeapKind {
    fn check(kind: ValueKind, id: ValueId) -> Result<(), BridgeError>;
}

/// Any heap value.
pub struct Value;

/// An external value carrying a host object.
pub struct External;

/// A property bag.
pub struct Object;

impl HeapKind for Value {
    fn check(_: ValueKind, _: ValueId) -> Result<(), BridgeError> {
        Ok(())
    }
}

impl HeapKind for External {
    fn check(kind: ValueKind, id: ValueId) -> Result<(), BridgeError> {
        match kind {
            ValueKind::External => Ok(()),
            _ => Err(BridgeError::NotExternal(id)),
        }
    }
}

impl HeapKind for Object {
    fn check(kind: ValueKind, id: ValueId) -> Result<(), BridgeError> {
        match kind {
            ValueKind::Object => Ok(()),
            _ => Err(BridgeError::NotAnObject(id)),
        }
    }
}

struct Slot {
    generation: u32,
    value: Option<HeapValue>,
}

/// Mark bits from one traversal, indexed by slot.
pub(crate) struct Marks {
    owner: IsolateId,
    bits: Vec<bool>,
    count: usize,
}

impl Marks {
    pub fn is_marked(&self, id: ValueId) -> bool {
        id.isolate == self.owner && self.bits.get(id.index as usize).copied().unwrap_or(false)
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

pub(crate) struct Heap {
    owner: IsolateId,
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl Heap {
    pub fn new(owner: IsolateId) -> Self {
        Self {
            owner,
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    pub fn allocate(&mut self, value: HeapValue) -> ValueId {
        self.live += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return ValueId {
                isolate: self.owner,
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        ValueId {
            isolate: self.owner,
            index,
            generation: 0,
        }
    }

    pub fn get(&self, id: ValueId) -> Option<&HeapValue> {
        if id.isolate != self.owner {
            return None;
        }
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, id: ValueId) -> Option<&mut HeapValue> {
        if id.isolate != self.owner {
            return None;
        }
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    pub fn is_alive(&self, id: ValueId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live values.
    pub fn live(&self) -> usize {
        self.live
    }

    /// Number of slots ever allocated (live + free).
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Mark everything reachable from `roots` through object properties.
    pub fn mark(&self, roots: impl IntoIterator<Item = ValueId>) -> Marks {
        let mut marks = Marks {
            owner: self.owner,
            bits: vec![false; self.slots.len()],
            count: 0,
        };
        let mut worklist: Vec<ValueId> = roots.into_iter().collect();

        while let Some(id) = worklist.pop() {
            let Some(value) = self.get(id) else {
                continue;
            };
            let bit = &mut marks.bits[id.index as usize];
            if *bit {
                continue;
            }
            *bit = true;
            marks.count += 1;

            if let HeapValue::Object(properties) = value {
                worklist.extend(properties.values().copied());
            }
        }

        marks
    }

    /// Free every unmarked value. Returns the number of values swept.
    pub fn sweep(&mut self, marks: &Marks) -> usize {
        let mut swept = 0;

        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.value.is_none() || marks.bits.get(index).copied().unwrap_or(false) {
                continue;
            }
            slot.value = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(index as u32);
            swept += 1;
        }

        self.live -= swept;
        swept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object() -> HeapValue {
        HeapValue::Object(HashMap::new())
    }

    fn link(heap: &mut Heap, from: ValueId, key: &str, to: ValueId) {
        match heap.get_mut(from) {
            Some(HeapValue::Object(properties)) => {
                properties.insert(key.to_string(), to);
            }
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_allocate_and_get() {
        let mut heap = Heap::new(IsolateId::next());
        let a = heap.allocate(object());
        let b = heap.allocate(object());

        assert_ne!(a, b);
        assert!(heap.is_alive(a));
        assert!(heap.is_alive(b));
        assert_eq!(heap.live(), 2);
    }

    #[test]
    fn test_mark_follows_properties() {
        let mut heap = Heap::new(IsolateId::next());
        let root = heap.allocate(object());
        let child = heap.allocate(object());
        let orphan = heap.allocate(object());
        link(&mut heap, root, "child", child);

        let marks = heap.mark([root]);
        assert!(marks.is_marked(root));
        assert!(marks.is_marked(child));
        assert!(!marks.is_marked(orphan));
        assert_eq!(marks.count(), 2);
    }

    #[test]
    fn test_mark_handles_cycles() {
        let mut heap = Heap::new(IsolateId::next());
        let a = heap.allocate(object());
        let b = heap.allocate(object());
        link(&mut heap, a, "b", b);
        link(&mut heap, b, "a", a);

        let marks = heap.mark([a]);
        assert_eq!(marks.count(), 2);
    }

    #[test]
    fn test_sweep_invalidates_ids() {
        let mut heap = Heap::new(IsolateId::next());
        let kept = heap.allocate(object());
        let dropped = heap.allocate(object());

        let marks = heap.mark([kept]);
        assert_eq!(heap.sweep(&marks), 1);
        assert!(heap.is_alive(kept));
        assert!(!heap.is_alive(dropped));
        assert_eq!(heap.live(), 1);

        // The freed slot is reused under a new generation.
        let reused = heap.allocate(object());
        assert_ne!(reused, dropped);
        assert!(!heap.is_alive(dropped));
        assert_eq!(heap.capacity(), 2);
    }

    #[test]
    fn test_kind_checks() {
        let mut heap = Heap::new(IsolateId::next());
        let id = heap.allocate(object());
        let kind = heap.get(id).expect("alive").kind();

        assert_eq!(kind, ValueKind::Object);
        assert!(Object::check(kind, id).is_ok());
        assert!(Value::check(kind, id).is_ok());
        assert_eq!(External::check(kind, id), Err(BridgeError::NotExternal(id)));
    }

    #[test]
    fn test_foreign_ids_do_not_resolve() {
        let owner = IsolateId::next();
        let mut a = Heap::new(owner);
        let mut b = Heap::new(IsolateId::next());
        let in_a = a.allocate(object());
        let in_b = b.allocate(object());

        // Same slot, same generation, different owner.
        assert_eq!(in_a.isolate(), owner);
        assert!(!b.is_alive(in_a));
        assert!(b.get_mut(in_a).is_none());
        assert!(!a.mark([in_b]).is_marked(in_a));
        let marks = b.mark([in_a]);
        assert_eq!(b.sweep(&marks), 1);
        assert!(a.is_alive(in_a));
    }
}
