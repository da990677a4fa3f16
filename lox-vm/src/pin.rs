// lox-vm - Bytecode compiler and virtual machine for the Lox scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Host-held values that the collector treats as roots.
//!
//! A [`Value`] naming a heap object is only valid while something the VM
//! marks refers to it. Hosts that keep values across `interpret` calls or
//! collections hold a [`Pinned`] instead: the value stays rooted until the
//! handle is dropped.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::heap::Heap;
use crate::value::Value;

#[derive(Default)]
struct PinSlots {
    values: Vec<Option<Value>>,
    free: Vec<usize>,
}

/// The set of values currently pinned by the host.
#[derive(Clone, Default)]
pub(crate) struct PinTable(Rc<RefCell<PinSlots>>);

impl PinTable {
    pub(crate) fn pin(&self, value: Value) -> Pinned {
        let mut slots = self.0.borrow_mut();
        let index = match slots.free.pop() {
            Some(index) => {
                slots.values[index] = Some(value);
                index
            }
            None => {
                slots.values.push(Some(value));
                slots.values.len() - 1
            }
        };
        Pinned {
            table: self.clone(),
            index,
            value,
        }
    }

    pub(crate) fn mark(&self, heap: &mut Heap) {
        for value in self.0.borrow().values.iter().flatten() {
            heap.mark_value(*value);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        let slots = self.0.borrow();
        slots.values.len() - slots.free.len()
    }

    fn release(&self, index: usize) {
        let mut slots = self.0.borrow_mut();
        slots.values[index] = None;
        slots.free.push(index);
    }
}

/// A value kept alive for the host until this handle is dropped.
///
/// Only meaningful for the VM that created it.
pub struct Pinned {
    table: PinTable,
    index: usize,
    value: Value,
}

impl Pinned {
    pub fn value(&self) -> Value {
        self.value
    }
}

impl Clone for Pinned {
    fn clone(&self) -> Self {
        self.table.pin(self.value)
    }
}

impl Drop for Pinned {
    fn drop(&mut self) {
        self.table.release(self.index);
    }
}

impl fmt::Debug for Pinned {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pinned").field(&self.value).finish()
    }
}

impl PartialEq for Pinned {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::NoRoots;

    struct PinRoots<'a>(&'a PinTable);

    impl crate::heap::Roots for PinRoots<'_> {
        fn mark_roots(&self, heap: &mut Heap) {
            self.0.mark(heap);
        }
    }

    #[test]
    fn pinned_objects_survive_collection() {
        let mut heap = Heap::default();
        let pins = PinTable::default();
        let kept = heap.intern("kept", &NoRoots);
        let pinned = pins.pin(Value::Obj(kept));
        heap.intern("dropped", &NoRoots);

        heap.collect(&PinRoots(&pins));
        assert!(heap.contains(kept));
        assert_eq!(heap.object_count(), 1);

        drop(pinned);
        heap.collect(&PinRoots(&pins));
        assert_eq!(heap.object_count(), 0);
    }

    #[test]
    fn slots_are_released_and_reused() {
        let pins = PinTable::default();
        let a = pins.pin(Value::Number(1.0));
        let b = a.clone();
        assert_eq!(pins.len(), 2);
        assert_eq!(a, b);

        drop(a);
        assert_eq!(pins.len(), 1);
        let c = pins.pin(Value::Nil);
        assert_eq!(c.index, 0);
        assert_eq!(b.value(), Value::Number(1.0));

        drop(b);
        drop(c);
        assert_eq!(pins.len(), 0);
    }
}
