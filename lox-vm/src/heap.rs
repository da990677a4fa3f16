// lox-vm - Bytecode compiler and virtual machine for the Lox scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Object arena and tracing mark-sweep collector.
//!
//! Objects live in slots of a single `Vec`; an [`ObjRef`] is a slot index and
//! the mark bit sits in the slot next to the object. Freed slots go on a free
//! list and are reused by later allocations. Nothing ever moves, so a handle
//! stays valid as long as the object is reachable from a root at every
//! collection.
//!
//! Collection runs synchronously inside [`Heap::alloc`] once the byte budget
//! is exceeded. Whoever allocates passes a [`Roots`] implementation that marks
//! everything it is holding on to: the VM marks its stack, frames, globals and
//! open upvalues, the compiler additionally marks the functions it is still
//! building.

use std::fmt;
use std::mem;

use tracing::{debug, trace};

use crate::config::VmConfig;
use crate::object::{
    BoundMethod, Class, Closure, Function, Instance, LoxString, Native, ObjRef, Object, Upvalue,
    hash_str,
};
use crate::table::{StrKey, Table};
use crate::value::{Value, ValueDisplay};

/// Something that can mark the objects it keeps alive.
pub trait Roots {
    fn mark_roots(&self, heap: &mut Heap);
}

/// Root set for allocations made while nothing else is live.
pub struct NoRoots;

impl Roots for NoRoots {
    fn mark_roots(&self, _heap: &mut Heap) {}
}

/// Running totals across every collection of one heap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    pub collections: usize,
    pub objects_freed: usize,
    pub bytes_freed: usize,
}

struct Slot {
    object: Option<Object>,
    marked: bool,
    /// Bytes charged to the budget when the object was allocated.
    size: usize,
}

pub struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    /// Intern set. Keys only; weak with respect to the collector.
    strings: Table,
    bytes_allocated: usize,
    next_gc: usize,
    initial_threshold: usize,
    grow_factor: usize,
    stress: bool,
    gray: Vec<ObjRef>,
    scratch: Vec<ObjRef>,
    stats: GcStats,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new(&VmConfig::default())
    }
}

impl Heap {
    pub fn new(config: &VmConfig) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            strings: Table::new(),
            bytes_allocated: 0,
            next_gc: config.initial_gc_threshold,
            initial_threshold: config.initial_gc_threshold,
            grow_factor: config.gc_heap_grow_factor.max(1),
            stress: config.stress_gc,
            gray: Vec::new(),
            scratch: Vec::new(),
            stats: GcStats::default(),
        }
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Move `object` into the heap, collecting first if the budget says so.
    ///
    /// `object` is not reachable from `roots` yet, so the objects it refers to
    /// are marked alongside them.
    pub fn alloc(&mut self, object: Object, roots: &dyn Roots) -> ObjRef {
        let size = object.heap_size();
        if self.stress || self.bytes_allocated + size > self.next_gc {
            self.collect_with(roots, Some(&object));
        }
        self.bytes_allocated += size;

        let slot = Slot {
            object: Some(object),
            marked: false,
            size,
        };
        match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = slot;
                ObjRef::new(index)
            }
            None => {
                self.slots.push(slot);
                ObjRef::new((self.slots.len() - 1) as u32)
            }
        }
    }

    /// Re-measure a live object whose tables grew after allocation. The
    /// difference counts toward the next collection.
    pub fn recharge(&mut self, r: ObjRef) {
        let slot = &mut self.slots[r.index()];
        let Some(object) = slot.object.as_ref() else {
            return;
        };
        let size = object.heap_size();
        self.bytes_allocated = (self.bytes_allocated + size).saturating_sub(slot.size);
        slot.size = size;
    }

    /// Return the canonical string object for `chars`, allocating it if no
    /// equal string is live.
    pub fn intern(&mut self, chars: &str, roots: &dyn Roots) -> ObjRef {
        let hash = hash_str(chars);
        if let Some(existing) = self.lookup_interned(chars, hash) {
            return existing;
        }
        self.insert_interned(LoxString { chars: chars.into(), hash }, roots)
    }

    /// Like [`intern`](Self::intern) but takes ownership of freshly built
    /// text (concatenation results), dropping it if an equal string exists.
    pub fn intern_owned(&mut self, chars: String, roots: &dyn Roots) -> ObjRef {
        let hash = hash_str(&chars);
        if let Some(existing) = self.lookup_interned(&chars, hash) {
            return existing;
        }
        self.insert_interned(
            LoxString {
                chars: chars.into_boxed_str(),
                hash,
            },
            roots,
        )
    }

    /// The interned string with this content, if one is live.
    pub fn find_interned(&self, chars: &str) -> Option<ObjRef> {
        self.lookup_interned(chars, hash_str(chars))
    }

    fn lookup_interned(&self, chars: &str, hash: u32) -> Option<ObjRef> {
        self.strings
            .find_by(hash, |r| self.string(r).chars.as_ref() == chars)
    }

    fn insert_interned(&mut self, string: LoxString, roots: &dyn Roots) -> ObjRef {
        let hash = string.hash;
        let obj = self.alloc(Object::String(string), roots);
        self.strings.set(StrKey { obj, hash }, Value::Nil);
        obj
    }

    // =========================================================================
    // Access
    // =========================================================================

    pub fn get(&self, r: ObjRef) -> &Object {
        self.slots[r.index()]
            .object
            .as_ref()
            .expect("dangling object reference")
    }

    pub fn get_mut(&mut self, r: ObjRef) -> &mut Object {
        self.slots[r.index()]
            .object
            .as_mut()
            .expect("dangling object reference")
    }

    /// Table key for an interned string.
    pub fn key(&self, r: ObjRef) -> StrKey {
        StrKey {
            obj: r,
            hash: self.string(r).hash,
        }
    }

    pub fn is_string(&self, value: Value) -> bool {
        matches!(value, Value::Obj(r) if matches!(self.get(r), Object::String(_)))
    }

    pub fn string(&self, r: ObjRef) -> &LoxString {
        match self.get(r) {
            Object::String(s) => s,
            other => mismatch("string", other),
        }
    }

    pub fn str(&self, r: ObjRef) -> &str {
        &self.string(r).chars
    }

    pub fn function(&self, r: ObjRef) -> &Function {
        match self.get(r) {
            Object::Function(f) => f,
            other => mismatch("function", other),
        }
    }

    pub fn native(&self, r: ObjRef) -> &Native {
        match self.get(r) {
            Object::Native(n) => n,
            other => mismatch("native", other),
        }
    }

    pub fn closure(&self, r: ObjRef) -> &Closure {
        match self.get(r) {
            Object::Closure(c) => c,
            other => mismatch("closure", other),
        }
    }

    pub fn upvalue(&self, r: ObjRef) -> Upvalue {
        match self.get(r) {
            Object::Upvalue(u) => *u,
            other => mismatch("upvalue", other),
        }
    }

    pub fn upvalue_mut(&mut self, r: ObjRef) -> &mut Upvalue {
        match self.get_mut(r) {
            Object::Upvalue(u) => u,
            other => mismatch("upvalue", other),
        }
    }

    pub fn class(&self, r: ObjRef) -> &Class {
        match self.get(r) {
            Object::Class(c) => c,
            other => mismatch("class", other),
        }
    }

    pub fn class_mut(&mut self, r: ObjRef) -> &mut Class {
        match self.get_mut(r) {
            Object::Class(c) => c,
            other => mismatch("class", other),
        }
    }

    pub fn instance(&self, r: ObjRef) -> &Instance {
        match self.get(r) {
            Object::Instance(i) => i,
            other => mismatch("instance", other),
        }
    }

    pub fn instance_mut(&mut self, r: ObjRef) -> &mut Instance {
        match self.get_mut(r) {
            Object::Instance(i) => i,
            other => mismatch("instance", other),
        }
    }

    pub fn bound_method(&self, r: ObjRef) -> &BoundMethod {
        match self.get(r) {
            Object::BoundMethod(b) => b,
            other => mismatch("bound method", other),
        }
    }

    /// Number of live objects.
    pub fn object_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    pub fn next_gc(&self) -> usize {
        self.next_gc
    }

    pub fn stats(&self) -> GcStats {
        self.stats
    }

    /// Returns true if `r` currently names a live object.
    pub fn contains(&self, r: ObjRef) -> bool {
        self.slots
            .get(r.index())
            .is_some_and(|slot| slot.object.is_some())
    }

    // =========================================================================
    // Printing
    // =========================================================================

    pub fn display(&self, value: Value) -> ValueDisplay<'_> {
        ValueDisplay { heap: self, value }
    }

    pub(crate) fn fmt_object(&self, f: &mut fmt::Formatter<'_>, r: ObjRef) -> fmt::Result {
        match self.get(r) {
            Object::String(s) => f.write_str(&s.chars),
            Object::Function(func) => self.fmt_function(f, func),
            Object::Native(_) => f.write_str("<native fn>"),
            Object::Closure(c) => self.fmt_function(f, self.function(c.function)),
            Object::Upvalue(_) => f.write_str("upvalue"),
            Object::Class(c) => f.write_str(self.str(c.name)),
            Object::Instance(i) => {
                write!(f, "{} instance", self.str(self.class(i.class).name))
            }
            Object::BoundMethod(b) => {
                let closure = self.closure(b.method);
                self.fmt_function(f, self.function(closure.function))
            }
        }
    }

    fn fmt_function(&self, f: &mut fmt::Formatter<'_>, func: &Function) -> fmt::Result {
        match func.name {
            Some(name) => write!(f, "<fn {}>", self.str(name)),
            None => f.write_str("<script>"),
        }
    }

    // =========================================================================
    // Collection
    // =========================================================================

    /// Mark a value gray if it refers to an object.
    pub fn mark_value(&mut self, value: Value) {
        if let Value::Obj(r) = value {
            self.mark_object(r);
        }
    }

    /// Mark an object gray. Already-marked objects are left alone, which is
    /// what terminates tracing on cyclic graphs.
    pub fn mark_object(&mut self, r: ObjRef) {
        let slot = &mut self.slots[r.index()];
        if slot.marked {
            return;
        }
        slot.marked = true;
        self.gray.push(r);
    }

    /// Mark every key and value of a table.
    pub fn mark_table(&mut self, table: &Table) {
        for (key, value) in table.iter() {
            self.mark_object(key.obj);
            self.mark_value(value);
        }
    }

    /// Run a full collection now.
    pub fn collect(&mut self, roots: &dyn Roots) {
        self.collect_with(roots, None);
    }

    fn collect_with(&mut self, roots: &dyn Roots, pending: Option<&Object>) {
        let before = self.bytes_allocated;
        debug!(bytes = before, objects = self.object_count(), "gc begin");

        roots.mark_roots(self);
        if let Some(object) = pending {
            let mut children = mem::take(&mut self.scratch);
            children.clear();
            object.push_children(&mut children);
            for &child in &children {
                self.mark_object(child);
            }
            self.scratch = children;
        }
        self.trace_references();

        let slots = &self.slots;
        self.strings.retain_keys(|r| slots[r.index()].marked);

        let freed = self.sweep();
        self.next_gc = (self.bytes_allocated * self.grow_factor).max(self.initial_threshold);

        self.stats.collections += 1;
        self.stats.objects_freed += freed;
        self.stats.bytes_freed += before - self.bytes_allocated;
        debug!(
            collected = before - self.bytes_allocated,
            objects_freed = freed,
            remaining = self.bytes_allocated,
            next = self.next_gc,
            "gc end"
        );
    }

    fn trace_references(&mut self) {
        let mut children = mem::take(&mut self.scratch);
        while let Some(r) = self.gray.pop() {
            children.clear();
            self.get(r).push_children(&mut children);
            for &child in &children {
                self.mark_object(child);
            }
        }
        self.scratch = children;
    }

    fn sweep(&mut self) -> usize {
        let mut freed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.object.is_none() {
                continue;
            }
            if slot.marked {
                slot.marked = false;
                continue;
            }
            if let Some(object) = slot.object.take() {
                trace!(slot = index, kind = object.kind(), "free");
            }
            self.bytes_allocated -= slot.size;
            self.free.push(index as u32);
            freed += 1;
        }
        freed
    }
}

#[cold]
fn mismatch(expected: &str, found: &Object) -> ! {
    panic!("expected {} object, found {}", expected, found.kind())
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::chunk::Chunk;

    /// Roots given as an explicit list of values.
    struct ValueRoots(Vec<Value>);

    impl Roots for ValueRoots {
        fn mark_roots(&self, heap: &mut Heap) {
            for &value in &self.0 {
                heap.mark_value(value);
            }
        }
    }

    fn stress_heap() -> Heap {
        Heap::new(&VmConfig::stress())
    }

    #[test]
    fn interning_returns_the_same_handle() {
        let mut heap = Heap::default();
        let a = heap.intern("hello", &NoRoots);
        let b = heap.intern_owned(String::from("hello"), &NoRoots);
        let c = heap.intern("world", &NoRoots);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(heap.object_count(), 2);
        assert_eq!(heap.find_interned("hello"), Some(a));
    }

    #[test]
    fn unreachable_objects_are_freed() {
        let mut heap = Heap::default();
        let kept = heap.intern("kept", &NoRoots);
        heap.intern("dropped", &NoRoots);
        heap.collect(&ValueRoots(vec![Value::Obj(kept)]));
        assert_eq!(heap.object_count(), 1);
        assert!(heap.contains(kept));
        assert_eq!(heap.stats().objects_freed, 1);
    }

    #[test]
    fn intern_table_does_not_keep_strings_alive() {
        let mut heap = Heap::default();
        heap.intern("ghost", &NoRoots);
        heap.collect(&NoRoots);
        assert_eq!(heap.find_interned("ghost"), None);
        // Interning again produces a fresh, live string.
        let again = heap.intern("ghost", &NoRoots);
        assert_eq!(heap.str(again), "ghost");
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut heap = Heap::default();
        let first = heap.intern("a", &NoRoots);
        heap.collect(&NoRoots);
        let second = heap.intern("b", &NoRoots);
        assert_eq!(first, second);
        assert_eq!(heap.str(second), "b");
    }

    #[test]
    fn tracing_follows_closures_and_closed_upvalues() {
        let mut heap = stress_heap();
        let name = heap.intern("f", &NoRoots);
        let captured = heap.intern("captured", &ValueRoots(vec![Value::Obj(name)]));
        let roots = ValueRoots(vec![Value::Obj(name), Value::Obj(captured)]);

        let upvalue = heap.alloc(Object::Upvalue(Upvalue::Closed(Value::Obj(captured))), &roots);
        let roots = ValueRoots(vec![Value::Obj(name), Value::Obj(upvalue)]);
        let function = heap.alloc(
            Object::Function(Function {
                arity: 0,
                upvalue_count: 1,
                chunk: Rc::new(Chunk::new()),
                name: Some(name),
            }),
            &roots,
        );
        let closure = heap.alloc(
            Object::Closure(Closure {
                function,
                upvalues: vec![upvalue],
            }),
            &ValueRoots(vec![Value::Obj(upvalue)]),
        );

        heap.collect(&ValueRoots(vec![Value::Obj(closure)]));
        for r in [name, captured, upvalue, function, closure] {
            assert!(heap.contains(r), "{:?} was freed", r);
        }
        assert_eq!(heap.object_count(), 5);

        heap.collect(&NoRoots);
        assert_eq!(heap.object_count(), 0);
        assert_eq!(heap.bytes_allocated(), 0);
    }

    #[test]
    fn pending_object_children_survive_allocation() {
        let mut heap = stress_heap();
        let class_name = heap.intern("Point", &NoRoots);
        // Only the pending class refers to its name; stress mode collects
        // inside this alloc.
        let class = heap.alloc(
            Object::Class(Class {
                name: class_name,
                methods: Table::new(),
            }),
            &NoRoots,
        );
        assert_eq!(heap.str(heap.class(class).name), "Point");
    }

    #[test]
    fn cycles_are_collected() {
        let mut heap = Heap::default();
        let name = heap.intern("Node", &NoRoots);
        let class = heap.alloc(
            Object::Class(Class {
                name,
                methods: Table::new(),
            }),
            &NoRoots,
        );
        let instance = heap.alloc(
            Object::Instance(Instance {
                class,
                fields: Table::new(),
            }),
            &NoRoots,
        );
        let field = heap.intern("me", &NoRoots);
        let key = heap.key(field);
        heap.instance_mut(instance)
            .fields
            .set(key, Value::Obj(instance));

        heap.collect(&ValueRoots(vec![Value::Obj(instance)]));
        assert_eq!(heap.object_count(), 4);
        heap.collect(&NoRoots);
        assert_eq!(heap.object_count(), 0);
    }

    #[test]
    fn grown_tables_are_recharged() {
        let mut heap = Heap::default();
        let name = heap.intern("Bag", &NoRoots);
        let class = heap.alloc(
            Object::Class(Class {
                name,
                methods: Table::new(),
            }),
            &NoRoots,
        );
        let instance = heap.alloc(
            Object::Instance(Instance {
                class,
                fields: Table::new(),
            }),
            &NoRoots,
        );
        let keys: Vec<_> = (0..20)
            .map(|i| heap.intern(&format!("field{i}"), &NoRoots))
            .collect();
        let before = heap.bytes_allocated();

        for key in keys {
            let key = heap.key(key);
            heap.instance_mut(instance).fields.set(key, Value::Nil);
        }
        heap.recharge(instance);
        let fields = heap.instance(instance).fields.heap_size();
        assert!(fields > 0);
        assert_eq!(heap.bytes_allocated(), before + fields);

        // Recharging an unchanged object is a no-op.
        heap.recharge(instance);
        assert_eq!(heap.bytes_allocated(), before + fields);

        heap.collect(&NoRoots);
        assert_eq!(heap.bytes_allocated(), 0);
    }

    #[test]
    fn threshold_grows_from_live_bytes() {
        let config = VmConfig {
            initial_gc_threshold: 64,
            ..VmConfig::default()
        };
        let mut heap = Heap::new(&config);
        let mut live = Vec::new();
        for i in 0..32 {
            let s = heap.intern(&format!("string number {i}"), &ValueRoots(live.clone()));
            live.push(Value::Obj(s));
        }
        assert!(heap.stats().collections > 0);
        assert_eq!(heap.object_count(), 32);
        assert!(heap.next_gc() >= heap.bytes_allocated());
    }

    #[test]
    fn display_forms() {
        let mut heap = Heap::default();
        let name = heap.intern("Bagel", &NoRoots);
        let class = heap.alloc(
            Object::Class(Class {
                name,
                methods: Table::new(),
            }),
            &NoRoots,
        );
        let instance = heap.alloc(
            Object::Instance(Instance {
                class,
                fields: Table::new(),
            }),
            &NoRoots,
        );
        let script = heap.alloc(
            Object::Function(Function {
                arity: 0,
                upvalue_count: 0,
                chunk: Rc::new(Chunk::new()),
                name: None,
            }),
            &NoRoots,
        );
        assert_eq!(heap.display(Value::Obj(class)).to_string(), "Bagel");
        assert_eq!(heap.display(Value::Obj(instance)).to_string(), "Bagel instance");
        assert_eq!(heap.display(Value::Obj(script)).to_string(), "<script>");
        assert_eq!(heap.display(Value::Number(3.0)).to_string(), "3");
        assert_eq!(heap.display(Value::Nil).to_string(), "nil");
    }
}
