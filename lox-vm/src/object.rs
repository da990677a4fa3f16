// lox-vm - Bytecode compiler and virtual machine for the Lox scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Heap object variants.
//!
//! Every object lives in a [`Heap`](crate::heap::Heap) slot and is referred to
//! by an [`ObjRef`] handle. Handles are plain indices; they stay valid for as
//! long as the object is reachable from a root at every collection.

use std::fmt;
use std::mem::size_of;
use std::rc::Rc;

use crate::chunk::Chunk;
use crate::table::Table;
use crate::value::Value;

/// Handle to a heap object.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef(u32);

impl ObjRef {
    pub(crate) fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A host function callable from Lox. Receives the argument window.
pub type NativeFn = Rc<dyn Fn(&[Value]) -> Result<Value, String>>;

/// A heap-allocated Lox object.
pub enum Object {
    String(LoxString),
    Function(Function),
    Native(Native),
    Closure(Closure),
    Upvalue(Upvalue),
    Class(Class),
    Instance(Instance),
    BoundMethod(BoundMethod),
}

impl Object {
    /// Approximate number of bytes this object accounts for in the GC budget.
    pub fn heap_size(&self) -> usize {
        let payload = match self {
            Object::String(s) => s.chars.len(),
            Object::Function(f) => {
                f.chunk.code.len()
                    + f.chunk.constants.len() * size_of::<Value>()
                    + f.chunk.line_runs() * size_of::<(usize, u32)>()
            }
            Object::Native(n) => n.name.len(),
            Object::Closure(c) => c.upvalues.capacity() * size_of::<ObjRef>(),
            Object::Upvalue(_) | Object::BoundMethod(_) => 0,
            Object::Class(c) => c.methods.heap_size(),
            Object::Instance(i) => i.fields.heap_size(),
        };
        size_of::<Object>() + payload
    }

    /// Push every object this one references onto `out`.
    pub(crate) fn push_children(&self, out: &mut Vec<ObjRef>) {
        fn value(out: &mut Vec<ObjRef>, v: Value) {
            if let Value::Obj(r) = v {
                out.push(r);
            }
        }

        match self {
            Object::String(_) | Object::Native(_) => {}
            Object::Function(f) => {
                out.extend(f.name);
                for &constant in &f.chunk.constants {
                    value(out, constant);
                }
            }
            Object::Closure(c) => {
                out.push(c.function);
                out.extend(c.upvalues.iter().copied());
            }
            Object::Upvalue(Upvalue::Closed(v)) => value(out, *v),
            Object::Upvalue(Upvalue::Open(_)) => {}
            Object::Class(c) => {
                out.push(c.name);
                for (key, method) in c.methods.iter() {
                    out.push(key.obj);
                    value(out, method);
                }
            }
            Object::Instance(i) => {
                out.push(i.class);
                for (key, field) in i.fields.iter() {
                    out.push(key.obj);
                    value(out, field);
                }
            }
            Object::BoundMethod(b) => {
                value(out, b.receiver);
                out.push(b.method);
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Object::String(_) => "string",
            Object::Function(_) => "function",
            Object::Native(_) => "native",
            Object::Closure(_) => "closure",
            Object::Upvalue(_) => "upvalue",
            Object::Class(_) => "class",
            Object::Instance(_) => "instance",
            Object::BoundMethod(_) => "bound method",
        }
    }
}

/// An immutable, interned string with its cached hash.
#[derive(Debug)]
pub struct LoxString {
    pub chars: Box<str>,
    pub hash: u32,
}

/// FNV-1a over the string's bytes.
pub fn hash_str(s: &str) -> u32 {
    let mut hash: u32 = 2166136261;
    for &byte in s.as_bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

/// A compiled function body. Immutable once the compiler hands it over.
#[derive(Debug)]
pub struct Function {
    pub arity: u8,
    pub upvalue_count: usize,
    /// Shared with every call frame executing this function.
    pub chunk: Rc<Chunk>,
    /// `None` for the top-level script.
    pub name: Option<ObjRef>,
}

/// A host function wrapped as a Lox value.
pub struct Native {
    pub name: Box<str>,
    pub function: NativeFn,
}

impl fmt::Debug for Native {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<native fn {}>", self.name)
    }
}

/// A function plus the upvalues it closes over.
#[derive(Debug)]
pub struct Closure {
    pub function: ObjRef,
    pub upvalues: Vec<ObjRef>,
}

/// A captured variable.
///
/// While the enclosing frame is live the upvalue points at the variable's
/// stack slot; once that slot goes away the value moves into the upvalue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Upvalue {
    Open(usize),
    Closed(Value),
}

#[derive(Debug)]
pub struct Class {
    pub name: ObjRef,
    pub methods: Table,
}

#[derive(Debug)]
pub struct Instance {
    pub class: ObjRef,
    pub fields: Table,
}

/// A method closure bound to the receiver it was accessed through.
#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: Value,
    pub method: ObjRef,
}
