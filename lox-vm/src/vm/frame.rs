// lox-vm - Bytecode compiler and virtual machine for the Lox scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Call frames for the VM.

use std::rc::Rc;

use crate::chunk::Chunk;
use crate::object::ObjRef;

/// A call frame on the VM's call stack.
#[derive(Debug, Clone)]
pub struct CallFrame {
    /// The closure being executed.
    pub closure: ObjRef,

    /// The closure's function body, shared with the function object.
    pub chunk: Rc<Chunk>,

    /// Instruction pointer (index into chunk.code).
    pub ip: usize,

    /// Stack base: slot 0 of this frame holds the callee or receiver.
    pub base: usize,
}

impl CallFrame {
    pub fn new(closure: ObjRef, chunk: Rc<Chunk>, base: usize) -> Self {
        Self {
            closure,
            chunk,
            ip: 0,
            base,
        }
    }

    /// Source line of the instruction currently executing.
    pub fn current_line(&self) -> u32 {
        self.chunk
            .line_at(self.ip.saturating_sub(1))
            .unwrap_or_default()
    }
}
