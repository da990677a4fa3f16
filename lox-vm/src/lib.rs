// lox-vm - Bytecode compiler and virtual machine for the Lox scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Single-pass bytecode compiler and stack-based virtual machine for Lox.
//!
//! Source text is compiled straight to bytecode by a Pratt parser, then run
//! by a VM with call frames, closures and upvalues. Objects live in a
//! garbage-collected [`Heap`]; strings are interned so equality is identity.
//!
//! ```no_run
//! use lox_vm::Vm;
//!
//! let mut vm = Vm::new();
//! vm.interpret("print 1 + 2 * 3;").unwrap();
//! ```

pub mod chunk;
pub mod compiler;
pub mod config;
pub mod debug;
pub mod heap;
pub mod natives;
pub mod object;
pub mod opcode;
pub mod pin;
pub mod table;
pub mod value;
pub mod vm;

pub use chunk::Chunk;
pub use compiler::{CompileError, Diagnostic, ErrorLocation, compile};
pub use config::VmConfig;
pub use debug::{disassemble_chunk, disassemble_instruction};
pub use heap::{GcStats, Heap, NoRoots, Roots};
pub use object::{NativeFn, ObjRef, Object};
pub use opcode::OpCode;
pub use pin::Pinned;
pub use table::Table;
pub use value::Value;
pub use vm::{InterpretError, RuntimeError, RuntimeErrorKind, TraceFrame, Vm};
