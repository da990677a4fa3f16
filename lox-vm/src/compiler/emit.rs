// lox-vm - Bytecode compiler and virtual machine for the Lox scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Bytecode emission helpers.

use crate::chunk::Chunk;
use crate::opcode::OpCode;
use crate::value::Value;

use super::Compiler;
use super::types::FunctionKind;

/// Largest constant index `ConstantLong` can encode.
const MAX_LONG_CONSTANT: usize = (1 << 24) - 1;

impl<'src, 'h> Compiler<'src, 'h> {
    fn chunk(&mut self) -> &mut Chunk {
        &mut self.state_mut().chunk
    }

    pub(super) fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line;
        self.chunk().write(byte, line);
    }

    pub(super) fn emit_op(&mut self, op: OpCode) {
        self.emit_byte(op as u8);
    }

    pub(super) fn emit_op_arg(&mut self, op: OpCode, arg: u8) {
        self.emit_op(op);
        self.emit_byte(arg);
    }

    /// Emit a forward jump with a placeholder distance. Returns the offset
    /// of the placeholder for [`patch_jump`](Self::patch_jump).
    pub(super) fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op(op);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.chunk().current_offset() - 2
    }

    /// Point the jump whose operand sits at `offset` to the current end of code.
    pub(super) fn patch_jump(&mut self, offset: usize) {
        let distance = self.chunk().current_offset() - offset - 2;
        match u16::try_from(distance) {
            Ok(distance) => self.chunk().patch_u16(offset, distance),
            Err(_) => self.error("Too much code to jump over."),
        }
    }

    /// Emit a backward jump to `loop_start`.
    pub(super) fn emit_loop(&mut self, loop_start: usize) {
        self.emit_op(OpCode::Loop);
        // +2 skips the operand bytes about to be written.
        let distance = self.chunk().current_offset() - loop_start + 2;
        let distance = u16::try_from(distance).unwrap_or_else(|_| {
            self.error("Loop body too large.");
            u16::MAX
        });
        let [hi, lo] = distance.to_be_bytes();
        self.emit_byte(hi);
        self.emit_byte(lo);
    }

    /// Implicit return: initializers hand back the receiver, everything else nil.
    pub(super) fn emit_return(&mut self) {
        if self.state().kind == FunctionKind::Initializer {
            self.emit_op_arg(OpCode::GetLocal, 0);
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.emit_op(OpCode::Return);
    }

    /// Add a constant that must be addressable by a one-byte operand.
    pub(super) fn make_constant(&mut self, value: Value) -> u8 {
        let index = self.chunk().add_constant(value);
        u8::try_from(index).unwrap_or_else(|_| {
            self.error("Too many constants in one chunk.");
            0
        })
    }

    /// Load a literal, switching to the long form past 256 constants.
    pub(super) fn emit_constant(&mut self, value: Value) {
        let index = self.chunk().add_constant(value);
        if let Ok(short) = u8::try_from(index) {
            self.emit_op_arg(OpCode::Constant, short);
        } else if index <= MAX_LONG_CONSTANT {
            self.emit_op(OpCode::ConstantLong);
            let [b0, b1, b2, _] = (index as u32).to_le_bytes();
            self.emit_byte(b0);
            self.emit_byte(b1);
            self.emit_byte(b2);
        } else {
            self.error("Too many constants in one chunk.");
        }
    }

    /// Intern `name` and add it to the constant pool.
    pub(super) fn identifier_constant(&mut self, name: &str) -> u8 {
        let name = self.intern(name);
        self.make_constant(Value::Obj(name))
    }
}
