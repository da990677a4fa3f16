// lox-vm - Bytecode compiler and virtual machine for the Lox scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Human-readable bytecode listings.
//!
//! Read-only: nothing here mutates a chunk or affects execution.

use std::fmt::Write;

use crate::chunk::Chunk;
use crate::heap::Heap;
use crate::object::Object;
use crate::opcode::OpCode;
use crate::value::Value;

/// Disassemble a whole chunk under a `== name ==` header.
pub fn disassemble_chunk(chunk: &Chunk, heap: &Heap, name: &str) -> String {
    let mut out = format!("== {} ==\n", name);
    let mut offset = 0;
    while offset < chunk.code.len() {
        let (line, next) = disassemble_instruction(chunk, heap, offset);
        out.push_str(&line);
        out.push('\n');
        offset = next;
    }
    out
}

/// Disassemble the instruction at `offset`. Returns the listing line and the
/// offset of the next instruction.
pub fn disassemble_instruction(chunk: &Chunk, heap: &Heap, offset: usize) -> (String, usize) {
    let mut out = format!("{:04} ", offset);
    let line = chunk.line_at(offset).unwrap_or(0);
    if offset > 0 && chunk.line_at(offset - 1) == Some(line) {
        out.push_str("   | ");
    } else {
        let _ = write!(out, "{:4} ", line);
    }

    let op = match OpCode::try_from(chunk.code[offset]) {
        Ok(op) => op,
        Err(byte) => {
            let _ = write!(out, "Unknown opcode {}", byte);
            return (out, offset + 1);
        }
    };

    // Truncated trailing instructions are listed rather than panicking.
    if offset + op.operand_len() >= chunk.code.len() && op.operand_len() > 0 {
        let _ = write!(out, "{} <truncated>", op.mnemonic());
        return (out, chunk.code.len());
    }

    let next = match op {
        OpCode::Constant
        | OpCode::GetGlobal
        | OpCode::DefineGlobal
        | OpCode::SetGlobal
        | OpCode::GetProperty
        | OpCode::SetProperty
        | OpCode::GetSuper
        | OpCode::Class
        | OpCode::Method => {
            let index = chunk.code[offset + 1] as usize;
            constant(&mut out, op, chunk, heap, index);
            offset + 2
        }
        OpCode::ConstantLong => {
            let index = chunk.read_u24(offset + 1);
            constant(&mut out, op, chunk, heap, index);
            offset + 4
        }
        OpCode::GetLocal
        | OpCode::SetLocal
        | OpCode::GetUpvalue
        | OpCode::SetUpvalue
        | OpCode::Call => {
            let _ = write!(out, "{:<16} {:4}", op.mnemonic(), chunk.code[offset + 1]);
            offset + 2
        }
        OpCode::Jump | OpCode::JumpIfFalse => {
            let target = offset + 3 + chunk.read_u16(offset + 1) as usize;
            let _ = write!(out, "{:<16} {:4} -> {}", op.mnemonic(), offset, target);
            offset + 3
        }
        OpCode::Loop => {
            let target = (offset + 3).saturating_sub(chunk.read_u16(offset + 1) as usize);
            let _ = write!(out, "{:<16} {:4} -> {}", op.mnemonic(), offset, target);
            offset + 3
        }
        OpCode::Invoke | OpCode::SuperInvoke => {
            let index = chunk.code[offset + 1] as usize;
            let argc = chunk.code[offset + 2];
            let _ = write!(out, "{:<16} ({} args) {:4} ", op.mnemonic(), argc, index);
            quoted(&mut out, chunk, heap, index);
            offset + 3
        }
        OpCode::Closure => {
            let index = chunk.code[offset + 1] as usize;
            constant(&mut out, op, chunk, heap, index);
            let upvalues = match chunk.constants.get(index) {
                Some(Value::Obj(r)) => match heap.get(*r) {
                    Object::Function(f) => f.upvalue_count,
                    _ => 0,
                },
                _ => 0,
            };
            let mut cursor = offset + 2;
            for _ in 0..upvalues {
                let (Some(&is_local), Some(&slot)) =
                    (chunk.code.get(cursor), chunk.code.get(cursor + 1))
                else {
                    break;
                };
                let kind = if is_local == 1 { "local" } else { "upvalue" };
                let _ = write!(out, "\n{:04}      |                     {} {}", cursor, kind, slot);
                cursor += 2;
            }
            cursor
        }
        _ => {
            out.push_str(op.mnemonic());
            offset + 1
        }
    };
    (out, next)
}

fn constant(out: &mut String, op: OpCode, chunk: &Chunk, heap: &Heap, index: usize) {
    let _ = write!(out, "{:<16} {:4} ", op.mnemonic(), index);
    quoted(out, chunk, heap, index);
}

fn quoted(out: &mut String, chunk: &Chunk, heap: &Heap, index: usize) {
    match chunk.constants.get(index) {
        Some(&value) => {
            let _ = write!(out, "'{}'", heap.display(value));
        }
        None => out.push_str("<bad constant>"),
    }
}
