// lox-vm - Bytecode compiler and virtual machine for the Lox scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Bytecode chunks: instruction bytes, constant pool and line table.

use std::collections::HashMap;

use crate::object::ObjRef;
use crate::value::Value;

/// Start of a run of bytes compiled from the same source line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineStart {
    /// Byte offset of the first instruction byte on this line.
    pub offset: usize,
    /// Source line number (1-indexed).
    pub line: u32,
}

/// A chunk of bytecode with its constant pool and debug information.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    /// Variable-length instructions: an opcode byte followed by its operands.
    pub code: Vec<u8>,

    /// Constant pool: literals, identifier names and nested functions.
    pub constants: Vec<Value>,

    /// Run-length encoded line table, ordered by offset.
    lines: Vec<LineStart>,

    /// Pool index of each constant, for deduplication.
    constant_index: HashMap<ConstantKey, usize>,
}

/// Identity of a constant: numbers by bit pattern, objects by reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ConstantKey {
    Nil,
    Bool(bool),
    Number(u64),
    Obj(ObjRef),
}

impl From<Value> for ConstantKey {
    fn from(value: Value) -> Self {
        match value {
            Value::Nil => ConstantKey::Nil,
            Value::Bool(b) => ConstantKey::Bool(b),
            Value::Number(n) => ConstantKey::Number(n.to_bits()),
            Value::Obj(r) => ConstantKey::Obj(r),
        }
    }
}

impl Chunk {
    /// Create a new empty chunk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one byte compiled from `line`.
    pub fn write(&mut self, byte: u8, line: u32) {
        self.code.push(byte);

        if self.lines.last().is_some_and(|run| run.line == line) {
            return;
        }
        self.lines.push(LineStart {
            offset: self.code.len() - 1,
            line,
        });
    }

    /// Add a constant to the pool and return its index.
    ///
    /// Numbers are deduplicated by bit pattern and objects by identity, so
    /// repeated literals and identifier names share one slot.
    pub fn add_constant(&mut self, value: Value) -> usize {
        let next = self.constants.len();
        let index = *self
            .constant_index
            .entry(ConstantKey::from(value))
            .or_insert(next);
        if index == next {
            self.constants.push(value);
        }
        index
    }

    /// Get the current instruction offset (for jump patching).
    pub fn current_offset(&self) -> usize {
        self.code.len()
    }

    /// Overwrite the two bytes at `offset` with `value`, big-endian.
    pub fn patch_u16(&mut self, offset: usize, value: u16) {
        let [hi, lo] = value.to_be_bytes();
        self.code[offset] = hi;
        self.code[offset + 1] = lo;
    }

    /// Read a big-endian u16 operand.
    pub fn read_u16(&self, offset: usize) -> u16 {
        u16::from_be_bytes([self.code[offset], self.code[offset + 1]])
    }

    /// Read a little-endian 24-bit operand.
    pub fn read_u24(&self, offset: usize) -> usize {
        self.code[offset] as usize
            | (self.code[offset + 1] as usize) << 8
            | (self.code[offset + 2] as usize) << 16
    }

    /// Get the source line for the byte at `offset`.
    ///
    /// Binary search over line runs: the answer is the last run starting at
    /// or before `offset`.
    pub fn line_at(&self, offset: usize) -> Option<u32> {
        let after = self.lines.partition_point(|run| run.offset <= offset);
        after.checked_sub(1).map(|i| self.lines[i].line)
    }

    /// Number of runs in the line table.
    pub fn line_runs(&self) -> usize {
        self.lines.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::OpCode;

    #[test]
    fn line_runs_only_grow_on_line_change() {
        let mut chunk = Chunk::new();
        chunk.write(OpCode::Nil as u8, 1);
        chunk.write(OpCode::Pop as u8, 1);
        chunk.write(OpCode::Nil as u8, 2);
        chunk.write(OpCode::Pop as u8, 2);
        chunk.write(OpCode::Return as u8, 5);
        assert_eq!(chunk.line_runs(), 3);
        assert_eq!(chunk.line_at(0), Some(1));
        assert_eq!(chunk.line_at(1), Some(1));
        assert_eq!(chunk.line_at(2), Some(2));
        assert_eq!(chunk.line_at(3), Some(2));
        assert_eq!(chunk.line_at(4), Some(5));
    }

    #[test]
    fn empty_chunk_has_no_lines() {
        assert_eq!(Chunk::new().line_at(0), None);
    }

    #[test]
    fn constants_deduplicate() {
        let mut chunk = Chunk::new();
        assert_eq!(chunk.add_constant(Value::Number(1.0)), 0);
        assert_eq!(chunk.add_constant(Value::Number(2.0)), 1);
        assert_eq!(chunk.add_constant(Value::Number(1.0)), 0);
        // 0.0 and -0.0 compare equal but are different literals.
        assert_eq!(chunk.add_constant(Value::Number(0.0)), 2);
        assert_eq!(chunk.add_constant(Value::Number(-0.0)), 3);
        assert_eq!(chunk.add_constant(Value::Nil), 4);
        assert_eq!(chunk.add_constant(Value::Bool(false)), 5);
        assert_eq!(chunk.add_constant(Value::Nil), 4);
        assert_eq!(chunk.add_constant(Value::Obj(ObjRef::new(7))), 6);
        assert_eq!(chunk.add_constant(Value::Obj(ObjRef::new(7))), 6);
    }

    #[test]
    fn large_pools_keep_one_slot_per_constant() {
        let mut chunk = Chunk::new();
        for i in 0..100_000 {
            assert_eq!(chunk.add_constant(Value::Number(i as f64)), i);
        }
        for i in (0..100_000).step_by(997) {
            assert_eq!(chunk.add_constant(Value::Number(i as f64)), i);
        }
        assert_eq!(chunk.constants.len(), 100_000);
    }

    #[test]
    fn operand_encoding() {
        let mut chunk = Chunk::new();
        chunk.write(0, 1);
        chunk.write(0, 1);
        chunk.patch_u16(0, 0x1234);
        assert_eq!(chunk.code, vec![0x12, 0x34]);
        assert_eq!(chunk.read_u16(0), 0x1234);

        let mut chunk = Chunk::new();
        for byte in [0x56, 0x34, 0x12] {
            chunk.write(byte, 1);
        }
        assert_eq!(chunk.read_u24(0), 0x123456);
    }

    mod properties {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(200))]

            /// Every byte offset maps back to the line it was written with.
            #[test]
            fn line_lookup_matches_recorded_lines(
                deltas in proptest::collection::vec((0u32..3, 1usize..5), 1..60)
            ) {
                let mut chunk = Chunk::new();
                let mut expected = Vec::new();
                let mut line = 1;
                for (delta, bytes) in deltas {
                    line += delta;
                    for _ in 0..bytes {
                        chunk.write(0, line);
                        expected.push(line);
                    }
                }
                for (offset, line) in expected.iter().enumerate() {
                    prop_assert_eq!(chunk.line_at(offset), Some(*line));
                }
            }
        }
    }
}
