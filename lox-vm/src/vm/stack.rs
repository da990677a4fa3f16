// lox-vm - Bytecode compiler and virtual machine for the Lox scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Value stack for the VM.

use crate::value::Value;

use super::{Result, RuntimeErrorKind};

/// The VM's operand stack, shared by every call frame.
#[derive(Debug, Default)]
pub struct ValueStack {
    values: Vec<Value>,
}

fn underflow() -> RuntimeErrorKind {
    RuntimeErrorKind::internal("stack underflow")
}

impl ValueStack {
    /// Create an empty stack with room for `capacity` values.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn push(&mut self, value: Value) {
        self.values.push(value);
    }

    #[inline]
    pub fn pop(&mut self) -> Result<Value> {
        self.values.pop().ok_or_else(underflow)
    }

    /// Peek at a value on the stack without removing it.
    /// `distance` is the offset from the top (0 = top).
    #[inline]
    pub fn peek(&self, distance: usize) -> Result<Value> {
        if distance >= self.values.len() {
            return Err(underflow());
        }
        Ok(self.values[self.values.len() - 1 - distance])
    }

    /// Get a value at an absolute index.
    #[inline]
    pub fn get(&self, index: usize) -> Result<Value> {
        self.values.get(index).copied().ok_or_else(underflow)
    }

    /// Set a value at an absolute index.
    #[inline]
    pub fn set(&mut self, index: usize, value: Value) -> Result<()> {
        let slot = self.values.get_mut(index).ok_or_else(underflow)?;
        *slot = value;
        Ok(())
    }

    /// Overwrite the value `distance` slots below the top.
    pub fn set_from_top(&mut self, distance: usize, value: Value) -> Result<()> {
        let index = self
            .values
            .len()
            .checked_sub(distance + 1)
            .ok_or_else(underflow)?;
        self.set(index, value)
    }

    /// The top `n` values, oldest first.
    pub fn top(&self, n: usize) -> Result<&[Value]> {
        let start = self.values.len().checked_sub(n).ok_or_else(underflow)?;
        Ok(&self.values[start..])
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Truncate the stack to the given size.
    #[inline]
    pub fn truncate(&mut self, size: usize) {
        self.values.truncate(size);
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }
}
