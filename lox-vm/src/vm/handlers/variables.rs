// lox-vm - Bytecode compiler and virtual machine for the Lox scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Variable opcode handlers: locals, globals, upvalues.

use crate::object::{ObjRef, Object, Upvalue};
use crate::opcode::OpCode;
use crate::value::Value;
use crate::vm::{Result, RuntimeErrorKind, Vm};

impl Vm {
    /// Execute a variable opcode.
    pub(crate) fn execute_variables(&mut self, op: OpCode) -> Result<()> {
        match op {
            OpCode::GetLocal => {
                let slot = self.read_byte()? as usize;
                let base = self.frame()?.base;
                let value = self.stack.get(base + slot)?;
                self.stack.push(value);
            }
            OpCode::SetLocal => {
                let slot = self.read_byte()? as usize;
                let base = self.frame()?.base;
                let value = self.stack.peek(0)?;
                self.stack.set(base + slot, value)?;
            }
            OpCode::GetGlobal => {
                let name = self.read_string()?;
                let value = self
                    .globals
                    .get(self.heap.key(name))
                    .ok_or_else(|| self.undefined_variable(name))?;
                self.stack.push(value);
            }
            OpCode::DefineGlobal => {
                let name = self.read_string()?;
                let value = self.stack.peek(0)?;
                self.globals.set(self.heap.key(name), value);
                self.stack.pop()?;
            }
            OpCode::SetGlobal => {
                let name = self.read_string()?;
                let key = self.heap.key(name);
                let value = self.stack.peek(0)?;
                // Assignment never creates a global.
                if self.globals.set(key, value) {
                    self.globals.delete(key);
                    return Err(self.undefined_variable(name));
                }
            }
            OpCode::GetUpvalue => {
                let index = self.read_byte()? as usize;
                let upvalue = self.frame_upvalue(index)?;
                let value = match self.heap.upvalue(upvalue) {
                    Upvalue::Open(slot) => self.stack.get(slot)?,
                    Upvalue::Closed(value) => value,
                };
                self.stack.push(value);
            }
            OpCode::SetUpvalue => {
                let index = self.read_byte()? as usize;
                let upvalue = self.frame_upvalue(index)?;
                let value = self.stack.peek(0)?;
                match self.heap.upvalue_mut(upvalue) {
                    Upvalue::Open(slot) => {
                        let slot = *slot;
                        self.stack.set(slot, value)?;
                    }
                    Upvalue::Closed(stored) => *stored = value,
                }
            }
            OpCode::CloseUpvalue => {
                let top = self
                    .stack
                    .len()
                    .checked_sub(1)
                    .ok_or_else(|| RuntimeErrorKind::internal("stack underflow"))?;
                self.close_upvalues(top);
                self.stack.pop()?;
            }
            _ => {
                return Err(RuntimeErrorKind::internal(format!(
                    "execute_variables: unexpected opcode {:?}",
                    op
                )));
            }
        }
        Ok(())
    }

    fn undefined_variable(&self, name: ObjRef) -> RuntimeErrorKind {
        RuntimeErrorKind::UndefinedVariable(self.heap.str(name).to_string())
    }

    /// Upvalue `index` of the closure running in the current frame.
    fn frame_upvalue(&self, index: usize) -> Result<ObjRef> {
        let closure = self.frame()?.closure;
        self.heap
            .closure(closure)
            .upvalues
            .get(index)
            .copied()
            .ok_or_else(|| RuntimeErrorKind::internal("upvalue index out of bounds"))
    }

    /// Find or create the open upvalue for stack `slot`.
    ///
    /// The open list is sorted by slot, so the scan from the top stops as
    /// soon as it passes below `slot`.
    pub(crate) fn capture_upvalue(&mut self, slot: usize) -> ObjRef {
        let mut insert_at = self.open_upvalues.len();
        for (i, &upvalue) in self.open_upvalues.iter().enumerate().rev() {
            let open_slot = match self.heap.upvalue(upvalue) {
                Upvalue::Open(s) => s,
                Upvalue::Closed(_) => continue,
            };
            if open_slot == slot {
                return upvalue;
            }
            if open_slot < slot {
                break;
            }
            insert_at = i;
        }

        let created = self.alloc(Object::Upvalue(Upvalue::Open(slot)));
        self.open_upvalues.insert(insert_at, created);
        created
    }

    /// Close every open upvalue at or above stack slot `last`, moving the
    /// slot's value into the upvalue.
    pub(crate) fn close_upvalues(&mut self, last: usize) {
        while let Some(&upvalue) = self.open_upvalues.last() {
            let Upvalue::Open(slot) = self.heap.upvalue(upvalue) else {
                self.open_upvalues.pop();
                continue;
            };
            if slot < last {
                break;
            }
            let value = self.stack.get(slot).unwrap_or(Value::Nil);
            *self.heap.upvalue_mut(upvalue) = Upvalue::Closed(value);
            self.open_upvalues.pop();
        }
    }
}
