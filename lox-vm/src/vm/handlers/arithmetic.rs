// lox-vm - Bytecode compiler and virtual machine for the Lox scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Arithmetic, comparison and logic opcode handlers.
//!
//! Operands are type-checked by peeking before anything is popped, so a
//! failed check leaves the stack as it was.

use crate::object::Object;
use crate::opcode::OpCode;
use crate::value::Value;
use crate::vm::{Result, RuntimeErrorKind, Vm};

impl Vm {
    /// Execute an arithmetic opcode.
    pub(crate) fn execute_arithmetic(&mut self, op: OpCode) -> Result<()> {
        match op {
            OpCode::Equal => {
                let b = self.stack.pop()?;
                let a = self.stack.pop()?;
                self.stack.push(Value::Bool(a == b));
                Ok(())
            }
            OpCode::Greater => self.binary_num_op(|a, b| Value::Bool(a > b)),
            OpCode::Less => self.binary_num_op(|a, b| Value::Bool(a < b)),
            OpCode::Add => self.execute_add(),
            OpCode::Subtract => self.binary_num_op(|a, b| Value::Number(a - b)),
            OpCode::Multiply => self.binary_num_op(|a, b| Value::Number(a * b)),
            OpCode::Divide => self.binary_num_op(|a, b| Value::Number(a / b)),
            OpCode::Not => {
                let value = self.stack.pop()?;
                self.stack.push(Value::Bool(value.is_falsey()));
                Ok(())
            }
            OpCode::Negate => {
                let Value::Number(n) = self.stack.peek(0)? else {
                    return Err(RuntimeErrorKind::OperandNotNumber);
                };
                self.stack.pop()?;
                self.stack.push(Value::Number(-n));
                Ok(())
            }
            _ => Err(RuntimeErrorKind::internal(format!(
                "execute_arithmetic: unexpected opcode {:?}",
                op
            ))),
        }
    }

    fn binary_num_op(&mut self, f: impl FnOnce(f64, f64) -> Value) -> Result<()> {
        let (Value::Number(a), Value::Number(b)) = (self.stack.peek(1)?, self.stack.peek(0)?)
        else {
            return Err(RuntimeErrorKind::OperandsNotNumbers);
        };
        self.stack.pop()?;
        self.stack.pop()?;
        self.stack.push(f(a, b));
        Ok(())
    }

    /// `+` adds numbers and concatenates strings.
    fn execute_add(&mut self) -> Result<()> {
        let b = self.stack.peek(0)?;
        let a = self.stack.peek(1)?;
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => {
                self.stack.pop()?;
                self.stack.pop()?;
                self.stack.push(Value::Number(x + y));
            }
            (Value::Obj(x), Value::Obj(y)) => {
                let joined = match (self.heap.get(x), self.heap.get(y)) {
                    (Object::String(x), Object::String(y)) => {
                        let mut joined = String::with_capacity(x.chars.len() + y.chars.len());
                        joined.push_str(&x.chars);
                        joined.push_str(&y.chars);
                        joined
                    }
                    _ => return Err(RuntimeErrorKind::InvalidAddOperands),
                };
                // Both operands stay on the stack, and so stay rooted, until
                // the result exists.
                let (heap, roots) = self.split();
                let result = heap.intern_owned(joined, &roots);
                self.stack.pop()?;
                self.stack.pop()?;
                self.stack.push(Value::Obj(result));
            }
            _ => return Err(RuntimeErrorKind::InvalidAddOperands),
        }
        Ok(())
    }
}
