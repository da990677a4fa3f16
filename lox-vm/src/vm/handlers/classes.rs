// lox-vm - Bytecode compiler and virtual machine for the Lox scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Class and property opcode handlers.

use crate::object::{BoundMethod, Class, ObjRef, Object};
use crate::opcode::OpCode;
use crate::table::Table;
use crate::value::Value;
use crate::vm::{Result, RuntimeErrorKind, Vm};

impl Vm {
    /// Execute a class or property opcode.
    pub(crate) fn execute_classes(&mut self, op: OpCode) -> Result<()> {
        match op {
            OpCode::GetProperty => {
                let name = self.read_string()?;
                let instance = self.peek_instance(0, RuntimeErrorKind::PropertyOnNonInstance)?;
                let (class, field) = {
                    let instance = self.heap.instance(instance);
                    (instance.class, instance.fields.get(self.heap.key(name)))
                };
                match field {
                    Some(value) => {
                        self.stack.pop()?;
                        self.stack.push(value);
                    }
                    None => self.bind_method(class, name)?,
                }
            }
            OpCode::SetProperty => {
                let name = self.read_string()?;
                let instance = self.peek_instance(1, RuntimeErrorKind::FieldOnNonInstance)?;
                let value = self.stack.peek(0)?;
                let key = self.heap.key(name);
                self.heap.instance_mut(instance).fields.set(key, value);
                self.heap.recharge(instance);

                // Leave the assigned value as the expression's result.
                self.stack.pop()?;
                self.stack.pop()?;
                self.stack.push(value);
            }
            OpCode::GetSuper => {
                let name = self.read_string()?;
                let superclass = self.pop_class()?;
                self.bind_method(superclass, name)?;
            }
            OpCode::Class => {
                let name = self.read_string()?;
                let class = self.alloc(Object::Class(Class {
                    name,
                    methods: Table::new(),
                }));
                self.stack.push(Value::Obj(class));
            }
            OpCode::Inherit => {
                let superclass = match self.stack.peek(1)? {
                    Value::Obj(r) if matches!(self.heap.get(r), Object::Class(_)) => r,
                    _ => return Err(RuntimeErrorKind::SuperclassNotClass),
                };
                let subclass = self.class_at(0)?;

                // Copy-down inheritance: methods defined later in the
                // subclass body overwrite the inherited ones.
                let methods = self.heap.class(superclass).methods.clone();
                methods.add_all_to(&mut self.heap.class_mut(subclass).methods);
                self.heap.recharge(subclass);
                self.stack.pop()?;
            }
            OpCode::Method => {
                let name = self.read_string()?;
                let method = self.stack.peek(0)?;
                let class = self.class_at(1)?;
                let key = self.heap.key(name);
                self.heap.class_mut(class).methods.set(key, method);
                self.heap.recharge(class);
                self.stack.pop()?;
            }
            _ => {
                return Err(RuntimeErrorKind::internal(format!(
                    "execute_classes: unexpected opcode {:?}",
                    op
                )));
            }
        }
        Ok(())
    }

    /// Pop the class pushed for a `super` access.
    pub(crate) fn pop_class(&mut self) -> Result<ObjRef> {
        match self.stack.pop()? {
            Value::Obj(r) if matches!(self.heap.get(r), Object::Class(_)) => Ok(r),
            _ => Err(RuntimeErrorKind::internal("super access without a class")),
        }
    }

    /// Replace the receiver on top of the stack with `class.name` bound to it.
    fn bind_method(&mut self, class: ObjRef, name: ObjRef) -> Result<()> {
        let method = match self.heap.class(class).methods.get(self.heap.key(name)) {
            Some(Value::Obj(method)) => method,
            _ => {
                return Err(RuntimeErrorKind::UndefinedProperty(
                    self.heap.str(name).to_string(),
                ));
            }
        };
        // The receiver stays on the stack until the bound method exists.
        let receiver = self.stack.peek(0)?;
        let bound = self.alloc(Object::BoundMethod(BoundMethod { receiver, method }));
        self.stack.pop()?;
        self.stack.push(Value::Obj(bound));
        Ok(())
    }

    fn peek_instance(&self, distance: usize, error: RuntimeErrorKind) -> Result<ObjRef> {
        match self.stack.peek(distance)? {
            Value::Obj(r) if matches!(self.heap.get(r), Object::Instance(_)) => Ok(r),
            _ => Err(error),
        }
    }

    fn class_at(&self, distance: usize) -> Result<ObjRef> {
        match self.stack.peek(distance)? {
            Value::Obj(r) if matches!(self.heap.get(r), Object::Class(_)) => Ok(r),
            _ => Err(RuntimeErrorKind::internal("expected a class on the stack")),
        }
    }
}
