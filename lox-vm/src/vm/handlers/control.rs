// lox-vm - Bytecode compiler and virtual machine for the Lox scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Control flow opcode handlers: jumps, calls, closures and returns.

use std::rc::Rc;

use crate::object::{Closure, Instance, NativeFn, ObjRef, Object};
use crate::opcode::OpCode;
use crate::table::Table;
use crate::value::Value;
use crate::vm::frame::CallFrame;
use crate::vm::{Result, RuntimeErrorKind, Vm};

/// Whether execution goes on after an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFlow {
    /// Continue execution.
    Continue,
    /// The top-level script returned.
    Return,
}

/// What a callee turned out to be, resolved before any stack mutation.
enum Callee {
    Closure(ObjRef),
    Native(NativeFn),
    Class {
        class: ObjRef,
        initializer: Option<Value>,
    },
    BoundMethod {
        receiver: Value,
        method: ObjRef,
    },
}

impl Vm {
    /// Execute a control flow opcode.
    pub(crate) fn execute_control(&mut self, op: OpCode) -> Result<ControlFlow> {
        match op {
            OpCode::Jump => {
                let offset = self.read_u16()? as usize;
                self.frame_mut()?.ip += offset;
            }
            OpCode::JumpIfFalse => {
                let offset = self.read_u16()? as usize;
                if self.stack.peek(0)?.is_falsey() {
                    self.frame_mut()?.ip += offset;
                }
            }
            OpCode::Loop => {
                let offset = self.read_u16()? as usize;
                let frame = self.frame_mut()?;
                frame.ip = frame.ip.checked_sub(offset).ok_or_else(|| {
                    RuntimeErrorKind::internal("loop resulted in negative instruction pointer")
                })?;
            }
            OpCode::Call => {
                let argc = self.read_byte()? as usize;
                let callee = self.stack.peek(argc)?;
                self.call_value(callee, argc)?;
            }
            OpCode::Invoke => {
                let name = self.read_string()?;
                let argc = self.read_byte()? as usize;
                self.invoke(name, argc)?;
            }
            OpCode::SuperInvoke => {
                let name = self.read_string()?;
                let argc = self.read_byte()? as usize;
                let superclass = self.pop_class()?;
                self.invoke_from_class(superclass, name, argc)?;
            }
            OpCode::Closure => self.execute_closure()?,
            OpCode::Return => {
                let result = self.stack.pop()?;
                let frame = self
                    .frames
                    .pop()
                    .ok_or_else(|| RuntimeErrorKind::internal("return with no active frame"))?;
                self.close_upvalues(frame.base);

                // Drop the callee slot and arguments.
                self.stack.truncate(frame.base);
                if self.frames.is_empty() {
                    return Ok(ControlFlow::Return);
                }
                self.stack.push(result);
            }
            _ => {
                return Err(RuntimeErrorKind::internal(format!(
                    "execute_control: unexpected opcode {:?}",
                    op
                )));
            }
        }
        Ok(ControlFlow::Continue)
    }

    /// Call `callee`, which sits below its `argc` arguments on the stack.
    pub(crate) fn call_value(&mut self, callee: Value, argc: usize) -> Result<()> {
        let Value::Obj(r) = callee else {
            return Err(RuntimeErrorKind::NotCallable);
        };
        let resolved = match self.heap.get(r) {
            Object::Closure(_) => Callee::Closure(r),
            Object::Native(native) => Callee::Native(Rc::clone(&native.function)),
            Object::Class(class) => Callee::Class {
                class: r,
                initializer: class.methods.get(self.heap.key(self.init_string)),
            },
            Object::BoundMethod(bound) => Callee::BoundMethod {
                receiver: bound.receiver,
                method: bound.method,
            },
            _ => return Err(RuntimeErrorKind::NotCallable),
        };

        match resolved {
            Callee::Closure(closure) => self.call(closure, argc),
            Callee::Native(function) => {
                let result = function(self.stack.top(argc)?).map_err(RuntimeErrorKind::Native)?;
                let callee_slot = self.stack.len() - argc - 1;
                self.stack.truncate(callee_slot);
                self.stack.push(result);
                Ok(())
            }
            Callee::Class { class, initializer } => {
                let instance = self.alloc(Object::Instance(Instance {
                    class,
                    fields: Table::new(),
                }));
                self.stack.set_from_top(argc, Value::Obj(instance))?;
                match initializer {
                    Some(Value::Obj(init)) => self.call(init, argc),
                    _ if argc != 0 => Err(RuntimeErrorKind::Arity {
                        expected: 0,
                        got: argc,
                    }),
                    _ => Ok(()),
                }
            }
            Callee::BoundMethod { receiver, method } => {
                self.stack.set_from_top(argc, receiver)?;
                self.call(method, argc)
            }
        }
    }

    /// Push a frame for `closure`. Its callee slot and arguments are already
    /// on the stack.
    pub(crate) fn call(&mut self, closure: ObjRef, argc: usize) -> Result<()> {
        let function = self.heap.function(self.heap.closure(closure).function);
        if argc != function.arity as usize {
            return Err(RuntimeErrorKind::Arity {
                expected: function.arity as usize,
                got: argc,
            });
        }
        if self.frames.len() >= self.config.max_frames {
            return Err(RuntimeErrorKind::StackOverflow);
        }

        let chunk = Rc::clone(&function.chunk);
        let base = self.stack.len() - argc - 1;
        self.frames.push(CallFrame::new(closure, chunk, base));
        Ok(())
    }

    /// `receiver.name(args)` without materialising a bound method.
    fn invoke(&mut self, name: ObjRef, argc: usize) -> Result<()> {
        let receiver = self.stack.peek(argc)?;
        let instance = match receiver {
            Value::Obj(r) => match self.heap.get(r) {
                Object::Instance(instance) => instance,
                _ => return Err(RuntimeErrorKind::MethodOnNonInstance),
            },
            _ => return Err(RuntimeErrorKind::MethodOnNonInstance),
        };

        let class = instance.class;
        let field = instance.fields.get(self.heap.key(name));

        // A field shadows a method of the same name.
        if let Some(field) = field {
            self.stack.set_from_top(argc, field)?;
            return self.call_value(field, argc);
        }
        self.invoke_from_class(class, name, argc)
    }

    pub(crate) fn invoke_from_class(
        &mut self,
        class: ObjRef,
        name: ObjRef,
        argc: usize,
    ) -> Result<()> {
        match self.heap.class(class).methods.get(self.heap.key(name)) {
            Some(Value::Obj(method)) => self.call(method, argc),
            _ => Err(RuntimeErrorKind::UndefinedProperty(
                self.heap.str(name).to_string(),
            )),
        }
    }

    /// Wrap a function constant in a closure, capturing its upvalues.
    fn execute_closure(&mut self) -> Result<()> {
        let index = self.read_byte()? as usize;
        let function = match self.read_constant(index)? {
            Value::Obj(r) if matches!(self.heap.get(r), Object::Function(_)) => r,
            _ => return Err(RuntimeErrorKind::internal("closure over a non-function")),
        };
        let upvalue_count = self.heap.function(function).upvalue_count;

        // The closure is allocated first and rooted on the stack so the
        // upvalue allocations below cannot free it.
        let closure = self.alloc(Object::Closure(Closure {
            function,
            upvalues: Vec::with_capacity(upvalue_count),
        }));
        self.stack.push(Value::Obj(closure));

        for _ in 0..upvalue_count {
            let is_local = self.read_byte()? == 1;
            let index = self.read_byte()? as usize;
            let upvalue = if is_local {
                let base = self.frame()?.base;
                self.capture_upvalue(base + index)
            } else {
                let enclosing = self.frame()?.closure;
                self.heap
                    .closure(enclosing)
                    .upvalues
                    .get(index)
                    .copied()
                    .ok_or_else(|| RuntimeErrorKind::internal("upvalue index out of bounds"))?
            };
            match self.heap.get_mut(closure) {
                Object::Closure(c) => c.upvalues.push(upvalue),
                _ => return Err(RuntimeErrorKind::internal("closure was replaced")),
            }
        }
        Ok(())
    }
}
