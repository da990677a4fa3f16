// lox-vm - Bytecode compiler and virtual machine for the Lox scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Stack-based virtual machine for executing Lox bytecode.

pub mod error;
pub mod frame;
pub mod handlers;
pub mod stack;

use std::io::{self, Write};

use tracing::{debug, trace};

use crate::compiler::{self, CompileError};
use crate::config::VmConfig;
use crate::debug::disassemble_instruction;
use crate::heap::{Heap, Roots};
use crate::natives;
use crate::object::{Closure, Native, NativeFn, ObjRef, Object};
use crate::opcode::OpCode;
use crate::pin::{PinTable, Pinned};
use crate::table::Table;
use crate::value::Value;

pub use error::{InterpretError, Result, RuntimeError, RuntimeErrorKind, TraceFrame};
pub use frame::CallFrame;
pub use handlers::control::ControlFlow;
pub use stack::ValueStack;

/// The Lox virtual machine. Owns the heap and everything rooted in it.
///
/// Globals and interned strings persist across [`interpret`](Vm::interpret)
/// calls, so a REPL can run one line at a time against the same VM.
pub struct Vm {
    config: VmConfig,
    heap: Heap,

    /// Value stack.
    stack: ValueStack,

    /// Call frame stack.
    frames: Vec<CallFrame>,

    globals: Table,

    /// Upvalues still pointing into the stack, ordered by slot. The
    /// innermost (highest slot) is last.
    open_upvalues: Vec<ObjRef>,

    /// Interned `"init"`, looked up on every class call.
    init_string: ObjRef,

    /// Values the host holds across calls.
    pins: PinTable,

    /// Destination of `print`.
    out: Box<dyn Write>,
}

/// Everything the VM keeps alive across a collection.
pub(crate) struct VmRoots<'a> {
    stack: &'a ValueStack,
    frames: &'a [CallFrame],
    globals: &'a Table,
    open_upvalues: &'a [ObjRef],
    init_string: ObjRef,
    pins: &'a PinTable,
}

impl Roots for VmRoots<'_> {
    fn mark_roots(&self, heap: &mut Heap) {
        for &value in self.stack.iter() {
            heap.mark_value(value);
        }
        for frame in self.frames {
            heap.mark_object(frame.closure);
        }
        for &upvalue in self.open_upvalues {
            heap.mark_object(upvalue);
        }
        heap.mark_table(self.globals);
        heap.mark_object(self.init_string);
        self.pins.mark(heap);
    }
}

impl Vm {
    /// Create a VM with the default configuration, printing to stdout.
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        let mut heap = Heap::new(&config);
        let init_string = heap.intern("init", &crate::heap::NoRoots);
        let mut vm = Self {
            stack: ValueStack::with_capacity(config.stack_capacity()),
            frames: Vec::with_capacity(config.max_frames),
            globals: Table::new(),
            open_upvalues: Vec::new(),
            init_string,
            pins: PinTable::default(),
            out: Box::new(io::stdout()),
            heap,
            config,
        };
        for (name, function) in natives::builtins() {
            vm.define_native(name, function);
        }
        vm
    }

    /// Redirect `print` output.
    pub fn set_output(&mut self, out: Box<dyn Write>) {
        self.out = out;
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Compile and run `source`.
    pub fn interpret(&mut self, source: &str) -> std::result::Result<(), InterpretError> {
        let closure = self.load(source)?;
        if let Err(kind) = self.call(closure, 0).and_then(|()| self.run()) {
            let error = self.runtime_error(kind);
            debug!(error = %error.kind, frames = error.trace.len(), "runtime error");
            self.reset();
            return Err(error.into());
        }
        Ok(())
    }

    /// Run a full garbage collection now.
    pub fn collect_garbage(&mut self) {
        let (heap, roots) = self.split();
        heap.collect(&roots);
    }

    // =========================================================================
    // Host access
    // =========================================================================

    /// Define a global bound to a host function.
    pub fn define_native(&mut self, name: &str, function: NativeFn) {
        let name_ref = self.intern(name);
        self.stack.push(Value::Obj(name_ref));
        let native = self.alloc(Object::Native(Native {
            name: name.into(),
            function,
        }));
        let key = self.heap.key(name_ref);
        self.globals.set(key, Value::Obj(native));
        self.stack.truncate(self.stack.len() - 1);
    }

    /// Keep `value` alive for the host until the returned handle is dropped.
    pub fn pin(&self, value: Value) -> Pinned {
        self.pins.pin(value)
    }

    /// Look up a global by name.
    pub fn get_global(&self, name: &str) -> Option<Value> {
        let name = self.heap.find_interned(name)?;
        self.globals.get(self.heap.key(name))
    }

    /// Define or overwrite a global.
    pub fn set_global(&mut self, name: &str, value: Value) {
        // The value may be a fresh object nothing else refers to yet.
        self.stack.push(value);
        let name = self.intern(name);
        let key = self.heap.key(name);
        self.globals.set(key, value);
        self.stack.truncate(self.stack.len() - 1);
    }

    /// Intern a string on behalf of the host.
    pub fn intern(&mut self, text: &str) -> ObjRef {
        let (heap, roots) = self.split();
        heap.intern(text, &roots)
    }

    /// Format a value the way `print` does.
    pub fn display(&self, value: Value) -> String {
        self.heap.display(value).to_string()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Borrow the heap mutably alongside the roots it must respect.
    fn split(&mut self) -> (&mut Heap, VmRoots<'_>) {
        let roots = VmRoots {
            stack: &self.stack,
            frames: &self.frames,
            globals: &self.globals,
            open_upvalues: &self.open_upvalues,
            init_string: self.init_string,
            pins: &self.pins,
        };
        (&mut self.heap, roots)
    }

    pub(crate) fn alloc(&mut self, object: Object) -> ObjRef {
        let (heap, roots) = self.split();
        heap.alloc(object, &roots)
    }

    /// Compile `source` and leave its top-level closure in stack slot zero.
    fn load(&mut self, source: &str) -> std::result::Result<ObjRef, CompileError> {
        let function = {
            let (heap, roots) = self.split();
            compiler::compile(source, heap, &roots)?
        };

        // Root the function on the stack while its closure is allocated.
        self.stack.push(Value::Obj(function));
        let closure = self.alloc(Object::Closure(Closure {
            function,
            upvalues: Vec::new(),
        }));
        self.stack.truncate(self.stack.len() - 1);
        self.stack.push(Value::Obj(closure));
        Ok(closure)
    }

    fn run(&mut self) -> Result<()> {
        while let ControlFlow::Continue = self.step()? {}
        Ok(())
    }

    /// Execute one instruction.
    fn step(&mut self) -> Result<ControlFlow> {
        if self.config.trace_execution {
            self.trace_instruction();
        }

        let byte = self.read_byte()?;
        let op = OpCode::try_from(byte)
            .map_err(|byte| RuntimeErrorKind::internal(format!("unknown opcode {}", byte)))?;

        match op {
            // Constants & Stack - handled inline (simple operations)
            OpCode::Constant => {
                let index = self.read_byte()? as usize;
                let value = self.read_constant(index)?;
                self.stack.push(value);
            }
            OpCode::ConstantLong => {
                let index = self.read_u24()?;
                let value = self.read_constant(index)?;
                self.stack.push(value);
            }
            OpCode::Nil => self.stack.push(Value::Nil),
            OpCode::True => self.stack.push(Value::Bool(true)),
            OpCode::False => self.stack.push(Value::Bool(false)),
            OpCode::Pop => {
                self.stack.pop()?;
            }
            OpCode::Print => {
                let value = self.stack.pop()?;
                writeln!(self.out, "{}", self.heap.display(value))
                    .map_err(|e| RuntimeErrorKind::Output(e.to_string()))?;
            }

            // Variables - delegated to handler
            OpCode::GetLocal
            | OpCode::SetLocal
            | OpCode::GetGlobal
            | OpCode::DefineGlobal
            | OpCode::SetGlobal
            | OpCode::GetUpvalue
            | OpCode::SetUpvalue
            | OpCode::CloseUpvalue => self.execute_variables(op)?,

            // Arithmetic & comparison - delegated to handler
            OpCode::Equal
            | OpCode::Greater
            | OpCode::Less
            | OpCode::Add
            | OpCode::Subtract
            | OpCode::Multiply
            | OpCode::Divide
            | OpCode::Not
            | OpCode::Negate => self.execute_arithmetic(op)?,

            // Control flow - delegated to handler
            OpCode::Jump
            | OpCode::JumpIfFalse
            | OpCode::Loop
            | OpCode::Call
            | OpCode::Invoke
            | OpCode::SuperInvoke
            | OpCode::Closure
            | OpCode::Return => return self.execute_control(op),

            // Classes & properties - delegated to handler
            OpCode::GetProperty
            | OpCode::SetProperty
            | OpCode::GetSuper
            | OpCode::Class
            | OpCode::Inherit
            | OpCode::Method => self.execute_classes(op)?,
        }
        Ok(ControlFlow::Continue)
    }

    fn trace_instruction(&self) {
        let Some(frame) = self.frames.last() else {
            return;
        };
        let stack: Vec<String> = self
            .stack
            .iter()
            .map(|&v| format!("[ {} ]", self.heap.display(v)))
            .collect();
        let (listing, _) = disassemble_instruction(&frame.chunk, &self.heap, frame.ip);
        trace!(stack = %stack.concat(), "{}", listing);
    }

    fn frame(&self) -> Result<&CallFrame> {
        self.frames
            .last()
            .ok_or_else(|| RuntimeErrorKind::internal("no active frame"))
    }

    fn frame_mut(&mut self) -> Result<&mut CallFrame> {
        self.frames
            .last_mut()
            .ok_or_else(|| RuntimeErrorKind::internal("no active frame"))
    }

    fn read_byte(&mut self) -> Result<u8> {
        let frame = self.frame_mut()?;
        let byte = frame
            .chunk
            .code
            .get(frame.ip)
            .copied()
            .ok_or_else(|| RuntimeErrorKind::internal("instruction pointer out of bounds"))?;
        frame.ip += 1;
        Ok(byte)
    }

    fn read_u16(&mut self) -> Result<u16> {
        let hi = self.read_byte()?;
        let lo = self.read_byte()?;
        Ok(u16::from_be_bytes([hi, lo]))
    }

    fn read_u24(&mut self) -> Result<usize> {
        let b0 = self.read_byte()?;
        let b1 = self.read_byte()?;
        let b2 = self.read_byte()?;
        Ok(u32::from_le_bytes([b0, b1, b2, 0]) as usize)
    }

    fn read_constant(&self, index: usize) -> Result<Value> {
        self.frame()?
            .chunk
            .constants
            .get(index)
            .copied()
            .ok_or_else(|| RuntimeErrorKind::internal("constant index out of bounds"))
    }

    /// Read a one-byte constant operand naming an interned string.
    fn read_string(&mut self) -> Result<ObjRef> {
        let index = self.read_byte()? as usize;
        match self.read_constant(index)? {
            Value::Obj(r) if self.heap.is_string(Value::Obj(r)) => Ok(r),
            _ => Err(RuntimeErrorKind::internal("expected a string constant")),
        }
    }

    /// Attach a traceback, innermost frame first.
    fn runtime_error(&self, kind: RuntimeErrorKind) -> RuntimeError {
        let trace = self
            .frames
            .iter()
            .rev()
            .map(|frame| {
                let function = self.heap.function(self.heap.closure(frame.closure).function);
                TraceFrame {
                    line: frame.current_line(),
                    function: function.name.map(|n| self.heap.str(n).to_string()),
                }
            })
            .collect();
        RuntimeError { kind, trace }
    }

    /// Drop all execution state after an error. Globals survive.
    fn reset(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues.clear();
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::rc::Rc;

    use super::*;

    /// A `Write` sink tests can read back.
    #[derive(Clone, Default)]
    struct SharedBuf(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn vm_with_output(config: VmConfig) -> (Vm, SharedBuf) {
        let buf = SharedBuf::default();
        let mut vm = Vm::with_config(config);
        vm.set_output(Box::new(buf.clone()));
        (vm, buf)
    }

    fn output(buf: &SharedBuf) -> String {
        String::from_utf8(buf.0.borrow().clone()).unwrap()
    }

    #[test]
    fn stack_is_empty_after_a_run() {
        let (mut vm, buf) = vm_with_output(VmConfig::default());
        vm.interpret("var a = 1; { var b = 2; print a + b; }").unwrap();
        assert_eq!(output(&buf), "3\n");
        assert!(vm.stack.is_empty());
        assert!(vm.frames.is_empty());
    }

    #[test]
    fn state_is_reset_after_a_runtime_error() {
        let (mut vm, _) = vm_with_output(VmConfig::default());
        let err = vm
            .interpret("fun f() { var x = 1; return -\"a\"; } f();")
            .unwrap_err();
        assert_eq!(err.exit_code(), 70);
        assert!(vm.stack.is_empty());
        assert!(vm.frames.is_empty());
        assert!(vm.open_upvalues.is_empty());
    }

    #[test]
    fn open_upvalues_are_sorted_and_shared() {
        let (mut vm, buf) = vm_with_output(VmConfig::default());
        // Two closures over the same pair of locals share both upvalues.
        vm.interpret(
            "var get; var set;
             fun make() {
               var a = 1; var b = 2;
               fun g() { return a + b; }
               fun s() { a = 10; b = 20; }
               get = g; set = s;
             }
             make(); set(); print get();",
        )
        .unwrap();
        assert_eq!(output(&buf), "30\n");
        assert!(vm.open_upvalues.is_empty());
    }

    #[test]
    fn trace_execution_does_not_change_results() {
        let config = VmConfig {
            trace_execution: true,
            ..VmConfig::default()
        };
        let (mut vm, buf) = vm_with_output(config);
        vm.interpret("print 1 + 2;").unwrap();
        assert_eq!(output(&buf), "3\n");
    }

    /// Touches every opcode with a fixed stack effect.
    fn every_fixed_effect_program() -> String {
        let long_constants: Vec<String> = (0..300).map(|i| i.to_string()).collect();
        format!(
            r#"
            var total = 0;
            {{ var i = 0; while (i < 3) {{ total = total + i; i = i + 1; }} }}
            for (var j = 0; j < 2; j = j + 1) {{
              if (j > 0 and true) print j; else print !false;
            }}
            var f = nil or -1;
            fun outer() {{
              var x = 1;
              fun inner() {{ x = x * 2; return x / 1; }}
              inner();
              {{ var y = x - 1; fun g() {{ return y; }} f = g; }}
              return x == 2;
            }}
            print outer();
            class A {{ greet() {{ return "A"; }} }}
            class B < A {{
              init() {{ this.name = "b"; }}
              greet() {{ var m = super.greet; return m() + this.name; }}
            }}
            var b = B();
            b.name = "c";
            print b.name;
            print b.greet();
            print {};
            "#,
            long_constants.join(" + ")
        )
    }

    #[test]
    fn stack_depth_follows_documented_effects() {
        let (mut vm, buf) = vm_with_output(VmConfig::default());
        let closure = vm.load(&every_fixed_effect_program()).unwrap();
        vm.call(closure, 0).unwrap();

        let mut seen = HashSet::new();
        loop {
            let frame = vm.frames.last().unwrap();
            let op = OpCode::try_from(frame.chunk.code[frame.ip]).unwrap();
            let before = vm.stack.len() as isize;
            let flow = vm.step().unwrap();
            if let Some(effect) = op.stack_effect() {
                let after = vm.stack.len() as isize;
                assert_eq!(after - before, effect as isize, "{:?}", op);
                seen.insert(op);
            }
            if flow == ControlFlow::Return {
                break;
            }
        }

        let missing: Vec<OpCode> = (0..=u8::MAX)
            .filter_map(|byte| OpCode::try_from(byte).ok())
            .filter(|op| op.stack_effect().is_some() && !seen.contains(op))
            .collect();
        assert!(missing.is_empty(), "not exercised: {:?}", missing);
        assert_eq!(output(&buf), "true\n1\ntrue\nc\nAc\n44850\n");
    }

    #[test]
    fn pinned_values_outlive_their_globals() {
        let (mut vm, _) = vm_with_output(VmConfig::default());
        vm.interpret(r#"var s = "hello" + " world";"#).unwrap();
        let pinned = vm.pin(vm.get_global("s").unwrap());

        vm.interpret("s = nil;").unwrap();
        vm.collect_garbage();
        vm.interpret(r#"var t = "other" + "thing";"#).unwrap();
        assert_eq!(vm.display(pinned.value()), "hello world");

        let Value::Obj(string) = pinned.value() else {
            panic!("expected a string object");
        };
        drop(pinned);
        vm.collect_garbage();
        assert!(!vm.heap.contains(string));
    }

    #[test]
    fn globals_round_trip_through_the_host() {
        let mut vm = Vm::new();
        vm.set_global("answer", Value::Number(42.0));
        assert_eq!(vm.get_global("answer"), Some(Value::Number(42.0)));
        assert_eq!(vm.get_global("missing"), None);
    }

    #[test]
    fn clock_is_installed() {
        let vm = Vm::new();
        let clock = vm.get_global("clock").unwrap();
        assert_eq!(vm.display(clock), "<native fn>");
    }
}
