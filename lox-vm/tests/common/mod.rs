// lox-vm - Common test utilities
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Shared helpers for the lox-vm integration tests.
//!
//! # Usage
//!
//! ```ignore
//! mod common;
//! use common::*;
//! ```
//!
//! - [`run`] - Run a program on a fresh VM, capturing `print` output
//! - [`run_stressed`] - Same, collecting garbage on every allocation
//! - [`run_with_config`] - Same, with an explicit [`VmConfig`]
//! - [`vm_with_output`] - A VM plus a handle on its output, for multi-step tests

#![allow(dead_code)]

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

#[allow(unused_imports)]
pub use lox_vm::{InterpretError, RuntimeErrorKind, Vm, VmConfig};

/// A `Write` sink that can be read back after the VM is done with it.
#[derive(Clone, Default)]
pub struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl SharedBuf {
    /// Everything written so far.
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.borrow().clone()).expect("print output is UTF-8")
    }

    /// Take everything written so far, leaving the buffer empty.
    pub fn take(&self) -> String {
        let bytes = std::mem::take(&mut *self.0.borrow_mut());
        String::from_utf8(bytes).expect("print output is UTF-8")
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A VM configured with `config` whose `print` output goes to the returned
/// buffer.
#[must_use]
pub fn vm_with_output(config: VmConfig) -> (Vm, SharedBuf) {
    let buf = SharedBuf::default();
    let mut vm = Vm::with_config(config);
    vm.set_output(Box::new(buf.clone()));
    (vm, buf)
}

/// Run `source` on a fresh VM with `config`.
///
/// # Returns
///
/// The captured output (including anything printed before a runtime error)
/// and the interpreter's result.
pub fn run_with_config(
    source: &str,
    config: VmConfig,
) -> (String, Result<(), InterpretError>) {
    let (mut vm, buf) = vm_with_output(config);
    let result = vm.interpret(source);
    (buf.contents(), result)
}

pub fn run(source: &str) -> (String, Result<(), InterpretError>) {
    run_with_config(source, VmConfig::default())
}

pub fn run_stressed(source: &str) -> (String, Result<(), InterpretError>) {
    run_with_config(source, VmConfig::stress())
}

/// Run `source` and return its output, panicking on any error.
#[must_use]
pub fn output_of(source: &str) -> String {
    let (out, result) = run(source);
    if let Err(e) = result {
        panic!("'{}' failed:\n{}", source, e.report());
    }
    out
}

/// Run `source` and return the runtime error it raises.
#[must_use]
pub fn runtime_error(source: &str) -> lox_vm::RuntimeError {
    match run(source).1 {
        Err(InterpretError::Runtime(e)) => e,
        Err(InterpretError::Compile(e)) => panic!("'{}' failed to compile:\n{}", source, e),
        Ok(()) => panic!("'{}' ran without error", source),
    }
}

/// Run `source` and return its rendered compile diagnostics.
#[must_use]
pub fn compile_errors(source: &str) -> Vec<String> {
    match run(source).1 {
        Err(InterpretError::Compile(e)) => e.diagnostics.iter().map(ToString::to_string).collect(),
        other => panic!("'{}' compiled: {:?}", source, other.err()),
    }
}

/// Assert that running `source` prints exactly `expected`.
///
/// ```ignore
/// assert_prints!("print 1 + 2;", "3\n");
/// ```
#[macro_export]
macro_rules! assert_prints {
    ($source:expr, $expected:expr) => {
        assert_eq!(
            $crate::common::output_of($source),
            $expected,
            "Output of '{}' did not match expected",
            $source
        );
    };
}

/// Assert that running `source` fails at runtime with `message`.
///
/// ```ignore
/// assert_runtime_error!("-nil;", "Operand must be a number.");
/// ```
#[macro_export]
macro_rules! assert_runtime_error {
    ($source:expr, $message:expr) => {
        let error = $crate::common::runtime_error($source);
        assert_eq!(
            error.kind.to_string(),
            $message,
            "Runtime error for '{}' did not match expected",
            $source
        );
    };
}
