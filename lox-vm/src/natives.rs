// lox-vm - Bytecode compiler and virtual machine for the Lox scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Built-in native functions installed into every VM.

use std::rc::Rc;
use std::sync::OnceLock;
use std::time::Instant;

use crate::object::NativeFn;
use crate::value::Value;

/// Natives every VM defines at startup, as (name, function) pairs.
pub fn builtins() -> Vec<(&'static str, NativeFn)> {
    vec![("clock", Rc::new(clock) as NativeFn)]
}

/// Seconds elapsed since the first call to `clock` in this process.
fn clock(_args: &[Value]) -> Result<Value, String> {
    static START: OnceLock<Instant> = OnceLock::new();
    let start = START.get_or_init(Instant::now);
    Ok(Value::Number(start.elapsed().as_secs_f64()))
}
