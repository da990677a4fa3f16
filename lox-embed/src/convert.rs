// lox-embed - Type conversion traits
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Type conversion between Rust and Lox values.
//!
//! Strings live on the VM's heap, so both directions go through the [`Vm`]:
//! converting into a Lox string interns it, converting out copies it.
//!
//! | Rust Type | Lox Type |
//! |-----------|----------|
//! | `()` | `nil` |
//! | `bool` | `true` / `false` |
//! | `f64` | number |
//! | `i64` | number with no fractional part |
//! | `String`, `&str` | string |
//! | `Option<T>` | `T` or `nil` |
//! | [`Pinned`] | any value, kept alive while the handle lives |

use lox_vm::value::type_name;
use lox_vm::{Pinned, Value, Vm};

use crate::error::{Error, Result};

/// Convert a Rust value into a Lox [`Value`].
pub trait IntoValue {
    fn into_value(self, vm: &mut Vm) -> Value;
}

/// Convert a Lox [`Value`] into a Rust value.
pub trait FromValue: Sized {
    fn from_value(value: Value, vm: &Vm) -> Result<Self>;
}

// ============================================================================
// IntoValue implementations
// ============================================================================

impl IntoValue for Value {
    fn into_value(self, _vm: &mut Vm) -> Value {
        self
    }
}

impl IntoValue for &Pinned {
    fn into_value(self, _vm: &mut Vm) -> Value {
        self.value()
    }
}

impl IntoValue for () {
    fn into_value(self, _vm: &mut Vm) -> Value {
        Value::Nil
    }
}

impl IntoValue for bool {
    fn into_value(self, _vm: &mut Vm) -> Value {
        Value::Bool(self)
    }
}

impl IntoValue for f64 {
    fn into_value(self, _vm: &mut Vm) -> Value {
        Value::Number(self)
    }
}

impl IntoValue for i64 {
    fn into_value(self, _vm: &mut Vm) -> Value {
        Value::Number(self as f64)
    }
}

impl IntoValue for &str {
    fn into_value(self, vm: &mut Vm) -> Value {
        Value::Obj(vm.intern(self))
    }
}

impl IntoValue for String {
    fn into_value(self, vm: &mut Vm) -> Value {
        self.as_str().into_value(vm)
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self, vm: &mut Vm) -> Value {
        match self {
            Some(v) => v.into_value(vm),
            None => Value::Nil,
        }
    }
}

// ============================================================================
// FromValue implementations
// ============================================================================

impl FromValue for Pinned {
    fn from_value(value: Value, vm: &Vm) -> Result<Self> {
        Ok(vm.pin(value))
    }
}

impl FromValue for () {
    fn from_value(value: Value, vm: &Vm) -> Result<Self> {
        match value {
            Value::Nil => Ok(()),
            other => Err(Error::type_error("nil", type_name(vm.heap(), other))),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value, vm: &Vm) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(Error::type_error("boolean", type_name(vm.heap(), other))),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: Value, vm: &Vm) -> Result<Self> {
        match value {
            Value::Number(n) => Ok(n),
            other => Err(Error::type_error("number", type_name(vm.heap(), other))),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: Value, vm: &Vm) -> Result<Self> {
        let n = f64::from_value(value, vm)?;
        // 2^63 itself is out of range, so the upper bound is exclusive.
        if n.fract() != 0.0 || !(-(2f64.powi(63))..2f64.powi(63)).contains(&n) {
            return Err(Error::Conversion(format!("{} is not representable as i64", n)));
        }
        Ok(n as i64)
    }
}

impl FromValue for String {
    fn from_value(value: Value, vm: &Vm) -> Result<Self> {
        match value {
            Value::Obj(r) if vm.heap().is_string(value) => Ok(vm.heap().str(r).to_string()),
            other => Err(Error::type_error("string", type_name(vm.heap(), other))),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value, vm: &Vm) -> Result<Self> {
        match value {
            Value::Nil => Ok(None),
            other => T::from_value(other, vm).map(Some),
        }
    }
}
