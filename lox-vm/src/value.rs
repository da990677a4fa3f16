// lox-vm - Bytecode compiler and virtual machine for the Lox scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! The tagged value representation shared by the compiler and the VM.

use std::fmt;

use crate::heap::Heap;
use crate::object::{ObjRef, Object};

/// A Lox value. Small enough to copy; heap data is reached through [`ObjRef`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Number(f64),
    Obj(ObjRef),
}

impl Value {
    /// `nil` and `false` are falsey; everything else is truthy.
    #[inline]
    pub fn is_falsey(&self) -> bool {
        matches!(self, Value::Nil | Value::Bool(false))
    }

    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[inline]
    pub fn as_obj(&self) -> Option<ObjRef> {
        match self {
            Value::Obj(r) => Some(*r),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<ObjRef> for Value {
    fn from(r: ObjRef) -> Self {
        Value::Obj(r)
    }
}

/// Get the type name for a value (for error messages and host conversions).
pub fn type_name(heap: &Heap, value: Value) -> &'static str {
    match value {
        Value::Nil => "nil",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::Obj(r) => match heap.get(r) {
            Object::String(_) => "string",
            Object::Function(_) => "function",
            Object::Native(_) => "native function",
            Object::Closure(_) => "function",
            Object::Upvalue(_) => "upvalue",
            Object::Class(_) => "class",
            Object::Instance(_) => "instance",
            Object::BoundMethod(_) => "method",
        },
    }
}

/// Significant digits printed for a number, as with C's `%g`.
const NUMBER_PRECISION: i32 = 6;

/// Formats a number the way C's `printf("%g")` does: six significant
/// digits, trailing zeros dropped, exponent form outside `1e-4..1e6`.
pub(crate) fn format_number(f: &mut fmt::Formatter<'_>, n: f64) -> fmt::Result {
    if n.is_nan() {
        return write!(f, "nan");
    }
    if n.is_infinite() {
        return write!(f, "{}", if n > 0.0 { "inf" } else { "-inf" });
    }

    // Rounding to the precision first settles the exponent (9999995 -> 1e+07).
    let sci = format!("{:.*e}", (NUMBER_PRECISION - 1) as usize, n);
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((&sci, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if (-4..NUMBER_PRECISION).contains(&exponent) {
        let decimals = (NUMBER_PRECISION - 1 - exponent) as usize;
        let fixed = format!("{:.*}", decimals, n);
        write!(f, "{}", trim_fraction(&fixed))
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        write!(f, "{}e{}{:02}", trim_fraction(mantissa), sign, exponent.abs())
    }
}

/// Drop trailing zeros after a decimal point, and the point itself.
fn trim_fraction(digits: &str) -> &str {
    if digits.contains('.') {
        digits.trim_end_matches('0').trim_end_matches('.')
    } else {
        digits
    }
}

/// Display adapter pairing a value with the heap that owns its objects.
pub struct ValueDisplay<'a> {
    pub(crate) heap: &'a Heap,
    pub(crate) value: Value,
}

impl fmt::Display for ValueDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => format_number(f, n),
            Value::Obj(r) => self.heap.fmt_object(f, r),
        }
    }
}
