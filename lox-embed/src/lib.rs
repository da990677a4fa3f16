// lox-embed - Embedding API for Lox
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! # lox-embed
//!
//! A high-level embedding API for the Lox scripting language.
//!
//! An [`Engine`] owns one virtual machine. Globals persist between calls to
//! [`Engine::eval`], so a host can define values, run scripts against them
//! and read the results back.
//!
//! ## Quick Start
//!
//! ```rust
//! use lox_embed::Engine;
//!
//! let mut engine = Engine::new();
//! let output = engine.capture_output();
//! engine.eval("var answer = 6 * 7; print answer;").unwrap();
//! assert_eq!(output.contents(), "42\n");
//! assert_eq!(engine.get_global::<i64>("answer").unwrap(), 42);
//! ```
//!
//! ## Registering Native Functions
//!
//! ```rust
//! use lox_embed::{Engine, Value};
//!
//! let mut engine = Engine::new();
//! engine.register_native("double", |args: &[Value]| match args {
//!     [Value::Number(n)] => Ok(Value::Number(n * 2.0)),
//!     _ => Err("double expects one number".to_string()),
//! });
//! engine.eval("var x = double(21);").unwrap();
//! assert_eq!(engine.get_global::<f64>("x").unwrap(), 42.0);
//! ```

mod convert;
mod engine;
mod error;

pub use convert::{FromValue, IntoValue};
pub use engine::{CapturedOutput, Engine};
pub use error::{Error, Result};

// Re-export core types for convenience
pub use lox_vm::{InterpretError, Pinned, RuntimeError, Value, VmConfig};
