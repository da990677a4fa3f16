// lox-embed - Embedding errors
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Errors raised by the embedding layer.

use std::io;

use lox_vm::InterpretError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The script failed to compile or run.
    #[error(transparent)]
    Interpret(#[from] InterpretError),

    #[error("Undefined global '{0}'")]
    UndefinedGlobal(String),

    #[error("Type error: expected {expected}, got {got}")]
    TypeError {
        expected: &'static str,
        got: &'static str,
    },

    /// The value has the right type but does not fit the Rust type.
    #[error("{0}")]
    Conversion(String),

    #[error("Cannot read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub fn type_error(expected: &'static str, got: &'static str) -> Self {
        Error::TypeError { expected, got }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
