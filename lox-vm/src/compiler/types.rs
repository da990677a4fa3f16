// lox-vm - Bytecode compiler and virtual machine for the Lox scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Shared types for the bytecode compiler.

use std::fmt;

use thiserror::Error;

use crate::chunk::Chunk;
use crate::object::ObjRef;

/// Where a diagnostic points in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorLocation {
    /// At the given token's lexeme.
    Lexeme(String),
    /// At end of input.
    End,
    /// Lexical errors carry no location; the message says it all.
    None,
}

/// One compile-time error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub line: u32,
    pub location: ErrorLocation,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[line {}] Error", self.line)?;
        match &self.location {
            ErrorLocation::Lexeme(lexeme) => write!(f, " at '{}'", lexeme)?,
            ErrorLocation::End => write!(f, " at end")?,
            ErrorLocation::None => {}
        }
        write!(f, ": {}", self.message)
    }
}

/// Compilation failed. Holds every diagnostic reported during the pass.
#[derive(Debug, Clone, Error)]
#[error("{}", render(.diagnostics))]
pub struct CompileError {
    pub diagnostics: Vec<Diagnostic>,
}

fn render(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Result type for compilation.
pub type Result<T> = std::result::Result<T, CompileError>;

/// Parser state. After an error the parser recovers by skipping to a
/// statement boundary; further errors are suppressed until it gets there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserMode {
    Normal,
    Recovering,
}

/// What kind of function body is being compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Script,
    Function,
    Method,
    Initializer,
}

/// Local variable during compilation.
#[derive(Debug, Clone)]
pub struct Local<'src> {
    pub name: &'src str,
    /// `None` while the variable's own initializer is being compiled.
    pub depth: Option<usize>,
    pub is_captured: bool,
}

/// Information about an upvalue (captured variable).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpvalueDesc {
    /// Index in parent's locals (is_local=true) or parent's upvalues (is_local=false)
    pub index: u8,
    /// True if capturing from parent's locals, false if from parent's upvalues
    pub is_local: bool,
}

/// Per-function compilation state. One per function being compiled; the
/// last entry of the compiler's stack is the innermost.
pub struct FunctionState<'src> {
    pub kind: FunctionKind,
    pub name: Option<ObjRef>,
    pub arity: usize,
    pub chunk: Chunk,
    pub locals: Vec<Local<'src>>,
    pub upvalues: Vec<UpvalueDesc>,
    pub scope_depth: usize,
}

impl<'src> FunctionState<'src> {
    pub fn new(kind: FunctionKind, name: Option<ObjRef>) -> Self {
        // Slot 0 holds the callee, or the receiver inside methods.
        let slot_zero = match kind {
            FunctionKind::Method | FunctionKind::Initializer => "this",
            FunctionKind::Script | FunctionKind::Function => "",
        };
        Self {
            kind,
            name,
            arity: 0,
            chunk: Chunk::new(),
            locals: vec![Local {
                name: slot_zero,
                depth: Some(0),
                is_captured: false,
            }],
            upvalues: Vec::new(),
            scope_depth: 0,
        }
    }
}

/// Per-class compilation state, for `this` and `super` checks.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassState {
    pub has_superclass: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_rendering() {
        let at = Diagnostic {
            line: 3,
            location: ErrorLocation::Lexeme("=".into()),
            message: "Invalid assignment target.".into(),
        };
        let end = Diagnostic {
            line: 1,
            location: ErrorLocation::End,
            message: "Expect expression.".into(),
        };
        let lexical = Diagnostic {
            line: 2,
            location: ErrorLocation::None,
            message: "Unexpected character.".into(),
        };
        assert_eq!(at.to_string(), "[line 3] Error at '=': Invalid assignment target.");
        assert_eq!(end.to_string(), "[line 1] Error at end: Expect expression.");
        assert_eq!(lexical.to_string(), "[line 2] Error: Unexpected character.");

        let error = CompileError {
            diagnostics: vec![at, end],
        };
        assert_eq!(error.to_string().lines().count(), 2);
    }
}
