// lox-vm - Bytecode compiler and virtual machine for the Lox scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Runtime errors for the VM.

use std::fmt;

use thiserror::Error;

use crate::compiler::CompileError;

/// What went wrong at runtime. The display text is the message shown to
/// the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeErrorKind {
    #[error("Operand must be a number.")]
    OperandNotNumber,
    #[error("Operands must be numbers.")]
    OperandsNotNumbers,
    #[error("Operands must be two numbers or two strings.")]
    InvalidAddOperands,
    #[error("Undefined variable '{0}'.")]
    UndefinedVariable(String),
    #[error("Undefined property '{0}'.")]
    UndefinedProperty(String),
    #[error("Only instances have properties.")]
    PropertyOnNonInstance,
    #[error("Only instances have fields.")]
    FieldOnNonInstance,
    #[error("Only instances have methods.")]
    MethodOnNonInstance,
    #[error("Can only call functions and classes.")]
    NotCallable,
    #[error("Expected {expected} arguments but got {got}.")]
    Arity { expected: usize, got: usize },
    #[error("Stack overflow.")]
    StackOverflow,
    #[error("Superclass must be a class.")]
    SuperclassNotClass,
    /// A native function failed with this message.
    #[error("{0}")]
    Native(String),
    #[error("Failed to write output: {0}")]
    Output(String),
    /// Malformed bytecode or a broken VM invariant.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RuntimeErrorKind {
    pub(crate) fn internal(message: impl Into<String>) -> Self {
        RuntimeErrorKind::Internal(message.into())
    }
}

/// One line of a runtime traceback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrame {
    pub line: u32,
    /// `None` for the top-level script.
    pub function: Option<String>,
}

impl fmt::Display for TraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.function {
            Some(name) => write!(f, "[line {}] in {}()", self.line, name),
            None => write!(f, "[line {}] in script", self.line),
        }
    }
}

/// Runtime error with the call stack at the point of failure, innermost
/// frame first.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}")]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub trace: Vec<TraceFrame>,
}

impl RuntimeError {
    /// Message followed by the traceback, one frame per line.
    pub fn report(&self) -> String {
        let mut out = self.kind.to_string();
        for frame in &self.trace {
            out.push('\n');
            out.push_str(&frame.to_string());
        }
        out
    }
}

impl From<RuntimeErrorKind> for RuntimeError {
    fn from(kind: RuntimeErrorKind) -> Self {
        Self {
            kind,
            trace: Vec::new(),
        }
    }
}

/// Outcome of a failed [`Vm::interpret`](crate::Vm::interpret).
#[derive(Debug, Error)]
pub enum InterpretError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl InterpretError {
    /// Conventional process exit status: 65 for compile errors, 70 for
    /// runtime errors.
    pub fn exit_code(&self) -> i32 {
        match self {
            InterpretError::Compile(_) => 65,
            InterpretError::Runtime(_) => 70,
        }
    }

    /// Text to show the user.
    pub fn report(&self) -> String {
        match self {
            InterpretError::Compile(e) => e.to_string(),
            InterpretError::Runtime(e) => e.report(),
        }
    }
}

/// Result type for opcode handlers. The traceback is attached once the
/// error reaches the top of the dispatch loop.
pub type Result<T> = std::result::Result<T, RuntimeErrorKind>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_lists_frames_innermost_first() {
        let error = RuntimeError {
            kind: RuntimeErrorKind::UndefinedVariable("x".into()),
            trace: vec![
                TraceFrame {
                    line: 3,
                    function: Some("inner".into()),
                },
                TraceFrame {
                    line: 7,
                    function: None,
                },
            ],
        };
        assert_eq!(error.to_string(), "Undefined variable 'x'.");
        assert_eq!(
            error.report(),
            "Undefined variable 'x'.\n[line 3] in inner()\n[line 7] in script"
        );
        assert_eq!(InterpretError::from(error).exit_code(), 70);
    }

    #[test]
    fn arity_message() {
        let kind = RuntimeErrorKind::Arity {
            expected: 2,
            got: 1,
        };
        assert_eq!(kind.to_string(), "Expected 2 arguments but got 1.");
    }
}
