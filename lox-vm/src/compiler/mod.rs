// lox-vm - Bytecode compiler and virtual machine for the Lox scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Single-pass bytecode compiler: parses Lox source and emits bytecode
//! directly, with no intermediate syntax tree.
//!
//! Expressions go through a Pratt parser driven by the table in [`rules`];
//! declarations and statements are plain recursive descent. One
//! [`FunctionState`] per function being compiled tracks locals, upvalues and
//! the chunk under construction.
//!
//! Errors do not stop the pass. The parser switches to
//! [`ParserMode::Recovering`], skips to the next statement boundary and keeps
//! going so independent errors are all reported.

mod emit;
mod expressions;
mod rules;
mod scope;
mod statements;
pub mod types;

use std::rc::Rc;

use lox_syntax::{Lexer, Token, TokenKind};
use tracing::{debug, trace};

use crate::debug::disassemble_chunk;
use crate::heap::{Heap, Roots};
use crate::object::{Function, ObjRef, Object};

pub use types::{CompileError, Diagnostic, ErrorLocation, Result};
use types::{ClassState, FunctionKind, FunctionState, ParserMode, UpvalueDesc};

/// Compile `source` into a top-level script function.
///
/// `roots` marks whatever the caller is holding on to, since compilation
/// allocates and may trigger a collection.
pub fn compile(source: &str, heap: &mut Heap, roots: &dyn Roots) -> Result<ObjRef> {
    let mut compiler = Compiler::new(source, heap, roots);
    compiler.advance();
    while !compiler.matches(TokenKind::Eof) {
        compiler.declaration();
    }
    let (function, _) = compiler.end_function();

    if compiler.diagnostics.is_empty() {
        Ok(function)
    } else {
        debug!(errors = compiler.diagnostics.len(), "compilation failed");
        Err(CompileError {
            diagnostics: compiler.diagnostics,
        })
    }
}

pub(crate) struct Compiler<'src, 'h> {
    lexer: Lexer<'src>,
    current: Token<'src>,
    previous: Token<'src>,
    mode: ParserMode,
    diagnostics: Vec<Diagnostic>,
    /// Enclosing functions, innermost last.
    functions: Vec<FunctionState<'src>>,
    /// Enclosing class declarations, innermost last.
    classes: Vec<ClassState>,
    heap: &'h mut Heap,
    roots: &'h dyn Roots,
}

/// Roots while compiling: everything the caller holds, plus the names and
/// constants of every function still under construction.
struct CompilerRoots<'a, 'src> {
    functions: &'a [FunctionState<'src>],
    outer: &'a dyn Roots,
}

impl Roots for CompilerRoots<'_, '_> {
    fn mark_roots(&self, heap: &mut Heap) {
        for state in self.functions {
            if let Some(name) = state.name {
                heap.mark_object(name);
            }
            for &constant in &state.chunk.constants {
                heap.mark_value(constant);
            }
        }
        self.outer.mark_roots(heap);
    }
}

impl<'src, 'h> Compiler<'src, 'h> {
    fn new(source: &'src str, heap: &'h mut Heap, roots: &'h dyn Roots) -> Self {
        Self {
            lexer: Lexer::new(source),
            current: Token::default(),
            previous: Token::default(),
            mode: ParserMode::Normal,
            diagnostics: Vec::new(),
            functions: vec![FunctionState::new(FunctionKind::Script, None)],
            classes: Vec::new(),
            heap,
            roots,
        }
    }

    // =========================================================================
    // Function state
    // =========================================================================

    fn state(&self) -> &FunctionState<'src> {
        self.functions.last().expect("no function being compiled")
    }

    fn state_mut(&mut self) -> &mut FunctionState<'src> {
        self.functions.last_mut().expect("no function being compiled")
    }

    /// Intern a string with the compiler's roots in place.
    fn intern(&mut self, text: &str) -> ObjRef {
        let roots = CompilerRoots {
            functions: &self.functions,
            outer: self.roots,
        };
        self.heap.intern(text, &roots)
    }

    /// Finish the innermost function: emit its implicit return and move it
    /// into the heap. Returns the function and the upvalues its closure
    /// must capture.
    fn end_function(&mut self) -> (ObjRef, Vec<UpvalueDesc>) {
        self.emit_return();
        let state = self.functions.pop().expect("no function being compiled");

        if self.diagnostics.is_empty() && tracing::enabled!(tracing::Level::TRACE) {
            let name = state.name.map_or("<script>", |n| self.heap.str(n));
            trace!("\n{}", disassemble_chunk(&state.chunk, self.heap, name));
        }

        let function = Function {
            arity: state.arity.min(u8::MAX as usize) as u8,
            upvalue_count: state.upvalues.len(),
            chunk: Rc::new(state.chunk),
            name: state.name,
        };
        let roots = CompilerRoots {
            functions: &self.functions,
            outer: self.roots,
        };
        let function = self.heap.alloc(Object::Function(function), &roots);
        (function, state.upvalues)
    }

    // =========================================================================
    // Token stream
    // =========================================================================

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.lexer.next_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            let message = self.current.lexeme;
            self.error_at_current(message);
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.check(kind) {
            self.advance();
        } else {
            self.error_at_current(message);
        }
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    fn error(&mut self, message: &str) {
        self.error_at(self.previous, message);
    }

    fn error_at_current(&mut self, message: &str) {
        self.error_at(self.current, message);
    }

    fn error_at(&mut self, token: Token<'src>, message: &str) {
        if self.mode == ParserMode::Recovering {
            return;
        }
        self.mode = ParserMode::Recovering;

        let location = match token.kind {
            TokenKind::Eof => ErrorLocation::End,
            TokenKind::Error => ErrorLocation::None,
            _ => ErrorLocation::Lexeme(token.lexeme.to_string()),
        };
        let diagnostic = Diagnostic {
            line: token.line,
            location,
            message: message.to_string(),
        };
        debug!(%diagnostic, "compile error");
        self.diagnostics.push(diagnostic);
    }

    /// Skip tokens until a statement boundary, then resume reporting.
    fn synchronize(&mut self) {
        self.mode = ParserMode::Normal;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon || self.current.kind.starts_statement() {
                return;
            }
            self.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::NoRoots;
    use crate::opcode::OpCode;
    use crate::value::Value;

    fn compile_ok(source: &str) -> (Heap, ObjRef) {
        let mut heap = Heap::default();
        let function = compile(source, &mut heap, &NoRoots).expect("compile error");
        (heap, function)
    }

    fn messages(source: &str) -> Vec<String> {
        let mut heap = Heap::default();
        match compile(source, &mut heap, &NoRoots) {
            Ok(_) => Vec::new(),
            Err(e) => e.diagnostics.iter().map(ToString::to_string).collect(),
        }
    }

    fn ops(heap: &Heap, function: ObjRef) -> Vec<OpCode> {
        let chunk = &heap.function(function).chunk;
        let mut out = Vec::new();
        let mut offset = 0;
        while offset < chunk.code.len() {
            let op = OpCode::try_from(chunk.code[offset]).unwrap();
            out.push(op);
            offset += 1 + op.operand_len();
        }
        out
    }

    #[test]
    fn arithmetic_precedence() {
        let (heap, function) = compile_ok("print 1 + 2 * 3;");
        assert_eq!(
            ops(&heap, function),
            vec![
                OpCode::Constant,
                OpCode::Constant,
                OpCode::Constant,
                OpCode::Multiply,
                OpCode::Add,
                OpCode::Print,
                OpCode::Nil,
                OpCode::Return,
            ]
        );
        let constants = &heap.function(function).chunk.constants;
        assert_eq!(
            constants,
            &vec![Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)]
        );
    }

    #[test]
    fn comparison_desugars_with_not() {
        let (heap, function) = compile_ok("1 >= 2;");
        assert_eq!(
            ops(&heap, function),
            vec![
                OpCode::Constant,
                OpCode::Constant,
                OpCode::Less,
                OpCode::Not,
                OpCode::Pop,
                OpCode::Nil,
                OpCode::Return,
            ]
        );
    }

    #[test]
    fn locals_use_slots_not_names() {
        let (heap, function) = compile_ok("{ var a = 1; print a; }");
        assert_eq!(
            ops(&heap, function),
            vec![
                OpCode::Constant,
                OpCode::GetLocal,
                OpCode::Print,
                OpCode::Pop,
                OpCode::Nil,
                OpCode::Return,
            ]
        );
        // Slot 0 is reserved for the callee.
        assert_eq!(heap.function(function).chunk.code[3], 1);
    }

    #[test]
    fn repeated_string_literals_share_one_object() {
        let (heap, function) = compile_ok("var a = \"x\"; var b = \"x\";");
        let strings: Vec<_> = heap
            .function(function)
            .chunk
            .constants
            .iter()
            .filter(|v| heap.is_string(**v) && heap.str(v.as_obj().unwrap()) == "x")
            .collect();
        assert_eq!(strings.len(), 1);
    }

    #[test]
    fn closures_record_upvalues() {
        let (heap, function) = compile_ok(
            "fun outer() { var x = 1; fun inner() { return x; } return inner; }",
        );
        let script = heap.function(function);
        let outer = script
            .chunk
            .constants
            .iter()
            .filter_map(|v| v.as_obj())
            .find(|&r| matches!(heap.get(r), Object::Function(_)))
            .unwrap();
        let outer = heap.function(outer);
        let inner = outer
            .chunk
            .constants
            .iter()
            .filter_map(|v| v.as_obj())
            .find(|&r| matches!(heap.get(r), Object::Function(_)))
            .unwrap();
        assert_eq!(heap.function(inner).upvalue_count, 1);
        assert!(outer.chunk.code.contains(&(OpCode::Closure as u8)));
    }

    #[test]
    fn reports_missing_expression() {
        assert_eq!(messages("print;"), vec!["[line 1] Error at ';': Expect expression."]);
        assert_eq!(messages("print 1"), vec!["[line 1] Error at end: Expect ';' after value."]);
    }

    #[test]
    fn reports_invalid_assignment_target() {
        assert_eq!(
            messages("var a; var b; a + b = 1;"),
            vec!["[line 1] Error at '=': Invalid assignment target."]
        );
    }

    #[test]
    fn recovers_and_reports_independent_errors() {
        let errors = messages("print ;\nvar x = 1;\nprint );\nprint 2;");
        assert_eq!(
            errors,
            vec![
                "[line 1] Error at ';': Expect expression.",
                "[line 3] Error at ')': Expect expression.",
            ]
        );
    }

    #[test]
    fn lexical_errors_have_no_location() {
        assert_eq!(messages("print @;")[0], "[line 1] Error: Unexpected character.");
    }

    #[test]
    fn scope_errors() {
        assert_eq!(
            messages("{ var a = a; }"),
            vec!["[line 1] Error at 'a': Can't read local variable in its own initializer."]
        );
        assert_eq!(
            messages("{ var a; var a; }"),
            vec!["[line 1] Error at 'a': Already a variable with this name in this scope."]
        );
        assert_eq!(
            messages("return 1;"),
            vec!["[line 1] Error at 'return': Can't return from top-level code."]
        );
    }

    #[test]
    fn class_errors() {
        assert_eq!(
            messages("print this;"),
            vec!["[line 1] Error at 'this': Can't use 'this' outside of a class."]
        );
        assert_eq!(
            messages("class A < A {}"),
            vec!["[line 1] Error at 'A': A class can't inherit from itself."]
        );
        assert_eq!(
            messages("class A { f() { super.f(); } }"),
            vec!["[line 1] Error at 'super': Can't use 'super' in a class with no superclass."]
        );
        assert_eq!(
            messages("class A { init() { return 1; } }"),
            vec!["[line 1] Error at 'return': Can't return a value from an initializer."]
        );
    }

    #[test]
    fn too_many_locals() {
        let mut source = String::from("fun f() {");
        for i in 0..256 {
            source.push_str(&format!("var v{i};"));
        }
        source.push('}');
        assert_eq!(
            messages(&source),
            vec!["[line 1] Error at 'v255': Too many local variables in function."]
        );
    }

    #[test]
    fn too_many_parameters() {
        let params: Vec<String> = (0..256).map(|i| format!("p{i}")).collect();
        let source = format!("fun f({}) {{}}", params.join(", "));
        assert_eq!(
            messages(&source),
            vec!["[line 1] Error at 'p255': Can't have more than 255 parameters."]
        );
    }

    #[test]
    fn many_literals_fall_back_to_long_constants() {
        let mut source = String::new();
        for i in 0..300 {
            source.push_str(&format!("print {i};"));
        }
        let (heap, function) = compile_ok(&source);
        assert!(ops(&heap, function).contains(&OpCode::ConstantLong));
    }

    #[test]
    fn too_many_global_names() {
        let mut source = String::new();
        for i in 0..300 {
            source.push_str(&format!("var g{i};"));
        }
        let errors = messages(&source);
        assert_eq!(errors[0], "[line 1] Error at 'g256': Too many constants in one chunk.");
        // Every statement boundary resumes reporting, so each extra name errors.
        assert_eq!(errors.len(), 44);
    }

    #[test]
    fn compiles_under_gc_stress() {
        let mut heap = Heap::new(&crate::config::VmConfig::stress());
        let source = "fun a() { var s = \"one\"; fun b() { return s + \"two\"; } return b; }
                      class C < D { m() { super.m(); } }";
        let function = compile(source, &mut heap, &NoRoots).expect("compile error");
        assert!(heap.contains(function));
    }
}
