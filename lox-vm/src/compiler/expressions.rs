// lox-vm - Bytecode compiler and virtual machine for the Lox scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Expression parsing. Each handler emits code as it parses.

use lox_syntax::TokenKind;

use crate::opcode::OpCode;
use crate::value::Value;

use super::Compiler;
use super::rules::{Precedence, rule};

impl<'src, 'h> Compiler<'src, 'h> {
    pub(super) fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    /// Parse anything that binds at least as tightly as `precedence`.
    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let Some(prefix) = rule(self.previous.kind).prefix else {
            self.error("Expect expression.");
            return;
        };

        let can_assign = precedence <= Precedence::Assignment;
        prefix(self, can_assign);

        while precedence <= rule(self.current.kind).precedence {
            self.advance();
            if let Some(infix) = rule(self.previous.kind).infix {
                infix(self, can_assign);
            }
        }

        // A target that did not consume the `=` cannot be assigned to.
        if can_assign && self.matches(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    // =========================================================================
    // Prefix handlers
    // =========================================================================

    pub(super) fn grouping(&mut self, _can_assign: bool) {
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after expression.");
    }

    pub(super) fn number(&mut self, _can_assign: bool) {
        match self.previous.lexeme.parse::<f64>() {
            Ok(n) => self.emit_constant(Value::Number(n)),
            Err(_) => self.error("Invalid number literal."),
        }
    }

    pub(super) fn string(&mut self, _can_assign: bool) {
        let lexeme = self.previous.lexeme;
        // Strip the surrounding quotes.
        let contents = &lexeme[1..lexeme.len() - 1];
        let string = self.intern(contents);
        self.emit_constant(Value::Obj(string));
    }

    pub(super) fn literal(&mut self, _can_assign: bool) {
        match self.previous.kind {
            TokenKind::False => self.emit_op(OpCode::False),
            TokenKind::Nil => self.emit_op(OpCode::Nil),
            TokenKind::True => self.emit_op(OpCode::True),
            _ => unreachable!("literal rule on non-literal token"),
        }
    }

    pub(super) fn variable(&mut self, can_assign: bool) {
        self.named_variable(self.previous.lexeme, can_assign);
    }

    pub(super) fn this(&mut self, _can_assign: bool) {
        if self.classes.is_empty() {
            self.error("Can't use 'this' outside of a class.");
            return;
        }
        self.variable(false);
    }

    pub(super) fn super_(&mut self, _can_assign: bool) {
        match self.classes.last() {
            None => self.error("Can't use 'super' outside of a class."),
            Some(class) if !class.has_superclass => {
                self.error("Can't use 'super' in a class with no superclass.");
            }
            Some(_) => {}
        }

        self.consume(TokenKind::Dot, "Expect '.' after 'super'.");
        self.consume(TokenKind::Identifier, "Expect superclass method name.");
        let name = self.identifier_constant(self.previous.lexeme);

        self.named_variable("this", false);
        if self.matches(TokenKind::LeftParen) {
            let argc = self.argument_list();
            self.named_variable("super", false);
            self.emit_op_arg(OpCode::SuperInvoke, name);
            self.emit_byte(argc);
        } else {
            self.named_variable("super", false);
            self.emit_op_arg(OpCode::GetSuper, name);
        }
    }

    pub(super) fn unary(&mut self, _can_assign: bool) {
        let operator = self.previous.kind;
        self.parse_precedence(Precedence::Unary);
        match operator {
            TokenKind::Bang => self.emit_op(OpCode::Not),
            TokenKind::Minus => self.emit_op(OpCode::Negate),
            _ => unreachable!("unary rule on non-unary token"),
        }
    }

    // =========================================================================
    // Infix handlers
    // =========================================================================

    pub(super) fn binary(&mut self, _can_assign: bool) {
        let operator = self.previous.kind;
        self.parse_precedence(rule(operator).precedence.next());

        match operator {
            TokenKind::BangEqual => {
                self.emit_op(OpCode::Equal);
                self.emit_op(OpCode::Not);
            }
            TokenKind::EqualEqual => self.emit_op(OpCode::Equal),
            TokenKind::Greater => self.emit_op(OpCode::Greater),
            TokenKind::GreaterEqual => {
                self.emit_op(OpCode::Less);
                self.emit_op(OpCode::Not);
            }
            TokenKind::Less => self.emit_op(OpCode::Less),
            TokenKind::LessEqual => {
                self.emit_op(OpCode::Greater);
                self.emit_op(OpCode::Not);
            }
            TokenKind::Plus => self.emit_op(OpCode::Add),
            TokenKind::Minus => self.emit_op(OpCode::Subtract),
            TokenKind::Star => self.emit_op(OpCode::Multiply),
            TokenKind::Slash => self.emit_op(OpCode::Divide),
            _ => unreachable!("binary rule on non-binary token"),
        }
    }

    /// `a and b`: if `a` is falsey it is the result, otherwise `b` is.
    pub(super) fn and(&mut self, _can_assign: bool) {
        let end_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::And);
        self.patch_jump(end_jump);
    }

    pub(super) fn or(&mut self, _can_assign: bool) {
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        let end_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(else_jump);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    pub(super) fn call(&mut self, _can_assign: bool) {
        let argc = self.argument_list();
        self.emit_op_arg(OpCode::Call, argc);
    }

    pub(super) fn dot(&mut self, can_assign: bool) {
        self.consume(TokenKind::Identifier, "Expect property name after '.'.");
        let name = self.identifier_constant(self.previous.lexeme);

        if can_assign && self.matches(TokenKind::Equal) {
            self.expression();
            self.emit_op_arg(OpCode::SetProperty, name);
        } else if self.matches(TokenKind::LeftParen) {
            let argc = self.argument_list();
            self.emit_op_arg(OpCode::Invoke, name);
            self.emit_byte(argc);
        } else {
            self.emit_op_arg(OpCode::GetProperty, name);
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn argument_list(&mut self) -> u8 {
        let mut argc: usize = 0;
        if !self.check(TokenKind::RightParen) {
            loop {
                self.expression();
                if argc == u8::MAX as usize {
                    self.error("Can't have more than 255 arguments.");
                }
                argc += 1;
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after arguments.");
        argc.min(u8::MAX as usize) as u8
    }

    /// Emit a get or set for `name`, resolved as a local, an upvalue or a
    /// global in that order.
    pub(super) fn named_variable(&mut self, name: &'src str, can_assign: bool) {
        let innermost = self.functions.len() - 1;
        let (get, set, arg) = if let Some(slot) = self.resolve_local(innermost, name) {
            (OpCode::GetLocal, OpCode::SetLocal, slot)
        } else if let Some(index) = self.resolve_upvalue(innermost, name) {
            (OpCode::GetUpvalue, OpCode::SetUpvalue, index)
        } else {
            let constant = self.identifier_constant(name);
            (OpCode::GetGlobal, OpCode::SetGlobal, constant)
        };

        if can_assign && self.matches(TokenKind::Equal) {
            self.expression();
            self.emit_op_arg(set, arg);
        } else {
            self.emit_op_arg(get, arg);
        }
    }
}
