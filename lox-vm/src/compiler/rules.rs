// lox-vm - Bytecode compiler and virtual machine for the Lox scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Pratt parser table: prefix handler, infix handler and binding precedence
//! for each token kind.

use lox_syntax::TokenKind;

use super::Compiler;

/// Binding power, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(super) enum Precedence {
    None,
    Assignment,
    Or,
    And,
    Equality,
    Comparison,
    Term,
    Factor,
    Unary,
    Call,
    Primary,
}

impl Precedence {
    /// One level tighter. Binary operators parse their right operand here
    /// so they associate to the left.
    pub(super) fn next(self) -> Self {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call | Precedence::Primary => Precedence::Primary,
        }
    }
}

/// A parse handler. The flag says whether an `=` may follow.
pub(super) type ParseFn<'src, 'h> = fn(&mut Compiler<'src, 'h>, bool);

pub(super) struct ParseRule<'src, 'h> {
    pub prefix: Option<ParseFn<'src, 'h>>,
    pub infix: Option<ParseFn<'src, 'h>>,
    pub precedence: Precedence,
}

pub(super) fn rule<'src, 'h>(kind: TokenKind) -> ParseRule<'src, 'h> {
    use Precedence as P;
    use TokenKind as T;

    type Handlers<'s, 'c> = (Option<ParseFn<'s, 'c>>, Option<ParseFn<'s, 'c>>, Precedence);

    let (prefix, infix, precedence): Handlers<'src, 'h> = match kind {
        T::LeftParen => (Some(Compiler::grouping), Some(Compiler::call), P::Call),
        T::Dot => (None, Some(Compiler::dot), P::Call),
        T::Minus => (Some(Compiler::unary), Some(Compiler::binary), P::Term),
        T::Plus => (None, Some(Compiler::binary), P::Term),
        T::Slash | T::Star => (None, Some(Compiler::binary), P::Factor),
        T::Bang => (Some(Compiler::unary), None, P::None),
        T::BangEqual | T::EqualEqual => (None, Some(Compiler::binary), P::Equality),
        T::Greater | T::GreaterEqual | T::Less | T::LessEqual => {
            (None, Some(Compiler::binary), P::Comparison)
        }
        T::Identifier => (Some(Compiler::variable), None, P::None),
        T::String => (Some(Compiler::string), None, P::None),
        T::Number => (Some(Compiler::number), None, P::None),
        T::And => (None, Some(Compiler::and), P::And),
        T::Or => (None, Some(Compiler::or), P::Or),
        T::False | T::Nil | T::True => (Some(Compiler::literal), None, P::None),
        T::Super => (Some(Compiler::super_), None, P::None),
        T::This => (Some(Compiler::this), None, P::None),
        _ => (None, None, P::None),
    };
    ParseRule {
        prefix,
        infix,
        precedence,
    }
}
