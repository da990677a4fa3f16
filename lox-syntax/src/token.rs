// lox-syntax - Lexer for the Lox scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Token definitions.

use std::fmt;

/// The kind of a lexical token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Single-character tokens
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Comma,
    Dot,
    Minus,
    Plus,
    Semicolon,
    Slash,
    Star,

    // One or two character tokens
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,

    // Literals
    Identifier,
    String,
    Number,

    // Keywords
    And,
    Class,
    Else,
    False,
    For,
    Fun,
    If,
    Nil,
    Or,
    Print,
    Return,
    Super,
    This,
    True,
    Var,
    While,

    // Special
    /// Lexical fault; the token's lexeme holds the message.
    Error,
    Eof,
}

impl TokenKind {
    /// Number of distinct token kinds, for tables indexed by kind.
    pub const COUNT: usize = TokenKind::Eof as usize + 1;

    /// Returns true for keywords that begin a declaration or statement.
    /// Error recovery stops in front of these.
    pub fn starts_statement(self) -> bool {
        matches!(
            self,
            TokenKind::Class
                | TokenKind::Fun
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return
        )
    }
}

/// A token produced by the lexer, borrowing its lexeme from the source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token<'src> {
    pub kind: TokenKind,
    /// Source text of the token. For [`TokenKind::Error`] this is the message.
    pub lexeme: &'src str,
    /// Source line number (1-indexed).
    pub line: u32,
}

impl<'src> Token<'src> {
    /// Create a new token.
    pub fn new(kind: TokenKind, lexeme: &'src str, line: u32) -> Self {
        Self { kind, lexeme, line }
    }

    /// A synthetic identifier token, used for implicit names like `this`.
    pub fn synthetic(lexeme: &'src str) -> Self {
        Self {
            kind: TokenKind::Identifier,
            lexeme,
            line: 0,
        }
    }
}

impl Default for Token<'_> {
    fn default() -> Self {
        Self {
            kind: TokenKind::Eof,
            lexeme: "",
            line: 1,
        }
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Eof => write!(f, "end"),
            _ => write!(f, "'{}'", self.lexeme),
        }
    }
}
