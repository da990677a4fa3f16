// lox-syntax - Lexer for the Lox scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! # lox-syntax
//!
//! Pull-based lexer for Lox source text. The compiler asks for one token at a
//! time; nothing is buffered beyond the current scan position.

pub mod lexer;
pub mod token;

pub use lexer::Lexer;
pub use token::{Token, TokenKind};
