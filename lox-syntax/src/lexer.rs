// lox-syntax - Lexer for the Lox scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Lexer (tokeniser) for Lox source code.
//!
//! Converts a source string into tokens on demand. Lexemes borrow from the
//! source, so a token is only as long-lived as the text it was scanned from.

use crate::token::{Token, TokenKind};

/// The lexer converts source code into tokens, one per call.
pub struct Lexer<'src> {
    source: &'src str,
    /// Byte offset of the first character of the token being scanned.
    start: usize,
    /// Byte offset of the next unread character.
    current: usize,
    line: u32,
}

impl<'src> Lexer<'src> {
    /// Create a new lexer for the given source code.
    pub fn new(source: &'src str) -> Self {
        Lexer {
            source,
            start: 0,
            current: 0,
            line: 1,
        }
    }

    /// Get the next token from the source.
    ///
    /// Once the input is exhausted every further call returns an
    /// [`TokenKind::Eof`] token.
    pub fn next_token(&mut self) -> Token<'src> {
        self.skip_whitespace_and_comments();
        self.start = self.current;

        let c = match self.advance() {
            Some(c) => c,
            None => return self.make_token(TokenKind::Eof),
        };

        match c {
            b'(' => self.make_token(TokenKind::LeftParen),
            b')' => self.make_token(TokenKind::RightParen),
            b'{' => self.make_token(TokenKind::LeftBrace),
            b'}' => self.make_token(TokenKind::RightBrace),
            b';' => self.make_token(TokenKind::Semicolon),
            b',' => self.make_token(TokenKind::Comma),
            b'.' => self.make_token(TokenKind::Dot),
            b'-' => self.make_token(TokenKind::Minus),
            b'+' => self.make_token(TokenKind::Plus),
            b'/' => self.make_token(TokenKind::Slash),
            b'*' => self.make_token(TokenKind::Star),
            b'!' => self.two_char(b'=', TokenKind::BangEqual, TokenKind::Bang),
            b'=' => self.two_char(b'=', TokenKind::EqualEqual, TokenKind::Equal),
            b'<' => self.two_char(b'=', TokenKind::LessEqual, TokenKind::Less),
            b'>' => self.two_char(b'=', TokenKind::GreaterEqual, TokenKind::Greater),
            b'"' => self.read_string(),
            b'0'..=b'9' => self.read_number(),
            _ if is_identifier_start(c) => self.read_identifier(),
            _ => {
                // Step over the rest of a multi-byte character so later
                // lexemes stay on char boundaries.
                while !self.source.is_char_boundary(self.current) {
                    self.current += 1;
                }
                self.error_token("Unexpected character.")
            }
        }
    }

    /// Collect all tokens up to (not including) the end-of-input token.
    pub fn tokenize(&mut self) -> Vec<Token<'src>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            if token.kind == TokenKind::Eof {
                break;
            }
            tokens.push(token);
        }
        tokens
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    fn peek(&self) -> Option<u8> {
        self.source.as_bytes().get(self.current).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.source.as_bytes().get(self.current + 1).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.current += 1;
        Some(c)
    }

    fn two_char(&mut self, expected: u8, matched: TokenKind, single: TokenKind) -> Token<'src> {
        if self.peek() == Some(expected) {
            self.current += 1;
            self.make_token(matched)
        } else {
            self.make_token(single)
        }
    }

    fn make_token(&self, kind: TokenKind) -> Token<'src> {
        Token::new(kind, &self.source[self.start..self.current], self.line)
    }

    fn error_token(&self, message: &'static str) -> Token<'src> {
        Token::new(TokenKind::Error, message, self.line)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(b' ' | b'\r' | b'\t') => {
                    self.current += 1;
                }
                Some(b'\n') => {
                    self.line += 1;
                    self.current += 1;
                }
                Some(b'/') if self.peek_next() == Some(b'/') => {
                    // Skip to end of line
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.current += 1;
                    }
                }
                _ => break,
            }
        }
    }

    fn read_string(&mut self) -> Token<'src> {
        loop {
            match self.peek() {
                None => return self.error_token("Unterminated string."),
                Some(b'"') => break,
                Some(c) => {
                    if c == b'\n' {
                        self.line += 1;
                    }
                    self.current += 1;
                }
            }
        }

        // The closing quote.
        self.current += 1;
        self.make_token(TokenKind::String)
    }

    fn read_number(&mut self) -> Token<'src> {
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.current += 1;
        }

        // A fractional part needs at least one digit after the dot.
        if self.peek() == Some(b'.') && matches!(self.peek_next(), Some(b'0'..=b'9')) {
            self.current += 1;
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.current += 1;
            }
        }

        self.make_token(TokenKind::Number)
    }

    fn read_identifier(&mut self) -> Token<'src> {
        while let Some(c) = self.peek() {
            if !is_identifier_start(c) && !c.is_ascii_digit() {
                break;
            }
            self.current += 1;
        }
        let kind = keyword(&self.source[self.start..self.current]).unwrap_or(TokenKind::Identifier);
        self.make_token(kind)
    }
}

fn is_identifier_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn keyword(text: &str) -> Option<TokenKind> {
    Some(match text {
        "and" => TokenKind::And,
        "class" => TokenKind::Class,
        "else" => TokenKind::Else,
        "false" => TokenKind::False,
        "for" => TokenKind::For,
        "fun" => TokenKind::Fun,
        "if" => TokenKind::If,
        "nil" => TokenKind::Nil,
        "or" => TokenKind::Or,
        "print" => TokenKind::Print,
        "return" => TokenKind::Return,
        "super" => TokenKind::Super,
        "this" => TokenKind::This,
        "true" => TokenKind::True,
        "var" => TokenKind::Var,
        "while" => TokenKind::While,
        _ => return None,
    })
}
