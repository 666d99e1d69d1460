// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Token cursor backed by a stack of buffers.
//!
//! Macro and include expansion works by pushing a new buffer onto the stack;
//! the innermost buffer is consumed before the enclosing stream resumes.
//! This is the explicit-stack rendition of an enumerator-of-enumerators.

use crate::core::tokenizer::{Token, TokenKind};

struct Buffer {
    tokens: Vec<Token>,
    pos: usize,
}

#[derive(Default)]
pub struct TokenCursor {
    stack: Vec<Buffer>,
}

impl TokenCursor {
    pub fn new() -> Self {
        Self { stack: Vec::new() }
    }

    pub fn from_tokens(tokens: Vec<Token>) -> Self {
        let mut cursor = Self::new();
        cursor.prepend(tokens);
        cursor
    }

    /// Push a buffer whose tokens are consumed before the current stream.
    pub fn prepend(&mut self, tokens: Vec<Token>) {
        if !tokens.is_empty() {
            self.stack.push(Buffer { tokens, pos: 0 });
        }
    }

    /// Put a single token back; it becomes the next token returned.
    pub fn push_front(&mut self, token: Token) {
        self.prepend(vec![token]);
    }

    pub fn next(&mut self) -> Option<Token> {
        loop {
            let buffer = self.stack.last_mut()?;
            if buffer.pos < buffer.tokens.len() {
                let token = buffer.tokens[buffer.pos].clone();
                buffer.pos += 1;
                if buffer.pos == buffer.tokens.len() {
                    self.stack.pop();
                }
                return Some(token);
            }
            self.stack.pop();
        }
    }

    pub fn peek(&mut self) -> Option<&Token> {
        loop {
            let exhausted = match self.stack.last() {
                Some(buffer) => buffer.pos >= buffer.tokens.len(),
                None => return None,
            };
            if exhausted {
                self.stack.pop();
            } else {
                break;
            }
        }
        let buffer = self.stack.last()?;
        buffer.tokens.get(buffer.pos)
    }

    pub fn peek_kind(&mut self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    /// Discard tokens up to and including the next `Newline`.
    ///
    /// Used to resynchronize after a statement-level error.
    pub fn skip_to_newline(&mut self) {
        while let Some(token) = self.next() {
            if token.kind == TokenKind::Newline {
                break;
            }
        }
    }

    pub fn is_empty(&mut self) -> bool {
        self.peek().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::location::Location;
    use std::rc::Rc;

    fn tok(text: &str) -> Token {
        Token::new(
            TokenKind::Identifier,
            Location::new(Rc::from("t"), 1, 1),
            text,
        )
    }

    #[test]
    fn prepended_buffer_is_consumed_first() {
        let mut cursor = TokenCursor::from_tokens(vec![tok("outer1"), tok("outer2")]);
        assert_eq!(cursor.next().unwrap().text, "outer1");
        cursor.prepend(vec![tok("inner1"), tok("inner2")]);
        assert_eq!(cursor.next().unwrap().text, "inner1");
        assert_eq!(cursor.next().unwrap().text, "inner2");
        assert_eq!(cursor.next().unwrap().text, "outer2");
        assert!(cursor.next().is_none());
    }

    #[test]
    fn push_front_returns_token_next() {
        let mut cursor = TokenCursor::from_tokens(vec![tok("a")]);
        let first = cursor.next().unwrap();
        cursor.push_front(first);
        assert_eq!(cursor.next().unwrap().text, "a");
        assert!(cursor.is_empty());
    }

    #[test]
    fn skip_to_newline_consumes_terminator() {
        let mut cursor = TokenCursor::from_tokens(vec![
            tok("a"),
            Token::new(TokenKind::Newline, Location::new(Rc::from("t"), 1, 2), ""),
            tok("b"),
        ]);
        cursor.skip_to_newline();
        assert_eq!(cursor.next().unwrap().text, "b");
    }
}
