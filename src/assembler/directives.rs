// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Conditional-inclusion state and `#define` body parsing.
//!
//! The directive dispatch itself lives in [`crate::assembler::engine`];
//! this module holds the pure state machine and the parsing of definition
//! and macro bodies out of a directive's token run.

use crate::core::location::Location;
use crate::core::macros::{Definition, MacroDef};
use crate::core::tokenizer::{Token, TokenKind, Tokenizer};

/// Stack of conditional-inclusion states.
///
/// Effective inclusion is the logical AND of all entries: an outer false
/// suppresses every nested branch regardless of its own condition.
#[derive(Default)]
pub struct ConditionalStack {
    stack: Vec<bool>,
}

impl ConditionalStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn included(&self) -> bool {
        self.stack.iter().all(|included| *included)
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Open a branch with an evaluated condition.
    pub fn push(&mut self, condition: bool) {
        self.stack.push(condition);
    }

    /// Open a branch inside an excluded region. The condition was never
    /// evaluated; the entry exists only to keep nesting depth balanced.
    pub fn push_suppressed(&mut self) {
        self.stack.push(false);
    }

    /// `#else`: negate the innermost branch.
    pub fn invert(&mut self) -> Result<(), &'static str> {
        match self.stack.last_mut() {
            Some(top) => {
                *top = !*top;
                Ok(())
            }
            None => Err("No matching conditional for #else"),
        }
    }

    /// `#endif`: close the innermost branch.
    pub fn pop(&mut self) -> Result<(), &'static str> {
        match self.stack.pop() {
            Some(_) => Ok(()),
            None => Err("No matching conditional for #endif"),
        }
    }
}

/// Parsed form of a `#define` body.
pub enum Define {
    Definition(Definition),
    Macro(MacroDef),
}

/// Parse a `#define` directive's argument tokens (the run between the
/// directive and the statement-ending newline).
///
/// `NAME body...` makes a definition (empty body is the non-productive
/// form); `NAME(a, b) body...` makes a macro.
pub fn parse_define(tokens: &[Token], location: &Location) -> Result<Define, (String, Location)> {
    let mut ix = 0;
    let name = match tokens.first() {
        Some(token) if token.kind == TokenKind::Identifier => {
            ix += 1;
            token.text.clone()
        }
        Some(token) if token.kind == TokenKind::MaybeMacro => {
            ix += 1;
            return parse_macro_define(token, tokens, ix);
        }
        Some(token) => {
            return Err((
                format!("Expected a name after #define, found {:?}", token.kind),
                token.location.clone(),
            ));
        }
        None => {
            return Err(("Expected a name after #define".to_string(), location.clone()));
        }
    };
    Ok(Define::Definition(Definition {
        name,
        body: unquote_body(tokens[ix..].to_vec()),
    }))
}

/// A body given as a single quoted string is re-lexed, which is how
/// multi-statement bodies are written (`#define Foo "BYTE 1; BYTE 2"`).
fn unquote_body(body: Vec<Token>) -> Vec<Token> {
    if body.len() == 1 && body[0].kind == TokenKind::String {
        let token = &body[0];
        let mut lexed =
            Tokenizer::new(&token.location.file).tokenize_line(&token.text, token.location.line);
        lexed.pop(); // trailing Newline would end the invoking statement
        return lexed;
    }
    body
}

fn parse_macro_define(
    name_token: &Token,
    tokens: &[Token],
    mut ix: usize,
) -> Result<Define, (String, Location)> {
    let open = &tokens[ix];
    if open.kind != TokenKind::LeftParen {
        return Err((
            "Expected a parameter list after macro name".to_string(),
            open.location.clone(),
        ));
    }
    ix += 1;

    let mut params = Vec::new();
    loop {
        match tokens.get(ix) {
            Some(token) if token.kind == TokenKind::RightParen => {
                ix += 1;
                break;
            }
            Some(token) if token.kind == TokenKind::Comma => {
                ix += 1;
            }
            Some(token)
                if token.kind == TokenKind::Identifier || token.kind == TokenKind::MaybeMacro =>
            {
                params.push(token.text.clone());
                ix += 1;
            }
            Some(token) => {
                return Err((
                    format!("Expected a parameter name, found {:?}", token.kind),
                    token.location.clone(),
                ));
            }
            None => {
                return Err((
                    "Unmatched open parenthesis".to_string(),
                    open.location.clone(),
                ));
            }
        }
    }

    Ok(Define::Macro(MacroDef {
        name: name_token.text.clone(),
        params,
        body: unquote_body(tokens[ix..].to_vec()),
    }))
}
