// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Macro and definition registry with token-level expansion.
//!
//! Definitions are parameterless rewrites (`#define NAME body`). Macros take
//! a parenthesized argument list and are keyed by `(name, arity)`, so the
//! same name may coexist at several arities. Expanded tokens carry a
//! macro-origin chain on their locations; re-expanding a name already on a
//! token's own chain is refused, which terminates self-recursion.

use std::collections::HashMap;
use std::rc::Rc;

use crate::core::cursor::TokenCursor;
use crate::core::location::{Location, MacroOrigin};
use crate::core::tokenizer::{Token, TokenKind};

#[derive(Debug, Clone)]
pub struct MacroError {
    pub message: String,
    pub location: Location,
}

impl MacroError {
    fn at(message: impl Into<String>, location: &Location) -> Self {
        Self {
            message: message.into(),
            location: location.clone(),
        }
    }
}

/// A parameterless rewrite. An empty body is legal and expands to nothing;
/// such definitions exist mainly to satisfy `#ifdef`.
#[derive(Debug, Clone)]
pub struct Definition {
    pub name: String,
    pub body: Vec<Token>,
}

impl Definition {
    /// Body tokens with this definition chained onto their origin.
    pub fn expand(&self, call_site: &Location) -> Vec<Token> {
        let origin = Rc::new(MacroOrigin {
            macro_name: self.name.clone(),
            call_site: call_site.clone(),
        });
        relocate(&self.body, &origin)
    }
}

/// A parameterized rewrite, keyed by name and arity.
#[derive(Debug, Clone)]
pub struct MacroDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Token>,
}

impl MacroDef {
    /// The key used on origin chains and for registry lookup collisions.
    pub fn key(&self) -> String {
        macro_key(&self.name, self.params.len())
    }

    /// Substitute `args` positionally into the body.
    ///
    /// Body tokens get this macro chained onto their origin; argument tokens
    /// keep the origin they arrived with (they belong to the call site).
    pub fn expand(&self, args: &[Vec<Token>], call_site: &Location) -> Vec<Token> {
        let origin = Rc::new(MacroOrigin {
            macro_name: self.key(),
            call_site: call_site.clone(),
        });
        let mut out = Vec::new();
        for token in &self.body {
            let is_name = matches!(token.kind, TokenKind::Identifier | TokenKind::MaybeMacro);
            if is_name {
                if let Some(ix) = self.params.iter().position(|p| *p == token.text) {
                    out.extend(args[ix].iter().cloned());
                    continue;
                }
            }
            out.push(Token::new(
                token.kind,
                token.location.with_origin(origin.clone()),
                token.text.clone(),
            ));
        }
        out
    }
}

pub fn macro_key(name: &str, arity: usize) -> String {
    format!("{name}/{arity}")
}

fn relocate(tokens: &[Token], origin: &Rc<MacroOrigin>) -> Vec<Token> {
    tokens
        .iter()
        .map(|t| {
            Token::new(
                t.kind,
                t.location.with_origin(origin.clone()),
                t.text.clone(),
            )
        })
        .collect()
}

/// Collect a macro argument list from the cursor.
///
/// The opening `(` must already be consumed. Arguments are split on
/// top-level commas; nested `()` and `[]` groups are kept intact. Hitting a
/// `Newline` (or end of input) before the matching `)` is an error.
/// `()` yields zero arguments.
pub fn collect_arguments(
    cursor: &mut TokenCursor,
    open_location: &Location,
) -> Result<Vec<Vec<Token>>, MacroError> {
    let mut args: Vec<Vec<Token>> = Vec::new();
    let mut current: Vec<Token> = Vec::new();
    let mut depth = 0usize;
    loop {
        let token = match cursor.next() {
            Some(t) => t,
            None => {
                return Err(MacroError::at("Unmatched open parenthesis", open_location));
            }
        };
        match token.kind {
            TokenKind::Newline => {
                return Err(MacroError::at("Unmatched open parenthesis", open_location));
            }
            TokenKind::RightParen if depth == 0 => {
                if !current.is_empty() || !args.is_empty() {
                    args.push(current);
                }
                return Ok(args);
            }
            TokenKind::Comma if depth == 0 => {
                args.push(std::mem::take(&mut current));
            }
            _ => {
                match token.kind {
                    TokenKind::LeftParen | TokenKind::LeftBracket => depth += 1,
                    TokenKind::RightParen | TokenKind::RightBracket => {
                        depth = depth.saturating_sub(1)
                    }
                    _ => {}
                }
                current.push(token);
            }
        }
    }
}

/// Registry of definitions and macros seen so far.
#[derive(Default)]
pub struct MacroRegistry {
    definitions: HashMap<String, Definition>,
    macros: HashMap<(String, usize), MacroDef>,
}

impl MacroRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition. First writer wins.
    pub fn add_definition(&mut self, def: Definition) -> bool {
        if self.definitions.contains_key(&def.name) {
            return false;
        }
        self.definitions.insert(def.name.clone(), def);
        true
    }

    /// Register a macro under `(name, arity)`. First writer wins per arity.
    pub fn add_macro(&mut self, def: MacroDef) -> bool {
        let key = (def.name.clone(), def.params.len());
        if self.macros.contains_key(&key) {
            return false;
        }
        self.macros.insert(key, def);
        true
    }

    /// Remove a name entirely: its definition and every arity of macro.
    pub fn undefine(&mut self, name: &str) -> bool {
        let had_def = self.definitions.remove(name).is_some();
        let before = self.macros.len();
        self.macros.retain(|(n, _), _| n != name);
        had_def || self.macros.len() != before
    }

    /// True when `name` names a definition or a macro at any arity.
    /// This is the `#ifdef` test.
    pub fn is_defined(&self, name: &str) -> bool {
        self.definitions.contains_key(name) || self.macros.keys().any(|(n, _)| n == name)
    }

    pub fn definition(&self, name: &str) -> Option<&Definition> {
        self.definitions.get(name)
    }

    pub fn macro_at(&self, name: &str, arity: usize) -> Option<&MacroDef> {
        self.macros.get(&(name.to_string(), arity))
    }

    /// True when any macro (any arity) is registered under `name`.
    pub fn has_macro(&self, name: &str) -> bool {
        self.macros.keys().any(|(n, _)| n == name)
    }

    /// Registered arities for `name`, in no particular order.
    pub fn macro_arities(&self, name: &str) -> Vec<usize> {
        self.macros
            .keys()
            .filter(|(n, _)| n == name)
            .map(|(_, arity)| *arity)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(line: u32, column: usize) -> Location {
        Location::new(Rc::from("t.event"), line, column)
    }

    fn ident(text: &str) -> Token {
        Token::new(TokenKind::Identifier, loc(1, 1), text)
    }

    fn num(text: &str) -> Token {
        Token::new(TokenKind::Number, loc(1, 1), text)
    }

    fn punct(kind: TokenKind, text: &str) -> Token {
        Token::new(kind, loc(1, 1), text)
    }

    #[test]
    fn definition_expansion_chains_origin() {
        let def = Definition {
            name: "FOO".to_string(),
            body: vec![num("5")],
        };
        let call = loc(7, 3);
        let out = def.expand(&call);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "5");
        assert!(out[0].location.origin_chain_contains("FOO"));
    }

    #[test]
    fn macro_substitutes_positionally_and_keeps_arg_origins() {
        let def = MacroDef {
            name: "Pair".to_string(),
            params: vec!["a".to_string(), "b".to_string()],
            body: vec![
                ident("a"),
                punct(TokenKind::Comma, ","),
                ident("b"),
                punct(TokenKind::Comma, ","),
                ident("a"),
            ],
        };
        let args = vec![vec![num("1")], vec![num("2")]];
        let out = def.expand(&args, &loc(3, 1));
        let texts: Vec<&str> = out.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["1", ",", "2", ",", "1"]);
        // Argument tokens come from the call site and carry no macro origin;
        // the comma from the body does.
        assert!(out[0].location.origin.is_none());
        assert!(out[1].location.origin_chain_contains("Pair/2"));
    }

    #[test]
    fn collect_arguments_respects_nesting() {
        let mut cursor = TokenCursor::from_tokens(vec![
            num("1"),
            punct(TokenKind::Comma, ","),
            punct(TokenKind::LeftParen, "("),
            num("2"),
            punct(TokenKind::Comma, ","),
            num("3"),
            punct(TokenKind::RightParen, ")"),
            punct(TokenKind::RightParen, ")"),
        ]);
        let args = collect_arguments(&mut cursor, &loc(1, 4)).unwrap();
        assert_eq!(args.len(), 2);
        assert_eq!(args[0].len(), 1);
        // The nested group stays in one argument, parens included.
        assert_eq!(args[1].len(), 5);
    }

    #[test]
    fn collect_arguments_empty_list() {
        let mut cursor = TokenCursor::from_tokens(vec![punct(TokenKind::RightParen, ")")]);
        let args = collect_arguments(&mut cursor, &loc(1, 4)).unwrap();
        assert!(args.is_empty());
    }

    #[test]
    fn unterminated_argument_list_is_an_error() {
        let mut cursor =
            TokenCursor::from_tokens(vec![num("1"), punct(TokenKind::Newline, "")]);
        let err = collect_arguments(&mut cursor, &loc(1, 4)).unwrap_err();
        assert!(err.message.contains("Unmatched open parenthesis"));
    }

    #[test]
    fn registry_keys_macros_by_arity() {
        let mut reg = MacroRegistry::new();
        assert!(reg.add_macro(MacroDef {
            name: "M".to_string(),
            params: vec!["a".to_string()],
            body: vec![],
        }));
        assert!(reg.add_macro(MacroDef {
            name: "M".to_string(),
            params: vec!["a".to_string(), "b".to_string()],
            body: vec![],
        }));
        // Same name, same arity: first writer wins.
        assert!(!reg.add_macro(MacroDef {
            name: "M".to_string(),
            params: vec!["x".to_string()],
            body: vec![],
        }));
        assert!(reg.macro_at("M", 1).is_some());
        assert!(reg.macro_at("M", 2).is_some());
        assert!(reg.macro_at("M", 3).is_none());
        assert!(reg.is_defined("M"));
    }

    #[test]
    fn undefine_removes_every_arity() {
        let mut reg = MacroRegistry::new();
        reg.add_definition(Definition {
            name: "X".to_string(),
            body: vec![],
        });
        reg.add_macro(MacroDef {
            name: "X".to_string(),
            params: vec!["a".to_string()],
            body: vec![],
        });
        assert!(reg.undefine("X"));
        assert!(!reg.is_defined("X"));
        assert!(!reg.undefine("X"));
    }
}
