// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Shift-reduce expression parser and statement parameter parsing.
//!
//! The parser pulls tokens from a [`TokenCursor`], expanding macros and
//! definitions in place as it goes. An identifier whose expansion is refused
//! because it is already on its own origin chain is shifted as a plain
//! identifier; the recursive occurrence passes through unexpanded.

use crate::core::cursor::TokenCursor;
use crate::core::expr::{BinaryOp, Expr, UnaryOp};
use crate::core::location::Location;
use crate::core::macros::{collect_arguments, macro_key, MacroError, MacroRegistry};
use crate::core::report::Log;
use crate::core::scope::ScopeStack;
use crate::core::tokenizer::{Token, TokenKind};

#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub location: Location,
}

impl ParseError {
    pub fn at(message: impl Into<String>, location: &Location) -> Self {
        Self {
            message: message.into(),
            location: location.clone(),
        }
    }
}

impl From<MacroError> for ParseError {
    fn from(err: MacroError) -> Self {
        Self {
            message: err.message,
            location: err.location,
        }
    }
}

/// A statement argument.
#[derive(Debug, Clone)]
pub enum Param {
    Atom(Expr),
    /// Bracketed `[a, b, c]` tuple.
    List(Vec<Expr>, Location),
    StringLiteral(String, Location),
}

impl Param {
    pub fn location(&self) -> &Location {
        match self {
            Param::Atom(expr) => expr.location(),
            Param::List(_, loc) | Param::StringLiteral(_, loc) => loc,
        }
    }
}

pub struct Parser<'a> {
    registry: &'a MacroRegistry,
}

impl<'a> Parser<'a> {
    pub fn new(registry: &'a MacroRegistry) -> Self {
        Self { registry }
    }

    /// Parse one expression, stopping at the first token that cannot
    /// continue it (which is pushed back).
    pub fn parse_expression(
        &self,
        cursor: &mut TokenCursor,
        scope: &ScopeStack,
        log: &mut Log,
    ) -> Result<Expr, ParseError> {
        let expr = self.parse_expr_inner(cursor, scope)?;
        flag_macro_spanning(&expr, log);
        Ok(expr)
    }

    /// Parse one statement parameter: string literal, bracketed list, or
    /// expression atom.
    pub fn parse_param(
        &self,
        cursor: &mut TokenCursor,
        scope: &ScopeStack,
        log: &mut Log,
    ) -> Result<Param, ParseError> {
        match cursor.peek_kind() {
            Some(TokenKind::String) => {
                let token = cursor.next().unwrap();
                Ok(Param::StringLiteral(token.text, token.location))
            }
            Some(TokenKind::LeftBracket) => {
                let open = cursor.next().unwrap();
                let mut items = Vec::new();
                loop {
                    match cursor.peek_kind() {
                        Some(TokenKind::RightBracket) => {
                            cursor.next();
                            return Ok(Param::List(items, open.location));
                        }
                        Some(TokenKind::Comma) => {
                            cursor.next();
                        }
                        Some(TokenKind::Newline) | None => {
                            return Err(ParseError::at(
                                "Unmatched open bracket",
                                &open.location,
                            ));
                        }
                        _ => {
                            let item = self.parse_expr_inner(cursor, scope)?;
                            flag_macro_spanning(&item, log);
                            items.push(item);
                        }
                    }
                }
            }
            _ => Ok(Param::Atom(self.parse_expression(cursor, scope, log)?)),
        }
    }

    /// Parse parameters up to (not including) the statement-ending
    /// `Newline`. Commas between parameters are optional separators.
    pub fn parse_param_list(
        &self,
        cursor: &mut TokenCursor,
        scope: &ScopeStack,
        log: &mut Log,
    ) -> Result<Vec<Param>, ParseError> {
        let mut params = Vec::new();
        loop {
            match cursor.peek_kind() {
                Some(TokenKind::Newline) | None => return Ok(params),
                Some(TokenKind::Comma) => {
                    cursor.next();
                }
                _ => params.push(self.parse_param(cursor, scope, log)?),
            }
        }
    }

    fn parse_expr_inner(
        &self,
        cursor: &mut TokenCursor,
        scope: &ScopeStack,
    ) -> Result<Expr, ParseError> {
        let mut operands: Vec<Expr> = Vec::new();
        let mut operators: Vec<(BinaryOp, Location)> = Vec::new();
        let mut pending_unary: Vec<(UnaryOp, Location)> = Vec::new();
        let mut expecting_operand = true;

        loop {
            let token = match cursor.peek() {
                Some(t) => t.clone(),
                None => break,
            };

            if expecting_operand {
                match token.kind {
                    TokenKind::Minus => {
                        cursor.next();
                        pending_unary.push((UnaryOp::Negate, token.location));
                        continue;
                    }
                    TokenKind::Not => {
                        cursor.next();
                        pending_unary.push((UnaryOp::LogicNot, token.location));
                        continue;
                    }
                    TokenKind::Tilde => {
                        cursor.next();
                        pending_unary.push((UnaryOp::BitNot, token.location));
                        continue;
                    }
                    TokenKind::Number => {
                        cursor.next();
                        let value =
                            crate::core::expr::parse_number(&token.text).ok_or_else(|| {
                                ParseError::at(
                                    format!("Invalid number literal: {}", token.text),
                                    &token.location,
                                )
                            })?;
                        push_operand(
                            &mut operands,
                            &mut pending_unary,
                            Expr::Number(value, token.location),
                        );
                        expecting_operand = false;
                        continue;
                    }
                    TokenKind::Identifier | TokenKind::MaybeMacro => {
                        cursor.next();
                        if self.try_expand(&token, cursor)? {
                            continue;
                        }
                        push_operand(
                            &mut operands,
                            &mut pending_unary,
                            Expr::Identifier(token.text, scope.clone(), token.location),
                        );
                        expecting_operand = false;
                        continue;
                    }
                    TokenKind::LeftParen => {
                        cursor.next();
                        let inner = self.parse_expr_inner(cursor, scope)?;
                        match cursor.peek_kind() {
                            Some(TokenKind::RightParen) => {
                                cursor.next();
                            }
                            _ => {
                                return Err(ParseError::at(
                                    "Unmatched open parenthesis",
                                    &token.location,
                                ));
                            }
                        }
                        push_operand(
                            &mut operands,
                            &mut pending_unary,
                            Expr::Paren(Box::new(inner), token.location),
                        );
                        expecting_operand = false;
                        continue;
                    }
                    _ => {
                        return Err(ParseError::at(
                            format!("Expected a value, found {:?}", token.kind),
                            &token.location,
                        ));
                    }
                }
            }

            // Expecting an operator; anything else ends the expression.
            match BinaryOp::from_token_kind(token.kind) {
                Some(op) => {
                    cursor.next();
                    reduce_for(&mut operands, &mut operators, op);
                    operators.push((op, token.location));
                    expecting_operand = true;
                }
                None => break,
            }
        }

        if expecting_operand {
            let location = operators
                .last()
                .map(|(_, loc)| loc.clone())
                .or_else(|| operands.last().map(|e| e.location().clone()));
            return Err(match location {
                Some(loc) => ParseError::at("Expected a value", &loc),
                None => ParseError {
                    message: "Expected an expression".to_string(),
                    location: Location::new(std::rc::Rc::from("<input>"), 0, 0),
                },
            });
        }

        while !operators.is_empty() {
            reduce_once(&mut operands, &mut operators);
        }
        // One operand per completed parse by construction.
        Ok(operands.pop().expect("operand stack cannot be empty"))
    }

    /// Expand a macro or definition occurrence in place.
    ///
    /// Returns `true` when tokens were prepended to the cursor and the
    /// caller should re-read. Returns `false` when the token is a plain
    /// identifier, including the refused-recursive case.
    pub fn try_expand(&self, token: &Token, cursor: &mut TokenCursor) -> Result<bool, ParseError> {
        let name = token.text.as_str();

        if token.kind == TokenKind::MaybeMacro && self.registry.has_macro(name) {
            let on_chain = self
                .registry
                .macro_arities(name)
                .iter()
                .any(|arity| token.location.origin_chain_contains(&macro_key(name, *arity)));
            if on_chain {
                return Ok(false);
            }
            let open = cursor.next().ok_or_else(|| {
                ParseError::at("Unmatched open parenthesis", &token.location)
            })?;
            debug_assert_eq!(open.kind, TokenKind::LeftParen);
            let args = collect_arguments(cursor, &open.location)?;
            let def = self.registry.macro_at(name, args.len()).ok_or_else(|| {
                ParseError::at(
                    format!("Incorrect number of parameters to {}: {}", name, args.len()),
                    &token.location,
                )
            })?;
            cursor.prepend(def.expand(&args, &token.location));
            return Ok(true);
        }

        if let Some(def) = self.registry.definition(name) {
            if token.location.origin_chain_contains(name) {
                return Ok(false);
            }
            cursor.prepend(def.expand(&token.location));
            return Ok(true);
        }

        Ok(false)
    }
}

fn push_operand(
    operands: &mut Vec<Expr>,
    pending_unary: &mut Vec<(UnaryOp, Location)>,
    mut expr: Expr,
) {
    while let Some((op, location)) = pending_unary.pop() {
        expr = Expr::Unary {
            op,
            operand: Box::new(expr),
            location,
        };
    }
    operands.push(expr);
}

/// Reduce pending operators that bind at least as tightly as `incoming`.
/// Right-associative operators reduce only strictly tighter ones, so `??`
/// chains nest to the right.
fn reduce_for(operands: &mut Vec<Expr>, operators: &mut Vec<(BinaryOp, Location)>, incoming: BinaryOp) {
    while let Some((top, _)) = operators.last() {
        let reduce = if incoming.is_right_associative() {
            top.precedence() < incoming.precedence()
        } else {
            top.precedence() <= incoming.precedence()
        };
        if !reduce {
            break;
        }
        reduce_once(operands, operators);
    }
}

fn reduce_once(operands: &mut Vec<Expr>, operators: &mut Vec<(BinaryOp, Location)>) {
    let (op, location) = operators.pop().expect("reduce with empty operator stack");
    let right = operands.pop().expect("reduce with empty operand stack");
    let left = operands.pop().expect("reduce with one operand");
    operands.push(Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
        location,
    });
}

fn origin_key(location: &Location) -> Option<&str> {
    location.origin.as_ref().map(|o| o.macro_name.as_str())
}

/// Diagnostic pass: warn about operators written at the invocation site
/// that combine macro-produced operands, the classic unparenthesized macro
/// body precedence surprise.
fn flag_macro_spanning(expr: &Expr, log: &mut Log) {
    match expr {
        Expr::Binary {
            left,
            right,
            location,
            ..
        } => {
            if origin_key(location).is_none()
                && (origin_key(left.location()).is_some() || origin_key(right.location()).is_some())
            {
                log.warning(
                    Some(location),
                    "Operation spans a macro expansion; parenthesize the macro body if this is intended",
                );
            }
            flag_macro_spanning(left, log);
            flag_macro_spanning(right, log);
        }
        Expr::Unary { operand, .. } => flag_macro_spanning(operand, log),
        Expr::Paren(inner, _) => flag_macro_spanning(inner, log),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::macros::{Definition, MacroDef};
    use crate::core::scope::{evaluate, EvalContext, Phase, ScopeStack};
    use crate::core::tokenizer::Tokenizer;

    fn body_tokens(text: &str) -> Vec<Token> {
        let mut tokens = Tokenizer::new("t.event").tokenize_line(text, 1);
        tokens.pop(); // trailing Newline
        tokens
    }

    fn parse_with(
        registry: &MacroRegistry,
        text: &str,
    ) -> (Result<Expr, ParseError>, ScopeStack, Log) {
        let tokens = Tokenizer::new("t.event").tokenize_line(text, 1);
        let mut cursor = TokenCursor::from_tokens(tokens);
        let scope = ScopeStack::new_base();
        let mut log = Log::new();
        let result = Parser::new(registry).parse_expression(&mut cursor, &scope, &mut log);
        (result, scope, log)
    }

    fn eval_text(text: &str) -> i64 {
        let registry = MacroRegistry::new();
        let (result, _, _) = parse_with(&registry, text);
        evaluate(&result.unwrap(), Phase::Immediate, &EvalContext::default()).unwrap()
    }

    #[test]
    fn precedence_multiplication_binds_tighter() {
        assert_eq!(eval_text("1 + 2 * 3"), 7);
        assert_eq!(eval_text("2 * 3 + 1"), 7);
        assert_eq!(eval_text("10 - 2 - 3"), 5);
        assert_eq!(eval_text("1 | 2 & 3"), 3);
    }

    #[test]
    fn parentheses_override_precedence() {
        assert_eq!(eval_text("(1 + 2) * 3"), 9);
        assert_eq!(eval_text("-(1 + 2)"), -3);
    }

    #[test]
    fn unary_operators_bind_tightest() {
        assert_eq!(eval_text("-5 + 3"), -2);
        assert_eq!(eval_text("~0"), -1);
        assert_eq!(eval_text("!0 + 1"), 2);
        assert_eq!(eval_text("-~0"), 1);
    }

    #[test]
    fn coalesce_nests_to_the_right() {
        let registry = MacroRegistry::new();
        let (result, _, _) = parse_with(&registry, "1 ?? 2 ?? 3");
        assert_eq!(result.unwrap().pretty(), "(1 ?? (2 ?? 3))");

        // Undefined left side falls through to the first defined value.
        assert_eq!(eval_text("missing ?? 42"), 42);
    }

    #[test]
    fn definitions_expand_during_parsing() {
        let mut registry = MacroRegistry::new();
        registry.add_definition(Definition {
            name: "FOO".to_string(),
            body: body_tokens("5"),
        });
        let (result, _, _) = parse_with(&registry, "FOO + 1");
        let expr = result.unwrap();
        assert_eq!(
            evaluate(&expr, Phase::Immediate, &EvalContext::default()).unwrap(),
            6
        );
    }

    #[test]
    fn macros_expand_with_positional_substitution() {
        let mut registry = MacroRegistry::new();
        registry.add_macro(MacroDef {
            name: "Double".to_string(),
            params: vec!["a".to_string()],
            body: body_tokens("a * 2"),
        });
        let (result, _, _) = parse_with(&registry, "Double(4) + 1");
        let expr = result.unwrap();
        assert_eq!(
            evaluate(&expr, Phase::Immediate, &EvalContext::default()).unwrap(),
            9
        );
    }

    #[test]
    fn wrong_arity_is_an_error() {
        let mut registry = MacroRegistry::new();
        registry.add_macro(MacroDef {
            name: "Double".to_string(),
            params: vec!["a".to_string()],
            body: body_tokens("a * 2"),
        });
        let (result, _, _) = parse_with(&registry, "Double(1, 2)");
        let err = result.unwrap_err();
        assert!(err.message.contains("Incorrect number of parameters"));
    }

    #[test]
    fn self_recursive_macro_passes_through_unexpanded() {
        let mut registry = MacroRegistry::new();
        registry.add_macro(MacroDef {
            name: "Rec".to_string(),
            params: vec!["x".to_string()],
            body: body_tokens("Rec(x)"),
        });
        // Must terminate; the inner occurrence is shifted as an identifier.
        let (result, _, _) = parse_with(&registry, "Rec(1)");
        let expr = result.unwrap();
        assert!(matches!(expr, Expr::Identifier(ref name, _, _) if name == "Rec"));
        assert!(
            evaluate(&expr, Phase::Final, &EvalContext::default()).is_err(),
            "unexpanded recursive occurrence cannot evaluate"
        );
    }

    #[test]
    fn consecutive_operators_are_a_parse_error() {
        let registry = MacroRegistry::new();
        let (result, _, _) = parse_with(&registry, "1 + * 2");
        assert!(result.is_err());
        let (result, _, _) = parse_with(&registry, "*");
        assert!(result.is_err());
    }

    #[test]
    fn unmatched_parenthesis_is_a_parse_error() {
        let registry = MacroRegistry::new();
        let (result, _, _) = parse_with(&registry, "(1 + 2");
        assert!(result.unwrap_err().message.contains("Unmatched open parenthesis"));
    }

    #[test]
    fn param_list_mixes_atoms_lists_and_strings() {
        let registry = MacroRegistry::new();
        let tokens = Tokenizer::new("t.event").tokenize_line("1 + 1, [2, 3], \"hi\"", 1);
        let mut cursor = TokenCursor::from_tokens(tokens);
        let scope = ScopeStack::new_base();
        let mut log = Log::new();
        let params = Parser::new(&registry)
            .parse_param_list(&mut cursor, &scope, &mut log)
            .unwrap();
        assert_eq!(params.len(), 3);
        assert!(matches!(params[0], Param::Atom(_)));
        match &params[1] {
            Param::List(items, _) => assert_eq!(items.len(), 2),
            other => panic!("expected list, got {other:?}"),
        }
        assert!(matches!(&params[2], Param::StringLiteral(s, _) if s == "hi"));
    }

    #[test]
    fn space_separated_params_parse_without_commas() {
        let registry = MacroRegistry::new();
        let tokens = Tokenizer::new("t.event").tokenize_line("1 2 3", 1);
        let mut cursor = TokenCursor::from_tokens(tokens);
        let scope = ScopeStack::new_base();
        let mut log = Log::new();
        let params = Parser::new(&registry)
            .parse_param_list(&mut cursor, &scope, &mut log)
            .unwrap();
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn call_site_operator_over_macro_operands_warns() {
        let mut registry = MacroRegistry::new();
        registry.add_definition(Definition {
            name: "SUM".to_string(),
            body: body_tokens("1 + 2"),
        });
        // Expands to 1 + 2 * 3; the * written at the call site silently
        // captures only the trailing 2.
        let (result, _, log) = parse_with(&registry, "SUM * 3");
        let expr = result.unwrap();
        assert_eq!(
            evaluate(&expr, Phase::Immediate, &EvalContext::default()).unwrap(),
            7
        );
        assert_eq!(log.warning_count(), 1);
    }

    #[test]
    fn macro_internal_operators_do_not_warn() {
        let mut registry = MacroRegistry::new();
        registry.add_macro(MacroDef {
            name: "Double".to_string(),
            params: vec!["a".to_string()],
            body: body_tokens("a * 2"),
        });
        let (result, _, log) = parse_with(&registry, "Double(4)");
        assert!(result.is_ok());
        assert_eq!(log.warning_count(), 0);
    }
}
