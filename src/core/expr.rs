// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Expression AST shared by the parser, scope stack and interpreter.
//!
//! Nodes form a closed set and support evaluation (see [`crate::core::scope`]),
//! pretty-printing, and conversion back to a token sequence for re-lexing
//! inside macro bodies.

use crate::core::location::Location;
use crate::core::scope::ScopeStack;
use crate::core::tokenizer::{Token, TokenKind};

/// Error returned from expression evaluation.
#[derive(Debug, Clone)]
pub struct EvalError {
    pub message: String,
    pub location: Option<Location>,
}

impl EvalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
        }
    }

    pub fn at(message: impl Into<String>, location: &Location) -> Self {
        Self {
            message: message.into(),
            location: Some(location.clone()),
        }
    }
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for EvalError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    BitNot,
    LogicNot,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Negate => "-",
            UnaryOp::BitNot => "~",
            UnaryOp::LogicNot => "!",
        }
    }

    pub fn token_kind(self) -> TokenKind {
        match self {
            UnaryOp::Negate => TokenKind::Minus,
            UnaryOp::BitNot => TokenKind::Tilde,
            UnaryOp::LogicNot => TokenKind::Not,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Multiply,
    Divide,
    Modulo,
    Add,
    Subtract,
    ShiftLeft,
    ShiftRight,
    UnsignedShiftRight,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
    BitAnd,
    BitXor,
    BitOr,
    LogicAnd,
    LogicOr,
    Coalesce,
}

impl BinaryOp {
    /// Binding tightness; lower binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => 3,
            BinaryOp::Add | BinaryOp::Subtract => 4,
            BinaryOp::ShiftLeft | BinaryOp::ShiftRight | BinaryOp::UnsignedShiftRight => 5,
            BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => 6,
            BinaryOp::Equal | BinaryOp::NotEqual => 7,
            BinaryOp::BitAnd => 8,
            BinaryOp::BitXor => 9,
            BinaryOp::BitOr => 10,
            BinaryOp::LogicAnd => 11,
            BinaryOp::LogicOr => 12,
            BinaryOp::Coalesce => 13,
        }
    }

    pub fn is_right_associative(self) -> bool {
        matches!(self, BinaryOp::Coalesce)
    }

    /// True for operators whose result is a truth value rather than an
    /// arithmetic quantity. ASSERT classifies on this.
    pub fn is_boolean(self) -> bool {
        matches!(
            self,
            BinaryOp::Less
                | BinaryOp::LessEqual
                | BinaryOp::Greater
                | BinaryOp::GreaterEqual
                | BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::LogicAnd
                | BinaryOp::LogicOr
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::ShiftLeft => "<<",
            BinaryOp::ShiftRight => ">>",
            BinaryOp::UnsignedShiftRight => ">>>",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitXor => "^",
            BinaryOp::BitOr => "|",
            BinaryOp::LogicAnd => "&&",
            BinaryOp::LogicOr => "||",
            BinaryOp::Coalesce => "??",
        }
    }

    pub fn token_kind(self) -> TokenKind {
        match self {
            BinaryOp::Multiply => TokenKind::Star,
            BinaryOp::Divide => TokenKind::Slash,
            BinaryOp::Modulo => TokenKind::Percent,
            BinaryOp::Add => TokenKind::Plus,
            BinaryOp::Subtract => TokenKind::Minus,
            BinaryOp::ShiftLeft => TokenKind::ShiftLeft,
            BinaryOp::ShiftRight => TokenKind::ShiftRight,
            BinaryOp::UnsignedShiftRight => TokenKind::UnsignedShiftRight,
            BinaryOp::Less => TokenKind::Less,
            BinaryOp::LessEqual => TokenKind::LessEqual,
            BinaryOp::Greater => TokenKind::Greater,
            BinaryOp::GreaterEqual => TokenKind::GreaterEqual,
            BinaryOp::Equal => TokenKind::Equal,
            BinaryOp::NotEqual => TokenKind::NotEqual,
            BinaryOp::BitAnd => TokenKind::Ampersand,
            BinaryOp::BitXor => TokenKind::Caret,
            BinaryOp::BitOr => TokenKind::Pipe,
            BinaryOp::LogicAnd => TokenKind::LogicalAnd,
            BinaryOp::LogicOr => TokenKind::LogicalOr,
            BinaryOp::Coalesce => TokenKind::Coalesce,
        }
    }

    pub fn from_token_kind(kind: TokenKind) -> Option<Self> {
        Some(match kind {
            TokenKind::Star => BinaryOp::Multiply,
            TokenKind::Slash => BinaryOp::Divide,
            TokenKind::Percent => BinaryOp::Modulo,
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Subtract,
            TokenKind::ShiftLeft => BinaryOp::ShiftLeft,
            TokenKind::ShiftRight => BinaryOp::ShiftRight,
            TokenKind::UnsignedShiftRight => BinaryOp::UnsignedShiftRight,
            TokenKind::Less => BinaryOp::Less,
            TokenKind::LessEqual => BinaryOp::LessEqual,
            TokenKind::Greater => BinaryOp::Greater,
            TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
            TokenKind::Equal => BinaryOp::Equal,
            TokenKind::NotEqual => BinaryOp::NotEqual,
            TokenKind::Ampersand => BinaryOp::BitAnd,
            TokenKind::Caret => BinaryOp::BitXor,
            TokenKind::Pipe => BinaryOp::BitOr,
            TokenKind::LogicalAnd => BinaryOp::LogicAnd,
            TokenKind::LogicalOr => BinaryOp::LogicOr,
            TokenKind::Coalesce => BinaryOp::Coalesce,
            _ => return None,
        })
    }
}

/// Expression AST node. A closed set; every node carries its source location.
#[derive(Debug, Clone)]
pub enum Expr {
    Number(i64, Location),
    /// Identifier bound to the scope stack that was live when it was parsed.
    Identifier(String, ScopeStack, Location),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        location: Location,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        location: Location,
    },
    Paren(Box<Expr>, Location),
}

impl Expr {
    pub fn location(&self) -> &Location {
        match self {
            Expr::Number(_, loc)
            | Expr::Identifier(_, _, loc)
            | Expr::Unary { location: loc, .. }
            | Expr::Binary { location: loc, .. }
            | Expr::Paren(_, loc) => loc,
        }
    }

    /// True when the top of this expression produces a truth value.
    pub fn is_boolean(&self) -> bool {
        match self {
            Expr::Binary { op, .. } => op.is_boolean(),
            Expr::Unary { op, .. } => *op == UnaryOp::LogicNot,
            Expr::Paren(inner, _) => inner.is_boolean(),
            _ => false,
        }
    }

    /// Pretty-print. Binary and unary subtrees are parenthesized so the
    /// output re-parses to the same tree shape.
    pub fn pretty(&self) -> String {
        match self {
            Expr::Number(v, _) => {
                if *v < 0 {
                    format!("-{}", v.unsigned_abs())
                } else {
                    v.to_string()
                }
            }
            Expr::Identifier(name, _, _) => name.clone(),
            Expr::Unary { op, operand, .. } => format!("{}{}", op.symbol(), operand.pretty()),
            Expr::Binary {
                op, left, right, ..
            } => format!("({} {} {})", left.pretty(), op.symbol(), right.pretty()),
            Expr::Paren(inner, _) => format!("({})", inner.pretty()),
        }
    }

    /// Produce the token sequence for this expression, for re-lexing inside
    /// macro bodies. Grouping parentheses are materialized so the tokens
    /// re-parse to an equivalent tree.
    pub fn to_tokens(&self) -> Vec<Token> {
        let mut out = Vec::new();
        self.push_tokens(&mut out);
        out
    }

    fn push_tokens(&self, out: &mut Vec<Token>) {
        let loc = self.location().clone();
        match self {
            Expr::Number(v, _) => {
                if *v < 0 {
                    out.push(Token::new(TokenKind::Minus, loc.clone(), "-"));
                    out.push(Token::new(
                        TokenKind::Number,
                        loc,
                        v.unsigned_abs().to_string(),
                    ));
                } else {
                    out.push(Token::new(TokenKind::Number, loc, v.to_string()));
                }
            }
            Expr::Identifier(name, _, _) => {
                out.push(Token::new(TokenKind::Identifier, loc, name.clone()));
            }
            Expr::Unary { op, operand, .. } => {
                out.push(Token::new(op.token_kind(), loc, op.symbol()));
                operand.push_tokens(out);
            }
            Expr::Binary {
                op, left, right, ..
            } => {
                out.push(Token::new(TokenKind::LeftParen, loc.clone(), "("));
                left.push_tokens(out);
                out.push(Token::new(op.token_kind(), loc.clone(), op.symbol()));
                right.push_tokens(out);
                out.push(Token::new(TokenKind::RightParen, loc, ")"));
            }
            Expr::Paren(inner, _) => {
                out.push(Token::new(TokenKind::LeftParen, loc.clone(), "("));
                inner.push_tokens(out);
                out.push(Token::new(TokenKind::RightParen, loc, ")"));
            }
        }
    }
}

/// Apply a unary operator to a value.
pub fn apply_unary(op: UnaryOp, val: i64) -> i64 {
    match op {
        UnaryOp::Negate => val.wrapping_neg(),
        UnaryOp::BitNot => !val,
        UnaryOp::LogicNot => {
            if val == 0 {
                1
            } else {
                0
            }
        }
    }
}

/// Apply a binary operator to two values.
///
/// `Coalesce` is not handled here: it needs evaluation-failure semantics
/// and is special-cased in the evaluator.
pub fn apply_binary(op: BinaryOp, l: i64, r: i64, location: &Location) -> Result<i64, EvalError> {
    Ok(match op {
        BinaryOp::Add => l.wrapping_add(r),
        BinaryOp::Subtract => l.wrapping_sub(r),
        BinaryOp::Multiply => l.wrapping_mul(r),
        BinaryOp::Divide => {
            if r == 0 {
                return Err(EvalError::at("Division by zero", location));
            }
            l / r
        }
        BinaryOp::Modulo => {
            if r == 0 {
                return Err(EvalError::at("Modulo by zero", location));
            }
            l % r
        }
        // Shift amounts are masked to the 32-bit value domain.
        BinaryOp::ShiftLeft => l.wrapping_shl((r & 0x1f) as u32),
        BinaryOp::ShiftRight => l.wrapping_shr((r & 0x1f) as u32),
        BinaryOp::UnsignedShiftRight => {
            ((l as u32).wrapping_shr((r & 0x1f) as u32)) as i64
        }
        BinaryOp::BitAnd => l & r,
        BinaryOp::BitOr => l | r,
        BinaryOp::BitXor => l ^ r,
        BinaryOp::Equal => (l == r) as i64,
        BinaryOp::NotEqual => (l != r) as i64,
        BinaryOp::Less => (l < r) as i64,
        BinaryOp::LessEqual => (l <= r) as i64,
        BinaryOp::Greater => (l > r) as i64,
        BinaryOp::GreaterEqual => (l >= r) as i64,
        BinaryOp::LogicAnd => ((l != 0) && (r != 0)) as i64,
        BinaryOp::LogicOr => ((l != 0) || (r != 0)) as i64,
        BinaryOp::Coalesce => l,
    })
}

/// Parse a number literal: decimal, `$`/`0x`-prefixed hex, or `b`-suffixed
/// binary.
pub fn parse_number(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let (is_neg, text) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let val = if let Some(hex) = text.strip_prefix('$') {
        i64::from_str_radix(hex, 16).ok()?
    } else if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else if let Some(bin) = text.strip_suffix('b').or_else(|| text.strip_suffix('B')) {
        if !bin.is_empty() && bin.bytes().all(|c| c == b'0' || c == b'1') {
            i64::from_str_radix(bin, 2).ok()?
        } else {
            return None;
        }
    } else {
        text.parse::<i64>().ok()?
    };

    Some(if is_neg { -val } else { val })
}
