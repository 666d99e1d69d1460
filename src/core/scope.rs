// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Persistent scope stack and multi-phase expression evaluation.
//!
//! A [`ScopeStack`] is a structurally shared linked list of closures.
//! Pushing a block scope conses a new closure onto the stack without
//! touching the original, so a captured stack reference (deferred symbols,
//! pooled statements) remains valid after the live stack is popped.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::core::expr::{apply_binary, apply_unary, BinaryOp, EvalError, Expr};
use crate::core::location::Location;

/// Evaluation strictness. One evaluation function; the caller's policy on
/// failure differs per phase (defer, hard error, or force resolution).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Assignment time: failure is tolerated, the expression is deferred.
    Early,
    /// Directive/statement time: failure is a hard error at that statement.
    Immediate,
    /// Second pass after all input: failure is a hard error per reference.
    Final,
}

/// One scope's symbol table: resolved constants plus deferred expressions.
#[derive(Default)]
pub struct Closure {
    symbols: HashMap<String, i64>,
    deferred: HashMap<String, Expr>,
}

struct ScopeNode {
    closure: RefCell<Closure>,
    parent: Option<ScopeStack>,
}

/// Immutable, shared-tail stack of closures.
#[derive(Clone)]
pub struct ScopeStack(Rc<ScopeNode>);

/// Result of adding a symbol to the innermost closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// The name already exists in this closure; first writer wins.
    AlreadyDefined,
}

/// Ambient values the base closure answers without storage.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvalContext {
    pub current_offset: Option<i64>,
}

impl ScopeStack {
    /// Create the base (global) scope.
    pub fn new_base() -> Self {
        Self(Rc::new(ScopeNode {
            closure: RefCell::new(Closure::default()),
            parent: None,
        }))
    }

    /// Cons a new block scope onto this stack. The receiver is unchanged.
    pub fn push(&self) -> Self {
        Self(Rc::new(ScopeNode {
            closure: RefCell::new(Closure::default()),
            parent: Some(self.clone()),
        }))
    }

    /// Pop back to the enclosing scope. Returns `None` at the base.
    pub fn pop(&self) -> Option<Self> {
        self.0.parent.clone()
    }

    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut node = &self.0;
        while let Some(parent) = &node.parent {
            depth += 1;
            node = &parent.0;
        }
        depth
    }

    /// Add a resolved symbol to the innermost closure. Builtin names are
    /// never writable; the base closure always answers them itself.
    pub fn add_symbol(&self, name: &str, value: i64) -> AddOutcome {
        if is_builtin(name) {
            return AddOutcome::AlreadyDefined;
        }
        let mut closure = self.0.closure.borrow_mut();
        if closure.symbols.contains_key(name) || closure.deferred.contains_key(name) {
            return AddOutcome::AlreadyDefined;
        }
        closure.symbols.insert(name.to_string(), value);
        AddOutcome::Added
    }

    /// Add a deferred symbol (unevaluated expression) to the innermost
    /// closure.
    pub fn add_deferred(&self, name: &str, expr: Expr) -> AddOutcome {
        if is_builtin(name) {
            return AddOutcome::AlreadyDefined;
        }
        let mut closure = self.0.closure.borrow_mut();
        if closure.symbols.contains_key(name) || closure.deferred.contains_key(name) {
            return AddOutcome::AlreadyDefined;
        }
        closure.deferred.insert(name.to_string(), expr);
        AddOutcome::Added
    }

    /// True when any closure on the stack holds `name`, resolved or not.
    pub fn is_defined(&self, name: &str) -> bool {
        let mut node = Some(&self.0);
        while let Some(current) = node {
            let closure = current.closure.borrow();
            if closure.symbols.contains_key(name) || closure.deferred.contains_key(name) {
                return true;
            }
            node = current.parent.as_ref().map(|p| &p.0);
        }
        is_builtin(name)
    }

    /// Names still deferred anywhere on the stack, innermost first.
    pub fn deferred_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut node = Some(&self.0);
        while let Some(current) = node {
            let closure = current.closure.borrow();
            names.extend(closure.deferred.keys().cloned());
            node = current.parent.as_ref().map(|p| &p.0);
        }
        names
    }

    fn resolve(
        &self,
        name: &str,
        phase: Phase,
        ctx: &EvalContext,
        location: &Location,
    ) -> Result<i64, EvalError> {
        let mut frame = Some(self.clone());
        while let Some(stack) = frame {
            let node = &stack.0;
            if let Some(value) = node.closure.borrow().symbols.get(name) {
                return Ok(*value);
            }
            // Remove the deferred entry before evaluating so that a cyclic
            // definition fails on the recursive lookup instead of looping.
            let pending = node.closure.borrow_mut().deferred.remove(name);
            if let Some(expr) = pending {
                return match evaluate(&expr, phase, ctx) {
                    Ok(value) => {
                        node.closure
                            .borrow_mut()
                            .symbols
                            .insert(name.to_string(), value);
                        Ok(value)
                    }
                    Err(cause) => {
                        node.closure
                            .borrow_mut()
                            .deferred
                            .insert(name.to_string(), expr);
                        Err(EvalError::at(
                            format!("Could not evaluate symbol {name}: {}", cause.message),
                            location,
                        ))
                    }
                };
            }
            frame = node.parent.clone();
        }

        // Base-closure builtins exist without storage.
        match name {
            "CURRENTOFFSET" => ctx
                .current_offset
                .ok_or_else(|| EvalError::at("CURRENTOFFSET is not available here", location)),
            "__LINE__" => Ok(location.line as i64),
            "__FILE__" => Err(EvalError::at(
                "__FILE__ cannot be used in arithmetic",
                location,
            )),
            _ => Err(EvalError::at(
                format!("Undefined identifier: {name}"),
                location,
            )),
        }
    }
}

fn is_builtin(name: &str) -> bool {
    matches!(name, "CURRENTOFFSET" | "__LINE__" | "__FILE__")
}

impl fmt::Debug for ScopeStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScopeStack(depth {})", self.depth())
    }
}

/// Evaluate an expression to an integer.
///
/// `??` evaluates its right side only when the left fails; all other
/// operators evaluate strictly.
pub fn evaluate(expr: &Expr, phase: Phase, ctx: &EvalContext) -> Result<i64, EvalError> {
    match expr {
        Expr::Number(value, _) => Ok(*value),
        Expr::Paren(inner, _) => evaluate(inner, phase, ctx),
        Expr::Identifier(name, scope, location) => scope.resolve(name, phase, ctx, location),
        Expr::Unary { op, operand, .. } => Ok(apply_unary(*op, evaluate(operand, phase, ctx)?)),
        Expr::Binary {
            op,
            left,
            right,
            location,
        } => {
            if *op == BinaryOp::Coalesce {
                return match evaluate(left, phase, ctx) {
                    Ok(value) => Ok(value),
                    Err(_) => evaluate(right, phase, ctx),
                };
            }
            let l = evaluate(left, phase, ctx)?;
            let r = evaluate(right, phase, ctx)?;
            apply_binary(*op, l, r, location)
        }
    }
}
