// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Core language components that are target-agnostic.
//!
//! - [`tokenizer`] - Line-oriented tokenizer
//! - [`cursor`] - Token cursor stack for macro/include splicing
//! - [`macros`] - Definition and macro registry
//! - [`expr`] - Expression AST and evaluation
//! - [`parser`] - Shift-reduce expression parser
//! - [`scope`] - Persistent symbol scope stack
//! - [`report`] - Diagnostics and logging

pub mod cursor;
pub mod expr;
pub mod location;
pub mod macros;
pub mod parser;
pub mod report;
pub mod scope;
pub mod tokenizer;
