// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Source locations with macro-origin chains.
//!
//! Every token carries a [`Location`]. Tokens produced by macro or definition
//! expansion additionally carry a [`MacroOrigin`] linking back to the
//! invocation site, chained transitively so diagnostics can report
//! "at X, from inside macro Y expanded at Z".

use std::fmt;
use std::rc::Rc;

/// Where a macro-produced token came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroOrigin {
    /// Macro or definition name, with `/arity` appended for macros.
    pub macro_name: String,
    /// Location of the invocation that produced this token.
    pub call_site: Location,
}

/// A position in a source file, cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: Rc<str>,
    pub line: u32,
    pub column: usize,
    pub origin: Option<Rc<MacroOrigin>>,
}

impl Location {
    pub fn new(file: Rc<str>, line: u32, column: usize) -> Self {
        Self {
            file,
            line,
            column,
            origin: None,
        }
    }

    /// Clone this location, replacing the origin with a new chain link.
    pub fn with_origin(&self, origin: Rc<MacroOrigin>) -> Self {
        Self {
            file: self.file.clone(),
            line: self.line,
            column: self.column,
            origin: Some(origin),
        }
    }

    /// True when `macro_key` appears anywhere on the origin chain.
    ///
    /// Used to refuse re-expansion of a macro already being expanded.
    pub fn origin_chain_contains(&self, macro_key: &str) -> bool {
        let mut current = self.origin.as_ref();
        while let Some(origin) = current {
            if origin.macro_name == macro_key {
                return true;
            }
            current = origin.call_site.origin.as_ref();
        }
        false
    }

    /// Render the origin chain as note lines, outermost last.
    pub fn origin_notes(&self) -> Vec<String> {
        let mut notes = Vec::new();
        let mut current = self.origin.as_ref();
        while let Some(origin) = current {
            notes.push(format!(
                "from inside {} expanded at {}:{}:{}",
                origin.macro_name,
                origin.call_site.file,
                origin.call_site.line,
                origin.call_site.column
            ));
            current = origin.call_site.origin.as_ref();
        }
        notes
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}
