// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Diagnostics and the assembly log.
//!
//! Every message funnels through [`Log`]. Errors latch `has_errored`, which
//! later gates the output commit. Macro-origin chains on locations are
//! attached to diagnostics as note lines automatically.

use std::fmt;

use serde_json::json;

use crate::core::location::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
    Message,
    Debug,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Note => "NOTE",
            Severity::Message => "MESSAGE",
            Severity::Debug => "DEBUG",
        };
        write!(f, "{s}")
    }
}

/// A single diagnostic with optional location and origin notes.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub location: Option<Location>,
    pub message: String,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, location: Option<Location>, message: impl Into<String>) -> Self {
        let notes = location
            .as_ref()
            .map(|loc| loc.origin_notes())
            .unwrap_or_default();
        Self {
            severity,
            location,
            message: message.into(),
            notes,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn format(&self) -> String {
        let mut out = match &self.location {
            Some(loc) => format!("{loc}: {}: {}", self.severity, self.message),
            None => format!("{}: {}", self.severity, self.message),
        };
        for note in &self.notes {
            out.push_str("\nnote: ");
            out.push_str(note);
        }
        out
    }

    /// Like [`format`](Self::format) but with the offending source line and
    /// a caret under the column, when the caller still has the line.
    pub fn format_with_context(&self, source_line: Option<&str>, use_color: bool) -> String {
        let mut out = self.format();
        if let (Some(loc), Some(line)) = (&self.location, source_line) {
            out.push('\n');
            out.push_str(&format!(
                "{:>5} | {}",
                loc.line,
                highlight_line(line, Some(loc.column), use_color)
            ));
        }
        out
    }

    pub fn to_json(&self) -> serde_json::Value {
        let location = self.location.as_ref().map(|loc| {
            json!({
                "file": loc.file.as_ref(),
                "line": loc.line,
                "column": loc.column,
            })
        });
        json!({
            "severity": self.severity.to_string(),
            "location": location,
            "message": self.message,
            "notes": self.notes,
        })
    }
}

/// Mark the column with color, or leave the line untouched when the column
/// is out of range.
pub fn highlight_line(line: &str, column: Option<usize>, use_color: bool) -> String {
    match column {
        Some(col) if col > 0 => {
            let idx = col - 1;
            if idx >= line.len() {
                if use_color {
                    return format!("{line}\x1b[31m^\x1b[0m");
                }
                return format!("{line}^");
            }
            let (head, tail) = line.split_at(idx);
            let ch = tail.chars().next().unwrap_or(' ');
            let rest = &tail[ch.len_utf8()..];
            if use_color {
                format!("{head}\x1b[31m{ch}\x1b[0m{rest}")
            } else {
                format!("{head}{ch}{rest}")
            }
        }
        _ => line.to_string(),
    }
}

/// Accumulating assembly log.
#[derive(Default)]
pub struct Log {
    diagnostics: Vec<Diagnostic>,
    has_errored: bool,
    warnings_as_errors: bool,
    quiet: bool,
    debug: bool,
}

impl Log {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_warnings_as_errors(mut self, yes: bool) -> Self {
        self.warnings_as_errors = yes;
        self
    }

    pub fn with_quiet(mut self, yes: bool) -> Self {
        self.quiet = yes;
        self
    }

    pub fn with_debug(mut self, yes: bool) -> Self {
        self.debug = yes;
        self
    }

    pub fn error(&mut self, location: Option<&Location>, message: impl Into<String>) {
        self.push(Severity::Error, location, message);
    }

    /// Record a warning; promoted to an error under `warnings_as_errors`.
    pub fn warning(&mut self, location: Option<&Location>, message: impl Into<String>) {
        let severity = if self.warnings_as_errors {
            Severity::Error
        } else {
            Severity::Warning
        };
        self.push(severity, location, message);
    }

    pub fn note(&mut self, location: Option<&Location>, message: impl Into<String>) {
        self.push(Severity::Note, location, message);
    }

    pub fn message(&mut self, location: Option<&Location>, message: impl Into<String>) {
        self.push(Severity::Message, location, message);
    }

    pub fn debug(&mut self, location: Option<&Location>, message: impl Into<String>) {
        self.push(Severity::Debug, location, message);
    }

    fn push(&mut self, severity: Severity, location: Option<&Location>, message: impl Into<String>) {
        if severity == Severity::Error {
            self.has_errored = true;
        }
        self.diagnostics
            .push(Diagnostic::new(severity, location.cloned(), message));
    }

    /// Sticky: once an error has been recorded this never resets.
    pub fn has_errored(&self) -> bool {
        self.has_errored
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    fn visible(&self, diag: &Diagnostic) -> bool {
        match diag.severity {
            Severity::Debug => self.debug,
            Severity::Message => !self.quiet,
            _ => true,
        }
    }

    /// Render every visible diagnostic, one block per diagnostic.
    pub fn render_text(&self, use_color: bool) -> String {
        let mut out = String::new();
        for diag in self.diagnostics.iter().filter(|d| self.visible(d)) {
            out.push_str(&diag.format_with_context(None, use_color));
            out.push('\n');
        }
        out
    }

    pub fn to_json(&self) -> serde_json::Value {
        let diagnostics: Vec<serde_json::Value> = self
            .diagnostics
            .iter()
            .filter(|d| self.visible(d))
            .map(Diagnostic::to_json)
            .collect();
        json!({
            "diagnostics": diagnostics,
            "errors": self.error_count(),
            "warnings": self.warning_count(),
        })
    }
}
