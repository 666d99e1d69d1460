// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Include path resolution and tool-include subprocess invocation.

use std::path::{Path, PathBuf};
use std::process::Command;

/// Resolves include paths against a fixed search order: the directory of
/// the including file, the process working directory, then the
/// distribution directory when configured.
pub struct FileSearcher {
    distribution_dir: Option<PathBuf>,
}

impl FileSearcher {
    pub fn new(distribution_dir: Option<PathBuf>) -> Self {
        Self { distribution_dir }
    }

    pub fn find(&self, including_file: &Path, request: &str) -> Option<PathBuf> {
        let mut candidates = Vec::new();
        if let Some(dir) = including_file.parent() {
            candidates.push(dir.join(request));
        }
        if let Ok(cwd) = std::env::current_dir() {
            candidates.push(cwd.join(request));
        }
        if let Some(dist) = &self.distribution_dir {
            candidates.push(dist.join(request));
        }
        candidates.into_iter().find(|path| path.is_file())
    }

    /// Run an external helper tool and capture its stdout.
    ///
    /// The tool fails the directive when it exits unsuccessfully, writes
    /// anything to stderr, or prefixes its stdout with `ERROR: `.
    pub fn run_tool(
        &self,
        including_file: &Path,
        tool: &str,
        args: &[String],
    ) -> Result<Vec<u8>, String> {
        let program = self
            .find(including_file, tool)
            .unwrap_or_else(|| PathBuf::from(tool));
        let output = Command::new(&program)
            .args(args)
            .output()
            .map_err(|err| format!("Could not run {}: {err}", program.display()))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            return Err(format!("{tool}: {}", stderr.trim()));
        }
        if output.stdout.starts_with(b"ERROR: ") {
            let line = String::from_utf8_lossy(&output.stdout);
            return Err(format!("{tool}: {}", line.lines().next().unwrap_or("").trim()));
        }
        if !output.status.success() {
            return Err(format!("{tool}: exited with {}", output.status));
        }
        Ok(output.stdout)
    }
}
