// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Assembler layer: directive handling, interpreter state, line nodes,
//! raw layouts, text encodings, and the output image.

pub mod cli;
pub mod directives;
pub mod engine;
pub mod file_search;
pub mod interpreter;
pub mod lines;
pub mod output;
pub mod pool;
pub mod raws;
pub mod text_encoding;


use std::path::PathBuf;

/// Immutable run configuration, constructed once at startup and threaded
/// through every component that needs it.
#[derive(Debug, Clone)]
pub struct AsmConfig {
    /// Address of offset zero in the target image.
    pub base_address: i64,
    /// Exclusive upper bound on write offsets.
    pub maximum_binary_size: i64,
    pub warnings_as_errors: bool,
    pub debug_log: bool,
    /// Directory searched last when resolving include paths.
    pub distribution_dir: Option<PathBuf>,
}

impl Default for AsmConfig {
    fn default() -> Self {
        Self {
            base_address: 0x0800_0000,
            maximum_binary_size: 0x0200_0000,
            warnings_as_errors: false,
            debug_log: false,
            distribution_dir: None,
        }
    }
}
