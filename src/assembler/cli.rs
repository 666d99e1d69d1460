// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Command-line interface parsing and argument validation.

use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

use crate::assembler::AsmConfig;
use crate::core::expr::parse_number;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const LONG_ABOUT: &str = "Event-script patch assembler.

Assembles an event script into a binary patch image. Offsets count from the
start of the image; labels and POIN parameters are address valued (offset
plus the base address, 0x08000000 by default). The output file is only
written when the run finished without errors.";

#[derive(Parser, Debug)]
#[command(
    name = "patchforge",
    version = VERSION,
    about = "Event-script assembler producing binary patch images",
    long_about = LONG_ABOUT
)]
pub struct Cli {
    #[arg(
        value_name = "SCRIPT",
        long_help = "Input event script. Included files are resolved relative to the including file, then the working directory, then --dist."
    )]
    pub input: PathBuf,
    #[arg(
        short = 'o',
        long = "output",
        value_name = "FILE",
        long_help = "Output image file. Defaults to the input base name with a .bin extension."
    )]
    pub output: Option<PathBuf>,
    #[arg(
        long = "patch",
        value_name = "IMAGE",
        long_help = "Existing image the assembled bytes are overlaid onto. Without it the output starts from an empty, zero-filled image."
    )]
    pub patch: Option<PathBuf>,
    #[arg(
        long = "base",
        value_name = "ADDR",
        long_help = "Address of offset zero (decimal, 0x or $ hex). Defaults to 0x08000000."
    )]
    pub base: Option<String>,
    #[arg(
        long = "size",
        value_name = "BYTES",
        long_help = "Maximum output image size (decimal, 0x or $ hex). Defaults to 0x02000000."
    )]
    pub size: Option<String>,
    #[arg(
        long = "raws",
        value_name = "FILE",
        long_help = "JSON file with additional raw code templates, merged over the built-in BYTE/SHORT/WORD/POIN set."
    )]
    pub raws: Option<PathBuf>,
    #[arg(
        long = "dist",
        value_name = "DIR",
        long_help = "Distribution directory searched last when resolving include paths."
    )]
    pub dist: Option<PathBuf>,
    #[arg(
        long = "format",
        value_enum,
        default_value_t = OutputFormat::Text,
        long_help = "Diagnostics output format. text is default; json emits one machine-readable object."
    )]
    pub format: OutputFormat,
    #[arg(
        short = 'q',
        long = "quiet",
        action = ArgAction::SetTrue,
        long_help = "Suppress the success summary. Warnings and errors are still reported."
    )]
    pub quiet: bool,
    #[arg(
        long = "Werror",
        action = ArgAction::SetTrue,
        long_help = "Treat warnings as errors (non-zero exit status, no output written)."
    )]
    pub warn_error: bool,
    #[arg(
        long = "debug",
        action = ArgAction::SetTrue,
        long_help = "Include debug-level diagnostics in the output."
    )]
    pub debug: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl Cli {
    /// Build the run configuration, validating numeric overrides.
    pub fn to_config(&self) -> Result<AsmConfig, String> {
        let mut config = AsmConfig::default();
        if let Some(base) = &self.base {
            config.base_address =
                parse_number(base).ok_or_else(|| format!("invalid --base value: {base}"))?;
        }
        if let Some(size) = &self.size {
            let size =
                parse_number(size).ok_or_else(|| format!("invalid --size value: {size}"))?;
            if size <= 0 {
                return Err(format!("--size must be positive, got {size}"));
            }
            config.maximum_binary_size = size;
        }
        config.warnings_as_errors = self.warn_error;
        config.debug_log = self.debug;
        config.distribution_dir = self.dist.clone();
        Ok(config)
    }

    pub fn output_path(&self) -> PathBuf {
        match &self.output {
            Some(path) => path.clone(),
            None => self.input.with_extension("bin"),
        }
    }
}
