// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// CLI entrypoint for patchforge.

use std::fs;
use std::process::ExitCode;

use clap::Parser;

use patchforge::assembler::cli::{Cli, OutputFormat};
use patchforge::assembler::engine::Engine;
use patchforge::assembler::output::PatchImage;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match cli.to_config() {
        Ok(config) => config,
        Err(message) => {
            eprintln!("ERROR: {message}");
            return ExitCode::from(2);
        }
    };

    let mut engine = Engine::new(config);
    if let Some(path) = &cli.raws {
        let loaded = fs::read_to_string(path)
            .map_err(|err| err.to_string())
            .and_then(|text| engine.raws_mut().load_json(&text));
        if let Err(err) = loaded {
            eprintln!("ERROR: bad raws file {}: {err}", path.display());
            return ExitCode::from(2);
        }
    }

    engine.assemble_file(&cli.input);
    let mut image = PatchImage::new();
    let committed = engine.finalize(&mut image);

    match cli.format {
        OutputFormat::Text => eprint!("{}", engine.log().render_text(false)),
        OutputFormat::Json => println!("{}", engine.log().to_json()),
    }
    if !committed {
        return ExitCode::FAILURE;
    }

    let output = cli.output_path();
    if let Err(err) = image.write_bin_file(&output, cli.patch.as_deref()) {
        eprintln!("ERROR: could not write {}: {err}", output.display());
        return ExitCode::FAILURE;
    }
    if !cli.quiet && cli.format == OutputFormat::Text {
        println!(
            "wrote {} byte(s) to {}",
            image.num_bytes(),
            output.display()
        );
    }
    ExitCode::SUCCESS
}
