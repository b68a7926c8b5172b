//! delink - performs the opposite action to `ld`.
//!
//! Accepts a linked executable as input and writes out a set of `.o`
//! files that can be relinked. Function boundaries, relocations and
//! per-file grouping are recovered heuristically; see the library crates
//! for the actual engine.

use anyhow::{Context, Result};
use clap::Parser;
use delink_analysis::{delink_file, Config, DelinkError};
use delink_core::Format;
use std::path::{Path, PathBuf};

const SUPPORTED_TARGETS: [(&str, Format); 3] = [
    ("elf32", Format::Elf32),
    ("elf64", Format::Elf64),
    ("pe32", Format::Pe32),
];

#[derive(Parser)]
#[command(name = "delink")]
#[command(about = "Reverses static linking: accepts a binary executable as input and \
creates a set of .o files that can be relinked", long_about = None)]
struct Cli {
    /// Path to the input executable
    input: PathBuf,

    /// Output container type: elf32, elf64 or pe32 (default: inherit from input)
    #[arg(short = 'O', long = "output-target", value_parser = parse_target)]
    output_target: Option<Format>,

    /// Reconstruct symbols from the instruction stream, even when the
    /// input carries a symbol table
    #[arg(short = 'R', long = "reconstruct-symbols")]
    reconstruct_symbols: bool,
}

fn parse_target(value: &str) -> Result<Format, String> {
    SUPPORTED_TARGETS
        .iter()
        .find(|(name, _)| *name == value)
        .map(|(_, format)| *format)
        .ok_or_else(|| {
            let names: Vec<&str> = SUPPORTED_TARGETS.iter().map(|(n, _)| *n).collect();
            format!("unknown target {:?}; supported targets: {}", value, names.join(", "))
        })
}

fn main() {
    let cli = Cli::parse();

    let config = Config {
        reconstruct_symbols: cli.reconstruct_symbols,
        output_target: cli.output_target,
        ..Config::default()
    };

    match run(&cli.input, &config) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("delink: {:#}", err);
            if let Some(delink) = err.downcast_ref::<DelinkError>() {
                if matches!(delink, DelinkError::NoSymbols) {
                    eprintln!("delink: try again with --reconstruct-symbols");
                }
                std::process::exit(delink.exit_code());
            }
            std::process::exit(1);
        }
    }
}

fn run(input: &Path, config: &Config) -> Result<i32> {
    let summary = delink_file(input, config, Path::new("."))
        .map_err(anyhow::Error::from)
        .with_context(|| format!("cannot delink {}", input.display()))?;

    for path in &summary.outputs {
        println!("wrote {}", path.display());
    }

    if summary.failures.is_empty() {
        Ok(0)
    } else {
        for failure in &summary.failures {
            eprintln!("delink: {}: {}", failure.file, failure.error);
        }
        Ok(summary.failures[0].error.exit_code())
    }
}
