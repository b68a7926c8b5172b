//! The delinking pipeline.
//!
//! Sequences one run over one input: load, ensure symbols exist (optionally
//! reconstructing them), build relocations, sort, then split into per-file
//! outputs. Structural failures abort the whole run; failures while
//! assembling one output file are collected in the summary so the
//! remaining files still split.

use crate::error::DelinkError;
use crate::{build_relocations, reconstruct_symbols, split};
use delink_core::{Format, Object};
use delink_formats::read_object;
use std::path::{Path, PathBuf};

/// Pipeline configuration, passed explicitly so runs with different
/// settings can share a process.
#[derive(Debug, Clone)]
pub struct Config {
    /// Run the symbol reconstructor even when input symbols exist.
    /// Without it, an input with zero symbols is a hard failure.
    pub reconstruct_symbols: bool,
    /// Count trailing inter-function padding into the preceding
    /// function's size during reconstruction.
    pub preserve_padding: bool,
    /// Container type for outputs; `None` inherits the input's type.
    pub output_target: Option<Format>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reconstruct_symbols: false,
            preserve_padding: true,
            output_target: None,
        }
    }
}

/// One output file that could not be assembled.
#[derive(Debug)]
pub struct FileFailure {
    /// Output filename.
    pub file: String,
    /// What went wrong.
    pub error: DelinkError,
}

/// Result of a delinking run.
#[derive(Debug, Default)]
pub struct Summary {
    /// Output objects written, in creation order.
    pub outputs: Vec<PathBuf>,
    /// Output objects that failed, with their errors.
    pub failures: Vec<FileFailure>,
}

/// Delinks an already-loaded object, writing outputs into `out_dir`.
pub fn delink_object(
    obj: &mut Object,
    config: &Config,
    out_dir: &Path,
) -> Result<Summary, DelinkError> {
    if obj.symbol_count() == 0 && !config.reconstruct_symbols {
        return Err(DelinkError::NoSymbols);
    }
    if config.reconstruct_symbols {
        reconstruct_symbols(obj, config.preserve_padding)?;
    }

    // convert absolute operands into symbol references while the input's
    // address space is still intact
    build_relocations(obj)?;

    let output_target = config.output_target.unwrap_or(obj.format());

    // downstream passes need monotonic address order
    obj.sort_symbols();

    split::split_objects(obj, output_target, out_dir)
}

/// Delinks the binary at `input`, writing outputs into `out_dir`.
pub fn delink_file(input: &Path, config: &Config, out_dir: &Path) -> Result<Summary, DelinkError> {
    let mut obj = read_object(input)
        .map_err(|e| DelinkError::from_parse(&input.display().to_string(), e))?;
    delink_object(&mut obj, config, out_dir)
}
