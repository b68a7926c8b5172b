//! Error types for container parsing and serialization.

use thiserror::Error;

/// Error type for reading a binary container.
#[derive(Error, Debug)]
pub enum ParseError {
    /// Magic bytes did not match any supported container.
    #[error("unrecognized container format")]
    UnknownFormat,

    /// File is too short to contain required data.
    #[error("file too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    /// Truncated data while parsing a structure.
    #[error("truncated data while parsing {context}: expected {expected} bytes, got {actual}")]
    TruncatedData {
        expected: usize,
        actual: usize,
        context: &'static str,
    },

    /// Invalid value encountered during parsing.
    #[error("invalid value: {0}")]
    InvalidValue(&'static str),

    /// Container is recognized but not supported by this tool.
    #[error("unsupported container: {0}")]
    Unsupported(&'static str),

    /// Invalid structure at a file offset.
    #[error("invalid {kind} at offset {offset:#x}: {reason}")]
    InvalidStructure {
        kind: &'static str,
        offset: u64,
        reason: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ParseError {
    /// Creates a new TooShort error.
    pub fn too_short(expected: usize, actual: usize) -> Self {
        Self::TooShort { expected, actual }
    }

    /// Creates a new TruncatedData error.
    pub fn truncated(expected: usize, actual: usize, context: &'static str) -> Self {
        Self::TruncatedData {
            expected,
            actual,
            context,
        }
    }
}

/// Error type for writing a binary container.
#[derive(Error, Debug)]
pub enum WriteError {
    /// The object's declared container type cannot be written.
    #[error("cannot write container type {0}")]
    UnsupportedFormat(&'static str),

    /// A relocation references a symbol missing from the symbol table.
    #[error("relocation at {offset:#x} references unknown symbol {symbol:?}")]
    DanglingRelocation { offset: u64, symbol: String },

    /// A relocation offset falls outside its section's contents.
    #[error("relocation at {offset:#x} is outside section {section:?}")]
    RelocationOutOfRange { offset: u64, section: String },

    /// A section required for serialization is absent.
    #[error("section {0:?} required for serialization is missing")]
    MissingSection(&'static str),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
