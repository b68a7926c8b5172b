//! The delinker's error taxonomy.
//!
//! Structural failures (missing sections, unusable containers, decoder
//! setup) abort a run; `OverlapDetected`/`NonlinearSymbols` abort the
//! output file being assembled when they surface during splitting.

use delink_disasm::DecodeError;
use delink_formats::{ParseError, WriteError};
use thiserror::Error;

/// Error type for the delinking pipeline.
#[derive(Error, Debug)]
pub enum DelinkError {
    /// The input file could not be opened.
    #[error("cannot open input file {path:?}: {source}")]
    BadFile {
        path: String,
        source: std::io::Error,
    },

    /// The input container is unrecognized, corrupt, or has no decodable
    /// word size.
    #[error("unhandled input file format: {0}")]
    BadFormat(String),

    /// The input has no symbols and reconstruction was not requested.
    #[error("no symbols found (reconstruction not requested)")]
    NoSymbols,

    /// Symbol reconstruction recovered nothing.
    #[error("no symbols found even after reconstruction; the code section may be empty")]
    NoSymbolsAfterReconstruct,

    /// The code section is absent.
    #[error("cannot find {0:?} section")]
    NoTextSection(&'static str),

    /// Reserved for import-stub handling.
    #[error("cannot find PLT section")]
    NoPltSection,

    /// The instruction decoder could not be instantiated.
    #[error("failed to initialize instruction decoder: {0}")]
    DecoderInitFailed(DecodeError),

    /// Function extents overlap.
    #[error("overlap detected at {address:#x}")]
    OverlapDetected { address: u64 },

    /// Function sequence is non-linear; relocations cannot be rebased.
    #[error("non-linearity detected in function sequence at {address:#x}")]
    NonlinearSymbols { address: u64 },

    /// A function's byte range escapes its section buffer.
    #[error("function {name:?} at {address:#x}+{size:#x} is outside its section")]
    FunctionOutOfBounds { name: String, address: u64, size: u64 },

    /// Serialization of an output object failed.
    #[error("cannot write output object: {0}")]
    Write(#[from] WriteError),
}

impl DelinkError {
    /// Maps a read-side failure onto the taxonomy.
    pub fn from_parse(path: &str, err: ParseError) -> Self {
        match err {
            ParseError::Io(source) => Self::BadFile {
                path: path.to_string(),
                source,
            },
            other => Self::BadFormat(other.to_string()),
        }
    }

    /// Process exit code for this failure kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::BadFile { .. } => 1,
            Self::BadFormat(_) => 2,
            Self::NoSymbols => 3,
            Self::NoSymbolsAfterReconstruct => 4,
            Self::NoTextSection(_) => 5,
            Self::NoPltSection => 6,
            Self::DecoderInitFailed(_) => 7,
            Self::OverlapDetected { .. } | Self::NonlinearSymbols { .. } => 8,
            Self::FunctionOutOfBounds { .. } => 9,
            Self::Write(_) => 10,
        }
    }
}
