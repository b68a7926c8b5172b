//! # delink-analysis
//!
//! The delinking engine. Given one fully linked executable loaded into the
//! object model, it recovers the information linking destroyed — function
//! boundaries, address-dependent references, per-file symbol grouping —
//! and reassembles it into independent relocatable objects:
//!
//! 1. [`reconstruct::reconstruct_symbols`] synthesizes function symbols
//!    from the raw instruction stream when no symbol table survives.
//! 2. [`relocate::build_relocations`] turns absolute operands back into
//!    symbol + offset relocation records.
//! 3. [`split`] groups symbols by source file and assembles one output
//!    object per file, compacting each text image with [`compact`].
//!
//! [`pipeline::delink_file`] sequences the whole run.

pub mod compact;
pub mod error;
pub mod pipeline;
pub mod reconstruct;
pub mod relocate;
pub mod split;

pub use compact::{check_function_sequence, compact_functions};
pub use error::DelinkError;
pub use pipeline::{delink_file, delink_object, Config, FileFailure, Summary};
pub use reconstruct::reconstruct_symbols;
pub use relocate::build_relocations;

use delink_core::{Format, Object, Section};
use delink_disasm::{Mode, X86Decoder};

/// Name of the code section both scan passes require.
pub const TEXT_SECTION: &str = ".text";

/// Canonical name of the program entry point after reconstruction.
pub const ENTRY_SYMBOL: &str = "main";

/// Finds the text section or fails with `NoTextSection`.
pub(crate) fn text_section(obj: &Object) -> Result<&Section, DelinkError> {
    obj.section_by_name(TEXT_SECTION)
        .ok_or(DelinkError::NoTextSection(TEXT_SECTION))
}

/// Opens a decode session sized for the object's container type.
pub(crate) fn open_decoder(obj: &Object) -> Result<X86Decoder, DelinkError> {
    let mode = match obj.format() {
        Format::Elf32 | Format::Pe32 => Mode::Bits32,
        Format::Elf64 => Mode::Bits64,
        Format::None => {
            return Err(DelinkError::BadFormat(
                "no container type declared".to_string(),
            ))
        }
    };
    X86Decoder::open(mode).map_err(DelinkError::DecoderInitFailed)
}
