//! Decoder traits.

use crate::{DecodeError, Mode};
use delink_core::Instruction;

/// Result of decoding one instruction.
#[derive(Debug, Clone)]
pub struct DecodedInstruction {
    /// The decoded instruction.
    pub instruction: Instruction,
    /// Number of bytes consumed.
    pub size: usize,
}

/// A sequential instruction decoder.
pub trait Decoder {
    /// Decodes a single instruction starting at the given address.
    ///
    /// `bytes` is the remaining buffer; `address` is the virtual address of
    /// its first byte.
    fn decode_instruction(&self, bytes: &[u8], address: u64)
        -> Result<DecodedInstruction, DecodeError>;

    /// Returns the decode mode of this session.
    fn mode(&self) -> Mode;
}
