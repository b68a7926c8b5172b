//! # delink-disasm
//!
//! Sequential x86 disassembly for the delinking engine. The decoder is an
//! oracle: given a byte buffer and a starting address it produces one
//! decoded instruction at a time, reporting the consumed length, the
//! operand shapes, and whether the instruction belongs to the return group.
//!
//! Coverage is deliberately focused on the instruction rows the delinking
//! heuristics traverse (data movement, branches, returns, padding, and the
//! common ALU/stack rows between them) rather than the full opcode space.

pub mod error;
pub mod traits;
pub mod x86;

pub use error::DecodeError;
pub use traits::{DecodedInstruction, Decoder};
pub use x86::X86Decoder;

/// Decoder word size, selected from the container type of the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// 32-bit protected mode.
    Bits32,
    /// 64-bit long mode.
    Bits64,
}

impl Mode {
    /// Returns true in long mode.
    pub fn is_64(&self) -> bool {
        matches!(self, Mode::Bits64)
    }
}
