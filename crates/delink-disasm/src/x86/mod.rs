//! x86 decoding for 32- and 64-bit modes.

mod decoder;
mod modrm;
mod prefix;

pub use decoder::X86Decoder;
pub use modrm::{decode_gpr, decode_modrm_reg, decode_modrm_rm, ModRM};
pub use prefix::{Prefixes, Rex};
