//! ModRM/SIB/displacement decoding.

use super::prefix::Prefixes;
use crate::Mode;
use delink_core::{MemoryRef, Operand, Register};

/// A split ModRM byte. `reg` and the memory fields are extended by REX at
/// use sites, not here, since the extension bit differs per field.
#[derive(Debug, Clone, Copy)]
pub struct ModRM {
    /// Addressing mode (0-3).
    pub md: u8,
    /// Register / opcode-extension field (unextended, 0-7).
    pub reg: u8,
    /// Register/memory field (unextended, 0-7).
    pub rm: u8,
}

impl ModRM {
    /// Splits a raw ModRM byte.
    pub fn parse(byte: u8) -> Self {
        Self {
            md: byte >> 6,
            reg: (byte >> 3) & 0x7,
            rm: byte & 0x7,
        }
    }
}

/// Decodes a general-purpose register by encoding-order id.
pub fn decode_gpr(id: u8, bits: u16) -> Register {
    Register::gp(id, bits)
}

/// Decodes the `reg` field of a ModRM byte as a register operand.
pub fn decode_modrm_reg(modrm: ModRM, prefixes: &Prefixes, bits: u16) -> Operand {
    let ext = prefixes.rex.map(|r| (r.r as u8) << 3).unwrap_or(0);
    Operand::Register(decode_gpr(modrm.reg | ext, bits))
}

/// Decodes the `rm` side of a ModRM byte.
///
/// `bytes` starts immediately after the ModRM byte. Returns the operand and
/// the number of bytes consumed past the ModRM byte, or `None` when the
/// buffer is too short.
pub fn decode_modrm_rm(
    bytes: &[u8],
    modrm: ModRM,
    prefixes: &Prefixes,
    mode: Mode,
    bits: u16,
) -> Option<(Operand, usize)> {
    let rex_b = prefixes.rex.map(|r| (r.b as u8) << 3).unwrap_or(0);
    let rex_x = prefixes.rex.map(|r| (r.x as u8) << 3).unwrap_or(0);
    let access = (bits / 8) as u8;

    if modrm.md == 3 {
        return Some((Operand::Register(decode_gpr(modrm.rm | rex_b, bits)), 0));
    }

    let addr_bits: u16 = if mode.is_64() { 64 } else { 32 };
    let mut consumed = 0;

    let (base, index, scale, disp_is_abs) = if modrm.rm == 4 {
        // SIB byte follows.
        let sib = *bytes.first()?;
        consumed += 1;
        let scale = 1u8 << (sib >> 6);
        let index_raw = (sib >> 3) & 0x7;
        let base_raw = sib & 0x7;

        let index = if index_raw == 4 && rex_x == 0 {
            None
        } else {
            Some(decode_gpr(index_raw | rex_x, addr_bits))
        };
        // base 101 with mod 00 means disp32, no base register
        let base = if base_raw == 5 && modrm.md == 0 {
            None
        } else {
            Some(decode_gpr(base_raw | rex_b, addr_bits))
        };
        (base, index, scale, base_raw == 5 && modrm.md == 0)
    } else if modrm.rm == 5 && modrm.md == 0 {
        // disp32: absolute in 32-bit mode, RIP-relative in long mode.
        if mode.is_64() {
            (Some(Register::rip(64)), None, 1, true)
        } else {
            (None, None, 1, true)
        }
    } else {
        (Some(decode_gpr(modrm.rm | rex_b, addr_bits)), None, 1, false)
    };

    let displacement = match modrm.md {
        0 if disp_is_abs => {
            let d = read_i32(&bytes[consumed..])?;
            consumed += 4;
            d as i64
        }
        0 => 0,
        1 => {
            let d = *bytes.get(consumed)? as i8;
            consumed += 1;
            d as i64
        }
        _ => {
            let d = read_i32(&bytes[consumed..])?;
            consumed += 4;
            d as i64
        }
    };

    Some((
        Operand::Memory(MemoryRef::sib(base, index, scale, displacement, access)),
        consumed,
    ))
}

fn read_i32(bytes: &[u8]) -> Option<i32> {
    Some(i32::from_le_bytes([
        *bytes.first()?,
        *bytes.get(1)?,
        *bytes.get(2)?,
        *bytes.get(3)?,
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_register_form() {
        // mod=11 rm=000 -> eax
        let modrm = ModRM::parse(0xC0);
        let (op, n) = decode_modrm_rm(&[], modrm, &Prefixes::default(), Mode::Bits32, 32).unwrap();
        assert_eq!(n, 0);
        assert_eq!(op, Operand::Register(Register::gp(0, 32)));
    }

    #[test]
    fn absolute_disp32_in_32bit_mode() {
        // mod=00 rm=101 disp32
        let modrm = ModRM::parse(0x05);
        let (op, n) = decode_modrm_rm(
            &[0x34, 0x80, 0x40, 0x00],
            modrm,
            &Prefixes::default(),
            Mode::Bits32,
            32,
        )
        .unwrap();
        assert_eq!(n, 4);
        match op {
            Operand::Memory(m) => {
                assert!(m.base.is_none());
                assert_eq!(m.displacement, 0x408034);
            }
            other => panic!("expected memory operand, got {:?}", other),
        }
    }

    #[test]
    fn rip_relative_in_long_mode() {
        let modrm = ModRM::parse(0x05);
        let (op, _) = decode_modrm_rm(
            &[0x10, 0x00, 0x00, 0x00],
            modrm,
            &Prefixes::default(),
            Mode::Bits64,
            64,
        )
        .unwrap();
        match op {
            Operand::Memory(m) => {
                assert_eq!(m.base, Some(Register::rip(64)));
                assert_eq!(m.displacement, 0x10);
            }
            other => panic!("expected memory operand, got {:?}", other),
        }
    }

    #[test]
    fn sib_base_and_index() {
        // mod=00 rm=100, sib = scale 4, index ecx, base ebx -> [ebx + ecx*4]
        let modrm = ModRM::parse(0x04);
        let (op, n) = decode_modrm_rm(&[0x8B], modrm, &Prefixes::default(), Mode::Bits32, 32).unwrap();
        assert_eq!(n, 1);
        match op {
            Operand::Memory(m) => {
                assert_eq!(m.base, Some(Register::gp(3, 32)));
                assert_eq!(m.index, Some(Register::gp(1, 32)));
                assert_eq!(m.scale, 4);
            }
            other => panic!("expected memory operand, got {:?}", other),
        }
    }
}
