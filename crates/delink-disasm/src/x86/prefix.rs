//! Legacy and REX prefix parsing.

use crate::Mode;

/// A parsed REX prefix.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rex {
    /// 64-bit operand size.
    pub w: bool,
    /// ModRM.reg extension.
    pub r: bool,
    /// SIB.index extension.
    pub x: bool,
    /// ModRM.rm / SIB.base extension.
    pub b: bool,
}

impl Rex {
    fn from_byte(byte: u8) -> Self {
        Self {
            w: byte & 0x8 != 0,
            r: byte & 0x4 != 0,
            x: byte & 0x2 != 0,
            b: byte & 0x1 != 0,
        }
    }
}

/// Prefixes collected before the opcode byte.
#[derive(Debug, Clone, Copy, Default)]
pub struct Prefixes {
    /// 0x66 operand-size override.
    pub operand_size: bool,
    /// 0x67 address-size override.
    pub address_size: bool,
    /// 0xF3 rep/repe.
    pub rep: bool,
    /// 0xF2 repne.
    pub repne: bool,
    /// 0xF0 lock.
    pub lock: bool,
    /// Segment override (raw prefix byte).
    pub segment: Option<u8>,
    /// REX prefix (long mode only).
    pub rex: Option<Rex>,
}

impl Prefixes {
    /// Scans prefixes at the start of `bytes`, returning the parsed set and
    /// the number of bytes consumed.
    pub fn parse(bytes: &[u8], mode: Mode) -> (Self, usize) {
        let mut prefixes = Self::default();
        let mut offset = 0;

        while offset < bytes.len() {
            match bytes[offset] {
                0x66 => prefixes.operand_size = true,
                0x67 => prefixes.address_size = true,
                0xF0 => prefixes.lock = true,
                0xF2 => prefixes.repne = true,
                0xF3 => prefixes.rep = true,
                b @ (0x26 | 0x2E | 0x36 | 0x3E | 0x64 | 0x65) => prefixes.segment = Some(b),
                _ => break,
            }
            offset += 1;
        }

        // REX must be the last prefix before the opcode.
        if mode.is_64() && offset < bytes.len() && (0x40..=0x4F).contains(&bytes[offset]) {
            prefixes.rex = Some(Rex::from_byte(bytes[offset]));
            offset += 1;
        }

        (prefixes, offset)
    }

    /// Effective non-byte operand width in bits.
    pub fn operand_bits(&self, mode: Mode) -> u16 {
        if mode.is_64() && self.rex.map(|r| r.w).unwrap_or(false) {
            64
        } else if self.operand_size {
            16
        } else {
            32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rex_only_in_long_mode() {
        let (p, n) = Prefixes::parse(&[0x48, 0x89], Mode::Bits64);
        assert_eq!(n, 1);
        assert!(p.rex.unwrap().w);

        let (p, n) = Prefixes::parse(&[0x48, 0x89], Mode::Bits32);
        assert_eq!(n, 0);
        assert!(p.rex.is_none());
    }

    #[test]
    fn legacy_prefixes_accumulate() {
        let (p, n) = Prefixes::parse(&[0x66, 0x2E, 0x8B], Mode::Bits32);
        assert_eq!(n, 2);
        assert!(p.operand_size);
        assert_eq!(p.segment, Some(0x2E));
        assert_eq!(p.operand_bits(Mode::Bits32), 16);
    }
}
