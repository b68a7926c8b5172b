//! Instruction operand types.

use crate::Register;

/// An instruction operand.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Operand {
    /// Register operand.
    Register(Register),
    /// Immediate value.
    Immediate(Immediate),
    /// Memory reference.
    Memory(MemoryRef),
    /// PC-relative branch operand with the target already resolved against
    /// the instruction address.
    PcRelative {
        /// Resolved absolute target address.
        target: u64,
    },
}

impl Operand {
    /// Creates an immediate operand.
    pub fn imm(value: i64, size: u8) -> Self {
        Self::Immediate(Immediate { value, size })
    }

    /// Creates a register operand.
    pub fn reg(reg: Register) -> Self {
        Self::Register(reg)
    }

    /// Returns true if this is a register operand.
    pub fn is_register(&self) -> bool {
        matches!(self, Self::Register(_))
    }

    /// Returns true if this is an immediate operand.
    pub fn is_immediate(&self) -> bool {
        matches!(self, Self::Immediate(_))
    }

    /// Returns true if this is a memory operand.
    pub fn is_memory(&self) -> bool {
        matches!(self, Self::Memory(_))
    }
}

/// Immediate value operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Immediate {
    /// The value, sign-extended.
    pub value: i64,
    /// Original size in bits.
    pub size: u8,
}

impl Immediate {
    /// Returns the value as an unsigned address.
    pub fn as_u64(&self) -> u64 {
        self.value as u64
    }
}

/// Memory reference operand: `[base + index*scale + displacement]`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemoryRef {
    /// Base register, if any.
    pub base: Option<Register>,
    /// Index register, if any.
    pub index: Option<Register>,
    /// Scale factor for the index (1, 2, 4 or 8).
    pub scale: u8,
    /// Displacement.
    pub displacement: i64,
    /// Access size in bytes.
    pub size: u8,
}

impl MemoryRef {
    /// Creates a displacement-only (absolute) memory reference.
    pub fn absolute(address: i64, size: u8) -> Self {
        Self {
            base: None,
            index: None,
            scale: 1,
            displacement: address,
            size,
        }
    }

    /// Creates a base + displacement memory reference.
    pub fn base_disp(base: Register, displacement: i64, size: u8) -> Self {
        Self {
            base: Some(base),
            index: None,
            scale: 1,
            displacement,
            size,
        }
    }

    /// Creates a full SIB-style memory reference.
    pub fn sib(
        base: Option<Register>,
        index: Option<Register>,
        scale: u8,
        displacement: i64,
        size: u8,
    ) -> Self {
        Self {
            base,
            index,
            scale,
            displacement,
            size,
        }
    }
}
