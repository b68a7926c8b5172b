//! Architecture-agnostic decoded-instruction representation.

use crate::Operand;

/// A decoded instruction.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Instruction {
    /// Address of the first byte.
    pub address: u64,
    /// Encoded length in bytes.
    pub size: usize,
    /// Mnemonic, e.g. "mov", "call".
    pub mnemonic: String,
    /// Operation class.
    pub operation: Operation,
    /// Operands, destination first.
    pub operands: Vec<Operand>,
}

impl Instruction {
    /// Creates a new instruction.
    pub fn new(address: u64, size: usize, mnemonic: impl Into<String>, operation: Operation) -> Self {
        Self {
            address,
            size,
            mnemonic: mnemonic.into(),
            operation,
            operands: Vec::new(),
        }
    }

    /// Adds an operand.
    pub fn with_operand(mut self, op: Operand) -> Self {
        self.operands.push(op);
        self
    }

    /// Sets all operands.
    pub fn with_operands(mut self, ops: Vec<Operand>) -> Self {
        self.operands = ops;
        self
    }

    /// Address of the byte after this instruction.
    pub fn end_address(&self) -> u64 {
        self.address + self.size as u64
    }

    /// Returns true if this instruction belongs to the return group.
    pub fn is_return(&self) -> bool {
        matches!(self.operation, Operation::Return)
    }

    /// Returns true if this instruction is inter-function filler
    /// (no-op or trap padding).
    pub fn is_filler(&self) -> bool {
        matches!(self.operation, Operation::Nop | Operation::Trap)
    }

    /// Returns true if this instruction moves data (the mov family).
    pub fn is_data_move(&self) -> bool {
        matches!(self.operation, Operation::Move)
    }

    /// Returns true if this is an unconditional jump or call.
    pub fn is_jump_or_call(&self) -> bool {
        matches!(self.operation, Operation::Jump | Operation::Call)
    }
}

/// Operation class. The delinking heuristics only distinguish a handful of
/// classes; everything else decodes as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Operation {
    /// The mov family (mov/movabs in any addressing form).
    Move,
    /// Load effective address.
    Lea,
    /// Push to stack.
    Push,
    /// Pop from stack.
    Pop,
    /// Unconditional jump.
    Jump,
    /// Conditional jump.
    ConditionalJump,
    /// Call.
    Call,
    /// Return (ret/retf, with or without immediate).
    Return,
    /// One-byte no-op and multi-byte nop forms.
    Nop,
    /// Breakpoint trap (int3) used as padding.
    Trap,
    /// Software interrupt with vector operand.
    Interrupt,
    /// Halt.
    Halt,
    /// Anything else the decoder recognizes but the engine does not
    /// classify further.
    Other,
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#010x}:  {}", self.address, self.mnemonic)
    }
}
