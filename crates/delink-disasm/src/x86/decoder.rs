//! The x86 instruction decoder.

use super::modrm::{decode_gpr, decode_modrm_reg, decode_modrm_rm, ModRM};
use super::prefix::Prefixes;
use crate::error::DecodeError;
use crate::traits::{DecodedInstruction, Decoder};
use crate::Mode;
use delink_core::{Instruction, MemoryRef, Operand, Operation, Register};

const ALU_MNEMONICS: [&str; 8] = ["add", "or", "adc", "sbb", "and", "sub", "xor", "cmp"];
const SHIFT_MNEMONICS: [&str; 8] = ["rol", "ror", "rcl", "rcr", "shl", "shr", "sal", "sar"];
const GROUP3_MNEMONICS: [&str; 8] = ["test", "test", "not", "neg", "mul", "imul", "div", "idiv"];
const CC_SUFFIXES: [&str; 16] = [
    "o", "no", "b", "ae", "e", "ne", "be", "a", "s", "ns", "p", "np", "l", "ge", "le", "g",
];

/// An x86 decode session for a fixed word size.
pub struct X86Decoder {
    mode: Mode,
}

impl X86Decoder {
    /// Opens a decode session for the given mode.
    pub fn open(mode: Mode) -> Result<Self, DecodeError> {
        Ok(Self { mode })
    }

    fn mem_size(bits: u16) -> u8 {
        (bits / 8) as u8
    }
}

/// Cursor over the bytes of a single instruction.
struct Cursor<'a> {
    bytes: &'a [u8],
    offset: usize,
    address: u64,
}

impl<'a> Cursor<'a> {
    fn u8(&mut self) -> Result<u8, DecodeError> {
        let b = *self
            .bytes
            .get(self.offset)
            .ok_or_else(|| DecodeError::truncated(self.address, self.offset + 1, self.bytes.len()))?;
        self.offset += 1;
        Ok(b)
    }

    fn i8(&mut self) -> Result<i8, DecodeError> {
        Ok(self.u8()? as i8)
    }

    fn i16(&mut self) -> Result<i16, DecodeError> {
        let lo = self.u8()?;
        let hi = self.u8()?;
        Ok(i16::from_le_bytes([lo, hi]))
    }

    fn i32(&mut self) -> Result<i32, DecodeError> {
        let mut b = [0u8; 4];
        for slot in &mut b {
            *slot = self.u8()?;
        }
        Ok(i32::from_le_bytes(b))
    }

    fn i64(&mut self) -> Result<i64, DecodeError> {
        let mut b = [0u8; 8];
        for slot in &mut b {
            *slot = self.u8()?;
        }
        Ok(i64::from_le_bytes(b))
    }

    /// Reads an immediate of `bits` width, sign-extended.
    fn imm(&mut self, bits: u16) -> Result<i64, DecodeError> {
        Ok(match bits {
            8 => self.i8()? as i64,
            16 => self.i16()? as i64,
            32 => self.i32()? as i64,
            _ => self.i64()?,
        })
    }

    /// Parses the ModRM byte and its rm-side operand.
    fn modrm_rm(
        &mut self,
        prefixes: &Prefixes,
        mode: Mode,
        bits: u16,
    ) -> Result<(ModRM, Operand), DecodeError> {
        let modrm = ModRM::parse(self.u8()?);
        let (operand, consumed) =
            decode_modrm_rm(&self.bytes[self.offset..], modrm, prefixes, mode, bits)
                .ok_or_else(|| {
                    DecodeError::truncated(self.address, self.offset + 1, self.bytes.len())
                })?;
        self.offset += consumed;
        Ok((modrm, operand))
    }
}

impl Decoder for X86Decoder {
    fn decode_instruction(
        &self,
        bytes: &[u8],
        address: u64,
    ) -> Result<DecodedInstruction, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::truncated(address, 1, 0));
        }

        let (prefixes, prefix_len) = Prefixes::parse(bytes, self.mode);
        let mut cur = Cursor {
            bytes,
            offset: prefix_len,
            address,
        };
        let opcode = cur.u8()?;
        let bits = prefixes.operand_bits(self.mode);
        let mode = self.mode;

        let insn = match opcode {
            0x0F => self.decode_two_byte(&mut cur, &prefixes, address)?,

            // ALU rows: add/or/adc/sbb/and/sub/xor/cmp
            op if op < 0x40 && (op & 0x7) <= 0x5 => {
                let mnemonic = ALU_MNEMONICS[(op >> 3) as usize];
                let operands = match op & 0x7 {
                    0 => {
                        let (modrm, rm) = cur.modrm_rm(&prefixes, mode, 8)?;
                        vec![rm, decode_modrm_reg(modrm, &prefixes, 8)]
                    }
                    1 => {
                        let (modrm, rm) = cur.modrm_rm(&prefixes, mode, bits)?;
                        vec![rm, decode_modrm_reg(modrm, &prefixes, bits)]
                    }
                    2 => {
                        let (modrm, rm) = cur.modrm_rm(&prefixes, mode, 8)?;
                        vec![decode_modrm_reg(modrm, &prefixes, 8), rm]
                    }
                    3 => {
                        let (modrm, rm) = cur.modrm_rm(&prefixes, mode, bits)?;
                        vec![decode_modrm_reg(modrm, &prefixes, bits), rm]
                    }
                    4 => {
                        let imm = cur.imm(8)?;
                        vec![Operand::reg(Register::gp(0, 8)), Operand::imm(imm, 8)]
                    }
                    _ => {
                        let w = bits.min(32);
                        let imm = cur.imm(w)?;
                        vec![Operand::reg(Register::gp(0, bits)), Operand::imm(imm, w as u8)]
                    }
                };
                Instruction::new(address, 0, mnemonic, Operation::Other).with_operands(operands)
            }

            // inc/dec r32; in long mode this row is the REX prefix space
            0x40..=0x47 if !mode.is_64() => Instruction::new(address, 0, "inc", Operation::Other)
                .with_operand(Operand::reg(decode_gpr(opcode & 0x7, bits))),
            0x48..=0x4F if !mode.is_64() => Instruction::new(address, 0, "dec", Operation::Other)
                .with_operand(Operand::reg(decode_gpr(opcode & 0x7, bits))),

            0x50..=0x57 => {
                let ext = prefixes.rex.map(|r| (r.b as u8) << 3).unwrap_or(0);
                let w = if mode.is_64() { 64 } else { bits };
                Instruction::new(address, 0, "push", Operation::Push)
                    .with_operand(Operand::reg(decode_gpr((opcode & 0x7) | ext, w)))
            }
            0x58..=0x5F => {
                let ext = prefixes.rex.map(|r| (r.b as u8) << 3).unwrap_or(0);
                let w = if mode.is_64() { 64 } else { bits };
                Instruction::new(address, 0, "pop", Operation::Pop)
                    .with_operand(Operand::reg(decode_gpr((opcode & 0x7) | ext, w)))
            }

            0x63 if mode.is_64() => {
                let (modrm, rm) = cur.modrm_rm(&prefixes, mode, 32)?;
                Instruction::new(address, 0, "movsxd", Operation::Other)
                    .with_operand(decode_modrm_reg(modrm, &prefixes, 64))
                    .with_operand(rm)
            }

            0x68 => {
                let w = bits.min(32);
                let imm = cur.imm(w)?;
                Instruction::new(address, 0, "push", Operation::Push)
                    .with_operand(Operand::imm(imm, w as u8))
            }
            0x69 => {
                let (modrm, rm) = cur.modrm_rm(&prefixes, mode, bits)?;
                let w = bits.min(32);
                let imm = cur.imm(w)?;
                Instruction::new(address, 0, "imul", Operation::Other)
                    .with_operand(decode_modrm_reg(modrm, &prefixes, bits))
                    .with_operand(rm)
                    .with_operand(Operand::imm(imm, w as u8))
            }
            0x6A => {
                let imm = cur.imm(8)?;
                Instruction::new(address, 0, "push", Operation::Push)
                    .with_operand(Operand::imm(imm, 8))
            }
            0x6B => {
                let (modrm, rm) = cur.modrm_rm(&prefixes, mode, bits)?;
                let imm = cur.imm(8)?;
                Instruction::new(address, 0, "imul", Operation::Other)
                    .with_operand(decode_modrm_reg(modrm, &prefixes, bits))
                    .with_operand(rm)
                    .with_operand(Operand::imm(imm, 8))
            }

            // jcc rel8
            0x70..=0x7F => {
                let rel = cur.i8()? as i64;
                let target = (address as i64 + cur.offset as i64 + rel) as u64;
                let mnemonic = format!("j{}", CC_SUFFIXES[(opcode & 0xF) as usize]);
                Instruction::new(address, 0, mnemonic, Operation::ConditionalJump)
                    .with_operand(Operand::PcRelative { target })
            }

            // group 1: ALU rm, imm
            0x80 => {
                let (modrm, rm) = cur.modrm_rm(&prefixes, mode, 8)?;
                let imm = cur.imm(8)?;
                Instruction::new(address, 0, ALU_MNEMONICS[modrm.reg as usize], Operation::Other)
                    .with_operand(rm)
                    .with_operand(Operand::imm(imm, 8))
            }
            0x81 => {
                let (modrm, rm) = cur.modrm_rm(&prefixes, mode, bits)?;
                let w = bits.min(32);
                let imm = cur.imm(w)?;
                Instruction::new(address, 0, ALU_MNEMONICS[modrm.reg as usize], Operation::Other)
                    .with_operand(rm)
                    .with_operand(Operand::imm(imm, w as u8))
            }
            0x83 => {
                let (modrm, rm) = cur.modrm_rm(&prefixes, mode, bits)?;
                let imm = cur.imm(8)?;
                Instruction::new(address, 0, ALU_MNEMONICS[modrm.reg as usize], Operation::Other)
                    .with_operand(rm)
                    .with_operand(Operand::imm(imm, 8))
            }

            0x84 | 0x85 => {
                let w = if opcode == 0x84 { 8 } else { bits };
                let (modrm, rm) = cur.modrm_rm(&prefixes, mode, w)?;
                Instruction::new(address, 0, "test", Operation::Other)
                    .with_operand(rm)
                    .with_operand(decode_modrm_reg(modrm, &prefixes, w))
            }
            0x86 | 0x87 => {
                let w = if opcode == 0x86 { 8 } else { bits };
                let (modrm, rm) = cur.modrm_rm(&prefixes, mode, w)?;
                Instruction::new(address, 0, "xchg", Operation::Other)
                    .with_operand(rm)
                    .with_operand(decode_modrm_reg(modrm, &prefixes, w))
            }

            // mov rm, r / mov r, rm
            0x88 => {
                let (modrm, rm) = cur.modrm_rm(&prefixes, mode, 8)?;
                Instruction::new(address, 0, "mov", Operation::Move)
                    .with_operand(rm)
                    .with_operand(decode_modrm_reg(modrm, &prefixes, 8))
            }
            0x89 => {
                let (modrm, rm) = cur.modrm_rm(&prefixes, mode, bits)?;
                Instruction::new(address, 0, "mov", Operation::Move)
                    .with_operand(rm)
                    .with_operand(decode_modrm_reg(modrm, &prefixes, bits))
            }
            0x8A => {
                let (modrm, rm) = cur.modrm_rm(&prefixes, mode, 8)?;
                Instruction::new(address, 0, "mov", Operation::Move)
                    .with_operand(decode_modrm_reg(modrm, &prefixes, 8))
                    .with_operand(rm)
            }
            0x8B => {
                let (modrm, rm) = cur.modrm_rm(&prefixes, mode, bits)?;
                Instruction::new(address, 0, "mov", Operation::Move)
                    .with_operand(decode_modrm_reg(modrm, &prefixes, bits))
                    .with_operand(rm)
            }
            0x8C => {
                let (modrm, rm) = cur.modrm_rm(&prefixes, mode, 16)?;
                Instruction::new(address, 0, "mov", Operation::Move)
                    .with_operand(rm)
                    .with_operand(Operand::reg(Register::segment(modrm.reg)))
            }
            0x8D => {
                let (modrm, rm) = cur.modrm_rm(&prefixes, mode, bits)?;
                if !rm.is_memory() {
                    return Err(DecodeError::invalid_encoding(address, "lea with register source"));
                }
                Instruction::new(address, 0, "lea", Operation::Lea)
                    .with_operand(decode_modrm_reg(modrm, &prefixes, bits))
                    .with_operand(rm)
            }
            0x8E => {
                let (modrm, rm) = cur.modrm_rm(&prefixes, mode, 16)?;
                Instruction::new(address, 0, "mov", Operation::Move)
                    .with_operand(Operand::reg(Register::segment(modrm.reg)))
                    .with_operand(rm)
            }
            0x8F => {
                let (_, rm) = cur.modrm_rm(&prefixes, mode, bits)?;
                Instruction::new(address, 0, "pop", Operation::Pop).with_operand(rm)
            }

            0x90 => Instruction::new(address, 0, "nop", Operation::Nop),
            0x91..=0x97 => Instruction::new(address, 0, "xchg", Operation::Other)
                .with_operand(Operand::reg(Register::gp(0, bits)))
                .with_operand(Operand::reg(decode_gpr(opcode & 0x7, bits))),
            0x98 => Instruction::new(address, 0, "cwde", Operation::Other),
            0x99 => Instruction::new(address, 0, "cdq", Operation::Other),
            0x9C => Instruction::new(address, 0, "pushf", Operation::Push),
            0x9D => Instruction::new(address, 0, "popf", Operation::Pop),

            // mov accumulator <-> absolute address
            0xA0..=0xA3 => {
                let moffs = if mode.is_64() { cur.i64()? } else { cur.i32()? as i64 };
                let byte_form = opcode & 0x1 == 0;
                let w = if byte_form { 8 } else { bits };
                let mem = Operand::Memory(MemoryRef::absolute(moffs, Self::mem_size(w)));
                let acc = Operand::reg(Register::gp(0, w));
                let (dst, src) = if opcode < 0xA2 { (acc, mem) } else { (mem, acc) };
                Instruction::new(address, 0, "mov", Operation::Move)
                    .with_operand(dst)
                    .with_operand(src)
            }
            0xA4 => Instruction::new(address, 0, "movsb", Operation::Other),
            0xA5 => Instruction::new(address, 0, "movsd", Operation::Other),
            0xA6 => Instruction::new(address, 0, "cmpsb", Operation::Other),
            0xA7 => Instruction::new(address, 0, "cmpsd", Operation::Other),
            0xA8 => {
                let imm = cur.imm(8)?;
                Instruction::new(address, 0, "test", Operation::Other)
                    .with_operand(Operand::reg(Register::gp(0, 8)))
                    .with_operand(Operand::imm(imm, 8))
            }
            0xA9 => {
                let w = bits.min(32);
                let imm = cur.imm(w)?;
                Instruction::new(address, 0, "test", Operation::Other)
                    .with_operand(Operand::reg(Register::gp(0, bits)))
                    .with_operand(Operand::imm(imm, w as u8))
            }
            0xAA => Instruction::new(address, 0, "stosb", Operation::Other),
            0xAB => Instruction::new(address, 0, "stosd", Operation::Other),
            0xAC => Instruction::new(address, 0, "lodsb", Operation::Other),
            0xAD => Instruction::new(address, 0, "lodsd", Operation::Other),
            0xAE => Instruction::new(address, 0, "scasb", Operation::Other),
            0xAF => Instruction::new(address, 0, "scasd", Operation::Other),

            // mov r, imm
            0xB0..=0xB7 => {
                let ext = prefixes.rex.map(|r| (r.b as u8) << 3).unwrap_or(0);
                let imm = cur.imm(8)?;
                Instruction::new(address, 0, "mov", Operation::Move)
                    .with_operand(Operand::reg(decode_gpr((opcode & 0x7) | ext, 8)))
                    .with_operand(Operand::imm(imm, 8))
            }
            0xB8..=0xBF => {
                let ext = prefixes.rex.map(|r| (r.b as u8) << 3).unwrap_or(0);
                let imm = cur.imm(bits)?;
                let mnemonic = if bits == 64 { "movabs" } else { "mov" };
                Instruction::new(address, 0, mnemonic, Operation::Move)
                    .with_operand(Operand::reg(decode_gpr((opcode & 0x7) | ext, bits)))
                    .with_operand(Operand::imm(imm, bits as u8))
            }

            0xC0 | 0xC1 => {
                let w = if opcode == 0xC0 { 8 } else { bits };
                let (modrm, rm) = cur.modrm_rm(&prefixes, mode, w)?;
                let imm = cur.imm(8)?;
                Instruction::new(address, 0, SHIFT_MNEMONICS[modrm.reg as usize], Operation::Other)
                    .with_operand(rm)
                    .with_operand(Operand::imm(imm, 8))
            }
            0xC2 => {
                let imm = cur.imm(16)?;
                Instruction::new(address, 0, "ret", Operation::Return)
                    .with_operand(Operand::imm(imm, 16))
            }
            0xC3 => Instruction::new(address, 0, "ret", Operation::Return),
            0xC6 => {
                let (_, rm) = cur.modrm_rm(&prefixes, mode, 8)?;
                let imm = cur.imm(8)?;
                Instruction::new(address, 0, "mov", Operation::Move)
                    .with_operand(rm)
                    .with_operand(Operand::imm(imm, 8))
            }
            0xC7 => {
                let (_, rm) = cur.modrm_rm(&prefixes, mode, bits)?;
                let w = bits.min(32);
                let imm = cur.imm(w)?;
                Instruction::new(address, 0, "mov", Operation::Move)
                    .with_operand(rm)
                    .with_operand(Operand::imm(imm, w as u8))
            }
            0xC9 => Instruction::new(address, 0, "leave", Operation::Other),
            0xCA => {
                let imm = cur.imm(16)?;
                Instruction::new(address, 0, "retf", Operation::Return)
                    .with_operand(Operand::imm(imm, 16))
            }
            0xCB => Instruction::new(address, 0, "retf", Operation::Return),
            0xCC => Instruction::new(address, 0, "int3", Operation::Trap),
            0xCD => {
                let imm = cur.imm(8)?;
                Instruction::new(address, 0, "int", Operation::Interrupt)
                    .with_operand(Operand::imm(imm, 8))
            }

            0xD0..=0xD3 => {
                let w = if opcode & 0x1 == 0 { 8 } else { bits };
                let (modrm, rm) = cur.modrm_rm(&prefixes, mode, w)?;
                let count = if opcode < 0xD2 {
                    Operand::imm(1, 8)
                } else {
                    Operand::reg(Register::gp(1, 8))
                };
                Instruction::new(address, 0, SHIFT_MNEMONICS[modrm.reg as usize], Operation::Other)
                    .with_operand(rm)
                    .with_operand(count)
            }

            0xE8 => {
                let rel = cur.i32()? as i64;
                let target = (address as i64 + cur.offset as i64 + rel) as u64;
                Instruction::new(address, 0, "call", Operation::Call)
                    .with_operand(Operand::PcRelative { target })
            }
            0xE9 => {
                let rel = cur.i32()? as i64;
                let target = (address as i64 + cur.offset as i64 + rel) as u64;
                Instruction::new(address, 0, "jmp", Operation::Jump)
                    .with_operand(Operand::PcRelative { target })
            }
            0xEB => {
                let rel = cur.i8()? as i64;
                let target = (address as i64 + cur.offset as i64 + rel) as u64;
                Instruction::new(address, 0, "jmp", Operation::Jump)
                    .with_operand(Operand::PcRelative { target })
            }

            0xF4 => Instruction::new(address, 0, "hlt", Operation::Halt),
            0xF6 | 0xF7 => {
                let w = if opcode == 0xF6 { 8 } else { bits };
                let (modrm, rm) = cur.modrm_rm(&prefixes, mode, w)?;
                let mnemonic = GROUP3_MNEMONICS[modrm.reg as usize];
                let mut insn =
                    Instruction::new(address, 0, mnemonic, Operation::Other).with_operand(rm);
                if modrm.reg <= 1 {
                    let iw = w.min(32);
                    let imm = cur.imm(iw)?;
                    insn = insn.with_operand(Operand::imm(imm, iw as u8));
                }
                insn
            }
            0xFE => {
                let (modrm, rm) = cur.modrm_rm(&prefixes, mode, 8)?;
                let mnemonic = if modrm.reg == 0 { "inc" } else { "dec" };
                Instruction::new(address, 0, mnemonic, Operation::Other).with_operand(rm)
            }
            0xFF => {
                let (modrm, rm) = cur.modrm_rm(&prefixes, mode, bits)?;
                match modrm.reg {
                    0 => Instruction::new(address, 0, "inc", Operation::Other).with_operand(rm),
                    1 => Instruction::new(address, 0, "dec", Operation::Other).with_operand(rm),
                    // indirect call/jmp: the operand stays a register or
                    // memory reference, never a resolved target
                    2 | 3 => Instruction::new(address, 0, "call", Operation::Call).with_operand(rm),
                    4 | 5 => Instruction::new(address, 0, "jmp", Operation::Jump).with_operand(rm),
                    6 => Instruction::new(address, 0, "push", Operation::Push).with_operand(rm),
                    _ => {
                        return Err(DecodeError::invalid_encoding(address, "ff /7"));
                    }
                }
            }

            _ => {
                let end = cur.offset.min(bytes.len());
                return Err(DecodeError::unknown_opcode(address, &bytes[..end]));
            }
        };

        let size = cur.offset;
        let mut instruction = insn;
        instruction.size = size;
        Ok(DecodedInstruction {
            instruction,
            size,
        })
    }

    fn mode(&self) -> Mode {
        self.mode
    }
}

impl X86Decoder {
    fn decode_two_byte(
        &self,
        cur: &mut Cursor<'_>,
        prefixes: &Prefixes,
        address: u64,
    ) -> Result<Instruction, DecodeError> {
        let opcode = cur.u8()?;
        let bits = prefixes.operand_bits(self.mode);
        let mode = self.mode;

        Ok(match opcode {
            0x05 => Instruction::new(address, 0, "syscall", Operation::Other),
            0x1E | 0x1F => {
                let (_, rm) = cur.modrm_rm(prefixes, mode, bits)?;
                Instruction::new(address, 0, "nop", Operation::Nop).with_operand(rm)
            }
            0x80..=0x8F => {
                let rel = cur.i32()? as i64;
                let target = (address as i64 + cur.offset as i64 + rel) as u64;
                let mnemonic = format!("j{}", CC_SUFFIXES[(opcode & 0xF) as usize]);
                Instruction::new(address, 0, mnemonic, Operation::ConditionalJump)
                    .with_operand(Operand::PcRelative { target })
            }
            0x90..=0x9F => {
                let (_, rm) = cur.modrm_rm(prefixes, mode, 8)?;
                let mnemonic = format!("set{}", CC_SUFFIXES[(opcode & 0xF) as usize]);
                Instruction::new(address, 0, mnemonic, Operation::Other).with_operand(rm)
            }
            0xA2 => Instruction::new(address, 0, "cpuid", Operation::Other),
            0xAF => {
                let (modrm, rm) = cur.modrm_rm(prefixes, mode, bits)?;
                Instruction::new(address, 0, "imul", Operation::Other)
                    .with_operand(decode_modrm_reg(modrm, prefixes, bits))
                    .with_operand(rm)
            }
            0xB6 | 0xB7 => {
                let w = if opcode == 0xB6 { 8 } else { 16 };
                let (modrm, rm) = cur.modrm_rm(prefixes, mode, w)?;
                Instruction::new(address, 0, "movzx", Operation::Other)
                    .with_operand(decode_modrm_reg(modrm, prefixes, bits))
                    .with_operand(rm)
            }
            0xBE | 0xBF => {
                let w = if opcode == 0xBE { 8 } else { 16 };
                let (modrm, rm) = cur.modrm_rm(prefixes, mode, w)?;
                Instruction::new(address, 0, "movsx", Operation::Other)
                    .with_operand(decode_modrm_reg(modrm, prefixes, bits))
                    .with_operand(rm)
            }
            _ => {
                let end = cur.offset.min(cur.bytes.len());
                return Err(DecodeError::unknown_opcode(address, &cur.bytes[..end]));
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode32(bytes: &[u8]) -> DecodedInstruction {
        X86Decoder::open(Mode::Bits32)
            .unwrap()
            .decode_instruction(bytes, 0x1000)
            .unwrap()
    }

    fn decode64(bytes: &[u8]) -> DecodedInstruction {
        X86Decoder::open(Mode::Bits64)
            .unwrap()
            .decode_instruction(bytes, 0x1000)
            .unwrap()
    }

    #[test]
    fn nop() {
        let d = decode32(&[0x90]);
        assert_eq!(d.instruction.mnemonic, "nop");
        assert_eq!(d.size, 1);
        assert!(d.instruction.is_filler());
    }

    #[test]
    fn int3_is_filler() {
        let d = decode32(&[0xCC]);
        assert_eq!(d.instruction.mnemonic, "int3");
        assert!(d.instruction.is_filler());
    }

    #[test]
    fn int_imm_is_not_filler() {
        let d = decode32(&[0xCD, 0x80]);
        assert_eq!(d.instruction.mnemonic, "int");
        assert_eq!(d.size, 2);
        assert!(!d.instruction.is_filler());
    }

    #[test]
    fn ret_group() {
        for enc in [&[0xC3][..], &[0xCB][..]] {
            assert!(decode32(enc).instruction.is_return());
        }
        let d = decode32(&[0xC2, 0x08, 0x00]);
        assert!(d.instruction.is_return());
        assert_eq!(d.size, 3);
    }

    #[test]
    fn push_rbp_and_mov_rbp_rsp() {
        let d = decode64(&[0x55]);
        assert_eq!(d.instruction.mnemonic, "push");
        assert_eq!(d.size, 1);

        // mov rbp, rsp
        let d = decode64(&[0x48, 0x89, 0xE5]);
        assert_eq!(d.instruction.mnemonic, "mov");
        assert_eq!(d.size, 3);
        assert!(d.instruction.is_data_move());
    }

    #[test]
    fn mov_eax_imm32() {
        // b8 98 81 40 00   mov eax, 0x408198
        let d = decode32(&[0xB8, 0x98, 0x81, 0x40, 0x00]);
        assert_eq!(d.size, 5);
        assert!(d.instruction.is_data_move());
        match &d.instruction.operands[1] {
            Operand::Immediate(imm) => assert_eq!(imm.as_u64(), 0x408198),
            other => panic!("expected immediate, got {:?}", other),
        }
    }

    #[test]
    fn movabs_rax_imm64() {
        let d = decode64(&[0x48, 0xB8, 0x88, 0x77, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11]);
        assert_eq!(d.instruction.mnemonic, "movabs");
        assert_eq!(d.size, 10);
        match &d.instruction.operands[1] {
            Operand::Immediate(imm) => assert_eq!(imm.as_u64(), 0x1122334455667788),
            other => panic!("expected immediate, got {:?}", other),
        }
    }

    #[test]
    fn mov_from_absolute_address() {
        // 8b 15 34 80 40 00   mov edx, [0x408034]
        let d = decode32(&[0x8B, 0x15, 0x34, 0x80, 0x40, 0x00]);
        assert_eq!(d.size, 6);
        match &d.instruction.operands[1] {
            Operand::Memory(mem) => {
                assert!(mem.base.is_none());
                assert_eq!(mem.displacement, 0x408034);
            }
            other => panic!("expected memory operand, got {:?}", other),
        }
    }

    #[test]
    fn mov_store_to_absolute_address() {
        // 89 35 ac af 40 00   mov [0x40afac], esi
        let d = decode32(&[0x89, 0x35, 0xAC, 0xAF, 0x40, 0x00]);
        assert_eq!(d.size, 6);
        match &d.instruction.operands[0] {
            Operand::Memory(mem) => assert_eq!(mem.displacement, 0x40afac),
            other => panic!("expected memory operand, got {:?}", other),
        }
        assert!(d.instruction.operands[1].is_register());
    }

    #[test]
    fn mov_accumulator_moffs() {
        // a1 dc ac 40 00   mov eax, [0x40acdc]
        let d = decode32(&[0xA1, 0xDC, 0xAC, 0x40, 0x00]);
        assert_eq!(d.size, 5);
        assert!(d.instruction.is_data_move());
        match &d.instruction.operands[1] {
            Operand::Memory(mem) => assert_eq!(mem.displacement, 0x40acdc),
            other => panic!("expected memory operand, got {:?}", other),
        }
    }

    #[test]
    fn mov_imm_to_absolute_address() {
        // c7 05 ac af 40 00 01 00 00 00   mov dword [0x40afac], 1
        let d = decode32(&[0xC7, 0x05, 0xAC, 0xAF, 0x40, 0x00, 0x01, 0x00, 0x00, 0x00]);
        assert_eq!(d.size, 10);
        assert!(d.instruction.is_data_move());
        match &d.instruction.operands[0] {
            Operand::Memory(mem) => assert_eq!(mem.displacement, 0x40afac),
            other => panic!("expected memory operand, got {:?}", other),
        }
    }

    #[test]
    fn call_rel32_resolves_target() {
        // call +0x10 from 0x1000; next insn at 0x1005 -> target 0x1015
        let d = decode32(&[0xE8, 0x10, 0x00, 0x00, 0x00]);
        assert_eq!(d.size, 5);
        assert!(d.instruction.is_jump_or_call());
        assert_eq!(
            d.instruction.operands[0],
            Operand::PcRelative { target: 0x1015 }
        );
    }

    #[test]
    fn call_rel32_backwards() {
        // call -0x20 from 0x1000 -> 0x1005 - 0x20 = 0xfe5
        let d = decode32(&[0xE8, 0xE0, 0xFF, 0xFF, 0xFF]);
        assert_eq!(
            d.instruction.operands[0],
            Operand::PcRelative { target: 0xFE5 }
        );
    }

    #[test]
    fn jmp_rel8_resolves_target() {
        let d = decode32(&[0xEB, 0x04]);
        assert_eq!(d.size, 2);
        assert_eq!(
            d.instruction.operands[0],
            Operand::PcRelative { target: 0x1006 }
        );
    }

    #[test]
    fn indirect_call_has_no_resolved_target() {
        // ff d0   call eax
        let d = decode32(&[0xFF, 0xD0]);
        assert_eq!(d.instruction.mnemonic, "call");
        assert!(d.instruction.operands[0].is_register());
    }

    #[test]
    fn jcc_rel32_two_byte() {
        // 0f 84 00 01 00 00   je +0x100
        let d = decode32(&[0x0F, 0x84, 0x00, 0x01, 0x00, 0x00]);
        assert_eq!(d.instruction.mnemonic, "je");
        assert_eq!(d.size, 6);
        assert_eq!(
            d.instruction.operands[0],
            Operand::PcRelative { target: 0x1106 }
        );
    }

    #[test]
    fn rip_relative_load() {
        // 48 8b 05 10 00 00 00   mov rax, [rip + 0x10]
        let d = decode64(&[0x48, 0x8B, 0x05, 0x10, 0x00, 0x00, 0x00]);
        assert_eq!(d.size, 7);
        match &d.instruction.operands[1] {
            Operand::Memory(mem) => {
                assert_eq!(mem.base, Some(Register::rip(64)));
                assert_eq!(mem.displacement, 0x10);
            }
            other => panic!("expected memory operand, got {:?}", other),
        }
    }

    #[test]
    fn truncated_is_an_error() {
        let err = X86Decoder::open(Mode::Bits32)
            .unwrap()
            .decode_instruction(&[0xE8, 0x00], 0)
            .unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { .. }));
    }

    #[test]
    fn unknown_opcode_is_an_error() {
        let err = X86Decoder::open(Mode::Bits32)
            .unwrap()
            .decode_instruction(&[0x0F, 0xFF], 0)
            .unwrap_err();
        assert!(matches!(err, DecodeError::UnknownOpcode { .. }));
    }

    #[test]
    fn inc_row_differs_by_mode() {
        // 0x40 is inc eax in 32-bit mode, a REX prefix in long mode
        let d = decode32(&[0x40]);
        assert_eq!(d.instruction.mnemonic, "inc");

        let d = decode64(&[0x40, 0x90]);
        assert_eq!(d.instruction.mnemonic, "nop");
        assert_eq!(d.size, 2);
    }
}
