//! # delink-core
//!
//! Core types for the delink toolchain: the in-memory object model
//! (sections, symbols, relocations, imports) shared by the container
//! parsers and the delinking engine, plus the architecture-agnostic
//! instruction model produced by the decoder.

pub mod instruction;
pub mod object;
pub mod operand;
pub mod register;
pub mod relocation;
pub mod section;
pub mod symbol;

pub use instruction::{Instruction, Operation};
pub use object::{Format, Import, Object};
pub use operand::{Immediate, MemoryRef, Operand};
pub use register::{Register, RegisterClass};
pub use relocation::{RelocKind, Relocation};
pub use section::{Section, SEC_FLAG_CODE, SEC_FLAG_INIT_DATA, SEC_FLAG_UNINIT_DATA};
pub use symbol::{Symbol, SymbolKind, SYM_FLAG_EXTERNAL, SYM_FLAG_GLOBAL};
