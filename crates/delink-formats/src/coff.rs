//! i386 COFF object serialization — the container behind the `pe32`
//! output target.
//!
//! COFF relocations carry no addend field, so addends are folded into the
//! section bytes at the patched offset before the data is written.

use crate::error::WriteError;
use delink_core::{Format, Object, RelocKind, SymbolKind};
use std::collections::HashMap;

const MACHINE_I386: u16 = 0x14C;
const ENTRY_SIZE: usize = 18;
const SECTION_HEADER_SIZE: usize = 40;
const RELOC_SIZE: usize = 10;

const IMAGE_REL_I386_DIR32: u16 = 0x0006;
const IMAGE_REL_I386_REL32: u16 = 0x0014;

const IMAGE_SYM_CLASS_EXTERNAL: u8 = 2;
const IMAGE_SYM_CLASS_STATIC: u8 = 3;
const IMAGE_SYM_CLASS_FILE: u8 = 103;

const TEXT_CHARACTERISTICS: u32 = 0x6030_0020; // code, execute, read, align 4
const DATA_CHARACTERISTICS: u32 = 0xC030_0040; // initialized, read, write, align 4
const BSS_CHARACTERISTICS: u32 = 0xC030_0080; // uninitialized, read, write, align 4

const TEXT_SECTION: &str = ".text";

/// Serializes `obj` as an i386 COFF object.
pub fn write_coff(obj: &Object) -> Result<Vec<u8>, WriteError> {
    if obj.format() != Format::Pe32 {
        return Err(WriteError::UnsupportedFormat(obj.format().name()));
    }

    // Symbol table bytes and the name -> index map relocations need.
    // COFF symbol indices count aux records, so the index is tracked by hand.
    let mut strings = CoffStringTable::new();
    let mut symtab = Vec::new();
    let mut sym_index: HashMap<&str, u32> = HashMap::new();
    let mut next_index: u32 = 0;

    for sym in obj.symbols() {
        if sym.kind == SymbolKind::File {
            push_symbol(&mut symtab, &mut strings, ".file", 0, 0, 0, IMAGE_SYM_CLASS_FILE, 1);
            let mut aux = [0u8; ENTRY_SIZE];
            let name = sym.name.as_bytes();
            let n = name.len().min(ENTRY_SIZE);
            aux[..n].copy_from_slice(&name[..n]);
            symtab.extend_from_slice(&aux);
            next_index += 2;
            continue;
        }

        let section_number: i16 = if sym.is_external() {
            0
        } else if let Some(idx) = sym.section {
            idx as i16 + 1
        } else if let Some(idx) = obj.section_index(&sym.name) {
            idx as i16 + 1
        } else {
            0
        };
        let sym_type: u16 = if sym.is_function() { 0x20 } else { 0 };
        let class = if sym.is_global() {
            IMAGE_SYM_CLASS_EXTERNAL
        } else {
            IMAGE_SYM_CLASS_STATIC
        };
        sym_index.entry(sym.name.as_str()).or_insert(next_index);
        push_symbol(
            &mut symtab,
            &mut strings,
            &sym.name,
            sym.value as u32,
            section_number,
            sym_type,
            class,
            0,
        );
        next_index += 1;
    }

    // Relocation table for .text, with addends folded into the bytes.
    let text_index = obj.section_index(TEXT_SECTION);
    if obj.relocation_count() > 0 && text_index.is_none() {
        return Err(WriteError::MissingSection(TEXT_SECTION));
    }
    let mut reloc_table = Vec::new();
    let mut patched_text: Option<Vec<u8>> = text_index
        .and_then(|i| obj.section(i))
        .and_then(|s| s.data.clone());
    for reloc in obj.relocations() {
        let &index = sym_index.get(reloc.symbol.as_str()).ok_or_else(|| {
            WriteError::DanglingRelocation {
                offset: reloc.offset,
                symbol: reloc.symbol.clone(),
            }
        })?;
        let r_type = match reloc.kind {
            RelocKind::Absolute => IMAGE_REL_I386_DIR32,
            RelocKind::PcRelative => IMAGE_REL_I386_REL32,
        };
        reloc_table.extend_from_slice(&(reloc.offset as u32).to_le_bytes());
        reloc_table.extend_from_slice(&index.to_le_bytes());
        reloc_table.extend_from_slice(&r_type.to_le_bytes());

        if reloc.addend != 0 {
            let text = patched_text.as_mut().ok_or_else(|| {
                WriteError::RelocationOutOfRange {
                    offset: reloc.offset,
                    section: TEXT_SECTION.to_string(),
                }
            })?;
            let at = reloc.offset as usize;
            let field = text.get_mut(at..at + 4).ok_or_else(|| {
                WriteError::RelocationOutOfRange {
                    offset: reloc.offset,
                    section: TEXT_SECTION.to_string(),
                }
            })?;
            let value = i32::from_le_bytes([field[0], field[1], field[2], field[3]])
                .wrapping_add(reloc.addend as i32);
            field.copy_from_slice(&value.to_le_bytes());
        }
    }

    // Layout: header, section headers, raw data, relocations, symbols, strings.
    let header_size = 20 + obj.section_count() * SECTION_HEADER_SIZE;
    let mut raw_offsets = Vec::new();
    let mut cursor = header_size;
    for (i, section) in obj.sections().enumerate() {
        if section.is_uninit_data() || section.data.is_none() {
            raw_offsets.push(0u32);
        } else {
            raw_offsets.push(cursor as u32);
            let len = if Some(i) == text_index {
                patched_text.as_ref().map(|d| d.len()).unwrap_or(0)
            } else {
                section.data.as_ref().map(|d| d.len()).unwrap_or(0)
            };
            cursor += len;
        }
    }
    let reloc_offset = if reloc_table.is_empty() { 0 } else { cursor as u32 };
    cursor += reloc_table.len();
    let symtab_offset = cursor as u32;

    let mut out = Vec::with_capacity(cursor + symtab.len());

    // COFF header
    out.extend_from_slice(&MACHINE_I386.to_le_bytes());
    out.extend_from_slice(&(obj.section_count() as u16).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // timestamp
    out.extend_from_slice(&symtab_offset.to_le_bytes());
    out.extend_from_slice(&next_index.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // no optional header
    out.extend_from_slice(&0u16.to_le_bytes()); // characteristics

    // Section headers
    for (i, section) in obj.sections().enumerate() {
        let mut name_field = [0u8; 8];
        let name = section.name.as_bytes();
        let n = name.len().min(8);
        name_field[..n].copy_from_slice(&name[..n]);
        out.extend_from_slice(&name_field);
        out.extend_from_slice(&0u32.to_le_bytes()); // virtual size
        out.extend_from_slice(&0u32.to_le_bytes()); // virtual address
        out.extend_from_slice(&(section.size as u32).to_le_bytes());
        out.extend_from_slice(&raw_offsets[i].to_le_bytes());
        let (nrelocs, reloc_ptr) = if Some(i) == text_index && !reloc_table.is_empty() {
            ((reloc_table.len() / RELOC_SIZE) as u16, reloc_offset)
        } else {
            (0, 0)
        };
        out.extend_from_slice(&reloc_ptr.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // line numbers
        out.extend_from_slice(&nrelocs.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // line number count
        let characteristics = if section.is_code() {
            TEXT_CHARACTERISTICS
        } else if section.is_uninit_data() {
            BSS_CHARACTERISTICS
        } else {
            DATA_CHARACTERISTICS
        };
        out.extend_from_slice(&characteristics.to_le_bytes());
    }

    // Raw data
    for (i, section) in obj.sections().enumerate() {
        if section.is_uninit_data() {
            continue;
        }
        if Some(i) == text_index {
            if let Some(text) = &patched_text {
                out.extend_from_slice(text);
            }
        } else if let Some(data) = &section.data {
            out.extend_from_slice(data);
        }
    }

    out.extend_from_slice(&reloc_table);
    out.extend_from_slice(&symtab);
    out.extend_from_slice(strings.bytes());

    Ok(out)
}

#[allow(clippy::too_many_arguments)]
fn push_symbol(
    symtab: &mut Vec<u8>,
    strings: &mut CoffStringTable,
    name: &str,
    value: u32,
    section_number: i16,
    sym_type: u16,
    storage_class: u8,
    aux_count: u8,
) {
    let mut name_field = [0u8; 8];
    let bytes = name.as_bytes();
    if bytes.len() <= 8 {
        name_field[..bytes.len()].copy_from_slice(bytes);
    } else {
        let offset = strings.intern(name);
        name_field[4..8].copy_from_slice(&offset.to_le_bytes());
    }
    symtab.extend_from_slice(&name_field);
    symtab.extend_from_slice(&value.to_le_bytes());
    symtab.extend_from_slice(&section_number.to_le_bytes());
    symtab.extend_from_slice(&sym_type.to_le_bytes());
    symtab.push(storage_class);
    symtab.push(aux_count);
}

/// COFF string table: a u32 total length followed by NUL-terminated names.
/// Offsets are relative to the start of the length field.
struct CoffStringTable {
    bytes: Vec<u8>,
}

impl CoffStringTable {
    fn new() -> Self {
        Self {
            bytes: vec![0, 0, 0, 0],
        }
    }

    fn intern(&mut self, name: &str) -> u32 {
        let offset = self.bytes.len() as u32;
        self.bytes.extend_from_slice(name.as_bytes());
        self.bytes.push(0);
        offset
    }

    fn bytes(&mut self) -> &[u8] {
        let len = self.bytes.len() as u32;
        self.bytes[0..4].copy_from_slice(&len.to_le_bytes());
        &self.bytes
    }
}
