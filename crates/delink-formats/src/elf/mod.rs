//! ELF container support.
//!
//! Reads executables (the delinker's input) and relocatable objects (so the
//! tool's own outputs can be inspected and round-tripped); writes ET_REL
//! objects only — a delinker never produces executables.

mod header;
mod section;
mod symbol;
mod writer;

pub use header::{ElfClass, ElfHeader};
pub use section::{SectionHeader, StringTable};
pub use symbol::SymbolEntry;
pub use writer::write_elf;

use crate::{u32_at, u64_at, ParseError};
use delink_core::{
    Format, Import, Object, RelocKind, Relocation, Section, Symbol, SEC_FLAG_CODE,
    SEC_FLAG_INIT_DATA, SEC_FLAG_UNINIT_DATA,
};
use header::{EM_386, EM_X86_64};
use section::{SHT_DYNSYM, SHT_NOBITS, SHT_PROGBITS, SHT_REL, SHT_RELA, SHT_SYMTAB};

/// Reads an ELF binary into the object model.
pub fn read_elf(data: &[u8]) -> Result<Object, ParseError> {
    let header = ElfHeader::parse(data)?;

    let format = match header.class {
        ElfClass::Elf32 => Format::Elf32,
        ElfClass::Elf64 => Format::Elf64,
    };
    match header.e_machine {
        EM_386 | EM_X86_64 => {}
        _ => return Err(ParseError::Unsupported("non-x86 machine")),
    }

    let raw_sections = parse_section_headers(data, &header)?;

    let mut obj = Object::new(format);
    obj.set_entry_point(header.e_entry);

    // Loadable sections become object sections; everything else (symbol
    // tables, string tables, relocations) is consumed below and discarded.
    let mut index_map: Vec<Option<usize>> = vec![None; raw_sections.len()];
    for (elf_idx, raw) in raw_sections.iter().enumerate() {
        let loadable = matches!(raw.sh_type, SHT_PROGBITS | SHT_NOBITS) && raw.is_allocated();
        if !loadable {
            continue;
        }
        let flags = if raw.is_executable() {
            SEC_FLAG_CODE
        } else if raw.sh_type == SHT_NOBITS {
            SEC_FLAG_UNINIT_DATA
        } else {
            SEC_FLAG_INIT_DATA
        };
        let mut section = Section::new(
            raw.name.clone(),
            raw.sh_addr,
            raw.sh_size,
            raw.sh_addralign.max(1),
            flags,
        );
        section.data = raw.file_data(data).map(|d| d.to_vec());
        index_map[elf_idx] = Some(obj.add_section(section));
    }

    // Symbols come from .symtab; .dynsym only feeds import recovery.
    for raw in raw_sections.iter().filter(|s| s.sh_type == SHT_SYMTAB) {
        for (entry, name) in parse_symbol_entries(data, raw, &raw_sections, header.class)? {
            let shndx = entry.st_shndx as usize;
            let section = if shndx != 0 && shndx < index_map.len() {
                index_map[shndx]
            } else {
                None
            };
            obj.add_symbol(Symbol::new(
                name,
                entry.st_value,
                entry.st_size,
                entry.kind(),
                entry.flags(),
                section,
            ));
        }
    }

    // Relocation sections targeting a loadable section (present when
    // re-reading a relocatable object this tool produced).
    for raw in raw_sections
        .iter()
        .filter(|s| matches!(s.sh_type, SHT_RELA | SHT_REL))
    {
        let target_is_loadable = (raw.sh_info as usize) < index_map.len()
            && index_map[raw.sh_info as usize].is_some();
        let Some(symtab) = raw_sections.get(raw.sh_link as usize) else {
            continue;
        };
        if !target_is_loadable || !matches!(symtab.sh_type, SHT_SYMTAB | SHT_DYNSYM) {
            continue;
        }
        let names: Vec<(SymbolEntry, String)> =
            parse_symbol_entries(data, symtab, &raw_sections, header.class)?;
        for reloc in parse_reloc_entries(data, raw, header.class)? {
            // entry 0 is the null symbol, which names nothing
            let Some((_, name)) = reloc
                .symbol_index
                .checked_sub(1)
                .and_then(|i| names.get(i as usize))
            else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            obj.add_relocation(Relocation::new(
                reloc.offset,
                reloc.kind,
                reloc.addend,
                name.clone(),
            ));
        }
    }

    recover_plt_imports(data, &raw_sections, header.class, &mut obj)?;

    Ok(obj)
}

fn parse_section_headers(data: &[u8], header: &ElfHeader) -> Result<Vec<SectionHeader>, ParseError> {
    let entsize = header.e_shentsize as usize;
    let min = match header.class {
        ElfClass::Elf32 => 40,
        ElfClass::Elf64 => 64,
    };
    if header.e_shnum > 0 && entsize < min {
        return Err(ParseError::InvalidValue("section header entry size"));
    }

    let mut sections = Vec::with_capacity(header.e_shnum as usize);
    let mut offset = header.e_shoff as usize;
    for _ in 0..header.e_shnum {
        if offset + entsize > data.len() {
            return Err(ParseError::too_short(offset + entsize, data.len()));
        }
        sections.push(SectionHeader::parse(&data[offset..], header.class)?);
        offset += entsize;
    }

    // Resolve names once the string table is known.
    if let Some(shstrtab) = sections.get(header.e_shstrndx as usize) {
        let table = shstrtab
            .file_data(data)
            .map(StringTable::new)
            .unwrap_or_else(StringTable::empty);
        let names: Vec<String> = sections
            .iter()
            .map(|s| table.get(s.sh_name as usize).unwrap_or("").to_string())
            .collect();
        for (section, name) in sections.iter_mut().zip(names) {
            section.name = name;
        }
    }

    Ok(sections)
}

/// Parses the entries of one symbol table section, skipping the null entry.
fn parse_symbol_entries(
    data: &[u8],
    symtab: &SectionHeader,
    sections: &[SectionHeader],
    class: ElfClass,
) -> Result<Vec<(SymbolEntry, String)>, ParseError> {
    let Some(table_data) = symtab.file_data(data) else {
        return Ok(Vec::new());
    };
    let strtab = sections
        .get(symtab.sh_link as usize)
        .and_then(|s| s.file_data(data))
        .map(StringTable::new)
        .unwrap_or_else(StringTable::empty);

    let entsize = symbol::entry_size(class);
    let mut entries = Vec::new();
    let mut offset = entsize; // skip the null entry
    while offset + entsize <= table_data.len() {
        let entry = SymbolEntry::parse(&table_data[offset..], class)?;
        let name = strtab.get(entry.st_name as usize).unwrap_or("").to_string();
        entries.push((entry, name));
        offset += entsize;
    }
    Ok(entries)
}

struct RawReloc {
    offset: u64,
    symbol_index: u32,
    kind: RelocKind,
    addend: i64,
}

fn parse_reloc_entries(
    data: &[u8],
    section: &SectionHeader,
    class: ElfClass,
) -> Result<Vec<RawReloc>, ParseError> {
    let Some(table) = section.file_data(data) else {
        return Ok(Vec::new());
    };
    let with_addend = section.sh_type == SHT_RELA;
    let entsize = match (class, with_addend) {
        (ElfClass::Elf32, false) => 8,
        (ElfClass::Elf32, true) => 12,
        (ElfClass::Elf64, false) => 16,
        (ElfClass::Elf64, true) => 24,
    };

    let mut relocs = Vec::new();
    let mut offset = 0;
    while offset + entsize <= table.len() {
        let (r_offset, symbol_index, r_type, addend) = match class {
            ElfClass::Elf32 => {
                let r_offset = u32_at(table, offset)? as u64;
                let r_info = u32_at(table, offset + 4)?;
                let addend = if with_addend {
                    u32_at(table, offset + 8)? as i32 as i64
                } else {
                    0
                };
                (r_offset, r_info >> 8, r_info & 0xFF, addend)
            }
            ElfClass::Elf64 => {
                let r_offset = u64_at(table, offset)?;
                let r_info = u64_at(table, offset + 8)?;
                let addend = if with_addend {
                    u64_at(table, offset + 16)? as i64
                } else {
                    0
                };
                (r_offset, (r_info >> 32) as u32, (r_info & 0xFFFF_FFFF) as u32, addend)
            }
        };
        offset += entsize;

        let kind = match (class, r_type) {
            // R_386_32 / R_X86_64_64, R_X86_64_32, R_X86_64_32S
            (ElfClass::Elf32, 1) | (ElfClass::Elf64, 1 | 10 | 11) => RelocKind::Absolute,
            // R_386_PC32 / R_X86_64_PC32, R_X86_64_PLT32
            (ElfClass::Elf32, 2) | (ElfClass::Elf64, 2 | 4) => RelocKind::PcRelative,
            _ => continue,
        };
        relocs.push(RawReloc {
            offset: r_offset,
            symbol_index,
            kind,
            addend,
        });
    }
    Ok(relocs)
}

/// Pairs `.rel[a].plt` entries with classic PLT stubs so a call into the PLT
/// resolves to the imported routine's name.
fn recover_plt_imports(
    data: &[u8],
    sections: &[SectionHeader],
    class: ElfClass,
    obj: &mut Object,
) -> Result<(), ParseError> {
    let Some(rel_plt) = sections
        .iter()
        .find(|s| s.name == ".rela.plt" || s.name == ".rel.plt")
    else {
        return Ok(());
    };
    let Some(plt) = sections.iter().find(|s| s.name == ".plt") else {
        return Ok(());
    };
    let Some(dynsym) = sections.get(rel_plt.sh_link as usize) else {
        return Ok(());
    };

    let names = parse_symbol_entries(data, dynsym, sections, class)?;
    let stub_size = if plt.sh_entsize > 0 { plt.sh_entsize } else { 16 };

    for (i, reloc) in parse_reloc_entries_any_type(data, rel_plt, class)?.iter().enumerate() {
        let Some((_, name)) = reloc
            .symbol_index
            .checked_sub(1)
            .and_then(|idx| names.get(idx as usize))
        else {
            continue;
        };
        if name.is_empty() {
            continue;
        }
        // stub 0 is the resolver; imported routines start at stub 1
        obj.add_import(Import {
            name: name.clone(),
            address: plt.sh_addr + (i as u64 + 1) * stub_size,
        });
    }
    Ok(())
}

/// Like `parse_reloc_entries`, but keeps entries regardless of relocation
/// type: JUMP_SLOT entries never map onto the model's kinds, yet their
/// symbol indices are exactly what import recovery needs.
fn parse_reloc_entries_any_type(
    data: &[u8],
    section: &SectionHeader,
    class: ElfClass,
) -> Result<Vec<RawReloc>, ParseError> {
    let Some(table) = section.file_data(data) else {
        return Ok(Vec::new());
    };
    let with_addend = section.sh_type == SHT_RELA;
    let entsize = match (class, with_addend) {
        (ElfClass::Elf32, false) => 8,
        (ElfClass::Elf32, true) => 12,
        (ElfClass::Elf64, false) => 16,
        (ElfClass::Elf64, true) => 24,
    };

    let mut relocs = Vec::new();
    let mut offset = 0;
    while offset + entsize <= table.len() {
        let (r_offset, symbol_index) = match class {
            ElfClass::Elf32 => (u32_at(table, offset)? as u64, u32_at(table, offset + 4)? >> 8),
            ElfClass::Elf64 => (u64_at(table, offset)?, (u64_at(table, offset + 8)? >> 32) as u32),
        };
        offset += entsize;
        relocs.push(RawReloc {
            offset: r_offset,
            symbol_index,
            kind: RelocKind::Absolute,
            addend: 0,
        });
    }
    Ok(relocs)
}
