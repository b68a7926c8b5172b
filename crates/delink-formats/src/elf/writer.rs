//! ET_REL object serialization.
//!
//! Emits a relocatable ELF from the object model: the object's sections,
//! a symbol table with locals ordered before globals, and a `.rela.text`
//! table (RELA for both classes, so addends survive without patching
//! section bytes).

use super::header::{ElfClass, EM_386, EM_X86_64, ET_REL};
use super::section::{SHF_ALLOC, SHF_EXECINSTR, SHF_WRITE, SHT_NOBITS, SHT_PROGBITS, SHT_RELA, SHT_STRTAB, SHT_SYMTAB};
use super::symbol::{SHN_ABS, SHN_UNDEF, STT_FILE, STT_FUNC, STT_NOTYPE, STT_OBJECT, STT_SECTION};
use crate::WriteError;
use delink_core::{Format, Object, RelocKind, Symbol, SymbolKind};
use std::collections::HashMap;

const TEXT_SECTION: &str = ".text";

/// Serializes `obj` as a relocatable ELF of its declared class.
pub fn write_elf(obj: &Object) -> Result<Vec<u8>, WriteError> {
    let class = match obj.format() {
        Format::Elf32 => ElfClass::Elf32,
        Format::Elf64 => ElfClass::Elf64,
        other => return Err(WriteError::UnsupportedFormat(other.name())),
    };

    // Locals must precede globals in an ELF symbol table.
    let mut ordered: Vec<&Symbol> = obj.symbols().filter(|s| !s.is_global()).collect();
    let first_global = ordered.len() + 1; // +1 for the null entry
    ordered.extend(obj.symbols().filter(|s| s.is_global()));

    let mut sym_index: HashMap<&str, usize> = HashMap::new();
    for (i, sym) in ordered.iter().enumerate() {
        sym_index.entry(sym.name.as_str()).or_insert(i + 1);
    }

    let has_relocs = obj.relocation_count() > 0;
    let text_elf_index = obj.section_index(TEXT_SECTION).map(|i| i as u32 + 1);
    if has_relocs && text_elf_index.is_none() {
        return Err(WriteError::MissingSection(TEXT_SECTION));
    }

    // String tables.
    let mut strtab = StrTabBuilder::new();
    for sym in &ordered {
        strtab.intern(&sym.name);
    }
    let mut shstrtab = StrTabBuilder::new();
    let section_name_offsets: Vec<u32> = obj
        .sections()
        .map(|s| shstrtab.intern(&s.name))
        .collect();
    let symtab_name = shstrtab.intern(".symtab");
    let strtab_name = shstrtab.intern(".strtab");
    let rela_name = if has_relocs {
        shstrtab.intern(".rela.text")
    } else {
        0
    };
    let shstrtab_name = shstrtab.intern(".shstrtab");

    // Symbol table bytes.
    let mut symtab = Vec::new();
    push_symbol_entry(&mut symtab, class, 0, 0, 0, 0, SHN_UNDEF); // null entry
    for sym in &ordered {
        let st_type = match sym.kind {
            SymbolKind::None => STT_NOTYPE,
            SymbolKind::Object => STT_OBJECT,
            SymbolKind::Function => STT_FUNC,
            SymbolKind::Section => STT_SECTION,
            SymbolKind::File => STT_FILE,
        };
        let bind: u8 = if sym.is_global() { 1 } else { 0 };
        let shndx = if sym.is_external() {
            SHN_UNDEF
        } else if sym.kind == SymbolKind::File {
            SHN_ABS
        } else if let Some(idx) = sym.section {
            idx as u16 + 1
        } else if let Some(idx) = obj.section_index(&sym.name) {
            // section proxies carry no back-reference; their name is the key
            idx as u16 + 1
        } else {
            SHN_UNDEF
        };
        push_symbol_entry(
            &mut symtab,
            class,
            strtab.offset_of(&sym.name),
            (bind << 4) | st_type,
            sym.value,
            sym.size,
            shndx,
        );
    }

    // Relocation table bytes.
    let mut rela = Vec::new();
    for reloc in obj.relocations() {
        let &index = sym_index.get(reloc.symbol.as_str()).ok_or_else(|| {
            WriteError::DanglingRelocation {
                offset: reloc.offset,
                symbol: reloc.symbol.clone(),
            }
        })?;
        let r_type: u32 = match (class, reloc.kind) {
            (ElfClass::Elf32, RelocKind::Absolute) => 1,    // R_386_32
            (ElfClass::Elf32, RelocKind::PcRelative) => 2,  // R_386_PC32
            (ElfClass::Elf64, RelocKind::Absolute) => 11,   // R_X86_64_32S
            (ElfClass::Elf64, RelocKind::PcRelative) => 2,  // R_X86_64_PC32
        };
        match class {
            ElfClass::Elf32 => {
                rela.extend_from_slice(&(reloc.offset as u32).to_le_bytes());
                rela.extend_from_slice(&(((index as u32) << 8) | r_type).to_le_bytes());
                rela.extend_from_slice(&(reloc.addend as i32).to_le_bytes());
            }
            ElfClass::Elf64 => {
                rela.extend_from_slice(&reloc.offset.to_le_bytes());
                rela.extend_from_slice(&(((index as u64) << 32) | r_type as u64).to_le_bytes());
                rela.extend_from_slice(&reloc.addend.to_le_bytes());
            }
        }
    }

    // File layout: header, section bodies, then the section header table.
    let (ehsize, shentsize): (usize, usize) = match class {
        ElfClass::Elf32 => (52, 40),
        ElfClass::Elf64 => (64, 64),
    };
    let mut out = vec![0u8; ehsize];

    let mut body_offsets: Vec<u64> = Vec::new();
    for section in obj.sections() {
        align_to(&mut out, section.alignment.max(1) as usize);
        body_offsets.push(out.len() as u64);
        if let Some(data) = &section.data {
            out.extend_from_slice(data);
        }
    }
    align_to(&mut out, 8);
    let symtab_offset = out.len() as u64;
    out.extend_from_slice(&symtab);
    let strtab_offset = out.len() as u64;
    out.extend_from_slice(strtab.bytes());
    align_to(&mut out, 8);
    let rela_offset = out.len() as u64;
    out.extend_from_slice(&rela);
    let shstrtab_offset = out.len() as u64;
    out.extend_from_slice(shstrtab.bytes());

    align_to(&mut out, 8);
    let shoff = out.len() as u64;

    let section_count = obj.section_count();
    let symtab_index = section_count as u32 + 1;
    let strtab_index = section_count as u32 + 2;
    let shstrndx = section_count as u16 + if has_relocs { 4 } else { 3 };
    let shnum = shstrndx + 1;

    let mut headers = SectionHeaderWriter::new(class);
    headers.push(0, 0, 0, 0, 0, 0, 0, 0, 0, 0); // null
    for (i, section) in obj.sections().enumerate() {
        let sh_type = if section.is_uninit_data() {
            SHT_NOBITS
        } else {
            SHT_PROGBITS
        };
        let mut sh_flags = SHF_ALLOC;
        if section.is_code() {
            sh_flags |= SHF_EXECINSTR;
        } else {
            sh_flags |= SHF_WRITE;
        }
        headers.push(
            section_name_offsets[i],
            sh_type,
            sh_flags,
            section.address,
            body_offsets[i],
            section.size,
            0,
            0,
            section.alignment.max(1),
            0,
        );
    }
    let sym_entsize = super::symbol::entry_size(class) as u64;
    headers.push(
        symtab_name,
        SHT_SYMTAB,
        0,
        0,
        symtab_offset,
        symtab.len() as u64,
        strtab_index,
        first_global as u32,
        8,
        sym_entsize,
    );
    headers.push(
        strtab_name,
        SHT_STRTAB,
        0,
        0,
        strtab_offset,
        strtab.bytes().len() as u64,
        0,
        0,
        1,
        0,
    );
    if has_relocs {
        let rela_entsize: u64 = match class {
            ElfClass::Elf32 => 12,
            ElfClass::Elf64 => 24,
        };
        headers.push(
            rela_name,
            SHT_RELA,
            0,
            0,
            rela_offset,
            rela.len() as u64,
            symtab_index,
            text_elf_index.unwrap_or(0),
            8,
            rela_entsize,
        );
    }
    headers.push(
        shstrtab_name,
        SHT_STRTAB,
        0,
        0,
        shstrtab_offset,
        shstrtab.bytes().len() as u64,
        0,
        0,
        1,
        0,
    );
    out.extend_from_slice(headers.bytes());

    write_elf_header(&mut out, class, shoff, shentsize as u16, shnum, shstrndx);
    Ok(out)
}

fn align_to(out: &mut Vec<u8>, alignment: usize) {
    while out.len() % alignment != 0 {
        out.push(0);
    }
}

fn write_elf_header(
    out: &mut [u8],
    class: ElfClass,
    shoff: u64,
    shentsize: u16,
    shnum: u16,
    shstrndx: u16,
) {
    out[0..4].copy_from_slice(&[0x7F, b'E', b'L', b'F']);
    out[4] = match class {
        ElfClass::Elf32 => 1,
        ElfClass::Elf64 => 2,
    };
    out[5] = 1; // little-endian
    out[6] = 1; // EV_CURRENT

    let machine = match class {
        ElfClass::Elf32 => EM_386,
        ElfClass::Elf64 => EM_X86_64,
    };
    out[16..18].copy_from_slice(&ET_REL.to_le_bytes());
    out[18..20].copy_from_slice(&machine.to_le_bytes());
    out[20..24].copy_from_slice(&1u32.to_le_bytes()); // e_version

    match class {
        ElfClass::Elf32 => {
            out[32..36].copy_from_slice(&(shoff as u32).to_le_bytes());
            out[40..42].copy_from_slice(&52u16.to_le_bytes()); // e_ehsize
            out[46..48].copy_from_slice(&shentsize.to_le_bytes());
            out[48..50].copy_from_slice(&shnum.to_le_bytes());
            out[50..52].copy_from_slice(&shstrndx.to_le_bytes());
        }
        ElfClass::Elf64 => {
            out[40..48].copy_from_slice(&shoff.to_le_bytes());
            out[52..54].copy_from_slice(&64u16.to_le_bytes()); // e_ehsize
            out[58..60].copy_from_slice(&shentsize.to_le_bytes());
            out[60..62].copy_from_slice(&shnum.to_le_bytes());
            out[62..64].copy_from_slice(&shstrndx.to_le_bytes());
        }
    }
}

fn push_symbol_entry(
    out: &mut Vec<u8>,
    class: ElfClass,
    st_name: u32,
    st_info: u8,
    st_value: u64,
    st_size: u64,
    st_shndx: u16,
) {
    match class {
        ElfClass::Elf32 => {
            out.extend_from_slice(&st_name.to_le_bytes());
            out.extend_from_slice(&(st_value as u32).to_le_bytes());
            out.extend_from_slice(&(st_size as u32).to_le_bytes());
            out.push(st_info);
            out.push(0); // st_other
            out.extend_from_slice(&st_shndx.to_le_bytes());
        }
        ElfClass::Elf64 => {
            out.extend_from_slice(&st_name.to_le_bytes());
            out.push(st_info);
            out.push(0); // st_other
            out.extend_from_slice(&st_shndx.to_le_bytes());
            out.extend_from_slice(&st_value.to_le_bytes());
            out.extend_from_slice(&st_size.to_le_bytes());
        }
    }
}

/// Incremental NUL-terminated string table.
struct StrTabBuilder {
    bytes: Vec<u8>,
    offsets: HashMap<String, u32>,
}

impl StrTabBuilder {
    fn new() -> Self {
        Self {
            bytes: vec![0],
            offsets: HashMap::new(),
        }
    }

    fn intern(&mut self, name: &str) -> u32 {
        if name.is_empty() {
            return 0;
        }
        if let Some(&off) = self.offsets.get(name) {
            return off;
        }
        let off = self.bytes.len() as u32;
        self.bytes.extend_from_slice(name.as_bytes());
        self.bytes.push(0);
        self.offsets.insert(name.to_string(), off);
        off
    }

    fn offset_of(&self, name: &str) -> u32 {
        self.offsets.get(name).copied().unwrap_or(0)
    }

    fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Accumulates raw section header entries for one class.
struct SectionHeaderWriter {
    class: ElfClass,
    bytes: Vec<u8>,
}

impl SectionHeaderWriter {
    fn new(class: ElfClass) -> Self {
        Self {
            class,
            bytes: Vec::new(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn push(
        &mut self,
        sh_name: u32,
        sh_type: u32,
        sh_flags: u64,
        sh_addr: u64,
        sh_offset: u64,
        sh_size: u64,
        sh_link: u32,
        sh_info: u32,
        sh_addralign: u64,
        sh_entsize: u64,
    ) {
        let out = &mut self.bytes;
        match self.class {
            ElfClass::Elf32 => {
                out.extend_from_slice(&sh_name.to_le_bytes());
                out.extend_from_slice(&sh_type.to_le_bytes());
                out.extend_from_slice(&(sh_flags as u32).to_le_bytes());
                out.extend_from_slice(&(sh_addr as u32).to_le_bytes());
                out.extend_from_slice(&(sh_offset as u32).to_le_bytes());
                out.extend_from_slice(&(sh_size as u32).to_le_bytes());
                out.extend_from_slice(&sh_link.to_le_bytes());
                out.extend_from_slice(&sh_info.to_le_bytes());
                out.extend_from_slice(&(sh_addralign as u32).to_le_bytes());
                out.extend_from_slice(&(sh_entsize as u32).to_le_bytes());
            }
            ElfClass::Elf64 => {
                out.extend_from_slice(&sh_name.to_le_bytes());
                out.extend_from_slice(&sh_type.to_le_bytes());
                out.extend_from_slice(&sh_flags.to_le_bytes());
                out.extend_from_slice(&sh_addr.to_le_bytes());
                out.extend_from_slice(&sh_offset.to_le_bytes());
                out.extend_from_slice(&sh_size.to_le_bytes());
                out.extend_from_slice(&sh_link.to_le_bytes());
                out.extend_from_slice(&sh_info.to_le_bytes());
                out.extend_from_slice(&sh_addralign.to_le_bytes());
                out.extend_from_slice(&sh_entsize.to_le_bytes());
            }
        }
    }

    fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}
