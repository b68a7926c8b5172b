//! PE32 executable parsing.

mod header;
mod imports;

pub use header::{CoffHeader, OptionalHeader32, PeSectionHeader, PE32_MAGIC};

use crate::{u16_at, u32_at, ParseError};
use delink_core::{
    Object, Format, Section, Symbol, SymbolKind, SEC_FLAG_CODE, SEC_FLAG_INIT_DATA,
    SEC_FLAG_UNINIT_DATA, SYM_FLAG_EXTERNAL, SYM_FLAG_GLOBAL,
};
use header::{
    IMAGE_SCN_CNT_CODE, IMAGE_SCN_CNT_INITIALIZED_DATA, IMAGE_SCN_CNT_UNINITIALIZED_DATA,
};

// COFF storage classes
const IMAGE_SYM_CLASS_EXTERNAL: u8 = 2;
const IMAGE_SYM_CLASS_FILE: u8 = 103;

/// Reads a PE32 executable into the object model.
pub fn read_pe(data: &[u8]) -> Result<Object, ParseError> {
    if data.len() < 0x40 || data[0..2] != [b'M', b'Z'] {
        return Err(ParseError::UnknownFormat);
    }
    let pe_offset = u32_at(data, 0x3C)? as usize;
    if data.len() < pe_offset + 24 || data[pe_offset..pe_offset + 4] != [b'P', b'E', 0, 0] {
        return Err(ParseError::UnknownFormat);
    }

    let coff = CoffHeader::parse(&data[pe_offset + 4..])?;
    let opt_offset = pe_offset + 24;
    if data.len() < opt_offset + coff.size_of_optional_header as usize {
        return Err(ParseError::too_short(
            opt_offset + coff.size_of_optional_header as usize,
            data.len(),
        ));
    }
    let opt = OptionalHeader32::parse(&data[opt_offset..])?;

    let mut raw_sections = Vec::with_capacity(coff.number_of_sections as usize);
    let mut offset = opt_offset + coff.size_of_optional_header as usize;
    for _ in 0..coff.number_of_sections {
        if offset + 40 > data.len() {
            return Err(ParseError::too_short(offset + 40, data.len()));
        }
        raw_sections.push(PeSectionHeader::parse(&data[offset..])?);
        offset += 40;
    }

    let image_base = opt.image_base as u64;
    let mut obj = Object::new(Format::Pe32);
    obj.set_entry_point(image_base + opt.address_of_entry_point as u64);

    for raw in &raw_sections {
        let flags = if raw.characteristics & IMAGE_SCN_CNT_CODE != 0 {
            SEC_FLAG_CODE
        } else if raw.characteristics & IMAGE_SCN_CNT_UNINITIALIZED_DATA != 0 {
            SEC_FLAG_UNINIT_DATA
        } else if raw.characteristics & IMAGE_SCN_CNT_INITIALIZED_DATA != 0 {
            SEC_FLAG_INIT_DATA
        } else {
            0
        };
        let size = if raw.virtual_size != 0 {
            raw.virtual_size
        } else {
            raw.size_of_raw_data
        };
        let mut section = Section::new(
            raw.name.clone(),
            image_base + raw.virtual_address as u64,
            size as u64,
            4,
            flags,
        );
        if raw.size_of_raw_data > 0 {
            let start = raw.pointer_to_raw_data as usize;
            let stored = raw.size_of_raw_data.min(size) as usize;
            if let Some(bytes) = data.get(start..start + stored) {
                section.data = Some(bytes.to_vec());
            }
        }
        obj.add_section(section);
    }

    if coff.pointer_to_symbol_table != 0 {
        parse_coff_symbols(data, &coff, &raw_sections, image_base, &mut obj)?;
    }

    if let Some((import_rva, _)) = opt.import_directory {
        for import in imports::parse_imports(data, import_rva, &raw_sections, opt.image_base)? {
            obj.add_import(import);
        }
    }

    Ok(obj)
}

/// Parses the COFF symbol table sometimes present in linked images
/// (MinGW keeps one until stripped).
fn parse_coff_symbols(
    data: &[u8],
    coff: &CoffHeader,
    sections: &[PeSectionHeader],
    image_base: u64,
    obj: &mut Object,
) -> Result<(), ParseError> {
    const ENTRY_SIZE: usize = 18;
    let table_start = coff.pointer_to_symbol_table as usize;
    let table_len = coff.number_of_symbols as usize * ENTRY_SIZE;
    let Some(table) = data.get(table_start..table_start + table_len) else {
        return Err(ParseError::truncated(
            table_start + table_len,
            data.len(),
            "COFF symbol table",
        ));
    };
    // the string table sits immediately after the symbol table
    let strings = &data[(table_start + table_len).min(data.len())..];

    let mut i = 0usize;
    while i < coff.number_of_symbols as usize {
        let entry = &table[i * ENTRY_SIZE..(i + 1) * ENTRY_SIZE];
        let value = u32_at(entry, 8)? as u64;
        let section_number = u16_at(entry, 12)? as i16;
        let sym_type = u16_at(entry, 14)?;
        let storage_class = entry[16];
        let aux_count = entry[17] as usize;

        let name = read_coff_name(entry, strings);

        if storage_class == IMAGE_SYM_CLASS_FILE {
            // the filename lives in the aux records
            let aux_start = ((i + 1) * ENTRY_SIZE).min(table.len());
            let aux_end = ((i + 1 + aux_count) * ENTRY_SIZE).min(table.len());
            let aux = &table[aux_start..aux_end];
            let end = aux.iter().position(|&b| b == 0).unwrap_or(aux.len());
            let file_name = String::from_utf8_lossy(&aux[..end]).into_owned();
            obj.add_symbol(Symbol::new(file_name, 0, 0, SymbolKind::File, 0, None));
        } else if !name.is_empty() {
            let (sec_index, address) = if section_number > 0 {
                let idx = section_number as usize - 1;
                let base = sections
                    .get(idx)
                    .map(|s| image_base + s.virtual_address as u64)
                    .unwrap_or(0);
                (Some(idx), base + value)
            } else {
                (None, value)
            };
            let kind = if sym_type >> 4 == 2 {
                SymbolKind::Function
            } else {
                SymbolKind::None
            };
            let mut flags = 0;
            if storage_class == IMAGE_SYM_CLASS_EXTERNAL {
                flags |= SYM_FLAG_GLOBAL;
            }
            if section_number == 0 {
                flags |= SYM_FLAG_EXTERNAL;
            }
            obj.add_symbol(Symbol::new(name, address, 0, kind, flags, sec_index));
        }

        i += 1 + aux_count;
    }
    Ok(())
}

fn read_coff_name(entry: &[u8], strings: &[u8]) -> String {
    if entry[0..4] == [0, 0, 0, 0] {
        // long name: offset into the string table
        let offset = u32::from_le_bytes([entry[4], entry[5], entry[6], entry[7]]) as usize;
        if let Some(rest) = strings.get(offset..) {
            let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
            return String::from_utf8_lossy(&rest[..end]).into_owned();
        }
        String::new()
    } else {
        let end = entry[0..8].iter().position(|&b| b == 0).unwrap_or(8);
        String::from_utf8_lossy(&entry[..end]).into_owned()
    }
}
