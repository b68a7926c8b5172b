//! PE import directory parsing.
//!
//! Produces one `Import` per imported routine, keyed by the IAT slot
//! address — the address indirect call sites actually reference.

use super::header::{rva_to_offset, PeSectionHeader};
use crate::{u32_at, ParseError};
use delink_core::Import;

const IMPORT_DESCRIPTOR_SIZE: usize = 20;
const ORDINAL_FLAG_32: u32 = 0x8000_0000;

/// Walks the import directory, resolving imported names to IAT addresses.
pub fn parse_imports(
    data: &[u8],
    import_dir_rva: u32,
    sections: &[PeSectionHeader],
    image_base: u32,
) -> Result<Vec<Import>, ParseError> {
    let mut imports = Vec::new();
    let Some(mut desc_offset) = rva_to_offset(sections, import_dir_rva) else {
        return Ok(imports);
    };

    loop {
        if desc_offset + IMPORT_DESCRIPTOR_SIZE > data.len() {
            break;
        }
        let original_first_thunk = u32_at(data, desc_offset)?;
        let name_rva = u32_at(data, desc_offset + 12)?;
        let first_thunk = u32_at(data, desc_offset + 16)?;
        desc_offset += IMPORT_DESCRIPTOR_SIZE;

        // all-zero descriptor terminates the directory
        if original_first_thunk == 0 && name_rva == 0 && first_thunk == 0 {
            break;
        }

        // The lookup table names the routines; the IAT holds their slots.
        let lookup_rva = if original_first_thunk != 0 {
            original_first_thunk
        } else {
            first_thunk
        };
        let Some(mut lookup_offset) = rva_to_offset(sections, lookup_rva) else {
            continue;
        };

        let mut slot = 0u32;
        loop {
            let Ok(entry) = u32_at(data, lookup_offset) else {
                break;
            };
            lookup_offset += 4;
            if entry == 0 {
                break;
            }

            // by-ordinal imports have no name to resolve against
            if entry & ORDINAL_FLAG_32 == 0 {
                if let Some(hint_name_offset) = rva_to_offset(sections, entry) {
                    if let Some(name) = read_cstr(data, hint_name_offset + 2) {
                        imports.push(Import {
                            name,
                            address: image_base as u64 + first_thunk as u64 + slot as u64 * 4,
                        });
                    }
                }
            }
            slot += 1;
        }
    }

    Ok(imports)
}

fn read_cstr(data: &[u8], offset: usize) -> Option<String> {
    let rest = data.get(offset..)?;
    let end = rest.iter().position(|&b| b == 0)?;
    std::str::from_utf8(&rest[..end]).ok().map(str::to_owned)
}
