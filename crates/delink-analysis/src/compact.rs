//! Function compaction.
//!
//! An output object's text buffer starts as a copy of the whole input text
//! image, so the file's own functions sit at their original offsets with
//! foreign code around them. Compaction slides every retained function
//! down by one fixed base offset — the first moved function's original
//! address — and shrinks the section to the last retained byte. A single
//! uniform shift is essential: relocation offsets were rebased by that
//! same amount, so per-gap squeezing would break them.

use crate::error::DelinkError;
use crate::{text_section, TEXT_SECTION};
use delink_core::Object;

/// Checks that function symbols are in increasing address order without
/// overlaps: for adjacent functions, `val[i] + size[i] <= val[i+1]`.
pub fn check_function_sequence(obj: &Object) -> Result<(), DelinkError> {
    let mut curr = 0u64;
    for sym in obj.symbols().filter(|s| s.is_function()) {
        if sym.value < curr {
            return Err(DelinkError::OverlapDetected { address: sym.value });
        }
        curr = sym.value + sym.size;
    }
    Ok(())
}

/// Slides retained function byte ranges down by the base offset, updating
/// symbol addresses and the section size.
///
/// Symbol values must already be section-relative offsets (true for output
/// objects, whose text starts at address zero). A move that would land on
/// already-placed code is a typed error rather than silent corruption.
pub fn compact_functions(obj: &mut Object) -> Result<(), DelinkError> {
    check_function_sequence(obj)?;

    let text_index = obj
        .section_index(TEXT_SECTION)
        .ok_or(DelinkError::NoTextSection(TEXT_SECTION))?;
    let buffer_len = text_section(obj)?.data.as_ref().map(|d| d.len()).unwrap_or(0) as u64;

    // Plan the moves against a snapshot, then apply: the symbol table and
    // the section buffer cannot be borrowed mutably at once.
    let mut curr = 0u64;
    let mut base_offset: Option<u64> = None;
    let mut moves: Vec<(String, u64, u64, u64)> = Vec::new(); // name, from, to, size

    for sym in obj.symbols().filter(|s| s.is_function()) {
        if sym.size == 0 {
            continue;
        }
        if sym.value != curr {
            let base = *base_offset.get_or_insert(sym.value);
            if sym.value < base || sym.value + sym.size > buffer_len {
                return Err(DelinkError::FunctionOutOfBounds {
                    name: sym.name.clone(),
                    address: sym.value,
                    size: sym.size,
                });
            }
            let to = sym.value - base;
            if to < curr {
                // the shifted range would land on code already placed
                return Err(DelinkError::OverlapDetected { address: sym.value });
            }
            moves.push((sym.name.clone(), sym.value, to, sym.size));
            curr = to + sym.size;
        } else {
            curr = sym.value + sym.size;
        }
    }

    for (name, from, to, size) in &moves {
        println!("Moving function @ {:#x} to {:#x} (size {})", from, to, size);
        if let Some(data) = obj.section_mut(text_index).and_then(|s| s.data.as_mut()) {
            data.copy_within(*from as usize..(*from + *size) as usize, *to as usize);
        }
        if let Some(sym) = obj.symbol_by_name_mut(name) {
            sym.value = *to;
        }
    }

    if let Some(section) = obj.section_mut(text_index) {
        section.size = curr;
        if let Some(data) = section.data.as_mut() {
            data.truncate(curr as usize);
        }
        println!("Setting code size to {}", curr);
    }

    Ok(())
}
