//! Heuristic symbol reconstruction.
//!
//! When an executable has been stripped, function boundaries are recovered
//! by a linear sweep of the text section: any instruction in the return
//! group ends a function, and the next instruction that is not no-op/trap
//! filler begins the next one. Recovered functions get deterministic names
//! derived from their starting offset, so repeated runs agree.

use crate::error::DelinkError;
use crate::{open_decoder, text_section, ENTRY_SYMBOL};
use delink_core::{Object, Symbol, SymbolKind, SYM_FLAG_GLOBAL};
use delink_disasm::Decoder;

/// Name given to the synthetic source file all recovered symbols hang off.
const SYNTHETIC_FILE: &str = "source.c";

/// Scans the text section and appends one Function symbol per recovered
/// function, plus a single File symbol for the synthetic source file.
///
/// With `preserve_padding`, trailing no-op/trap filler is counted into the
/// preceding function's size (the function closes when the next one opens);
/// otherwise functions close at their final return instruction.
///
/// Returns the number of function symbols added.
pub fn reconstruct_symbols(obj: &mut Object, preserve_padding: bool) -> Result<usize, DelinkError> {
    let decoder = open_decoder(obj)?;
    let text = text_section(obj)?;
    let text_index = obj.section_index(crate::TEXT_SECTION);
    let text_base = text.address;
    let code: Vec<u8> = text.data.clone().unwrap_or_default();

    println!("reconstructing symbols from text section");

    obj.add_symbol(Symbol::new(
        SYNTHETIC_FILE,
        0,
        0,
        SymbolKind::File,
        0,
        text_index,
    ));

    let mut added = 0usize;
    let mut offset = 0usize;
    // start of the currently open function, if an instruction opened one
    let mut open_at: Option<u64> = None;
    // set once the open function has seen its return
    let mut end_of_function = false;

    while offset < code.len() {
        let decoded = match decoder.decode_instruction(&code[offset..], text_base + offset as u64) {
            Ok(decoded) => decoded,
            // undecodable bytes end the scan, as the sequential decode
            // iterator of the original tool did
            Err(_) => break,
        };
        let insn = &decoded.instruction;
        let addr = insn.address - text_base;

        if insn.is_return() {
            // a return with no open function closes nothing
            if let Some(start) = open_at {
                if !preserve_padding {
                    added +=
                        push_function(obj, text_index, text_base, start, addr + decoded.size as u64);
                    open_at = None;
                }
            }
            end_of_function = true;
            offset += decoded.size;
            continue;
        }

        if end_of_function {
            if insn.is_filler() {
                // inter-function padding
                offset += decoded.size;
                continue;
            }
            // first instruction of the next function
            if let Some(start) = open_at {
                // only reachable with preserve_padding: the padding scanned
                // since the return belongs to the previous function
                added += push_function(obj, text_index, text_base, start, addr);
            }
            end_of_function = false;
            open_at = Some(addr);
        } else if open_at.is_none() {
            open_at = Some(addr);
        }

        offset += decoded.size;
    }

    // a ret-terminated function still open at end of stream closes there;
    // one never terminated by a return is dropped
    if let (Some(start), true) = (open_at, end_of_function) {
        added += push_function(obj, text_index, text_base, start, offset as u64);
    }

    rename_entry_point(obj);

    println!("{} symbols recovered", added);
    if added == 0 {
        return Err(DelinkError::NoSymbolsAfterReconstruct);
    }
    Ok(added)
}

fn push_function(
    obj: &mut Object,
    text_index: Option<usize>,
    text_base: u64,
    start: u64,
    end: u64,
) -> usize {
    if end <= start {
        return 0;
    }
    obj.add_symbol(Symbol::new(
        format!("fn{:06X}", start),
        text_base + start,
        end - start,
        SymbolKind::Function,
        SYM_FLAG_GLOBAL,
        text_index,
    ));
    1
}

/// A relinker will look for the program entry by name; the symbol at the
/// declared entry point is the only one whose name can be recovered
/// without deeper analysis.
fn rename_entry_point(obj: &mut Object) {
    let entry = obj.entry_point();
    if entry == 0 {
        return;
    }
    if let Some(sym) = obj.symbol_at_value_mut(entry) {
        println!(
            "found entry point {} @ {:#x} - renaming to '{}'",
            sym.name, sym.value, ENTRY_SYMBOL
        );
        sym.name = ENTRY_SYMBOL.to_string();
    }
}
