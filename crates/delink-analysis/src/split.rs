//! Per-file output assembly.
//!
//! A single pass over the sorted input symbol table groups symbols by
//! their File markers. Each group becomes a fresh output object: function
//! symbols are copied in with rebased addresses, then the close step pulls
//! over the relevant relocations, compacts the text image, over-copies the
//! data sections, and serializes the object.
//!
//! Relocations were built against the input's address space; once symbols
//! are divided into separate objects whose base addresses reset to zero,
//! references between them can no longer be reconciled. Copying therefore
//! rebases every relocation by the output's first function offset.

use crate::compact::{check_function_sequence, compact_functions};
use crate::error::DelinkError;
use crate::pipeline::{FileFailure, Summary};
use crate::TEXT_SECTION;
use delink_core::{
    Format, Object, Relocation, Section, Symbol, SymbolKind, SEC_FLAG_CODE, SYM_FLAG_EXTERNAL,
    SYM_FLAG_GLOBAL,
};
use delink_formats::write_object;
use std::path::Path;

/// Source files are recognized by the conventional C suffix.
const SOURCE_SUFFIX: &str = ".c";
const OBJECT_SUFFIX: &str = ".o";

/// Splits `src` into one output object per recovered source file, writing
/// each into `out_dir`. Per-file failures are collected in the summary,
/// not propagated: a later file may still split cleanly.
pub fn split_objects(
    src: &Object,
    output_target: Format,
    out_dir: &Path,
) -> Result<Summary, DelinkError> {
    let mut summary = Summary::default();
    let mut current: Option<(Object, String)> = None;
    let mut current_source: Option<String> = None;
    let mut dest_text: Option<usize> = None;

    // Snapshot: the pass must not observe symbols appended while it runs.
    for sym in src.symbols_snapshot() {
        match sym.kind {
            SymbolKind::File => {
                // only names with the source suffix open a new group;
                // ghost entries with other names (or none) are skipped
                if sym.name.len() <= SOURCE_SUFFIX.len() || !sym.name.ends_with(SOURCE_SUFFIX) {
                    continue;
                }
                // the same filename can appear consecutively; one output
                if current_source.as_deref() == Some(sym.name.as_str()) {
                    continue;
                }

                if let Some((oo, filename)) = current.take() {
                    close_output(src, oo, &filename, out_dir, &mut summary);
                }

                let stem = &sym.name[..sym.name.len() - SOURCE_SUFFIX.len()];
                let filename = format!("{}{}", stem, OBJECT_SUFFIX);
                current = Some((open_output(&sym.name, output_target), filename));
                current_source = Some(sym.name.clone());
                dest_text = None;
            }

            SymbolKind::Function => {
                // reserved names are compiler internals, not user code
                if sym.name.starts_with('_') {
                    continue;
                }
                let Some((oo, _)) = current.as_mut() else {
                    println!("Function {} precedes any file symbol - skipping", sym.name);
                    continue;
                };

                // The output text starts as the whole input text image:
                // function extents are not final until compaction.
                if dest_text.is_none() {
                    dest_text = oo.section_index(TEXT_SECTION);
                }
                if dest_text.is_none() {
                    if let Some(src_sec) = sym.section.and_then(|i| src.section(i)) {
                        let data = src_sec.data.clone().unwrap_or_default();
                        dest_text = Some(oo.add_section(Section::with_data(
                            TEXT_SECTION,
                            0,
                            data,
                            src_sec.alignment,
                            SEC_FLAG_CODE,
                        )));
                    }
                }

                let base = sym
                    .section
                    .and_then(|i| src.section(i))
                    .map(|s| s.address)
                    .unwrap_or(0);
                let Some(value) = sym.value.checked_sub(base) else {
                    println!("Symbol {} lies below its section - skipping", sym.name);
                    continue;
                };

                // a recovered function always has a size; anything without
                // one is really an imported routine
                let (kind, flags) = if sym.size == 0 {
                    (SymbolKind::None, SYM_FLAG_GLOBAL | SYM_FLAG_EXTERNAL)
                } else {
                    (SymbolKind::Function, SYM_FLAG_GLOBAL)
                };
                oo.add_symbol(Symbol::new(
                    sym.name.clone(),
                    value,
                    sym.size,
                    kind,
                    flags,
                    dest_text,
                ));
            }

            // Section proxies and data symbols are pulled in by the
            // relocation copy when something actually references them.
            _ => {}
        }
    }

    if let Some((oo, filename)) = current.take() {
        close_output(src, oo, &filename, out_dir, &mut summary);
    }

    Ok(summary)
}

/// Creates a fresh output object seeded with its File symbol.
fn open_output(source_name: &str, output_target: Format) -> Object {
    println!("=== Opening file for {}", source_name);
    let mut oo = Object::new(output_target);
    oo.add_symbol(Symbol::new(source_name, 0, 0, SymbolKind::File, 0, None));
    oo
}

/// Finalizes one output object: relocation copy, compaction, data copy,
/// serialization. A failure in any step fails this file only.
fn close_output(src: &Object, mut oo: Object, filename: &str, out_dir: &Path, summary: &mut Summary) {
    println!("=== Closing file {}", filename);
    match finish_output(src, &mut oo, filename, out_dir) {
        Ok(path) => summary.outputs.push(path),
        Err(error) => {
            println!("Error writing file {}: {}", filename, error);
            summary.failures.push(FileFailure {
                file: filename.to_string(),
                error,
            });
        }
    }
}

fn finish_output(
    src: &Object,
    oo: &mut Object,
    filename: &str,
    out_dir: &Path,
) -> Result<std::path::PathBuf, DelinkError> {
    copy_relocations(src, oo)?;
    compact_functions(oo)?;
    copy_data(src, oo);
    let path = out_dir.join(filename);
    write_object(oo, &path)?;
    Ok(path)
}

/// Copies the relocations relevant to `dest` from the input object,
/// rebasing offsets by the output's first function offset and bringing
/// referenced data symbols and sections along.
pub fn copy_relocations(src: &Object, dest: &mut Object) -> Result<(), DelinkError> {
    println!("Copy relocations - src has {}", src.relocation_count());

    check_function_sequence(dest).map_err(|e| match e {
        DelinkError::OverlapDetected { address } => DelinkError::NonlinearSymbols { address },
        other => other,
    })?;

    let Some(first_function_offset) = dest
        .symbols()
        .find(|s| s.is_function())
        .map(|s| s.value)
    else {
        println!("No functions found in this output file - no need to copy relocations");
        return Ok(());
    };

    for r in src.relocations() {
        // relocations before this file's code belong to other files
        if r.offset < first_function_offset {
            continue;
        }
        let Some(target) = src.symbol_by_name(&r.symbol) else {
            continue;
        };

        match target.kind {
            SymbolKind::Function => {
                // a function relocation matters only if the function
                // landed in this output
                if dest.symbol_by_name(&target.name).is_some() {
                    dest.add_relocation(Relocation::new(
                        r.offset - first_function_offset,
                        r.kind,
                        r.addend,
                        r.symbol.clone(),
                    ));
                } else {
                    println!("Can't find symbol {} in output file", target.name);
                }
            }

            SymbolKind::Object => {
                // a data relocation must carry its symbol, and the symbol
                // its section
                let Some(src_sec) = target.section.and_then(|i| src.section(i)) else {
                    continue;
                };
                let sec_index = match dest.section_index(&src_sec.name) {
                    Some(i) => i,
                    None => dest.add_section(Section::new(
                        src_sec.name.clone(),
                        src_sec.address,
                        0,
                        src_sec.alignment,
                        src_sec.flags,
                    )),
                };
                if dest.symbol_by_name(&target.name).is_none() {
                    let Some(value) = target.value.checked_sub(src_sec.address) else {
                        continue;
                    };
                    dest.add_symbol(Symbol::new(
                        target.name.clone(),
                        value,
                        target.size,
                        target.kind,
                        target.flags,
                        Some(sec_index),
                    ));
                }
                dest.add_relocation(Relocation::new(
                    r.offset - first_function_offset,
                    r.kind,
                    r.addend,
                    r.symbol.clone(),
                ));
            }

            SymbolKind::Section => {
                if dest.symbol_by_name(&target.name).is_none() {
                    dest.add_symbol(Symbol::new(
                        target.name.clone(),
                        target.value,
                        target.size,
                        SymbolKind::Section,
                        target.flags,
                        None,
                    ));
                }
                dest.add_relocation(Relocation::new(
                    r.offset - first_function_offset,
                    r.kind,
                    r.addend,
                    r.symbol.clone(),
                ));
                // the backing section must exist too; its contents arrive
                // later in copy_data
                if dest.section_index(&target.name).is_none() {
                    let (address, alignment, flags) = src
                        .section_by_name(&target.name)
                        .map(|s| (s.address, s.alignment, s.flags))
                        .unwrap_or((0, 1, 0));
                    dest.add_section(Section::new(
                        target.name.clone(),
                        address,
                        0,
                        alignment,
                        flags,
                    ));
                }
            }

            _ => {}
        }
    }

    println!("Output file has {} relocations", dest.relocation_count());
    Ok(())
}

/// Copies every data section's full contents into same-named sections the
/// output already references. Data symbols carry no reliable sizes, so the
/// true per-file subset cannot be determined; over-copying the whole image
/// keeps every reference satisfied.
pub fn copy_data(src: &Object, dest: &mut Object) {
    for insec in src.sections().filter(|s| s.is_data()) {
        let name = insec.name.clone();
        let data = insec.data.clone();
        let size = insec.size;
        if let Some(outsec) = dest.section_by_name_mut(&name) {
            outsec.data = data;
            outsec.size = size;
        }
    }
}
