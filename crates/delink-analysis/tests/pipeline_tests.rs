//! End-to-end pipeline tests over synthetic inputs.
//!
//! Each test builds an input object in memory, runs the delinking pipeline
//! into a scratch directory, and re-reads the produced objects through the
//! container layer to check what a relinker would actually see.

use delink_analysis::{delink_object, Config, DelinkError};
use delink_core::{
    Format, Object, Section, Symbol, SymbolKind, SEC_FLAG_CODE, SEC_FLAG_INIT_DATA,
    SYM_FLAG_GLOBAL,
};
use delink_formats::read_object;
use std::fs;
use std::path::PathBuf;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("delink-pipeline-{}-{}", std::process::id(), name));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).expect("scratch dir");
    dir
}

fn func(name: &str, value: u64, size: u64, section: usize) -> Symbol {
    Symbol::new(name, value, size, SymbolKind::Function, SYM_FLAG_GLOBAL, Some(section))
}

fn file_sym(name: &str) -> Symbol {
    Symbol::new(name, 0, 0, SymbolKind::File, 0, None)
}

/// Two functions, data references in both directions, a cross-function
/// call, no symbol table: the full reconstruction path.
#[test]
fn reconstructed_input_produces_one_relinkable_object() {
    let code = vec![
        0xB8, 0x00, 0x20, 0x40, 0x00, // mov eax, 0x402000
        0xA3, 0x10, 0x20, 0x40, 0x00, // mov [0x402010], eax
        0xC3, // ret
        0x90, 0x90, // inter-function padding
        0xE8, 0xEE, 0xFF, 0xFF, 0xFF, // call 0x401000
        0xC3, // ret
    ];
    let mut obj = Object::new(Format::Elf32);
    let text = obj.add_section(Section::with_data(
        ".text",
        0x401000,
        code.clone(),
        4,
        SEC_FLAG_CODE,
    ));
    assert_eq!(text, 0);
    obj.add_section(Section::with_data(
        ".data",
        0x402000,
        vec![0xDD; 0x20],
        4,
        SEC_FLAG_INIT_DATA,
    ));
    obj.set_entry_point(0x40100D);

    let dir = scratch_dir("reconstruct");
    let config = Config {
        reconstruct_symbols: true,
        ..Config::default()
    };
    let summary = delink_object(&mut obj, &config, &dir).unwrap();

    assert!(summary.failures.is_empty(), "failures: {:?}", summary.failures);
    assert_eq!(summary.outputs.len(), 1);
    assert!(summary.outputs[0].ends_with("source.o"));

    let out = read_object(&summary.outputs[0]).expect("output parses");
    assert_eq!(out.format(), Format::Elf32);

    // the whole text image survives: both functions belong to this file
    let text = out.section_by_name(".text").expect(".text");
    assert_eq!(text.data.as_deref(), Some(code.as_slice()));

    // data image over-copied in full
    let data = out.section_by_name(".data").expect(".data");
    assert_eq!(data.size, 0x20);
    assert_eq!(data.data.as_deref(), Some(&[0xDD; 0x20][..]));

    // file marker, section proxy, two functions - the entry one renamed
    assert_eq!(out.symbol_count(), 4);
    assert!(out.symbol_by_name("source.c").is_some());
    assert!(out.symbol_by_name(".data").is_some());
    let first = out.symbol_by_name("fn000000").expect("first function");
    assert_eq!((first.value, first.size), (0, 0x0D));
    let main = out.symbol_by_name("main").expect("entry renamed to main");
    assert_eq!((main.value, main.size), (0x0D, 6));

    // two data relocations and the call relocation, rebased to offset 0
    assert_eq!(out.relocation_count(), 3);
    let offsets: Vec<u64> = out.relocations().map(|r| r.offset).collect();
    assert!(offsets.contains(&0x1));
    assert!(offsets.contains(&0x6));
    assert!(offsets.contains(&0x0E));
}

/// Consecutive duplicate File symbols open one output, not two.
#[test]
fn duplicate_file_symbols_coalesce() {
    let mut obj = Object::new(Format::Elf32);
    obj.add_section(Section::with_data(
        ".text",
        0x401000,
        vec![0x55, 0xC3, 0x55, 0xC3],
        4,
        SEC_FLAG_CODE,
    ));
    obj.add_symbol(file_sym("liba.c"));
    obj.add_symbol(file_sym("liba.c"));
    obj.add_symbol(func("one", 0x401000, 2, 0));
    obj.add_symbol(func("two", 0x401002, 2, 0));

    let dir = scratch_dir("duplicates");
    let summary = delink_object(&mut obj, &Config::default(), &dir).unwrap();

    assert!(summary.failures.is_empty(), "failures: {:?}", summary.failures);
    assert_eq!(summary.outputs.len(), 1);
    assert!(summary.outputs[0].ends_with("liba.o"));

    let out = read_object(&summary.outputs[0]).unwrap();
    assert!(out.symbol_by_name("one").is_some());
    assert!(out.symbol_by_name("two").is_some());
}

/// A zero-size function cannot be a real function; it is stored as an
/// untyped external. Reserved-prefix names never reach the output.
#[test]
fn zero_size_functions_become_untyped_externals() {
    let mut obj = Object::new(Format::Elf32);
    obj.add_section(Section::with_data(
        ".text",
        0x401000,
        vec![0x55, 0x90, 0x90, 0xC3],
        4,
        SEC_FLAG_CODE,
    ));
    obj.add_symbol(file_sym("app.c"));
    obj.add_symbol(func("go", 0x401000, 4, 0));
    obj.add_symbol(func("stub", 0x401004, 0, 0));
    obj.add_symbol(func("_internal", 0x401004, 0, 0));

    let dir = scratch_dir("zerosize");
    let summary = delink_object(&mut obj, &Config::default(), &dir).unwrap();
    assert!(summary.failures.is_empty(), "failures: {:?}", summary.failures);

    let out = read_object(&summary.outputs[0]).unwrap();
    let stub = out.symbol_by_name("stub").expect("external kept");
    assert_eq!(stub.kind, SymbolKind::None);
    assert!(stub.is_external());
    assert!(stub.is_global());

    let go = out.symbol_by_name("go").expect("real function kept");
    assert!(go.is_function());

    assert!(out.symbol_by_name("_internal").is_none(), "reserved name skipped");
}

/// A file group without functions fails its own output and is surfaced;
/// the rest of the run continues. File markers without the source suffix
/// never consume an output.
#[test]
fn per_file_failures_are_surfaced_not_fatal() {
    let mut obj = Object::new(Format::Elf32);
    obj.add_section(Section::with_data(
        ".text",
        0x401000,
        vec![0x55, 0xC3],
        4,
        SEC_FLAG_CODE,
    ));
    obj.add_symbol(file_sym("crt0")); // not a .c boundary
    obj.add_symbol(file_sym("empty.c")); // opens a group that gets nothing
    obj.add_symbol(file_sym("app.c"));
    obj.add_symbol(func("go", 0x401000, 2, 0));

    let dir = scratch_dir("perfile");
    let summary = delink_object(&mut obj, &Config::default(), &dir).unwrap();

    assert_eq!(summary.outputs.len(), 1);
    assert!(summary.outputs[0].ends_with("app.o"));
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].file, "empty.o");
    assert!(matches!(
        summary.failures[0].error,
        DelinkError::NoTextSection(_)
    ));
    assert!(!dir.join("empty.o").exists());
    assert!(!dir.join("crt0.o").exists());
}

/// No symbols and no reconstruction request is a hard failure.
#[test]
fn missing_symbols_without_reconstruction_is_fatal() {
    let mut obj = Object::new(Format::Elf32);
    obj.add_section(Section::with_data(
        ".text",
        0x401000,
        vec![0xC3],
        4,
        SEC_FLAG_CODE,
    ));
    let dir = scratch_dir("nosyms");
    assert!(matches!(
        delink_object(&mut obj, &Config::default(), &dir),
        Err(DelinkError::NoSymbols)
    ));
}

/// A text section holding nothing but a return reconstructs no functions.
#[test]
fn lone_ret_reports_no_symbols_after_reconstruct() {
    let mut obj = Object::new(Format::Elf32);
    obj.add_section(Section::with_data(
        ".text",
        0x401000,
        vec![0xC3],
        4,
        SEC_FLAG_CODE,
    ));
    let dir = scratch_dir("loneret");
    let config = Config {
        reconstruct_symbols: true,
        ..Config::default()
    };
    assert!(matches!(
        delink_object(&mut obj, &config, &dir),
        Err(DelinkError::NoSymbolsAfterReconstruct)
    ));
}

/// The -O override changes the output container independently of the input.
#[test]
fn output_target_override_is_honored() {
    let mut obj = Object::new(Format::Elf32);
    obj.add_section(Section::with_data(
        ".text",
        0x401000,
        vec![0x55, 0xC3],
        4,
        SEC_FLAG_CODE,
    ));
    obj.add_symbol(file_sym("app.c"));
    obj.add_symbol(func("go", 0x401000, 2, 0));

    let dir = scratch_dir("target");
    let config = Config {
        output_target: Some(Format::Elf64),
        ..Config::default()
    };
    let summary = delink_object(&mut obj, &config, &dir).unwrap();
    assert!(summary.failures.is_empty(), "failures: {:?}", summary.failures);

    let out = read_object(&summary.outputs[0]).unwrap();
    assert_eq!(out.format(), Format::Elf64);
}

/// Splitting rebases function addresses to their section, and compaction
/// strips code belonging to files that came before.
#[test]
fn later_file_gets_compacted_text() {
    // one file's worth of foreign code, then this file's two functions
    let mut code = vec![0x90; 0x10]; // foreign
    code.extend_from_slice(&[0x55, 0x89, 0xE5, 0xC9, 0xC3]); // go: 5 bytes
    code.extend_from_slice(&[0x55, 0xC3]); // tail: 2 bytes
    let mut obj = Object::new(Format::Elf32);
    obj.add_section(Section::with_data(".text", 0x401000, code, 4, SEC_FLAG_CODE));
    obj.add_symbol(file_sym("late.c"));
    obj.add_symbol(func("go", 0x401010, 5, 0));
    obj.add_symbol(func("tail", 0x401015, 2, 0));

    let dir = scratch_dir("compacted");
    let summary = delink_object(&mut obj, &Config::default(), &dir).unwrap();
    assert!(summary.failures.is_empty(), "failures: {:?}", summary.failures);

    let out = read_object(&summary.outputs[0]).unwrap();
    let text = out.section_by_name(".text").unwrap();
    assert_eq!(text.size, 7, "only this file's code remains");
    assert_eq!(
        text.data.as_deref(),
        Some(&[0x55, 0x89, 0xE5, 0xC9, 0xC3, 0x55, 0xC3][..])
    );
    assert_eq!(out.symbol_by_name("go").unwrap().value, 0);
    assert_eq!(out.symbol_by_name("tail").unwrap().value, 5);
}
