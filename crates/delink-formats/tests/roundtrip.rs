//! Write/read round trips through the ELF serializer.
//!
//! An object produced by the output assembler must survive serialization:
//! rereading it yields the same section contents, symbol count and
//! relocation set that were written.

use delink_core::{
    Format, Object, RelocKind, Relocation, Section, Symbol, SymbolKind, SEC_FLAG_CODE,
    SEC_FLAG_INIT_DATA, SEC_FLAG_UNINIT_DATA, SYM_FLAG_EXTERNAL, SYM_FLAG_GLOBAL,
};
use delink_formats::{detect_format, read_object_bytes, write_object_bytes, WriteError};

/// A representative output object: code, data, bss, a file marker, a
/// section proxy, defined functions and an imported routine.
fn sample_object(format: Format) -> Object {
    let mut obj = Object::new(format);
    let text = obj.add_section(Section::with_data(
        ".text",
        0,
        vec![0x55, 0x89, 0xE5, 0xC9, 0xC3, 0x90, 0x55, 0xC3],
        4,
        SEC_FLAG_CODE,
    ));
    obj.add_section(Section::with_data(
        ".data",
        0x402000,
        vec![0xAA; 0x10],
        4,
        SEC_FLAG_INIT_DATA,
    ));
    let mut bss = Section::new(".bss", 0x403000, 0x20, 4, SEC_FLAG_UNINIT_DATA);
    bss.data = None;
    obj.add_section(bss);

    obj.add_symbol(Symbol::new("demo.c", 0, 0, SymbolKind::File, 0, None));
    obj.add_symbol(Symbol::new(".data", 0, 0, SymbolKind::Section, 0, None));
    obj.add_symbol(Symbol::new(
        "main",
        0,
        5,
        SymbolKind::Function,
        SYM_FLAG_GLOBAL,
        Some(text),
    ));
    obj.add_symbol(Symbol::new(
        "fn000006",
        6,
        2,
        SymbolKind::Function,
        SYM_FLAG_GLOBAL,
        Some(text),
    ));
    obj.add_symbol(Symbol::new(
        "puts",
        0,
        0,
        SymbolKind::None,
        SYM_FLAG_GLOBAL | SYM_FLAG_EXTERNAL,
        None,
    ));

    obj.add_relocation(Relocation::new(1, RelocKind::Absolute, 0x8, ".data"));
    obj.add_relocation(Relocation::new(3, RelocKind::PcRelative, -4, "main"));
    obj
}

fn assert_round_trip(format: Format) {
    let obj = sample_object(format);
    let bytes = write_object_bytes(&obj).expect("serialization succeeds");

    assert_eq!(detect_format(&bytes), format);
    let reread = read_object_bytes(&bytes).expect("own output parses");

    assert_eq!(reread.format(), format);
    assert_eq!(reread.section_count(), obj.section_count());
    assert_eq!(reread.symbol_count(), obj.symbol_count());
    assert_eq!(reread.relocation_count(), obj.relocation_count());

    for section in obj.sections() {
        let back = reread
            .section_by_name(&section.name)
            .unwrap_or_else(|| panic!("section {} survives", section.name));
        assert_eq!(back.size, section.size, "size of {}", section.name);
        assert_eq!(back.address, section.address, "address of {}", section.name);
        assert_eq!(back.data, section.data, "contents of {}", section.name);
        assert_eq!(back.flags, section.flags, "flags of {}", section.name);
    }

    // the relocation set survives: same offsets, kinds, addends, targets
    let mut written: Vec<_> = obj.relocations().cloned().collect();
    let mut reread_relocs: Vec<_> = reread.relocations().cloned().collect();
    written.sort_by_key(|r| r.offset);
    reread_relocs.sort_by_key(|r| r.offset);
    assert_eq!(written, reread_relocs);

    // key symbols keep their identity
    let main = reread.symbol_by_name("main").expect("main survives");
    assert!(main.is_function());
    assert!(main.is_global());
    assert_eq!(main.size, 5);

    let puts = reread.symbol_by_name("puts").expect("puts survives");
    assert!(puts.is_external());
    assert_eq!(puts.kind, SymbolKind::None);

    let proxy = reread.symbol_by_name(".data").expect("proxy survives");
    assert_eq!(proxy.kind, SymbolKind::Section);
}

#[test]
fn elf32_round_trip() {
    assert_round_trip(Format::Elf32);
}

#[test]
fn elf64_round_trip() {
    assert_round_trip(Format::Elf64);
}

#[test]
fn dangling_relocation_fails_serialization() {
    let mut obj = sample_object(Format::Elf64);
    obj.add_relocation(Relocation::new(2, RelocKind::Absolute, 0, "nonexistent"));
    assert!(matches!(
        write_object_bytes(&obj),
        Err(WriteError::DanglingRelocation { .. })
    ));
}

#[test]
fn undeclared_format_cannot_serialize() {
    let obj = Object::new(Format::None);
    assert!(matches!(
        write_object_bytes(&obj),
        Err(WriteError::UnsupportedFormat(_))
    ));
}

#[test]
fn coff_output_serializes() {
    let obj = sample_object(Format::Pe32);
    let bytes = write_object_bytes(&obj).expect("COFF serialization succeeds");
    // i386 COFF object magic
    assert_eq!(&bytes[0..2], &0x14Cu16.to_le_bytes());
    // section count
    assert_eq!(&bytes[2..4], &3u16.to_le_bytes());
}
