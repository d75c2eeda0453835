use implib_writer::{import_descriptor_symbol, null_thunk_symbol, ArchSpec, ImportLibraryBuilder};
use object::pe;
use pretty_assertions::assert_eq;

mod common;

fn kernel32_x64() -> Vec<u8> {
    let mut builder =
        ImportLibraryBuilder::new("kernel32.dll", "kernel32.dll", ArchSpec::X64).unwrap();
    builder
        .add_by_name("__imp_ExitProcess", Some("ExitProcess"), "ExitProcess")
        .unwrap();
    builder.build().unwrap()
}

#[test]
fn single_name_import_x64() {
    let archive = kernel32_x64();
    let members = common::archive_members(&archive);

    assert_eq!(members.len(), 4);
    for (name, coff) in &members {
        assert_eq!(name, "kernel32.dll");
        assert_eq!(common::machine(coff), 0x8664);
    }

    assert_eq!(
        common::public_symbols(&members[0].1),
        vec!["__IMPORT_DESCRIPTOR_kernel32.dll"]
    );
    assert_eq!(common::public_symbols(&members[1].1), Vec::<String>::new());
    assert_eq!(
        common::public_symbols(&members[2].1),
        vec!["ExitProcess", "__imp_ExitProcess"]
    );
    assert_eq!(
        common::public_symbols(&members[3].1),
        vec!["kernel32.dll_NULL_THUNK_DATA"]
    );
}

#[test]
fn x64_thunk_member_layout() {
    let archive = kernel32_x64();
    let members = common::archive_members(&archive);
    let thunk = &members[2].1;

    assert_eq!(
        common::section_names(thunk),
        vec![".text", ".idata$5", ".idata$4", ".idata$6"]
    );

    // The stub jumps through the IAT entry, rip-relative on x64.
    assert_eq!(common::section_data(thunk, ".text"), [0xFF, 0x25, 0, 0, 0, 0]);
    assert_eq!(
        common::relocations(thunk, ".text"),
        vec![(2, pe::IMAGE_REL_AMD64_REL32, "__imp_ExitProcess".to_string())]
    );

    // IAT and ILT entries are zero words relocated against the hint/name
    // block.
    for section in [".idata$5", ".idata$4"] {
        assert_eq!(common::section_data(thunk, section), [0u8; 8]);
        assert_eq!(
            common::relocations(thunk, section),
            vec![(0, pe::IMAGE_REL_AMD64_ADDR32NB, ".idata$6".to_string())]
        );
    }

    // Hint 0, then the NUL-terminated export name, padded to even length.
    let mut hint_name = vec![0, 0];
    hint_name.extend_from_slice(b"ExitProcess\0");
    assert_eq!(common::section_data(thunk, ".idata$6"), hint_name);
}

#[test]
fn head_member_layout() {
    let archive = kernel32_x64();
    let members = common::archive_members(&archive);
    let head = &members[0].1;

    assert_eq!(common::section_names(head), vec![".idata$2", ".idata$6"]);
    assert_eq!(common::section_data(head, ".idata$2"), [0u8; 20]);
    // The DLL name is NUL-terminated and padded to even length.
    assert_eq!(common::section_data(head, ".idata$6"), b"kernel32.dll\0\0");

    let relocs = common::relocations(head, ".idata$2");
    assert_eq!(relocs.len(), 3);
    assert_eq!(relocs[0], (12, pe::IMAGE_REL_AMD64_ADDR32NB, ".idata$6".to_string()));
    assert_eq!(
        relocs[1],
        (0, pe::IMAGE_REL_AMD64_ADDR32NB, "__IMPORT_DESCRIPTOR_kernel32.dll".to_string())
    );
    assert_eq!(
        relocs[2],
        (16, pe::IMAGE_REL_AMD64_ADDR32NB, "kernel32.dll_NULL_THUNK_DATA".to_string())
    );
}

#[test]
fn decorated_stdcall_import_x86() {
    let mut builder =
        ImportLibraryBuilder::new("kernel32.dll", "kernel32.dll", ArchSpec::X86).unwrap();
    builder
        .add_by_name("__imp__ExitProcess@4", Some("_ExitProcess@4"), "ExitProcess")
        .unwrap();
    let archive = builder.build().unwrap();
    let members = common::archive_members(&archive);
    let thunk = &members[2].1;

    assert_eq!(common::machine(thunk), 0x14C);
    assert_eq!(
        common::public_symbols(thunk),
        vec!["_ExitProcess@4", "__imp__ExitProcess@4"]
    );

    // Same stub bytes as x64, but the operand is an absolute address.
    assert_eq!(common::section_data(thunk, ".text"), [0xFF, 0x25, 0, 0, 0, 0]);
    assert_eq!(
        common::relocations(thunk, ".text"),
        vec![(2, pe::IMAGE_REL_I386_DIR32, "__imp__ExitProcess@4".to_string())]
    );

    for section in [".idata$5", ".idata$4"] {
        assert_eq!(common::section_data(thunk, section), [0u8; 4]);
        assert_eq!(
            common::relocations(thunk, section),
            vec![(0, pe::IMAGE_REL_I386_DIR32NB, ".idata$6".to_string())]
        );
    }
}

#[test]
fn ordinal_import_skips_stub_and_hint_name() {
    let mut builder = ImportLibraryBuilder::new("util.dll", "util.dll", ArchSpec::X86).unwrap();
    builder.add_by_ordinal("__imp_Proc1", None, 17).unwrap();
    let archive = builder.build().unwrap();
    let members = common::archive_members(&archive);
    let thunk = &members[2].1;

    // No stub without a thunk name, no hint/name block for an ordinal.
    assert_eq!(common::section_names(thunk), vec![".idata$5", ".idata$4"]);
    assert_eq!(common::public_symbols(thunk), vec!["__imp_Proc1"]);

    for section in [".idata$5", ".idata$4"] {
        assert_eq!(common::section_data(thunk, section), [0x11, 0, 0, 0x80]);
        assert_eq!(common::relocations(thunk, section), vec![]);
    }
}

#[test]
fn ordinal_import_x64_high_bit() {
    let mut builder = ImportLibraryBuilder::new("util.dll", "util.dll", ArchSpec::X64).unwrap();
    builder.add_by_ordinal("__imp_Proc1", None, 17).unwrap();
    let archive = builder.build().unwrap();
    let members = common::archive_members(&archive);

    assert_eq!(
        common::section_data(&members[2].1, ".idata$5"),
        [0x11, 0, 0, 0, 0, 0, 0, 0x80]
    );
}

#[test]
fn empty_symbol_list() {
    let builder = ImportLibraryBuilder::new("foo.dll", "foo.dll", ArchSpec::X64).unwrap();
    let archive = builder.build().unwrap();
    let members = common::archive_members(&archive);

    // Head, null descriptor and null thunk only.
    assert_eq!(members.len(), 3);

    let (_, directory) = common::second_linker_directory(&archive);
    assert_eq!(
        directory,
        vec![
            (import_descriptor_symbol("foo.dll"), 1),
            (null_thunk_symbol("foo.dll"), 3),
        ]
    );
}

#[test]
fn deterministic_output() {
    assert_eq!(kernel32_x64(), kernel32_x64());
}

#[test]
fn builders_do_not_share_state() {
    let build = |dll: &str| {
        let mut builder = ImportLibraryBuilder::new(dll, dll, ArchSpec::X64).unwrap();
        builder.add_by_name("__imp_Shared", Some("Shared"), "Shared").unwrap();
        builder.build().unwrap()
    };
    let first = build("one.dll");
    let second = build("two.dll");

    let (_, first_directory) = common::second_linker_directory(&first);
    let (_, second_directory) = common::second_linker_directory(&second);
    assert!(first_directory.iter().any(|(name, _)| name == "__imp_Shared"));
    assert!(second_directory.iter().any(|(name, _)| name == "__imp_Shared"));
    assert!(first_directory
        .iter()
        .all(|(name, _)| !name.contains("two.dll")));
}

#[test]
fn second_linker_member_sorted_case_insensitively() {
    let mut builder = ImportLibraryBuilder::new("abc.dll", "abc.dll", ArchSpec::X64).unwrap();
    builder.add_by_name("__imp_zeta", None, "zeta").unwrap();
    // Sorts before the existing symbol even though it is added later.
    builder.add_by_name("__imp_Alpha", None, "Alpha").unwrap();
    let archive = builder.build().unwrap();

    let (member_offsets, directory) = common::second_linker_directory(&archive);
    let names: Vec<&str> = directory.iter().map(|(name, _)| name.as_str()).collect();
    let mut sorted = names.clone();
    sorted.sort_by_key(|name| name.to_ascii_lowercase());
    assert_eq!(names, sorted);

    let alpha = directory.iter().find(|(name, _)| name == "__imp_Alpha").unwrap();
    let zeta = directory.iter().find(|(name, _)| name == "__imp_zeta").unwrap();
    assert_eq!(alpha.1, 4);
    assert_eq!(zeta.1, 3);

    // Each directory entry maps to a member that really defines the symbol.
    for (name, index) in &directory {
        let offset = member_offsets[usize::from(*index) - 1] as usize;
        let payload = common::member_payload_at(&archive, offset);
        assert!(
            common::public_symbols(payload).iter().any(|s| s == name),
            "{name} not defined by member {index}"
        );
    }
}

#[test]
fn linker_members_agree() {
    let archive = kernel32_x64();
    let first = common::first_linker_directory(&archive);
    let (member_offsets, second) = common::second_linker_directory(&archive);

    // Insertion order in the first member: head first, then the thunk
    // member's symbols, then the null thunk.
    let first_names: Vec<&str> = first.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(
        first_names,
        vec![
            "__IMPORT_DESCRIPTOR_kernel32.dll",
            "ExitProcess",
            "__imp_ExitProcess",
            "kernel32.dll_NULL_THUNK_DATA",
        ]
    );

    // Both directories resolve every symbol to the same member offset.
    for (name, offset) in &first {
        let (_, index) = second.iter().find(|(n, _)| n == name).unwrap();
        assert_eq!(member_offsets[usize::from(*index) - 1], *offset, "{name}");
    }
}

#[test]
fn payload_offsets_are_even() {
    let mut builder = ImportLibraryBuilder::new("odd.dll", "odd.dll", ArchSpec::X64).unwrap();
    builder.add_by_name("__imp_A", None, "A").unwrap();
    builder.add_by_name("__imp_Bee", Some("Bee"), "Bee").unwrap();
    builder.add_by_ordinal("__imp_Cee", None, 3).unwrap();
    let archive = builder.build().unwrap();

    for (offset, name, _) in common::raw_members(&archive) {
        assert_eq!(offset % 2, 0, "member {name} at odd offset {offset}");
    }
}

#[test]
fn member_names_truncated_to_15_bytes() {
    let dll = "averylonglibraryname.dll";
    let mut builder = ImportLibraryBuilder::new(dll, dll, ArchSpec::X64).unwrap();
    builder.add_by_name("__imp_Func", None, "Func").unwrap();
    let archive = builder.build().unwrap();

    let members = common::archive_members(&archive);
    for (name, _) in &members {
        assert_eq!(name, "averylonglibrar");
    }

    // The full DLL name still appears in the import-descriptor symbol.
    let (_, directory) = common::second_linker_directory(&archive);
    assert!(directory
        .iter()
        .any(|(name, _)| name == &import_descriptor_symbol(dll)));
}
