#![allow(dead_code)]

use object::read::archive::ArchiveFile;
use object::{Object, ObjectSection, ObjectSymbol, RelocationTarget};

/// `(name, payload)` of every user member. The linker members are not
/// user members; they are filtered out whether or not the archive reader
/// already skipped them.
pub fn archive_members(archive: &[u8]) -> Vec<(String, Vec<u8>)> {
    let file = ArchiveFile::parse(archive).unwrap();
    file.members()
        .map(|member| {
            let member = member.unwrap();
            (
                String::from_utf8(member.name().to_vec()).unwrap(),
                member.data(archive).unwrap().to_vec(),
            )
        })
        .filter(|(name, _)| !name.is_empty() && name != "/")
        .collect()
}

/// Walks the raw member headers: `(header offset, name field, payload size)`
/// for every member including the linker members.
pub fn raw_members(archive: &[u8]) -> Vec<(usize, String, usize)> {
    assert_eq!(&archive[..8], b"!<arch>\n");
    let mut members = Vec::new();
    let mut offset = 8;
    while offset < archive.len() {
        let header = &archive[offset..offset + 60];
        assert_eq!(&header[58..60], b"`\n", "bad header terminator at {offset}");
        let name = std::str::from_utf8(&header[..16])
            .unwrap()
            .trim_end()
            .to_string();
        let size: usize = std::str::from_utf8(&header[48..58])
            .unwrap()
            .trim_end()
            .parse()
            .unwrap();
        members.push((offset, name, size));
        offset += 60 + size + size % 2;
    }
    members
}

/// Payload of the member whose header is at `offset`.
pub fn member_payload_at(archive: &[u8], offset: usize) -> &[u8] {
    let size: usize = std::str::from_utf8(&archive[offset + 48..offset + 58])
        .unwrap()
        .trim_end()
        .parse()
        .unwrap();
    &archive[offset + 60..offset + 60 + size]
}

fn name_blob(data: &[u8], count: usize) -> Vec<String> {
    data.split(|&b| b == 0)
        .take(count)
        .map(|name| String::from_utf8(name.to_vec()).unwrap())
        .collect()
}

/// Symbol directory of the first linker member: `(name, member offset)` in
/// symbol insertion order, offsets big-endian.
pub fn first_linker_directory(archive: &[u8]) -> Vec<(String, u32)> {
    let raw = raw_members(archive);
    assert_eq!(raw[0].1, "/");
    let data = member_payload_at(archive, raw[0].0);
    let count = u32::from_be_bytes(data[..4].try_into().unwrap()) as usize;
    let offsets: Vec<u32> = (0..count)
        .map(|i| u32::from_be_bytes(data[4 + 4 * i..8 + 4 * i].try_into().unwrap()))
        .collect();
    let names = name_blob(&data[4 + 4 * count..], count);
    names.into_iter().zip(offsets).collect()
}

/// Second linker member: the member-offset array and the sorted symbol
/// directory as `(name, 1-based member index)`, everything little-endian.
pub fn second_linker_directory(archive: &[u8]) -> (Vec<u32>, Vec<(String, u16)>) {
    let raw = raw_members(archive);
    assert_eq!(raw[1].1, "/");
    let data = member_payload_at(archive, raw[1].0);

    let member_count = u32::from_le_bytes(data[..4].try_into().unwrap()) as usize;
    let mut pos = 4;
    let member_offsets: Vec<u32> = (0..member_count)
        .map(|i| u32::from_le_bytes(data[pos + 4 * i..pos + 4 * i + 4].try_into().unwrap()))
        .collect();
    pos += 4 * member_count;

    let symbol_count = u32::from_le_bytes(data[pos..pos + 4].try_into().unwrap()) as usize;
    pos += 4;
    let indices: Vec<u16> = (0..symbol_count)
        .map(|i| u16::from_le_bytes(data[pos + 2 * i..pos + 2 * i + 2].try_into().unwrap()))
        .collect();
    pos += 2 * symbol_count;

    let names = name_blob(&data[pos..], symbol_count);
    (member_offsets, names.into_iter().zip(indices).collect())
}

/// Machine field of a COFF object's file header.
pub fn machine(coff: &[u8]) -> u16 {
    u16::from_le_bytes(coff[..2].try_into().unwrap())
}

/// Defined external symbols, in symbol-table order.
pub fn public_symbols(coff: &[u8]) -> Vec<String> {
    let file = object::File::parse(coff).unwrap();
    file.symbols()
        .filter(|symbol| symbol.is_global() && !symbol.is_undefined())
        .map(|symbol| symbol.name().unwrap().to_string())
        .collect()
}

pub fn section_names(coff: &[u8]) -> Vec<String> {
    let file = object::File::parse(coff).unwrap();
    file.sections()
        .map(|section| section.name().unwrap().to_string())
        .collect()
}

pub fn section_data(coff: &[u8], name: &str) -> Vec<u8> {
    let file = object::File::parse(coff).unwrap();
    file.section_by_name(name)
        .unwrap_or_else(|| panic!("no section {name}"))
        .data()
        .unwrap()
        .to_vec()
}

/// `(offset, raw type, target symbol name)` for each relocation of the
/// named section, in emission order.
pub fn relocations(coff: &[u8], name: &str) -> Vec<(u64, u16, String)> {
    let file = object::File::parse(coff).unwrap();
    let section = file
        .section_by_name(name)
        .unwrap_or_else(|| panic!("no section {name}"));
    section
        .relocations()
        .map(|(offset, relocation)| {
            let typ = match relocation.flags() {
                object::RelocationFlags::Coff { typ } => typ,
                other => panic!("unexpected relocation flags {other:?}"),
            };
            let target = match relocation.target() {
                RelocationTarget::Symbol(index) => file
                    .symbol_by_index(index)
                    .unwrap()
                    .name()
                    .unwrap()
                    .to_string(),
                other => panic!("unexpected relocation target {other:?}"),
            };
            (offset, typ, target)
        })
        .collect()
}
