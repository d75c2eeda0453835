//! Builds the COFF members an import library is made of: the import
//! descriptor, the null descriptor that terminates the descriptor array,
//! one thunk member per imported function, and the null thunk that
//! terminates the IAT and ILT chains.

use crate::coff::{ArchSpec, RelocKind, SectionFlags, StorageKind};
use crate::coff_writer::{CoffWriter, Relocation, Section};
use crate::error::Result;

pub(crate) const IMPORT_DESCRIPTOR_PREFIX: &str = "__IMPORT_DESCRIPTOR_";
pub(crate) const NULL_THUNK_DATA_SUFFIX: &str = "_NULL_THUNK_DATA";

/// Size of one IMAGE_IMPORT_DESCRIPTOR entry.
const IMPORT_DESCRIPTOR_SIZE: usize = 20;

/// Local label for the hint/name and DLL-name blocks in `.idata$6`.
const HINT_NAME_LABEL: &str = ".idata$6";

/// Name of the symbol the import descriptor of `dll_name` is published
/// under.
pub fn import_descriptor_symbol(dll_name: &str) -> String {
    format!("{IMPORT_DESCRIPTOR_PREFIX}{dll_name}")
}

/// Name of the symbol that marks the IAT/ILT terminator of `dll_name`.
pub fn null_thunk_symbol(dll_name: &str) -> String {
    format!("{dll_name}{NULL_THUNK_DATA_SUFFIX}")
}

/// How one imported function is located in its DLL.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum ImportName<'a> {
    /// Looked up by export name; the hint is the loader's first guess at
    /// the export-table position (an ordinal, or zero for none).
    Name { name: &'a str, hint: u16 },
    /// Looked up by ordinal only; no hint/name block is emitted.
    Ordinal(u16),
}

fn data_section(name: &str, arch: &ArchSpec) -> Result<Section> {
    Section::new(name, SectionFlags::READ | SectionFlags::WRITE | arch.data_align())
}

fn hint_name_section(hint: u16, name: &str) -> Result<Section> {
    let mut block = Vec::with_capacity(2 + name.len() + 2);
    block.extend_from_slice(&hint.to_le_bytes());
    block.extend_from_slice(name.as_bytes());
    block.push(0);
    if block.len() % 2 != 0 {
        block.push(0);
    }
    let mut section = Section::new(
        HINT_NAME_LABEL,
        SectionFlags::READ | SectionFlags::WRITE | SectionFlags::ALIGN_2,
    )?;
    section.append_data(&block, vec![]);
    Ok(section)
}

/// The head member: one IMAGE_IMPORT_DESCRIPTOR in `.idata$2` and the
/// NUL-terminated DLL name in `.idata$6`. Publishes
/// `__IMPORT_DESCRIPTOR_<dll>`; the reference to `<dll>_NULL_THUNK_DATA`
/// is left undefined and resolves against the null thunk member.
pub fn import_descriptor(dll_name: &str, arch: ArchSpec) -> Result<CoffWriter> {
    let mut object = CoffWriter::new(arch);
    let descriptor_symbol = import_descriptor_symbol(dll_name);

    // Descriptor fields patched at link time: Name at 12, then the thunk
    // array pointers at 0 and 16.
    let mut idata2 = data_section(".idata$2", &arch)?;
    idata2.append_data(
        &[0; IMPORT_DESCRIPTOR_SIZE],
        vec![
            Relocation::new(HINT_NAME_LABEL, 12, RelocKind::Rva32),
            Relocation::new(&descriptor_symbol, 0, RelocKind::Rva32),
            Relocation::new(null_thunk_symbol(dll_name), 16, RelocKind::Rva32),
        ],
    );

    let mut name_block = dll_name.as_bytes().to_vec();
    name_block.push(0);
    if name_block.len() % 2 != 0 {
        name_block.push(0);
    }
    let mut idata6 = Section::new(
        HINT_NAME_LABEL,
        SectionFlags::READ | SectionFlags::WRITE | SectionFlags::ALIGN_2,
    )?;
    idata6.append_data(&name_block, vec![]);

    let idata2 = object.append_section(idata2);
    let idata6 = object.append_section(idata6);

    object.add_symbol(Some(idata2), 0, &descriptor_symbol, StorageKind::Extern, 0);
    object.add_symbol(Some(idata6), 0, HINT_NAME_LABEL, StorageKind::Static, 1);
    let aux = object.section_aux(idata6, None, None);
    object.add_aux_data(aux);

    object.push_relocs();
    Ok(object)
}

/// The sentinel that ends the import-descriptor array once the linker has
/// concatenated every DLL's `.idata$2` contribution.
pub fn null_import_descriptor(arch: ArchSpec) -> Result<CoffWriter> {
    let mut object = CoffWriter::new(arch);
    let mut idata3 = data_section(".idata$3", &arch)?;
    idata3.append_data(&[0; IMPORT_DESCRIPTOR_SIZE], vec![]);
    object.append_section(idata3);
    object.push_relocs();
    Ok(object)
}

/// One imported function: an optional `.text` jump stub, the IAT and ILT
/// words in `.idata$5`/`.idata$4`, and for imports by name the hint/name
/// block in `.idata$6`. Publishes `pub_name` on the IAT word and, when a
/// stub is requested, `thunk_name` on the stub.
pub fn import_thunk(
    pub_name: &str,
    thunk_name: Option<&str>,
    import: ImportName<'_>,
    arch: ArchSpec,
) -> Result<CoffWriter> {
    let mut object = CoffWriter::new(arch);

    let text = match thunk_name {
        Some(_) => {
            let mut text = Section::new(
                ".text",
                SectionFlags::READ
                    | SectionFlags::EXEC
                    | SectionFlags::CODE
                    | SectionFlags::ALIGN_16,
            )?;
            text.append_data(
                &arch.stub_bytes,
                vec![Relocation::new(pub_name, 2, arch.stub_reloc)],
            );
            Some(text)
        }
        None => None,
    };

    // The IAT and ILT carry the same word: zero with a relocation into the
    // hint/name block for imports by name, the high-bit-tagged ordinal for
    // imports by ordinal.
    let entry_word = |arch: &ArchSpec| -> (Vec<u8>, Vec<Relocation>) {
        match import {
            ImportName::Name { .. } => (
                vec![0; arch.ptr_width as usize],
                vec![Relocation::new(HINT_NAME_LABEL, 0, RelocKind::Rva32)],
            ),
            ImportName::Ordinal(ordinal) => (arch.ordinal_word(ordinal), vec![]),
        }
    };

    let mut idata5 = data_section(".idata$5", &arch)?;
    let (word, relocs) = entry_word(&arch);
    idata5.append_data(&word, relocs);

    let mut idata4 = data_section(".idata$4", &arch)?;
    let (word, relocs) = entry_word(&arch);
    idata4.append_data(&word, relocs);

    let text = text.map(|t| object.append_section(t));
    let idata5 = object.append_section(idata5);
    object.append_section(idata4);
    let idata6 = match import {
        ImportName::Name { name, hint } => {
            Some(object.append_section(hint_name_section(hint, name)?))
        }
        ImportName::Ordinal(_) => None,
    };

    if let (Some(thunk_name), Some(text)) = (thunk_name, text) {
        object.add_symbol(Some(text), 0, thunk_name, StorageKind::Function, 0);
    }
    object.add_symbol(Some(idata5), 0, pub_name, StorageKind::Extern, 0);
    if let Some(idata6) = idata6 {
        object.add_symbol(Some(idata6), 0, HINT_NAME_LABEL, StorageKind::Static, 1);
        let aux = object.section_aux(idata6, None, None);
        object.add_aux_data(aux);
    }

    object.push_relocs();
    Ok(object)
}

/// The per-DLL terminator: one zero word in `.idata$5` and `.idata$4`,
/// published as `<dll>_NULL_THUNK_DATA`.
pub fn null_thunk(dll_name: &str, arch: ArchSpec) -> Result<CoffWriter> {
    let mut object = CoffWriter::new(arch);
    let word = vec![0u8; arch.ptr_width as usize];

    let mut idata5 = data_section(".idata$5", &arch)?;
    idata5.append_data(&word, vec![]);
    let mut idata4 = data_section(".idata$4", &arch)?;
    idata4.append_data(&word, vec![]);

    let idata5 = object.append_section(idata5);
    object.append_section(idata4);

    object.add_symbol(
        Some(idata5),
        0,
        &null_thunk_symbol(dll_name),
        StorageKind::Extern,
        0,
    );
    object.push_relocs();
    Ok(object)
}
