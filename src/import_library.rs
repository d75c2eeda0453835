//! The public entry point: collects import members for one DLL and hands
//! them to the archive writer.

use log::debug;

use crate::archive_writer::ArchiveWriter;
use crate::coff::ArchSpec;
use crate::error::Result;
use crate::import_objects::{self, ImportName};

/// Builds a complete import library for one DLL.
///
/// The builder owns every object it emits; [ImportLibraryBuilder::build]
/// consumes it and moves the archive bytes out.
///
/// ```
/// use implib_writer::{ArchSpec, ImportLibraryBuilder};
///
/// let mut builder =
///     ImportLibraryBuilder::new("kernel32.dll", "kernel32.dll", ArchSpec::X64)?;
/// builder.add_by_name("__imp_ExitProcess", Some("ExitProcess"), "ExitProcess")?;
/// let archive = builder.build()?;
/// # Ok::<(), implib_writer::Error>(())
/// ```
pub struct ImportLibraryBuilder {
    dll_name: String,
    member_name: String,
    arch: ArchSpec,
    archive: ArchiveWriter,
}

impl ImportLibraryBuilder {
    /// Creates the builder and admits the two fixed leading members: the
    /// import descriptor and the null descriptor. All members share
    /// `member_name`, truncated to the 15 bytes a header can hold.
    pub fn new(dll_name: &str, member_name: &str, arch: ArchSpec) -> Result<ImportLibraryBuilder> {
        let member_name = truncate_member_name(member_name);
        let mut archive = ArchiveWriter::new();
        archive.add_object(&member_name, &import_objects::import_descriptor(dll_name, arch)?)?;
        archive.add_object(&member_name, &import_objects::null_import_descriptor(arch)?)?;
        Ok(ImportLibraryBuilder {
            dll_name: dll_name.to_string(),
            member_name,
            arch,
            archive,
        })
    }

    /// Imports `export_name` by name. `pub_name` is the published IAT
    /// symbol (`__imp_*`); with `thunk_name` absent no `.text` stub is
    /// emitted and callers must go through the IAT themselves.
    pub fn add_by_name(
        &mut self,
        pub_name: &str,
        thunk_name: Option<&str>,
        export_name: &str,
    ) -> Result<()> {
        self.add(pub_name, thunk_name, ImportName::Name { name: export_name, hint: 0 })
    }

    /// Like [ImportLibraryBuilder::add_by_name], with the export's ordinal
    /// recorded as the loader hint.
    pub fn add_by_name_with_hint(
        &mut self,
        pub_name: &str,
        thunk_name: Option<&str>,
        export_name: &str,
        hint: u16,
    ) -> Result<()> {
        self.add(pub_name, thunk_name, ImportName::Name { name: export_name, hint })
    }

    /// Imports by ordinal only; no hint/name block is emitted.
    pub fn add_by_ordinal(
        &mut self,
        pub_name: &str,
        thunk_name: Option<&str>,
        ordinal: u16,
    ) -> Result<()> {
        self.add(pub_name, thunk_name, ImportName::Ordinal(ordinal))
    }

    fn add(&mut self, pub_name: &str, thunk_name: Option<&str>, import: ImportName<'_>) -> Result<()> {
        let object = import_objects::import_thunk(pub_name, thunk_name, import, self.arch)?;
        self.archive.add_object(&self.member_name, &object)
    }

    /// Appends the null thunk terminator, lays the archive out and returns
    /// its bytes.
    pub fn build(mut self) -> Result<Vec<u8>> {
        self.archive
            .add_object(&self.member_name, &import_objects::null_thunk(&self.dll_name, self.arch)?)?;
        self.archive.fill_offsets();
        debug!(
            "import library for {}: {} bytes",
            self.dll_name,
            self.archive.size()
        );
        self.archive.to_bytes()
    }
}

/// Archive member names are limited to 15 bytes; by convention every
/// member of an import library carries the DLL file name.
fn truncate_member_name(name: &str) -> String {
    let mut end = name.len().min(15);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}
