// We are writing a very specific, well defined format, so it makes it easier to
// see exactly what is being written if we explicitly write out `\n` instead of
// hoping somebody notices the `writeln!` instead of `write!`.
#![allow(clippy::write_with_newline)]

//! Synthesizes Windows import libraries: `.lib` archives of COFF objects
//! that let a linker resolve references to a DLL's exports without the
//! DLL being present at link time.
//!
//! The layers, bottom up: [CoffWriter] serializes one COFF object;
//! [ArchiveWriter] packs objects into a Microsoft archive with the two
//! linker members; the import-object builders synthesize the members an
//! import library is made of; [ImportLibraryBuilder] ties them together.
//! [DllImports] is the JSON record contract of the `mkimplib` frontend,
//! fed either from a file or from a DLL's export directory via
//! [read_exports].

mod archive_writer;
mod coff;
mod coff_writer;
mod error;
mod import_library;
mod import_objects;
mod pe_exports;
mod records;

pub use archive_writer::ArchiveWriter;
pub use coff::{ArchSpec, ComdatSelection, MachineTypes, RelocKind, SectionFlags, StorageKind};
pub use coff_writer::{CoffWriter, Relocation, Section, SectionId};
pub use error::{Error, Result};
pub use import_library::ImportLibraryBuilder;
pub use import_objects::{
    import_descriptor, import_descriptor_symbol, import_thunk, null_import_descriptor, null_thunk,
    null_thunk_symbol, ImportName,
};
pub use pe_exports::{import_records, read_exports, DllExport};
pub use records::{DllImports, ImportSymbol};
