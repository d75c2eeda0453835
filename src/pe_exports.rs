//! Reads a DLL's export directory and turns it into the record stream the
//! builder consumes.

use object::read::pe::{PeFile32, PeFile64};
use object::FileKind;

use crate::error::{Error, Result};
use crate::records::{DllImports, ImportSymbol};

/// One row of a DLL's export directory. Forwarded exports are plain rows
/// here; they are imported by name like any other export.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct DllExport {
    pub name: Option<String>,
    pub ordinal: u16,
}

/// Parses a PE image and returns the import records for its exports.
/// The architecture is taken from the image.
pub fn read_exports(data: &[u8], dll_name: &str) -> Result<DllImports> {
    let (arch, exports) = match FileKind::parse(data)? {
        FileKind::Pe32 => {
            let file = PeFile32::parse(data)?;
            (32, export_rows(file.export_table()?, dll_name)?)
        }
        FileKind::Pe64 => {
            let file = PeFile64::parse(data)?;
            (64, export_rows(file.export_table()?, dll_name)?)
        }
        _ => return Err(Error::NotPe(dll_name.to_string())),
    };
    Ok(import_records(dll_name, arch, &exports))
}

fn export_rows(
    table: Option<object::read::pe::ExportTable<'_>>,
    dll_name: &str,
) -> Result<Vec<DllExport>> {
    let table = table.ok_or_else(|| Error::NoExports(dll_name.to_string()))?;
    Ok(table
        .exports()?
        .into_iter()
        .map(|export| DllExport {
            name: export
                .name
                .map(|name| String::from_utf8_lossy(name).into_owned()),
            ordinal: export.ordinal as u16,
        })
        .collect())
}

/// Builds the record stream for a list of exports. Named exports record
/// their ordinal so the dump round-trips, but the builder imports them by
/// name alone; nameless exports become imports by ordinal with an `ord.N`
/// placeholder public name and no stub.
pub fn import_records(dll_name: &str, arch: u32, exports: &[DllExport]) -> DllImports {
    let symbols = exports
        .iter()
        .map(|export| match &export.name {
            Some(name) => ImportSymbol {
                cconv: "STDCALL".to_string(),
                name: name.clone(),
                ord: u32::from(export.ordinal),
                thunk: name.clone(),
                pubname: format!("__imp_{name}"),
            },
            None => ImportSymbol {
                cconv: "STDCALL".to_string(),
                name: String::new(),
                ord: u32::from(export.ordinal),
                thunk: String::new(),
                pubname: format!("__imp_ord.{}", export.ordinal),
            },
        })
        .collect();
    DllImports {
        dllname: dll_name.to_string(),
        arch,
        symbols,
    }
}
