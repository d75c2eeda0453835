//! The JSON record stream that feeds the builder: one DLL, its
//! architecture, and the list of symbols to import.

use serde::{Deserialize, Serialize};

use crate::coff::ArchSpec;
use crate::error::{Error, Result};
use crate::import_library::ImportLibraryBuilder;

#[derive(PartialEq, Eq, Clone, Debug, Serialize, Deserialize)]
pub struct DllImports {
    pub dllname: String,
    /// 32 or 64.
    pub arch: u32,
    pub symbols: Vec<ImportSymbol>,
}

#[derive(PartialEq, Eq, Clone, Debug, Serialize, Deserialize)]
pub struct ImportSymbol {
    /// Calling convention as dumped from the DLL; carried through but not
    /// acted on.
    #[serde(default)]
    pub cconv: String,
    /// Export name; empty for ordinal-only imports.
    #[serde(default)]
    pub name: String,
    /// Export ordinal; used for the import when `name` is empty.
    #[serde(default)]
    pub ord: u32,
    /// Stub symbol name; empty suppresses the `.text` thunk.
    #[serde(default)]
    pub thunk: String,
    /// The published `__imp_*` symbol.
    pub pubname: String,
}

impl DllImports {
    /// Drives a builder over every record and returns the archive bytes.
    /// A record must carry a name or a non-zero ordinal.
    pub fn build(&self) -> Result<Vec<u8>> {
        let arch = ArchSpec::from_bits(self.arch)?;
        let mut builder = ImportLibraryBuilder::new(&self.dllname, &self.dllname, arch)?;
        for symbol in &self.symbols {
            let thunk = (!symbol.thunk.is_empty()).then_some(symbol.thunk.as_str());
            if !symbol.name.is_empty() {
                builder.add_by_name(&symbol.pubname, thunk, &symbol.name)?;
            } else if symbol.ord != 0 {
                builder.add_by_ordinal(&symbol.pubname, thunk, symbol.ord as u16)?;
            } else {
                return Err(Error::MissingImportName(symbol.pubname.clone()));
            }
        }
        builder.build()
    }
}
