use thiserror::Error;

/// Errors reported by the import-library writer.
///
/// Every error is detected at the first call that can observe it; there is
/// no recovery and no partially written output.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown architecture {0}, expected 32 or 64")]
    UnknownArch(u32),

    #[error("import {0} has neither a name nor an ordinal")]
    MissingImportName(String),

    #[error("archive member name {0:?} is longer than 15 bytes")]
    MemberNameTooLong(String),

    #[error("section name {0:?} is longer than 8 bytes")]
    SectionNameTooLong(String),

    #[error("relocation against {0} was never resolved into the symbol table")]
    UnresolvedRelocation(String),

    #[error("{0} is not a PE image")]
    NotPe(String),

    #[error("{0} has no export directory")]
    NoExports(String),

    #[error("malformed PE image: {0}")]
    Pe(#[from] object::read::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
