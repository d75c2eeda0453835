//! Serializer for a single COFF object file: sections with relocation
//! tables, a symbol table with auxiliary records, and a string table.
//!
//! Layout of the emitted file: 20-byte header, 40-byte section headers,
//! then each section's raw data immediately followed by its relocation
//! table, then the symbol table, then the string table.

use std::collections::HashMap;
use std::io::Write;

use object::pe;

use crate::coff::{ArchSpec, ComdatSelection, RelocKind, SectionFlags, StorageKind};
use crate::error::{Error, Result};

const FILE_HEADER_SIZE: u32 = 20;
const SECTION_HEADER_SIZE: u32 = 40;
const RELOCATION_SIZE: u32 = 10;
const SYMBOL_SIZE: u32 = 18;
const MAX_SECTION_NAME: usize = 8;
const MAX_INLINE_SYMBOL_NAME: usize = 8;

/// `SectionNumber` value of an undefined external symbol.
const SECTION_UNDEFINED: i16 = 0;

/// Handle to a section inside its owning [CoffWriter]; numbering is 1-based
/// as in the COFF symbol table.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct SectionId(u16);

impl SectionId {
    pub fn index(self) -> u16 {
        self.0
    }
}

/// A relocation that has not been resolved against the symbol table yet.
/// It names its target symbol; [CoffWriter::push_relocs] turns the name
/// into a symbol-table index.
#[derive(Clone, Debug)]
pub struct Relocation {
    symbol: String,
    offset: u32,
    kind: RelocKind,
}

impl Relocation {
    /// `offset` is relative to the start of the data chunk the relocation
    /// is appended with; [Section::append_data] rebases it.
    pub fn new(symbol: impl Into<String>, offset: u32, kind: RelocKind) -> Relocation {
        Relocation {
            symbol: symbol.into(),
            offset,
            kind,
        }
    }
}

/// Resolved relocation entry, ready for serialization.
#[derive(Debug)]
struct RawRelocation {
    virtual_address: u32,
    symbol_index: u32,
    typ: u16,
}

#[derive(Debug)]
pub struct Section {
    name: String,
    flags: SectionFlags,
    index: u16,
    data: Vec<u8>,
    pending: Vec<Relocation>,
    resolved: Vec<RawRelocation>,
}

impl Section {
    pub fn new(name: &str, flags: SectionFlags) -> Result<Section> {
        if name.len() > MAX_SECTION_NAME {
            return Err(Error::SectionNameTooLong(name.to_string()));
        }
        Ok(Section {
            name: name.to_string(),
            flags,
            index: 0,
            data: Vec::new(),
            pending: Vec::new(),
            resolved: Vec::new(),
        })
    }

    /// Appends raw bytes together with the relocations that patch them.
    /// Relocation offsets are relative to `data` and are rebased onto the
    /// section; ownership of the relocations transfers to the section.
    pub fn append_data(&mut self, data: &[u8], relocs: Vec<Relocation>) {
        let base = self.data.len() as u32;
        self.data.extend_from_slice(data);
        for mut reloc in relocs {
            reloc.offset += base;
            debug_assert!(reloc.offset + reloc.kind.width() <= self.data.len() as u32);
            self.pending.push(reloc);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 1-based index, zero until the section is appended to an object.
    pub fn index(&self) -> u16 {
        self.index
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn reloc_count(&self) -> usize {
        self.pending.len() + self.resolved.len()
    }
}

enum SymbolEntry {
    Symbol {
        name: String,
        /// String-table offset for names that do not fit inline.
        long_name: Option<u32>,
        value: u32,
        section: i16,
        typ: u16,
        class: u8,
        aux_count: u8,
    },
    Aux([u8; SYMBOL_SIZE as usize]),
}

/// String table body; the serialized form is a little-endian length that
/// includes its own 4 bytes, so returned offsets are always >= 4.
#[derive(Default)]
struct StringTable {
    body: Vec<u8>,
}

impl StringTable {
    fn append(&mut self, s: &str) -> u32 {
        let offset = 4 + self.body.len() as u32;
        self.body.extend_from_slice(s.as_bytes());
        self.body.push(0);
        offset
    }

    fn write<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_all(&(4 + self.body.len() as u32).to_le_bytes())?;
        w.write_all(&self.body)
    }
}

/// Builder and serializer for one COFF object.
pub struct CoffWriter {
    arch: ArchSpec,
    sections: Vec<Section>,
    symbols: Vec<SymbolEntry>,
    symbol_index: HashMap<String, u32>,
    strings: StringTable,
}

impl CoffWriter {
    pub fn new(arch: ArchSpec) -> CoffWriter {
        CoffWriter {
            arch,
            sections: Vec::new(),
            symbols: Vec::new(),
            symbol_index: HashMap::new(),
            strings: StringTable::default(),
        }
    }

    pub fn arch(&self) -> &ArchSpec {
        &self.arch
    }

    /// Takes ownership of `section` and assigns its 1-based index.
    pub fn append_section(&mut self, mut section: Section) -> SectionId {
        let index = self.sections.len() as u16 + 1;
        section.index = index;
        self.sections.push(section);
        SectionId(index)
    }

    /// Appends a symbol record and returns its 0-based index. Auxiliary
    /// records count towards the index and must be supplied through
    /// [CoffWriter::add_aux_data] right after the primary record.
    pub fn add_symbol(
        &mut self,
        section: Option<SectionId>,
        value: u32,
        name: &str,
        storage: StorageKind,
        aux_count: u8,
    ) -> u32 {
        let index = self.symbols.len() as u32;
        let long_name = (name.len() > MAX_INLINE_SYMBOL_NAME).then(|| self.strings.append(name));
        self.symbols.push(SymbolEntry::Symbol {
            name: name.to_string(),
            long_name,
            value,
            section: section.map_or(SECTION_UNDEFINED, |s| s.0 as i16),
            typ: storage.symbol_type(),
            class: storage.storage_class(),
            aux_count,
        });
        self.symbol_index.entry(name.to_string()).or_insert(index);
        index
    }

    /// Appends one auxiliary record, filling a slot reserved by the
    /// preceding [CoffWriter::add_symbol] call.
    pub fn add_aux_data(&mut self, record: [u8; SYMBOL_SIZE as usize]) -> u32 {
        let index = self.symbols.len() as u32;
        self.symbols.push(SymbolEntry::Aux(record));
        index
    }

    /// Builds the auxiliary record describing a section: its length and
    /// relocation count, plus the COMDAT association when there is one.
    pub fn section_aux(
        &self,
        section: SectionId,
        associated: Option<SectionId>,
        selection: Option<ComdatSelection>,
    ) -> [u8; SYMBOL_SIZE as usize] {
        let s = &self.sections[section.0 as usize - 1];
        let mut record = [0u8; SYMBOL_SIZE as usize];
        record[0..4].copy_from_slice(&(s.data.len() as u32).to_le_bytes());
        record[4..6].copy_from_slice(&(s.reloc_count() as u16).to_le_bytes());
        // NumberOfLinenumbers and CheckSum stay zero.
        record[12..14].copy_from_slice(&associated.map_or(0, |a| a.0).to_le_bytes());
        record[14] = selection.map_or(0, |sel| sel as u8);
        record
    }

    /// Resolves every pending relocation to a symbol-table index, adding an
    /// undefined external symbol for targets that were never defined. All
    /// user-visible symbols must have been added before this call so the
    /// indices written into the relocation tables are final.
    pub fn push_relocs(&mut self) {
        let mut sections = std::mem::take(&mut self.sections);
        for section in &mut sections {
            for reloc in section.pending.drain(..) {
                let symbol_index = match self.symbol_index.get(&reloc.symbol) {
                    Some(&index) => index,
                    None => self.add_symbol(None, 0, &reloc.symbol, StorageKind::Extern, 0),
                };
                section.resolved.push(RawRelocation {
                    virtual_address: reloc.offset,
                    symbol_index,
                    typ: self.arch.reloc_type(reloc.kind),
                });
            }
        }
        self.sections = sections;
    }

    /// Names of the defined external symbols, in insertion order. These are
    /// the symbols an archive advertises in its linker members.
    pub fn public_symbol_names(&self) -> Vec<&str> {
        self.symbols
            .iter()
            .filter_map(|entry| match entry {
                SymbolEntry::Symbol { name, section, class, .. }
                    if *class == pe::IMAGE_SYM_CLASS_EXTERNAL
                        && *section != SECTION_UNDEFINED =>
                {
                    Some(name.as_str())
                }
                _ => None,
            })
            .collect()
    }

    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        for section in &self.sections {
            if let Some(reloc) = section.pending.first() {
                return Err(Error::UnresolvedRelocation(reloc.symbol.clone()));
            }
        }

        // Place section data and relocation tables.
        let mut offset = FILE_HEADER_SIZE + SECTION_HEADER_SIZE * self.sections.len() as u32;
        let mut placements = Vec::with_capacity(self.sections.len());
        for section in &self.sections {
            let data_offset = if section.data.is_empty() { 0 } else { offset };
            offset += section.data.len() as u32;
            let reloc_offset = if section.resolved.is_empty() { 0 } else { offset };
            offset += RELOCATION_SIZE * section.resolved.len() as u32;
            placements.push((data_offset, reloc_offset));
        }
        let symtab_offset = offset;

        // File header.
        w.write_all(&u16::from(self.arch.machine).to_le_bytes())?;
        w.write_all(&(self.sections.len() as u16).to_le_bytes())?;
        w.write_all(&0u32.to_le_bytes())?; // TimeDateStamp
        w.write_all(&symtab_offset.to_le_bytes())?;
        w.write_all(&(self.symbols.len() as u32).to_le_bytes())?;
        w.write_all(&0u16.to_le_bytes())?; // SizeOfOptionalHeader
        w.write_all(&0u16.to_le_bytes())?; // Characteristics

        // Section headers.
        for (section, &(data_offset, reloc_offset)) in self.sections.iter().zip(&placements) {
            let mut name = [0u8; 8];
            name[..section.name.len()].copy_from_slice(section.name.as_bytes());
            w.write_all(&name)?;
            w.write_all(&0u32.to_le_bytes())?; // VirtualSize
            w.write_all(&0u32.to_le_bytes())?; // VirtualAddress
            w.write_all(&(section.data.len() as u32).to_le_bytes())?;
            w.write_all(&data_offset.to_le_bytes())?;
            w.write_all(&reloc_offset.to_le_bytes())?;
            w.write_all(&0u32.to_le_bytes())?; // PointerToLinenumbers
            w.write_all(&(section.resolved.len() as u16).to_le_bytes())?;
            w.write_all(&0u16.to_le_bytes())?; // NumberOfLinenumbers
            w.write_all(&section.flags.characteristics().to_le_bytes())?;
        }

        // Raw data, each section followed by its relocation table.
        for section in &self.sections {
            w.write_all(&section.data)?;
            for reloc in &section.resolved {
                w.write_all(&reloc.virtual_address.to_le_bytes())?;
                w.write_all(&reloc.symbol_index.to_le_bytes())?;
                w.write_all(&reloc.typ.to_le_bytes())?;
            }
        }

        // Symbol table.
        for entry in &self.symbols {
            match entry {
                SymbolEntry::Symbol {
                    name,
                    long_name,
                    value,
                    section,
                    typ,
                    class,
                    aux_count,
                } => {
                    match long_name {
                        None => {
                            let mut inline = [0u8; 8];
                            inline[..name.len()].copy_from_slice(name.as_bytes());
                            w.write_all(&inline)?;
                        }
                        Some(offset) => {
                            w.write_all(&0u32.to_le_bytes())?;
                            w.write_all(&offset.to_le_bytes())?;
                        }
                    }
                    w.write_all(&value.to_le_bytes())?;
                    w.write_all(&section.to_le_bytes())?;
                    w.write_all(&typ.to_le_bytes())?;
                    w.write_all(&[*class, *aux_count])?;
                }
                SymbolEntry::Aux(record) => w.write_all(record)?,
            }
        }

        self.strings.write(w)?;
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.write(&mut bytes)?;
        Ok(bytes)
    }
}
