// Derived from code in LLVM, which is:
// Part of the LLVM Project, under the Apache License v2.0 with LLVM Exceptions.
// See https://llvm.org/LICENSE.txt for license information.
// SPDX-License-Identifier: Apache-2.0 WITH LLVM-exception

use object::pe;

use crate::error::{Error, Result};

/// Machine values accepted in the COFF file header.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[repr(u16)]
#[allow(clippy::upper_case_acronyms)]
pub enum MachineTypes {
    I386 = 0x14C,
    AMD64 = 0x8664,
}

impl From<MachineTypes> for u16 {
    fn from(val: MachineTypes) -> Self {
        val as u16
    }
}

/// Semantic relocation kinds carried by pending relocations.
///
/// The COFF emitter is architecture-neutral; the raw `IMAGE_REL_*` value is
/// looked up through the [ArchSpec] of the owning object when the
/// relocation table is serialized.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum RelocKind {
    /// Absolute 32-bit patch.
    Va32,
    /// Absolute 64-bit patch.
    Va64,
    /// Image-relative (RVA) 32-bit patch.
    Rva32,
}

impl RelocKind {
    /// Width in bytes of the field the relocation patches.
    pub fn width(self) -> u32 {
        match self {
            RelocKind::Va32 | RelocKind::Rva32 => 4,
            RelocKind::Va64 => 8,
        }
    }
}

/// COMDAT selection values for section auxiliary symbols.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[repr(u8)]
pub enum ComdatSelection {
    NoDuplicates = 1,
    Any = 2,
    SameSize = 3,
    ExactMatch = 4,
    Associative = 5,
    Largest = 6,
}

/// Storage of a symbol-table entry, mapped onto the raw COFF storage class
/// and complex-type field when the symbol table is serialized.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum StorageKind {
    Extern,
    Static,
    Section,
    Function,
    StaticFunction,
}

impl StorageKind {
    pub(crate) fn storage_class(self) -> u8 {
        match self {
            StorageKind::Extern | StorageKind::Function => pe::IMAGE_SYM_CLASS_EXTERNAL,
            StorageKind::Static | StorageKind::StaticFunction => pe::IMAGE_SYM_CLASS_STATIC,
            StorageKind::Section => pe::IMAGE_SYM_CLASS_SECTION,
        }
    }

    pub(crate) fn symbol_type(self) -> u16 {
        match self {
            StorageKind::Function | StorageKind::StaticFunction => {
                pe::IMAGE_SYM_DTYPE_FUNCTION << 4
            }
            _ => pe::IMAGE_SYM_TYPE_NULL,
        }
    }
}

/// Public section characteristics, translated to the raw COFF bitmask by
/// [SectionFlags::characteristics]. Absent flags contribute nothing.
#[derive(PartialEq, Eq, Copy, Clone, Default, Debug)]
pub struct SectionFlags(u32);

impl SectionFlags {
    pub const NONE: SectionFlags = SectionFlags(0);
    pub const READ: SectionFlags = SectionFlags(1 << 0);
    pub const WRITE: SectionFlags = SectionFlags(1 << 1);
    pub const EXEC: SectionFlags = SectionFlags(1 << 2);
    pub const CODE: SectionFlags = SectionFlags(1 << 3);
    pub const ALIGN_1: SectionFlags = SectionFlags(1 << 4);
    pub const ALIGN_2: SectionFlags = SectionFlags(1 << 5);
    pub const ALIGN_4: SectionFlags = SectionFlags(1 << 6);
    pub const ALIGN_8: SectionFlags = SectionFlags(1 << 7);
    pub const ALIGN_16: SectionFlags = SectionFlags(1 << 8);
    pub const ALIGN_32: SectionFlags = SectionFlags(1 << 9);
    pub const ALIGN_64: SectionFlags = SectionFlags(1 << 10);
    pub const UNINIT: SectionFlags = SectionFlags(1 << 11);
    pub const COMDAT: SectionFlags = SectionFlags(1 << 12);

    pub fn contains(self, other: SectionFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Raw `IMAGE_SCN_*` bitmask for the section header.
    pub fn characteristics(self) -> u32 {
        let mut raw = 0;
        if self.contains(SectionFlags::READ) {
            raw |= pe::IMAGE_SCN_MEM_READ;
        }
        if self.contains(SectionFlags::WRITE) {
            raw |= pe::IMAGE_SCN_MEM_WRITE;
        }
        if self.contains(SectionFlags::EXEC) {
            raw |= pe::IMAGE_SCN_MEM_EXECUTE;
        }
        if self.contains(SectionFlags::CODE) {
            raw |= pe::IMAGE_SCN_CNT_CODE;
        }
        if self.contains(SectionFlags::UNINIT) {
            raw |= pe::IMAGE_SCN_CNT_UNINITIALIZED_DATA;
        }
        if self.contains(SectionFlags::COMDAT) {
            raw |= pe::IMAGE_SCN_LNK_COMDAT;
        }
        // IMAGE_SCN_ALIGN_nBYTES is an enumeration, not a bitmask: one value
        // only, the largest requested alignment wins.
        let aligns = [
            (SectionFlags::ALIGN_64, 7u32),
            (SectionFlags::ALIGN_32, 6),
            (SectionFlags::ALIGN_16, 5),
            (SectionFlags::ALIGN_8, 4),
            (SectionFlags::ALIGN_4, 3),
            (SectionFlags::ALIGN_2, 2),
            (SectionFlags::ALIGN_1, 1),
        ];
        for (flag, n) in aligns {
            if self.contains(flag) {
                raw |= n << 20;
                break;
            }
        }
        raw
    }
}

impl std::ops::BitOr for SectionFlags {
    type Output = SectionFlags;

    fn bitor(self, rhs: SectionFlags) -> SectionFlags {
        SectionFlags(self.0 | rhs.0)
    }
}

/// Everything that differs between the supported targets, carried as a
/// value so the synthesizer and the COFF emitter stay architecture-neutral.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct ArchSpec {
    pub machine: MachineTypes,
    /// Pointer width in bytes: the size of one IAT/ILT entry.
    pub ptr_width: u32,
    /// Machine code of the `jmp [__imp_*]` stub.
    pub stub_bytes: [u8; 6],
    /// Relocation kind applied to the stub operand at offset 2.
    pub stub_reloc: RelocKind,
    /// Flag set in an IAT/ILT word to mark an import by ordinal.
    pub ordinal_high_bit: u64,
    va32_type: u16,
    va64_type: u16,
    rva32_type: u16,
}

impl ArchSpec {
    pub const X86: ArchSpec = ArchSpec {
        machine: MachineTypes::I386,
        ptr_width: 4,
        stub_bytes: [0xFF, 0x25, 0, 0, 0, 0],
        stub_reloc: RelocKind::Va32,
        ordinal_high_bit: 0x8000_0000,
        va32_type: pe::IMAGE_REL_I386_DIR32,
        // i386 has no 64-bit relocation; the synthesizer never asks for one.
        va64_type: pe::IMAGE_REL_I386_ABSOLUTE,
        rva32_type: pe::IMAGE_REL_I386_DIR32NB,
    };

    pub const X64: ArchSpec = ArchSpec {
        machine: MachineTypes::AMD64,
        ptr_width: 8,
        stub_bytes: [0xFF, 0x25, 0, 0, 0, 0],
        stub_reloc: RelocKind::Va32,
        ordinal_high_bit: 0x8000_0000_0000_0000,
        // The only 32-bit direct patch on x64 is the rip-relative stub
        // operand, so Va32 maps to REL32 here.
        va32_type: pe::IMAGE_REL_AMD64_REL32,
        va64_type: pe::IMAGE_REL_AMD64_ADDR64,
        rva32_type: pe::IMAGE_REL_AMD64_ADDR32NB,
    };

    /// Looks an architecture up by its bit width as used in the record
    /// stream (`"arch": 32` or `"arch": 64`).
    pub fn from_bits(bits: u32) -> Result<ArchSpec> {
        match bits {
            32 => Ok(ArchSpec::X86),
            64 => Ok(ArchSpec::X64),
            other => Err(Error::UnknownArch(other)),
        }
    }

    pub(crate) fn reloc_type(&self, kind: RelocKind) -> u16 {
        match kind {
            RelocKind::Va32 => self.va32_type,
            RelocKind::Va64 => self.va64_type,
            RelocKind::Rva32 => self.rva32_type,
        }
    }

    /// Alignment flag for `.idata` data sections: one pointer width.
    pub(crate) fn data_align(&self) -> SectionFlags {
        if self.ptr_width == 8 {
            SectionFlags::ALIGN_8
        } else {
            SectionFlags::ALIGN_4
        }
    }

    /// Little-endian IAT/ILT word for an import by ordinal.
    pub(crate) fn ordinal_word(&self, ordinal: u16) -> Vec<u8> {
        let word = u64::from(ordinal) | self.ordinal_high_bit;
        if self.ptr_width == 8 {
            word.to_le_bytes().to_vec()
        } else {
            (word as u32).to_le_bytes().to_vec()
        }
    }
}
