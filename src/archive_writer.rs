// Derived from code in LLVM, which is:
// Part of the LLVM Project, under the Apache License v2.0 with LLVM Exceptions.
// See https://llvm.org/LICENSE.txt for license information.
// SPDX-License-Identifier: Apache-2.0 WITH LLVM-exception

//! Packs COFF objects into a Microsoft `!<arch>\n` archive with the two
//! linker members. No long-name member is emitted; member names are
//! limited to 15 bytes.

use std::io::{self, Write};

use log::debug;

use crate::coff_writer::CoffWriter;
use crate::error::{Error, Result};

/// Size field is 10 decimal digits long.
const MAX_MEMBER_SIZE: u64 = 9999999999;
const MAX_MEMBER_NAME: usize = 15;
const MEMBER_HEADER_SIZE: u64 = 60;
const SIGNATURE: &[u8] = b"!<arch>\n";

fn align_to(size: u64, align: u64) -> u64 {
    (size + align - 1) & !(align - 1)
}

fn even_pad(size: u64) -> u64 {
    align_to(size, 2) - size
}

/// Writes one 60-byte member header. The name field is 16 characters and
/// `/`-terminated, so the two linker members (empty name) come out as `/`.
/// Date, uid, gid and mode are fixed at zero to keep the output
/// deterministic.
fn write_member_header<W: Write>(w: &mut W, name: &str, size: u64) -> io::Result<()> {
    write!(w, "{:<16}", format!("{name}/"))?;
    write!(w, "{:<12}{:<6}{:<6}{:<8o}{:<10}`\n", 0, 0, 0, 0, size)
}

struct ArchiveMember {
    name: String,
    data: Vec<u8>,
    /// Defined external symbols, in symbol-table order.
    publics: Vec<String>,
    /// Archive-relative offset of the member header, set by
    /// [ArchiveWriter::fill_offsets].
    offset: u64,
}

/// Sizes and offsets of the final archive. The linker members' sizes
/// depend on the symbol count and the user members' offsets depend on the
/// linker members' sizes, so the whole layout is computed up front and the
/// write pass never needs to seek.
struct Layout {
    symbol_count: u64,
    first_linker_size: u64,
    second_linker_size: u64,
    member_offsets: Vec<u64>,
    total_size: u64,
}

#[derive(Default)]
pub struct ArchiveWriter {
    members: Vec<ArchiveMember>,
}

impl ArchiveWriter {
    pub fn new() -> ArchiveWriter {
        ArchiveWriter::default()
    }

    /// Serializes `object` and admits it as the next member. Every defined
    /// external symbol of the object is advertised in both linker members.
    pub fn add_object(&mut self, name: &str, object: &CoffWriter) -> Result<()> {
        if name.len() > MAX_MEMBER_NAME {
            return Err(Error::MemberNameTooLong(name.to_string()));
        }
        let data = object.to_bytes()?;
        if data.len() as u64 > MAX_MEMBER_SIZE {
            return Err(io::Error::other(format!("archive member {name} is too big")).into());
        }
        let publics: Vec<String> = object
            .public_symbol_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        debug!(
            "member {name}: {} bytes, {} public symbols",
            data.len(),
            publics.len()
        );
        self.members.push(ArchiveMember {
            name: name.to_string(),
            data,
            publics,
            offset: 0,
        });
        Ok(())
    }

    fn layout(&self) -> Layout {
        let symbol_count: u64 = self.members.iter().map(|m| m.publics.len() as u64).sum();
        let name_blob: u64 = self
            .members
            .iter()
            .flat_map(|m| &m.publics)
            .map(|s| s.len() as u64 + 1)
            .sum();

        let first_linker_size = 4 + 4 * symbol_count + name_blob;
        let second_linker_size =
            4 + 4 * self.members.len() as u64 + 4 + 2 * symbol_count + name_blob;

        let mut pos = SIGNATURE.len() as u64
            + MEMBER_HEADER_SIZE
            + first_linker_size
            + even_pad(first_linker_size)
            + MEMBER_HEADER_SIZE
            + second_linker_size
            + even_pad(second_linker_size);
        let member_offsets = self
            .members
            .iter()
            .map(|m| {
                let offset = pos;
                let size = m.data.len() as u64;
                pos += MEMBER_HEADER_SIZE + size + even_pad(size);
                offset
            })
            .collect();

        Layout {
            symbol_count,
            first_linker_size,
            second_linker_size,
            member_offsets,
            total_size: pos,
        }
    }

    /// Resolves the fix point between linker-member sizes and member
    /// offsets and records each member's archive-relative offset.
    pub fn fill_offsets(&mut self) {
        let layout = self.layout();
        for (member, &offset) in self.members.iter_mut().zip(&layout.member_offsets) {
            member.offset = offset;
        }
        debug!(
            "archive layout: {} members, {} symbols, {} bytes",
            self.members.len(),
            layout.symbol_count,
            layout.total_size
        );
    }

    /// Total archive size in bytes.
    pub fn size(&self) -> u64 {
        self.layout().total_size
    }

    pub fn write<W: Write>(&mut self, w: &mut W) -> Result<()> {
        self.fill_offsets();
        let layout = self.layout();

        w.write_all(SIGNATURE)?;
        self.write_first_linker_member(w, &layout)?;
        self.write_second_linker_member(w, &layout)?;

        for member in &self.members {
            write_member_header(w, &member.name, member.data.len() as u64)?;
            w.write_all(&member.data)?;
            if member.data.len() % 2 != 0 {
                w.write_all(b"\n")?;
            }
        }
        Ok(())
    }

    /// The first linker member: symbol count and per-symbol member offsets
    /// in big-endian, in symbol discovery order, then the name blob.
    fn write_first_linker_member<W: Write>(&self, w: &mut W, layout: &Layout) -> Result<()> {
        write_member_header(w, "", layout.first_linker_size)?;

        w.write_all(&checked_u32(layout.symbol_count)?.to_be_bytes())?;
        for member in &self.members {
            for _ in &member.publics {
                w.write_all(&checked_u32(member.offset)?.to_be_bytes())?;
            }
        }
        for member in &self.members {
            for name in &member.publics {
                w.write_all(name.as_bytes())?;
                w.write_all(&[0])?;
            }
        }

        if layout.first_linker_size % 2 != 0 {
            w.write_all(b"\n")?;
        }
        Ok(())
    }

    /// The second linker member: member-offset array, then the symbol
    /// directory as 1-based member indices, everything little-endian with
    /// the symbols sorted case-insensitively.
    fn write_second_linker_member<W: Write>(&self, w: &mut W, layout: &Layout) -> Result<()> {
        write_member_header(w, "", layout.second_linker_size)?;

        w.write_all(&checked_u32(self.members.len() as u64)?.to_le_bytes())?;
        for member in &self.members {
            w.write_all(&checked_u32(member.offset)?.to_le_bytes())?;
        }

        let mut directory: Vec<(&str, u16)> = self
            .members
            .iter()
            .enumerate()
            .flat_map(|(index, member)| {
                member
                    .publics
                    .iter()
                    .map(move |name| (name.as_str(), index as u16 + 1))
            })
            .collect();
        directory.sort_by_cached_key(|(name, _)| name.to_ascii_lowercase());

        w.write_all(&checked_u32(layout.symbol_count)?.to_le_bytes())?;
        for (_, member_index) in &directory {
            w.write_all(&member_index.to_le_bytes())?;
        }
        for (name, _) in &directory {
            w.write_all(name.as_bytes())?;
            w.write_all(&[0])?;
        }

        if layout.second_linker_size % 2 != 0 {
            w.write_all(b"\n")?;
        }
        Ok(())
    }

    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.write(&mut bytes)?;
        Ok(bytes)
    }
}

fn checked_u32(value: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| io::Error::other("archive is too big").into())
}
