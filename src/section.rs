use serde::Serialize;
use std::fmt;
use std::io::{self, Read, Write};

use crate::be::{read_be, write_be};
use crate::crc::crc32;

/// On-disk size of one section header.  Entries may be padded beyond this
/// (see `Ehdr::shentsize`).
pub const SHDR_SIZE: usize = 40;

pub const SHT_NULL:         u32 = 0x0000_0000;
pub const SHT_PROGBITS:     u32 = 0x0000_0001;
pub const SHT_SYMTAB:       u32 = 0x0000_0002;
pub const SHT_STRTAB:       u32 = 0x0000_0003;
pub const SHT_RELA:         u32 = 0x0000_0004;
pub const SHT_NOBITS:       u32 = 0x0000_0008;
pub const SHT_RPL_EXPORTS:  u32 = 0x8000_0001;
pub const SHT_RPL_IMPORTS:  u32 = 0x8000_0002;
pub const SHT_RPL_CRCS:     u32 = 0x8000_0003;
pub const SHT_RPL_FILEINFO: u32 = 0x8000_0004;

/// Section bytes are zlib-compressed behind a 4-byte big-endian size prefix.
pub const SHF_RPL_ZLIB: u32 = 0x0800_0000;

// ── SectionId ────────────────────────────────────────────────────────────────

/// Position of a section in the section header table (declaration order).
///
/// This is the identity used for CRC-table slots.  It is unrelated to where
/// the section's bytes sit in the file; see `Rpx::file_order`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SectionId(pub u16);

impl SectionId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ── SectionKind ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Null,
    Progbits,
    Symtab,
    Strtab,
    Rela,
    Nobits,
    RplExports,
    RplImports,
    RplCrcs,
    RplFileInfo,
    Other(u32),
}

impl From<u32> for SectionKind {
    fn from(raw: u32) -> Self {
        match raw {
            SHT_NULL         => SectionKind::Null,
            SHT_PROGBITS     => SectionKind::Progbits,
            SHT_SYMTAB       => SectionKind::Symtab,
            SHT_STRTAB       => SectionKind::Strtab,
            SHT_RELA         => SectionKind::Rela,
            SHT_NOBITS       => SectionKind::Nobits,
            SHT_RPL_EXPORTS  => SectionKind::RplExports,
            SHT_RPL_IMPORTS  => SectionKind::RplImports,
            SHT_RPL_CRCS     => SectionKind::RplCrcs,
            SHT_RPL_FILEINFO => SectionKind::RplFileInfo,
            other            => SectionKind::Other(other),
        }
    }
}

impl SectionKind {
    /// Human-readable name (diagnostics only).
    pub fn name(self) -> &'static str {
        match self {
            SectionKind::Null        => "NULL",
            SectionKind::Progbits    => "PROGBITS",
            SectionKind::Symtab      => "SYMTAB",
            SectionKind::Strtab      => "STRTAB",
            SectionKind::Rela        => "RELA",
            SectionKind::Nobits      => "NOBITS",
            SectionKind::RplExports  => "RPL_EXPORTS",
            SectionKind::RplImports  => "RPL_IMPORTS",
            SectionKind::RplCrcs     => "RPL_CRCS",
            SectionKind::RplFileInfo => "RPL_FILEINFO",
            SectionKind::Other(_)    => "OTHER",
        }
    }
}

// ── Shdr ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Shdr {
    pub name:      u32,
    pub sh_type:   u32,
    pub flags:     u32,
    pub addr:      u32,
    /// File offset of the stored bytes; 0 means the section has none.
    pub offset:    u32,
    /// Stored size in bytes (compressed size when `SHF_RPL_ZLIB` is set).
    pub size:      u32,
    pub link:      u32,
    pub info:      u32,
    pub addralign: u32,
    pub entsize:   u32,
}

impl Shdr {
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        write_be(&mut writer, self.name)?;
        write_be(&mut writer, self.sh_type)?;
        write_be(&mut writer, self.flags)?;
        write_be(&mut writer, self.addr)?;
        write_be(&mut writer, self.offset)?;
        write_be(&mut writer, self.size)?;
        write_be(&mut writer, self.link)?;
        write_be(&mut writer, self.info)?;
        write_be(&mut writer, self.addralign)?;
        write_be(&mut writer, self.entsize)?;
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        Ok(Self {
            name:      read_be(&mut reader)?,
            sh_type:   read_be(&mut reader)?,
            flags:     read_be(&mut reader)?,
            addr:      read_be(&mut reader)?,
            offset:    read_be(&mut reader)?,
            size:      read_be(&mut reader)?,
            link:      read_be(&mut reader)?,
            info:      read_be(&mut reader)?,
            addralign: read_be(&mut reader)?,
            entsize:   read_be(&mut reader)?,
        })
    }
}

// ── Section ──────────────────────────────────────────────────────────────────

/// One section: its header, its stored bytes, and the CRC32 of its
/// uncompressed content.
#[derive(Debug, Clone)]
pub struct Section {
    pub header: Shdr,
    /// Exactly the stored representation (compressed or not).
    pub data:   Vec<u8>,
    pub crc:    u32,
}

impl Section {
    /// Build a section around `data`.  The cached CRC is computed when the
    /// bytes are stored uncompressed and left at 0 otherwise.
    pub fn new(header: Shdr, data: Vec<u8>) -> Self {
        let crc = if header.flags & SHF_RPL_ZLIB == 0 { crc32(0, &data) } else { 0 };
        Self { header, data, crc }
    }

    pub fn kind(&self) -> SectionKind {
        SectionKind::from(self.header.sh_type)
    }

    pub fn is_compressed(&self) -> bool {
        self.header.flags & SHF_RPL_ZLIB != 0
    }

    /// False for sections without file-backed bytes (`sh_offset == 0`).
    pub fn has_file_data(&self) -> bool {
        self.header.offset != 0
    }
}
