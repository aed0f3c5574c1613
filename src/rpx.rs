//! In-memory RPX container.
//!
//! An [`Rpx`] owns the file header, every section (indexed by [`SectionId`]
//! in declaration order), and the *file order*: section ids sorted by
//! ascending `sh_offset` as loaded.  The file order is fixed at construction
//! and every offset-dependent pass (write, relink) walks it instead of the
//! declaration order.
//!
//! # Invariants
//! - `sections.len() == ehdr.shnum`
//! - a file-backed section's buffer length equals its `sh_size`
//! - exactly one `RPL_CRCS` section, holding one big-endian word per section
//! - `file_order` is a permutation of all section ids; after relink the
//!   offsets along it are non-decreasing

use serde::Serialize;

use crate::be::get_be_u32;
use crate::crc::crc32;
use crate::error::FormatError;
use crate::header::Ehdr;
use crate::section::{Section, SectionId, SectionKind};

/// Placement alignment for every data section but the first, and for the
/// end of the file.
pub const RPX_ALIGN: u64 = 0x40;

/// Round `value` up to the next multiple of `align` (a power of two).
#[inline]
pub fn align_up(value: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

#[derive(Debug, Clone)]
pub struct Rpx {
    pub ehdr:     Ehdr,
    pub sections: Vec<Section>,
    file_order:   Vec<SectionId>,
}

impl Rpx {
    /// Assemble a container and derive its file order from the current
    /// section offsets.  Sections sharing an offset keep declaration order.
    pub fn new(ehdr: Ehdr, sections: Vec<Section>) -> Result<Self, FormatError> {
        if sections.len() != usize::from(ehdr.shnum) {
            return Err(FormatError::SectionCountMismatch {
                declared: ehdr.shnum,
                actual:   sections.len(),
            });
        }
        let mut file_order: Vec<SectionId> =
            (0..ehdr.shnum).map(SectionId).collect();
        file_order.sort_by_key(|id| sections[id.index()].header.offset);
        Ok(Self { ehdr, sections, file_order })
    }

    pub fn file_order(&self) -> &[SectionId] {
        &self.file_order
    }

    /// Split borrow for passes that walk the file order while mutating sections.
    pub(crate) fn layout_mut(&mut self) -> (&[SectionId], &mut [Section]) {
        (&self.file_order, &mut self.sections)
    }

    /// Id of the single `RPL_CRCS` section.
    pub fn crc_section_id(&self) -> Result<SectionId, FormatError> {
        let mut found: Option<SectionId> = None;
        for (index, section) in self.sections.iter().enumerate() {
            if section.kind() != SectionKind::RplCrcs {
                continue;
            }
            let id = SectionId(index as u16);
            if let Some(first) = found {
                return Err(FormatError::DuplicateCrcSection { first, second: id });
            }
            found = Some(id);
        }
        found.ok_or(FormatError::MissingCrcSection)
    }

    /// Decode the CRC table, one entry per section id.
    pub fn crc_table(&self) -> Result<Vec<u32>, FormatError> {
        let id = self.crc_section_id()?;
        let data = &self.sections[id.index()].data;
        let needed = self.sections.len() * 4;
        if data.len() < needed {
            return Err(FormatError::CrcTableTooSmall { needed, len: data.len() });
        }
        Ok((0..self.sections.len())
            .map(|i| get_be_u32(data, i).unwrap_or(0))
            .collect())
    }

    /// Load each section's cached CRC from the on-disk CRC table.  Slots the
    /// table does not cover (or a missing table) leave the cache at 0.
    pub(crate) fn seed_crcs_from_table(&mut self) {
        let table = match self.crc_section_id() {
            Ok(id) => self.sections[id.index()].data.clone(),
            Err(_) => return,
        };
        for (index, section) in self.sections.iter_mut().enumerate() {
            section.crc = get_be_u32(&table, index).unwrap_or(0);
        }
    }

    /// Recompute the cached CRC of every file-backed, uncompressed section.
    /// Compressed sections keep their cached value.
    pub fn refresh_crcs(&mut self) {
        for section in self.sections.iter_mut() {
            if section.has_file_data() && !section.is_compressed() {
                section.crc = crc32(0, &section.data);
            }
        }
    }

    /// First byte past the section header table; relink places data here.
    pub fn data_start(&self) -> u64 {
        self.ehdr.shdr_table_end()
    }

    /// Length of the image `io_stream::write_rpx` produces: end of the last
    /// section in file order, rounded up to [`RPX_ALIGN`].
    pub fn written_size(&self) -> u64 {
        let data_end = self
            .file_order
            .iter()
            .rev()
            .map(|id| &self.sections[id.index()].header)
            .find(|hdr| hdr.offset != 0)
            .map(|hdr| u64::from(hdr.offset) + u64::from(hdr.size))
            .unwrap_or(0);
        align_up(data_end.max(self.data_start()), RPX_ALIGN)
    }

    pub fn summary(&self) -> RpxSummary {
        RpxSummary {
            header:       self.ehdr.clone(),
            written_size: self.written_size(),
            file_order:   self.file_order.clone(),
            sections:     self
                .sections
                .iter()
                .enumerate()
                .map(|(index, s)| SectionSummary {
                    id:         SectionId(index as u16),
                    kind:       s.kind().name(),
                    sh_type:    s.header.sh_type,
                    flags:      s.header.flags,
                    addr:       s.header.addr,
                    offset:     s.header.offset,
                    size:       s.header.size,
                    crc:        s.crc,
                    compressed: s.is_compressed(),
                })
                .collect(),
        }
    }
}

// ── Diagnostics ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SectionSummary {
    pub id:         SectionId,
    pub kind:       &'static str,
    pub sh_type:    u32,
    pub flags:      u32,
    pub addr:       u32,
    pub offset:     u32,
    pub size:       u32,
    pub crc:        u32,
    pub compressed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RpxSummary {
    pub header:       Ehdr,
    pub written_size: u64,
    pub file_order:   Vec<SectionId>,
    pub sections:     Vec<SectionSummary>,
}
