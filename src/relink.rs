//! Offset recomputation after section sizes change.
//!
//! Sections are laid out back to back in file order starting right after
//! the section header table.  Every data-bearing section except the first
//! is placed on a 0x40 boundary; the first one is not.  The loader expects
//! exactly this layout, so the asymmetry is kept as is.  Virtual addresses
//! are never touched.
//!
//! The CRC table section is refreshed in place from each section's cached
//! CRC, with its own slot forced to zero.

use byteorder::{BigEndian, ByteOrder};
use tracing::{debug, trace};

use crate::error::FormatError;
use crate::rpx::{align_up, Rpx, RPX_ALIGN};
use crate::section::SectionId;

/// Where relink will put one data-bearing section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub id:     SectionId,
    pub offset: u32,
    pub size:   u32,
}

/// Lay out data-bearing sections in file order with the given stored sizes,
/// without touching the container.  `size_of` receives the section id and
/// the current buffer length.
///
/// Fails if the CRC table is missing or short, or if any placement would
/// leave the 32-bit offset space.
pub fn plan_layout<F>(rpx: &Rpx, size_of: F) -> Result<Vec<Placement>, FormatError>
where
    F: Fn(SectionId, usize) -> usize,
{
    rpx.crc_table()?;

    let mut cursor = rpx.data_start();
    let mut placements = Vec::with_capacity(rpx.sections.len());
    for &id in rpx.file_order() {
        let section = &rpx.sections[id.index()];
        if !section.has_file_data() {
            continue;
        }
        let size = size_of(id, section.data.len()) as u64;
        if !placements.is_empty() {
            cursor = align_up(cursor, RPX_ALIGN);
        }
        match (u32::try_from(cursor), u32::try_from(size)) {
            (Ok(offset), Ok(size)) if cursor + u64::from(size) <= u64::from(u32::MAX) => {
                placements.push(Placement { id, offset, size });
            }
            _ => return Err(FormatError::SectionOutOfBounds { id, offset: cursor, size }),
        }
        cursor += size;
    }
    Ok(placements)
}

pub fn relink(rpx: &mut Rpx) -> Result<(), FormatError> {
    let placements = plan_layout(rpx, |_, len| len)?;
    let crc_id = rpx.crc_section_id()?;

    // Nothing below can fail.
    rpx.sections[crc_id.index()].crc = 0;
    for p in &placements {
        let header = &mut rpx.sections[p.id.index()].header;
        header.offset = p.offset;
        header.size = p.size;
        trace!(section = %p.id, offset = p.offset, size = p.size, "placed section");
    }

    let table: Vec<u32> = rpx.sections.iter().map(|s| s.crc).collect();
    let crc_data = &mut rpx.sections[crc_id.index()].data;
    for (slot, crc) in crc_data.chunks_exact_mut(4).zip(&table) {
        BigEndian::write_u32(slot, *crc);
    }

    let data_end = placements
        .last()
        .map(|p| u64::from(p.offset) + u64::from(p.size))
        .unwrap_or_else(|| rpx.data_start());
    debug!(sections = table.len(), data_end, crc_section = %crc_id, "relinked");
    Ok(())
}

impl Rpx {
    /// See [`relink`].
    pub fn relink(&mut self) -> Result<(), FormatError> {
        relink(self)
    }
}

/// Ids of data-bearing sections in the order relink places them.
pub fn placement_order(rpx: &Rpx) -> Vec<SectionId> {
    rpx.file_order()
        .iter()
        .copied()
        .filter(|id| rpx.sections[id.index()].has_file_data())
        .collect()
}
