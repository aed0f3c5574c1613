use serde::Serialize;
use tracing::debug;

use super::{CodecError, ZlibCodec, ZLIB_LEVEL};
use crate::crc::crc32;
use crate::error::RpxError;
use crate::relink::{plan_layout, relink};
use crate::rpx::Rpx;
use crate::section::{Section, SectionId, SectionKind, SHF_RPL_ZLIB};

/// Configuration for [`compress_with`].
#[derive(Debug, Clone)]
pub struct CompressOptions {
    pub level: u32,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self { level: ZLIB_LEVEL }
    }
}

/// A CRC table slot that disagrees with the section's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrcMismatch {
    pub section:  SectionId,
    pub stored:   u32,
    pub computed: u32,
}

fn codec_err(section: SectionId) -> impl FnOnce(CodecError) -> RpxError {
    move |source| RpxError::Codec { section, source }
}

fn ids(rpx: &Rpx) -> impl Iterator<Item = (SectionId, &Section)> {
    rpx.sections
        .iter()
        .enumerate()
        .map(|(index, section)| (SectionId(index as u16), section))
}

/// Inflate every `SHF_RPL_ZLIB` section, refresh all CRCs, then relink.
///
/// All sections are inflated and the new layout is checked before any is
/// replaced, so a corrupt stream or an oversized result leaves the container
/// as it was.
pub fn decompress(rpx: &mut Rpx) -> Result<(), RpxError> {
    rpx.crc_table()?;
    let codec = ZlibCodec::default();

    let mut inflated = Vec::new();
    for (id, section) in ids(rpx) {
        if !section.has_file_data() || !section.is_compressed() {
            continue;
        }
        let data = codec.decompress(&section.data).map_err(codec_err(id))?;
        debug!(section = %id, stored = section.data.len(), inflated = data.len(), "inflated section");
        inflated.push((id, data));
    }
    check_layout(rpx, &inflated)?;

    for (id, data) in inflated {
        let section = &mut rpx.sections[id.index()];
        section.header.flags &= !SHF_RPL_ZLIB;
        // The size prefix is a u32, so this cannot truncate.
        section.header.size = data.len() as u32;
        section.data = data;
    }
    rpx.refresh_crcs();

    relink(rpx)?;
    Ok(())
}

/// [`compress_with`] at the default level.
pub fn compress(rpx: &mut Rpx) -> Result<(), RpxError> {
    compress_with(rpx, &CompressOptions::default())
}

/// Deflate every eligible section, keeping the compressed form only when it
/// is strictly smaller than the stored bytes, then relink.
///
/// File-info and CRC sections are never compressed, nor are sections already
/// flagged.  The cached CRC of every uncompressed section is refreshed
/// whether or not it ends up compressed.  Nothing changes unless every
/// section deflates and the new layout fits.
pub fn compress_with(rpx: &mut Rpx, options: &CompressOptions) -> Result<(), RpxError> {
    rpx.crc_table()?;
    let codec = ZlibCodec::new(options.level);

    let mut packed = Vec::new();
    for (id, section) in ids(rpx) {
        if !section.has_file_data() || section.is_compressed() {
            continue;
        }
        if matches!(section.kind(), SectionKind::RplFileInfo | SectionKind::RplCrcs) {
            continue;
        }
        let stored = codec.compress(&section.data).map_err(codec_err(id))?;
        if stored.len() >= section.data.len() {
            debug!(section = %id, size = section.data.len(), deflated = stored.len(), "left uncompressed");
            continue;
        }
        debug!(section = %id, size = section.data.len(), deflated = stored.len(), "deflated section");
        packed.push((id, stored));
    }
    check_layout(rpx, &packed)?;

    rpx.refresh_crcs();
    for (id, stored) in packed {
        let section = &mut rpx.sections[id.index()];
        section.header.flags |= SHF_RPL_ZLIB;
        section.header.size = stored.len() as u32;
        section.data = stored;
    }

    relink(rpx)?;
    Ok(())
}

/// Fail if relinking with the `replaced` buffers would not fit.
fn check_layout(rpx: &Rpx, replaced: &[(SectionId, Vec<u8>)]) -> Result<(), RpxError> {
    plan_layout(rpx, |id, len| {
        replaced
            .iter()
            .find(|(r, _)| *r == id)
            .map_or(len, |(_, data)| data.len())
    })?;
    Ok(())
}

/// Recompute every section's CRC over its uncompressed content and compare
/// against the CRC table.  Sections without file data and the CRC section
/// itself are expected to hold 0.
pub fn verify_crcs(rpx: &Rpx) -> Result<Vec<CrcMismatch>, RpxError> {
    let table = rpx.crc_table()?;
    let crc_id = rpx.crc_section_id()?;
    let codec = ZlibCodec::default();

    let mut mismatches = Vec::new();
    for (id, section) in ids(rpx) {
        let computed = if id == crc_id || !section.has_file_data() {
            0
        } else if section.is_compressed() {
            crc32(0, &codec.decompress(&section.data).map_err(codec_err(id))?)
        } else {
            crc32(0, &section.data)
        };
        let stored = table[id.index()];
        if stored != computed {
            mismatches.push(CrcMismatch { section: id, stored, computed });
        }
    }
    Ok(mismatches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::be::get_be_u32;
    use crate::error::FormatError;
    use crate::header::{Ehdr, ELF_MAGIC, RPX_TYPE};
    use crate::section::{Shdr, SHT_NOBITS, SHT_PROGBITS, SHT_RPL_CRCS, SHT_RPL_FILEINFO};
    use proptest::prelude::*;

    fn ehdr(shnum: u16) -> Ehdr {
        let mut ident = [0u8; 16];
        ident[..4].copy_from_slice(ELF_MAGIC);
        Ehdr {
            ident, object_type: RPX_TYPE, machine: 20, version: 1, entry: 0,
            phoff: 0, shoff: 0x40, flags: 0, ehsize: 52, phentsize: 0, phnum: 0,
            shentsize: 40, shnum, shstrndx: 0,
        }
    }

    fn section(sh_type: u32, offset: u32, data: Vec<u8>) -> Section {
        let size = data.len() as u32;
        Section::new(Shdr { sh_type, offset, size, ..Shdr::default() }, data)
    }

    fn text() -> Vec<u8> {
        b"\x94\x21\xff\xf0\x7c\x08\x02\xa6\x93\xe1\x00\x0c".repeat(200)
    }

    /// [0] text, [1] fileinfo, [2] crcs, [3] bss, [4] tiny incompressible data.
    fn sample() -> Rpx {
        let mut rpx = Rpx::new(ehdr(5), vec![
            section(SHT_PROGBITS, 1, text()),
            section(SHT_RPL_FILEINFO, 2, vec![0; 0x60]),
            section(SHT_RPL_CRCS, 3, vec![0; 20]),
            section(SHT_NOBITS, 0, vec![]),
            section(SHT_PROGBITS, 4, (0u8..16).map(|b| b.wrapping_mul(37)).collect()),
        ]).unwrap();
        rpx.relink().unwrap();
        rpx
    }

    #[test]
    fn compress_then_decompress_restores_content() {
        let mut rpx = sample();
        let before: Vec<u32> = rpx.sections.iter().map(|s| s.crc).collect();

        compress(&mut rpx).unwrap();
        assert!(rpx.sections[0].is_compressed());
        assert!(rpx.sections[0].header.size < text().len() as u32);
        assert_eq!(rpx.sections[0].header.size as usize, rpx.sections[0].data.len());
        assert_eq!(rpx.sections[0].crc, before[0]);
        assert_eq!(verify_crcs(&rpx).unwrap(), vec![]);

        decompress(&mut rpx).unwrap();
        assert!(!rpx.sections[0].is_compressed());
        assert_eq!(rpx.sections[0].data, text());
        assert_eq!(rpx.sections[0].crc, before[0]);
        assert_eq!(verify_crcs(&rpx).unwrap(), vec![]);
    }

    #[test]
    fn fileinfo_and_crcs_are_never_compressed() {
        let mut rpx = sample();
        compress(&mut rpx).unwrap();
        // All-zero fileinfo would deflate well; it must stay plain.
        assert!(!rpx.sections[1].is_compressed());
        assert_eq!(rpx.sections[1].data, vec![0; 0x60]);
        assert!(!rpx.sections[2].is_compressed());
    }

    #[test]
    fn incompressible_section_is_left_bit_identical() {
        let mut rpx = sample();
        let before = rpx.sections[4].clone();
        compress(&mut rpx).unwrap();
        let after = &rpx.sections[4];
        assert!(!after.is_compressed());
        assert_eq!(after.data, before.data);
        assert_eq!(after.header.flags, before.header.flags);
        assert_eq!(after.header.size, before.header.size);
    }

    #[test]
    fn compress_refreshes_crc_table() {
        let mut rpx = sample();
        rpx.sections[0].data[0] ^= 0xFF;
        compress(&mut rpx).unwrap();
        let table = &rpx.sections[2].data;
        let mut edited = text();
        edited[0] ^= 0xFF;
        assert_eq!(get_be_u32(table, 0), Some(crc32(0, &edited)));
        assert_eq!(get_be_u32(table, 1), Some(crc32(0, &[0; 0x60])));
        assert_eq!(get_be_u32(table, 2), Some(0));
        assert_eq!(get_be_u32(table, 3), Some(0));
    }

    #[test]
    fn decompress_leaves_plain_sections_alone() {
        let mut rpx = sample();
        let before = rpx.sections.clone();
        decompress(&mut rpx).unwrap();
        for (a, b) in before.iter().zip(&rpx.sections) {
            assert_eq!(a.data, b.data);
            assert_eq!(a.header, b.header);
        }
    }

    #[test]
    fn corrupt_section_aborts_the_whole_pass() {
        let mut rpx = sample();
        compress(&mut rpx).unwrap();
        let snapshot = rpx.sections.clone();
        let half = rpx.sections[0].data.len() / 2;
        rpx.sections[0].data.truncate(half);
        rpx.sections[0].header.size = rpx.sections[0].data.len() as u32;
        let damaged = rpx.sections[0].clone();

        match decompress(&mut rpx) {
            Err(RpxError::Codec { section, .. }) => assert_eq!(section, SectionId(0)),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(rpx.sections[0].data, damaged.data);
        assert!(rpx.sections[0].is_compressed());
        assert_eq!(rpx.sections[1].header, snapshot[1].header);
    }

    #[test]
    fn verify_reports_stale_entries() {
        let mut rpx = sample();
        rpx.sections[0].data[5] ^= 1;
        let mismatches = verify_crcs(&rpx).unwrap();
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].section, SectionId(0));
        assert_eq!(mismatches[0].stored, crc32(0, &text()));
    }

    #[test]
    fn passes_require_a_crc_section() {
        let mut rpx = Rpx::new(ehdr(1), vec![section(SHT_PROGBITS, 1, text())]).unwrap();
        assert!(matches!(
            compress(&mut rpx),
            Err(RpxError::Format(FormatError::MissingCrcSection))
        ));
        assert!(!rpx.sections[0].is_compressed());
    }

    /// Pseudo-random bytes that deflate does not shrink.
    fn noise(len: usize) -> Vec<u8> {
        let mut state = 0x2545_F491u32;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect()
    }

    fn assert_same_sections(a: &[Section], b: &[Section]) {
        for (before, after) in a.iter().zip(b) {
            assert_eq!(before.header, after.header);
            assert_eq!(before.data, after.data);
            assert_eq!(before.crc, after.crc);
        }
    }

    #[test]
    fn compress_that_cannot_be_placed_changes_nothing() {
        let mut rpx = Rpx::new(ehdr(3), vec![
            section(SHT_PROGBITS, 1, vec![0; 0x8000]),
            section(SHT_RPL_CRCS, 2, vec![0; 12]),
            section(SHT_PROGBITS, 3, noise(0x20000)),
        ]).unwrap();
        rpx.ehdr.shoff = 0xFFFF_0000;
        let snapshot = rpx.sections.clone();

        match compress(&mut rpx) {
            Err(RpxError::Format(FormatError::SectionOutOfBounds { id, .. })) => {
                assert_eq!(id, SectionId(2));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_same_sections(&snapshot, &rpx.sections);
    }

    #[test]
    fn decompress_that_cannot_be_placed_changes_nothing() {
        let stored = ZlibCodec::default().compress(&vec![0; 0x20000]).unwrap();
        let mut packed = section(SHT_PROGBITS, 1, stored);
        packed.header.flags = SHF_RPL_ZLIB;
        let mut rpx = Rpx::new(ehdr(2), vec![
            packed,
            section(SHT_RPL_CRCS, 2, vec![0; 8]),
        ]).unwrap();
        rpx.ehdr.shoff = 0xFFFF_0000;
        let snapshot = rpx.sections.clone();

        match decompress(&mut rpx) {
            Err(RpxError::Format(FormatError::SectionOutOfBounds { id, .. })) => {
                assert_eq!(id, SectionId(0));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(rpx.sections[0].is_compressed());
        assert_same_sections(&snapshot, &rpx.sections);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn round_trip_preserves_crc(
            body in proptest::collection::vec(any::<u8>(), 0..2048),
            repeat in 1usize..8,
        ) {
            let data = body.repeat(repeat);
            let mut rpx = Rpx::new(ehdr(2), vec![
                section(SHT_RPL_CRCS, 1, vec![0; 8]),
                section(SHT_PROGBITS, 2, data.clone()),
            ]).unwrap();
            let original = crc32(0, &data);

            compress(&mut rpx).unwrap();
            prop_assert_eq!(rpx.sections[1].crc, original);
            decompress(&mut rpx).unwrap();
            prop_assert_eq!(&rpx.sections[1].data, &data);
            prop_assert_eq!(rpx.sections[1].crc, original);
            prop_assert_eq!(get_be_u32(&rpx.sections[0].data, 1), Some(original));
        }
    }
}
