//! Stream reader and writer for RPX images.
//!
//! # Reader
//! [`read_rpx`] decodes the file header, the section header table at
//! `e_shoff` (skipping any per-entry padding beyond `SHDR_SIZE`), derives the
//! file order, then reads each file-backed section's stored bytes in file
//! order so the stream only ever seeks forward through the data area.
//! Each section's cached CRC is seeded from the on-disk CRC table.
//!
//! # Writer
//! [`write_rpx`] emits the header at 0, the section header table at
//! `e_shoff`, every file-backed section at its `sh_offset` in file order, and
//! finally extends the stream with zeros to a multiple of `RPX_ALIGN`.
//! [`to_bytes`] runs the writer over an in-memory buffer and returns exactly
//! `Rpx::written_size()` bytes.
//!
//! # Endianness
//! All binary I/O is strictly big-endian; see `header.rs` and `section.rs`.

use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use tracing::debug;

use crate::error::{FormatError, RpxError};
use crate::header::Ehdr;
use crate::rpx::Rpx;
use crate::section::{Section, Shdr, SHDR_SIZE};

// ── Reader ───────────────────────────────────────────────────────────────────

/// Parse an RPX image.  Any failure yields no container at all.
pub fn read_rpx<R: Read + Seek>(mut reader: R) -> Result<Rpx, RpxError> {
    reader.seek(SeekFrom::Start(0))?;
    let ehdr = Ehdr::read(&mut reader)?;
    let shdr_pad = entry_padding(&ehdr)?;

    reader.seek(SeekFrom::Start(u64::from(ehdr.shoff)))?;
    let mut headers = Vec::with_capacity(usize::from(ehdr.shnum));
    for _ in 0..ehdr.shnum {
        headers.push(Shdr::read(&mut reader)?);
        if shdr_pad != 0 {
            reader.seek(SeekFrom::Current(shdr_pad as i64))?;
        }
    }

    // Offsets only; data is attached below once the file order is known.
    let sections = headers
        .into_iter()
        .map(|header| Section { header, data: Vec::new(), crc: 0 })
        .collect();
    let mut rpx = Rpx::new(ehdr, sections)?;

    let (order, sections) = rpx.layout_mut();
    for id in order {
        let section = &mut sections[id.index()];
        if !section.has_file_data() {
            continue;
        }
        let size = u64::from(section.header.size);
        reader.seek(SeekFrom::Start(u64::from(section.header.offset)))?;
        let mut data = Vec::new();
        (&mut reader).take(size).read_to_end(&mut data)?;
        if data.len() as u64 != size {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, format!(
                "section {id} declares {size} bytes at {:#x}, only {} available",
                section.header.offset,
                data.len()
            )).into());
        }
        section.data = data;
    }

    rpx.seed_crcs_from_table();
    debug!(sections = rpx.sections.len(), shoff = rpx.ehdr.shoff, "read rpx");
    Ok(rpx)
}

// ── Writer ───────────────────────────────────────────────────────────────────

/// Serialize `rpx` to `writer`.  Offsets are taken as-is; call `relink`
/// first if any section changed size.
pub fn write_rpx<W: Write + Seek>(rpx: &Rpx, mut writer: W) -> Result<(), RpxError> {
    let shdr_pad = entry_padding(&rpx.ehdr)?;

    writer.seek(SeekFrom::Start(0))?;
    rpx.ehdr.write(&mut writer)?;

    writer.seek(SeekFrom::Start(u64::from(rpx.ehdr.shoff)))?;
    for section in &rpx.sections {
        section.header.write(&mut writer)?;
        if shdr_pad != 0 {
            io::copy(&mut io::repeat(0).take(shdr_pad), &mut writer)?;
        }
    }

    for id in rpx.file_order() {
        let section = &rpx.sections[id.index()];
        if !section.has_file_data() {
            continue;
        }
        writer.seek(SeekFrom::Start(u64::from(section.header.offset)))?;
        writer.write_all(&section.data)?;
    }

    // Extend to the aligned length; a single trailing zero is enough for
    // seekable sinks that zero-fill gaps.
    let end = rpx.written_size();
    let current = writer.seek(SeekFrom::End(0))?;
    if current < end {
        writer.seek(SeekFrom::Start(end - 1))?;
        writer.write_all(&[0])?;
    }
    writer.flush()?;
    Ok(())
}

/// Write `rpx` into a fresh buffer.
pub fn to_bytes(rpx: &Rpx) -> Result<Vec<u8>, RpxError> {
    let mut cursor = Cursor::new(Vec::with_capacity(rpx.written_size() as usize));
    write_rpx(rpx, &mut cursor)?;
    Ok(cursor.into_inner())
}

/// Bytes following each section header inside its `e_shentsize` slot.
fn entry_padding(ehdr: &Ehdr) -> Result<u64, FormatError> {
    let entsize = usize::from(ehdr.shentsize);
    if ehdr.shnum != 0 && entsize < SHDR_SIZE {
        return Err(FormatError::ShdrEntryTooSmall(ehdr.shentsize));
    }
    Ok(entsize.saturating_sub(SHDR_SIZE) as u64)
}
