//! Per-section zlib codec.
//!
//! # Stored form
//! A section flagged `SHF_RPL_ZLIB` stores
//!
//! ```text
//! [ uncompressed length (u32 BE) | zlib stream ... ]
//! ```
//!
//! The stream is a complete zlib (RFC 1950) stream, not raw deflate.  Its
//! inflated length must equal the prefix exactly; anything else is a hard
//! error and the section is never partially replaced.
//!
//! # Level
//! All deflate operations default to level 6 ([`ZLIB_LEVEL`]), which is what
//! the platform toolchain emits.

mod passes;

pub use passes::{compress, compress_with, decompress, verify_crcs, CompressOptions, CrcMismatch};

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{self, Read, Write};
use thiserror::Error;

/// Default deflate level.
pub const ZLIB_LEVEL: u32 = 6;
/// Width of the big-endian uncompressed-length prefix.
pub const SIZE_PREFIX_LEN: usize = 4;

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("Decompression error: {0}")]
    Decompression(String),
    #[error("Compressed payload is {len} bytes, too short for the size prefix")]
    Truncated { len: usize },
    #[error("Inflated to {actual} bytes but the prefix declares {declared}")]
    SizeMismatch { declared: u32, actual: usize },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── ZlibCodec ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct ZlibCodec {
    level: u32,
}

impl Default for ZlibCodec {
    fn default() -> Self {
        Self { level: ZLIB_LEVEL }
    }
}

impl ZlibCodec {
    pub fn new(level: u32) -> Self {
        Self { level: level.min(9) }
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    /// Deflate `data` into the stored form, size prefix included.
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let declared = u32::try_from(data.len()).map_err(|_| {
            CodecError::Compression(format!("{} bytes exceed the 32-bit size prefix", data.len()))
        })?;
        let mut out = Vec::with_capacity(SIZE_PREFIX_LEN + data.len() / 2);
        out.write_u32::<BigEndian>(declared)?;

        let mut encoder = ZlibEncoder::new(out, Compression::new(self.level));
        encoder
            .write_all(data)
            .map_err(|e| CodecError::Compression(e.to_string()))?;
        encoder.finish().map_err(|e| CodecError::Compression(e.to_string()))
    }

    /// Inflate a stored payload back to exactly its declared length.
    pub fn decompress(&self, stored: &[u8]) -> Result<Vec<u8>, CodecError> {
        if stored.len() < SIZE_PREFIX_LEN {
            return Err(CodecError::Truncated { len: stored.len() });
        }
        let declared = BigEndian::read_u32(&stored[..SIZE_PREFIX_LEN]);

        // One byte of headroom detects an oversized stream without inflating
        // all of it.  Deflate tops out near 1032:1, which bounds the
        // preallocation for a bogus prefix.
        let capacity = (declared as usize).min(stored.len().saturating_mul(1032));
        let mut out = Vec::with_capacity(capacity);
        ZlibDecoder::new(&stored[SIZE_PREFIX_LEN..])
            .take(u64::from(declared) + 1)
            .read_to_end(&mut out)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;

        if out.len() != declared as usize {
            return Err(CodecError::SizeMismatch { declared, actual: out.len() });
        }
        Ok(out)
    }

    /// Uncompressed length recorded in a stored payload's prefix.
    pub fn declared_size(stored: &[u8]) -> Option<u32> {
        stored.get(..SIZE_PREFIX_LEN).map(BigEndian::read_u32)
    }
}
