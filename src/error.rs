use std::io;
use thiserror::Error;

use crate::codec::CodecError;
use crate::section::SectionId;

/// Structural problems with an image: header checks on read, CRC table
/// lookup, and relink placement.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Invalid magic {found:02x?}, expected 7f 45 4c 46")]
    InvalidMagic { found: [u8; 4] },
    #[error("Unsupported object type {0:#06x}, expected 0xfe01")]
    UnsupportedType(u16),
    #[error("Section header entry size {0} is smaller than a section header")]
    ShdrEntryTooSmall(u16),
    #[error("Header declares {declared} sections but {actual} were supplied")]
    SectionCountMismatch { declared: u16, actual: usize },
    #[error("No RPL_CRCS section present")]
    MissingCrcSection,
    #[error("More than one RPL_CRCS section (sections {first} and {second})")]
    DuplicateCrcSection { first: SectionId, second: SectionId },
    #[error("CRC table holds {len} bytes but {needed} are required")]
    CrcTableTooSmall { needed: usize, len: usize },
    #[error("Section {id} does not fit a 32-bit file layout (offset {offset:#x}, size {size:#x})")]
    SectionOutOfBounds { id: SectionId, offset: u64, size: u64 },
}

#[derive(Error, Debug)]
pub enum RpxError {
    #[error("Format error: {0}")]
    Format(#[from] FormatError),
    #[error("Section {section}: {source}")]
    Codec {
        section: SectionId,
        #[source]
        source:  CodecError,
    },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
