pub mod be;
pub mod crc;
pub mod header;
pub mod section;
pub mod rpx;
pub mod io_stream;
pub mod relink;
pub mod codec;
pub mod error;

pub use header::Ehdr;
pub use section::{Section, SectionId, SectionKind, Shdr};
pub use rpx::Rpx;
pub use io_stream::{read_rpx, write_rpx, to_bytes};
pub use relink::relink;
pub use codec::{compress, compress_with, decompress, verify_crcs, CodecError, CompressOptions};
pub use error::{FormatError, RpxError};
