//! Big-endian scalar codec.
//!
//! Every multi-byte field of an RPX image is big-endian regardless of host
//! byte order.  Fields are moved through explicit [`read_be`] / [`write_be`]
//! calls parameterised over the integer width; there is no wrapper type and
//! no implicit numeric conversion.

use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// A fixed-width unsigned integer stored big-endian on disk.
pub trait BeScalar: Sized + Copy {
    /// Encoded width in bytes.
    const WIDTH: usize;

    fn read_from<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self>;
    fn write_to<W: Write + ?Sized>(self, writer: &mut W) -> io::Result<()>;
}

impl BeScalar for u8 {
    const WIDTH: usize = 1;

    fn read_from<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        reader.read_u8()
    }
    fn write_to<W: Write + ?Sized>(self, writer: &mut W) -> io::Result<()> {
        writer.write_u8(self)
    }
}

impl BeScalar for u16 {
    const WIDTH: usize = 2;

    fn read_from<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        reader.read_u16::<BigEndian>()
    }
    fn write_to<W: Write + ?Sized>(self, writer: &mut W) -> io::Result<()> {
        writer.write_u16::<BigEndian>(self)
    }
}

impl BeScalar for u32 {
    const WIDTH: usize = 4;

    fn read_from<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        reader.read_u32::<BigEndian>()
    }
    fn write_to<W: Write + ?Sized>(self, writer: &mut W) -> io::Result<()> {
        writer.write_u32::<BigEndian>(self)
    }
}

/// Read one big-endian `T` from `reader`.
#[inline]
pub fn read_be<T: BeScalar, R: Read + ?Sized>(reader: &mut R) -> io::Result<T> {
    T::read_from(reader)
}

/// Write `value` to `writer` in big-endian order.
#[inline]
pub fn write_be<T: BeScalar, W: Write + ?Sized>(writer: &mut W, value: T) -> io::Result<()> {
    value.write_to(writer)
}

// ── Word-array access ────────────────────────────────────────────────────────
//
// The CRC table section is an in-place array of big-endian u32 words.

/// Fetch word `index` of a big-endian u32 array, or `None` past the end.
pub fn get_be_u32(bytes: &[u8], index: usize) -> Option<u32> {
    let start = index.checked_mul(u32::WIDTH)?;
    bytes
        .get(start..start.checked_add(u32::WIDTH)?)
        .map(BigEndian::read_u32)
}
