use serde::Serialize;
use std::io::{Read, Write};

use crate::be::{read_be, write_be};
use crate::error::{FormatError, RpxError};

pub const ELF_MAGIC: &[u8; 4] = b"\x7fELF";
/// Object type of an executable carrying RPL extensions.
pub const RPX_TYPE: u16 = 0xFE01;
/// On-disk size of the file header.
pub const EHDR_SIZE: usize = 52;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ehdr {
    pub ident:       [u8; 16],
    pub object_type: u16,
    pub machine:     u16,
    pub version:     u32,
    pub entry:       u32,
    pub phoff:       u32,
    pub shoff:       u32,
    pub flags:       u32,
    pub ehsize:      u16,
    pub phentsize:   u16,
    pub phnum:       u16,
    pub shentsize:   u16,
    pub shnum:       u16,
    pub shstrndx:    u16,
}

impl Ehdr {
    pub fn write<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        writer.write_all(&self.ident)?;
        write_be(&mut writer, self.object_type)?;
        write_be(&mut writer, self.machine)?;
        write_be(&mut writer, self.version)?;
        write_be(&mut writer, self.entry)?;
        write_be(&mut writer, self.phoff)?;
        write_be(&mut writer, self.shoff)?;
        write_be(&mut writer, self.flags)?;
        write_be(&mut writer, self.ehsize)?;
        write_be(&mut writer, self.phentsize)?;
        write_be(&mut writer, self.phnum)?;
        write_be(&mut writer, self.shentsize)?;
        write_be(&mut writer, self.shnum)?;
        write_be(&mut writer, self.shstrndx)?;
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> Result<Self, RpxError> {
        let mut ident = [0u8; 16];
        reader.read_exact(&mut ident)?;
        if &ident[..4] != ELF_MAGIC {
            let mut found = [0u8; 4];
            found.copy_from_slice(&ident[..4]);
            return Err(FormatError::InvalidMagic { found }.into());
        }
        let object_type = read_be(&mut reader)?;
        if object_type != RPX_TYPE {
            return Err(FormatError::UnsupportedType(object_type).into());
        }
        Ok(Self {
            ident,
            object_type,
            machine:   read_be(&mut reader)?,
            version:   read_be(&mut reader)?,
            entry:     read_be(&mut reader)?,
            phoff:     read_be(&mut reader)?,
            shoff:     read_be(&mut reader)?,
            flags:     read_be(&mut reader)?,
            ehsize:    read_be(&mut reader)?,
            phentsize: read_be(&mut reader)?,
            phnum:     read_be(&mut reader)?,
            shentsize: read_be(&mut reader)?,
            shnum:     read_be(&mut reader)?,
            shstrndx:  read_be(&mut reader)?,
        })
    }

    /// First byte past the section header table.
    pub fn shdr_table_end(&self) -> u64 {
        u64::from(self.shoff) + u64::from(self.shnum) * u64::from(self.shentsize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample() -> Ehdr {
        let mut ident = [0u8; 16];
        ident[..4].copy_from_slice(ELF_MAGIC);
        ident[4] = 1; // ELFCLASS32
        ident[5] = 2; // ELFDATA2MSB
        ident[6] = 1;
        ident[7] = 0xCA;
        ident[8] = 0xFE;
        Ehdr {
            ident,
            object_type: RPX_TYPE,
            machine:     20,
            version:     1,
            entry:       0x0200_0000,
            phoff:       0,
            shoff:       0x40,
            flags:       0,
            ehsize:      EHDR_SIZE as u16,
            phentsize:   0,
            phnum:       0,
            shentsize:   40,
            shnum:       3,
            shstrndx:    1,
        }
    }

    #[test]
    fn layout_is_52_bytes_big_endian() {
        let mut buf = Vec::new();
        sample().write(&mut buf).unwrap();
        assert_eq!(buf.len(), EHDR_SIZE);
        assert_eq!(&buf[16..18], &[0xFE, 0x01]);
        assert_eq!(&buf[32..36], &[0x00, 0x00, 0x00, 0x40]);
        assert_eq!(&buf[50..52], &[0x00, 0x01]);

        let back = Ehdr::read(Cursor::new(&buf)).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buf = Vec::new();
        sample().write(&mut buf).unwrap();
        buf[1] = b'X';
        match Ehdr::read(Cursor::new(&buf)) {
            Err(RpxError::Format(FormatError::InvalidMagic { found })) => {
                assert_eq!(found, [0x7F, b'X', b'L', b'F']);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn rejects_plain_elf_executable() {
        let mut hdr = sample();
        hdr.object_type = 2; // ET_EXEC
        let mut buf = Vec::new();
        hdr.write(&mut buf).unwrap();
        assert!(matches!(
            Ehdr::read(Cursor::new(&buf)),
            Err(RpxError::Format(FormatError::UnsupportedType(2)))
        ));
    }

    #[test]
    fn truncated_header_is_io_error() {
        let mut buf = Vec::new();
        sample().write(&mut buf).unwrap();
        buf.truncate(30);
        assert!(matches!(Ehdr::read(Cursor::new(&buf)), Err(RpxError::Io(_))));
    }

    #[test]
    fn shdr_table_end() {
        assert_eq!(sample().shdr_table_end(), 0x40 + 3 * 40);
    }
}
