use std::io::{self, Read, Write};

use crc32fast::Hasher as Crc32Hasher;
use thiserror::Error;

/// magic(8) + version(2) + flags(2) + zero padding(4) + crc32(4)
pub const HEADER_LEN: usize = 20;
const CHECKED_LEN: usize = HEADER_LEN - 4;

#[derive(Debug, Error)]
pub enum HeaderError {
    #[error("I/O error reading header: {0}")]
    Io(#[from] io::Error),

    #[error("invalid magic {0:?}")]
    BadMagic([u8; 8]),

    #[error("unsupported version {found} (expected {supported})")]
    UnsupportedVersion { found: u16, supported: u16 },

    #[error("header CRC mismatch (stored {stored:#010x}, computed {computed:#010x})")]
    CrcMismatch { stored: u32, computed: u32 },
}

/// Fixed prefix of every binary file this crate writes. The CRC covers the
/// first 16 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub magic: [u8; 8],
    pub version: u16,
    pub flags: u16,
}

impl FileHeader {
    pub fn new(magic: [u8; 8], version: u16, flags: u16) -> Self {
        Self {
            magic,
            version,
            flags,
        }
    }

    fn checked_bytes(&self) -> [u8; CHECKED_LEN] {
        let mut out = [0u8; CHECKED_LEN];
        out[..8].copy_from_slice(&self.magic);
        out[8..10].copy_from_slice(&self.version.to_le_bytes());
        out[10..12].copy_from_slice(&self.flags.to_le_bytes());
        out
    }

    pub fn crc32(&self) -> u32 {
        let mut hasher = Crc32Hasher::new();
        hasher.update(&self.checked_bytes());
        hasher.finalize()
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..CHECKED_LEN].copy_from_slice(&self.checked_bytes());
        out[CHECKED_LEN..].copy_from_slice(&self.crc32().to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8; HEADER_LEN]) -> Result<Self, HeaderError> {
        let mut magic = [0u8; 8];
        magic.copy_from_slice(&bytes[..8]);
        let header = Self {
            magic,
            version: u16::from_le_bytes([bytes[8], bytes[9]]),
            flags: u16::from_le_bytes([bytes[10], bytes[11]]),
        };
        let stored = u32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
        let computed = header.crc32();
        if stored != computed {
            return Err(HeaderError::CrcMismatch { stored, computed });
        }
        Ok(header)
    }

    pub fn write_to<W: Write>(&self, mut w: W) -> io::Result<()> {
        w.write_all(&self.encode())
    }

    pub fn read_from<R: Read>(mut r: R) -> Result<Self, HeaderError> {
        let mut bytes = [0u8; HEADER_LEN];
        r.read_exact(&mut bytes)?;
        Self::decode(&bytes)
    }
}

/// A file format identified by its magic and version.
pub trait MagicFile {
    const MAGIC: [u8; 8];
    const VERSION: u16 = 1;

    fn write_header<W: Write>(writer: &mut W) -> io::Result<()> {
        FileHeader::new(Self::MAGIC, Self::VERSION, 0).write_to(writer)
    }

    /// Reads and checks the header; the reader is left at the first byte
    /// after it.
    fn read_header<R: Read>(reader: &mut R) -> Result<FileHeader, HeaderError> {
        let header = FileHeader::read_from(reader)?;
        if header.magic != Self::MAGIC {
            return Err(HeaderError::BadMagic(header.magic));
        }
        if header.version != Self::VERSION {
            return Err(HeaderError::UnsupportedVersion {
                found: header.version,
                supported: Self::VERSION,
            });
        }
        Ok(header)
    }
}
