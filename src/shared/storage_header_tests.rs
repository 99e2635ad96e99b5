use crate::shared::storage_header::{FileHeader, HEADER_LEN, HeaderError, MagicFile};
use std::io::Cursor;

struct Sample;
impl MagicFile for Sample {
    const MAGIC: [u8; 8] = *b"SAMPLE1\0";
}

#[test]
fn header_written_by_trait_reads_back() {
    let mut buf = Vec::new();
    Sample::write_header(&mut buf).unwrap();
    buf.extend_from_slice(b"body");
    assert_eq!(buf.len(), HEADER_LEN + 4);

    let mut cursor = Cursor::new(buf);
    let header = Sample::read_header(&mut cursor).unwrap();
    assert_eq!(header, FileHeader::new(Sample::MAGIC, 1, 0));
    assert_eq!(cursor.position() as usize, HEADER_LEN);
}

#[test]
fn corrupted_byte_fails_crc() {
    let mut bytes = FileHeader::new(Sample::MAGIC, 1, 0).encode();
    bytes[3] ^= 0x5A;
    assert!(matches!(
        FileHeader::decode(&bytes),
        Err(HeaderError::CrcMismatch { .. })
    ));
}

#[test]
fn foreign_magic_and_newer_version_are_rejected() {
    let mut buf = Vec::new();
    FileHeader::new(*b"NOTFLOW\0", 1, 0).write_to(&mut buf).unwrap();
    let err = Sample::read_header(&mut Cursor::new(buf)).unwrap_err();
    assert!(matches!(err, HeaderError::BadMagic(m) if &m == b"NOTFLOW\0"));

    let mut buf = Vec::new();
    FileHeader::new(Sample::MAGIC, 2, 0).write_to(&mut buf).unwrap();
    let err = Sample::read_header(&mut Cursor::new(buf)).unwrap_err();
    assert!(matches!(
        err,
        HeaderError::UnsupportedVersion { found: 2, supported: 1 }
    ));
}

#[test]
fn short_input_is_an_io_error() {
    let buf = vec![0u8; HEADER_LEN - 1];
    assert!(matches!(
        FileHeader::read_from(Cursor::new(buf)),
        Err(HeaderError::Io(_))
    ));
}
