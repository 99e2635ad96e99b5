use crate::engine::errors::EngineError;
use crate::engine::file::{FileMetadata, FlowFileReader, FlowFileWriter};
use crate::engine::record::{PROTO_TCP, PROTO_UDP, ProtoClass};
use crate::test_helpers::factories::FlowRecordFactory;
use std::fs::OpenOptions;
use std::io::Write;
use tempfile::tempdir;

#[test]
fn write_then_read_preserves_order_and_metadata() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("flows.fdf");

    let records = vec![
        FlowRecordFactory::new().with_proto(PROTO_TCP).with_bytes(100).with_packets(2).create(),
        FlowRecordFactory::new().with_proto(PROTO_UDP).with_bytes(50).with_packets(1).create(),
        FlowRecordFactory::new()
            .with_src("2001:db8::7")
            .with_proto(PROTO_TCP)
            .with_bytes(10)
            .with_packets(1)
            .create(),
    ];

    let mut writer = FlowFileWriter::create(&path).unwrap();
    for record in &records {
        writer.append(record).unwrap();
    }
    let written_meta = writer.finish().unwrap();

    let mut reader = FlowFileReader::open(&path).unwrap();
    assert_eq!(reader.metadata(), &written_meta);
    assert_eq!(reader.metadata().proto(ProtoClass::Tcp).bytes, 110);
    assert_eq!(reader.metadata().proto(ProtoClass::Udp).packets, 1);
    assert_eq!(reader.metadata().total().flows, 3);

    let mut buf = Vec::new();
    let mut read_back = Vec::new();
    while let Some(record) = reader.next_record(&mut buf).unwrap() {
        read_back.push(record);
    }
    assert_eq!(read_back, records);
}

#[test]
fn empty_file_reads_clean_eof() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.fdf");
    let meta = FlowFileWriter::create(&path).unwrap().finish().unwrap();
    assert_eq!(meta, FileMetadata::default());

    let mut reader = FlowFileReader::open(&path).unwrap();
    let mut buf = Vec::new();
    assert!(reader.next_record(&mut buf).unwrap().is_none());
}

#[test]
fn truncated_entry_is_reported() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cut.fdf");
    let mut writer = FlowFileWriter::create(&path).unwrap();
    writer.append(&FlowRecordFactory::new().create()).unwrap();
    writer.finish().unwrap();

    // Append a length prefix promising more bytes than follow.
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&40u32.to_le_bytes()).unwrap();
    file.write_all(&[0u8; 3]).unwrap();

    let mut reader = FlowFileReader::open(&path).unwrap();
    let mut buf = Vec::new();
    assert!(reader.next_record(&mut buf).unwrap().is_some());
    let err = reader.next_record(&mut buf).unwrap_err();
    assert!(matches!(err, EngineError::TruncatedRecord { .. }));
}

#[test]
fn non_flow_file_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("junk.fdf");
    std::fs::write(&path, b"definitely not a flow file at all").unwrap();
    let err = FlowFileReader::open(&path).err().expect("open must fail");
    assert!(matches!(err, EngineError::InvalidFile(_)));
}
