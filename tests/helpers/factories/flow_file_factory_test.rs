use crate::engine::file::FlowFileReader;
use crate::test_helpers::factories::{FlowFileFactory, FlowRecordFactory};
use tempfile::tempdir;

#[test]
fn writes_readable_file_with_metadata() {
    let dir = tempdir().unwrap();
    let (path, meta) = FlowFileFactory::new(dir.path())
        .with_name("nested/a.fdf")
        .with_records(FlowRecordFactory::new().create_list(3))
        .create_with_metadata();

    assert!(path.ends_with("nested/a.fdf"));
    assert_eq!(meta.total().flows, 3);

    let mut reader = FlowFileReader::open(&path).unwrap();
    let mut buf = Vec::new();
    let mut count = 0;
    while reader.next_record(&mut buf).unwrap().is_some() {
        count += 1;
    }
    assert_eq!(count, 3);
}
