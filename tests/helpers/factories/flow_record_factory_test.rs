use crate::test_helpers::factories::FlowRecordFactory;

#[test]
fn creates_defaults_and_overrides() {
    let record = FlowRecordFactory::new()
        .with_src("1.2.3.4")
        .with_ports(5, 6)
        .with_bytes(7)
        .create();
    assert_eq!(record.src_addr.to_string(), "1.2.3.4");
    assert_eq!((record.src_port, record.dst_port), (5, 6));
    assert_eq!(record.bytes, 7);
    assert_eq!(record.flows, 1);
}

#[test]
fn create_list_gives_distinct_sources() {
    let records = FlowRecordFactory::new().create_list(300);
    assert_eq!(records.len(), 300);
    let mut sources: Vec<_> = records.iter().map(|r| r.src_addr).collect();
    sources.sort();
    sources.dedup();
    assert_eq!(sources.len(), 300);
}
