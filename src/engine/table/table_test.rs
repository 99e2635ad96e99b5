use crate::engine::table::{AggregationTable, FieldSpec, SortDirection, SortKey, TableLayout};
use crate::engine::types::{AggFunc, Field, FieldValue};
use crate::test_helpers::factories::FlowRecordFactory;
use std::sync::Arc;

fn by_src_layout(direction: SortDirection) -> Arc<TableLayout> {
    Arc::new(TableLayout::aggregate(
        vec![FieldSpec::new(Field::SrcAddr)],
        &[Field::First, Field::Last, Field::Packets, Field::Flows],
        Some(SortKey::new(Field::Bytes, direction)),
    ))
}

#[test]
fn aggregate_merges_with_per_field_functions() {
    let mut table = AggregationTable::new(by_src_layout(SortDirection::Desc));
    table
        .write(&FlowRecordFactory::new().with_src("10.0.0.1").with_bytes(100).with_times(50, 60).create())
        .unwrap();
    table
        .write(&FlowRecordFactory::new().with_src("10.0.0.1").with_bytes(40).with_times(10, 90).create())
        .unwrap();
    table
        .write(&FlowRecordFactory::new().with_src("10.0.0.2").with_bytes(7).create())
        .unwrap();

    assert_eq!(table.len(), 2);
    let rows = table.sorted();
    assert_eq!(rows[0].bytes, 140);
    assert_eq!(rows[0].first, 10, "first merges with MIN");
    assert_eq!(rows[0].last, 90, "last merges with MAX");
    assert_eq!(rows[0].flows, 2);
    assert_eq!(rows[1].bytes, 7);
    // Non-key, non-value fields are not carried into the row.
    assert_eq!(rows[0].dst_port, 0);
}

#[test]
fn prefix_alignment_groups_addresses() {
    let layout = Arc::new(TableLayout::aggregate(
        vec![FieldSpec::with_prefix(Field::SrcAddr, 24, 64)],
        &[Field::Bytes],
        None,
    ));
    let mut table = AggregationTable::new(layout);
    for src in ["10.0.0.1", "10.0.0.200", "10.0.1.1", "2001:db8::1", "2001:db8::ffff"] {
        table.write(&FlowRecordFactory::new().with_src(src).with_bytes(1).create()).unwrap();
    }
    assert_eq!(table.len(), 3);
    let first = table.sorted()[0];
    assert_eq!(first.src_addr.to_string(), "10.0.0.0");
    assert_eq!(first.bytes, 2);
}

#[test]
fn list_layout_keeps_every_record_and_sorts() {
    let layout = Arc::new(TableLayout::list(Some(SortKey::new(Field::Packets, SortDirection::Asc))));
    let mut table = AggregationTable::new(layout);
    for packets in [5, 1, 3, 1] {
        table.write(&FlowRecordFactory::new().with_packets(packets).create()).unwrap();
    }
    assert_eq!(table.len(), 4);
    let packets: Vec<u64> = table.sorted().iter().map(|r| r.packets).collect();
    assert_eq!(packets, vec![1, 1, 3, 5]);
    assert_eq!(table.top(2).len(), 2);
    assert_eq!(table.top(0).len(), 4);
}

#[test]
fn merge_combines_partitions() {
    let layout = by_src_layout(SortDirection::Desc);
    let mut a = AggregationTable::new(Arc::clone(&layout));
    let mut b = AggregationTable::new(Arc::clone(&layout));
    a.write(&FlowRecordFactory::new().with_src("10.0.0.1").with_bytes(3).create()).unwrap();
    b.write(&FlowRecordFactory::new().with_src("10.0.0.1").with_bytes(4).create()).unwrap();
    b.write(&FlowRecordFactory::new().with_src("10.0.0.9").with_bytes(1).create()).unwrap();

    a.merge(b).unwrap();
    assert_eq!(a.len(), 2);
    assert_eq!(a.sorted()[0].bytes, 7);
}

#[test]
fn merge_rejects_different_layouts() {
    let mut a = AggregationTable::new(by_src_layout(SortDirection::Desc));
    let b = AggregationTable::new(Arc::new(TableLayout::list(None)));
    assert!(a.merge(b).is_err());
}

#[test]
fn nth_sort_value_bounds() {
    let mut table = AggregationTable::new(by_src_layout(SortDirection::Desc));
    assert_eq!(table.nth_sort_value(3), None);

    for (src, bytes) in [("10.0.0.1", 10), ("10.0.0.2", 30), ("10.0.0.3", 20)] {
        table.write(&FlowRecordFactory::new().with_src(src).with_bytes(bytes).create()).unwrap();
    }
    assert_eq!(table.nth_sort_value(1), Some(FieldValue::Unsigned(30)));
    assert_eq!(table.nth_sort_value(2), Some(FieldValue::Unsigned(20)));
    // Fewer rows than requested: the last row's value.
    assert_eq!(table.nth_sort_value(10), Some(FieldValue::Unsigned(10)));
}

#[test]
fn lookup_and_raw_writes() {
    let mut table = AggregationTable::new(by_src_layout(SortDirection::Desc));
    let record = FlowRecordFactory::new().with_src("172.16.0.1").with_bytes(12).create();
    table.write_raw(&record.encode().unwrap()).unwrap();
    table.write_raw(&record.encode().unwrap()).unwrap();

    let row = table.lookup(&record).expect("group present");
    assert_eq!(row.bytes, 24);
    let other = FlowRecordFactory::new().with_src("172.16.0.2").create();
    assert!(table.lookup(&other).is_none());
}

#[test]
fn sort_key_custom_merge_function() {
    let layout = Arc::new(TableLayout::aggregate(
        vec![FieldSpec::new(Field::DstPort)],
        &[],
        Some(SortKey {
            field: Field::Bytes,
            direction: SortDirection::Desc,
            agg: Some(AggFunc::Max),
        }),
    ));
    let mut table = AggregationTable::new(layout);
    for bytes in [5, 9, 2] {
        table.write(&FlowRecordFactory::new().with_ports(1, 80).with_bytes(bytes).create()).unwrap();
    }
    assert_eq!(table.sorted()[0].bytes, 9);
}
