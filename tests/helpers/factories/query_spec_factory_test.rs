use crate::engine::types::Field;
use crate::query::query_spec::WorkingMode;
use crate::test_helpers::factories::QuerySpecFactory;

#[test]
fn shapes_map_to_modes() {
    assert_eq!(QuerySpecFactory::list().create().mode, WorkingMode::List);
    assert_eq!(
        QuerySpecFactory::top_by(Field::SrcAddr, Field::Bytes)
            .with_limit(5)
            .create()
            .mode,
        WorkingMode::Aggregate
    );
    assert_eq!(
        QuerySpecFactory::new().metadata_only().create().mode,
        WorkingMode::MetadataOnly
    );
}
