pub use super::factories::{FlowFileFactory, FlowRecordFactory, QuerySpecFactory};

use std::path::Path;

pub struct Factory;

impl Factory {
    pub fn flow_record() -> FlowRecordFactory {
        FlowRecordFactory::new()
    }

    pub fn flow_file(dir: &Path) -> FlowFileFactory {
        FlowFileFactory::new(dir)
    }

    pub fn query_spec() -> QuerySpecFactory {
        QuerySpecFactory::new()
    }
}
