use crate::engine::table::{FieldSpec, SortDirection, SortKey};
use crate::engine::types::Field;
use crate::query::query_spec::{QuerySpec, QuerySpecBuilder};

/// Builds `QuerySpec`s for the common query shapes.
pub struct QuerySpecFactory {
    builder: QuerySpecBuilder,
}

impl QuerySpecFactory {
    pub fn new() -> Self {
        Self {
            builder: QuerySpec::builder(),
        }
    }

    pub fn list() -> Self {
        Self::new()
    }

    pub fn sort_by(field: Field, direction: SortDirection) -> Self {
        Self {
            builder: QuerySpec::builder().sort_by(SortKey::new(field, direction)),
        }
    }

    /// Aggregates by `key`, descending by `sort` (a summed volume field).
    pub fn top_by(key: Field, sort: Field) -> Self {
        Self {
            builder: QuerySpec::builder()
                .aggregate_by(vec![FieldSpec::new(key)])
                .sort_by(SortKey::new(sort, SortDirection::Desc)),
        }
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.builder = self.builder.limit(limit);
        self
    }

    pub fn with_filter(mut self, filter: &str) -> Self {
        self.builder = self.builder.filter(filter);
        self
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.builder = self.builder.path(path);
        self
    }

    pub fn with_fast_topn(mut self, enabled: bool) -> Self {
        self.builder = self.builder.fast_topn(enabled);
        self
    }

    pub fn metadata_only(mut self) -> Self {
        self.builder = self.builder.metadata_only(true);
        self
    }

    pub fn create(self) -> QuerySpec {
        self.builder.build().unwrap()
    }
}

impl Default for QuerySpecFactory {
    fn default() -> Self {
        Self::new()
    }
}
