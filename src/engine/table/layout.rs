use serde::{Deserialize, Serialize};

use crate::engine::errors::EngineError;
use crate::engine::record::FlowRecord;
use crate::engine::types::{AggFunc, Field, FieldValue};

/// A field reference with IPv4/IPv6 prefix alignment. Alignment only
/// affects address fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldSpec {
    pub field: Field,
    pub ipv4_prefix: u8,
    pub ipv6_prefix: u8,
}

impl FieldSpec {
    pub fn new(field: Field) -> Self {
        Self {
            field,
            ipv4_prefix: 32,
            ipv6_prefix: 128,
        }
    }

    pub fn with_prefix(field: Field, ipv4_prefix: u8, ipv6_prefix: u8) -> Self {
        Self {
            field,
            ipv4_prefix,
            ipv6_prefix,
        }
    }

    pub fn extract(&self, record: &FlowRecord) -> FieldValue {
        record
            .get(self.field)
            .masked(self.ipv4_prefix, self.ipv6_prefix)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortKey {
    pub field: Field,
    pub direction: SortDirection,
    /// Merge function when aggregation is active; the field default otherwise.
    pub agg: Option<AggFunc>,
}

impl SortKey {
    pub fn new(field: Field, direction: SortDirection) -> Self {
        Self {
            field,
            direction,
            agg: None,
        }
    }

    pub fn agg_func(&self) -> AggFunc {
        self.agg.unwrap_or_else(|| self.field.default_agg())
    }
}

/// Shape of an aggregation table: which fields form the key, which are
/// merged and how, and how rows are ordered on read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    keys: Vec<FieldSpec>,
    values: Vec<(Field, AggFunc)>,
    sort: Option<SortKey>,
}

impl TableLayout {
    /// No aggregation keys: every written record becomes its own row.
    pub fn list(sort: Option<SortKey>) -> Self {
        Self {
            keys: Vec::new(),
            values: Vec::new(),
            sort,
        }
    }

    pub fn aggregate(keys: Vec<FieldSpec>, value_fields: &[Field], sort: Option<SortKey>) -> Self {
        let mut values: Vec<(Field, AggFunc)> = Vec::with_capacity(value_fields.len() + 1);
        let is_key = |field: Field| keys.iter().any(|k| k.field == field);

        if let Some(sort) = sort {
            if !is_key(sort.field) {
                values.push((sort.field, sort.agg_func()));
            }
        }
        for field in value_fields {
            if !is_key(*field) && !values.iter().any(|(f, _)| f == field) {
                values.push((*field, field.default_agg()));
            }
        }

        Self { keys, values, sort }
    }

    pub fn is_list(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[FieldSpec] {
        &self.keys
    }

    pub fn values(&self) -> &[(Field, AggFunc)] {
        &self.values
    }

    pub fn sort(&self) -> Option<&SortKey> {
        self.sort.as_ref()
    }

    pub fn key_of(&self, record: &FlowRecord) -> Vec<FieldValue> {
        self.keys.iter().map(|spec| spec.extract(record)).collect()
    }

    /// Builds the stored row for a first-seen group: aligned keys plus values.
    pub fn project(&self, record: &FlowRecord) -> Result<FlowRecord, EngineError> {
        let mut row = FlowRecord::default();
        for spec in &self.keys {
            row.set(spec.field, spec.extract(record))?;
        }
        for (field, _) in &self.values {
            row.set(*field, record.get(*field))?;
        }
        Ok(row)
    }

    pub fn merge_into(&self, row: &mut FlowRecord, incoming: &FlowRecord) -> Result<(), EngineError> {
        for (field, agg) in &self.values {
            let merged = agg.apply(row.get(*field), incoming.get(*field));
            row.set(*field, merged)?;
        }
        Ok(())
    }
}
