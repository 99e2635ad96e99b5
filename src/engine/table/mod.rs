pub mod layout;

pub use layout::{FieldSpec, SortDirection, SortKey, TableLayout};

use std::cmp::Ordering;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use ahash::RandomState as AHashRandomState;

use crate::engine::errors::EngineError;
use crate::engine::record::FlowRecord;
use crate::engine::types::FieldValue;

pub type GroupKey = Vec<FieldValue>;

/// Key-value aggregation table. With aggregation keys, records sharing a
/// key are merged field by field; without keys it keeps every record
/// (list semantics). Rows are ordered by the sort key on read.
#[derive(Debug, Clone)]
pub struct AggregationTable {
    layout: Arc<TableLayout>,
    groups: HashMap<GroupKey, FlowRecord, AHashRandomState>,
    rows: Vec<FlowRecord>,
}

impl AggregationTable {
    pub fn new(layout: Arc<TableLayout>) -> Self {
        Self {
            layout,
            groups: HashMap::with_hasher(AHashRandomState::new()),
            rows: Vec::new(),
        }
    }

    pub fn layout(&self) -> &Arc<TableLayout> {
        &self.layout
    }

    pub fn len(&self) -> usize {
        if self.layout.is_list() {
            self.rows.len()
        } else {
            self.groups.len()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts a record, merging it into an existing group with the same key.
    pub fn write(&mut self, record: &FlowRecord) -> Result<(), EngineError> {
        if self.layout.is_list() {
            self.rows.push(record.clone());
            return Ok(());
        }

        match self.groups.entry(self.layout.key_of(record)) {
            Entry::Occupied(mut entry) => self.layout.merge_into(entry.get_mut(), record),
            Entry::Vacant(entry) => {
                entry.insert(self.layout.project(record)?);
                Ok(())
            }
        }
    }

    /// Same as `write` for a record serialized by another node.
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<(), EngineError> {
        let record = FlowRecord::decode(bytes)?;
        self.write(&record)
    }

    pub fn lookup(&self, record: &FlowRecord) -> Option<&FlowRecord> {
        if self.layout.is_list() {
            return None;
        }
        self.groups.get(&self.layout.key_of(record))
    }

    /// Folds another partition of the same query into this one.
    pub fn merge(&mut self, other: AggregationTable) -> Result<(), EngineError> {
        if !Arc::ptr_eq(&self.layout, &other.layout) && self.layout != other.layout {
            return Err(EngineError::LayoutMismatch(
                "cannot merge tables with different layouts".to_string(),
            ));
        }

        if self.layout.is_list() {
            self.rows.extend(other.rows);
            return Ok(());
        }

        for (key, row) in other.groups {
            match self.groups.entry(key) {
                Entry::Occupied(mut entry) => self.layout.merge_into(entry.get_mut(), &row)?,
                Entry::Vacant(entry) => {
                    entry.insert(row);
                }
            }
        }
        Ok(())
    }

    /// All rows in read order: by sort key when one is configured, then by
    /// group key (aggregates) or insertion order (lists).
    pub fn sorted(&self) -> Vec<&FlowRecord> {
        let mut out: Vec<&FlowRecord> = if self.layout.is_list() {
            self.rows.iter().collect()
        } else {
            self.groups.values().collect()
        };

        let layout = &self.layout;
        match (layout.sort(), layout.is_list()) {
            (Some(sort), _) => {
                let sort = *sort;
                out.sort_by(|a, b| {
                    let primary = a.get(sort.field).cmp(&b.get(sort.field));
                    let primary = match sort.direction {
                        SortDirection::Asc => primary,
                        SortDirection::Desc => primary.reverse(),
                    };
                    if primary != Ordering::Equal || layout.is_list() {
                        primary
                    } else {
                        layout.key_of(a).cmp(&layout.key_of(b))
                    }
                });
            }
            (None, false) => out.sort_by_key(|row| layout.key_of(row)),
            (None, true) => {}
        }
        out
    }

    /// First `limit` rows in read order; 0 means all.
    pub fn top(&self, limit: usize) -> Vec<&FlowRecord> {
        let mut rows = self.sorted();
        if limit > 0 {
            rows.truncate(limit);
        }
        rows
    }

    /// Sort-key value of the `n`th row (1-based), of the last row when fewer
    /// exist, or `None` for an empty table or a layout without a sort key.
    pub fn nth_sort_value(&self, n: usize) -> Option<FieldValue> {
        let sort = self.layout.sort()?;
        let rows = self.sorted();
        let idx = n.max(1).min(rows.len()).checked_sub(1)?;
        rows.get(idx).map(|row| row.get(sort.field))
    }

    pub fn rows(&self) -> Box<dyn Iterator<Item = &FlowRecord> + Send + '_> {
        if self.layout.is_list() {
            Box::new(self.rows.iter())
        } else {
            Box::new(self.groups.values())
        }
    }
}

#[cfg(test)]
mod table_test;
