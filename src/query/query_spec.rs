use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::cluster::{ChannelError, Communicator, ROOT, Tag};
use crate::engine::filter::Filter;
use crate::engine::record::FlowRecord;
use crate::engine::table::{FieldSpec, SortDirection, SortKey, TableLayout};
use crate::engine::types::{AggFunc, Field};
use crate::query::errors::QueryError;

pub const MAX_AGGREGATION_KEYS: usize = 10;
pub const MAX_OUTPUT_FIELDS: usize = 30;

/// Printed columns of list and sort queries when none are requested.
pub const DEFAULT_LIST_FIELDS: [Field; 10] = [
    Field::First,
    Field::Last,
    Field::Proto,
    Field::SrcAddr,
    Field::SrcPort,
    Field::DstAddr,
    Field::DstPort,
    Field::Packets,
    Field::Bytes,
    Field::Flows,
];

/// Merged value columns of aggregate queries when none are requested.
pub const DEFAULT_AGGREGATE_VALUES: [Field; 5] = [
    Field::First,
    Field::Last,
    Field::Flows,
    Field::Packets,
    Field::Bytes,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkingMode {
    List,
    Sort,
    Aggregate,
    MetadataOnly,
}

/// Inclusive interval in milliseconds. A record matches when its own
/// `first..=last` interval overlaps it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: u64,
    pub end: u64,
}

impl TimeWindow {
    pub fn new(start: u64, end: u64) -> Result<Self, QueryError> {
        if start > end {
            return Err(QueryError::Argument(format!(
                "time range ends before it starts ({start} > {end})"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn instant(at: u64) -> Self {
        Self { start: at, end: at }
    }

    pub fn overlaps(&self, record: &FlowRecord) -> bool {
        record.first <= self.end && record.last >= self.start
    }
}

/// Immutable description of a query, computed once by the coordinator and
/// broadcast to every worker.
///
/// The filter source and the path selector are variable-length strings and
/// travel as separate length-prefixed broadcasts after the fixed part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub mode: WorkingMode,
    pub aggregation_keys: Vec<FieldSpec>,
    pub sort: Option<SortKey>,
    pub output_fields: Vec<FieldSpec>,
    pub time_window: Option<TimeWindow>,
    /// 0 means unlimited.
    pub record_limit: u64,
    pub use_fast_topn: bool,
    #[serde(skip)]
    pub filter: Option<String>,
    #[serde(skip)]
    pub path: Option<String>,
}

impl QuerySpec {
    pub fn builder() -> QuerySpecBuilder {
        QuerySpecBuilder::default()
    }

    /// Message tag of the record stream this mode produces.
    pub fn stream_tag(&self) -> Option<Tag> {
        match self.mode {
            WorkingMode::List => Some(Tag::List),
            WorkingMode::Sort => Some(Tag::Sort),
            WorkingMode::Aggregate => Some(Tag::Aggregate),
            WorkingMode::MetadataOnly => None,
        }
    }

    /// Matching records go straight to the coordinator without local storage.
    pub fn streams_records(&self) -> bool {
        match self.mode {
            WorkingMode::List => true,
            WorkingMode::Sort => self.record_limit == 0,
            _ => false,
        }
    }

    /// Workers keep matching records in a local aggregation table.
    pub fn needs_local_table(&self) -> bool {
        match self.mode {
            WorkingMode::Aggregate => true,
            WorkingMode::Sort => self.record_limit > 0,
            _ => false,
        }
    }

    pub fn table_layout(&self) -> TableLayout {
        match self.mode {
            WorkingMode::Aggregate => {
                let values: Vec<Field> = self.output_fields.iter().map(|s| s.field).collect();
                TableLayout::aggregate(self.aggregation_keys.clone(), &values, self.sort)
            }
            _ => TableLayout::list(self.sort),
        }
    }

    /// Columns handed to the printer, in order.
    pub fn printed_fields(&self) -> Vec<FieldSpec> {
        let mut fields = self.aggregation_keys.clone();
        fields.extend(self.output_fields.iter().copied());
        fields
    }

    pub fn compile_filter(&self) -> Result<Filter, QueryError> {
        match self.filter.as_deref() {
            Some(source) => Ok(Filter::compile(source)?),
            None => Ok(Filter::match_all()),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, QueryError> {
        bincode::serialize(self)
            .map_err(|e| QueryError::Resource(format!("cannot encode query: {e}")))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, QueryError> {
        bincode::deserialize(bytes).map_err(|e| {
            QueryError::from(ChannelError::Malformed(format!("query spec: {e}")))
        })
    }
}

/// Sends the query from the coordinator: fixed part, filter, then path,
/// each as a length broadcast followed by the bytes.
pub async fn broadcast_query(comm: &dyn Communicator, spec: &QuerySpec) -> Result<(), QueryError> {
    comm.broadcast_sized(ROOT, Some(Bytes::from(spec.encode()?)))
        .await?;
    for text in [&spec.filter, &spec.path] {
        let bytes = Bytes::from(text.clone().unwrap_or_default().into_bytes());
        comm.broadcast_sized(ROOT, Some(bytes)).await?;
    }
    Ok(())
}

/// Worker side of `broadcast_query`.
pub async fn receive_query(comm: &dyn Communicator) -> Result<QuerySpec, QueryError> {
    let mut spec = QuerySpec::decode(&comm.broadcast_sized(ROOT, None).await?)?;
    spec.filter = receive_text(comm).await?;
    spec.path = receive_text(comm).await?;
    Ok(spec)
}

async fn receive_text(comm: &dyn Communicator) -> Result<Option<String>, QueryError> {
    let bytes = comm.broadcast_sized(ROOT, None).await?;
    if bytes.is_empty() {
        return Ok(None);
    }
    String::from_utf8(bytes.to_vec())
        .map(Some)
        .map_err(|e| ChannelError::Malformed(format!("broadcast string: {e}")).into())
}

/// Collects CLI-level choices and derives a consistent `QuerySpec`.
#[derive(Debug, Clone)]
pub struct QuerySpecBuilder {
    aggregation_keys: Vec<FieldSpec>,
    sort: Option<SortKey>,
    output_fields: Vec<FieldSpec>,
    filter: Option<String>,
    path: Option<String>,
    time_window: Option<TimeWindow>,
    record_limit: u64,
    fast_topn: bool,
    metadata_only: bool,
}

impl Default for QuerySpecBuilder {
    fn default() -> Self {
        Self {
            aggregation_keys: Vec::new(),
            sort: None,
            output_fields: Vec::new(),
            filter: None,
            path: None,
            time_window: None,
            record_limit: 0,
            fast_topn: true,
            metadata_only: false,
        }
    }
}

impl QuerySpecBuilder {
    pub fn aggregate_by(mut self, keys: Vec<FieldSpec>) -> Self {
        self.aggregation_keys = keys;
        self
    }

    pub fn sort_by(mut self, sort: SortKey) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn output(mut self, fields: Vec<FieldSpec>) -> Self {
        self.output_fields = fields;
        self
    }

    pub fn filter(mut self, source: impl Into<String>) -> Self {
        let source = source.into();
        self.filter = (!source.trim().is_empty()).then_some(source);
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.path = (!path.is_empty()).then_some(path);
        self
    }

    pub fn time_window(mut self, window: TimeWindow) -> Self {
        self.time_window = Some(window);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.record_limit = limit;
        self
    }

    pub fn fast_topn(mut self, enabled: bool) -> Self {
        self.fast_topn = enabled;
        self
    }

    pub fn metadata_only(mut self, enabled: bool) -> Self {
        self.metadata_only = enabled;
        self
    }

    pub fn build(self) -> Result<QuerySpec, QueryError> {
        if self.aggregation_keys.len() > MAX_AGGREGATION_KEYS {
            return Err(QueryError::Argument(format!(
                "at most {MAX_AGGREGATION_KEYS} aggregation keys are supported"
            )));
        }
        if self.output_fields.len() > MAX_OUTPUT_FIELDS {
            return Err(QueryError::Argument(format!(
                "at most {MAX_OUTPUT_FIELDS} output fields are supported"
            )));
        }
        for (i, key) in self.aggregation_keys.iter().enumerate() {
            if self.aggregation_keys[..i].iter().any(|k| k.field == key.field) {
                return Err(QueryError::Argument(format!(
                    "field {} used twice as aggregation key",
                    key.field
                )));
            }
        }
        if let Some(source) = &self.filter {
            Filter::compile(source).map_err(|e| QueryError::Argument(e.to_string()))?;
        }

        let mode = if self.metadata_only {
            WorkingMode::MetadataOnly
        } else if !self.aggregation_keys.is_empty() {
            WorkingMode::Aggregate
        } else if self.sort.is_some() {
            WorkingMode::Sort
        } else {
            WorkingMode::List
        };

        let mut sort = self.sort;
        if mode != WorkingMode::Aggregate {
            if let Some(sort) = sort.as_mut() {
                sort.agg = None;
            }
        }

        let output_fields = match mode {
            WorkingMode::Aggregate => {
                let requested: Vec<FieldSpec> = if self.output_fields.is_empty() {
                    DEFAULT_AGGREGATE_VALUES.iter().copied().map(FieldSpec::new).collect()
                } else {
                    self.output_fields
                };
                let mut values: Vec<FieldSpec> = Vec::with_capacity(requested.len());
                for spec in requested {
                    let is_key = self.aggregation_keys.iter().any(|k| k.field == spec.field);
                    let seen = values.iter().any(|v| v.field == spec.field);
                    if !is_key && !seen {
                        values.push(spec);
                    }
                }
                values
            }
            _ if self.output_fields.is_empty() => {
                DEFAULT_LIST_FIELDS.iter().copied().map(FieldSpec::new).collect()
            }
            _ => self.output_fields,
        };

        let use_fast_topn = self.fast_topn
            && mode == WorkingMode::Aggregate
            && self.record_limit > 0
            && sort.is_some_and(|s| {
                s.field.is_volume()
                    && s.direction == SortDirection::Desc
                    && s.agg_func() == AggFunc::Sum
            });

        Ok(QuerySpec {
            mode,
            aggregation_keys: self.aggregation_keys,
            sort,
            output_fields,
            time_window: self.time_window,
            record_limit: self.record_limit,
            use_fast_topn,
            filter: self.filter,
            path: self.path,
        })
    }
}
