use std::io;

use crate::engine::file::{FileMetadata, TrafficCounters};
use crate::engine::record::FlowRecord;
use crate::engine::table::FieldSpec;
use crate::shared::output::render::RecordPrinter;

/// Keeps results in memory; used by embedders and tests.
#[derive(Debug, Default, Clone)]
pub struct CollectingPrinter {
    pub fields: Vec<FieldSpec>,
    pub records: Vec<FlowRecord>,
    pub summary: Option<(TrafficCounters, FileMetadata)>,
}

impl CollectingPrinter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordPrinter for CollectingPrinter {
    fn begin(&mut self, fields: &[FieldSpec]) -> io::Result<()> {
        self.fields = fields.to_vec();
        Ok(())
    }

    fn print_record(&mut self, record: &FlowRecord) -> io::Result<()> {
        self.records.push(record.clone());
        Ok(())
    }

    fn print_summary(&mut self, processed: &TrafficCounters, metadata: &FileMetadata) -> io::Result<()> {
        self.summary = Some((*processed, *metadata));
        Ok(())
    }
}
