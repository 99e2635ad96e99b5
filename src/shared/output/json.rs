use std::io::{self, Write};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::engine::file::{FileMetadata, TrafficCounters};
use crate::engine::record::FlowRecord;
use crate::engine::table::FieldSpec;
use crate::engine::types::{Field, FieldKind, FieldValue};
use crate::shared::output::render::{RecordPrinter, column_name, format_value};

#[derive(Serialize)]
struct SchemaFrame<'a> {
    #[serde(rename = "type")]
    frame_type: &'static str,
    columns: &'a [String],
}

#[derive(Serialize)]
struct RowFrame<'a> {
    #[serde(rename = "type")]
    frame_type: &'static str,
    values: &'a Map<String, Value>,
}

#[derive(Serialize)]
struct SummaryFrame<'a> {
    #[serde(rename = "type")]
    frame_type: &'static str,
    row_count: u64,
    processed: &'a TrafficCounters,
    metadata: MetadataView<'a>,
}

#[derive(Serialize)]
struct MetadataView<'a> {
    tcp: &'a TrafficCounters,
    udp: &'a TrafficCounters,
    icmp: &'a TrafficCounters,
    other: &'a TrafficCounters,
}

/// One JSON object per line: a schema frame, row frames, then a summary frame.
pub struct JsonLinesPrinter<W: Write + Send> {
    out: W,
    fields: Vec<FieldSpec>,
    columns: Vec<String>,
    row: Map<String, Value>,
    rows: u64,
}

impl<W: Write + Send> JsonLinesPrinter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            fields: Vec::new(),
            columns: Vec::new(),
            row: Map::new(),
            rows: 0,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

}

fn write_frame<W: Write, T: Serialize>(out: &mut W, frame: &T) -> io::Result<()> {
    serde_json::to_writer(&mut *out, frame)?;
    out.write_all(b"\n")
}

fn json_value(field: Field, value: FieldValue) -> Value {
    match (field.kind(), value) {
        (FieldKind::Volume, FieldValue::Unsigned(n)) => Value::from(n),
        (_, FieldValue::Unsigned(n)) if matches!(field, Field::SrcPort | Field::DstPort) => {
            Value::from(n)
        }
        _ => Value::from(format_value(field, value)),
    }
}

impl<W: Write + Send> RecordPrinter for JsonLinesPrinter<W> {
    fn begin(&mut self, fields: &[FieldSpec]) -> io::Result<()> {
        self.fields = fields.to_vec();
        self.columns = fields.iter().map(column_name).collect();
        write_frame(
            &mut self.out,
            &SchemaFrame {
                frame_type: "schema",
                columns: &self.columns,
            },
        )
    }

    fn print_record(&mut self, record: &FlowRecord) -> io::Result<()> {
        self.row.clear();
        for (spec, name) in self.fields.iter().zip(&self.columns) {
            self.row
                .insert(name.clone(), json_value(spec.field, spec.extract(record)));
        }
        self.rows += 1;
        write_frame(
            &mut self.out,
            &RowFrame {
                frame_type: "row",
                values: &self.row,
            },
        )
    }

    fn print_summary(&mut self, processed: &TrafficCounters, metadata: &FileMetadata) -> io::Result<()> {
        let frame = SummaryFrame {
            frame_type: "summary",
            row_count: self.rows,
            processed,
            metadata: MetadataView {
                tcp: &metadata.by_proto[0],
                udp: &metadata.by_proto[1],
                icmp: &metadata.by_proto[2],
                other: &metadata.by_proto[3],
            },
        };
        write_frame(&mut self.out, &frame)?;
        self.out.flush()
    }
}
