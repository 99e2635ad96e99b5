use std::io::{self, Write};

use crate::engine::file::{FileMetadata, TrafficCounters};
use crate::engine::record::{FlowRecord, ProtoClass};
use crate::engine::table::FieldSpec;
use crate::shared::output::render::{RecordPrinter, column_name, format_value};

/// Tab-separated columns with a header line.
pub struct TextPrinter<W: Write + Send> {
    out: W,
    fields: Vec<FieldSpec>,
    line: String,
}

impl<W: Write + Send> TextPrinter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            fields: Vec::new(),
            line: String::with_capacity(256),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> RecordPrinter for TextPrinter<W> {
    fn begin(&mut self, fields: &[FieldSpec]) -> io::Result<()> {
        self.fields = fields.to_vec();
        let header: Vec<String> = fields.iter().map(column_name).collect();
        writeln!(self.out, "{}", header.join("\t"))
    }

    fn print_record(&mut self, record: &FlowRecord) -> io::Result<()> {
        self.line.clear();
        for (i, spec) in self.fields.iter().enumerate() {
            if i > 0 {
                self.line.push('\t');
            }
            self.line
                .push_str(&format_value(spec.field, spec.extract(record)));
        }
        writeln!(self.out, "{}", self.line)
    }

    fn print_summary(&mut self, processed: &TrafficCounters, metadata: &FileMetadata) -> io::Result<()> {
        writeln!(
            self.out,
            "Summary: flows: {}, packets: {}, bytes: {}",
            processed.flows, processed.packets, processed.bytes
        )?;
        let total = metadata.total();
        writeln!(
            self.out,
            "Files: flows: {}, packets: {}, bytes: {}",
            total.flows, total.packets, total.bytes
        )?;
        for (name, class) in [
            ("tcp", ProtoClass::Tcp),
            ("udp", ProtoClass::Udp),
            ("icmp", ProtoClass::Icmp),
            ("other", ProtoClass::Other),
        ] {
            let c = metadata.proto(class);
            writeln!(
                self.out,
                "  {name}: flows: {}, packets: {}, bytes: {}",
                c.flows, c.packets, c.bytes
            )?;
        }
        self.out.flush()
    }
}
