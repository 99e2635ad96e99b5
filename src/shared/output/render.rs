use std::io;

use chrono::DateTime;
use serde::Deserialize;

use crate::engine::file::{FileMetadata, TrafficCounters};
use crate::engine::record::{FlowRecord, PROTO_ICMP, PROTO_ICMPV6, PROTO_TCP, PROTO_UDP};
use crate::engine::table::FieldSpec;
use crate::engine::types::{Field, FieldValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format '{other}'")),
        }
    }
}

/// Sink for query results on the coordinator.
pub trait RecordPrinter: Send {
    /// Called once before any record with the columns to print.
    fn begin(&mut self, fields: &[FieldSpec]) -> io::Result<()>;

    fn print_record(&mut self, record: &FlowRecord) -> io::Result<()>;

    fn print_summary(&mut self, processed: &TrafficCounters, metadata: &FileMetadata) -> io::Result<()>;
}

pub fn format_value(field: Field, value: FieldValue) -> String {
    match (field, value) {
        (Field::First | Field::Last, FieldValue::Unsigned(ms)) => format_timestamp(ms),
        (Field::Proto, FieldValue::Unsigned(proto)) => format_proto(proto),
        (Field::TcpFlags, FieldValue::Unsigned(flags)) => format_tcp_flags(flags as u8),
        (_, value) => value.to_string(),
    }
}

pub fn format_timestamp(ms: u64) -> String {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| ms.to_string())
}

pub fn format_proto(proto: u64) -> String {
    match u8::try_from(proto) {
        Ok(PROTO_TCP) => "TCP".to_string(),
        Ok(PROTO_UDP) => "UDP".to_string(),
        Ok(PROTO_ICMP) => "ICMP".to_string(),
        Ok(PROTO_ICMPV6) => "ICMP6".to_string(),
        _ => proto.to_string(),
    }
}

/// nfdump-style flag string, most significant flag first: `UAPRSF`.
pub fn format_tcp_flags(flags: u8) -> String {
    const NAMES: [(u8, char); 6] = [
        (0x20, 'U'),
        (0x10, 'A'),
        (0x08, 'P'),
        (0x04, 'R'),
        (0x02, 'S'),
        (0x01, 'F'),
    ];
    NAMES
        .iter()
        .map(|(bit, name)| if flags & bit != 0 { *name } else { '.' })
        .collect()
}

pub fn column_name(spec: &FieldSpec) -> String {
    if spec.field.is_address() && (spec.ipv4_prefix < 32 || spec.ipv6_prefix < 128) {
        format!("{}/{}/{}", spec.field, spec.ipv4_prefix, spec.ipv6_prefix)
    } else {
        spec.field.to_string()
    }
}
