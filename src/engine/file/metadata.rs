use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::engine::record::{FlowRecord, ProtoClass};

/// flows/packets/bytes triple shared by file metadata and query statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficCounters {
    pub flows: u64,
    pub packets: u64,
    pub bytes: u64,
}

impl TrafficCounters {
    pub fn account(&mut self, record: &FlowRecord) {
        self.flows = self.flows.saturating_add(record.flows);
        self.packets = self.packets.saturating_add(record.packets);
        self.bytes = self.bytes.saturating_add(record.bytes);
    }

    pub fn add(&mut self, other: &TrafficCounters) {
        self.flows = self.flows.saturating_add(other.flows);
        self.packets = self.packets.saturating_add(other.packets);
        self.bytes = self.bytes.saturating_add(other.bytes);
    }

    pub fn is_empty(&self) -> bool {
        self.flows == 0 && self.packets == 0 && self.bytes == 0
    }
}

/// Fixed-size per-file statistics block stored right after the file header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Indexed by `ProtoClass`: tcp, udp, icmp, other.
    pub by_proto: [TrafficCounters; 4],
}

impl FileMetadata {
    pub const ENCODED_LEN: usize = 4 * 3 * 8;

    pub fn account(&mut self, record: &FlowRecord) {
        self.by_proto[record.proto_class().index()].account(record);
    }

    pub fn add(&mut self, other: &FileMetadata) {
        for (counters, incoming) in self.by_proto.iter_mut().zip(&other.by_proto) {
            counters.add(incoming);
        }
    }

    pub fn proto(&self, class: ProtoClass) -> &TrafficCounters {
        &self.by_proto[class.index()]
    }

    pub fn total(&self) -> TrafficCounters {
        let mut total = TrafficCounters::default();
        for counters in &self.by_proto {
            total.add(counters);
        }
        total
    }

    pub fn write_to<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        for counters in &self.by_proto {
            w.write_all(&counters.flows.to_le_bytes())?;
            w.write_all(&counters.packets.to_le_bytes())?;
            w.write_all(&counters.bytes.to_le_bytes())?;
        }
        Ok(())
    }

    pub fn read_from<R: Read>(mut r: R) -> std::io::Result<Self> {
        let mut meta = FileMetadata::default();
        let mut word = [0u8; 8];
        for counters in meta.by_proto.iter_mut() {
            r.read_exact(&mut word)?;
            counters.flows = u64::from_le_bytes(word);
            r.read_exact(&mut word)?;
            counters.packets = u64::from_le_bytes(word);
            r.read_exact(&mut word)?;
            counters.bytes = u64::from_le_bytes(word);
        }
        Ok(meta)
    }
}
