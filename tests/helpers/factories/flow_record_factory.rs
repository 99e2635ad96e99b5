use crate::engine::record::{FlowRecord, PROTO_TCP};
use rand::Rng;
use std::net::IpAddr;

pub struct FlowRecordFactory {
    record: FlowRecord,
}

impl FlowRecordFactory {
    pub fn new() -> Self {
        Self {
            record: FlowRecord {
                first: 1_000,
                last: 2_000,
                src_addr: "10.0.0.1".parse().unwrap(),
                dst_addr: "10.0.0.2".parse().unwrap(),
                src_port: 1024,
                dst_port: 80,
                proto: PROTO_TCP,
                tcp_flags: 0,
                bytes: 100,
                packets: 1,
                flows: 1,
            },
        }
    }

    pub fn with_src(mut self, addr: &str) -> Self {
        self.record.src_addr = addr.parse::<IpAddr>().unwrap();
        self
    }

    pub fn with_dst(mut self, addr: &str) -> Self {
        self.record.dst_addr = addr.parse::<IpAddr>().unwrap();
        self
    }

    pub fn with_ports(mut self, src: u16, dst: u16) -> Self {
        self.record.src_port = src;
        self.record.dst_port = dst;
        self
    }

    pub fn with_proto(mut self, proto: u8) -> Self {
        self.record.proto = proto;
        self
    }

    pub fn with_bytes(mut self, bytes: u64) -> Self {
        self.record.bytes = bytes;
        self
    }

    pub fn with_packets(mut self, packets: u64) -> Self {
        self.record.packets = packets;
        self
    }

    pub fn with_flows(mut self, flows: u64) -> Self {
        self.record.flows = flows;
        self
    }

    pub fn with_times(mut self, first: u64, last: u64) -> Self {
        self.record.first = first;
        self.record.last = last;
        self
    }

    pub fn create(self) -> FlowRecord {
        self.record
    }

    /// Records with distinct source addresses 10.1.x.y and random volumes.
    pub fn create_list(self, count: usize) -> Vec<FlowRecord> {
        let mut rng = rand::thread_rng();
        (0..count)
            .map(|i| {
                let mut record = self.record.clone();
                record.src_addr = IpAddr::from([10, 1, (i / 256) as u8, (i % 256) as u8]);
                record.bytes = rng.gen_range(1..10_000);
                record.packets = rng.gen_range(1..100);
                record
            })
            .collect()
    }
}

impl Default for FlowRecordFactory {
    fn default() -> Self {
        Self::new()
    }
}
