use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};

use crate::engine::errors::EngineError;
use crate::engine::types::{Field, FieldValue};

pub const PROTO_ICMP: u8 = 1;
pub const PROTO_TCP: u8 = 6;
pub const PROTO_UDP: u8 = 17;
pub const PROTO_ICMPV6: u8 = 58;

/// One summarized network conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub first: u64,
    pub last: u64,
    pub src_addr: IpAddr,
    pub dst_addr: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub proto: u8,
    pub tcp_flags: u8,
    pub bytes: u64,
    pub packets: u64,
    pub flows: u64,
}

impl Default for FlowRecord {
    fn default() -> Self {
        Self {
            first: 0,
            last: 0,
            src_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            dst_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            src_port: 0,
            dst_port: 0,
            proto: 0,
            tcp_flags: 0,
            bytes: 0,
            packets: 0,
            flows: 0,
        }
    }
}

impl FlowRecord {
    pub fn get(&self, field: Field) -> FieldValue {
        match field {
            Field::First => FieldValue::Unsigned(self.first),
            Field::Last => FieldValue::Unsigned(self.last),
            Field::SrcAddr => FieldValue::Addr(self.src_addr),
            Field::DstAddr => FieldValue::Addr(self.dst_addr),
            Field::SrcPort => FieldValue::Unsigned(self.src_port as u64),
            Field::DstPort => FieldValue::Unsigned(self.dst_port as u64),
            Field::Proto => FieldValue::Unsigned(self.proto as u64),
            Field::TcpFlags => FieldValue::Unsigned(self.tcp_flags as u64),
            Field::Bytes => FieldValue::Unsigned(self.bytes),
            Field::Packets => FieldValue::Unsigned(self.packets),
            Field::Flows => FieldValue::Unsigned(self.flows),
        }
    }

    pub fn set(&mut self, field: Field, value: FieldValue) -> Result<(), EngineError> {
        let mismatch = || EngineError::TypeMismatch {
            field,
            value: value.to_string(),
        };

        if field.is_address() {
            let addr = value.as_addr().ok_or_else(mismatch)?;
            match field {
                Field::SrcAddr => self.src_addr = addr,
                _ => self.dst_addr = addr,
            }
            return Ok(());
        }

        let raw = value.as_u64().ok_or_else(mismatch)?;
        if raw > field.max_unsigned() {
            return Err(mismatch());
        }
        match field {
            Field::First => self.first = raw,
            Field::Last => self.last = raw,
            Field::SrcPort => self.src_port = raw as u16,
            Field::DstPort => self.dst_port = raw as u16,
            Field::Proto => self.proto = raw as u8,
            Field::TcpFlags => self.tcp_flags = raw as u8,
            Field::Bytes => self.bytes = raw,
            Field::Packets => self.packets = raw,
            Field::Flows => self.flows = raw,
            Field::SrcAddr | Field::DstAddr => unreachable!("address fields handled above"),
        }
        Ok(())
    }

    /// Serializes into `buf`, replacing its contents. The buffer is reused
    /// across records so steady-state encoding does not allocate.
    pub fn encode_into(&self, buf: &mut Vec<u8>) -> Result<(), EngineError> {
        buf.clear();
        bincode::serialize_into(&mut *buf, self)?;
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>, EngineError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, EngineError> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Protocol class used by the metadata summary.
    pub fn proto_class(&self) -> ProtoClass {
        ProtoClass::of(self.proto)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtoClass {
    Tcp = 0,
    Udp = 1,
    Icmp = 2,
    Other = 3,
}

impl ProtoClass {
    pub fn of(proto: u8) -> ProtoClass {
        match proto {
            PROTO_TCP => ProtoClass::Tcp,
            PROTO_UDP => ProtoClass::Udp,
            PROTO_ICMP | PROTO_ICMPV6 => ProtoClass::Icmp,
            _ => ProtoClass::Other,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}
