use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Numeric field identifiers of a flow record. The discriminants are stable
/// and travel on the wire inside `QuerySpec`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u16)]
pub enum Field {
    First = 1,
    Last = 2,
    SrcAddr = 3,
    DstAddr = 4,
    SrcPort = 5,
    DstPort = 6,
    Proto = 7,
    TcpFlags = 8,
    Bytes = 9,
    Packets = 10,
    Flows = 11,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Timestamp,
    Address,
    Unsigned,
    Volume,
}

impl Field {
    pub const ALL: [Field; 11] = [
        Field::First,
        Field::Last,
        Field::SrcAddr,
        Field::DstAddr,
        Field::SrcPort,
        Field::DstPort,
        Field::Proto,
        Field::TcpFlags,
        Field::Bytes,
        Field::Packets,
        Field::Flows,
    ];

    pub fn id(self) -> u16 {
        self as u16
    }

    pub fn from_id(id: u16) -> Option<Field> {
        Field::ALL.iter().copied().find(|f| f.id() == id)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::First => "first",
            Field::Last => "last",
            Field::SrcAddr => "srcip",
            Field::DstAddr => "dstip",
            Field::SrcPort => "srcport",
            Field::DstPort => "dstport",
            Field::Proto => "proto",
            Field::TcpFlags => "tcpflags",
            Field::Bytes => "bytes",
            Field::Packets => "packets",
            Field::Flows => "flows",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Field::First | Field::Last => FieldKind::Timestamp,
            Field::SrcAddr | Field::DstAddr => FieldKind::Address,
            Field::SrcPort | Field::DstPort | Field::Proto | Field::TcpFlags => {
                FieldKind::Unsigned
            }
            Field::Bytes | Field::Packets | Field::Flows => FieldKind::Volume,
        }
    }

    /// Traffic-volume fields are the only sort keys eligible for the fast
    /// top-N algorithm, since their merge function is a sum.
    pub fn is_volume(&self) -> bool {
        self.kind() == FieldKind::Volume
    }

    pub fn is_address(&self) -> bool {
        self.kind() == FieldKind::Address
    }

    /// Merge function applied when two records with the same aggregation key meet.
    pub fn default_agg(&self) -> AggFunc {
        match self {
            Field::First => AggFunc::Min,
            Field::Last => AggFunc::Max,
            Field::TcpFlags => AggFunc::Or,
            Field::Bytes | Field::Packets | Field::Flows => AggFunc::Sum,
            Field::SrcAddr | Field::DstAddr | Field::SrcPort | Field::DstPort | Field::Proto => {
                AggFunc::Min
            }
        }
    }

    /// Upper bound for unsigned fields narrower than 64 bits.
    pub fn max_unsigned(&self) -> u64 {
        match self {
            Field::SrcPort | Field::DstPort => u16::MAX as u64,
            Field::Proto | Field::TcpFlags => u8::MAX as u64,
            _ => u64::MAX,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" | "start" => Ok(Field::First),
            "last" | "end" => Ok(Field::Last),
            "srcip" | "srcaddr" | "sa" => Ok(Field::SrcAddr),
            "dstip" | "dstaddr" | "da" => Ok(Field::DstAddr),
            "srcport" | "sp" => Ok(Field::SrcPort),
            "dstport" | "dp" => Ok(Field::DstPort),
            "proto" | "pr" => Ok(Field::Proto),
            "tcpflags" | "flags" => Ok(Field::TcpFlags),
            "bytes" | "byt" => Ok(Field::Bytes),
            "packets" | "pkt" => Ok(Field::Packets),
            "flows" | "fl" => Ok(Field::Flows),
            other => Err(format!("unknown field '{other}'")),
        }
    }
}

/// Per-field merge function used by the aggregation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggFunc {
    Min,
    Max,
    Sum,
    Or,
}

impl AggFunc {
    pub fn apply(self, current: FieldValue, incoming: FieldValue) -> FieldValue {
        match (self, current, incoming) {
            (AggFunc::Sum, FieldValue::Unsigned(a), FieldValue::Unsigned(b)) => {
                FieldValue::Unsigned(a.saturating_add(b))
            }
            (AggFunc::Or, FieldValue::Unsigned(a), FieldValue::Unsigned(b)) => {
                FieldValue::Unsigned(a | b)
            }
            (AggFunc::Min, a, b) => a.min(b),
            (AggFunc::Max, a, b) => a.max(b),
            // Sum/Or over addresses is meaningless; keep the first value seen.
            (_, a, _) => a,
        }
    }
}

impl FromStr for AggFunc {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "min" => Ok(AggFunc::Min),
            "max" => Ok(AggFunc::Max),
            "sum" => Ok(AggFunc::Sum),
            "or" => Ok(AggFunc::Or),
            other => Err(format!("unknown aggregation function '{other}'")),
        }
    }
}

/// Typed value of a single flow-record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FieldValue {
    Unsigned(u64),
    Addr(IpAddr),
}

impl FieldValue {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FieldValue::Unsigned(v) => Some(*v),
            FieldValue::Addr(_) => None,
        }
    }

    pub fn as_addr(&self) -> Option<IpAddr> {
        match self {
            FieldValue::Addr(a) => Some(*a),
            FieldValue::Unsigned(_) => None,
        }
    }

    /// Aligns an address to the given prefix lengths; other values pass through.
    pub fn masked(self, ipv4_prefix: u8, ipv6_prefix: u8) -> FieldValue {
        match self {
            FieldValue::Addr(addr) => FieldValue::Addr(mask_addr(addr, ipv4_prefix, ipv6_prefix)),
            other => other,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Unsigned(v) => write!(f, "{v}"),
            FieldValue::Addr(a) => write!(f, "{a}"),
        }
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::Unsigned(value)
    }
}

impl From<IpAddr> for FieldValue {
    fn from(value: IpAddr) -> Self {
        FieldValue::Addr(value)
    }
}

pub fn mask_addr(addr: IpAddr, ipv4_prefix: u8, ipv6_prefix: u8) -> IpAddr {
    match addr {
        IpAddr::V4(v4) => {
            let prefix = ipv4_prefix.min(32) as u32;
            let mask = if prefix == 0 {
                0
            } else {
                u32::MAX << (32 - prefix)
            };
            IpAddr::V4(Ipv4Addr::from(u32::from(v4) & mask))
        }
        IpAddr::V6(v6) => {
            let prefix = ipv6_prefix.min(128) as u32;
            let mask = if prefix == 0 {
                0
            } else {
                u128::MAX << (128 - prefix)
            };
            IpAddr::V6(Ipv6Addr::from(u128::from(v6) & mask))
        }
    }
}
