use std::net::IpAddr;

use crate::engine::record::FlowRecord;
use crate::engine::types::mask_addr;

/// Compiled filter tree. Operator nodes own their children; leaves carry a
/// single predicate over one record.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    And(Box<FilterNode>, Box<FilterNode>),
    Or(Box<FilterNode>, Box<FilterNode>),
    Not(Box<FilterNode>),
    Leaf(Predicate),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Src,
    Dst,
    Either,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericTarget {
    Port,
    Proto,
    TcpFlags,
    Bytes,
    Packets,
    Flows,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    pub fn eval(self, lhs: u64, rhs: u64) -> bool {
        match self {
            CompareOp::Eq => lhs == rhs,
            CompareOp::Neq => lhs != rhs,
            CompareOp::Lt => lhs < rhs,
            CompareOp::Lte => lhs <= rhs,
            CompareOp::Gt => lhs > rhs,
            CompareOp::Gte => lhs >= rhs,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Any,
    Compare {
        target: NumericTarget,
        side: Side,
        op: CompareOp,
        value: u64,
    },
    /// `host` is a network with a full-length prefix.
    Network {
        side: Side,
        network: IpAddr,
        prefix: u8,
    },
}

impl FilterNode {
    pub fn eval(&self, record: &FlowRecord) -> bool {
        match self {
            FilterNode::And(a, b) => a.eval(record) && b.eval(record),
            FilterNode::Or(a, b) => a.eval(record) || b.eval(record),
            FilterNode::Not(inner) => !inner.eval(record),
            FilterNode::Leaf(predicate) => predicate.eval(record),
        }
    }
}

impl Predicate {
    pub fn eval(&self, record: &FlowRecord) -> bool {
        match self {
            Predicate::Any => true,
            Predicate::Compare {
                target,
                side,
                op,
                value,
            } => match target {
                NumericTarget::Port => match side {
                    Side::Src => op.eval(record.src_port as u64, *value),
                    Side::Dst => op.eval(record.dst_port as u64, *value),
                    Side::Either => {
                        op.eval(record.src_port as u64, *value)
                            || op.eval(record.dst_port as u64, *value)
                    }
                },
                NumericTarget::Proto => op.eval(record.proto as u64, *value),
                NumericTarget::TcpFlags => op.eval(record.tcp_flags as u64, *value),
                NumericTarget::Bytes => op.eval(record.bytes, *value),
                NumericTarget::Packets => op.eval(record.packets, *value),
                NumericTarget::Flows => op.eval(record.flows, *value),
            },
            Predicate::Network {
                side,
                network,
                prefix,
            } => {
                let hit = |addr: IpAddr| {
                    addr.is_ipv4() == network.is_ipv4()
                        && mask_addr(addr, *prefix, *prefix) == *network
                };
                match side {
                    Side::Src => hit(record.src_addr),
                    Side::Dst => hit(record.dst_addr),
                    Side::Either => hit(record.src_addr) || hit(record.dst_addr),
                }
            }
        }
    }
}
