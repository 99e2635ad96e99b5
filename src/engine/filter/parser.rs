use std::net::IpAddr;

use crate::engine::errors::EngineError;
use crate::engine::filter::ast::{CompareOp, FilterNode, NumericTarget, Predicate, Side};
use crate::engine::record::{PROTO_ICMP, PROTO_TCP, PROTO_UDP};
use crate::engine::types::mask_addr;

peg::parser! {
    grammar filter_parser() for str {
        rule _() = quiet!{ [' ' | '\t' | '\n' | '\r']* }

        rule ci(s: &'static str)
            = kw:$(['a'..='z' | 'A'..='Z']+) {? if kw.eq_ignore_ascii_case(s) { Ok(()) } else { Err("keyword") } }

        pub rule filter() -> FilterNode
            = _ e:or_expr() _ { e }

        rule or_expr() -> FilterNode
            = x:and_expr() _ (ci("or") / "||") _ y:or_expr() {
                FilterNode::Or(Box::new(x), Box::new(y))
            }
            / and_expr()

        rule and_expr() -> FilterNode
            = x:unary() _ (ci("and") / "&&") _ y:and_expr() {
                FilterNode::And(Box::new(x), Box::new(y))
            }
            / unary()

        rule unary() -> FilterNode
            = (ci("not") / "!") _ x:unary() { FilterNode::Not(Box::new(x)) }
            / "(" _ e:or_expr() _ ")" { e }
            / p:predicate() { FilterNode::Leaf(p) }

        rule predicate() -> Predicate
            = ci("any") { Predicate::Any }
            / ci("proto") _ value:proto_value() {
                Predicate::Compare { target: NumericTarget::Proto, side: Side::Either, op: CompareOp::Eq, value }
            }
            / side:side() ci("port") _ op:cmp_op()? _ value:number() {
                Predicate::Compare { target: NumericTarget::Port, side, op: op.unwrap_or(CompareOp::Eq), value }
            }
            / side:side() ci("host") _ addr:ip() {
                let prefix = if addr.is_ipv4() { 32 } else { 128 };
                Predicate::Network { side, network: addr, prefix }
            }
            / side:side() ci("net") _ addr:ip() "/" prefix:prefix_len() {?
                let max = if addr.is_ipv4() { 32 } else { 128 };
                if prefix > max {
                    Err("prefix length")
                } else {
                    Ok(Predicate::Network { side, network: mask_addr(addr, prefix, prefix), prefix })
                }
            }
            / target:counter() _ op:cmp_op()? _ value:number() {
                Predicate::Compare { target, side: Side::Either, op: op.unwrap_or(CompareOp::Eq), value }
            }

        rule side() -> Side
            = ci("src") _ { Side::Src }
            / ci("dst") _ { Side::Dst }
            / { Side::Either }

        rule counter() -> NumericTarget
            = ci("bytes") { NumericTarget::Bytes }
            / ci("packets") { NumericTarget::Packets }
            / ci("flows") { NumericTarget::Flows }
            / ci("flags") { NumericTarget::TcpFlags }

        rule proto_value() -> u64
            = ci("tcp") { PROTO_TCP as u64 }
            / ci("udp") { PROTO_UDP as u64 }
            / ci("icmp") { PROTO_ICMP as u64 }
            / n:number() {? if n <= u8::MAX as u64 { Ok(n) } else { Err("protocol number") } }

        rule cmp_op() -> CompareOp
            = "!=" { CompareOp::Neq }
            / ">=" { CompareOp::Gte }
            / "<=" { CompareOp::Lte }
            / "==" { CompareOp::Eq }
            / "=" { CompareOp::Eq }
            / ">" { CompareOp::Gt }
            / "<" { CompareOp::Lt }
            / ci("eq") { CompareOp::Eq }
            / ci("gt") { CompareOp::Gt }
            / ci("lt") { CompareOp::Lt }

        rule number() -> u64
            = n:$(['0'..='9']+) {? n.parse::<u64>().or(Err("number")) }

        rule prefix_len() -> u8
            = n:$(['0'..='9']*<1,3>) {? n.parse::<u8>().or(Err("prefix length")) }

        rule ip() -> IpAddr
            = s:$(['0'..='9' | 'a'..='f' | 'A'..='F' | ':' | '.']+) {? s.parse::<IpAddr>().or(Err("ip address")) }
    }
}

pub fn parse_filter(input: &str) -> Result<FilterNode, EngineError> {
    if input.trim().is_empty() {
        return Ok(FilterNode::Leaf(Predicate::Any));
    }
    filter_parser::filter(input).map_err(|e| EngineError::FilterSyntax(format!("'{input}': {e}")))
}
