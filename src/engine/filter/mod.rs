pub mod ast;
pub mod parser;

pub use ast::{CompareOp, FilterNode, NumericTarget, Predicate, Side};

use crate::engine::errors::EngineError;
use crate::engine::record::FlowRecord;

/// A compiled filter together with the source text it was compiled from.
/// Only the source travels between nodes; each node compiles its own copy.
#[derive(Debug, Clone)]
pub struct Filter {
    source: String,
    root: FilterNode,
}

impl Filter {
    pub fn compile(source: &str) -> Result<Self, EngineError> {
        let root = parser::parse_filter(source)?;
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn match_all() -> Self {
        Self {
            source: String::new(),
            root: FilterNode::Leaf(Predicate::Any),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &FilterNode {
        &self.root
    }

    pub fn matches(&self, record: &FlowRecord) -> bool {
        self.root.eval(record)
    }
}
