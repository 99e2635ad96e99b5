use std::io;
use thiserror::Error;
use tracing::{debug, error};

use crate::engine::types::Field;

/// Errors reported by the flow-record engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Record codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("Invalid flow file: {0}")]
    InvalidFile(String),

    #[error("Truncated record at offset {offset}")]
    TruncatedRecord { offset: u64 },

    #[error("Record of {0} bytes exceeds the maximum entry size")]
    OversizedRecord(usize),

    #[error("Filter syntax error: {0}")]
    FilterSyntax(String),

    #[error("Field {field} cannot hold value {value}")]
    TypeMismatch { field: Field, value: String },

    #[error("Aggregation table layout mismatch: {0}")]
    LayoutMismatch(String),
}

impl EngineError {
    pub fn log_error(&self) {
        match self {
            EngineError::Io(e) => {
                error!(target: "engine::errors", "I/O error: {}", e);
                debug!(target: "engine::errors", "I/O error details: {:?}", e);
            }
            EngineError::Codec(e) => {
                error!(target: "engine::errors", "Record codec error: {}", e);
                debug!(target: "engine::errors", "Codec error details: {:?}", e);
            }
            other => error!(target: "engine::errors", "{}", other),
        }
    }
}
