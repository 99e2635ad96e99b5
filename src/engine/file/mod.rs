pub mod metadata;
pub mod reader;
pub mod writer;

pub use metadata::{FileMetadata, TrafficCounters};
pub use reader::FlowFileReader;
pub use writer::FlowFileWriter;

use crate::shared::storage_header::MagicFile;

/// Marker for the on-disk flow file format.
pub struct FlowFile;

impl MagicFile for FlowFile {
    const MAGIC: [u8; 8] = *b"FDFLOW1\0";
}

#[cfg(test)]
mod file_test;
