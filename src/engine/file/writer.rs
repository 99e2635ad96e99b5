use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::debug;

use crate::engine::errors::EngineError;
use crate::engine::file::FlowFile;
use crate::engine::file::metadata::FileMetadata;
use crate::engine::record::FlowRecord;
use crate::shared::storage_header::{HEADER_LEN, MagicFile};

/// Appends records to a new flow file. Metadata is written as zeros up
/// front and patched in place by `finish`.
pub struct FlowFileWriter {
    out: BufWriter<File>,
    metadata: FileMetadata,
    scratch: Vec<u8>,
    records: u64,
}

impl FlowFileWriter {
    pub fn create(path: &Path) -> Result<Self, EngineError> {
        let mut out = BufWriter::new(File::create(path)?);
        FlowFile::write_header(&mut out)?;
        FileMetadata::default().write_to(&mut out)?;
        Ok(Self {
            out,
            metadata: FileMetadata::default(),
            scratch: Vec::with_capacity(128),
            records: 0,
        })
    }

    pub fn append(&mut self, record: &FlowRecord) -> Result<(), EngineError> {
        record.encode_into(&mut self.scratch)?;
        let len = u32::try_from(self.scratch.len())
            .map_err(|_| EngineError::OversizedRecord(self.scratch.len()))?;
        self.out.write_all(&len.to_le_bytes())?;
        self.out.write_all(&self.scratch)?;
        self.metadata.account(record);
        self.records += 1;
        Ok(())
    }

    pub fn finish(self) -> Result<FileMetadata, EngineError> {
        let mut file = self.out.into_inner().map_err(|e| e.into_error())?;
        file.seek(SeekFrom::Start(HEADER_LEN as u64))?;
        self.metadata.write_to(&mut file)?;
        file.sync_all()?;
        debug!(target: "engine::file::writer", records = self.records, "Flow file finished");
        Ok(self.metadata)
    }
}
