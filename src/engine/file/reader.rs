use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};

use crate::engine::errors::EngineError;
use crate::engine::file::FlowFile;
use crate::engine::file::metadata::FileMetadata;
use crate::engine::record::FlowRecord;
use crate::shared::storage_header::{HEADER_LEN, MagicFile};

/// Largest entry the reader accepts; anything bigger means a corrupt length.
pub const MAX_ENTRY_LEN: usize = 64 * 1024;

pub struct FlowFileReader {
    path: PathBuf,
    input: BufReader<File>,
    metadata: FileMetadata,
    offset: u64,
}

impl FlowFileReader {
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        let mut input = BufReader::new(File::open(path)?);
        FlowFile::read_header(&mut input)
            .map_err(|e| EngineError::InvalidFile(format!("{}: {e}", path.display())))?;
        let metadata = FileMetadata::read_from(&mut input)
            .map_err(|e| EngineError::InvalidFile(format!("{}: {e}", path.display())))?;
        Ok(Self {
            path: path.to_path_buf(),
            input,
            metadata,
            offset: (HEADER_LEN + FileMetadata::ENCODED_LEN) as u64,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    /// Reads the next serialized record into `buf`. Returns `false` at a clean
    /// end of file; a partial entry is reported as truncation.
    pub fn next_raw(&mut self, buf: &mut Vec<u8>) -> Result<bool, EngineError> {
        let mut len_bytes = [0u8; 4];
        let got = read_full(&mut self.input, &mut len_bytes)?;
        if got == 0 {
            return Ok(false);
        }
        if got < len_bytes.len() {
            return Err(EngineError::TruncatedRecord {
                offset: self.offset,
            });
        }

        let len = u32::from_le_bytes(len_bytes) as usize;
        if len > MAX_ENTRY_LEN {
            return Err(EngineError::OversizedRecord(len));
        }
        buf.clear();
        buf.resize(len, 0);
        if read_full(&mut self.input, buf)? < len {
            return Err(EngineError::TruncatedRecord {
                offset: self.offset,
            });
        }
        self.offset += 4 + len as u64;
        Ok(true)
    }

    pub fn next_record(&mut self, buf: &mut Vec<u8>) -> Result<Option<FlowRecord>, EngineError> {
        if !self.next_raw(buf)? {
            return Ok(None);
        }
        Ok(Some(FlowRecord::decode(buf)?))
    }
}

fn read_full<R: Read>(input: &mut R, buf: &mut [u8]) -> Result<usize, EngineError> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
