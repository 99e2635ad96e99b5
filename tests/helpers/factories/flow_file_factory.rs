use crate::engine::file::{FileMetadata, FlowFileWriter};
use crate::engine::record::FlowRecord;
use std::path::{Path, PathBuf};

/// Writes flow files into a test directory.
pub struct FlowFileFactory {
    dir: PathBuf,
    name: String,
    records: Vec<FlowRecord>,
}

impl FlowFileFactory {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            name: "flows.fdf".to_string(),
            records: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_records(mut self, records: Vec<FlowRecord>) -> Self {
        self.records = records;
        self
    }

    pub fn with_record(mut self, record: FlowRecord) -> Self {
        self.records.push(record);
        self
    }

    pub fn create(self) -> PathBuf {
        self.create_with_metadata().0
    }

    pub fn create_with_metadata(self) -> (PathBuf, FileMetadata) {
        let path = self.dir.join(&self.name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let mut writer = FlowFileWriter::create(&path).unwrap();
        for record in &self.records {
            writer.append(record).unwrap();
        }
        let metadata = writer.finish().unwrap();
        (path, metadata)
    }
}
