use crate::{Dataset, RawRecord, RawRecords, RecordSource, StorageError};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use std::path::Path;

/// An in-memory dataset of individually zlib-compressed records.
///
/// Loading decompresses the gzip source once; each pass afterwards only
/// inflates single records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryDataset {
    name: String,
    records: Vec<Vec<u8>>,
}

impl MemoryDataset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: Vec::new(),
        }
    }

    pub fn from_compressed(name: impl Into<String>, records: Vec<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            records,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dataset = Dataset::new(path.as_ref());
        let mut memory = Self::new(dataset.label());
        for record in dataset.reader()? {
            memory.push(&record?.bytes)?;
        }
        Ok(memory)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn push(&mut self, bytes: &[u8]) -> Result<(), StorageError> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(bytes)
            .map_err(|err| StorageError::io(format!("compress record for {}", self.name), err))?;
        let compressed = encoder
            .finish()
            .map_err(|err| StorageError::io(format!("compress record for {}", self.name), err))?;
        self.records.push(compressed);
        Ok(())
    }

    pub fn push_compressed(&mut self, record: Vec<u8>) {
        self.records.push(record);
    }

    pub fn compressed(&self) -> &[Vec<u8>] {
        &self.records
    }

    pub fn into_compressed(self) -> Vec<Vec<u8>> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn inflate(&self, index: usize, compressed: &[u8]) -> Result<RawRecord, StorageError> {
        let mut bytes = Vec::new();
        ZlibDecoder::new(compressed)
            .read_to_end(&mut bytes)
            .map_err(|err| {
                StorageError::io(format!("{} record {}", self.name, index + 1), err)
            })?;
        Ok(RawRecord {
            line: index + 1,
            bytes,
        })
    }
}

impl RecordSource for MemoryDataset {
    fn label(&self) -> String {
        self.name.clone()
    }

    fn raw_records(&self) -> Result<RawRecords<'_>, StorageError> {
        Ok(Box::new(
            self.records
                .iter()
                .enumerate()
                .map(|(index, compressed)| self.inflate(index, compressed)),
        ))
    }

    fn has_records(&self) -> Result<bool, StorageError> {
        Ok(!self.records.is_empty())
    }

    fn job_count(&self) -> Result<usize, StorageError> {
        Ok(self.records.len())
    }
}
