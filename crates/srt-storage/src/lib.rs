mod dataset;
mod memory;

pub use dataset::{AtomicDatasetWriter, Dataset, DatasetReader, DatasetWriter, RawRecord};
pub use memory::MemoryDataset;

use srt_core::{Job, RecordError};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Extension of a gzip newline-delimited JSON dataset.
pub const DATASET_EXTENSION: &str = ".jl.gz";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("dataset unavailable at {}: {source}", path.display())]
    DatasetUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("corrupted tail in {} after {records_read} complete records", path.display())]
    CorruptedTail { path: PathBuf, records_read: usize },
    #[error("{dataset} line {line}: {source}")]
    Record {
        dataset: String,
        line: usize,
        #[source]
        source: RecordError,
    },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

pub type RawRecords<'a> = Box<dyn Iterator<Item = Result<RawRecord, StorageError>> + 'a>;
pub type Jobs<'a> = Box<dyn Iterator<Item = Result<Job, StorageError>> + 'a>;

/// A restartable, finite sequence of serialized records. Every call to
/// [`RecordSource::raw_records`] starts a fresh pass from the first record.
pub trait RecordSource {
    /// Human-readable name used in errors and logs.
    fn label(&self) -> String;

    fn raw_records(&self) -> Result<RawRecords<'_>, StorageError>;

    fn jobs(&self) -> Result<Jobs<'_>, StorageError> {
        let label = self.label();
        let records = self.raw_records()?;
        Ok(Box::new(records.map(move |record| {
            let record = record?;
            record.to_job(&label)
        })))
    }

    fn has_records(&self) -> Result<bool, StorageError> {
        Ok(self.raw_records()?.next().transpose()?.is_some())
    }

    fn job_count(&self) -> Result<usize, StorageError> {
        let mut count = 0;
        for record in self.raw_records()? {
            record?;
            count += 1;
        }
        Ok(count)
    }
}

/// `data/salmon.jl.gz` -> `data/salmon`: the directory holding the
/// dataset's derived partitions.
pub fn partition_root(dataset: &Path) -> PathBuf {
    let text = dataset.to_string_lossy();
    match text.strip_suffix(DATASET_EXTENSION) {
        Some(stem) => PathBuf::from(stem),
        None => dataset.with_extension(""),
    }
}

/// Matched and unmatched output files of one filter against a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPaths {
    pub matched: PathBuf,
    pub unmatched: PathBuf,
}

impl PartitionPaths {
    pub fn new(dataset: &Path, family: &str, key: &str) -> Self {
        let root = partition_root(dataset);
        let file = format!("{key}{DATASET_EXTENSION}");
        Self {
            matched: root.join(family).join(&file),
            unmatched: root.join(format!("not{family}")).join(file),
        }
    }

    pub fn both_exist(&self) -> bool {
        self.matched.is_file() && self.unmatched.is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_paths_follow_dataset_stem() {
        let paths = PartitionPaths::new(Path::new("data/salmon.jl.gz"), "stages", "shaketobaor");
        assert_eq!(
            paths.matched,
            PathBuf::from("data/salmon/stages/shaketobaor.jl.gz")
        );
        assert_eq!(
            paths.unmatched,
            PathBuf::from("data/salmon/notstages/shaketobaor.jl.gz")
        );
        assert_eq!(
            partition_root(Path::new("data/salmon/stages/a.jl.gz")),
            PathBuf::from("data/salmon/stages/a")
        );
        assert_eq!(partition_root(Path::new("dump.json")), PathBuf::from("dump"));
    }
}
