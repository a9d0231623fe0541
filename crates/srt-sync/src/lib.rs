mod client;

pub use client::StatInkClient;

use serde_json::value::RawValue;
use srt_core::{record_id, RecordError};
use srt_storage::{AtomicDatasetWriter, Dataset, RecordSource, StorageError};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_BASE_URL: &str = "https://stat.ink";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("remote record rejected: {0}")]
    Record(#[from] RecordError),
    #[error("network fetch failed: {0}")]
    NetworkFetch(String),
    #[error("invalid sync configuration: {0}")]
    InvalidConfig(String),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

/// Which stat.ink job feed a dataset mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FeedMode {
    /// Every user's jobs.
    #[default]
    All,
    /// The API key owner's jobs; needs a bearer token.
    User,
}

impl FeedMode {
    pub fn endpoint(&self) -> &'static str {
        match self {
            FeedMode::All => "/api/v2/salmon",
            FeedMode::User => "/api/v2/user-salmon",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            FeedMode::All => "salmonAll.jl.gz",
            FeedMode::User => "salmon.jl.gz",
        }
    }
}

impl fmt::Display for FeedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedMode::All => f.write_str("all"),
            FeedMode::User => f.write_str("user"),
        }
    }
}

impl FromStr for FeedMode {
    type Err = SyncError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "all" => Ok(FeedMode::All),
            "user" => Ok(FeedMode::User),
            other => Err(SyncError::InvalidConfig(format!("unknown feed `{other}`"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub mode: FeedMode,
    pub base_url: String,
    pub api_key: Option<String>,
    pub data_dir: PathBuf,
    /// Remove the dataset's derived partitions once new records land.
    pub clear_partitions: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mode: FeedMode::All,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            data_dir: PathBuf::from("data"),
            clear_partitions: true,
        }
    }
}

impl SyncConfig {
    pub fn dataset_path(&self) -> PathBuf {
        self.data_dir.join(self.mode.file_name())
    }
}

/// A paginated, ascending-by-id feed of serialized job records.
pub trait RemoteSource {
    /// Records with an id above `newer_than` (all records when `None`),
    /// oldest first, exactly as served.
    fn fetch_page(&self, newer_than: Option<u64>) -> Result<Vec<Box<RawValue>>, SyncError>;
}

impl<R: RemoteSource + ?Sized> RemoteSource for &R {
    fn fetch_page(&self, newer_than: Option<u64>) -> Result<Vec<Box<RawValue>>, SyncError> {
        (**self).fetch_page(newer_than)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub existing_records: usize,
    pub appended_records: usize,
    pub skipped_duplicates: usize,
    pub pages_fetched: usize,
    pub recovered_corrupted_tail: bool,
    pub rewritten: bool,
    pub partitions_cleared: bool,
    pub last_id: Option<u64>,
}

/// Brings an on-disk dataset up to date with a remote feed.
///
/// The new file is assembled beside the old one and swapped in only after
/// paging reaches its fixed point, so any failure leaves the previous file
/// as it was.
pub struct Syncer<R> {
    remote: R,
    config: SyncConfig,
}

impl<R: RemoteSource> Syncer<R> {
    pub fn new(remote: R, config: SyncConfig) -> Self {
        Self { remote, config }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn sync(&self) -> Result<SyncReport, SyncError> {
        let dataset = Dataset::new(self.config.dataset_path());
        let existed = dataset.exists();
        let mut writer = AtomicDatasetWriter::create(dataset.path())?;
        let mut report = SyncReport::default();

        let altered = if existed {
            self.copy_existing(&dataset, &mut writer, &mut report)?
        } else {
            false
        };
        info!(
            event = "sync_start",
            mode = %self.config.mode,
            path = %dataset.path().display(),
            existing = report.existing_records,
            last_id = ?report.last_id
        );

        loop {
            let page = self.remote.fetch_page(report.last_id)?;
            report.pages_fetched += 1;
            let before = report.last_id;
            for raw in &page {
                let bytes = raw.get().as_bytes();
                let id = record_id(bytes)?;
                if report.last_id.is_some_and(|last| id <= last) {
                    report.skipped_duplicates += 1;
                    continue;
                }
                writer.write_record(bytes)?;
                report.last_id = Some(id);
                report.appended_records += 1;
            }
            debug!(
                event = "sync_page",
                page = report.pages_fetched,
                records = page.len(),
                last_id = ?report.last_id
            );
            if report.last_id == before {
                break;
            }
        }

        if existed && !altered && report.appended_records == 0 {
            info!(event = "sync_unchanged", path = %dataset.path().display());
            return Ok(report);
        }

        writer.commit()?;
        report.rewritten = true;
        if report.appended_records > 0 && self.config.clear_partitions {
            report.partitions_cleared = clear_partitions(&dataset)?;
        }
        info!(
            event = "sync_complete",
            path = %dataset.path().display(),
            appended = report.appended_records,
            pages = report.pages_fetched,
            last_id = ?report.last_id,
            recovered_tail = report.recovered_corrupted_tail
        );
        Ok(report)
    }

    /// Copy the readable prefix of the current file, keeping ids strictly
    /// increasing. A truncated tail is dropped and fetched again. Returns
    /// whether the copy differs from the file.
    fn copy_existing(
        &self,
        dataset: &Dataset,
        writer: &mut AtomicDatasetWriter,
        report: &mut SyncReport,
    ) -> Result<bool, SyncError> {
        let label = dataset.label();
        let mut altered = false;
        for record in dataset.reader()? {
            let record = match record {
                Ok(record) => record,
                Err(StorageError::CorruptedTail { records_read, .. }) => {
                    warn!(
                        event = "sync_corrupted_tail",
                        path = %dataset.path().display(),
                        records_read,
                        resume_after = ?report.last_id
                    );
                    report.recovered_corrupted_tail = true;
                    altered = true;
                    break;
                }
                Err(err) => return Err(err.into()),
            };
            let id = record.id(&label)?;
            if report.last_id.is_some_and(|last| id <= last) {
                report.skipped_duplicates += 1;
                altered = true;
                continue;
            }
            writer.write_record(&record.bytes)?;
            report.last_id = Some(id);
            report.existing_records += 1;
        }
        Ok(altered)
    }
}

/// Derived partitions are stale once the source changes.
fn clear_partitions(dataset: &Dataset) -> Result<bool, SyncError> {
    let root = dataset.partition_root();
    if !root.is_dir() {
        return Ok(false);
    }
    fs::remove_dir_all(&root).map_err(|source| SyncError::Io {
        context: format!("remove partitions {}", root.display()),
        source,
    })?;
    debug!(event = "sync_partitions_cleared", path = %root.display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_modes_map_to_endpoints_and_files() {
        assert_eq!("USER".parse::<FeedMode>().expect("mode"), FeedMode::User);
        assert!("both".parse::<FeedMode>().is_err());
        assert_eq!(FeedMode::All.endpoint(), "/api/v2/salmon");
        assert_eq!(FeedMode::User.endpoint(), "/api/v2/user-salmon");

        let config = SyncConfig {
            data_dir: PathBuf::from("/tmp/srt"),
            mode: FeedMode::User,
            ..SyncConfig::default()
        };
        assert_eq!(config.dataset_path(), PathBuf::from("/tmp/srt/salmon.jl.gz"));
    }
}
