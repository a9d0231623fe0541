use srt_filters::{Filter, JobPredicate};
use srt_storage::{
    AtomicDatasetWriter, Dataset, MemoryDataset, PartitionPaths, RawRecord, RecordSource,
    StorageError,
};
use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PartitionError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone)]
pub struct PartitionConfig {
    /// Return existing outputs for a key instead of recomputing them.
    pub reuse_existing: bool,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            reuse_existing: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionOutcome {
    /// Outputs for this key already existed; the source was not read.
    Reused,
    Computed { matched: usize, unmatched: usize },
}

impl PartitionOutcome {
    pub fn is_reused(&self) -> bool {
        matches!(self, PartitionOutcome::Reused)
    }
}

/// Matched/unmatched dataset files of one durable partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurablePartition {
    pub matched: Dataset,
    pub unmatched: Dataset,
    pub outcome: PartitionOutcome,
}

/// Matched/unmatched in-memory datasets of one ephemeral partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryPartition {
    pub matched: Arc<MemoryDataset>,
    pub unmatched: Arc<MemoryDataset>,
    pub outcome: PartitionOutcome,
}

/// Splits datasets into matched and unmatched halves.
///
/// Outputs are memoized by output key, never by predicate content: callers
/// must use a distinct key for every distinct predicate.
pub struct PartitionEngine {
    config: PartitionConfig,
    memory_cache: HashMap<String, (Arc<MemoryDataset>, Arc<MemoryDataset>)>,
}

impl PartitionEngine {
    pub fn new(config: PartitionConfig) -> Self {
        Self {
            config,
            memory_cache: HashMap::new(),
        }
    }

    pub fn partition(
        &self,
        source: &Dataset,
        filter: &Filter,
    ) -> Result<DurablePartition, PartitionError> {
        self.partition_with(source, filter.family().dir_name(), filter.key(), filter)
    }

    /// Durable mode: writes `<source stem>/<family>/<key>.jl.gz` and
    /// `<source stem>/not<family>/<key>.jl.gz`.
    ///
    /// Both files are staged as temp files and only renamed into place once
    /// the whole source has been routed, so an unreadable source or a
    /// malformed record leaves no new output behind.
    pub fn partition_with<P>(
        &self,
        source: &Dataset,
        family: &str,
        key: &str,
        predicate: &P,
    ) -> Result<DurablePartition, PartitionError>
    where
        P: JobPredicate + ?Sized,
    {
        let paths = PartitionPaths::new(source.path(), family, key);
        if self.config.reuse_existing && paths.both_exist() {
            debug!(
                event = "partition_reused",
                source = %source.path().display(),
                family,
                key
            );
            return Ok(durable(paths, PartitionOutcome::Reused));
        }

        let label = source.label();
        let records = source.raw_records()?;
        let mut matched = AtomicDatasetWriter::create(&paths.matched)?;
        let mut unmatched = AtomicDatasetWriter::create(&paths.unmatched)?;
        let (matched_count, unmatched_count) =
            route(&label, records, predicate, |is_match, record| {
                let writer = if is_match { &mut matched } else { &mut unmatched };
                writer.write_record(&record.bytes)
            })?;
        matched.commit()?;
        if let Err(err) = unmatched.commit() {
            let _ = fs::remove_file(&paths.matched);
            warn!(
                event = "partition_rolled_back",
                source = %source.path().display(),
                family,
                key,
                error = %err
            );
            return Err(err.into());
        }

        info!(
            event = "partition_written",
            source = %source.path().display(),
            family,
            key,
            matched = matched_count,
            unmatched = unmatched_count
        );
        Ok(durable(
            paths,
            PartitionOutcome::Computed {
                matched: matched_count,
                unmatched: unmatched_count,
            },
        ))
    }

    pub fn partition_memory(
        &mut self,
        source: &MemoryDataset,
        filter: &Filter,
    ) -> Result<MemoryPartition, PartitionError> {
        self.partition_memory_with(source, filter.family().dir_name(), filter.key(), filter)
    }

    /// Ephemeral mode: routes compressed records into two new in-memory
    /// datasets without re-encoding them. Results are cached per
    /// `source name/family/key` for the lifetime of the engine.
    pub fn partition_memory_with<P>(
        &mut self,
        source: &MemoryDataset,
        family: &str,
        key: &str,
        predicate: &P,
    ) -> Result<MemoryPartition, PartitionError>
    where
        P: JobPredicate + ?Sized,
    {
        let cache_key = format!("{}/{family}/{key}", source.name());
        if self.config.reuse_existing {
            if let Some((matched, unmatched)) = self.memory_cache.get(&cache_key) {
                debug!(event = "partition_reused", source = source.name(), family, key);
                return Ok(MemoryPartition {
                    matched: Arc::clone(matched),
                    unmatched: Arc::clone(unmatched),
                    outcome: PartitionOutcome::Reused,
                });
            }
        }

        let mut matched = MemoryDataset::new(format!("{}/{family}/{key}", source.name()));
        let mut unmatched = MemoryDataset::new(format!("{}/not{family}/{key}", source.name()));
        let compressed = source.compressed();
        let records = compressed
            .iter()
            .enumerate()
            .map(|(index, bytes)| source.inflate(index, bytes));
        let (matched_count, unmatched_count) =
            route(source.name(), records, predicate, |is_match, record| {
                let stored = compressed[record.line - 1].clone();
                if is_match {
                    matched.push_compressed(stored);
                } else {
                    unmatched.push_compressed(stored);
                }
                Ok(())
            })?;

        let matched = Arc::new(matched);
        let unmatched = Arc::new(unmatched);
        self.memory_cache
            .insert(cache_key, (Arc::clone(&matched), Arc::clone(&unmatched)));
        debug!(
            event = "partition_computed",
            source = source.name(),
            family,
            key,
            matched = matched_count,
            unmatched = unmatched_count
        );
        Ok(MemoryPartition {
            matched,
            unmatched,
            outcome: PartitionOutcome::Computed {
                matched: matched_count,
                unmatched: unmatched_count,
            },
        })
    }

    pub fn clear_memory_cache(&mut self) {
        self.memory_cache.clear();
    }
}

impl Default for PartitionEngine {
    fn default() -> Self {
        Self::new(PartitionConfig::default())
    }
}

fn durable(paths: PartitionPaths, outcome: PartitionOutcome) -> DurablePartition {
    DurablePartition {
        matched: Dataset::new(paths.matched),
        unmatched: Dataset::new(paths.unmatched),
        outcome,
    }
}

/// Decode every record once and hand it to `emit` with its verdict. Stops
/// at the first unreadable or malformed record.
fn route<I, P, F>(
    label: &str,
    records: I,
    predicate: &P,
    mut emit: F,
) -> Result<(usize, usize), PartitionError>
where
    I: Iterator<Item = Result<RawRecord, StorageError>>,
    P: JobPredicate + ?Sized,
    F: FnMut(bool, &RawRecord) -> Result<(), StorageError>,
{
    let mut matched = 0;
    let mut unmatched = 0;
    for record in records {
        let record = record?;
        let job = record.to_job(label)?;
        let is_match = predicate.matches(&job);
        emit(is_match, &record)?;
        if is_match {
            matched += 1;
        } else {
            unmatched += 1;
        }
    }
    Ok((matched, unmatched))
}
