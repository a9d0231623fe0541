use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::value::RawValue;
use srt_storage::{Dataset, DatasetWriter, RecordSource};
use srt_sync::{FeedMode, RemoteSource, SyncConfig, SyncError, Syncer};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::tempdir;

enum Page {
    Records(Vec<u64>),
    Fail,
}

/// Serves scripted pages and records the `newer_than` of every request.
struct ScriptedRemote {
    pages: RefCell<VecDeque<Page>>,
    requests: RefCell<Vec<Option<u64>>>,
}

impl ScriptedRemote {
    fn new(pages: Vec<Page>) -> Self {
        Self {
            pages: RefCell::new(pages.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<Option<u64>> {
        self.requests.borrow().clone()
    }
}

fn record(id: u64) -> String {
    format!(r#"{{"id":{id},"danger_rate":"140.2","note":"id {id}"}}"#)
}

impl RemoteSource for ScriptedRemote {
    fn fetch_page(&self, newer_than: Option<u64>) -> Result<Vec<Box<RawValue>>, SyncError> {
        self.requests.borrow_mut().push(newer_than);
        match self.pages.borrow_mut().pop_front() {
            Some(Page::Records(ids)) => Ok(ids
                .into_iter()
                .map(|id| RawValue::from_string(record(id)).expect("raw record"))
                .collect()),
            Some(Page::Fail) => Err(SyncError::NetworkFetch("connection reset".to_string())),
            None => Ok(Vec::new()),
        }
    }
}

fn config(dir: &Path) -> SyncConfig {
    SyncConfig {
        mode: FeedMode::All,
        data_dir: dir.to_path_buf(),
        ..SyncConfig::default()
    }
}

fn ids(dataset: &Dataset) -> Vec<u64> {
    dataset
        .raw_records()
        .expect("records")
        .map(|record| record.expect("record").id("test").expect("id"))
        .collect()
}

fn seed(path: &Path, ids: &[u64]) {
    let mut writer = DatasetWriter::create(path).expect("writer");
    for id in ids {
        writer.write_record(record(*id).as_bytes()).expect("write");
    }
    writer.finish().expect("finish");
}

#[test]
fn paging_stops_at_fixed_point_and_dedupes() {
    let dir = tempdir().expect("tempdir");
    let remote = ScriptedRemote::new(vec![
        Page::Records(vec![1, 2, 3, 4, 5]),
        Page::Records(vec![5]),
        Page::Records(vec![5]),
    ]);
    let syncer = Syncer::new(&remote, config(dir.path()));

    let report = syncer.sync().expect("sync");
    assert_eq!(report.appended_records, 5);
    assert_eq!(report.last_id, Some(5));
    assert!(report.skipped_duplicates >= 1);
    assert!(report.pages_fetched <= 3);
    assert_eq!(remote.requests()[..2], [None, Some(5_u64)]);

    let dataset = Dataset::new(dir.path().join("salmonAll.jl.gz"));
    assert_eq!(ids(&dataset), vec![1, 2, 3, 4, 5]);
    let first = dataset
        .raw_records()
        .expect("records")
        .next()
        .expect("first")
        .expect("record");
    assert_eq!(first.bytes, record(1).into_bytes());
}

#[test]
fn existing_dataset_only_requests_newer_records() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("salmonAll.jl.gz");
    seed(&path, &[1, 2, 3]);
    fs::create_dir_all(dir.path().join("salmonAll/stages")).expect("partition dir");

    let remote = ScriptedRemote::new(vec![Page::Records(vec![4, 5]), Page::Records(vec![])]);
    let report = Syncer::new(&remote, config(dir.path())).sync().expect("sync");

    assert_eq!(remote.requests(), vec![Some(3), Some(5)]);
    assert_eq!(report.existing_records, 3);
    assert_eq!(report.appended_records, 2);
    assert!(report.partitions_cleared);
    assert!(!dir.path().join("salmonAll").exists());
    assert_eq!(ids(&Dataset::new(&path)), vec![1, 2, 3, 4, 5]);
}

#[test]
fn up_to_date_dataset_is_left_alone() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("salmonAll.jl.gz");
    seed(&path, &[1, 2]);
    fs::create_dir_all(dir.path().join("salmonAll/stages")).expect("partition dir");
    let before = fs::read(&path).expect("read");

    let remote = ScriptedRemote::new(vec![Page::Records(vec![2])]);
    let report = Syncer::new(&remote, config(dir.path())).sync().expect("sync");

    assert!(!report.rewritten);
    assert_eq!(report.appended_records, 0);
    assert_eq!(fs::read(&path).expect("read"), before);
    assert!(dir.path().join("salmonAll/stages").exists());
    assert!(!dir.path().join("salmonAll.jl.gz.tmp").exists());
}

#[test]
fn corrupted_tail_is_discarded_and_refetched() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("salmonAll.jl.gz");
    seed(&path, &[1, 2, 3, 4]);
    let bytes = fs::read(&path).expect("read");
    fs::write(&path, &bytes[..bytes.len() - 6]).expect("truncate");

    let remote = ScriptedRemote::new(vec![Page::Records(vec![1, 2, 3, 4, 5, 6])]);
    let report = Syncer::new(&remote, config(dir.path())).sync().expect("sync");

    assert!(report.recovered_corrupted_tail);
    assert!(report.rewritten);
    assert_eq!(ids(&Dataset::new(&path)), vec![1, 2, 3, 4, 5, 6]);
    let last_good = (report.existing_records > 0).then_some(report.existing_records as u64);
    assert_eq!(remote.requests()[0], last_good);
}

#[test]
fn unterminated_last_record_is_dropped_and_refetched() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("salmonAll.jl.gz");
    let partial = record(2);
    let payload = format!("{}\n{}", record(1), &partial[..partial.len() / 2]);
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload.as_bytes()).expect("compress");
    fs::write(&path, encoder.finish().expect("gzip")).expect("write");

    let remote = ScriptedRemote::new(vec![Page::Records(vec![2, 3])]);
    let report = Syncer::new(&remote, config(dir.path())).sync().expect("sync");

    assert!(report.recovered_corrupted_tail);
    assert_eq!(report.existing_records, 1);
    assert_eq!(remote.requests()[0], Some(1));
    assert_eq!(ids(&Dataset::new(&path)), vec![1, 2, 3]);
}

#[test]
fn network_failure_leaves_previous_file_untouched() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("salmonAll.jl.gz");
    seed(&path, &[1, 2]);
    let before = fs::read(&path).expect("read");

    let remote = ScriptedRemote::new(vec![Page::Records(vec![3, 4]), Page::Fail]);
    let err = Syncer::new(&remote, config(dir.path()))
        .sync()
        .expect_err("network failure");

    assert!(matches!(err, SyncError::NetworkFetch(_)));
    assert_eq!(fs::read(&path).expect("read"), before);
    assert!(!dir.path().join("salmonAll.jl.gz.tmp").exists());
}
