use crate::{partition_root, RawRecords, RecordSource, StorageError};
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use srt_core::{record_id, Job};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// One serialized record exactly as stored, without its line terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// 1-based line number within the source.
    pub line: usize,
    pub bytes: Vec<u8>,
}

impl RawRecord {
    pub fn to_job(&self, dataset: &str) -> Result<Job, StorageError> {
        Job::from_slice(&self.bytes).map_err(|source| StorageError::Record {
            dataset: dataset.to_string(),
            line: self.line,
            source,
        })
    }

    pub fn id(&self, dataset: &str) -> Result<u64, StorageError> {
        record_id(&self.bytes).map_err(|source| StorageError::Record {
            dataset: dataset.to_string(),
            line: self.line,
            source,
        })
    }
}

/// A gzip newline-delimited JSON dataset on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    path: PathBuf,
}

impl Dataset {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn partition_root(&self) -> PathBuf {
        partition_root(&self.path)
    }

    pub fn reader(&self) -> Result<DatasetReader, StorageError> {
        DatasetReader::open(&self.path)
    }

    /// Id of the last record, `None` for an empty dataset.
    pub fn last_record_id(&self) -> Result<Option<u64>, StorageError> {
        let label = self.label();
        let mut last = None;
        for record in self.reader()? {
            last = Some(record?);
        }
        last.map(|record| record.id(&label)).transpose()
    }
}

impl RecordSource for Dataset {
    fn label(&self) -> String {
        self.path.display().to_string()
    }

    fn raw_records(&self) -> Result<RawRecords<'_>, StorageError> {
        Ok(Box::new(self.reader()?))
    }
}

/// Streams raw lines out of a gzip dataset in constant memory. Concatenated
/// gzip members, as left by appending writers, read as one stream.
///
/// A truncated compression stream or an unterminated final line is reported
/// as [`StorageError::CorruptedTail`] carrying the number of complete records
/// read before it; iteration stops after the first error.
pub struct DatasetReader {
    path: PathBuf,
    lines: Option<BufReader<MultiGzDecoder<File>>>,
    line: usize,
    records_read: usize,
    buffer: Vec<u8>,
}

impl DatasetReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| StorageError::DatasetUnavailable {
            path: path.clone(),
            source,
        })?;
        let empty = file
            .metadata()
            .map_err(|source| StorageError::DatasetUnavailable {
                path: path.clone(),
                source,
            })?
            .len()
            == 0;
        let lines = (!empty).then(|| BufReader::new(MultiGzDecoder::new(file)));
        Ok(Self {
            path,
            lines,
            line: 0,
            records_read: 0,
            buffer: Vec::new(),
        })
    }

    pub fn records_read(&self) -> usize {
        self.records_read
    }

    pub fn next_record(&mut self) -> Result<Option<RawRecord>, StorageError> {
        loop {
            let Some(lines) = self.lines.as_mut() else {
                return Ok(None);
            };
            self.buffer.clear();
            let read = match lines.read_until(b'\n', &mut self.buffer) {
                Ok(read) => read,
                Err(err) => {
                    self.lines = None;
                    return Err(self.read_failure(err));
                }
            };
            if read == 0 {
                self.lines = None;
                return Ok(None);
            }
            self.line += 1;
            if self.buffer.last() != Some(&b'\n') {
                self.lines = None;
                debug!(
                    event = "dataset_unterminated_line",
                    path = %self.path.display(),
                    records_read = self.records_read
                );
                return Err(StorageError::CorruptedTail {
                    path: self.path.clone(),
                    records_read: self.records_read,
                });
            }
            let mut bytes = std::mem::take(&mut self.buffer);
            bytes.pop();
            if bytes.last() == Some(&b'\r') {
                bytes.pop();
            }
            if bytes.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            self.records_read += 1;
            return Ok(Some(RawRecord {
                line: self.line,
                bytes,
            }));
        }
    }

    fn read_failure(&self, err: io::Error) -> StorageError {
        let truncated = err.kind() == io::ErrorKind::UnexpectedEof
            || (self.records_read > 0
                && matches!(
                    err.kind(),
                    io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData
                ));
        if truncated {
            debug!(
                event = "dataset_truncated_stream",
                path = %self.path.display(),
                records_read = self.records_read,
                error = %err
            );
            StorageError::CorruptedTail {
                path: self.path.clone(),
                records_read: self.records_read,
            }
        } else {
            StorageError::DatasetUnavailable {
                path: self.path.clone(),
                source: err,
            }
        }
    }
}

impl Iterator for DatasetReader {
    type Item = Result<RawRecord, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Appends raw records to a new gzip dataset file.
pub struct DatasetWriter {
    path: PathBuf,
    encoder: GzEncoder<BufWriter<File>>,
    records: usize,
}

impl DatasetWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| {
                StorageError::io(format!("create directory {}", parent.display()), err)
            })?;
        }
        let file = File::create(&path)
            .map_err(|err| StorageError::io(format!("create {}", path.display()), err))?;
        Ok(Self {
            encoder: GzEncoder::new(BufWriter::new(file), Compression::default()),
            path,
            records: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> usize {
        self.records
    }

    pub fn write_record(&mut self, bytes: &[u8]) -> Result<(), StorageError> {
        self.encoder
            .write_all(bytes)
            .and_then(|()| self.encoder.write_all(b"\n"))
            .map_err(|err| StorageError::io(format!("write {}", self.path.display()), err))?;
        self.records += 1;
        Ok(())
    }

    /// Close the gzip stream and flush it to disk.
    pub fn finish(self) -> Result<usize, StorageError> {
        let context = format!("finish {}", self.path.display());
        let writer = self
            .encoder
            .finish()
            .map_err(|err| StorageError::io(context.clone(), err))?;
        let file = writer
            .into_inner()
            .map_err(|err| StorageError::io(context.clone(), err.into_error()))?;
        file.sync_all()
            .map_err(|err| StorageError::io(context, err))?;
        Ok(self.records)
    }
}

/// A dataset written beside its target as `<name>.tmp` and renamed over it
/// on [`AtomicDatasetWriter::commit`]. Dropping without committing removes
/// the temp file and leaves the target untouched.
pub struct AtomicDatasetWriter {
    target: PathBuf,
    temp: PathBuf,
    writer: Option<DatasetWriter>,
}

impl AtomicDatasetWriter {
    pub fn create(target: impl AsRef<Path>) -> Result<Self, StorageError> {
        let target = target.as_ref().to_path_buf();
        let temp = temp_path(&target);
        let writer = DatasetWriter::create(&temp)?;
        Ok(Self {
            target,
            temp,
            writer: Some(writer),
        })
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn records(&self) -> usize {
        self.writer.as_ref().map_or(0, DatasetWriter::records)
    }

    pub fn write_record(&mut self, bytes: &[u8]) -> Result<(), StorageError> {
        match self.writer.as_mut() {
            Some(writer) => writer.write_record(bytes),
            None => Err(StorageError::io(
                format!("write {}", self.temp.display()),
                io::Error::new(io::ErrorKind::Other, "writer already closed"),
            )),
        }
    }

    pub fn commit(mut self) -> Result<usize, StorageError> {
        let finished = match self.writer.take() {
            Some(writer) => writer.finish(),
            None => Ok(0),
        };
        let records = finished.and_then(|records| {
            fs::rename(&self.temp, &self.target)
                .map(|()| records)
                .map_err(|err| StorageError::io(format!("replace {}", self.target.display()), err))
        });
        if records.is_err() {
            let _ = fs::remove_file(&self.temp);
        }
        let records = records?;
        sync_parent_dir(&self.target);
        Ok(records)
    }
}

impl Drop for AtomicDatasetWriter {
    fn drop(&mut self) {
        if self.writer.take().is_some() {
            let _ = fs::remove_file(&self.temp);
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    match path.file_name() {
        Some(name) => path.with_file_name(format!("{}.tmp", name.to_string_lossy())),
        None => path.with_extension("tmp"),
    }
}

fn sync_parent_dir(path: &Path) {
    #[cfg(unix)]
    {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_lines(path: &Path, lines: &[&str]) {
        let mut writer = DatasetWriter::create(path).expect("writer");
        for line in lines {
            writer.write_record(line.as_bytes()).expect("write");
        }
        writer.finish().expect("finish");
    }

    #[test]
    fn reader_streams_lines_byte_for_byte() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("jobs.jl.gz");
        write_lines(&path, &[r#"{"id":1,"danger_rate":"140.20"}"#, r#"{"id":2}"#]);

        let dataset = Dataset::new(&path);
        let records: Vec<RawRecord> = dataset
            .reader()
            .expect("reader")
            .collect::<Result<_, _>>()
            .expect("records");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].bytes, br#"{"id":1,"danger_rate":"140.20"}"#.to_vec());
        assert_eq!(records[1].line, 2);
        assert_eq!(dataset.last_record_id().expect("last id"), Some(2));
        assert!(dataset.has_records().expect("has records"));
    }

    #[test]
    fn missing_file_is_unavailable() {
        let dir = tempdir().expect("tempdir");
        let err = Dataset::new(dir.path().join("nope.jl.gz"))
            .reader()
            .err()
            .expect("missing file fails");
        assert!(matches!(err, StorageError::DatasetUnavailable { .. }));
    }

    #[test]
    fn truncated_stream_reports_corrupted_tail() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("jobs.jl.gz");
        write_lines(&path, &[r#"{"id":1}"#, r#"{"id":2}"#, r#"{"id":3}"#]);
        let bytes = fs::read(&path).expect("read");
        fs::write(&path, &bytes[..bytes.len() - 4]).expect("truncate");

        let mut reader = DatasetReader::open(&path).expect("reader");
        let mut seen = 0;
        let err = loop {
            match reader.next_record() {
                Ok(Some(_)) => seen += 1,
                Ok(None) => panic!("truncated stream must not end cleanly"),
                Err(err) => break err,
            }
        };
        match err {
            StorageError::CorruptedTail { records_read, .. } => assert_eq!(records_read, seen),
            other => panic!("unexpected error: {other}"),
        }
        assert!(reader.next_record().expect("stopped").is_none());
    }

    fn gzip_member(payload: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload).expect("compress");
        encoder.finish().expect("member")
    }

    #[test]
    fn appended_gzip_members_read_as_one_dataset() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("salmon.jl.gz");
        let mut bytes = gzip_member(b"{\"id\":1}\n{\"id\":2}\n");
        bytes.extend(gzip_member(b"{\"id\":3}\n{\"id\":4}\n"));
        fs::write(&path, bytes).expect("write");

        let dataset = Dataset::new(&path);
        assert_eq!(dataset.job_count().expect("count"), 4);
        assert_eq!(dataset.last_record_id().expect("last id"), Some(4));
        let lines: Vec<usize> = dataset
            .reader()
            .expect("reader")
            .map(|record| record.expect("record").line)
            .collect();
        assert_eq!(lines, vec![1, 2, 3, 4]);
    }

    #[test]
    fn unterminated_last_line_in_complete_stream_is_corrupted_tail() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("salmon.jl.gz");
        fs::write(&path, gzip_member(b"{\"id\":1}\n{\"id\":2")).expect("write");

        let mut reader = DatasetReader::open(&path).expect("reader");
        let first = reader.next_record().expect("first").expect("record");
        assert_eq!(first.bytes, br#"{"id":1}"#.to_vec());
        match reader.next_record() {
            Err(StorageError::CorruptedTail { records_read, .. }) => assert_eq!(records_read, 1),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(reader.next_record().expect("stopped").is_none());
    }

    #[test]
    fn atomic_writer_only_replaces_target_on_commit() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("jobs.jl.gz");
        write_lines(&path, &[r#"{"id":1}"#]);

        {
            let mut writer = AtomicDatasetWriter::create(&path).expect("writer");
            writer.write_record(br#"{"id":9}"#).expect("write");
        }
        assert_eq!(Dataset::new(&path).last_record_id().expect("id"), Some(1));
        assert!(!dir.path().join("jobs.jl.gz.tmp").exists());

        let mut writer = AtomicDatasetWriter::create(&path).expect("writer");
        writer.write_record(br#"{"id":9}"#).expect("write");
        assert_eq!(writer.commit().expect("commit"), 1);
        assert_eq!(Dataset::new(&path).last_record_id().expect("id"), Some(9));
    }
}
