//! Column group indexer.
//!
//! Scans a tab-delimited file once and emits one [`IndexRecord`] per run of
//! consecutive lines whose selected column holds the same value. Blank
//! lines never close a run; their bytes belong to whichever run is open.
//! Blank lines before the first value make up a leading group of their own.
//! The index is written to a temp file in the configured temp directory and
//! renamed into place only after the whole scan succeeds.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use tierkeep_common::config::DEFAULT_INDEX_CHUNK_SIZE;
use tierkeep_common::{Config, Error, Result};
use tracing::{debug, info};

use crate::record::{IndexFormat, IndexRecord};
use crate::writer::{ChunkedRecordWriter, validate_chunk_size};

const FIELD_DELIMITER: u8 = b'\t';

/// Result of a successful build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSummary {
    /// Number of records written
    pub count: u64,
    pub format: IndexFormat,
}

/// Builds column group indexes
#[derive(Debug, Clone)]
pub struct ColumnIndexer {
    temp_dir: PathBuf,
    chunk_size: usize,
}

impl ColumnIndexer {
    /// Indexer staging temp files under `temp_dir` with the default chunk size
    pub fn new(temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            temp_dir: temp_dir.into(),
            chunk_size: DEFAULT_INDEX_CHUNK_SIZE,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            temp_dir: config.index_temp_dir(),
            chunk_size: config.index.chunk_size,
        }
    }

    /// Override the write chunk size (positive multiple of 16)
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Result<Self> {
        validate_chunk_size(chunk_size)?;
        self.chunk_size = chunk_size;
        Ok(self)
    }

    /// Stage temp files in `temp_dir` instead
    #[must_use]
    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = temp_dir.into();
        self
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Build an index of `source` on 1-based `column` into `dest`.
    ///
    /// On error `dest` is left untouched and the temp file is removed.
    pub fn build<R: BufRead>(&self, source: R, column: usize, dest: &Path) -> Result<IndexSummary> {
        if column == 0 {
            return Err(Error::invalid_argument("column numbers start at 1"));
        }

        fs::create_dir_all(&self.temp_dir)?;
        let temp = tempfile::Builder::new()
            .prefix(".column-")
            .suffix(".idx")
            .tempfile_in(&self.temp_dir)?;
        debug!("Staging column index in {}", temp.path().display());

        let count = {
            let mut writer = ChunkedRecordWriter::new(temp.as_file(), self.chunk_size)?;
            scan_runs(source, column, |record| writer.push(record))?;
            let (file, count) = writer.finish()?;
            file.sync_all()?;
            count
        };

        temp.persist(dest).map_err(|e| Error::Io(e.error))?;
        info!(
            "Built column index {} (column {}, {} records)",
            dest.display(),
            column,
            count
        );

        Ok(IndexSummary {
            count,
            format: IndexFormat::Array,
        })
    }

    /// Build an index for the file at `source`
    pub fn build_file(&self, source: &Path, column: usize, dest: &Path) -> Result<IndexSummary> {
        let file = File::open(source)?;
        self.build(BufReader::new(file), column, dest)
    }
}

/// Walk `source` line by line and hand every finished run to `emit`
fn scan_runs<R, F>(mut source: R, column: usize, mut emit: F) -> Result<()>
where
    R: BufRead,
    F: FnMut(IndexRecord) -> io::Result<()>,
{
    let mut line = Vec::new();
    let mut line_no: u64 = 0;
    let mut run_start: u64 = 0;
    let mut run_len: u64 = 0;
    let mut current: Option<Vec<u8>> = None;

    loop {
        line.clear();
        let read = source.read_until(b'\n', &mut line)?;
        if read == 0 {
            break;
        }
        line_no += 1;
        let read = read as u64;

        let content = strip_line_ending(&line);
        if content.is_empty() {
            run_len += read;
            continue;
        }

        let value = field(content, column).ok_or_else(|| Error::ColumnOutOfRange {
            column,
            fields: content.split(|b| *b == FIELD_DELIMITER).count(),
            line: line_no,
        })?;

        // Blank lines ahead of the first value form a group of their own
        let starts_run = current.as_deref().is_none_or(|prev| prev != value);
        if starts_run {
            if run_len > 0 {
                emit(IndexRecord::new(run_start, run_len))?;
                run_start += run_len;
                run_len = 0;
            }
            current = Some(value.to_vec());
        }
        run_len += read;
    }

    if run_len > 0 {
        emit(IndexRecord::new(run_start, run_len))?;
    }
    Ok(())
}

fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn field(content: &[u8], column: usize) -> Option<&[u8]> {
    content.split(|b| *b == FIELD_DELIMITER).nth(column - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::ColumnIndex;
    use crate::record::RECORD_SIZE;
    use std::io::Cursor;
    use tempfile::{TempDir, tempdir};

    fn indexer(dir: &TempDir) -> ColumnIndexer {
        ColumnIndexer::new(dir.path().join("temp"))
    }

    fn build(data: &str, column: usize) -> (TempDir, Result<IndexSummary>, PathBuf) {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.idx");
        let result = indexer(&dir).build(Cursor::new(data.as_bytes()), column, &dest);
        (dir, result, dest)
    }

    fn records_at(path: &Path) -> Vec<IndexRecord> {
        ColumnIndex::open(path).unwrap().records().unwrap()
    }

    #[test]
    fn test_groups_consecutive_values() {
        let lines = [
            "1\ta\tx\n",
            "2\ta\ty\n",
            "3\tb\tx\n",
            "4\tb\ty\n",
            "5\tb\tz\n",
            "6\tc\tx\n",
        ];
        let data = lines.concat();
        let (_dir, result, dest) = build(&data, 2);

        let summary = result.unwrap();
        assert_eq!(summary.count, 3);
        assert_eq!(summary.format, IndexFormat::Array);

        let len = |range: std::ops::Range<usize>| -> u64 {
            lines[range].iter().map(|l| l.len() as u64).sum()
        };
        let records = records_at(&dest);
        assert_eq!(
            records,
            vec![
                IndexRecord::new(0, len(0..2)),
                IndexRecord::new(len(0..2), len(2..5)),
                IndexRecord::new(len(0..5), len(5..6)),
            ]
        );
        let last = records.last().unwrap();
        assert_eq!(last.end(), data.len() as u64);
    }

    #[test]
    fn test_blank_lines_join_open_run() {
        let (_dir, result, dest) = build("a\n\n\nb\n", 1);
        assert_eq!(result.unwrap().count, 2);
        assert_eq!(
            records_at(&dest),
            vec![IndexRecord::new(0, 4), IndexRecord::new(4, 2)]
        );
    }

    #[test]
    fn test_leading_blank_lines_form_own_group() {
        let (_dir, result, dest) = build("\n\na\na\nb\n", 1);
        assert_eq!(result.unwrap().count, 3);
        assert_eq!(
            records_at(&dest),
            vec![
                IndexRecord::new(0, 2),
                IndexRecord::new(2, 4),
                IndexRecord::new(6, 2),
            ]
        );
    }

    #[test]
    fn test_blank_only_source_is_one_group() {
        let (_dir, result, dest) = build("\n\r\n\n", 1);
        assert_eq!(result.unwrap().count, 1);
        assert_eq!(records_at(&dest), vec![IndexRecord::new(0, 4)]);
    }

    #[test]
    fn test_single_run_file() {
        let (_dir, result, dest) = build("k\t1\nk\t2\nk\t3", 1);
        assert_eq!(result.unwrap().count, 1);
        assert_eq!(records_at(&dest), vec![IndexRecord::new(0, 11)]);
    }

    #[test]
    fn test_empty_source_writes_empty_index() {
        let (_dir, result, dest) = build("", 1);
        assert_eq!(result.unwrap().count, 0);
        assert!(dest.exists());
        assert_eq!(fs::metadata(&dest).unwrap().len(), 0);
    }

    #[test]
    fn test_crlf_terminators_are_ignored_in_values() {
        // "a\r\n" and "a\n" hold the same value
        let (_dir, result, dest) = build("x\ta\r\ny\ta\nz\tb\r\n", 2);
        assert_eq!(result.unwrap().count, 2);
        assert_eq!(
            records_at(&dest),
            vec![IndexRecord::new(0, 9), IndexRecord::new(9, 5)]
        );
    }

    #[test]
    fn test_column_out_of_range_leaves_no_output() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.idx");
        let indexer = indexer(&dir);

        let err = indexer
            .build(Cursor::new(b"a\tb\nc\td\ne\n".as_slice()), 2, &dest)
            .unwrap_err();
        match err {
            Error::ColumnOutOfRange {
                column,
                fields,
                line,
            } => {
                assert_eq!(column, 2);
                assert_eq!(fields, 1);
                assert_eq!(line, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(!dest.exists());
        let leftovers = fs::read_dir(indexer.temp_dir()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_failed_rebuild_keeps_previous_index() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.idx");
        let indexer = indexer(&dir);

        indexer
            .build(Cursor::new(b"a\na\nb\n".as_slice()), 1, &dest)
            .unwrap();
        let before = fs::read(&dest).unwrap();

        assert!(indexer.build(Cursor::new(b"a\tb\n".as_slice()), 3, &dest).is_err());
        assert_eq!(fs::read(&dest).unwrap(), before);
    }

    #[test]
    fn test_column_zero_is_rejected() {
        let (_dir, result, dest) = build("a\n", 0);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        assert!(!dest.exists());
    }

    #[test]
    fn test_rebuild_is_byte_identical() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("data.tsv");
        let mut data = String::new();
        for i in 0..500 {
            data.push_str(&format!("row{i}\tgroup{}\n", i / 7));
            if i % 50 == 0 {
                data.push('\n');
            }
        }
        fs::write(&source, &data).unwrap();

        let indexer = indexer(&dir);
        let first = dir.path().join("first.idx");
        let second = dir.path().join("second.idx");
        let a = indexer.build_file(&source, 2, &first).unwrap();
        let b = indexer.build_file(&source, 2, &second).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.count, 72);
        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    }

    #[test]
    fn test_small_chunks_match_default_output() {
        let dir = tempdir().unwrap();
        let data: String = (0..100).map(|i| format!("{i}\n")).collect();

        let small = dir.path().join("small.idx");
        let large = dir.path().join("large.idx");
        indexer(&dir)
            .with_chunk_size(2 * RECORD_SIZE)
            .unwrap()
            .build(Cursor::new(data.as_bytes()), 1, &small)
            .unwrap();
        indexer(&dir)
            .build(Cursor::new(data.as_bytes()), 1, &large)
            .unwrap();

        let bytes = fs::read(&small).unwrap();
        assert_eq!(bytes.len(), 100 * RECORD_SIZE);
        assert_eq!(bytes, fs::read(&large).unwrap());
    }

    #[test]
    fn test_with_chunk_size_validates() {
        let dir = tempdir().unwrap();
        assert!(indexer(&dir).with_chunk_size(0).is_err());
        assert!(indexer(&dir).with_chunk_size(17).is_err());
        assert_eq!(indexer(&dir).with_chunk_size(64).unwrap().chunk_size(), 64);
    }

    #[test]
    fn test_from_config_uses_index_section() {
        let mut config = Config::default();
        config.storage.data_dir = PathBuf::from("/srv/tierkeep");
        config.index.chunk_size = 4096;
        let indexer = ColumnIndexer::from_config(&config);
        assert_eq!(indexer.temp_dir(), Path::new("/srv/tierkeep/temp"));
        assert_eq!(indexer.chunk_size(), 4096);
    }
}
