//! Column index reader.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use tierkeep_common::{Error, Result};

use crate::record::{IndexRecord, RECORD_SIZE};

/// Read-only view of a built column index
#[derive(Debug)]
pub struct ColumnIndex {
    file: File,
    len: u64,
}

impl ColumnIndex {
    /// Open an index, rejecting files that are not a whole number of records
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        if size % RECORD_SIZE as u64 != 0 {
            return Err(Error::CorruptIndex(format!(
                "{}: size {} is not a multiple of {}",
                path.display(),
                size,
                RECORD_SIZE
            )));
        }
        Ok(Self {
            file,
            len: size / RECORD_SIZE as u64,
        })
    }

    /// Number of groups
    pub const fn len(&self) -> u64 {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Record of group `index` (0-based)
    pub fn record(&self, index: u64) -> Result<IndexRecord> {
        if index >= self.len {
            return Err(Error::invalid_argument(format!(
                "group {index} out of range (index has {} groups)",
                self.len
            )));
        }
        let mut file = &self.file;
        file.seek(SeekFrom::Start(index * RECORD_SIZE as u64))?;
        let mut buf = [0u8; RECORD_SIZE];
        file.read_exact(&mut buf)?;
        Ok(IndexRecord::from_bytes(&buf))
    }

    /// Every record in file order
    pub fn records(&self) -> Result<Vec<IndexRecord>> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(file);
        let mut buf = [0u8; RECORD_SIZE];
        let mut records = Vec::with_capacity(self.len as usize);
        for _ in 0..self.len {
            reader.read_exact(&mut buf)?;
            records.push(IndexRecord::from_bytes(&buf));
        }
        Ok(records)
    }

    /// Check that groups tile the source from offset 0 without gaps
    pub fn verify(&self) -> Result<()> {
        let mut expected = 0u64;
        for (i, record) in self.records()?.into_iter().enumerate() {
            if record.offset != expected || record.length == 0 {
                return Err(Error::CorruptIndex(format!(
                    "group {i} at offset {} (len {}), expected offset {expected}",
                    record.offset, record.length
                )));
            }
            expected = record.end();
        }
        Ok(())
    }

    /// Bytes of group `index` from the indexed source
    pub fn read_group<S: Read + Seek>(&self, source: &mut S, index: u64) -> Result<Vec<u8>> {
        let record = self.record(index)?;
        let source_len = source.seek(SeekFrom::End(0))?;
        let in_bounds = record
            .offset
            .checked_add(record.length)
            .is_some_and(|end| end <= source_len);
        if !in_bounds {
            return Err(Error::CorruptIndex(format!(
                "group {index} (offset {}, len {}) runs past end of source ({source_len} bytes)",
                record.offset, record.length
            )));
        }

        source.seek(SeekFrom::Start(record.offset))?;
        let mut data = Vec::new();
        source.by_ref().take(record.length).read_to_end(&mut data)?;
        if data.len() as u64 != record.length {
            return Err(Error::CorruptIndex(format!(
                "group {index} short read ({} of {} bytes)",
                data.len(),
                record.length
            )));
        }
        Ok(data)
    }
}
