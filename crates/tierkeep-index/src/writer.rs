//! Chunked record writer.
//!
//! Records are collected in a fixed-size in-memory chunk and written to the
//! underlying writer only when the chunk is full or the writer is finished,
//! so a large index costs one `write` per chunk instead of one per record.

use std::io::{self, Write};
use tierkeep_common::{Error, Result};

use crate::record::{IndexRecord, RECORD_SIZE};

/// Check that `chunk_size` holds a whole, non-zero number of records
pub fn validate_chunk_size(chunk_size: usize) -> Result<()> {
    if chunk_size == 0 || chunk_size % RECORD_SIZE != 0 {
        return Err(Error::invalid_argument(format!(
            "chunk size must be a positive multiple of {RECORD_SIZE}, got {chunk_size}"
        )));
    }
    Ok(())
}

pub struct ChunkedRecordWriter<W: Write> {
    inner: W,
    chunk: Vec<u8>,
    chunk_size: usize,
    count: u64,
}

impl<W: Write> ChunkedRecordWriter<W> {
    /// `chunk_size` must be a positive multiple of the record size
    pub fn new(inner: W, chunk_size: usize) -> Result<Self> {
        validate_chunk_size(chunk_size)?;
        Ok(Self {
            inner,
            chunk: Vec::with_capacity(chunk_size),
            chunk_size,
            count: 0,
        })
    }

    /// Records pushed so far
    pub const fn count(&self) -> u64 {
        self.count
    }

    pub fn push(&mut self, record: IndexRecord) -> io::Result<()> {
        if self.chunk.len() == self.chunk_size {
            self.flush_chunk()?;
        }
        self.chunk.extend_from_slice(&record.to_bytes());
        self.count += 1;
        Ok(())
    }

    fn flush_chunk(&mut self) -> io::Result<()> {
        if !self.chunk.is_empty() {
            self.inner.write_all(&self.chunk)?;
            self.chunk.clear();
        }
        Ok(())
    }

    /// Write out the partial chunk and hand back the inner writer
    pub fn finish(mut self) -> io::Result<(W, u64)> {
        self.flush_chunk()?;
        self.inner.flush()?;
        Ok((self.inner, self.count))
    }
}
