//! Tierkeep Index - column group index for delimited text files
//!
//! A column index marks the byte ranges of a tab-delimited file in which a
//! chosen column keeps the same value on consecutive lines. The index is a
//! flat sequence of 16-byte little-endian `(offset, length)` records with
//! no header, so a reader can seek straight to the N-th group.
//!
//! - [`ColumnIndexer`] builds an index in one streaming pass
//! - [`ChunkedRecordWriter`] buffers records in fixed-size chunks
//! - [`ColumnIndex`] reads records back and fetches group bytes

pub mod column;
pub mod reader;
pub mod record;
pub mod writer;

// Re-exports
pub use column::{ColumnIndexer, IndexSummary};
pub use reader::ColumnIndex;
pub use record::{IndexFormat, IndexRecord, RECORD_SIZE};
pub use writer::{ChunkedRecordWriter, validate_chunk_size};
