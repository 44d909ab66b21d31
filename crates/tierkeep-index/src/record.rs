//! On-disk index record layout.
//!
//! ```text
//! +----------------+----------------+
//! | offset (u64 LE)| length (u64 LE)|
//! +----------------+----------------+
//!      8 bytes          8 bytes
//! ```

use std::fmt;
use std::str::FromStr;
use tierkeep_common::Error;

/// Size of one encoded record
pub const RECORD_SIZE: usize = 16;

/// Byte range of one group in the indexed file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRecord {
    /// Start of the group in the source file
    pub offset: u64,
    /// Number of bytes in the group
    pub length: u64,
}

impl IndexRecord {
    #[must_use]
    pub const fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// First byte after the group
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.offset + self.length
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        buf[..8].copy_from_slice(&self.offset.to_le_bytes());
        buf[8..].copy_from_slice(&self.length.to_le_bytes());
        buf
    }

    #[must_use]
    pub fn from_bytes(buf: &[u8; RECORD_SIZE]) -> Self {
        let mut offset = [0u8; 8];
        let mut length = [0u8; 8];
        offset.copy_from_slice(&buf[..8]);
        length.copy_from_slice(&buf[8..]);
        Self {
            offset: u64::from_le_bytes(offset),
            length: u64::from_le_bytes(length),
        }
    }
}

/// Layout tag reported with a built index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexFormat {
    /// Flat array of fixed-size records
    #[default]
    Array,
}

impl IndexFormat {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Array => "array",
        }
    }
}

impl fmt::Display for IndexFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "array" => Ok(Self::Array),
            other => Err(Error::invalid_argument(format!("unknown index format: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_layout_is_little_endian() {
        let record = IndexRecord::new(0x0102, 0x0a0b_0c0d);
        let bytes = record.to_bytes();
        assert_eq!(&bytes[..8], &[0x02, 0x01, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&bytes[8..], &[0x0d, 0x0c, 0x0b, 0x0a, 0, 0, 0, 0]);
        assert_eq!(IndexRecord::from_bytes(&bytes), record);
        assert_eq!(record.end(), 0x0102 + 0x0a0b_0c0d);
    }

    #[test]
    fn test_format_tag() {
        assert_eq!(IndexFormat::Array.to_string(), "array");
        assert_eq!("array".parse::<IndexFormat>().unwrap(), IndexFormat::Array);
        assert!("chunk".parse::<IndexFormat>().is_err());
    }
}
