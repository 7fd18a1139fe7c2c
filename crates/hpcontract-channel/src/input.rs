use std::os::fd::OwnedFd;

use bytes::Bytes;
use hpcontract_transport::InputFile;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A byte range inside the shared user-input file.
///
/// Serialized as the host writes it: a two-element `[offset, length]` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u64, usize)", into = "(u64, usize)")]
pub struct InputRange {
    pub offset: u64,
    pub length: usize,
}

impl InputRange {
    pub fn new(offset: u64, length: usize) -> Self {
        Self { offset, length }
    }
}

impl From<(u64, usize)> for InputRange {
    fn from((offset, length): (u64, usize)) -> Self {
        Self { offset, length }
    }
}

impl From<InputRange> for (u64, usize) {
    fn from(range: InputRange) -> Self {
        (range.offset, range.length)
    }
}

/// Reads user inputs out of the shared input file.
///
/// Ranges come from the host and are trusted as-is; a range outside the
/// file surfaces as the underlying short-read error.
#[derive(Debug, Clone)]
pub struct UserInputReader {
    file: InputFile,
}

impl UserInputReader {
    pub fn new(fd: OwnedFd) -> Self {
        Self {
            file: InputFile::new(fd),
        }
    }

    /// Read exactly `range.length` bytes at `range.offset`.
    pub async fn read(&self, range: InputRange) -> Result<Bytes> {
        Ok(self.file.read_at(range.offset, range.length).await?)
    }
}
