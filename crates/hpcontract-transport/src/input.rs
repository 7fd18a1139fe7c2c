use std::fs::File;
use std::io::ErrorKind;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::fs::FileExt;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::{Result, TransportError};

/// The shared user-input file, read with positioned reads.
///
/// Positioned reads never move a shared cursor, so any number of users can
/// read their ranges concurrently from the same descriptor.
#[derive(Clone)]
pub struct InputFile {
    file: Arc<File>,
}

impl InputFile {
    pub fn new(fd: OwnedFd) -> Self {
        Self {
            file: Arc::new(File::from(fd)),
        }
    }

    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Issues a single `pread`. A short read is reported as
    /// [`TransportError::ShortRead`] and is not retried.
    pub async fn read_at(&self, offset: u64, len: usize) -> Result<Bytes> {
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || -> Result<Bytes> {
            let mut buf = vec![0u8; len];
            let read = loop {
                match file.read_at(&mut buf, offset) {
                    Ok(n) => break n,
                    Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                    Err(err) => return Err(TransportError::Io(err)),
                }
            };
            if read != len {
                return Err(TransportError::ShortRead {
                    expected: len,
                    actual: read,
                });
            }
            Ok(Bytes::from(buf))
        })
        .await
        .map_err(|err| TransportError::Io(std::io::Error::other(err)))?
    }

    /// The underlying descriptor number, for diagnostics.
    pub fn raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl std::fmt::Debug for InputFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputFile").field("fd", &self.raw_fd()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn input_file(tag: &str, contents: &[u8]) -> (PathBuf, InputFile) {
        let path = std::env::temp_dir().join(format!(
            "hpcontract-input-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::write(&path, contents).expect("temp file should be writable");
        let file = File::open(&path).expect("temp file should open");
        (path, InputFile::new(OwnedFd::from(file)))
    }

    #[tokio::test]
    async fn reads_requested_range() {
        let (path, input) = input_file("range", b"0123456789abcdef");

        let bytes = input.read_at(10, 6).await.unwrap();
        assert_eq!(bytes.as_ref(), b"abcdef");

        let head = input.read_at(0, 4).await.unwrap();
        assert_eq!(head.as_ref(), b"0123");

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn read_past_end_is_short_read() {
        let (path, input) = input_file("short", b"tiny");

        let err = input.read_at(2, 10).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::ShortRead {
                expected: 10,
                actual: 2
            }
        ));

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn zero_length_read_is_empty() {
        let (path, input) = input_file("empty", b"data");

        let bytes = input.read_at(0, 0).await.unwrap();
        assert!(bytes.is_empty());

        let _ = std::fs::remove_file(path);
    }
}
