use std::fs::File;
use std::io::Write;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::Arc;

use bytes::Bytes;
use tracing::trace;

use crate::error::{Result, TransportError};

/// A stream descriptor that receives whole, pre-framed buffers.
///
/// The descriptor stays in blocking mode; writes run on tokio's blocking
/// pool so a slow reader on the host side never stalls the event loop.
#[derive(Clone)]
pub struct OutputFd {
    file: Arc<File>,
}

impl OutputFd {
    pub fn new(fd: OwnedFd) -> Self {
        Self {
            file: Arc::new(File::from(fd)),
        }
    }

    /// Write `buf` in full. Completion means the bytes were handed to the
    /// descriptor, not that the host has read them.
    pub async fn write_all(&self, buf: Bytes) -> Result<()> {
        let file = Arc::clone(&self.file);
        let fd = file.as_raw_fd();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut writer: &File = &file;
            writer.write_all(&buf)?;
            trace!(fd, size = buf.len(), "wrote output buffer");
            Ok(())
        })
        .await
        .map_err(|err| TransportError::Io(std::io::Error::other(err)))?
    }

    /// The underlying descriptor number, for diagnostics.
    pub fn raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl std::fmt::Debug for OutputFd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputFd").field("fd", &self.raw_fd()).finish()
    }
}
