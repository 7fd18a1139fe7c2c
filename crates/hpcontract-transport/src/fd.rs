use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use bytes::Bytes;
use tokio::io::unix::AsyncFd;
use tracing::debug;

use crate::error::{Result, TransportError};

/// Take ownership of a descriptor number inherited from the host.
///
/// Fails with [`TransportError::InvalidDescriptor`] when the number is
/// negative or not open in this process.
///
/// # Safety
///
/// `fd` must not be owned by any other handle in this process. The returned
/// [`OwnedFd`] closes the descriptor on drop.
pub unsafe fn adopt_fd(fd: RawFd) -> Result<OwnedFd> {
    if fd < 0 {
        return Err(TransportError::InvalidDescriptor(fd));
    }

    // SAFETY: F_GETFD only inspects the descriptor table entry for `fd`.
    if unsafe { libc::fcntl(fd, libc::F_GETFD) } < 0 {
        return Err(TransportError::InvalidDescriptor(fd));
    }

    // SAFETY: the caller guarantees exclusive ownership and we just checked it is open.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Create a connected pair of `SOCK_SEQPACKET` Unix sockets.
///
/// This is the descriptor type the host uses for its control and NPL links.
pub fn seqpacket_pair() -> Result<(OwnedFd, OwnedFd)> {
    let mut fds: [RawFd; 2] = [-1; 2];

    // SAFETY: `fds` is a valid two-element array for socketpair to fill.
    let rc = unsafe {
        libc::socketpair(
            libc::AF_UNIX,
            libc::SOCK_SEQPACKET,
            0,
            fds.as_mut_ptr(),
        )
    };
    if rc != 0 {
        return Err(TransportError::Io(std::io::Error::last_os_error()));
    }

    // SAFETY: socketpair succeeded, so both descriptors are open and owned by nobody else.
    let pair = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
    Ok(pair)
}

fn set_nonblocking(fd: RawFd) -> std::io::Result<()> {
    // SAFETY: F_GETFL/F_SETFL operate on an open descriptor owned by the caller.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error());
    }
    if flags & libc::O_NONBLOCK != 0 {
        return Ok(());
    }
    // SAFETY: see above.
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// A boundary-preserving message descriptor.
///
/// Each [`send`](Self::send) is exactly one `write` syscall and each
/// [`recv`](Self::recv) is exactly one `read` syscall, so on a
/// `SOCK_SEQPACKET` or datagram socket one call maps to one message.
pub struct MessageFd {
    inner: AsyncFd<File>,
    max_message_size: usize,
}

impl MessageFd {
    /// Wrap an owned descriptor. Switches it to non-blocking mode and
    /// registers it with the current tokio reactor.
    pub fn new(fd: OwnedFd, max_message_size: usize) -> Result<Self> {
        let raw = fd.as_raw_fd();
        set_nonblocking(raw).map_err(|source| TransportError::Register { fd: raw, source })?;
        let inner = AsyncFd::new(File::from(fd))
            .map_err(|source| TransportError::Register { fd: raw, source })?;
        debug!(fd = raw, max_message_size, "registered message descriptor");
        Ok(Self {
            inner,
            max_message_size,
        })
    }

    /// Receive the next message.
    ///
    /// Returns `Ok(None)` once the other end has closed the link. The
    /// returned buffer is sized to the message, not to
    /// [`max_message_size`](Self::max_message_size).
    pub async fn recv(&self) -> Result<Option<Bytes>> {
        let mut scratch = vec![0u8; self.max_message_size];
        let received = self.recv_into(&mut scratch).await?;
        Ok(received.map(|n| Bytes::copy_from_slice(&scratch[..n])))
    }

    /// Receive the next message into `scratch` and return its length.
    ///
    /// Lets a long-lived reader reuse one buffer across reads. A message
    /// longer than `scratch` is truncated by the kernel.
    pub async fn recv_into(&self, scratch: &mut [u8]) -> Result<Option<usize>> {
        loop {
            let mut guard = self.inner.readable().await?;
            let result = guard.try_io(|inner| {
                let mut file = inner.get_ref();
                file.read(scratch)
            });
            match result {
                Ok(Ok(0)) => return Ok(None),
                Ok(Ok(n)) => return Ok(Some(n)),
                Ok(Err(err)) if err.kind() == ErrorKind::Interrupted => continue,
                Ok(Err(err)) => {
                    // Wait for the next readiness edge instead of spinning on a sticky error.
                    guard.clear_ready();
                    return Err(TransportError::Io(err));
                }
                Err(_would_block) => continue,
            }
        }
    }

    /// Send one message with a single `write` syscall.
    pub async fn send(&self, payload: &[u8]) -> Result<()> {
        loop {
            let mut guard = self.inner.writable().await?;
            let result = guard.try_io(|inner| {
                let mut file = inner.get_ref();
                file.write(payload)
            });
            match result {
                Ok(Ok(n)) if n == payload.len() => return Ok(()),
                Ok(Ok(n)) => {
                    return Err(TransportError::ShortWrite {
                        expected: payload.len(),
                        actual: n,
                    })
                }
                Ok(Err(err)) if err.kind() == ErrorKind::Interrupted => continue,
                Ok(Err(err)) => return Err(TransportError::Io(err)),
                Err(_would_block) => continue,
            }
        }
    }

    /// Largest message [`recv`](Self::recv) will return in full.
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// The underlying descriptor number, for diagnostics.
    pub fn raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

impl std::fmt::Debug for MessageFd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageFd")
            .field("fd", &self.raw_fd())
            .field("max_message_size", &self.max_message_size)
            .finish()
    }
}
