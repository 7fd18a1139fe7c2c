use std::os::fd::RawFd;

/// Errors that can occur in descriptor I/O.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The descriptor number is negative or not open in this process.
    #[error("invalid descriptor {0}")]
    InvalidDescriptor(RawFd),

    /// The descriptor could not be attached to the async reactor.
    #[error("failed to register descriptor {fd}: {source}")]
    Register { fd: RawFd, source: std::io::Error },

    /// A positioned read returned fewer bytes than requested.
    #[error("short read ({actual} of {expected} bytes)")]
    ShortRead { expected: usize, actual: usize },

    /// A message write was only partially accepted by the descriptor.
    #[error("short write ({actual} of {expected} bytes)")]
    ShortWrite { expected: usize, actual: usize },

    /// An I/O error occurred on the descriptor.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
