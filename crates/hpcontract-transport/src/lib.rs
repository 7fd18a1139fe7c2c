//! Descriptor ownership and raw I/O for HotPocket contract processes.
//!
//! The host opens every descriptor before the contract process starts and
//! passes their numbers in the startup arguments. This crate adopts those
//! numbers into owned handles and offers the three I/O shapes the host uses:
//! - [`MessageFd`]: boundary-preserving sockets (one write = one read event)
//! - [`OutputFd`]: stream descriptors written with whole buffers
//! - [`InputFile`]: a shared file read with positioned reads
//!
//! This is the lowest layer. Everything else builds on these handles.

pub mod error;
pub mod fd;
pub mod input;
pub mod output;

pub use error::{Result, TransportError};
pub use fd::{adopt_fd, seqpacket_pair, MessageFd};
pub use input::InputFile;
pub use output::OutputFd;
