use std::os::fd::{OwnedFd, RawFd};

use bytes::BytesMut;
use hpcontract_transport::OutputFd;
use tracing::trace;

use crate::codec::{encode_user_frame, ClientProtocol, Message, USER_HEADER_SIZE};
use crate::error::Result;

/// Output channel to one connected user.
///
/// The descriptor is a plain byte stream, so every message is written as a
/// length-prefixed frame: header and payload leave in one write so the host
/// always sees them together.
#[derive(Debug, Clone)]
pub struct UserChannel {
    out: OutputFd,
    protocol: ClientProtocol,
}

impl UserChannel {
    pub fn new(fd: OwnedFd, protocol: ClientProtocol) -> Self {
        Self {
            out: OutputFd::new(fd),
            protocol,
        }
    }

    /// Serialize `message` with the configured protocol and write one frame.
    pub async fn send(&self, message: &Message) -> Result<()> {
        let payload = self.protocol.encode(message)?;
        let size = payload.len();
        let mut frame = BytesMut::with_capacity(USER_HEADER_SIZE + size);
        encode_user_frame(payload, &mut frame)?;
        self.out.write_all(frame.freeze()).await?;
        trace!(fd = self.out.raw_fd(), size, "user message sent");
        Ok(())
    }

    pub fn protocol(&self) -> ClientProtocol {
        self.protocol
    }

    pub fn raw_fd(&self) -> RawFd {
        self.out.raw_fd()
    }
}
