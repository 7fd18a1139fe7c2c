use std::os::fd::OwnedFd;

use bytes::Bytes;

use crate::error::Result;
use crate::framed::FramedChannel;

/// One message broadcast by a peer over the node party line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerMessage {
    /// Public key of the sending node.
    pub sender: String,
    pub payload: Bytes,
}

/// Pairs the host's two-datagram NPL delivery into [`PeerMessage`]s.
///
/// The host writes the sender's public key, then the payload, as two
/// separate messages. There is a single pairing slot for all senders: if
/// the host ever interleaved a second key before the first payload, the
/// payload would be attributed to the wrong sender. No check is made for
/// that; the host guarantees strict alternation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum PeerPairing {
    #[default]
    AwaitingIdentity,
    AwaitingPayload {
        sender: String,
    },
}

impl PeerPairing {
    /// Feed one raw read. Returns a message every second call.
    pub fn push(&mut self, buf: Bytes) -> Option<PeerMessage> {
        match std::mem::take(self) {
            Self::AwaitingIdentity => {
                *self = Self::AwaitingPayload {
                    sender: String::from_utf8_lossy(&buf).into_owned(),
                };
                None
            }
            Self::AwaitingPayload { sender } => Some(PeerMessage {
                sender,
                payload: buf,
            }),
        }
    }

    pub fn is_awaiting_payload(&self) -> bool {
        matches!(self, Self::AwaitingPayload { .. })
    }
}

/// The node party line: broadcast channel to the other UNL nodes.
#[derive(Debug)]
pub struct NplChannel {
    inner: FramedChannel,
}

impl NplChannel {
    pub fn new(fd: OwnedFd) -> Result<Self> {
        Ok(Self {
            inner: FramedChannel::new("npl", fd)?,
        })
    }

    /// Attach the read subscription, delivering paired peer messages.
    pub fn consume<F>(&self, mut on_message: F) -> Result<()>
    where
        F: FnMut(PeerMessage) + Send + 'static,
    {
        let mut pairing = PeerPairing::default();
        self.inner.consume(move |buf| {
            if let Some(message) = pairing.push(buf) {
                on_message(message);
            }
        })
    }

    /// Broadcast one payload. The host fans it out to every UNL node.
    pub async fn send(&self, payload: &[u8]) -> Result<()> {
        self.inner.send(payload).await
    }

    pub fn close(&self) {
        self.inner.close();
    }
}
