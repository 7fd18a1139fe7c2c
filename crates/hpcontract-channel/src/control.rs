use std::os::fd::OwnedFd;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::framed::FramedChannel;

/// CONTROL message type: change the set of peers the host connects to.
pub const PEER_CHANGESET: &str = "peer_changeset";

/// A control message exchanged with the host.
///
/// Only [`PEER_CHANGESET`] is produced by this crate; any other kind the
/// host sends is kept as raw fields for the caller to interpret.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControlMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Payload of a [`PEER_CHANGESET`] message. Addresses are `"<host>:<port>"`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerChangeset {
    #[serde(default)]
    pub add: Vec<String>,
    #[serde(default)]
    pub remove: Vec<String>,
}

impl ControlMessage {
    /// Create a peer changeset request.
    pub fn peer_changeset(add: Vec<String>, remove: Vec<String>) -> Self {
        let mut fields = serde_json::Map::new();
        fields.insert("add".to_string(), serde_json::Value::from(add));
        fields.insert("remove".to_string(), serde_json::Value::from(remove));
        Self {
            msg_type: PEER_CHANGESET.to_string(),
            fields,
        }
    }

    /// Decode one inbound control buffer.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(buf)?)
    }

    /// The changeset carried by this message, if it is one.
    pub fn as_peer_changeset(&self) -> Option<PeerChangeset> {
        if self.msg_type != PEER_CHANGESET {
            return None;
        }
        serde_json::from_value(serde_json::Value::Object(self.fields.clone())).ok()
    }
}

/// The control link to the host.
///
/// Outbound messages are serialized to compact JSON. Inbound buffers are
/// delivered raw; decoding them is up to the consumer.
#[derive(Debug)]
pub struct ControlChannel {
    inner: FramedChannel,
}

impl ControlChannel {
    pub fn new(fd: OwnedFd) -> Result<Self> {
        Ok(Self {
            inner: FramedChannel::new("control", fd)?,
        })
    }

    /// Attach the read subscription. See [`FramedChannel::consume`].
    pub fn consume<F>(&self, on_message: F) -> Result<()>
    where
        F: FnMut(Bytes) + Send + 'static,
    {
        self.inner.consume(on_message)
    }

    /// Serialize `message` and send it as one control message.
    pub async fn send<T: Serialize + ?Sized>(&self, message: &T) -> Result<()> {
        let buf = serde_json::to_vec(message)?;
        self.inner.send(&buf).await
    }

    pub fn close(&self) {
        self.inner.close();
    }
}
