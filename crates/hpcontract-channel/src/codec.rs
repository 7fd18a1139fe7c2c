use std::fmt;
use std::str::FromStr;

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use crate::error::{ChannelError, Result};

/// Largest outbound message on the control and NPL channels: 128 KiB.
pub const MAX_MESSAGE_SIZE: usize = 128 * 1024;

/// User output header: payload length as a 4-byte big-endian integer.
pub const USER_HEADER_SIZE: usize = 4;

/// Largest payload the user output header can describe.
const MAX_USER_PAYLOAD: usize = u32::MAX as usize;

/// A message handed to a channel by contract code.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Raw bytes, always passed through untouched.
    Binary(Bytes),
    /// A text message.
    Text(String),
    /// A structured value.
    Value(serde_json::Value),
}

impl Message {
    /// Build a structured message from any serializable value.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Self::Value(serde_json::to_value(value)?))
    }

    /// True for messages that carry nothing: empty bytes, empty text or null.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Binary(bytes) => bytes.is_empty(),
            Self::Text(text) => text.is_empty(),
            Self::Value(value) => value.is_null(),
        }
    }

    /// Plain encoding used on the NPL channel: bytes as-is, text as UTF-8,
    /// values as compact JSON.
    pub fn to_bytes(&self) -> Result<Bytes> {
        match self {
            Self::Binary(bytes) => Ok(bytes.clone()),
            Self::Text(text) => Ok(Bytes::copy_from_slice(text.as_bytes())),
            Self::Value(value) => Ok(Bytes::from(serde_json::to_vec(value)?)),
        }
    }
}

impl From<Bytes> for Message {
    fn from(value: Bytes) -> Self {
        Self::Binary(value)
    }
}

impl From<Vec<u8>> for Message {
    fn from(value: Vec<u8>) -> Self {
        Self::Binary(Bytes::from(value))
    }
}

impl From<&[u8]> for Message {
    fn from(value: &[u8]) -> Self {
        Self::Binary(Bytes::copy_from_slice(value))
    }
}

impl From<String> for Message {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Message {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<serde_json::Value> for Message {
    fn from(value: serde_json::Value) -> Self {
        Self::Value(value)
    }
}

/// Encoding applied to user output messages. Resolved once per process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientProtocol {
    /// Text and values are written as JSON documents.
    #[default]
    Json,
    /// Clients speak BSON; contract code hands over pre-encoded content,
    /// so text is copied byte for byte.
    Bson,
}

impl ClientProtocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Bson => "bson",
        }
    }

    /// Serialize a user message for this protocol.
    ///
    /// Binary messages pass through regardless of protocol.
    pub fn encode(self, message: &Message) -> Result<Bytes> {
        if message.is_empty() {
            return Err(ChannelError::NullPayload);
        }

        match (self, message) {
            (_, Message::Binary(bytes)) => Ok(bytes.clone()),
            (Self::Bson, Message::Text(text)) => Ok(Bytes::copy_from_slice(text.as_bytes())),
            (Self::Bson, Message::Value(value)) => Ok(Bytes::from(serde_json::to_vec(value)?)),
            (Self::Json, Message::Text(text)) => Ok(Bytes::from(serde_json::to_vec(text)?)),
            (Self::Json, Message::Value(value)) => Ok(Bytes::from(serde_json::to_vec(value)?)),
        }
    }
}

impl fmt::Display for ClientProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientProtocol {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "bson" => Ok(Self::Bson),
            other => Err(format!("unknown client protocol: {other}")),
        }
    }
}

/// Fail fast when a control or NPL message would exceed the host's cap.
pub fn ensure_within_limit(size: usize) -> Result<()> {
    if size > MAX_MESSAGE_SIZE {
        return Err(ChannelError::MessageTooLarge {
            size,
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(())
}

fn user_frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(USER_HEADER_SIZE)
        .big_endian()
        .max_frame_length(MAX_USER_PAYLOAD)
        .new_codec()
}

/// Encode a user output frame.
///
/// Wire format:
/// ```text
/// ┌──────────────┬─────────────────┐
/// │ Length       │ Payload         │
/// │ (4B BE)      │ (Length bytes)  │
/// └──────────────┴─────────────────┘
/// ```
pub fn encode_user_frame(payload: Bytes, dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_USER_PAYLOAD {
        return Err(ChannelError::MessageTooLarge {
            size: payload.len(),
            max: MAX_USER_PAYLOAD,
        });
    }
    user_frame_codec()
        .encode(payload, dst)
        .map_err(|err| ChannelError::Transport(err.into()))
}

/// Decode one user output frame, as the host does.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
pub fn decode_user_frame(src: &mut BytesMut) -> Result<Option<Bytes>> {
    let frame = user_frame_codec()
        .decode(src)
        .map_err(|err| ChannelError::Transport(err.into()))?;
    Ok(frame.map(BytesMut::freeze))
}
