/// Errors that can occur on a message channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// `consume` was called a second time on the same channel.
    #[error("channel already consumed")]
    AlreadyConsumed,

    /// The outbound message exceeds the channel's size cap.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Attempted to send an empty or null user message.
    #[error("cannot serialize null content")]
    NullPayload,

    /// Descriptor-level error.
    #[error("transport error: {0}")]
    Transport(#[from] hpcontract_transport::TransportError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ChannelError>;
