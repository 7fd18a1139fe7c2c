//! Message channels between a contract process and the HotPocket host.
//!
//! Two framing disciplines live here:
//! - Control and NPL channels sit on boundary-preserving sockets, so one
//!   write is one message and no length prefix is needed. Outbound
//!   messages are capped at [`MAX_MESSAGE_SIZE`].
//! - User output is a byte stream, so every message is prefixed with a
//!   4-byte big-endian length header.
//!
//! User inputs are not a channel at all: they are byte ranges inside one
//! shared file, read with positioned reads.

pub mod codec;
pub mod control;
pub mod error;
pub mod framed;
pub mod input;
pub mod npl;
pub mod user;

pub use codec::{
    decode_user_frame, encode_user_frame, ClientProtocol, Message, MAX_MESSAGE_SIZE,
    USER_HEADER_SIZE,
};
pub use control::{ControlChannel, ControlMessage, PeerChangeset, PEER_CHANGESET};
pub use error::{ChannelError, Result};
pub use framed::FramedChannel;
pub use input::{InputRange, UserInputReader};
pub use npl::{NplChannel, PeerMessage, PeerPairing};
pub use user::UserChannel;
