//! SDK for writing HotPocket smart contracts in Rust.
//!
//! A contract is an ordinary process started by the HotPocket host once per
//! consensus round (or once per read request). The host passes its startup
//! arguments on stdin and a set of inherited descriptors: a control channel,
//! the node party line (NPL) to the other UNL nodes, one output stream per
//! connected user, and a shared file holding every user's inputs.
//!
//! # Crate Structure
//!
//! - [`transport`]: descriptor ownership and raw reads/writes
//! - [`channel`]: control, NPL and user channels with their wire formats
//! - [`runtime`]: argument parsing, the contract context and the execution lifecycle
//!
//! The most used runtime types are re-exported at the crate root.

/// Re-export transport types.
pub mod transport {
    pub use hpcontract_transport::*;
}

/// Re-export channel types.
pub mod channel {
    pub use hpcontract_channel::*;
}

/// Re-export runtime types.
pub mod runtime {
    pub use hpcontract_runtime::*;
}

pub use hpcontract_runtime::{
    BoxError, ClientProtocol, ContractConfig, ContractContext, ContractError, HotPocketContract,
    InitError, InputRange, Message, PatchConfig, PatchConfigData, User, UnlNode,
};
