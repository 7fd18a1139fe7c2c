use std::os::fd::RawFd;
use std::path::PathBuf;

use hpcontract_channel::ChannelError;
use hpcontract_transport::TransportError;

/// Error type returned by contract entry points and peer-message handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced to contract code by context operations.
#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    /// The operation needs a channel that does not exist in this execution mode.
    #[error("{0} not available in readonly mode")]
    ChannelUnavailable(&'static str),

    /// Channel-level error.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Patch config error.
    #[error("patch config error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors in the host's startup argument blob.
#[derive(Debug, thiserror::Error)]
pub enum ArgsError {
    /// The blob is not valid JSON or does not match the expected shape.
    #[error("invalid hotpocket args: {0}")]
    Json(#[from] serde_json::Error),

    /// The same descriptor number is assigned to more than one channel.
    #[error("descriptor {0} assigned to more than one channel")]
    DuplicateDescriptor(RawFd),

    /// Consensus execution without last-closed-ledger information.
    #[error("lcl_seq_no and lcl_hash are required outside readonly mode")]
    MissingLedgerInfo,

    /// Consensus execution without an NPL descriptor.
    #[error("npl_fd is required outside readonly mode")]
    MissingNplDescriptor,
}

/// Reasons [`HotPocketContract::init`](crate::HotPocketContract::init) did not run the contract.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("contract already initialized")]
    AlreadyInitialized,

    /// stdin is a terminal: the process was not started by the host.
    #[error("HotPocket smart contracts must be executed via HotPocket")]
    Interactive,

    #[error("failed reading hotpocket args: {0}")]
    ReadArgs(std::io::Error),

    #[error(transparent)]
    Args(#[from] ArgsError),

    #[error("failed opening host descriptor: {0}")]
    Transport(#[from] TransportError),

    #[error("failed opening channel: {0}")]
    Channel(#[from] ChannelError),
}

/// Errors loading, validating or saving the patch config.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("patch config file does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("patch config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("patch config is not valid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("contract version is not specified")]
    MissingVersion,

    #[error("unl list cannot be empty")]
    EmptyUnl,

    #[error("unl public key not specified")]
    EmptyUnlKey,

    #[error("invalid unl public key specified: {0}")]
    InvalidUnlKey(String),

    #[error("binary path cannot be empty")]
    EmptyBinPath,

    #[error("round time must be between 1 and 3600000ms inclusive (got {0})")]
    RoundTime(u64),

    #[error("stage slice must be between 1 and 33 percent inclusive (got {0})")]
    StageSlice(u32),

    #[error("consensus threshold must be between 1 and 100 percent inclusive (got {0})")]
    Threshold(u32),
}

pub type Result<T> = std::result::Result<T, ContractError>;
