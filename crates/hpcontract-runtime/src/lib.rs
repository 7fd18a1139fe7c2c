//! Execution lifecycle for HotPocket smart contracts.
//!
//! This is the layer contract code talks to. [`HotPocketContract`] reads the
//! host's startup arguments, opens every channel, hands a
//! [`ContractContext`] to the contract entry point, waits for all
//! background peer-message handlers, then closes the channels.
//!
//! ```ignore
//! use hpcontract_runtime::{ContractContext, HotPocketContract};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let contract = HotPocketContract::new();
//!     let _ = contract
//!         .init(|ctx: ContractContext| async move {
//!             for user in ctx.users().list() {
//!                 for range in user.inputs() {
//!                     let input = ctx.users().read(*range).await?;
//!                     user.send(input).await?;
//!                 }
//!             }
//!             Ok(())
//!         })
//!         .await;
//! }
//! ```

pub mod args;
pub mod context;
pub mod contract;
pub mod error;
pub mod patch_config;
pub mod tasks;
pub mod unl;
pub mod users;

pub use args::{ExecutionMode, HotPocketArgs, LedgerInfo, UnlStats, UserArgs};
pub use context::ContractContext;
pub use contract::{ContractConfig, HotPocketContract, LifecycleState, SelfInterrupt, ShutdownHook};
pub use error::{ArgsError, BoxError, ConfigError, ContractError, InitError, Result};
pub use patch_config::{
    ConsensusConfig, PatchConfig, PatchConfigData, PeerMode, NplConfig, RoundLimits,
    PATCH_CONFIG_PATH,
};
pub use tasks::{DrainReport, PendingTasks};
pub use unl::{UnlCollection, UnlNode};
pub use users::{User, UsersCollection};

pub use hpcontract_channel::{ClientProtocol, InputRange, Message};
