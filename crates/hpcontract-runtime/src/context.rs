use std::fmt;
use std::sync::Arc;

use hpcontract_channel::{ControlChannel, ControlMessage};
use tracing::debug;

use crate::args::{ExecutionMode, HotPocketArgs, LedgerInfo};
use crate::error::{ContractError, Result};
use crate::patch_config::{PatchConfig, PatchConfigData};
use crate::unl::UnlCollection;
use crate::users::UsersCollection;

/// Everything a contract entry point can see and do during one execution.
///
/// Cheap to clone; clones share the same channels.
#[derive(Clone)]
pub struct ContractContext {
    contract_id: String,
    public_key: String,
    private_key: String,
    timestamp: u64,
    mode: ExecutionMode,
    users: UsersCollection,
    unl: UnlCollection,
    control: Arc<ControlChannel>,
    patch: PatchConfig,
}

impl ContractContext {
    pub fn new(
        args: HotPocketArgs,
        users: UsersCollection,
        unl: UnlCollection,
        control: Arc<ControlChannel>,
    ) -> Self {
        Self {
            contract_id: args.contract_id,
            public_key: args.public_key,
            private_key: args.private_key,
            timestamp: args.timestamp,
            mode: args.mode,
            users,
            unl,
            control,
            patch: PatchConfig::default(),
        }
    }

    /// Use a patch config file other than [`PATCH_CONFIG_PATH`](crate::PATCH_CONFIG_PATH).
    pub fn with_patch_config(mut self, patch: PatchConfig) -> Self {
        self.patch = patch;
        self
    }

    pub fn contract_id(&self) -> &str {
        &self.contract_id
    }

    /// This node's public key.
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// This node's private key.
    pub fn private_key(&self) -> &str {
        &self.private_key
    }

    /// Consensus timestamp of this execution, in milliseconds.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn readonly(&self) -> bool {
        self.mode.is_readonly()
    }

    pub fn mode(&self) -> &ExecutionMode {
        &self.mode
    }

    /// The last closed ledger. `None` in readonly mode.
    pub fn ledger(&self) -> Option<&LedgerInfo> {
        match &self.mode {
            ExecutionMode::Consensus { ledger, .. } => Some(ledger),
            ExecutionMode::ReadOnly => None,
        }
    }

    pub fn users(&self) -> &UsersCollection {
        &self.users
    }

    pub fn unl(&self) -> &UnlCollection {
        &self.unl
    }

    /// Ask the host to connect to and disconnect from the given peers.
    ///
    /// Addresses are `"<host>:<port>"` and are passed through unchecked.
    /// Fails with [`ContractError::ChannelUnavailable`] in readonly mode.
    pub async fn update_peers(&self, add: Vec<String>, remove: Vec<String>) -> Result<()> {
        if self.readonly() {
            return Err(ContractError::ChannelUnavailable("control"));
        }
        debug!(add = add.len(), remove = remove.len(), "requesting peer changeset");
        self.control
            .send(&ControlMessage::peer_changeset(add, remove))
            .await?;
        Ok(())
    }

    pub async fn get_config(&self) -> Result<PatchConfigData> {
        Ok(self.patch.get_config().await?)
    }

    /// Validate `config` and write it as the new patch config.
    pub async fn update_config(&self, config: &PatchConfigData) -> Result<()> {
        self.patch.update_config(config).await?;
        Ok(())
    }
}

impl fmt::Debug for ContractContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractContext")
            .field("contract_id", &self.contract_id)
            .field("public_key", &self.public_key)
            .field(
                "private_key",
                &format_args!("<redacted:{} bytes>", self.private_key.len()),
            )
            .field("timestamp", &self.timestamp)
            .field("mode", &self.mode)
            .field("users", &self.users.count())
            .field("unl", &self.unl.count())
            .field("patch", &self.patch.path())
            .finish()
    }
}
