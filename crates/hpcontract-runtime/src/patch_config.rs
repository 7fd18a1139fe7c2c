use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

/// Where the host places the patch config, relative to the contract's working directory.
pub const PATCH_CONFIG_PATH: &str = "../patch.cfg";

const UNL_KEY_LEN: usize = 66;
const MAX_ROUNDTIME_MS: u64 = 3_600_000;
const MAX_STAGE_SLICE: u32 = 33;
const MAX_THRESHOLD: u32 = 100;

/// Visibility of a consensus or NPL subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerMode {
    Public,
    Private,
}

impl PeerMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    pub mode: PeerMode,
    /// Round time in milliseconds.
    pub roundtime: u64,
    /// Stage slice as a percentage of the round time.
    pub stage_slice: u32,
    /// Consensus threshold percentage.
    pub threshold: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NplConfig {
    pub mode: PeerMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundLimits {
    pub user_input_bytes: u64,
    pub user_output_bytes: u64,
    pub npl_output_bytes: u64,
    pub proc_cpu_seconds: u64,
    pub proc_mem_bytes: u64,
    pub proc_ofd_count: u64,
}

/// Contents of the patch config file.
///
/// Fields the host writes that are not modelled here are kept in `extra`
/// and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchConfigData {
    pub version: String,
    pub unl: Vec<String>,
    pub bin_path: String,
    pub consensus: ConsensusConfig,
    pub npl: NplConfig,
    pub round_limits: RoundLimits,
    pub max_input_ledger_offset: u64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PatchConfigData {
    /// Check every field the host would reject.
    ///
    /// Mode values and non-negative limits are already enforced by the types.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version.is_empty() {
            return Err(ConfigError::MissingVersion);
        }
        if self.unl.is_empty() {
            return Err(ConfigError::EmptyUnl);
        }
        for key in &self.unl {
            if key.is_empty() {
                return Err(ConfigError::EmptyUnlKey);
            }
            if !is_unl_key(key) {
                return Err(ConfigError::InvalidUnlKey(key.clone()));
            }
        }
        if self.bin_path.is_empty() {
            return Err(ConfigError::EmptyBinPath);
        }

        let consensus = &self.consensus;
        if !(1..=MAX_ROUNDTIME_MS).contains(&consensus.roundtime) {
            return Err(ConfigError::RoundTime(consensus.roundtime));
        }
        if !(1..=MAX_STAGE_SLICE).contains(&consensus.stage_slice) {
            return Err(ConfigError::StageSlice(consensus.stage_slice));
        }
        if !(1..=MAX_THRESHOLD).contains(&consensus.threshold) {
            return Err(ConfigError::Threshold(consensus.threshold));
        }
        Ok(())
    }
}

/// `ed` prefix (any case) followed by 64 hex digits.
fn is_unl_key(key: &str) -> bool {
    key.len() == UNL_KEY_LEN
        && key.as_bytes()[..2].eq_ignore_ascii_case(b"ed")
        && key.as_bytes()[2..].iter().all(u8::is_ascii_hexdigit)
}

/// Access to the patch config file.
#[derive(Debug, Clone)]
pub struct PatchConfig {
    path: PathBuf,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self::new(PATCH_CONFIG_PATH)
    }
}

impl PatchConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the current config. Fails with [`ConfigError::NotFound`] when
    /// the host has not written one.
    pub async fn get_config(&self) -> Result<PatchConfigData, ConfigError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(self.path.clone()));
            }
            Err(err) => return Err(err.into()),
        };
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Validate `config` and overwrite the file with it.
    ///
    /// Output uses 4-space indentation, the layout the host writes at startup.
    pub async fn update_config(&self, config: &PatchConfigData) -> Result<(), ConfigError> {
        config.validate()?;

        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        config.serialize(&mut serializer)?;

        tokio::fs::write(&self.path, &buf).await?;
        debug!(path = %self.path.display(), size = buf.len(), "patch config updated");
        Ok(())
    }
}
