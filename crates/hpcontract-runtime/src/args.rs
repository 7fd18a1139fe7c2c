use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::os::fd::RawFd;

use hpcontract_channel::InputRange;
use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ArgsError;

/// A user's entry in the startup arguments.
///
/// The host writes it as one flat array: the output descriptor followed by
/// the user's input ranges, `[fd, [offset, length], ...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserArgs {
    pub output_fd: RawFd,
    pub inputs: Vec<InputRange>,
}

impl<'de> Deserialize<'de> for UserArgs {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct UserArgsVisitor;

        impl<'de> Visitor<'de> for UserArgsVisitor {
            type Value = UserArgs;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an array of [output_fd, [offset, length]...]")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<UserArgs, A::Error> {
                let output_fd = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let mut inputs = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(range) = seq.next_element()? {
                    inputs.push(range);
                }
                Ok(UserArgs { output_fd, inputs })
            }
        }

        deserializer.deserialize_seq(UserArgsVisitor)
    }
}

impl Serialize for UserArgs {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.inputs.len() + 1))?;
        seq.serialize_element(&self.output_fd)?;
        for range in &self.inputs {
            seq.serialize_element(range)?;
        }
        seq.end()
    }
}

/// Membership record of one UNL node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlStats {
    /// Ledger sequence number from which the node is active.
    pub active_on: u64,
}

/// The last closed ledger at the start of this execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerInfo {
    pub seq_no: u64,
    pub hash: String,
}

/// What kind of execution the host started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Serving read requests: no NPL, no UNL, no ledger position.
    ReadOnly,
    /// Executing a consensus round.
    Consensus {
        ledger: LedgerInfo,
        npl_fd: RawFd,
        unl: BTreeMap<String, UnlStats>,
    },
}

impl ExecutionMode {
    pub fn is_readonly(&self) -> bool {
        matches!(self, Self::ReadOnly)
    }
}

#[derive(Deserialize)]
struct RawArgs {
    contract_id: String,
    public_key: String,
    private_key: String,
    readonly: bool,
    timestamp: u64,
    control_fd: RawFd,
    #[serde(default)]
    npl_fd: Option<RawFd>,
    user_in_fd: RawFd,
    #[serde(default)]
    users: BTreeMap<String, UserArgs>,
    #[serde(default)]
    unl: BTreeMap<String, UnlStats>,
    #[serde(default)]
    lcl_seq_no: Option<u64>,
    #[serde(default)]
    lcl_hash: Option<String>,
}

/// The startup arguments the host writes to the contract's stdin.
#[derive(Clone, PartialEq, Eq)]
pub struct HotPocketArgs {
    pub contract_id: String,
    pub public_key: String,
    pub private_key: String,
    /// Consensus timestamp of this execution, in milliseconds.
    pub timestamp: u64,
    pub control_fd: RawFd,
    pub user_in_fd: RawFd,
    pub users: BTreeMap<String, UserArgs>,
    pub mode: ExecutionMode,
}

impl HotPocketArgs {
    /// Parse and validate the argument blob.
    pub fn parse(raw: &str) -> Result<Self, ArgsError> {
        let raw: RawArgs = serde_json::from_str(raw)?;
        Self::try_from(raw)
    }

    /// Every descriptor number this execution will take ownership of.
    pub fn descriptors(&self) -> Vec<RawFd> {
        let mut fds = vec![self.control_fd, self.user_in_fd];
        if let ExecutionMode::Consensus { npl_fd, .. } = &self.mode {
            fds.push(*npl_fd);
        }
        fds.extend(self.users.values().map(|user| user.output_fd));
        fds
    }

    fn ensure_unique_descriptors(&self) -> Result<(), ArgsError> {
        let mut seen = HashSet::new();
        for fd in self.descriptors() {
            if !seen.insert(fd) {
                return Err(ArgsError::DuplicateDescriptor(fd));
            }
        }
        Ok(())
    }
}

impl TryFrom<RawArgs> for HotPocketArgs {
    type Error = ArgsError;

    fn try_from(raw: RawArgs) -> Result<Self, Self::Error> {
        let mode = if raw.readonly {
            ExecutionMode::ReadOnly
        } else {
            let ledger = match (raw.lcl_seq_no, raw.lcl_hash) {
                (Some(seq_no), Some(hash)) => LedgerInfo { seq_no, hash },
                _ => return Err(ArgsError::MissingLedgerInfo),
            };
            let npl_fd = raw.npl_fd.ok_or(ArgsError::MissingNplDescriptor)?;
            ExecutionMode::Consensus {
                ledger,
                npl_fd,
                unl: raw.unl,
            }
        };

        let args = Self {
            contract_id: raw.contract_id,
            public_key: raw.public_key,
            private_key: raw.private_key,
            timestamp: raw.timestamp,
            control_fd: raw.control_fd,
            user_in_fd: raw.user_in_fd,
            users: raw.users,
            mode,
        };
        args.ensure_unique_descriptors()?;
        Ok(args)
    }
}

impl fmt::Debug for HotPocketArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HotPocketArgs")
            .field("contract_id", &self.contract_id)
            .field("public_key", &self.public_key)
            .field(
                "private_key",
                &format_args!("<redacted:{} bytes>", self.private_key.len()),
            )
            .field("timestamp", &self.timestamp)
            .field("control_fd", &self.control_fd)
            .field("user_in_fd", &self.user_in_fd)
            .field("users", &self.users)
            .field("mode", &self.mode)
            .finish()
    }
}
