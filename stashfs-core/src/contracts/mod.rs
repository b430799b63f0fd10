//! Deterministic handlers applied once per committed log entry.
//!
//! Every contract runs inside a single metadata transaction and reads time
//! only from its argument, so all replicas of a group reach the same state
//! and produce the same reply bytes.

mod block;
mod lock;
mod namespace;
pub mod pending;

pub use pending::{PendingConfirmations, PendingKey};

use crate::config::VolumePolicy;
use crate::consensus::{CommandId, LogEntry, StateMachine};
use crate::error::{ErrorKind, Result, StashError};
use crate::model::{ClientId, Directory, FileMeta, GroupId, HostId, HostStash, Key, Volume};
use crate::storage::KvStore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVolumeArgs {
    pub name: String,
    pub replications: u32,
    pub block_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDirectoryArgs {
    pub parent: Key,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TouchFileArgs {
    pub volume: Key,
    pub dir: Key,
    pub name: String,
    pub client_time: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquireLockArgs {
    pub file: Key,
    pub owner: ClientId,
    pub client_time: u64,
    #[serde(default)]
    pub lease_until: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseLockArgs {
    pub file: Key,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmBlockArgs {
    pub group: GroupId,
    pub index: u64,
    pub file: Key,
    pub node_id: HostId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitBlockArgs {
    pub index: u64,
    pub file: Key,
    pub node_ids: Vec<HostId>,
    pub client_time: u64,
}

/// Reply bytes of every contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "body", rename_all = "snake_case")]
pub enum ContractResult {
    Ack,
    Volume(Volume),
    Dir(Directory),
    File(FileMeta),
    Rejected { kind: ErrorKind, reason: String },
}

impl ContractResult {
    pub fn rejected(error: &StashError) -> Self {
        Self::Rejected {
            kind: error.kind(),
            reason: error.to_string(),
        }
    }

    /// Reply bytes for the log. A reply that cannot be encoded is replaced
    /// by an internal rejection, so callers always get a decodable reply.
    pub fn encode(&self) -> Vec<u8> {
        match serde_json::to_vec(self) {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::error!("Failed to encode contract reply: {}", error);
                encode_rejection(format!("unencodable reply: {}", error))
            }
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|error| StashError::Decode(format!("invalid contract reply: {}", error)))
    }

    /// Turn a rejection back into a typed error.
    pub fn into_result(self) -> Result<Self> {
        match self {
            Self::Rejected { kind, reason } => Err(StashError::from_kind(kind, reason)),
            other => Ok(other),
        }
    }

    pub fn into_file(self) -> Result<FileMeta> {
        match self.into_result()? {
            Self::File(file) => Ok(file),
            other => Err(unexpected("file", &other)),
        }
    }

    pub fn into_volume(self) -> Result<Volume> {
        match self.into_result()? {
            Self::Volume(volume) => Ok(volume),
            other => Err(unexpected("volume", &other)),
        }
    }

    pub fn into_directory(self) -> Result<Directory> {
        match self.into_result()? {
            Self::Dir(directory) => Ok(directory),
            other => Err(unexpected("directory", &other)),
        }
    }

    pub fn into_ack(self) -> Result<()> {
        match self.into_result()? {
            Self::Ack => Ok(()),
            other => Err(unexpected("ack", &other)),
        }
    }
}

/// Built from a JSON literal so it cannot fail the way the reply did.
fn encode_rejection(reason: String) -> Vec<u8> {
    serde_json::json!({
        "status": "rejected",
        "body": { "kind": "internal", "reason": reason },
    })
    .to_string()
    .into_bytes()
}

fn unexpected(wanted: &str, got: &ContractResult) -> StashError {
    StashError::Decode(format!("expected {} reply, got {:?}", wanted, got))
}

fn decode_args<T: DeserializeOwned>(command: CommandId, payload: &[u8]) -> Result<T> {
    serde_json::from_slice(payload)
        .map_err(|error| StashError::Decode(format!("bad {} payload: {}", command, error)))
}

/// The metadata state machine of one node.
pub struct Contracts {
    store: Arc<KvStore>,
    pending: Arc<PendingConfirmations>,
    policy: VolumePolicy,
}

impl Contracts {
    pub fn new(
        store: Arc<KvStore>,
        pending: Arc<PendingConfirmations>,
        policy: VolumePolicy,
    ) -> Self {
        Self {
            store,
            pending,
            policy,
        }
    }

    pub fn store(&self) -> &Arc<KvStore> {
        &self.store
    }

    pub fn pending(&self) -> &Arc<PendingConfirmations> {
        &self.pending
    }

    fn dispatch(
        &self,
        command: CommandId,
        payload: &[u8],
        entry: &LogEntry,
    ) -> Result<ContractResult> {
        match command {
            CommandId::NewVolume => self.new_volume(decode_args(command, payload)?, entry),
            CommandId::NewDirectory => self.new_directory(decode_args(command, payload)?, entry),
            CommandId::TouchFile => self.touch_file(decode_args(command, payload)?, entry),
            CommandId::AcquireLock => self.acquire_lock(decode_args(command, payload)?, entry),
            CommandId::ReleaseLock => self.release_lock(decode_args(command, payload)?, entry),
            CommandId::ConfirmBlock => self.confirm_block(decode_args(command, payload)?, entry),
            CommandId::CommitBlock => self.commit_block(decode_args(command, payload)?, entry),
            CommandId::RegStash => {
                self.register_stash(decode_args::<HostStash>(command, payload)?, entry)
            }
        }
    }
}

impl StateMachine for Contracts {
    fn apply(&self, command: CommandId, payload: &[u8], entry: &LogEntry) -> Vec<u8> {
        let result = match self.dispatch(command, payload, entry) {
            Ok(result) => {
                tracing::debug!(
                    "Applied {} group={} index={}",
                    command,
                    entry.group,
                    entry.index
                );
                result
            }
            Err(error) => {
                tracing::warn!(
                    "Rejected {} group={} index={} error={}",
                    command,
                    entry.group,
                    entry.index,
                    error
                );
                ContractResult::rejected(&error)
            }
        };
        result.encode()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_garbage_payload_is_rejected_not_fatal() {
        let contracts = contracts();
        let reply = contracts.apply(CommandId::TouchFile, b"not json", &entry(1));
        match ContractResult::decode(&reply).unwrap() {
            ContractResult::Rejected { kind, .. } => assert_eq!(kind, ErrorKind::Decode),
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn test_rejection_rebuilds_typed_error() {
        let reply = ContractResult::rejected(&StashError::Conflict("held".to_string()));
        let bytes = reply.encode();
        let err = ContractResult::decode(&bytes)
            .unwrap()
            .into_ack()
            .unwrap_err();
        assert!(matches!(err, StashError::Conflict(_)));
    }

    #[test]
    fn test_encode_fallback_is_a_rejection() {
        let bytes = encode_rejection("boom".to_string());
        let err = ContractResult::decode(&bytes)
            .unwrap()
            .into_file()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.to_string().contains("boom"));
    }
}
