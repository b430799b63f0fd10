//! Seam between Stashfs and the replicated log engine.
//!
//! The engine orders commands per group and hands each committed entry to
//! every member's [`StateMachine`]; Stashfs only submits commands and reads
//! membership.

pub mod local;

pub use local::LocalConsensus;

use crate::error::{Result, StashError};
use crate::model::{GroupId, HostId, HostInfo};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u64)]
pub enum CommandId {
    NewVolume = 1,
    NewDirectory = 2,
    TouchFile = 3,
    CommitBlock = 4,
    ConfirmBlock = 5,
    AcquireLock = 6,
    ReleaseLock = 7,
    RegStash = 8,
}

impl CommandId {
    pub fn as_u64(self) -> u64 {
        self as u64
    }

    pub fn from_u64(value: u64) -> Result<Self> {
        match value {
            1 => Ok(Self::NewVolume),
            2 => Ok(Self::NewDirectory),
            3 => Ok(Self::TouchFile),
            4 => Ok(Self::CommitBlock),
            5 => Ok(Self::ConfirmBlock),
            6 => Ok(Self::AcquireLock),
            7 => Ok(Self::ReleaseLock),
            8 => Ok(Self::RegStash),
            other => Err(StashError::Decode(format!("unknown command id {}", other))),
        }
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NewVolume => "NEW_VOLUME",
            Self::NewDirectory => "NEW_DIRECTORY",
            Self::TouchFile => "TOUCH_FILE",
            Self::CommitBlock => "COMMIT_BLOCK",
            Self::ConfirmBlock => "CONFIRM_BLOCK",
            Self::AcquireLock => "ACQUIRE_LOCK",
            Self::ReleaseLock => "RELEASE_LOCK",
            Self::RegStash => "REG_STASH",
        };
        f.write_str(name)
    }
}

/// Metadata of the committed entry a contract is applied for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub group: GroupId,
    pub index: u64,
    pub hash: [u8; 32],
}

/// Deterministic handler invoked once per committed entry.
pub trait StateMachine: Send + Sync {
    fn apply(&self, command: CommandId, payload: &[u8], entry: &LogEntry) -> Vec<u8>;
}

#[async_trait]
pub trait Consensus: Send + Sync {
    /// Submit a command and wait for the group-agreed reply.
    async fn exec_command(
        &self,
        group: GroupId,
        command: CommandId,
        payload: Vec<u8>,
    ) -> Result<Vec<u8>>;

    async fn group_members(&self, group: GroupId) -> Result<Vec<HostInfo>>;

    async fn host(&self, host_id: HostId) -> Result<Option<HostInfo>>;
}
