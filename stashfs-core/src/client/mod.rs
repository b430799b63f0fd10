//! Client-side view of a stashfs group.

pub mod stream;

pub use stream::FileStream;

use crate::config::QuorumConfig;
use crate::consensus::{CommandId, Consensus};
use crate::contracts::{
    AcquireLockArgs, ContractResult, NewDirectoryArgs, NewVolumeArgs, ReleaseLockArgs,
    TouchFileArgs,
};
use crate::error::{Result, StashError};
use crate::model::{ClientId, Directory, FileMeta, GroupId, HostStash, Key, Volume};
use crate::operations::{NewBlockOperation, path_segments};
use crate::quorum::QuorumReader;
use crate::rpc::{DirectoryItem, ListDirectoryRequest, ListDirectoryResponse, PeerConnector};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

pub(crate) fn client_time() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Split `/vol/a/b.txt` into (`/vol/a`, `b.txt`).
fn split_parent(path: &str) -> Result<(String, String)> {
    let segments = path_segments(path);
    match segments.split_last() {
        Some((name, parent)) if !parent.is_empty() => {
            Ok((format!("/{}", parent.join("/")), name.to_string()))
        }
        _ => Err(StashError::InvalidRequest(format!(
            "path {:?} must name a volume and an entry",
            path
        ))),
    }
}

#[derive(Clone)]
pub struct StashFs {
    group: GroupId,
    client_id: ClientId,
    quorum: QuorumReader,
    new_block: NewBlockOperation,
}

impl StashFs {
    pub fn new(
        group: GroupId,
        client_id: ClientId,
        consensus: Arc<dyn Consensus>,
        connector: Arc<dyn PeerConnector>,
        config: &QuorumConfig,
    ) -> Self {
        let quorum = QuorumReader::new(consensus, connector, config);
        Self {
            group,
            client_id,
            new_block: NewBlockOperation::new(quorum.clone()),
            quorum,
        }
    }

    pub fn group(&self) -> GroupId {
        self.group
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub(crate) fn quorum(&self) -> &QuorumReader {
        &self.quorum
    }

    pub(crate) fn new_block(&self) -> &NewBlockOperation {
        &self.new_block
    }

    async fn exec<T: Serialize>(&self, command: CommandId, args: &T) -> Result<ContractResult> {
        let payload = serde_json::to_vec(args)?;
        let reply = self
            .quorum
            .consensus()
            .exec_command(self.group, command, payload)
            .await?;
        ContractResult::decode(&reply)
    }

    /// Majority listing of the directory at `path`.
    pub async fn ls(&self, path: &str) -> Result<ListDirectoryResponse> {
        let group = self.group;
        let request_path = path.to_string();
        self.quorum
            .majority(group, move |node| {
                let path = request_path.clone();
                async move {
                    let listing = node.list_directory(ListDirectoryRequest { group, path }).await?;
                    let feature = serde_json::to_vec(&listing)?;
                    Ok::<_, StashError>((listing, feature))
                }
            })
            .await
            .ok_or_else(|| StashError::QuorumFailure(format!("no agreed listing of {}", path)))
    }

    pub async fn new_volume(&self, name: &str, replications: u32, block_size: u32) -> Result<Volume> {
        self.exec(
            CommandId::NewVolume,
            &NewVolumeArgs {
                name: name.to_string(),
                replications,
                block_size,
            },
        )
        .await?
        .into_volume()
    }

    pub async fn mkdir(&self, parent_path: &str, name: &str) -> Result<Directory> {
        let parent = self.ls(parent_path).await?;
        self.exec(
            CommandId::NewDirectory,
            &NewDirectoryArgs {
                parent: parent.key,
                name: name.to_string(),
            },
        )
        .await?
        .into_directory()
    }

    pub async fn touch_file(&self, path: &str) -> Result<FileMeta> {
        let (parent_path, name) = split_parent(path)?;
        let parent = self.ls(&parent_path).await?;
        self.touch_in(&parent, &name).await
    }

    async fn touch_in(&self, parent: &ListDirectoryResponse, name: &str) -> Result<FileMeta> {
        self.exec(
            CommandId::TouchFile,
            &TouchFileArgs {
                volume: parent.volume.key,
                dir: parent.key,
                name: name.to_string(),
                client_time: client_time(),
            },
        )
        .await?
        .into_file()
    }

    /// Open the file at `path`, creating it when its directory lacks it.
    pub async fn open(&self, path: &str) -> Result<FileStream> {
        let (parent_path, name) = split_parent(path)?;
        let mut parent = self.ls(&parent_path).await?;

        if parent.find(&name).is_none() {
            let file = self.touch_in(&parent, &name).await?;
            tracing::info!("Created file {} key={}", path, file.key);
            parent = self.ls(&parent_path).await?;
        }

        match parent.find(&name) {
            Some(DirectoryItem::File(file)) => {
                FileStream::new(self.clone(), parent.volume.clone(), file.clone())
            }
            Some(DirectoryItem::Dir(_)) => Err(StashError::InvalidRequest(format!(
                "{} is a directory",
                path
            ))),
            None => Err(StashError::NotFound(format!("file {}", path))),
        }
    }

    /// Take or renew the write lock of `file`. `lease_until` is client time
    /// in milliseconds; `None` holds the lock until released.
    pub async fn acquire_write_lock(&self, file: Key, lease_until: Option<u64>) -> Result<()> {
        self.exec(
            CommandId::AcquireLock,
            &AcquireLockArgs {
                file,
                owner: self.client_id,
                client_time: client_time(),
                lease_until,
            },
        )
        .await?
        .into_ack()
    }

    pub async fn release_write_lock(&self, file: Key) -> Result<()> {
        self.exec(CommandId::ReleaseLock, &ReleaseLockArgs { file })
            .await?
            .into_ack()
    }

    pub async fn register_stash(&self, stash: &HostStash) -> Result<()> {
        self.exec(CommandId::RegStash, stash).await?.into_ack()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_parent() {
        assert_eq!(
            split_parent("/docs/a/b.txt").unwrap(),
            ("/docs/a".to_string(), "b.txt".to_string())
        );
        assert_eq!(
            split_parent("docs/b.txt").unwrap(),
            ("/docs".to_string(), "b.txt".to_string())
        );
        assert!(split_parent("/docs").is_err());
        assert!(split_parent("").is_err());
    }
}
