//! Majority reads across the members of a group.

use crate::config::QuorumConfig;
use crate::consensus::Consensus;
use crate::error::Result;
use crate::model::{GroupId, HostInfo};
use crate::rpc::{PeerConnector, StorageNode};
use crate::storage::compute_hash;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct QuorumReader {
    consensus: Arc<dyn Consensus>,
    connector: Arc<dyn PeerConnector>,
    timeout: Duration,
}

impl QuorumReader {
    pub fn new(
        consensus: Arc<dyn Consensus>,
        connector: Arc<dyn PeerConnector>,
        config: &QuorumConfig,
    ) -> Self {
        Self {
            consensus,
            connector,
            timeout: config.call_timeout(),
        }
    }

    pub fn consensus(&self) -> &Arc<dyn Consensus> {
        &self.consensus
    }

    pub fn connector(&self) -> &Arc<dyn PeerConnector> {
        &self.connector
    }

    /// Issue `request` to every current member of `group` and return the value
    /// whose feature bytes most members agree on.
    ///
    /// Never fails: missing membership, unreachable hosts and timeouts only
    /// shrink the vote, and zero replies yield `None`.
    pub async fn majority<T, F, Fut>(&self, group: GroupId, request: F) -> Option<T>
    where
        T: Send + 'static,
        F: Fn(Arc<dyn StorageNode>) -> Fut,
        Fut: Future<Output = Result<(T, Vec<u8>)>> + Send + 'static,
    {
        let members = match self.consensus.group_members(group).await {
            Ok(members) => members,
            Err(error) => {
                tracing::warn!("Failed to load members of group={} error={}", group, error);
                return None;
            }
        };
        self.majority_among(&members, request).await
    }

    pub async fn majority_among<T, F, Fut>(&self, hosts: &[HostInfo], request: F) -> Option<T>
    where
        T: Send + 'static,
        F: Fn(Arc<dyn StorageNode>) -> Fut,
        Fut: Future<Output = Result<(T, Vec<u8>)>> + Send + 'static,
    {
        let mut calls = Vec::with_capacity(hosts.len());
        for host in hosts {
            match self.connector.connect(host) {
                Ok(node) => calls.push((host.id, tokio::spawn(request(node)))),
                Err(error) => {
                    tracing::warn!("Skipping host={} in quorum read: {}", host.id, error);
                }
            }
        }

        // A timed-out call keeps running detached; its reply is just not counted.
        let timeout = self.timeout;
        let votes = join_all(calls.into_iter().map(|(host_id, call)| async move {
            match tokio::time::timeout(timeout, call).await {
                Ok(Ok(Ok(reply))) => Some(reply),
                Ok(Ok(Err(error))) => {
                    tracing::debug!("Host {} declined quorum read: {}", host_id, error);
                    None
                }
                Ok(Err(error)) => {
                    tracing::warn!("Quorum read task on host={} failed: {}", host_id, error);
                    None
                }
                Err(_) => {
                    tracing::warn!(
                        "Quorum read on host={} timed out after {:?}",
                        host_id,
                        timeout
                    );
                    None
                }
            }
        }))
        .await;

        pick_majority(votes.into_iter().flatten().collect())
    }
}

/// Pick the value whose hashed feature has a strict plurality, else the first
/// value received, else `None`.
pub fn pick_majority<T>(replies: Vec<(T, Vec<u8>)>) -> Option<T> {
    let hashes: Vec<String> = replies
        .iter()
        .map(|(_, feature)| compute_hash(feature))
        .collect();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for hash in &hashes {
        *counts.entry(hash.as_str()).or_default() += 1;
    }

    let top = counts.values().copied().max().unwrap_or(0);
    let leaders: Vec<&str> = counts
        .iter()
        .filter(|(_, count)| **count == top)
        .map(|(hash, _)| *hash)
        .collect();

    let position = match leaders.as_slice() {
        [winner] => hashes.iter().position(|hash| hash == winner),
        _ => None,
    }
    .unwrap_or(0);

    replies.into_iter().nth(position).map(|(value, _)| value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::{CommandId, LocalConsensus, LogEntry, StateMachine};
    use crate::error::StashError;
    use crate::model::{BlockData, Directory, FileMeta, HostStash, Key, Volume};
    use crate::rpc::{
        AppendToBlockRequest, BlockRequest, GetDirectoryRequest, GetFileMetaRequest,
        GetVolumeRequest, ListDirectoryRequest, ListDirectoryResponse, LocalConnector,
        SuggestBlockStashRequest, WriteResult,
    };
    use async_trait::async_trait;

    /// Answers `get_volume` with a fixed block size after an optional delay.
    struct FakeNode {
        block_size: Option<u32>,
        delay: Duration,
    }

    fn unsupported<T>() -> Result<T> {
        Err(StashError::Internal("unsupported".to_string()))
    }

    #[async_trait]
    impl StorageNode for FakeNode {
        async fn list_directory(&self, _: ListDirectoryRequest) -> Result<ListDirectoryResponse> {
            unsupported()
        }

        async fn get_file_meta(&self, _: GetFileMetaRequest) -> Result<FileMeta> {
            unsupported()
        }

        async fn get_volume(&self, request: GetVolumeRequest) -> Result<Volume> {
            tokio::time::sleep(self.delay).await;
            let block_size = self
                .block_size
                .ok_or_else(|| StashError::NotFound(request.name.clone()))?;
            Ok(Volume {
                name: request.name,
                key: Key::default(),
                replications: 5,
                block_size,
                root_dir: Key::default(),
            })
        }

        async fn get_directory(&self, _: GetDirectoryRequest) -> Result<Directory> {
            unsupported()
        }

        async fn get_block(&self, _: BlockRequest) -> Result<BlockData> {
            unsupported()
        }

        async fn set_block(&self, _: BlockData) -> Result<WriteResult> {
            unsupported()
        }

        async fn append_to_block(&self, _: AppendToBlockRequest) -> Result<WriteResult> {
            unsupported()
        }

        async fn delete_block(&self, _: BlockRequest) -> Result<()> {
            unsupported()
        }

        async fn create_block(&self, _: BlockRequest) -> Result<WriteResult> {
            unsupported()
        }

        async fn suggest_block_stash(&self, _: SuggestBlockStashRequest) -> Result<Vec<HostStash>> {
            unsupported()
        }
    }

    struct Inert;

    impl StateMachine for Inert {
        fn apply(&self, _: CommandId, _: &[u8], _: &LogEntry) -> Vec<u8> {
            Vec::new()
        }
    }

    async fn cluster(nodes: Vec<FakeNode>, timeout: Duration) -> (QuorumReader, Vec<HostInfo>) {
        let consensus = Arc::new(LocalConsensus::new());
        let connector = Arc::new(LocalConnector::new());
        let mut hosts = Vec::new();
        for (position, node) in nodes.into_iter().enumerate() {
            let host = HostInfo {
                id: position as u64 + 1,
                address: format!("fake-{}", position),
            };
            consensus.add_member(host.clone(), Arc::new(Inert)).await;
            connector.register(host.id, Arc::new(node));
            hosts.push(host);
        }
        let reader = QuorumReader::new(
            consensus,
            connector,
            &QuorumConfig {
                call_timeout_ms: timeout.as_millis() as u64,
            },
        );
        (reader, hosts)
    }

    fn node(block_size: Option<u32>) -> FakeNode {
        FakeNode {
            block_size,
            delay: Duration::ZERO,
        }
    }

    async fn read_block_size(reader: &QuorumReader) -> Option<u32> {
        reader
            .majority(1, |node| async move {
                let volume = node
                    .get_volume(GetVolumeRequest {
                        group: 1,
                        name: "v".to_string(),
                    })
                    .await?;
                let feature = volume.block_size.to_be_bytes().to_vec();
                Ok::<_, StashError>((volume.block_size, feature))
            })
            .await
    }

    #[test]
    fn test_pick_majority() {
        let replies = vec![
            ("b", b"y".to_vec()),
            ("a", b"x".to_vec()),
            ("a2", b"x".to_vec()),
        ];
        assert_eq!(pick_majority(replies), Some("a"));
    }

    #[test]
    fn test_pick_majority_tie_falls_back_to_first() {
        let replies = vec![("b", b"y".to_vec()), ("a", b"x".to_vec())];
        assert_eq!(pick_majority(replies), Some("b"));
        assert_eq!(pick_majority::<&str>(Vec::new()), None);
    }

    #[tokio::test]
    async fn test_majority_outvotes_divergent_hosts() {
        let (reader, _) = cluster(
            vec![node(Some(64)), node(Some(99)), node(Some(64)), node(None), node(Some(64))],
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(read_block_size(&reader).await, Some(64));
    }

    #[tokio::test]
    async fn test_no_replies_is_none() {
        let (reader, _) = cluster(vec![node(None), node(None)], Duration::from_secs(5)).await;
        assert_eq!(read_block_size(&reader).await, None);
    }

    #[tokio::test]
    async fn test_slow_hosts_do_not_vote() {
        let slow = |block_size| FakeNode {
            block_size: Some(block_size),
            delay: Duration::from_secs(30),
        };
        let (reader, _) = cluster(
            vec![slow(7), node(Some(64)), slow(7)],
            Duration::from_millis(100),
        )
        .await;
        assert_eq!(read_block_size(&reader).await, Some(64));
    }

    #[tokio::test]
    async fn test_unreachable_hosts_are_skipped() {
        let (reader, hosts) = cluster(vec![node(Some(8)), node(Some(64))], Duration::from_secs(5)).await;
        let connector = LocalConnector::new();
        connector.register(hosts[1].id, Arc::new(node(Some(64))));
        let reader = QuorumReader::new(
            reader.consensus().clone(),
            Arc::new(connector),
            &QuorumConfig::default(),
        );
        assert_eq!(read_block_size(&reader).await, Some(64));
    }
}
