//! In-process cluster for integration tests.
//!
//! Every node owns a SQLite store in its own temp dir, applies every log
//! entry through its own contracts, and is reachable through a shared
//! in-process connector.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use stashfs_core::{
    Contracts, GroupId, HeadroomPlacement, HostId, HostInfo, HostStash, KvStore, LocalConnector,
    LocalConsensus, PendingConfirmations, QuorumConfig, QuorumReader, StashFs, StorageNodeService,
    VolumePolicy,
};
use tempfile::TempDir;

pub const GROUP: GroupId = 1;

pub struct TestNode {
    pub host: HostInfo,
    pub store: Arc<KvStore>,
    pub contracts: Arc<Contracts>,
    pub service: Arc<StorageNodeService>,
}

pub struct TestCluster {
    pub consensus: Arc<LocalConsensus>,
    pub connector: Arc<LocalConnector>,
    pub nodes: Vec<TestNode>,
    _dirs: Vec<TempDir>,
}

pub fn quorum_config() -> QuorumConfig {
    QuorumConfig {
        call_timeout_ms: 2_000,
    }
}

impl TestCluster {
    pub async fn start(size: usize) -> Self {
        let consensus = Arc::new(LocalConsensus::new());
        let connector = Arc::new(LocalConnector::new());
        let mut nodes = Vec::with_capacity(size);
        let mut dirs = Vec::with_capacity(size);

        for id in 1..=size as HostId {
            let dir = TempDir::new().expect("Failed to create temp directory");
            let store = Arc::new(
                KvStore::open(dir.path().join("meta.sqlite3")).expect("Failed to open store"),
            );
            let host = HostInfo {
                id,
                address: format!("local-{}", id),
            };
            let contracts = Arc::new(Contracts::new(
                store.clone(),
                Arc::new(PendingConfirmations::new(Duration::from_secs(300))),
                VolumePolicy::default(),
            ));
            consensus.add_member(host.clone(), contracts.clone()).await;

            let quorum = QuorumReader::new(consensus.clone(), connector.clone(), &quorum_config());
            let service = Arc::new(StorageNodeService::new(
                host.clone(),
                store.clone(),
                quorum,
                Arc::new(HeadroomPlacement),
            ));
            connector.register(id, service.clone());

            nodes.push(TestNode {
                host,
                store,
                contracts,
                service,
            });
            dirs.push(dir);
        }

        Self {
            consensus,
            connector,
            nodes,
            _dirs: dirs,
        }
    }

    /// A cluster whose hosts have all registered `capacity` bytes of stash.
    pub async fn with_stashes(size: usize, capacity: u64) -> Self {
        let cluster = Self::start(size).await;
        let fs = cluster.client(0);
        for node in &cluster.nodes {
            fs.register_stash(&HostStash {
                host_id: node.host.id,
                capacity,
                used: 0,
                owner: node.host.id,
            })
            .await
            .expect("Failed to register stash");
        }
        cluster
    }

    pub fn client(&self, client_id: u64) -> StashFs {
        StashFs::new(
            GROUP,
            client_id,
            self.consensus.clone(),
            self.connector.clone(),
            &quorum_config(),
        )
    }

    pub fn node(&self, host_id: HostId) -> &TestNode {
        &self.nodes[(host_id - 1) as usize]
    }

    pub fn set_offline(&self, host_id: HostId, offline: bool) {
        self.connector.set_offline(host_id, offline);
    }
}

/// Deterministic non-repeating byte pattern.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}
