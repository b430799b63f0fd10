use super::{PeerConnector, StorageNode};
use crate::error::{Result, StashError};
use crate::model::{HostId, HostInfo};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

/// In-process connector for clusters living in one process.
#[derive(Default)]
pub struct LocalConnector {
    nodes: RwLock<HashMap<HostId, Arc<dyn StorageNode>>>,
    offline: RwLock<HashSet<HostId>>,
}

impl LocalConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `node` as `host_id`, replacing any earlier registration.
    pub fn register(&self, host_id: HostId, node: Arc<dyn StorageNode>) {
        self.nodes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(host_id, node);
    }

    /// Make `host_id` unreachable until set back online.
    pub fn set_offline(&self, host_id: HostId, offline: bool) {
        let mut set = self
            .offline
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if offline {
            set.insert(host_id);
        } else {
            set.remove(&host_id);
        }
    }

    fn is_offline(&self, host_id: HostId) -> bool {
        self.offline
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(&host_id)
    }
}

impl PeerConnector for LocalConnector {
    fn connect(&self, host: &HostInfo) -> Result<Arc<dyn StorageNode>> {
        if self.is_offline(host.id) {
            return Err(StashError::Http(format!("host {} is unreachable", host.id)));
        }
        self.nodes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&host.id)
            .cloned()
            .ok_or_else(|| StashError::Http(format!("host {} is not registered", host.id)))
    }
}
