use crate::model::{GroupId, HostId, Key};
use moka::sync::Cache;
use std::collections::BTreeSet;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PendingKey {
    pub group: GroupId,
    pub index: u64,
    pub file: Key,
}

/// Hosts that reported holding a freshly created block, waiting for the
/// matching commit. Node-local and never replicated; losing it only forces
/// the client to place the block again.
///
/// Every confirmation rewrites the entry, which restarts its time to live.
pub struct PendingConfirmations {
    entries: Cache<PendingKey, BTreeSet<HostId>>,
}

impl PendingConfirmations {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Cache::builder().time_to_live(ttl).build(),
        }
    }

    /// Record `host` for `key`.
    pub fn confirm(&self, key: PendingKey, host: HostId) {
        self.entries.entry(key).and_upsert_with(|existing| {
            let mut hosts = existing.map(|entry| entry.into_value()).unwrap_or_default();
            hosts.insert(host);
            hosts
        });
    }

    pub fn hosts(&self, key: &PendingKey) -> Option<BTreeSet<HostId>> {
        self.entries.get(key)
    }

    pub fn remove(&self, key: &PendingKey) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn len(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
