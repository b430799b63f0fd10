use super::{CommandId, Consensus, LogEntry, StateMachine};
use crate::error::{Result, StashError};
use crate::model::{GroupId, HostId, HostInfo};
use crate::storage::digest;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

#[derive(Clone)]
struct Member {
    info: HostInfo,
    state_machine: Arc<dyn StateMachine>,
}

#[derive(Debug, Default)]
struct GroupLog {
    last_index: u64,
    last_hash: [u8; 32],
}

/// In-process log engine: one serialized log per group, every member applies
/// every entry, and the reply most members produced is returned.
///
/// Used for single-node deployments and in-process clusters; it provides
/// ordering but no fault tolerance.
pub struct LocalConsensus {
    members: RwLock<Vec<Member>>,
    logs: Mutex<HashMap<GroupId, GroupLog>>,
}

impl LocalConsensus {
    pub fn new() -> Self {
        Self {
            members: RwLock::new(Vec::new()),
            logs: Mutex::new(HashMap::new()),
        }
    }

    pub async fn add_member(&self, info: HostInfo, state_machine: Arc<dyn StateMachine>) {
        let mut members = self.members.write().await;
        members.retain(|member| member.info.id != info.id);
        tracing::info!("Host {} joined at {}", info.id, info.address);
        members.push(Member {
            info,
            state_machine,
        });
    }

    pub async fn last_index(&self, group: GroupId) -> u64 {
        self.logs
            .lock()
            .await
            .get(&group)
            .map(|log| log.last_index)
            .unwrap_or(0)
    }
}

impl Default for LocalConsensus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Consensus for LocalConsensus {
    async fn exec_command(
        &self,
        group: GroupId,
        command: CommandId,
        payload: Vec<u8>,
    ) -> Result<Vec<u8>> {
        let members = self.members.read().await.clone();
        if members.is_empty() {
            return Err(StashError::Consensus(format!(
                "group {} has no members",
                group
            )));
        }

        // Held across apply so entries reach state machines in log order.
        let mut logs = self.logs.lock().await;
        let log = logs.entry(group).or_default();
        let index = log.last_index + 1;
        let hash = digest(&[
            &log.last_hash,
            &group.to_be_bytes(),
            &index.to_be_bytes(),
            &command.as_u64().to_be_bytes(),
            &payload,
        ]);
        log.last_index = index;
        log.last_hash = hash;

        let entry = LogEntry { group, index, hash };
        let mut tally: Vec<(Vec<u8>, usize)> = Vec::new();
        for member in &members {
            let reply = member.state_machine.apply(command, &payload, &entry);
            match tally.iter_mut().find(|(seen, _)| *seen == reply) {
                Some((_, votes)) => *votes += 1,
                None => tally.push((reply, 1)),
            }
        }

        if tally.len() > 1 {
            tracing::warn!(
                "Replicas diverged applying {} at group={} index={}: {} distinct replies",
                command,
                group,
                index,
                tally.len()
            );
        }

        let mut best: Option<(Vec<u8>, usize)> = None;
        for (reply, votes) in tally {
            if best.as_ref().map(|(_, top)| votes > *top).unwrap_or(true) {
                best = Some((reply, votes));
            }
        }
        best.map(|(reply, _)| reply)
            .ok_or_else(|| StashError::Consensus("no replica replied".to_string()))
    }

    async fn group_members(&self, _group: GroupId) -> Result<Vec<HostInfo>> {
        Ok(self
            .members
            .read()
            .await
            .iter()
            .map(|member| member.info.clone())
            .collect())
    }

    async fn host(&self, host_id: HostId) -> Result<Option<HostInfo>> {
        Ok(self
            .members
            .read()
            .await
            .iter()
            .find(|member| member.info.id == host_id)
            .map(|member| member.info.clone()))
    }
}
