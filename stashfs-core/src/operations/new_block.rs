use crate::consensus::CommandId;
use crate::contracts::{CommitBlockArgs, ContractResult};
use crate::error::{Result, StashError};
use crate::model::{FileMeta, GroupId, HostId, HostStash, Key};
use crate::quorum::QuorumReader;
use crate::rpc::{BlockRequest, SuggestBlockStashRequest};
use futures_util::future::join_all;

/// Client-driven placement of the next block of a file.
///
/// Suggest asks the group for twice `replications` candidate hosts, Place
/// creates the block on each of them, Commit names the hosts that succeeded.
/// The group checks every named host against its own confirmations, so a
/// client cannot claim replicas that were never made.
#[derive(Clone)]
pub struct NewBlockOperation {
    quorum: QuorumReader,
}

#[derive(Debug, Clone)]
pub struct NewBlockOperationRequest {
    pub group: GroupId,
    pub file: Key,
    pub index: u64,
    pub replications: u32,
    pub client_time: u64,
}

#[derive(Debug, Clone)]
pub struct NewBlockOperationResult {
    pub file: FileMeta,
    pub hosts: Vec<HostId>,
}

#[derive(Debug)]
enum NewBlockPhase {
    Suggest,
    Place(Vec<HostStash>),
    Commit(Vec<HostId>),
    Done(FileMeta, Vec<HostId>),
}

impl NewBlockOperation {
    pub fn new(quorum: QuorumReader) -> Self {
        Self { quorum }
    }

    pub async fn run(&self, request: NewBlockOperationRequest) -> Result<NewBlockOperationResult> {
        let mut phase = NewBlockPhase::Suggest;
        loop {
            phase = match phase {
                NewBlockPhase::Suggest => NewBlockPhase::Place(self.suggest(&request).await?),
                NewBlockPhase::Place(candidates) => {
                    NewBlockPhase::Commit(self.place(&request, candidates).await?)
                }
                NewBlockPhase::Commit(hosts) => {
                    let file = self.commit(&request, &hosts).await?;
                    NewBlockPhase::Done(file, hosts)
                }
                NewBlockPhase::Done(file, hosts) => {
                    return Ok(NewBlockOperationResult { file, hosts });
                }
            };
        }
    }

    async fn suggest(&self, request: &NewBlockOperationRequest) -> Result<Vec<HostStash>> {
        let group = request.group;
        let count = request.replications.saturating_mul(2);
        let candidates = self
            .quorum
            .majority(group, move |node| async move {
                let stashes = node
                    .suggest_block_stash(SuggestBlockStashRequest { group, count })
                    .await?;
                let feature = serde_json::to_vec(&stashes)?;
                Ok::<_, StashError>((stashes, feature))
            })
            .await
            .ok_or_else(|| {
                StashError::QuorumFailure(format!("no placement suggestion for group {}", group))
            })?;

        if candidates.is_empty() {
            return Err(StashError::PlacementFailure(format!(
                "group {} suggested no stash hosts",
                group
            )));
        }
        Ok(candidates)
    }

    async fn place(
        &self,
        request: &NewBlockOperationRequest,
        candidates: Vec<HostStash>,
    ) -> Result<Vec<HostId>> {
        let block = BlockRequest {
            group: request.group,
            file: request.file,
            index: request.index,
        };
        let attempts = candidates.into_iter().map(|stash| async move {
            let host_id = stash.host_id;
            let outcome = self.create_on(host_id, block).await;
            (host_id, outcome)
        });

        let mut succeeded = Vec::new();
        for (host_id, outcome) in join_all(attempts).await {
            match outcome {
                Ok(()) => succeeded.push(host_id),
                Err(error) => tracing::warn!(
                    "Host {} declined block {} of file {}: {}",
                    host_id,
                    request.index,
                    request.file,
                    error
                ),
            }
        }

        if succeeded.is_empty() {
            return Err(StashError::PlacementFailure(format!(
                "no host created block {} of file {}",
                request.index, request.file
            )));
        }
        Ok(succeeded)
    }

    async fn create_on(&self, host_id: HostId, block: BlockRequest) -> Result<()> {
        let host = self
            .quorum
            .consensus()
            .host(host_id)
            .await?
            .ok_or_else(|| StashError::NotFound(format!("host {}", host_id)))?;
        let node = self.quorum.connector().connect(&host)?;
        let result = node.create_block(block).await?;
        if !result.succeed {
            return Err(StashError::Internal(format!(
                "host {} reported failure",
                host_id
            )));
        }
        Ok(())
    }

    async fn commit(&self, request: &NewBlockOperationRequest, hosts: &[HostId]) -> Result<FileMeta> {
        let payload = serde_json::to_vec(&CommitBlockArgs {
            index: request.index,
            file: request.file,
            node_ids: hosts.to_vec(),
            client_time: request.client_time,
        })?;
        let reply = self
            .quorum
            .consensus()
            .exec_command(request.group, CommandId::CommitBlock, payload)
            .await?;
        let file = ContractResult::decode(&reply)?.into_file()?;
        tracing::info!(
            "Placed block {} of file {} on {} hosts",
            request.index,
            request.file,
            hosts.len()
        );
        Ok(file)
    }
}
