use crate::consensus::CommandId;
use crate::contracts::{ConfirmBlockArgs, ContractResult};
use crate::error::{Result, StashError};
use crate::model::{BlockData, GroupId, HostId, Key};
use crate::quorum::QuorumReader;
use crate::rpc::{GetFileMetaRequest, WriteResult};
use crate::storage::KvStore;
use std::sync::Arc;

/// Host side of block placement: allocate a zeroed replica, then tell the
/// metadata group this host holds it.
#[derive(Clone)]
pub struct CreateBlockOperation {
    host_id: HostId,
    store: Arc<KvStore>,
    quorum: QuorumReader,
}

#[derive(Debug, Clone)]
pub struct CreateBlockOperationRequest {
    pub group: GroupId,
    pub file: Key,
    pub index: u64,
}

impl CreateBlockOperation {
    pub fn new(host_id: HostId, store: Arc<KvStore>, quorum: QuorumReader) -> Self {
        Self {
            host_id,
            store,
            quorum,
        }
    }

    pub async fn run(&self, request: CreateBlockOperationRequest) -> Result<WriteResult> {
        let CreateBlockOperationRequest { group, file, index } = request;

        let meta = self
            .quorum
            .majority(group, move |node| async move {
                let meta = node.get_file_meta(GetFileMetaRequest { group, file }).await?;
                let feature = serde_json::to_vec(&meta)?;
                Ok::<_, StashError>((meta, feature))
            })
            .await
            .ok_or_else(|| {
                StashError::QuorumFailure(format!("no agreed metadata for file {}", file))
            })?;

        // An existing replica keeps its bytes; the host just confirms again.
        let block = self.store.update(|txn| match txn.block_data(group, &file, index)? {
            Some(existing) => Ok(existing),
            None => {
                let block = BlockData::zeroed(group, file, index, meta.block_size);
                txn.put_block_data(&block)?;
                Ok(block)
            }
        })?;

        let payload = serde_json::to_vec(&ConfirmBlockArgs {
            group,
            index,
            file,
            node_id: self.host_id,
        })?;
        let reply = self
            .quorum
            .consensus()
            .exec_command(group, CommandId::ConfirmBlock, payload)
            .await?;
        ContractResult::decode(&reply)?.into_ack()?;

        tracing::info!(
            "Created block {} of file {} on host {}",
            index,
            file,
            self.host_id
        );
        Ok(WriteResult {
            succeed: true,
            remains: (block.data.len() as u32).saturating_sub(block.tail),
            block_hash: block.hash,
        })
    }
}
