use crate::error::{Result, StashError};
use crate::model::{BlockData, GroupId, Key};
use crate::rpc::WriteResult;
use crate::storage::KvStore;
use std::sync::Arc;

/// Local replica CRUD. No consensus is involved in any of these.
#[derive(Clone)]
pub struct BlockContentOperation {
    store: Arc<KvStore>,
}

#[derive(Debug, Clone)]
pub struct AppendBlockOperationRequest {
    pub group: GroupId,
    pub file: Key,
    pub index: u64,
    pub offset: u32,
    pub data: Vec<u8>,
}

impl BlockContentOperation {
    pub fn new(store: Arc<KvStore>) -> Self {
        Self { store }
    }

    pub fn run_get(&self, group: GroupId, file: &Key, index: u64) -> Result<BlockData> {
        self.store
            .view(|txn| txn.block_data(group, file, index))?
            .ok_or_else(|| StashError::NotFound(format!("block {} of file {}", index, file)))
    }

    /// Replace the replica wholesale; the stored hash is recomputed here.
    pub fn run_set(&self, mut block: BlockData) -> Result<WriteResult> {
        let capacity = block.data.len();
        if block.tail as usize > capacity {
            return Err(StashError::InvalidRequest(format!(
                "tail {} exceeds block length {}",
                block.tail, capacity
            )));
        }
        block.rehash();
        self.store.update(|txn| txn.put_block_data(&block))?;
        Ok(WriteResult {
            succeed: true,
            remains: (capacity - block.tail as usize) as u32,
            block_hash: block.hash,
        })
    }

    /// Overwrite bytes from `offset` within one block. Never spills into the
    /// next block.
    pub fn run_append(&self, request: AppendBlockOperationRequest) -> Result<WriteResult> {
        let AppendBlockOperationRequest {
            group,
            file,
            index,
            offset,
            data,
        } = request;

        let block = self.store.update(|txn| {
            let mut block = txn.block_data(group, &file, index)?.ok_or_else(|| {
                StashError::NotFound(format!("block {} of file {}", index, file))
            })?;
            let start = offset as usize;
            let end = start + data.len();
            if end > block.data.len() {
                return Err(StashError::InvalidRequest(format!(
                    "write of {} bytes at {} overflows block of {} bytes",
                    data.len(),
                    offset,
                    block.data.len()
                )));
            }
            block.data[start..end].copy_from_slice(&data);
            block.tail = block.tail.max(end as u32);
            block.rehash();
            txn.put_block_data(&block)?;
            Ok(block)
        })?;

        let written_to = offset as usize + data.len();
        Ok(WriteResult {
            succeed: true,
            remains: (block.data.len() - written_to) as u32,
            block_hash: block.hash,
        })
    }

    pub fn run_delete(&self, group: GroupId, file: &Key, index: u64) -> Result<()> {
        let removed = self
            .store
            .update(|txn| txn.delete_block_data(group, file, index))?;
        if !removed {
            return Err(StashError::NotFound(format!(
                "block {} of file {}",
                index, file
            )));
        }
        tracing::debug!("Deleted block group={} file={} index={}", group, file, index);
        Ok(())
    }
}
