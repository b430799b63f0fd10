use super::placement::PlacementStrategy;
use crate::error::{Result, StashError};
use crate::model::{BlockData, Directory, FileMeta, HostInfo, HostStash, Volume};
use crate::operations::{
    AppendBlockOperationRequest, BlockContentOperation, CreateBlockOperation,
    CreateBlockOperationRequest, ListDirectoryOperation, ListDirectoryOperationRequest,
};
use crate::quorum::QuorumReader;
use crate::rpc::{
    AppendToBlockRequest, BlockRequest, GetDirectoryRequest, GetFileMetaRequest,
    GetVolumeRequest, ListDirectoryRequest, ListDirectoryResponse, StorageNode,
    SuggestBlockStashRequest, WriteResult,
};
use crate::storage::{KvStore, volume_key};
use async_trait::async_trait;
use std::sync::Arc;

/// Storage node RPC handlers over this host's local store.
///
/// Metadata reads come straight from the local replica that the host's
/// contracts maintain; block reads and writes touch only local content.
pub struct StorageNodeService {
    host: HostInfo,
    store: Arc<KvStore>,
    placement: Arc<dyn PlacementStrategy>,
    list_directory: ListDirectoryOperation,
    block_content: BlockContentOperation,
    create_block: CreateBlockOperation,
}

impl StorageNodeService {
    pub fn new(
        host: HostInfo,
        store: Arc<KvStore>,
        quorum: QuorumReader,
        placement: Arc<dyn PlacementStrategy>,
    ) -> Self {
        Self {
            list_directory: ListDirectoryOperation::new(store.clone()),
            block_content: BlockContentOperation::new(store.clone()),
            create_block: CreateBlockOperation::new(host.id, store.clone(), quorum),
            host,
            store,
            placement,
        }
    }

    pub fn host(&self) -> &HostInfo {
        &self.host
    }
}

#[async_trait]
impl StorageNode for StorageNodeService {
    async fn list_directory(&self, request: ListDirectoryRequest) -> Result<ListDirectoryResponse> {
        self.list_directory.run(ListDirectoryOperationRequest {
            group: request.group,
            path: request.path,
        })
    }

    async fn get_file_meta(&self, request: GetFileMetaRequest) -> Result<FileMeta> {
        self.store
            .view(|txn| txn.file_meta(request.group, &request.file))?
            .ok_or_else(|| StashError::NotFound(format!("file {}", request.file)))
    }

    async fn get_volume(&self, request: GetVolumeRequest) -> Result<Volume> {
        self.store
            .view(|txn| txn.volume(request.group, &volume_key(&request.name)))?
            .ok_or_else(|| StashError::NotFound(format!("volume {}", request.name)))
    }

    async fn get_directory(&self, request: GetDirectoryRequest) -> Result<Directory> {
        self.store
            .view(|txn| txn.directory(request.group, &request.key))?
            .ok_or_else(|| StashError::NotFound(format!("directory {}", request.key)))
    }

    async fn get_block(&self, request: BlockRequest) -> Result<BlockData> {
        self.block_content
            .run_get(request.group, &request.file, request.index)
    }

    async fn set_block(&self, block: BlockData) -> Result<WriteResult> {
        self.block_content.run_set(block)
    }

    async fn append_to_block(&self, request: AppendToBlockRequest) -> Result<WriteResult> {
        self.block_content.run_append(AppendBlockOperationRequest {
            group: request.group,
            file: request.file,
            index: request.index,
            offset: request.offset,
            data: request.data,
        })
    }

    async fn delete_block(&self, request: BlockRequest) -> Result<()> {
        self.block_content
            .run_delete(request.group, &request.file, request.index)
    }

    async fn create_block(&self, request: BlockRequest) -> Result<WriteResult> {
        self.create_block
            .run(CreateBlockOperationRequest {
                group: request.group,
                file: request.file,
                index: request.index,
            })
            .await
    }

    async fn suggest_block_stash(
        &self,
        request: SuggestBlockStashRequest,
    ) -> Result<Vec<HostStash>> {
        let stashes = self.store.view(|txn| txn.host_stashes(request.group))?;
        Ok(self.placement.suggest(stashes, request.count as usize))
    }
}
