//! Peer-to-peer surface every storage node exposes.

pub mod http;
pub mod local;

pub use http::{HttpConnector, HttpPeerClient};
pub use local::LocalConnector;

use crate::error::{ErrorKind, Result, StashError};
use crate::model::{
    BlockData, Directory, FileMeta, GroupId, HostInfo, HostStash, Key, Volume, hex_bytes,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListDirectoryRequest {
    pub group: GroupId,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "item", rename_all = "lowercase")]
pub enum DirectoryItem {
    File(FileMeta),
    Dir(Directory),
}

impl DirectoryItem {
    pub fn key(&self) -> Key {
        match self {
            Self::File(file) => file.key,
            Self::Dir(dir) => dir.key,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::File(file) => &file.name,
            Self::Dir(dir) => &dir.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListDirectoryResponse {
    pub key: Key,
    pub name: String,
    pub volume: Volume,
    pub items: Vec<DirectoryItem>,
}

impl ListDirectoryResponse {
    pub fn find(&self, name: &str) -> Option<&DirectoryItem> {
        self.items.iter().find(|item| item.name() == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetFileMetaRequest {
    pub group: GroupId,
    pub file: Key,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetVolumeRequest {
    pub group: GroupId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetDirectoryRequest {
    pub group: GroupId,
    pub key: Key,
}

/// Addresses one block replica; used by get, delete and create.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BlockRequest {
    pub group: GroupId,
    pub file: Key,
    pub index: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendToBlockRequest {
    pub group: GroupId,
    pub file: Key,
    pub index: u64,
    pub offset: u32,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestBlockStashRequest {
    pub group: GroupId,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResult {
    pub succeed: bool,
    /// Bytes of block capacity left after the write position.
    pub remains: u32,
    #[serde(default)]
    pub block_hash: String,
}

#[async_trait]
pub trait StorageNode: Send + Sync {
    async fn list_directory(&self, request: ListDirectoryRequest) -> Result<ListDirectoryResponse>;

    async fn get_file_meta(&self, request: GetFileMetaRequest) -> Result<FileMeta>;

    async fn get_volume(&self, request: GetVolumeRequest) -> Result<Volume>;

    async fn get_directory(&self, request: GetDirectoryRequest) -> Result<Directory>;

    async fn get_block(&self, request: BlockRequest) -> Result<BlockData>;

    async fn set_block(&self, block: BlockData) -> Result<WriteResult>;

    async fn append_to_block(&self, request: AppendToBlockRequest) -> Result<WriteResult>;

    /// Remove the local replica. Not-found when the replica is absent.
    async fn delete_block(&self, request: BlockRequest) -> Result<()>;

    /// Create a zeroed replica and confirm it to the metadata group.
    async fn create_block(&self, request: BlockRequest) -> Result<WriteResult>;

    async fn suggest_block_stash(&self, request: SuggestBlockStashRequest)
    -> Result<Vec<HostStash>>;
}

/// Resolves a member of a group to a callable node handle.
pub trait PeerConnector: Send + Sync {
    fn connect(&self, host: &HostInfo) -> Result<Arc<dyn StorageNode>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Envelope of every RPC response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: &StashError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                kind: error.kind(),
                message: error.to_string(),
            }),
        }
    }

    pub fn into_result(self) -> Result<T> {
        if let Some(error) = self.error {
            return Err(StashError::from_kind(error.kind, error.message));
        }
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            _ => Err(StashError::Decode("response carries no data".to_string())),
        }
    }
}
