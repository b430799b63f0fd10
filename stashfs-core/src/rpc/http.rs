use super::{
    ApiResponse, AppendToBlockRequest, BlockRequest, GetDirectoryRequest, GetFileMetaRequest,
    GetVolumeRequest, ListDirectoryRequest, ListDirectoryResponse, PeerConnector, StorageNode,
    SuggestBlockStashRequest, WriteResult,
};
use crate::error::{Result, StashError};
use crate::model::{BlockData, Directory, FileMeta, HostInfo, HostStash, Volume};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

/// Route names under `/rpc/`.
pub mod method {
    pub const LIST_DIRECTORY: &str = "list_directory";
    pub const GET_FILE_META: &str = "get_file_meta";
    pub const GET_VOLUME: &str = "get_volume";
    pub const GET_DIRECTORY: &str = "get_directory";
    pub const GET_BLOCK: &str = "get_block";
    pub const SET_BLOCK: &str = "set_block";
    pub const APPEND_TO_BLOCK: &str = "append_to_block";
    pub const DELETE_BLOCK: &str = "delete_block";
    pub const CREATE_BLOCK: &str = "create_block";
    pub const SUGGEST_BLOCK_STASH: &str = "suggest_block_stash";
}

pub fn rpc_path(method: &str) -> String {
    format!("/rpc/{}", method)
}

#[derive(Clone)]
pub struct HttpPeerClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPeerClient {
    pub fn new(client: reqwest::Client, address: &str) -> Self {
        let address = address.trim_end_matches('/');
        let base_url = if address.starts_with("http://") || address.starts_with("https://") {
            address.to_string()
        } else {
            format!("http://{}", address)
        };
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<Req, Resp>(&self, method: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, rpc_path(method));
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|error| StashError::Http(format!("{} failed: {}", url, error)))?;

        let status = response.status();
        let body: ApiResponse<Resp> = response.json().await.map_err(|error| {
            StashError::Http(format!(
                "invalid response from {}: status={} error={}",
                url, status, error
            ))
        })?;
        body.into_result()
    }
}

#[async_trait]
impl StorageNode for HttpPeerClient {
    async fn list_directory(&self, request: ListDirectoryRequest) -> Result<ListDirectoryResponse> {
        self.call(method::LIST_DIRECTORY, &request).await
    }

    async fn get_file_meta(&self, request: GetFileMetaRequest) -> Result<FileMeta> {
        self.call(method::GET_FILE_META, &request).await
    }

    async fn get_volume(&self, request: GetVolumeRequest) -> Result<Volume> {
        self.call(method::GET_VOLUME, &request).await
    }

    async fn get_directory(&self, request: GetDirectoryRequest) -> Result<Directory> {
        self.call(method::GET_DIRECTORY, &request).await
    }

    async fn get_block(&self, request: BlockRequest) -> Result<BlockData> {
        self.call(method::GET_BLOCK, &request).await
    }

    async fn set_block(&self, block: BlockData) -> Result<WriteResult> {
        self.call(method::SET_BLOCK, &block).await
    }

    async fn append_to_block(&self, request: AppendToBlockRequest) -> Result<WriteResult> {
        self.call(method::APPEND_TO_BLOCK, &request).await
    }

    async fn delete_block(&self, request: BlockRequest) -> Result<()> {
        let _: bool = self.call(method::DELETE_BLOCK, &request).await?;
        Ok(())
    }

    async fn create_block(&self, request: BlockRequest) -> Result<WriteResult> {
        self.call(method::CREATE_BLOCK, &request).await
    }

    async fn suggest_block_stash(
        &self,
        request: SuggestBlockStashRequest,
    ) -> Result<Vec<HostStash>> {
        self.call(method::SUGGEST_BLOCK_STASH, &request).await
    }
}

/// Connects to peers by the address they advertise in the group.
#[derive(Clone)]
pub struct HttpConnector {
    client: reqwest::Client,
}

impl HttpConnector {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| StashError::Http(error.to_string()))?;
        Ok(Self { client })
    }
}

impl PeerConnector for HttpConnector {
    fn connect(&self, host: &HostInfo) -> Result<Arc<dyn StorageNode>> {
        if host.address.is_empty() {
            return Err(StashError::InvalidRequest(format!(
                "host {} has no address",
                host.id
            )));
        }
        Ok(Arc::new(HttpPeerClient::new(
            self.client.clone(),
            &host.address,
        )))
    }
}
