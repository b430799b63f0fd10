use crate::config::Config;
use anyhow::Context;
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use stashfs_core::rpc::http::{method, rpc_path};
use stashfs_core::rpc::{
    AppendToBlockRequest, BlockRequest, GetDirectoryRequest, GetFileMetaRequest,
    GetVolumeRequest, ListDirectoryRequest, SuggestBlockStashRequest,
};
use stashfs_core::{
    ApiResponse, BlockData, Contracts, ErrorKind, GroupId, HeadroomPlacement, HostInfo, HostStash,
    HttpConnector, KvStore, LocalConsensus, PendingConfirmations, QuorumReader, StashError,
    StashFs, StorageNode, StorageNodeService,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub struct ServerState {
    pub host: HostInfo,
    pub group: GroupId,
    pub node: Arc<StorageNodeService>,
    pub store: Arc<KvStore>,
}

pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let host = config.node.host_info();
    let group = config.group.id;

    std::fs::create_dir_all(&config.node.data_dir).with_context(|| {
        format!("failed to create data dir {:?}", config.node.data_dir)
    })?;
    let db_path = config.node.data_dir.join("meta.sqlite3");
    let store = Arc::new(
        KvStore::open(&db_path).with_context(|| format!("failed to open store {:?}", db_path))?,
    );

    let contracts = Arc::new(Contracts::new(
        store.clone(),
        Arc::new(PendingConfirmations::new(config.pending.ttl())),
        config.volume_policy,
    ));

    let consensus = Arc::new(LocalConsensus::new());
    consensus.add_member(host.clone(), contracts).await;

    let connector = Arc::new(HttpConnector::new(config.quorum.call_timeout())?);
    let quorum = QuorumReader::new(consensus.clone(), connector.clone(), &config.quorum);
    let node = Arc::new(StorageNodeService::new(
        host.clone(),
        store.clone(),
        quorum,
        Arc::new(HeadroomPlacement),
    ));

    let state = Arc::new(ServerState {
        host: host.clone(),
        group,
        node,
        store: store.clone(),
    });

    let fs = StashFs::new(group, host.id, consensus, connector, &config.quorum);
    register_stash(&fs, &store, group, &host, config.stash.capacity_bytes)
        .await
        .context("failed to register stash")?;

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.node.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.node.bind_addr))?;
    tracing::info!(
        "Host {} listening on {} (advertised as {})",
        host.id,
        config.node.bind_addr,
        host.address
    );

    axum::serve(listener, app).await?;

    Ok(())
}

/// Publish this host's stash to the group, keeping the usage already on record.
async fn register_stash(
    fs: &StashFs,
    store: &KvStore,
    group: GroupId,
    host: &HostInfo,
    capacity: u64,
) -> stashfs_core::Result<()> {
    let used = store
        .view(|txn| txn.host_stash(group, host.id))?
        .map(|stash| stash.used)
        .unwrap_or(0);
    fs.register_stash(&HostStash {
        host_id: host.id,
        capacity,
        used,
        owner: host.id,
    })
    .await?;
    tracing::info!(
        "Registered stash of host {}: capacity={} used={}",
        host.id,
        capacity,
        used
    );
    Ok(())
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(&rpc_path(method::LIST_DIRECTORY), post(list_directory))
        .route(&rpc_path(method::GET_FILE_META), post(get_file_meta))
        .route(&rpc_path(method::GET_VOLUME), post(get_volume))
        .route(&rpc_path(method::GET_DIRECTORY), post(get_directory))
        .route(&rpc_path(method::GET_BLOCK), post(get_block))
        .route(&rpc_path(method::SET_BLOCK), post(set_block))
        .route(&rpc_path(method::APPEND_TO_BLOCK), post(append_to_block))
        .route(&rpc_path(method::DELETE_BLOCK), post(delete_block))
        .route(&rpc_path(method::CREATE_BLOCK), post(create_block))
        .route(
            &rpc_path(method::SUGGEST_BLOCK_STASH),
            post(suggest_block_stash),
        )
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Decode | ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::QuorumFailure | ErrorKind::PlacementFailure => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn respond<T: Serialize>(result: stashfs_core::Result<T>) -> Response {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::ok(data))).into_response(),
        Err(error) => {
            let status = status_for(error.kind());
            if status.is_server_error() {
                tracing::warn!("RPC failed: {}", error);
            }
            (status, Json(ApiResponse::<T>::err(&error))).into_response()
        }
    }
}

/// Request bodies are decoded here rather than by the `Json` extractor so a
/// malformed body still gets the response envelope.
fn decode<T: DeserializeOwned>(body: &Bytes) -> stashfs_core::Result<T> {
    serde_json::from_slice(body).map_err(|e| StashError::Decode(e.to_string()))
}

async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let stash = state
        .store
        .view(|txn| txn.host_stash(state.group, state.host.id))
        .ok()
        .flatten();

    let response = serde_json::json!({
        "host_id": state.host.id,
        "address": state.host.address,
        "group": state.group,
        "stash": stash,
    });

    (StatusCode::OK, Json(response))
}

async fn list_directory(State(state): State<Arc<ServerState>>, body: Bytes) -> Response {
    match decode::<ListDirectoryRequest>(&body) {
        Ok(request) => respond(state.node.list_directory(request).await),
        Err(e) => respond::<()>(Err(e)),
    }
}

async fn get_file_meta(State(state): State<Arc<ServerState>>, body: Bytes) -> Response {
    match decode::<GetFileMetaRequest>(&body) {
        Ok(request) => respond(state.node.get_file_meta(request).await),
        Err(e) => respond::<()>(Err(e)),
    }
}

async fn get_volume(State(state): State<Arc<ServerState>>, body: Bytes) -> Response {
    match decode::<GetVolumeRequest>(&body) {
        Ok(request) => respond(state.node.get_volume(request).await),
        Err(e) => respond::<()>(Err(e)),
    }
}

async fn get_directory(State(state): State<Arc<ServerState>>, body: Bytes) -> Response {
    match decode::<GetDirectoryRequest>(&body) {
        Ok(request) => respond(state.node.get_directory(request).await),
        Err(e) => respond::<()>(Err(e)),
    }
}

async fn get_block(State(state): State<Arc<ServerState>>, body: Bytes) -> Response {
    match decode::<BlockRequest>(&body) {
        Ok(request) => respond(state.node.get_block(request).await),
        Err(e) => respond::<()>(Err(e)),
    }
}

async fn set_block(State(state): State<Arc<ServerState>>, body: Bytes) -> Response {
    match decode::<BlockData>(&body) {
        Ok(block) => respond(state.node.set_block(block).await),
        Err(e) => respond::<()>(Err(e)),
    }
}

async fn append_to_block(State(state): State<Arc<ServerState>>, body: Bytes) -> Response {
    match decode::<AppendToBlockRequest>(&body) {
        Ok(request) => respond(state.node.append_to_block(request).await),
        Err(e) => respond::<()>(Err(e)),
    }
}

async fn delete_block(State(state): State<Arc<ServerState>>, body: Bytes) -> Response {
    match decode::<BlockRequest>(&body) {
        // The envelope needs data to count as a success.
        Ok(request) => respond(state.node.delete_block(request).await.map(|()| true)),
        Err(e) => respond::<()>(Err(e)),
    }
}

async fn create_block(State(state): State<Arc<ServerState>>, body: Bytes) -> Response {
    match decode::<BlockRequest>(&body) {
        Ok(request) => respond(state.node.create_block(request).await),
        Err(e) => respond::<()>(Err(e)),
    }
}

async fn suggest_block_stash(State(state): State<Arc<ServerState>>, body: Bytes) -> Response {
    match decode::<SuggestBlockStashRequest>(&body) {
        Ok(request) => respond(state.node.suggest_block_stash(request).await),
        Err(e) => respond::<()>(Err(e)),
    }
}
