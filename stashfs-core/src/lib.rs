//! Stashfs Core - distributed file store with consensus-backed metadata
//!
//! - Volumes, directories, files, block placement and write locks are
//!   changed only through contracts applied on a replicated log
//! - Block content is replicated by the client and confirmed per host
//!   before the block is committed into the file
//! - Reads are answered by a majority of hosts, compared by content hash
//! - SQLite for each node's local metadata replica and block content

pub mod client;
pub mod config;
pub mod consensus;
pub mod contracts;
pub mod error;
pub mod model;
pub mod node;
pub mod operations;
pub mod quorum;
pub mod rpc;
pub mod storage;

pub use client::{FileStream, StashFs};
pub use config::{KIB, MIB, PendingConfig, QuorumConfig, VolumePolicy};
pub use consensus::{CommandId, Consensus, LocalConsensus, LogEntry, StateMachine};
pub use contracts::{ContractResult, Contracts, PendingConfirmations, PendingKey};
pub use error::{ErrorKind, Result, StashError};
pub use model::{
    Block, BlockData, ClientId, Directory, DirectoryToken, FileMeta, FileWriteLock, GroupId,
    HostId, HostInfo, HostStash, ItemKind, Key, Volume,
};
pub use node::{HeadroomPlacement, PlacementStrategy, StorageNodeService};
pub use quorum::QuorumReader;
pub use rpc::{
    ApiResponse, DirectoryItem, HttpConnector, HttpPeerClient, ListDirectoryResponse,
    LocalConnector, PeerConnector, StorageNode, WriteResult,
};
pub use storage::{KvStore, compute_hash};
