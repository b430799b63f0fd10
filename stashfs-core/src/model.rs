//! Entities agreed on by the metadata group, plus the raw block records
//! held by stash hosts.

use crate::error::{Result, StashError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub type GroupId = u64;
pub type HostId = u64;
pub type ClientId = u64;

pub const KEY_LEN: usize = 32;

/// SHA-256 derived identity of a volume, directory or file.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Key(pub [u8; KEY_LEN]);

impl Key {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            StashError::Decode(format!("key must be {} bytes, got {}", KEY_LEN, bytes.len()))
        })?;
        Ok(Self(array))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(value: &str) -> Result<Self> {
        let bytes = hex::decode(value)
            .map_err(|error| StashError::Decode(format!("invalid key hex: {}", error)))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", &self.to_hex()[..12])
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Key::from_hex(&value).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,
    pub key: Key,
    pub replications: u32,
    pub block_size: u32,
    pub root_dir: Key,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    File,
    Dir,
}

/// One entry of a directory's child list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryToken {
    pub kind: ItemKind,
    pub key: Key,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    pub key: Key,
    pub name: String,
    #[serde(default)]
    pub items: Vec<DirectoryToken>,
}

impl Directory {
    pub fn empty(key: Key, name: impl Into<String>) -> Self {
        Self {
            key,
            name: name.into(),
            items: Vec::new(),
        }
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.items.iter().any(|token| &token.key == key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub hosts: Vec<HostId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub key: Key,
    pub name: String,
    pub block_size: u32,
    #[serde(default)]
    pub blocks: Vec<Block>,
    /// `blocks.len() * block_size`; overstates a partially filled last block.
    pub size: u64,
    pub created_at: u64,
    pub last_modified: u64,
}

impl FileMeta {
    pub fn block_count(&self) -> u64 {
        self.blocks.len() as u64
    }

    pub fn block(&self, index: u64) -> Option<&Block> {
        usize::try_from(index)
            .ok()
            .and_then(|index| self.blocks.get(index))
    }
}

/// Raw block content kept on a stash host's local store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockData {
    pub group: GroupId,
    pub file: Key,
    pub index: u64,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    /// Count of valid bytes from the start of `data`.
    pub tail: u32,
    #[serde(default)]
    pub hash: String,
}

impl BlockData {
    pub fn zeroed(group: GroupId, file: Key, index: u64, block_size: u32) -> Self {
        let data = vec![0u8; block_size as usize];
        let hash = crate::compute_hash(&data);
        Self {
            group,
            file,
            index,
            data,
            tail: 0,
            hash,
        }
    }

    pub fn rehash(&mut self) {
        self.hash = crate::compute_hash(&self.data);
    }

    /// Bytes used to vote on block replicas: content plus tail.
    pub fn feature(&self) -> Vec<u8> {
        let mut feature = Vec::with_capacity(self.data.len() + 4);
        feature.extend_from_slice(&self.data);
        feature.extend_from_slice(&self.tail.to_be_bytes());
        feature
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileWriteLock {
    pub group: GroupId,
    pub key: Key,
    pub owner: ClientId,
    pub acquired_at: u64,
    /// Client-supplied deadline; `None` never expires.
    #[serde(default)]
    pub lease_until: Option<u64>,
}

impl FileWriteLock {
    pub fn expired_at(&self, client_time: u64) -> bool {
        self.lease_until
            .map(|deadline| client_time >= deadline)
            .unwrap_or(false)
    }
}

/// Self-reported capacity of a stash host. Not verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostStash {
    pub host_id: HostId,
    pub capacity: u64,
    pub used: u64,
    pub owner: HostId,
}

impl HostStash {
    pub fn headroom(&self) -> u64 {
        self.capacity.saturating_sub(self.used)
    }
}

/// Membership record handed out by the consensus engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostInfo {
    pub id: HostId,
    pub address: String,
}

/// Hex encoding for byte payloads carried inside JSON.
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let value = String::deserialize(deserializer)?;
        hex::decode(value).map_err(serde::de::Error::custom)
    }
}
