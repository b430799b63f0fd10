use crate::model::{GroupId, HostId, KEY_LEN, Key};
use sha2::{Digest, Sha256};

pub const VOLUMES: u32 = 1;
pub const DIRECTORY: u32 = 2;
pub const FILE_LOCK: u32 = 3;
pub const FILE_META: u32 = 4;
pub const BLOCKS: u32 = 5;
pub const STASH: u32 = 6;

/// Block content of every group lives under this group id.
pub const BLOCK_STORE_GROUP: GroupId = 3;

/// Compute SHA256 hash of data
pub fn compute_hash(data: &[u8]) -> String {
    hex::encode(digest(&[data]))
}

pub fn digest(parts: &[&[u8]]) -> [u8; KEY_LEN] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

pub fn key_prefix(group: GroupId, tag: u32) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(12 + KEY_LEN);
    prefix.extend_from_slice(&group.to_be_bytes());
    prefix.extend_from_slice(&tag.to_be_bytes());
    prefix
}

pub fn db_key(group: GroupId, tag: u32, key: &[u8]) -> Vec<u8> {
    let mut db_key = key_prefix(group, tag);
    db_key.extend_from_slice(key);
    db_key
}

pub fn block_db_key(group: GroupId, file: &Key, index: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(16 + KEY_LEN);
    key.extend_from_slice(&group.to_be_bytes());
    key.extend_from_slice(&index.to_be_bytes());
    key.extend_from_slice(file.as_bytes());
    db_key(BLOCK_STORE_GROUP, BLOCKS, &key)
}

pub fn stash_db_key(group: GroupId, host_id: HostId) -> Vec<u8> {
    db_key(group, STASH, &host_id.to_be_bytes())
}

pub fn volume_key(name: &str) -> Key {
    Key(digest(&[name.as_bytes()]))
}

/// Directory identity comes from the log entry, never from client input.
pub fn directory_key(parent: &Key, entry_hash: &[u8]) -> Key {
    Key(digest(&[parent.as_bytes(), entry_hash]))
}

pub fn file_key(volume: &Key, dir: &Key, log_index: u64) -> Key {
    Key(digest(&[
        volume.as_bytes(),
        dir.as_bytes(),
        &log_index.to_be_bytes(),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_hash() {
        let data = b"hello world";
        let hash = compute_hash(data);
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn test_file_key_depends_on_log_index_only() {
        let volume = volume_key("photos");
        let dir = volume;
        assert_eq!(file_key(&volume, &dir, 42), file_key(&volume, &dir, 42));
        assert_ne!(file_key(&volume, &dir, 42), file_key(&volume, &dir, 43));
    }

    #[test]
    fn test_block_keys_are_isolated_per_group() {
        let file = volume_key("f");
        assert_ne!(block_db_key(1, &file, 0), block_db_key(2, &file, 0));
        assert!(block_db_key(1, &file, 0).starts_with(&key_prefix(BLOCK_STORE_GROUP, BLOCKS)));
    }
}
