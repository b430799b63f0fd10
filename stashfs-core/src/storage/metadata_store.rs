//! Typed get/set helpers for the entity kinds kept in a [`KvTxn`].

use super::keys::{
    DIRECTORY, FILE_LOCK, FILE_META, STASH, VOLUMES, block_db_key, db_key, key_prefix,
    stash_db_key,
};
use super::kv_store::KvTxn;
use crate::error::{Result, StashError};
use crate::model::{
    BlockData, Directory, FileMeta, FileWriteLock, GroupId, HostId, HostStash, Key, Volume,
};
use serde::Serialize;
use serde::de::DeserializeOwned;

impl KvTxn<'_> {
    fn get_entity<T: DeserializeOwned>(&self, key: &[u8], what: &str) -> Result<Option<T>> {
        match self.get(key)? {
            Some(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|error| {
                StashError::Decode(format!("stored {} is corrupt: {}", what, error))
            }),
            None => Ok(None),
        }
    }

    fn put_entity<T: Serialize>(&self, key: &[u8], value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.set(key, &bytes)
    }

    pub fn volume(&self, group: GroupId, key: &Key) -> Result<Option<Volume>> {
        self.get_entity(&db_key(group, VOLUMES, key.as_bytes()), "volume")
    }

    pub fn volume_exists(&self, group: GroupId, key: &Key) -> Result<bool> {
        self.exists(&db_key(group, VOLUMES, key.as_bytes()))
    }

    pub fn put_volume(&self, group: GroupId, volume: &Volume) -> Result<()> {
        self.put_entity(&db_key(group, VOLUMES, volume.key.as_bytes()), volume)
    }

    pub fn directory(&self, group: GroupId, key: &Key) -> Result<Option<Directory>> {
        self.get_entity(&db_key(group, DIRECTORY, key.as_bytes()), "directory")
    }

    pub fn directory_exists(&self, group: GroupId, key: &Key) -> Result<bool> {
        self.exists(&db_key(group, DIRECTORY, key.as_bytes()))
    }

    pub fn put_directory(&self, group: GroupId, directory: &Directory) -> Result<()> {
        self.put_entity(&db_key(group, DIRECTORY, directory.key.as_bytes()), directory)
    }

    pub fn file_meta(&self, group: GroupId, key: &Key) -> Result<Option<FileMeta>> {
        self.get_entity(&db_key(group, FILE_META, key.as_bytes()), "file meta")
    }

    pub fn put_file_meta(&self, group: GroupId, file: &FileMeta) -> Result<()> {
        self.put_entity(&db_key(group, FILE_META, file.key.as_bytes()), file)
    }

    pub fn write_lock(&self, group: GroupId, key: &Key) -> Result<Option<FileWriteLock>> {
        self.get_entity(&db_key(group, FILE_LOCK, key.as_bytes()), "write lock")
    }

    pub fn put_write_lock(&self, lock: &FileWriteLock) -> Result<()> {
        self.put_entity(&db_key(lock.group, FILE_LOCK, lock.key.as_bytes()), lock)
    }

    pub fn delete_write_lock(&self, group: GroupId, key: &Key) -> Result<bool> {
        self.delete(&db_key(group, FILE_LOCK, key.as_bytes()))
    }

    pub fn block_data(&self, group: GroupId, file: &Key, index: u64) -> Result<Option<BlockData>> {
        self.get_entity(&block_db_key(group, file, index), "block")
    }

    pub fn put_block_data(&self, block: &BlockData) -> Result<()> {
        tracing::debug!(
            "Storing block group={} file={} index={} tail={}",
            block.group,
            block.file,
            block.index,
            block.tail
        );
        self.put_entity(&block_db_key(block.group, &block.file, block.index), block)
    }

    pub fn delete_block_data(&self, group: GroupId, file: &Key, index: u64) -> Result<bool> {
        self.delete(&block_db_key(group, file, index))
    }

    pub fn host_stash(&self, group: GroupId, host_id: HostId) -> Result<Option<HostStash>> {
        self.get_entity(&stash_db_key(group, host_id), "host stash")
    }

    pub fn put_host_stash(&self, group: GroupId, stash: &HostStash) -> Result<()> {
        self.put_entity(&stash_db_key(group, stash.host_id), stash)
    }

    /// Every registered stash host of the group, ordered by host id.
    pub fn host_stashes(&self, group: GroupId) -> Result<Vec<HostStash>> {
        let mut stashes = Vec::new();
        for (_, bytes) in self.scan_prefix(&key_prefix(group, STASH))? {
            let stash: HostStash = serde_json::from_slice(&bytes).map_err(|error| {
                StashError::Decode(format!("stored host stash is corrupt: {}", error))
            })?;
            stashes.push(stash);
        }
        Ok(stashes)
    }
}
