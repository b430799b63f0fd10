//! Storage modules for Stashfs
//!
//! Provides the transactional key-value store and the key layout of every
//! entity kind kept in it.

pub mod keys;
pub mod kv_store;
pub mod metadata_store;

pub use keys::{
    BLOCK_STORE_GROUP, block_db_key, compute_hash, db_key, digest, directory_key, file_key,
    volume_key,
};
pub use kv_store::{KvStore, KvTxn};
