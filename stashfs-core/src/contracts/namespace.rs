use super::{ContractResult, Contracts, NewDirectoryArgs, NewVolumeArgs, TouchFileArgs};
use crate::consensus::LogEntry;
use crate::error::{Result, StashError};
use crate::model::{Directory, DirectoryToken, FileMeta, HostStash, ItemKind, Volume};
use crate::storage::{directory_key, file_key, volume_key};

impl Contracts {
    pub(crate) fn new_volume(&self, args: NewVolumeArgs, entry: &LogEntry) -> Result<ContractResult> {
        if args.name.is_empty() || args.name.contains('/') {
            return Err(StashError::InvalidRequest(format!(
                "invalid volume name {:?}",
                args.name
            )));
        }

        let key = volume_key(&args.name);
        let volume = Volume {
            name: args.name,
            key,
            replications: self.policy.clamp_replications(args.replications),
            block_size: self.policy.clamp_block_size(args.block_size),
            root_dir: key,
        };

        self.store.update(|txn| {
            if txn.volume_exists(entry.group, &volume.key)? {
                return Err(StashError::Conflict(format!(
                    "volume {} already exists",
                    volume.name
                )));
            }
            if txn.directory_exists(entry.group, &volume.root_dir)? {
                return Err(StashError::Conflict(format!(
                    "root directory of volume {} already exists",
                    volume.name
                )));
            }
            txn.put_volume(entry.group, &volume)?;
            txn.put_directory(entry.group, &Directory::empty(volume.root_dir, &volume.name))
        })?;

        tracing::info!(
            "Created volume {} replications={} block_size={}",
            volume.name,
            volume.replications,
            volume.block_size
        );
        Ok(ContractResult::Volume(volume))
    }

    pub(crate) fn new_directory(
        &self,
        args: NewDirectoryArgs,
        entry: &LogEntry,
    ) -> Result<ContractResult> {
        if args.name.is_empty() || args.name.contains('/') {
            return Err(StashError::InvalidRequest(format!(
                "invalid directory name {:?}",
                args.name
            )));
        }

        let key = directory_key(&args.parent, &entry.hash);
        let directory = Directory::empty(key, args.name);

        self.store.update(|txn| {
            let mut parent = txn.directory(entry.group, &args.parent)?.ok_or_else(|| {
                StashError::NotFound(format!("parent directory {}", args.parent))
            })?;
            if parent.contains(&key) || txn.directory_exists(entry.group, &key)? {
                return Err(StashError::Conflict(format!(
                    "directory {} already exists",
                    key
                )));
            }
            parent.items.push(DirectoryToken {
                kind: ItemKind::Dir,
                key,
            });
            txn.put_directory(entry.group, &parent)?;
            txn.put_directory(entry.group, &directory)
        })?;

        Ok(ContractResult::Dir(directory))
    }

    pub(crate) fn touch_file(&self, args: TouchFileArgs, entry: &LogEntry) -> Result<ContractResult> {
        if args.name.is_empty() || args.name.contains('/') {
            return Err(StashError::InvalidRequest(format!(
                "invalid file name {:?}",
                args.name
            )));
        }

        let key = file_key(&args.volume, &args.dir, entry.index);

        let file = self.store.update(|txn| {
            let volume = txn
                .volume(entry.group, &args.volume)?
                .ok_or_else(|| StashError::NotFound(format!("volume {}", args.volume)))?;
            let mut dir = txn
                .directory(entry.group, &args.dir)?
                .ok_or_else(|| StashError::NotFound(format!("directory {}", args.dir)))?;

            if !dir.contains(&key) {
                dir.items.push(DirectoryToken {
                    kind: ItemKind::File,
                    key,
                });
                txn.put_directory(entry.group, &dir)?;
            }

            if let Some(existing) = txn.file_meta(entry.group, &key)? {
                return Ok(existing);
            }
            let file = FileMeta {
                key,
                name: args.name,
                block_size: volume.block_size,
                blocks: Vec::new(),
                size: 0,
                created_at: args.client_time,
                last_modified: args.client_time,
            };
            txn.put_file_meta(entry.group, &file)?;
            Ok(file)
        })?;

        tracing::info!("Touched file {} key={}", file.name, file.key);
        Ok(ContractResult::File(file))
    }

    pub(crate) fn register_stash(&self, stash: HostStash, entry: &LogEntry) -> Result<ContractResult> {
        self.store
            .update(|txn| txn.put_host_stash(entry.group, &stash))?;
        tracing::info!(
            "Registered stash host={} capacity={} used={}",
            stash.host_id,
            stash.capacity,
            stash.used
        );
        Ok(ContractResult::Ack)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::*;
    use crate::config::MIB;
    use crate::error::ErrorKind;

    fn new_volume(contracts: &Contracts, name: &str, replications: u32, block_size: u32) -> ContractResult {
        run(
            contracts,
            CommandId::NewVolume,
            &NewVolumeArgs {
                name: name.to_string(),
                replications,
                block_size,
            },
            1,
        )
    }

    #[test]
    fn test_new_volume_clamps_policy() {
        let contracts = contracts();
        let low = new_volume(&contracts, "low", 1, 0).into_volume().unwrap();
        assert_eq!(low.replications, 5);
        assert_eq!(low.block_size, 1024);

        let high = new_volume(&contracts, "high", 100, 50 * MIB)
            .into_volume()
            .unwrap();
        assert_eq!(high.replications, 32);
        assert_eq!(high.block_size, 10 * MIB);

        let stored = contracts
            .store()
            .view(|txn| txn.directory(GROUP, &high.root_dir))
            .unwrap()
            .unwrap();
        assert!(stored.items.is_empty());
    }

    #[test]
    fn test_new_volume_twice_conflicts() {
        let contracts = contracts();
        new_volume(&contracts, "docs", 5, 1024).into_volume().unwrap();
        let err = new_volume(&contracts, "docs", 5, 1024)
            .into_volume()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_new_directory_key_comes_from_entry_hash() {
        let contracts = contracts();
        let volume = volume(&contracts, "docs", 1);
        let args = NewDirectoryArgs {
            parent: volume.root_dir,
            name: "a".to_string(),
        };
        let first = run(&contracts, CommandId::NewDirectory, &args, 2)
            .into_directory()
            .unwrap();
        let second = run(&contracts, CommandId::NewDirectory, &args, 3)
            .into_directory()
            .unwrap();
        assert_ne!(first.key, second.key);

        // Replaying the same entry collides with the existing child.
        let replay = run(&contracts, CommandId::NewDirectory, &args, 2)
            .into_directory()
            .unwrap_err();
        assert_eq!(replay.kind(), ErrorKind::Conflict);

        let root = contracts
            .store()
            .view(|txn| txn.directory(GROUP, &volume.root_dir))
            .unwrap()
            .unwrap();
        assert_eq!(root.items.len(), 2);
    }

    #[test]
    fn test_touch_file_same_index_is_idempotent() {
        let contracts = contracts();
        let volume = volume(&contracts, "docs", 1);
        let first = touch(&contracts, &volume, "a.txt", 7);
        let again = touch(&contracts, &volume, "a.txt", 7);
        assert_eq!(first, again);
        assert_eq!(first.block_size, volume.block_size);
        assert!(first.blocks.is_empty());

        let root = contracts
            .store()
            .view(|txn| txn.directory(GROUP, &volume.root_dir))
            .unwrap()
            .unwrap();
        assert_eq!(root.items.len(), 1);

        let other = touch(&contracts, &volume, "a.txt", 8);
        assert_ne!(other.key, first.key);
    }

    #[test]
    fn test_touch_file_requires_volume_and_directory() {
        let contracts = contracts();
        let volume = volume(&contracts, "docs", 1);
        let missing_dir = run(
            &contracts,
            CommandId::TouchFile,
            &TouchFileArgs {
                volume: volume.key,
                dir: crate::storage::volume_key("nowhere"),
                name: "a".to_string(),
                client_time: 0,
            },
            2,
        );
        assert_eq!(missing_dir.into_file().unwrap_err().kind(), ErrorKind::NotFound);

        let missing_volume = run(
            &contracts,
            CommandId::TouchFile,
            &TouchFileArgs {
                volume: crate::storage::volume_key("ghost"),
                dir: volume.root_dir,
                name: "a".to_string(),
                client_time: 0,
            },
            3,
        );
        assert_eq!(
            missing_volume.into_file().unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_register_stash_upserts() {
        let contracts = contracts();
        for used in [0u64, 40] {
            run(
                &contracts,
                CommandId::RegStash,
                &HostStash {
                    host_id: 4,
                    capacity: 100,
                    used,
                    owner: 4,
                },
                1,
            )
            .into_ack()
            .unwrap();
        }
        let stashes = contracts.store().view(|txn| txn.host_stashes(GROUP)).unwrap();
        assert_eq!(stashes.len(), 1);
        assert_eq!(stashes[0].headroom(), 60);
    }
}
