use crate::error::{Result, StashError};
use crate::model::{Directory, GroupId, ItemKind};
use crate::rpc::{DirectoryItem, ListDirectoryResponse};
use crate::storage::{KvStore, KvTxn, volume_key};
use std::sync::Arc;

#[derive(Clone)]
pub struct ListDirectoryOperation {
    store: Arc<KvStore>,
}

#[derive(Debug, Clone)]
pub struct ListDirectoryOperationRequest {
    pub group: GroupId,
    pub path: String,
}

/// Split `/volume/a/b` into its non-empty segments.
pub fn path_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|segment| !segment.is_empty()).collect()
}

impl ListDirectoryOperation {
    pub fn new(store: Arc<KvStore>) -> Self {
        Self { store }
    }

    pub fn run(&self, request: ListDirectoryOperationRequest) -> Result<ListDirectoryResponse> {
        let ListDirectoryOperationRequest { group, path } = request;
        let segments = path_segments(&path);
        let Some((volume_name, rest)) = segments.split_first() else {
            return Err(StashError::InvalidRequest(format!(
                "path {:?} names no volume",
                path
            )));
        };

        self.store.view(|txn| {
            let volume = txn
                .volume(group, &volume_key(volume_name))?
                .ok_or_else(|| StashError::NotFound(format!("volume {}", volume_name)))?;
            let mut dir = txn
                .directory(group, &volume.root_dir)?
                .ok_or_else(|| StashError::NotFound(format!("root of volume {}", volume_name)))?;

            for segment in rest {
                dir = child_directory(txn, group, &dir, segment)?.ok_or_else(|| {
                    StashError::NotFound(format!("directory {} in {}", segment, path))
                })?;
            }

            let items = load_items(txn, group, &dir)?;
            Ok(ListDirectoryResponse {
                key: dir.key,
                name: dir.name,
                volume,
                items,
            })
        })
    }
}

fn child_directory(
    txn: &KvTxn<'_>,
    group: GroupId,
    parent: &Directory,
    name: &str,
) -> Result<Option<Directory>> {
    for token in parent.items.iter().filter(|token| token.kind == ItemKind::Dir) {
        if let Some(child) = txn.directory(group, &token.key)? {
            if child.name == name {
                return Ok(Some(child));
            }
        }
    }
    Ok(None)
}

fn load_items(txn: &KvTxn<'_>, group: GroupId, dir: &Directory) -> Result<Vec<DirectoryItem>> {
    let mut items = Vec::with_capacity(dir.items.len());
    for token in &dir.items {
        let item = match token.kind {
            ItemKind::File => txn.file_meta(group, &token.key)?.map(DirectoryItem::File),
            ItemKind::Dir => txn.directory(group, &token.key)?.map(DirectoryItem::Dir),
        };
        match item {
            Some(item) => items.push(item),
            None => tracing::warn!(
                "Directory {} lists missing {:?} {}",
                dir.key,
                token.kind,
                token.key
            ),
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DirectoryToken, FileMeta, Volume};

    fn seed(store: &KvStore) -> (Volume, Directory) {
        let key = volume_key("photos");
        let volume = Volume {
            name: "photos".to_string(),
            key,
            replications: 5,
            block_size: 1024,
            root_dir: key,
        };
        let sub = Directory::empty(volume_key("sub-dir"), "2024");
        let file = FileMeta {
            key: volume_key("file"),
            name: "cat.jpg".to_string(),
            block_size: 1024,
            blocks: Vec::new(),
            size: 0,
            created_at: 1,
            last_modified: 1,
        };
        let mut root = Directory::empty(key, "photos");
        root.items.push(DirectoryToken {
            kind: ItemKind::Dir,
            key: sub.key,
        });
        root.items.push(DirectoryToken {
            kind: ItemKind::File,
            key: file.key,
        });
        store
            .update(|txn| {
                txn.put_volume(1, &volume)?;
                txn.put_directory(1, &root)?;
                txn.put_directory(1, &sub)?;
                txn.put_file_meta(1, &file)
            })
            .unwrap();
        (volume, sub)
    }

    #[test]
    fn test_lists_volume_root_in_insertion_order() {
        let store = Arc::new(KvStore::open_in_memory().unwrap());
        let (volume, _) = seed(&store);
        let listing = ListDirectoryOperation::new(store)
            .run(ListDirectoryOperationRequest {
                group: 1,
                path: "/photos/".to_string(),
            })
            .unwrap();

        assert_eq!(listing.key, volume.root_dir);
        let names: Vec<_> = listing.items.iter().map(|item| item.name()).collect();
        assert_eq!(names, vec!["2024", "cat.jpg"]);
    }

    #[test]
    fn test_resolves_nested_path() {
        let store = Arc::new(KvStore::open_in_memory().unwrap());
        let (_, sub) = seed(&store);
        let operation = ListDirectoryOperation::new(store);
        let listing = operation
            .run(ListDirectoryOperationRequest {
                group: 1,
                path: "photos//2024".to_string(),
            })
            .unwrap();
        assert_eq!(listing.key, sub.key);
        assert!(listing.items.is_empty());

        let missing = operation.run(ListDirectoryOperationRequest {
            group: 1,
            path: "photos/2025".to_string(),
        });
        assert!(matches!(missing, Err(StashError::NotFound(_))));

        let empty = operation.run(ListDirectoryOperationRequest {
            group: 1,
            path: "/".to_string(),
        });
        assert!(matches!(empty, Err(StashError::InvalidRequest(_))));
    }
}
