use super::{CommitBlockArgs, ConfirmBlockArgs, ContractResult, Contracts, PendingKey};
use crate::consensus::LogEntry;
use crate::error::{Result, StashError};
use crate::model::Block;

impl Contracts {
    /// Note that `node_id` holds a copy of the block. Node-local, not agreed state.
    ///
    /// Confirmations are kept under the group whose log carried them.
    pub(crate) fn confirm_block(&self, args: ConfirmBlockArgs, entry: &LogEntry) -> Result<ContractResult> {
        if args.group != entry.group {
            return Err(StashError::InvalidRequest(format!(
                "confirmation for group {} applied in group {}",
                args.group, entry.group
            )));
        }
        self.pending.confirm(
            PendingKey {
                group: entry.group,
                index: args.index,
                file: args.file,
            },
            args.node_id,
        );
        tracing::debug!(
            "Confirmed block group={} file={} index={} host={}",
            entry.group,
            args.file,
            args.index,
            args.node_id
        );
        Ok(ContractResult::Ack)
    }

    pub(crate) fn commit_block(&self, args: CommitBlockArgs, entry: &LogEntry) -> Result<ContractResult> {
        if args.node_ids.is_empty() {
            return Err(StashError::InvalidRequest(
                "block commit names no hosts".to_string(),
            ));
        }

        let key = PendingKey {
            group: entry.group,
            index: args.index,
            file: args.file,
        };
        let confirmed = self.pending.hosts(&key).ok_or_else(|| {
            StashError::NotFound(format!(
                "no confirmations for block {} of file {}",
                args.index, args.file
            ))
        })?;
        if let Some(missing) = args.node_ids.iter().find(|id| !confirmed.contains(id)) {
            return Err(StashError::Conflict(format!(
                "host {} never confirmed block {} of file {}",
                missing, args.index, args.file
            )));
        }
        self.pending.remove(&key);

        let file = self.store.update(|txn| {
            let mut file = txn
                .file_meta(entry.group, &args.file)?
                .ok_or_else(|| StashError::NotFound(format!("file {}", args.file)))?;
            if file.block_count() != args.index {
                return Err(StashError::Conflict(format!(
                    "block {} committed out of order, file {} has {} blocks",
                    args.index,
                    args.file,
                    file.block_count()
                )));
            }

            let mut hosts = args.node_ids.clone();
            hosts.sort_unstable();
            hosts.dedup();
            file.blocks.push(Block {
                index: args.index,
                hosts,
            });
            file.last_modified = args.client_time;
            file.size = file.block_count() * u64::from(file.block_size);
            txn.put_file_meta(entry.group, &file)?;
            Ok(file)
        })?;

        tracing::info!(
            "Committed block {} of file {} on hosts {:?}",
            args.index,
            file.key,
            args.node_ids
        );
        Ok(ContractResult::File(file))
    }
}
