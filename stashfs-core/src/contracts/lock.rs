use super::{AcquireLockArgs, ContractResult, Contracts, ReleaseLockArgs};
use crate::consensus::LogEntry;
use crate::error::{Result, StashError};
use crate::model::FileWriteLock;

impl Contracts {
    /// Grant, renew, or take over an expired write lock.
    pub(crate) fn acquire_lock(&self, args: AcquireLockArgs, entry: &LogEntry) -> Result<ContractResult> {
        self.store.update(|txn| {
            if txn.file_meta(entry.group, &args.file)?.is_none() {
                return Err(StashError::NotFound(format!("file {}", args.file)));
            }

            let acquired_at = match txn.write_lock(entry.group, &args.file)? {
                Some(existing) if existing.owner == args.owner => existing.acquired_at,
                Some(existing) if !existing.expired_at(args.client_time) => {
                    return Err(StashError::Conflict(format!(
                        "write lock of file {} already acquired by {}",
                        args.file, existing.owner
                    )));
                }
                Some(existing) => {
                    tracing::info!(
                        "Write lock of file {} expired, owner {} replaced by {}",
                        args.file,
                        existing.owner,
                        args.owner
                    );
                    args.client_time
                }
                None => args.client_time,
            };

            txn.put_write_lock(&FileWriteLock {
                group: entry.group,
                key: args.file,
                owner: args.owner,
                acquired_at,
                lease_until: args.lease_until,
            })
        })?;
        Ok(ContractResult::Ack)
    }

    pub(crate) fn release_lock(&self, args: ReleaseLockArgs, entry: &LogEntry) -> Result<ContractResult> {
        let removed = self
            .store
            .update(|txn| txn.delete_write_lock(entry.group, &args.file))?;
        if !removed {
            return Err(StashError::NotFound(format!(
                "write lock of file {}",
                args.file
            )));
        }
        Ok(ContractResult::Ack)
    }
}
