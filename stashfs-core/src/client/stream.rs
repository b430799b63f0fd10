use super::{StashFs, client_time};
use crate::error::{Result, StashError};
use crate::model::{BlockData, FileMeta, HostId, Volume};
use crate::operations::NewBlockOperationRequest;
use crate::rpc::BlockRequest;
use futures_util::future::join_all;

#[derive(Debug)]
struct LoadedBlock {
    block: BlockData,
    dirty: bool,
}

/// Byte cursor over a file's blocks.
///
/// Holds at most one block in memory. Writes land in that buffer and reach
/// the block's hosts on [`FileStream::flush`], which also happens implicitly
/// whenever the cursor moves to another block. Not meant to be shared
/// between tasks; concurrent writers coordinate through the file write lock.
pub struct FileStream {
    fs: StashFs,
    volume: Volume,
    file: FileMeta,
    offset: u64,
    current: Option<LoadedBlock>,
}

impl FileStream {
    pub(crate) fn new(fs: StashFs, volume: Volume, file: FileMeta) -> Result<Self> {
        if file.block_size == 0 {
            return Err(StashError::InvalidRequest(format!(
                "file {} has zero block size",
                file.key
            )));
        }
        Ok(Self {
            fs,
            volume,
            file,
            offset: 0,
            current: None,
        })
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn meta(&self) -> &FileMeta {
        &self.file
    }

    fn block_size(&self) -> u64 {
        u64::from(self.file.block_size)
    }

    fn position(&self) -> (u64, usize) {
        let block_size = self.block_size();
        (self.offset / block_size, (self.offset % block_size) as usize)
    }

    /// Move the cursor, allocating blocks up to the target if the file is shorter.
    pub async fn seek(&mut self, pos: u64) -> Result<()> {
        self.offset = pos;
        let (index, _) = self.position();
        self.ensure_block(index, true).await?;
        Ok(())
    }

    /// Read from the cursor up to the written tail. Returns bytes copied.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut copied = 0;
        while copied < buf.len() {
            let (index, within) = self.position();
            if !self.ensure_block(index, false).await? {
                break;
            }
            let Some(loaded) = self.current.as_ref() else {
                break;
            };
            let tail = loaded.block.tail as usize;
            if within >= tail {
                break;
            }
            let count = (tail - within).min(buf.len() - copied);
            buf[copied..copied + count].copy_from_slice(&loaded.block.data[within..within + count]);
            copied += count;
            self.offset += count as u64;
        }
        Ok(copied)
    }

    /// Write at the cursor, allocating blocks as the cursor passes the end.
    pub async fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let block_size = self.block_size() as usize;
        let mut written = 0;
        while written < buf.len() {
            let (index, within) = self.position();
            self.ensure_block(index, true).await?;
            let loaded = self.current.as_mut().ok_or_else(|| {
                StashError::Internal(format!("block {} not loaded for write", index))
            })?;
            let count = (block_size - within).min(buf.len() - written);
            loaded.block.data[within..within + count].copy_from_slice(&buf[written..written + count]);
            loaded.block.tail = loaded.block.tail.max((within + count) as u32);
            loaded.dirty = true;
            written += count;
            self.offset += count as u64;
        }
        Ok(written)
    }

    /// Push the buffered block to every host holding it.
    pub async fn flush(&mut self) -> Result<()> {
        let Some(loaded) = self.current.as_ref() else {
            return Ok(());
        };
        if !loaded.dirty {
            return Ok(());
        }

        let index = loaded.block.index;
        let hosts: Vec<HostId> = self
            .file
            .block(index)
            .map(|block| block.hosts.clone())
            .unwrap_or_default();
        let quorum = self.fs.quorum();
        let block = &loaded.block;
        let pushes = hosts.iter().map(|&host_id| async move {
            let outcome = async {
                let host = quorum
                    .consensus()
                    .host(host_id)
                    .await?
                    .ok_or_else(|| StashError::NotFound(format!("host {}", host_id)))?;
                let node = quorum.connector().connect(&host)?;
                node.set_block(block.clone()).await
            }
            .await;
            (host_id, outcome)
        });

        let mut landed = 0;
        for (host_id, outcome) in join_all(pushes).await {
            match outcome {
                Ok(result) if result.succeed => landed += 1,
                Ok(_) => tracing::warn!("Host {} refused block {}", host_id, index),
                Err(error) => tracing::warn!(
                    "Failed to land block {} of file {} on host {}: {}",
                    index,
                    self.file.key,
                    host_id,
                    error
                ),
            }
        }

        if landed == 0 {
            return Err(StashError::PlacementFailure(format!(
                "no host accepted block {} of file {}",
                index, self.file.key
            )));
        }
        if let Some(loaded) = self.current.as_mut() {
            loaded.dirty = false;
        }
        tracing::debug!(
            "Landed block {} of file {} on {}/{} hosts",
            index,
            self.file.key,
            landed,
            hosts.len()
        );
        Ok(())
    }

    pub async fn close(mut self) -> Result<()> {
        self.flush().await
    }

    /// Make block `index` resident. Returns false when it does not exist and
    /// `create` is off.
    async fn ensure_block(&mut self, index: u64, create: bool) -> Result<bool> {
        if self
            .current
            .as_ref()
            .is_some_and(|loaded| loaded.block.index == index)
        {
            return Ok(true);
        }

        self.flush().await?;
        self.current = None;

        while self.file.block_count() <= index {
            if !create {
                return Ok(false);
            }
            self.allocate_block().await?;
        }

        let block = self.fetch_block(index).await?;
        self.current = Some(LoadedBlock {
            block,
            dirty: false,
        });
        Ok(true)
    }

    async fn allocate_block(&mut self) -> Result<()> {
        let result = self
            .fs
            .new_block()
            .run(NewBlockOperationRequest {
                group: self.fs.group(),
                file: self.file.key,
                index: self.file.block_count(),
                replications: self.volume.replications,
                client_time: client_time(),
            })
            .await?;
        self.file = result.file;
        Ok(())
    }

    async fn fetch_block(&self, index: u64) -> Result<BlockData> {
        let hosts = self
            .file
            .block(index)
            .map(|block| block.hosts.clone())
            .ok_or_else(|| {
                StashError::NotFound(format!("block {} of file {}", index, self.file.key))
            })?;

        let quorum = self.fs.quorum();
        let mut members = Vec::with_capacity(hosts.len());
        for host_id in hosts {
            match quorum.consensus().host(host_id).await? {
                Some(host) => members.push(host),
                None => tracing::warn!("Block {} lists unknown host {}", index, host_id),
            }
        }

        let request = BlockRequest {
            group: self.fs.group(),
            file: self.file.key,
            index,
        };
        let mut block = quorum
            .majority_among(&members, move |node| async move {
                let block = node.get_block(request).await?;
                let feature = block.feature();
                Ok::<_, StashError>((block, feature))
            })
            .await
            .ok_or_else(|| {
                StashError::QuorumFailure(format!(
                    "no agreed copy of block {} of file {}",
                    index, self.file.key
                ))
            })?;

        let block_size = self.file.block_size as usize;
        if block.tail as usize > block_size || block.data.len() > block_size {
            return Err(StashError::Decode(format!(
                "block {} of file {} does not fit block size {}: tail={} len={}",
                index,
                self.file.key,
                block_size,
                block.tail,
                block.data.len()
            )));
        }
        if block.data.len() < block_size {
            block.data.resize(block_size, 0);
        }
        Ok(block)
    }
}
