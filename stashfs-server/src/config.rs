use serde::{Deserialize, Serialize};
use stashfs_core::{
    GroupId, HostId, HostInfo, PendingConfig, QuorumConfig, Result, StashError, VolumePolicy,
};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub node: NodeConfig,
    pub group: GroupConfig,
    pub stash: StashConfig,
    #[serde(default)]
    pub quorum: QuorumConfig,
    #[serde(default)]
    pub pending: PendingConfig,
    #[serde(default)]
    pub volume_policy: VolumePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub host_id: HostId,
    pub bind_addr: String,
    #[serde(default)]
    pub advertise_addr: Option<String>,
    pub data_dir: PathBuf,
}

impl NodeConfig {
    pub fn effective_address(&self) -> String {
        self.advertise_addr
            .clone()
            .unwrap_or_else(|| self.bind_addr.clone())
    }

    pub fn host_info(&self) -> HostInfo {
        HostInfo {
            id: self.host_id,
            address: self.effective_address(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    pub id: GroupId,
}

/// Block storage this node offers to the group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StashConfig {
    pub capacity_bytes: u64,
}

impl Config {
    /// Load from a file, then let `STASHFS_`-prefixed environment variables
    /// override it (`STASHFS_NODE__BIND_ADDR`, ...).
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(path))
            .add_source(::config::Environment::with_prefix("STASHFS").separator("__"))
            .build()
            .map_err(|e| StashError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| StashError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.node.bind_addr.trim().is_empty() {
            return Err(StashError::Config("node.bind_addr cannot be empty".to_string()));
        }
        if self.node.data_dir.as_os_str().is_empty() {
            return Err(StashError::Config("node.data_dir cannot be empty".to_string()));
        }
        if self.stash.capacity_bytes == 0 {
            return Err(StashError::Config(
                "stash.capacity_bytes must be positive".to_string(),
            ));
        }
        let policy = &self.volume_policy;
        if policy.min_replications > policy.max_replications
            || policy.min_block_size > policy.max_block_size
        {
            return Err(StashError::Config(
                "volume_policy minimums exceed maximums".to_string(),
            ));
        }
        Ok(())
    }
}
