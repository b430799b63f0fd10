use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const KIB: u32 = 1024;
pub const MIB: u32 = 1024 * 1024;

/// Bounds applied to a volume when NEW_VOLUME is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumePolicy {
    #[serde(default = "default_min_replications")]
    pub min_replications: u32,
    #[serde(default = "default_max_replications")]
    pub max_replications: u32,
    #[serde(default = "default_min_block_size")]
    pub min_block_size: u32,
    #[serde(default = "default_max_block_size")]
    pub max_block_size: u32,
}

fn default_min_replications() -> u32 {
    5
}

fn default_max_replications() -> u32 {
    32
}

fn default_min_block_size() -> u32 {
    KIB
}

fn default_max_block_size() -> u32 {
    10 * MIB
}

impl Default for VolumePolicy {
    fn default() -> Self {
        Self {
            min_replications: default_min_replications(),
            max_replications: default_max_replications(),
            min_block_size: default_min_block_size(),
            max_block_size: default_max_block_size(),
        }
    }
}

impl VolumePolicy {
    pub fn clamp_replications(&self, requested: u32) -> u32 {
        requested.clamp(self.min_replications, self.max_replications)
    }

    pub fn clamp_block_size(&self, requested: u32) -> u32 {
        requested.clamp(self.min_block_size, self.max_block_size)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuorumConfig {
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

fn default_call_timeout_ms() -> u64 {
    10_000
}

impl Default for QuorumConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

impl QuorumConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// Lifetime of unconfirmed block placements held in node memory.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PendingConfig {
    #[serde(default = "default_pending_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_pending_ttl_secs() -> u64 {
    5 * 60
}

impl Default for PendingConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_pending_ttl_secs(),
        }
    }
}

impl PendingConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_policy_clamps() {
        let policy = VolumePolicy::default();
        assert_eq!(policy.clamp_replications(1), 5);
        assert_eq!(policy.clamp_replications(100), 32);
        assert_eq!(policy.clamp_replications(7), 7);
        assert_eq!(policy.clamp_block_size(0), 1024);
        assert_eq!(policy.clamp_block_size(50 * MIB), 10 * MIB);
        assert_eq!(policy.clamp_block_size(8 * KIB), 8 * KIB);
    }

    #[test]
    fn test_partial_policy_uses_defaults() {
        let policy: VolumePolicy = serde_json::from_str(r#"{"min_replications": 3}"#).unwrap();
        assert_eq!(policy.min_replications, 3);
        assert_eq!(policy.max_block_size, 10 * MIB);
    }
}
