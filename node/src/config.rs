//! Node configuration loading (spec.md §6 "Inputs at construction"),
//! matching `dee::config`'s pattern of a small `serde`-backed struct
//! loaded from disk, except YAML on a path given on the command line
//! rather than a platform config directory, since a beacon node's
//! configuration is deployment-specific rather than per-user.

use std::path::{Path, PathBuf};
use std::time::Duration;

use beacon_core::group::{GroupDescriptor, NodeShare};
use serde::{Deserialize, Serialize};

fn default_dial_timeout_ms() -> u64 {
    5_000
}

fn default_catchup() -> bool {
    true
}

/// On-disk node configuration, loaded from a YAML file path given via
/// `--config`. Paths are resolved relative to the config file's own
/// directory when relative, so a node's config directory can be moved
/// around as a unit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Path to the group descriptor YAML (spec.md §3).
    pub group_path: PathBuf,
    /// Path to this node's secret share YAML.
    pub share_path: PathBuf,
    /// Hex-encoded seed used as `previous_rand` for round 1.
    pub seed: String,
    /// Directory the on-disk beacon store is opened in.
    pub store_path: PathBuf,
    /// Address this node's peer RPC server binds to.
    pub listen_address: String,
    #[serde(default = "default_dial_timeout_ms")]
    pub dial_timeout_ms: u64,
    #[serde(default = "default_catchup")]
    pub catchup: bool,
}

impl NodeConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let mut cfg: NodeConfig = serde_yaml::from_str(&raw)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        cfg.group_path = resolve(base, &cfg.group_path);
        cfg.share_path = resolve(base, &cfg.share_path);
        cfg.store_path = resolve(base, &cfg.store_path);
        Ok(cfg)
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn seed_bytes(&self) -> anyhow::Result<Vec<u8>> {
        Ok(hex::decode(&self.seed)?)
    }

    pub fn load_group(&self) -> anyhow::Result<GroupDescriptor> {
        let raw = std::fs::read_to_string(&self.group_path)?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    pub fn load_share(&self) -> anyhow::Result<NodeShare> {
        let raw = std::fs::read_to_string(&self.share_path)?;
        Ok(serde_yaml::from_str(&raw)?)
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
