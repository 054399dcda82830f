use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::{CoreError, Result};

/// Upper bound on how far into the future a genesis time may sit, used by
/// [`GroupDescriptor::verify_schedule`] as a basic sanity check against
/// obviously-wrong configuration (e.g. a genesis time entered in
/// milliseconds instead of seconds).
const MAX_GENESIS_SKEW: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 20);

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("share index {index} is out of range for a group of size {n}")]
    ShareIndexOutOfRange { index: u32, n: usize },
    #[error("threshold {threshold} exceeds group size {n}")]
    ThresholdExceedsGroupSize { threshold: usize, n: usize },
    #[error("threshold must be at least 1")]
    ZeroThreshold,
    #[error("period must be non-zero")]
    ZeroPeriod,
    #[error("genesis time is implausibly far in the future")]
    GenesisTooFarInFuture,
}

/// One peer in the group, as known by every node: its dial address, the
/// public commitment used to verify its partial signatures, and whether
/// to dial it over TLS. `index` is this peer's position in the threshold
/// scheme and must be stable for the lifetime of the group.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerIdentity {
    pub index: u32,
    pub address: String,
    #[serde(with = "hex::serde")]
    pub commitment: Vec<u8>,
    #[serde(default)]
    pub tls: bool,
}

/// Read-only description of the group a node participates in: the ordered
/// peer list, the threshold, and the `(genesis_time, period)` pair that
/// pins the round schedule. Lives for the process lifetime once loaded.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupDescriptor {
    pub nodes: Vec<PeerIdentity>,
    pub threshold: usize,
    #[serde(with = "hex::serde")]
    pub group_public_key: Vec<u8>,
    pub period: Duration,
    pub genesis_time: u64,
}

impl GroupDescriptor {
    pub fn n(&self) -> usize {
        self.nodes.len()
    }

    pub fn peer(&self, index: u32) -> Option<&PeerIdentity> {
        self.nodes.iter().find(|p| p.index == index)
    }

    /// Identifies this signature group, the way the teacher's
    /// `ChainInfo::group_hash` identifies which chain/parameters a
    /// beacon belongs to: a hash over the parameters that must match for
    /// two nodes' beacons to be comparable at all (spec.md §3 `gid`).
    /// Deterministic and derived, never configured by hand.
    pub fn gid(&self) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(&self.group_public_key);
        hasher.update(self.threshold.to_be_bytes());
        hasher.update(self.period.as_secs().to_be_bytes());
        hasher.update(self.genesis_time.to_be_bytes());
        hasher.finalize().to_vec()
    }

    /// Commitments ordered by share index, as [`crate::bls::verify_partial`]
    /// expects: `commitments()[i]` verifies the partial from index `i`.
    pub fn commitments(&self) -> Vec<Vec<u8>> {
        (0..self.n() as u32)
            .map(|i| {
                self.peer(i)
                    .map(|p| p.commitment.clone())
                    .unwrap_or_default()
            })
            .collect()
    }

    /// Validates the group descriptor against the invariants spec.md §4.1
    /// requires before a node starts driving rounds against it.
    pub fn verify_schedule(&self) -> Result<()> {
        if self.threshold == 0 {
            return Err(Box::new(ConfigError::ZeroThreshold));
        }
        if self.threshold > self.n() {
            return Err(Box::new(ConfigError::ThresholdExceedsGroupSize {
                threshold: self.threshold,
                n: self.n(),
            }));
        }
        if self.period.is_zero() {
            return Err(Box::new(ConfigError::ZeroPeriod));
        }
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        if Duration::from_secs(self.genesis_time) > now + MAX_GENESIS_SKEW {
            return Err(Box::new(ConfigError::GenesisTooFarInFuture));
        }
        Ok(())
    }

    /// Validates that `share_index` is a legitimate index into this group,
    /// as required before a node signs with it.
    pub fn verify_share_index(&self, index: u32) -> Result<()> {
        if (index as usize) >= self.n() {
            return Err(Box::new(ConfigError::ShareIndexOutOfRange {
                index,
                n: self.n(),
            }) as CoreError);
        }
        Ok(())
    }
}

/// The secret scalar share used to produce partial signatures, plus the
/// index identifying which peer's commitment verifies them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeShare {
    pub index: u32,
    #[serde(with = "hex::serde")]
    pub secret: Vec<u8>,
}
