//! The `Beacon` data model (spec.md §3): one committed round of
//! randomness, chained to its predecessor the same way the original
//! node's `drand_public.Public` handler reports it (`PreviousRand`,
//! `Round`, `Randomness`).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{round, CoreError, Result};

#[derive(Error, Debug)]
pub enum BeaconError {
    #[error("beacon round {round} randomness does not verify against the group public key")]
    RandomnessMismatch { round: u64 },
    #[error("beacon round {round} does not chain from the expected previous randomness")]
    ChainMismatch { round: u64 },
    #[error("beacon round {round} belongs to a different signature group")]
    GroupMismatch { round: u64 },
}

/// One committed round. `randomness` is the canonical serialisation of
/// the recovered full threshold signature over
/// `round::message(previous_rand, round)` — it is both the proof and
/// the random output, spec.md §3; there is no separate signature field.
/// `gid` identifies the signature group/curve a verifier must use,
/// derived from the group descriptor via [`crate::group::GroupDescriptor::gid`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Beacon {
    pub round: u64,
    #[serde(with = "hex::serde")]
    pub previous_rand: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub randomness: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub gid: Vec<u8>,
}

impl Beacon {
    /// Builds a beacon from a freshly recovered full signature:
    /// `randomness` is that signature's canonical serialisation, stored
    /// as-is rather than hashed or otherwise transformed.
    pub fn new(round: u64, previous_rand: Vec<u8>, randomness: Vec<u8>, gid: Vec<u8>) -> Self {
        Beacon {
            round,
            previous_rand,
            randomness,
            gid,
        }
    }

    /// The message this beacon's signature was produced over.
    pub fn message(&self) -> Vec<u8> {
        round::message(&self.previous_rand, self.round)
    }

    /// Checks `gid` against the verifier's own group, then checks
    /// `randomness` as a full signature against the group public key.
    /// Does not check chaining against a predecessor; see
    /// [`Beacon::verify_chained`].
    pub fn verify(&self, group: &crate::group::GroupDescriptor) -> Result<()> {
        if self.gid != group.gid() {
            return Err(Box::new(BeaconError::GroupMismatch { round: self.round }) as CoreError);
        }
        let msg = self.message();
        if !crate::bls::verify_full(&group.group_public_key, &msg, &self.randomness)? {
            return Err(Box::new(BeaconError::RandomnessMismatch { round: self.round }) as CoreError);
        }
        Ok(())
    }

    /// Full verification including the chain link to `previous`: used by
    /// the catch-up engine (spec.md §4.6) walking backwards round by
    /// round.
    pub fn verify_chained(&self, previous: &Beacon, group: &crate::group::GroupDescriptor) -> Result<()> {
        if self.previous_rand != previous.randomness {
            return Err(Box::new(BeaconError::ChainMismatch { round: self.round }) as CoreError);
        }
        self.verify(group)
    }
}
