//! In-memory [`BeaconStore`], used by tests and as the Go test suite's
//! `NewBoltStore` analogue when no on-disk durability is required.

use std::collections::BTreeMap;
use std::sync::RwLock;

use beacon_core::Beacon;

use crate::{BeaconStore, Result, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    rounds: RwLock<BTreeMap<u64, Beacon>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BeaconStore for MemoryStore {
    fn put(&self, beacon: Beacon) -> Result<()> {
        let mut rounds = self
            .rounds
            .write()
            .map_err(|_| StoreError::Corrupt("lock poisoned".into()))?;
        if let Some((&last_round, last)) = rounds.iter().next_back() {
            if beacon.round <= last_round {
                return Err(StoreError::Corrupt(format!(
                    "round {} is not after the last stored round {last_round}",
                    beacon.round
                )));
            }
            if beacon.previous_rand != last.randomness {
                return Err(StoreError::Corrupt(format!(
                    "round {} does not chain from the last stored round {last_round}",
                    beacon.round
                )));
            }
        }
        rounds.insert(beacon.round, beacon);
        Ok(())
    }

    fn last(&self) -> Result<Option<Beacon>> {
        let rounds = self
            .rounds
            .read()
            .map_err(|_| StoreError::Corrupt("lock poisoned".into()))?;
        Ok(rounds.values().next_back().cloned())
    }

    fn get(&self, round: u64) -> Result<Option<Beacon>> {
        let rounds = self
            .rounds
            .read()
            .map_err(|_| StoreError::Corrupt("lock poisoned".into()))?;
        Ok(rounds.get(&round).cloned())
    }

    fn cursor(&self, from: u64) -> Result<Vec<Beacon>> {
        let rounds = self
            .rounds
            .read()
            .map_err(|_| StoreError::Corrupt("lock poisoned".into()))?;
        Ok(rounds.range(from..).map(|(_, b)| b.clone()).collect())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
