//! Catch-up engine (spec.md §4.6, C7): fills the gap between the last
//! stored round and the current scheduled round by pulling history from
//! peers. Strictly a consumer — it never signs or emits a partial.

use std::sync::Arc;
use std::time::SystemTime;

use beacon_core::group::GroupDescriptor;
use beacon_core::{bls, round};
use beacon_net::transport::PeerTransport;
use beacon_store::{BeaconStore, StoreError};
use thiserror::Error;
use tokio::sync::watch;

/// How many stalled one-period backoffs `run` tolerates on the *same*
/// blocking round before giving up on it (spec.md §7 `CatchupStalled`:
/// "no peer could serve a missing round after a bounded retry budget").
const MAX_STALL_RETRIES: usize = 3;

#[derive(Error, Debug)]
pub enum CatchupError {
    /// No peer served `round` after `attempts` backed-off sweeps.
    /// Non-fatal: the round is left as a permanent gap (spec.md §9) and
    /// the engine moves on so the driver can resume forward rounds;
    /// [`CatchupEngine::sweep_once`] keeps retrying it on later ticks.
    #[error("round {round} has no peer willing to serve it after {attempts} retries")]
    Stalled { round: u64, attempts: usize },
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct CatchupEngine {
    group: GroupDescriptor,
    self_index: u32,
    store: Arc<dyn BeaconStore>,
    transport: Arc<dyn PeerTransport>,
    seed: Vec<u8>,
}

impl CatchupEngine {
    pub fn new(
        group: GroupDescriptor,
        self_index: u32,
        store: Arc<dyn BeaconStore>,
        transport: Arc<dyn PeerTransport>,
        seed: Vec<u8>,
    ) -> Self {
        Self {
            group,
            self_index,
            store,
            transport,
            seed,
        }
    }

    /// Pulls rounds `r_have+1 ..= r_now-1` from peers, one period's
    /// backoff between sweeps that make no progress, until the store is
    /// current (`last().round + 1 == r_now`) or `shutdown` fires.
    ///
    /// A round that stalls `MAX_STALL_RETRIES` sweeps in a row is given
    /// up on (`CatchupError::Stalled`) rather than retried forever: spec.md
    /// §8 scenario 3 describes a round every honest peer permanently
    /// lacks, which this loop could otherwise block on indefinitely,
    /// preventing the driver from ever leaving startup catch-up.
    pub async fn run(&self, shutdown: &mut watch::Receiver<bool>) -> Result<(), CatchupError> {
        let mut stalled_round: Option<u64> = None;
        let mut stall_attempts = 0usize;

        loop {
            if *shutdown.borrow() {
                return Ok(());
            }

            let have = self.store.last()?.map(|b| b.round).unwrap_or(0);
            let (r_now, _) =
                round::round_at(self.group.genesis_time, self.group.period, SystemTime::now());

            if have + 1 >= r_now {
                return Ok(());
            }

            let mut stalled_at = None;
            for r in (have + 1)..r_now {
                if *shutdown.borrow() {
                    return Ok(());
                }
                if !self.fetch_round(r).await? {
                    stalled_at = Some(r);
                    break;
                }
            }

            let Some(r) = stalled_at else {
                // Made progress on every round this sweep; loop back around
                // to re-check whether the store is now current.
                continue;
            };

            stall_attempts = if stalled_round == Some(r) {
                stall_attempts + 1
            } else {
                stalled_round = Some(r);
                1
            };

            if stall_attempts >= MAX_STALL_RETRIES {
                return Err(CatchupError::Stalled {
                    round: r,
                    attempts: stall_attempts,
                });
            }

            log::warn!(
                "catch-up: no peer could serve round {r}, backing off one period (attempt {stall_attempts}/{MAX_STALL_RETRIES})"
            );
            tokio::select! {
                _ = tokio::time::sleep(self.group.period) => {}
                _ = shutdown.changed() => {}
            }
        }
    }

    /// Attempts exactly one pass over the rounds missing since the last
    /// stored one, stopping at the first round no peer can serve rather
    /// than backing off and retrying forever. Used by the round driver
    /// (spec.md §4.5 step 1) when it notices mid-run that it has fallen
    /// behind: a round that no peer can ever serve (every node missed it,
    /// spec.md §8 scenario 3) must not block the driver from signing
    /// rounds after it, so this never loops the way [`Self::run`] does.
    pub async fn sweep_once(&self, shutdown: &mut watch::Receiver<bool>) -> Result<(), StoreError> {
        let have = self.store.last()?.map(|b| b.round).unwrap_or(0);
        let (r_now, _) =
            round::round_at(self.group.genesis_time, self.group.period, SystemTime::now());

        for r in (have + 1)..r_now {
            if *shutdown.borrow() {
                return Ok(());
            }
            if !self.fetch_round(r).await? {
                log::debug!("catch-up: round {r} unavailable this sweep, leaving the gap for now");
                break;
            }
        }
        Ok(())
    }

    /// Tries each peer in round-robin order for round `r`; returns
    /// `Ok(true)` once committed, `Ok(false)` if every peer failed.
    async fn fetch_round(&self, r: u64) -> Result<bool, StoreError> {
        let previous_rand = if r == 1 {
            self.seed.clone()
        } else {
            match self.store.get(r - 1)? {
                Some(b) => b.randomness,
                None => return Ok(false),
            }
        };

        for peer in self
            .group
            .nodes
            .iter()
            .filter(|p| p.index != self.self_index)
        {
            let beacon = match self.transport.get_beacon(peer, r).await {
                Ok(b) => b,
                Err(e) => {
                    log::debug!("catch-up: peer {} failed for round {r}: {e}", peer.address);
                    continue;
                }
            };

            if beacon.round != r || beacon.previous_rand != previous_rand || beacon.gid != self.group.gid() {
                log::debug!("catch-up: peer {} sent a mismatched beacon for round {r}", peer.address);
                continue;
            }

            let msg = round::message(&previous_rand, r);
            match bls::verify_full(&self.group.group_public_key, &msg, &beacon.randomness) {
                Ok(true) => {
                    self.store.put(beacon)?;
                    return Ok(true);
                }
                _ => {
                    log::debug!("catch-up: peer {} sent an unverifiable beacon for round {r}", peer.address);
                    continue;
                }
            }
        }

        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use beacon_core::bls::PartialSignature;
    use beacon_core::group::PeerIdentity;
    use beacon_core::Beacon;
    use beacon_net::wire::BeaconRequest;
    use beacon_net::NetError;
    use beacon_store::memory::MemoryStore;
    use std::time::Duration;

    fn group(period_ms: u64) -> GroupDescriptor {
        GroupDescriptor {
            nodes: vec![
                PeerIdentity {
                    index: 0,
                    address: "self".into(),
                    commitment: vec![0u8; 48],
                    tls: false,
                },
                PeerIdentity {
                    index: 1,
                    address: "peer".into(),
                    commitment: vec![0u8; 48],
                    tls: false,
                },
            ],
            threshold: 1,
            group_public_key: vec![0u8; 48],
            period: Duration::from_millis(period_ms),
            genesis_time: 0,
        }
    }

    struct StaticTransport {
        beacons: std::collections::HashMap<u64, Beacon>,
    }

    #[async_trait]
    impl PeerTransport for StaticTransport {
        async fn new_beacon(
            &self,
            _peer: &PeerIdentity,
            _request: BeaconRequest,
        ) -> beacon_net::Result<PartialSignature> {
            unreachable!("catch-up never signs")
        }

        async fn get_beacon(&self, _peer: &PeerIdentity, round: u64) -> beacon_net::Result<Beacon> {
            self.beacons
                .get(&round)
                .cloned()
                .ok_or(NetError::NotFound { round })
        }
    }

    #[tokio::test]
    async fn no_op_when_already_current() {
        // genesis far enough in the past that round_at(now) == 0, so an
        // empty store is already "current" relative to the schedule.
        let group = GroupDescriptor {
            genesis_time: u64::MAX / 2,
            ..group(1)
        };
        let store: Arc<dyn BeaconStore> = Arc::new(MemoryStore::new());
        let transport = Arc::new(StaticTransport {
            beacons: Default::default(),
        });
        let engine = CatchupEngine::new(group, 0, store, transport, b"seed".to_vec());
        let (_tx, mut rx) = watch::channel(false);
        engine.run(&mut rx).await.unwrap();
    }

    /// Builds a trivial 1-of-1 "group" (a single real BLS keypair) so a
    /// test beacon's signature actually passes `verify_full`, without
    /// needing a multi-party DKG fixture.
    fn single_party_keypair(secret_seed: u64) -> (Vec<u8>, Vec<u8>) {
        use ark_bls12_381::{Fr, G1Affine, G1Projective};
        use ark_ec::{AffineRepr, CurveGroup};
        use ark_serialize::CanonicalSerialize;

        let secret = Fr::from(secret_seed);
        let mut secret_bytes = Vec::new();
        secret.serialize_compressed(&mut secret_bytes).unwrap();

        let pk = (G1Projective::from(G1Affine::generator()) * secret).into_affine();
        let mut pk_bytes = Vec::new();
        pk.serialize_compressed(&mut pk_bytes).unwrap();

        (secret_bytes, pk_bytes)
    }

    #[tokio::test]
    async fn fetches_and_chains_verifiable_rounds_from_a_peer() {
        let (secret, group_public_key) = single_party_keypair(42);

        // A group whose genesis is far enough in the past that round 2
        // is already due puts r_now well ahead of an empty store.
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap();
        let period = Duration::from_millis(10);
        let genesis = now.as_secs().saturating_sub(1);
        let group = GroupDescriptor {
            genesis_time: genesis,
            period,
            group_public_key: group_public_key.clone(),
            ..group(10)
        };

        let seed = b"seed".to_vec();
        let msg1 = round::message(&seed, 1);
        let sig1 = bls::sign_partial(0, &secret, &msg1).unwrap().signature;
        let beacon1 = Beacon::new(1, seed.clone(), sig1, group.gid());

        let msg2 = round::message(&beacon1.randomness, 2);
        let sig2 = bls::sign_partial(0, &secret, &msg2).unwrap().signature;
        let beacon2 = Beacon::new(2, beacon1.randomness.clone(), sig2, group.gid());

        let mut beacons = std::collections::HashMap::new();
        beacons.insert(1, beacon1.clone());
        beacons.insert(2, beacon2.clone());

        let store: Arc<dyn BeaconStore> = Arc::new(MemoryStore::new());
        let transport = Arc::new(StaticTransport { beacons });
        let engine = CatchupEngine::new(group, 0, Arc::clone(&store), transport, seed);
        let (_tx, mut rx) = watch::channel(false);

        engine.run(&mut rx).await.unwrap();

        assert_eq!(store.get(1).unwrap().unwrap().randomness, beacon1.randomness);
        assert_eq!(store.get(2).unwrap().unwrap().randomness, beacon2.randomness);
    }

    /// spec.md §7 `CatchupStalled`: a round no peer can ever serve must
    /// not block `run` forever. After `MAX_STALL_RETRIES` backed-off
    /// sweeps on round 1, `run` gives up and reports it rather than
    /// looping indefinitely.
    #[tokio::test]
    async fn run_gives_up_on_a_permanently_unreachable_round_after_the_retry_budget() {
        let group = GroupDescriptor {
            genesis_time: SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap()
                .as_secs()
                .saturating_sub(1),
            period: Duration::from_millis(10),
            ..group(10)
        };

        let store: Arc<dyn BeaconStore> = Arc::new(MemoryStore::new());
        let transport = Arc::new(StaticTransport {
            beacons: Default::default(),
        });
        let engine = CatchupEngine::new(group, 0, store, transport, b"seed".to_vec());
        let (_tx, mut rx) = watch::channel(false);

        // No shutdown signal needed: the bounded retry budget must make
        // `run` return on its own against a peer set that never answers.
        let result = tokio::time::timeout(Duration::from_secs(5), engine.run(&mut rx))
            .await
            .expect("run must not block forever on an unreachable round");

        assert!(matches!(
            result,
            Err(CatchupError::Stalled { round: 1, attempts }) if attempts == MAX_STALL_RETRIES
        ));
    }

    /// Shutdown still cancels `run` promptly even mid-backoff, before the
    /// retry budget is exhausted.
    #[tokio::test]
    async fn run_respects_shutdown_before_the_retry_budget_is_exhausted() {
        let group = GroupDescriptor {
            genesis_time: SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap()
                .as_secs()
                .saturating_sub(1),
            period: Duration::from_secs(60),
            ..group(10)
        };

        let store: Arc<dyn BeaconStore> = Arc::new(MemoryStore::new());
        let transport = Arc::new(StaticTransport {
            beacons: Default::default(),
        });
        let engine = CatchupEngine::new(group, 0, store, transport, b"seed".to_vec());
        let (tx, mut rx) = watch::channel(false);

        let handle = tokio::spawn(async move { engine.run(&mut rx).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        assert!(matches!(
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .expect("shutdown must cancel run promptly")
                .unwrap(),
            Ok(())
        ));
    }
}
