//! Round driver (spec.md §4.5, C6): the ticker + per-round fan-out +
//! aggregation state machine. States `Idle -> Signing(r) ->
//! Aggregating(r) -> Committed(r) -> Idle`; cancellation collapses any
//! state to terminal.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use beacon_core::bls::{self, PartialSignature};
use beacon_core::group::GroupDescriptor;
use beacon_core::{round, Beacon};
use beacon_net::transport::PeerTransport;
use beacon_net::wire::BeaconRequest;
use beacon_store::BeaconStore;
use thiserror::Error;
use tokio::sync::watch;

use crate::catchup::{CatchupEngine, CatchupError};

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("invalid group configuration: {0}")]
    Config(beacon_core::CoreError),
    #[error(transparent)]
    Store(#[from] beacon_store::StoreError),
}

/// Observable driver state, useful for tests and for a future metrics
/// surface; not part of the wire protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Signing(u64),
    Aggregating(u64),
    Committed(u64),
}

pub struct RoundDriver {
    group: GroupDescriptor,
    self_index: u32,
    secret_share: Vec<u8>,
    store: Arc<dyn BeaconStore>,
    transport: Arc<dyn PeerTransport>,
    seed: Vec<u8>,
    dial_timeout: Duration,
    state: Mutex<DriverState>,
}

impl RoundDriver {
    pub fn new(
        group: GroupDescriptor,
        self_index: u32,
        secret_share: Vec<u8>,
        store: Arc<dyn BeaconStore>,
        transport: Arc<dyn PeerTransport>,
        seed: Vec<u8>,
        dial_timeout: Duration,
    ) -> Self {
        Self {
            group,
            self_index,
            secret_share,
            store,
            transport,
            seed,
            dial_timeout,
            state: Mutex::new(DriverState::Idle),
        }
    }

    pub fn state(&self) -> DriverState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, state: DriverState) {
        *self.state.lock().unwrap() = state;
    }

    fn per_call_deadline(&self) -> Duration {
        std::cmp::min(self.group.period / 2, self.dial_timeout)
    }

    fn catchup_engine(&self) -> CatchupEngine {
        CatchupEngine::new(
            self.group.clone(),
            self.self_index,
            Arc::clone(&self.store),
            Arc::clone(&self.transport),
            self.seed.clone(),
        )
    }

    /// Runs the driver until `shutdown` is signalled. If `catchup` is
    /// set, first pulls any rounds missing since the last run before
    /// entering the tick loop (spec.md §4.6, §8 boundary behaviour: "a
    /// round tick whose genesis+r*P has already passed at startup is
    /// skipped into catch-up, not signed").
    pub async fn run(
        self: Arc<Self>,
        catchup: bool,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), DriverError> {
        round::verify_schedule(&self.group).map_err(DriverError::Config)?;

        if catchup {
            match self.catchup_engine().run(&mut shutdown).await {
                Ok(()) => {}
                Err(CatchupError::Stalled { round, attempts }) => {
                    log::warn!(
                        "startup catch-up gave up on round {round} after {attempts} attempts; \
                         continuing with a gap, later rounds will keep retrying it in the background"
                    );
                }
                Err(CatchupError::Store(e)) => return Err(DriverError::Store(e)),
            }
        }

        loop {
            if *shutdown.borrow() {
                self.set_state(DriverState::Idle);
                return Ok(());
            }

            let now = SystemTime::now();
            let (current_round, next_tick) =
                round::round_at(self.group.genesis_time, self.group.period, now);
            let target_round = current_round + 1;

            let sleep_for = next_tick
                .duration_since(SystemTime::now())
                .unwrap_or(Duration::ZERO);

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        self.set_state(DriverState::Idle);
                        return Ok(());
                    }
                }
            }

            if *shutdown.borrow() {
                self.set_state(DriverState::Idle);
                return Ok(());
            }

            self.run_round(target_round, &mut shutdown).await?;
        }
    }

    /// Drives a single round to completion or abandonment. Only store
    /// errors propagate (spec.md §7: store failure is fatal to the
    /// driver); transport and per-partial crypto errors are logged and
    /// absorbed.
    async fn run_round(
        &self,
        r: u64,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), DriverError> {
        self.set_state(DriverState::Signing(r));

        let last = self.store.last()?;
        let have = last.as_ref().map(|b| b.round).unwrap_or(0);
        if r > 1 && have < r - 1 {
            log::warn!("round {r}: store at {have}, falling behind schedule, attempting catch-up");
            // A single bounded sweep, not `CatchupEngine::run`: if the gap is
            // a round nobody ever produced (spec.md §8 scenario 3, §9 "gap on
            // failed round"), catch-up can never close it, and this round
            // must still proceed chained from whatever is now the last
            // *stored* beacon rather than block forever waiting for round
            // `r - 1` specifically.
            self.catchup_engine()
                .sweep_once(shutdown)
                .await
                .map_err(DriverError::Store)?;
        }

        // Re-read: the sweep above may have advanced the store. `previous_rand`
        // always chains from the last stored beacon (spec.md §4.5 step 1,
        // §9), never from `r - 1` specifically, since a missed round leaves a
        // hole without corrupting the chain for rounds after it.
        let previous_rand = if r == 1 {
            self.seed.clone()
        } else {
            match self.store.last()? {
                Some(b) => b.randomness,
                None => {
                    log::warn!("round {r}: no prior beacon available after catch-up, abandoning");
                    self.set_state(DriverState::Idle);
                    return Ok(());
                }
            }
        };

        let msg = round::message(&previous_rand, r);
        let local_partial = match bls::sign_partial(self.self_index, &self.secret_share, &msg) {
            Ok(p) => p,
            Err(e) => return Err(DriverError::Config(e)),
        };

        self.set_state(DriverState::Aggregating(r));

        let threshold = self.group.threshold;
        let n = self.group.n();
        let commitments = self.group.commitments();

        let mut seen = HashSet::new();
        let mut partials: Vec<PartialSignature> = Vec::new();
        seen.insert(local_partial.index);
        partials.push(local_partial);

        let deadline = self.per_call_deadline();
        let request = BeaconRequest {
            round: r,
            previous_rand: previous_rand.clone(),
        };

        let mut calls = tokio::task::JoinSet::new();
        for peer in self
            .group
            .nodes
            .iter()
            .filter(|p| p.index != self.self_index)
            .cloned()
        {
            let transport = Arc::clone(&self.transport);
            let req = request.clone();
            calls.spawn(async move {
                let outcome = tokio::time::timeout(deadline, transport.new_beacon(&peer, req)).await;
                (peer, outcome)
            });
        }

        while partials.len() < threshold && !calls.is_empty() {
            tokio::select! {
                joined = calls.join_next() => {
                    match joined {
                        Some(Ok((peer, Ok(Ok(partial))))) => {
                            if partial.index as usize >= n {
                                log::warn!("peer {} returned out-of-range partial index {}", peer.address, partial.index);
                                continue;
                            }
                            if !seen.insert(partial.index) {
                                continue;
                            }
                            match bls::verify_partial(&commitments, &msg, &partial) {
                                Ok(true) => partials.push(partial),
                                Ok(false) => log::warn!("peer {} sent an invalid partial for round {r}", peer.address),
                                Err(e) => log::warn!("peer {} partial failed to verify: {e}", peer.address),
                            }
                        }
                        Some(Ok((peer, Ok(Err(e))))) => {
                            log::warn!("peer {} rejected NewBeacon for round {r}: {e}", peer.address);
                        }
                        Some(Ok((peer, Err(_elapsed)))) => {
                            log::warn!("peer {} timed out on round {r}", peer.address);
                        }
                        Some(Err(_join_err)) => {}
                        None => break,
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        calls.abort_all();
                        self.set_state(DriverState::Idle);
                        return Ok(());
                    }
                }
            }
        }

        if partials.len() < threshold {
            log::warn!(
                "round {r}: only gathered {}/{threshold} partials before abandoning",
                partials.len()
            );
            self.set_state(DriverState::Idle);
            return Ok(());
        }

        let full_sig = match bls::recover(threshold, n, &partials) {
            Ok(sig) => sig,
            Err(e) => {
                log::error!("round {r}: recover failed despite {threshold} valid partials: {e}");
                self.set_state(DriverState::Idle);
                return Ok(());
            }
        };

        match bls::verify_full(&self.group.group_public_key, &msg, &full_sig) {
            Ok(true) => {}
            _ => {
                log::error!("round {r}: recovered signature failed full verification, abandoning");
                self.set_state(DriverState::Idle);
                return Ok(());
            }
        }

        let beacon = Beacon::new(r, previous_rand, full_sig, self.group.gid());
        self.set_state(DriverState::Committed(r));
        self.store.put(beacon)?;
        self.set_state(DriverState::Idle);
        Ok(())
    }
}
