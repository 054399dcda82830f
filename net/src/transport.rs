//! The `PeerTransport` trait (spec.md §6): the seam the round driver
//! (C6) and catch-up engine (C7) call through to reach other nodes. The
//! core protocol logic never depends on HTTP directly — tests wire up an
//! in-process mock transport instead, mirroring the Go test suite's
//! in-memory `Handler` wiring (`examples/original_source/beacon/beacon_test.go`).

use async_trait::async_trait;
use beacon_core::bls::PartialSignature;
use beacon_core::group::PeerIdentity;
use beacon_core::Beacon;

use crate::wire::BeaconRequest;
use crate::Result;

/// Outbound half of the peer RPC surface. One implementation per
/// transport (HTTP+JSON in [`crate::http`], in-memory for tests).
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Asks `peer` to sign its partial over `request`.
    async fn new_beacon(
        &self,
        peer: &PeerIdentity,
        request: BeaconRequest,
    ) -> Result<PartialSignature>;

    /// Asks `peer` for the beacon it has committed for `round`.
    async fn get_beacon(&self, peer: &PeerIdentity, round: u64) -> Result<Beacon>;
}
