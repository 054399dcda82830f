//! Wire types for the peer RPC surface (spec.md §6): `NewBeacon` asks a
//! peer to sign its partial over a round; `GetBeacon` asks a peer for a
//! beacon it has already committed, reusing the original node's
//! `drand_public.Public`-handler request/response family.

use beacon_core::bls::PartialSignature;
use beacon_core::Beacon;
use serde::{Deserialize, Serialize};

/// Request to sign the round `round`, given the caller's view of
/// `previous_rand`. Both sides must agree on `previous_rand` or the
/// resulting partials won't aggregate; the peer signer re-derives the
/// message itself rather than trusting a pre-hashed value.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BeaconRequest {
    pub round: u64,
    #[serde(with = "hex::serde")]
    pub previous_rand: Vec<u8>,
}

/// Response to a [`BeaconRequest`]: this peer's partial signature.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BeaconResponse {
    pub partial: PartialSignature,
}

/// Request for a historical, already-committed beacon. Used by the
/// catch-up engine (C7); never used to request a signing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GetBeaconRequest {
    pub round: u64,
}

/// Response to a [`GetBeaconRequest`]: the full, verifiable beacon.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GetBeaconResponse {
    pub beacon: Beacon,
}
