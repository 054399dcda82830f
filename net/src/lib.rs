//! Peer RPC surface (spec.md §6): wire types, the [`PeerTransport`] trait
//! the round driver and catch-up engine call through, an HTTP+JSON
//! implementation of both halves, and C5's [`signer::PeerSigner`].

pub mod http;
pub mod signer;
pub mod transport;
pub mod wire;

pub use transport::PeerTransport;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetError {
    #[error("dial to peer {peer} failed: {message}")]
    Dial { peer: String, message: String },
    #[error("call to peer {peer} timed out")]
    Timeout { peer: String },
    #[error("peer {peer} rejected the request: {message}")]
    Rejected { peer: String, message: String },
    #[error("peer {peer} returned a malformed response: {message}")]
    Malformed { peer: String, message: String },
    #[error("requested round {round} is outside the acceptance window [{low}, {high}]")]
    OutsideWindow { round: u64, low: u64, high: u64 },
    #[error("round {round} has not been committed")]
    NotFound { round: u64 },
    #[error(transparent)]
    Crypto(#[from] beacon_core::CoreError),
    #[error(transparent)]
    Store(#[from] beacon_store::StoreError),
}

pub type Result<T> = std::result::Result<T, NetError>;
