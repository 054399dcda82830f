//! Beacon storage (spec.md §4.3/§4.4): C3 is the `BeaconStore` trait plus
//! two implementations; C4 is the [`callback::CallbackStore`] decorator
//! any of them can be wrapped in.

pub mod callback;
pub mod memory;
pub mod parity;

use beacon_core::Beacon;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store is corrupt: {0}")]
    Corrupt(String),
    #[error("backend I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Append-only log of committed beacon rounds. Implementations must make
/// `put` durable before returning `Ok`, since the round driver (C6) only
/// advances past `Committed(r)` once `put` succeeds.
pub trait BeaconStore: Send + Sync {
    /// Appends `beacon`. Rounds are expected to arrive in increasing
    /// order; implementations may reject an out-of-order or duplicate
    /// round rather than silently overwrite.
    fn put(&self, beacon: Beacon) -> Result<()>;

    /// The highest round committed so far, or `None` for an empty store.
    fn last(&self) -> Result<Option<Beacon>>;

    /// A specific round, or `None` if it hasn't been committed.
    fn get(&self, round: u64) -> Result<Option<Beacon>>;

    /// All committed rounds from `from` (inclusive) to `last()`, in
    /// ascending order. Used by the catch-up engine (C7) to find the gap
    /// it needs to fill.
    fn cursor(&self, from: u64) -> Result<Vec<Beacon>>;

    /// Releases any resources the backend holds open. Idempotent.
    fn close(&self) -> Result<()>;
}
