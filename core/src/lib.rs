pub mod beacon;
pub mod bls;
pub mod group;
pub mod round;

pub use beacon::Beacon;
pub use group::{GroupDescriptor, NodeShare, PeerIdentity};

/// Boxed error type shared across this crate. Each module defines its own
/// `thiserror` enum and boxes it at the boundary, mirroring the pattern
/// `drand_core` uses for `DrandError`.
pub type CoreError = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, CoreError>;
