//! The round driver (C6), catch-up engine (C7), and node configuration
//! loading for a drand-style beacon node. The `beacond` binary
//! (`src/bin/beacond.rs`) wires these to the `net` crate's HTTP
//! transport and `store` crate's on-disk backend to run a node process.

pub mod catchup;
pub mod config;
pub mod driver;

pub use catchup::{CatchupEngine, CatchupError};
pub use config::NodeConfig;
pub use driver::{DriverError, DriverState, RoundDriver};
