//! batchgridd library half: the simulated cluster the daemon drives.
//!
//! Kept out of `main.rs` so integration tests can build the same world.

pub mod sim;

pub use sim::{Landing, SimClock, SimCluster, SimStats, SimSummary};
