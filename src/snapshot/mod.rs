//! Change detection across runs: the persisted sensor snapshot and the diff.

pub mod diff;
pub mod store;

pub use diff::{diff, diff_tracking_appeared, SensorDiff};
pub use store::{SensorSnapshot, SnapshotError, SnapshotStore, SNAPSHOT_VERSION};
