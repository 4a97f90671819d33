//! Run statistics persisted across invocations.

pub mod log;

pub use log::{RunLog, RunStats};
