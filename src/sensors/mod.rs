//! Air-quality sensor data: the reading model and the API client.

pub mod fetcher;
pub mod types;

pub use fetcher::{parse_readings, AqiClient, FetchError};
pub use types::{SensorReading, Severity};
