//! Aire Bot - air-quality reports for social media.
//!
//! Fetches AQI readings from the AireLibre sensor network, renders a short
//! report, and posts it with a map screenshot to the configured platforms.
//! The operator is alerted over Telegram when the data source is down or
//! when sensors stop reporting.
//!
//! # Architecture
//!
//! ```text
//!  AQI API ──▶ Fetcher ──▶ Snapshot diff ──▶ Composer ──▶ Publishers
//!                 │              │                         ▲  (X, Bluesky,
//!                 ▼              ▼                         │   Mastodon)
//!             ┌──────────────────────┐               Screenshot
//!             │   Alerts (Telegram)  │
//!             └──────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use aire_bot::{Bot, Config};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load()?;
//! let mut bot = Bot::from_config(config)?;
//! let report = bot.run().await?;
//! println!("{}", report.report.text);
//! # Ok(())
//! # }
//! ```

pub mod alert;
pub mod bot;
pub mod config;
pub mod publish;
pub mod report;
pub mod screenshot;
pub mod sensors;
pub mod snapshot;
pub mod stats;

// Re-export key types at crate root for convenience
pub use alert::{AlertChannel, Alerter};
pub use bot::{Bot, BotError, ComposedReport, RunReport};
pub use config::Config;
pub use publish::{Post, PostRef, PublishError, PublishOutcome, Publisher};
pub use report::{chunk_report, Composer, ReportOrder};
pub use sensors::{AqiClient, FetchError, SensorReading, Severity};
pub use snapshot::{SensorDiff, SnapshotStore};
pub use stats::{RunLog, RunStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
