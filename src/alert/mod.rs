//! Operator alerting.
//!
//! Alerts go out when the AQI source is unreachable and when the set of
//! reporting sensors changes. Delivery failures are logged, never raised.

pub mod telegram;

use crate::config::Config;
use crate::snapshot::SensorDiff;
use async_trait::async_trait;
use std::collections::BTreeSet;

pub use telegram::TelegramChannel;

/// Alert delivery errors.
#[derive(Debug)]
pub enum AlertError {
    Config(String),
    Network(String),
    Server { status: u16, message: String },
}

impl std::fmt::Display for AlertError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertError::Config(msg) => write!(f, "Alert config error: {msg}"),
            AlertError::Network(msg) => write!(f, "Alert network error: {msg}"),
            AlertError::Server { status, message } => {
                write!(f, "Alert server error ({status}): {message}")
            }
        }
    }
}

impl std::error::Error for AlertError {}

/// A destination for operator messages.
#[async_trait]
pub trait AlertChannel: Send + Sync {
    fn name(&self) -> &str;

    /// Whether messages reach the operator outside the bot's own log.
    fn reaches_operator(&self) -> bool {
        true
    }

    async fn send(&self, text: &str) -> Result<(), AlertError>;
}

/// Fallback channel that only writes to the log.
pub struct LogChannel;

#[async_trait]
impl AlertChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    fn reaches_operator(&self) -> bool {
        false
    }

    async fn send(&self, text: &str) -> Result<(), AlertError> {
        tracing::warn!(alert = %text, "operator alert (no alert channel configured)");
        Ok(())
    }
}

/// Text of the network-down alert.
pub fn network_down_message(user: &str) -> String {
    format!("-- HEY!!! Network down {user}").trim_end().to_string()
}

fn join_names(names: &BTreeSet<String>) -> String {
    if names.is_empty() {
        "-".to_string()
    } else {
        names.iter().cloned().collect::<Vec<_>>().join(", ")
    }
}

/// Text of the sensor-change alert.
pub fn sensor_diff_message(diff: &SensorDiff) -> String {
    let appeared = match &diff.appeared {
        Some(names) => join_names(names),
        None => "sin seguimiento".to_string(),
    };
    format!(
        "-- Cambio de sensores\nCaídos: {}\nNuevos: {}",
        join_names(&diff.disappeared),
        appeared
    )
}

/// Sends the bot's two kinds of alerts over one channel.
pub struct Alerter {
    channel: Box<dyn AlertChannel>,
    network_down_user: String,
    sent: u64,
}

impl Alerter {
    pub fn new(channel: Box<dyn AlertChannel>, network_down_user: impl Into<String>) -> Self {
        Self {
            channel,
            network_down_user: network_down_user.into(),
            sent: 0,
        }
    }

    /// Telegram when configured, otherwise the log.
    pub fn from_config(config: &Config) -> Self {
        match &config.telegram {
            Some(telegram) => match TelegramChannel::new(telegram.clone()) {
                Ok(channel) => Self::new(Box::new(channel), telegram.network_down_user.clone()),
                Err(e) => {
                    tracing::warn!("Telegram alerts disabled: {e}");
                    Self::new(Box::new(LogChannel), "")
                }
            },
            None => Self::new(Box::new(LogChannel), ""),
        }
    }

    pub fn channel_name(&self) -> &str {
        self.channel.name()
    }

    /// Number of alerts delivered to the operator so far. Alerts that only
    /// went to the log are not counted.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub async fn network_down(&mut self) -> bool {
        let text = network_down_message(&self.network_down_user);
        self.deliver(&text).await
    }

    pub async fn sensor_diff(&mut self, diff: &SensorDiff) -> bool {
        let text = sensor_diff_message(diff);
        self.deliver(&text).await
    }

    async fn deliver(&mut self, text: &str) -> bool {
        match self.channel.send(text).await {
            Ok(()) => {
                if self.channel.reaches_operator() {
                    self.sent += 1;
                }
                true
            }
            Err(e) => {
                tracing::error!(channel = self.channel.name(), "Failed to send alert: {e}");
                false
            }
        }
    }
}
