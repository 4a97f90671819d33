//! Client for the air-quality API.
//!
//! Queries a trailing time window and turns the JSON payload into
//! [`SensorReading`]s. Transient failures are retried with exponential
//! backoff before the source is declared unavailable.

use crate::config::{RetryConfig, SourceConfig};
use crate::sensors::types::SensorReading;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use std::time::Duration;

/// Timestamp format expected by the API for `start`/`end`.
pub const QUERY_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Fetch error types.
#[derive(Debug)]
pub enum FetchError {
    /// Retries exhausted, or the final response was not 200
    NetworkUnavailable { attempts: u32, reason: String },
    /// The body was not the expected JSON
    Parse(String),
    /// The HTTP client could not be built
    Config(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::NetworkUnavailable { attempts, reason } => {
                write!(f, "AQI source unavailable after {attempts} attempt(s): {reason}")
            }
            FetchError::Parse(msg) => write!(f, "AQI payload error: {msg}"),
            FetchError::Config(msg) => write!(f, "AQI client config error: {msg}"),
        }
    }
}

impl std::error::Error for FetchError {}

/// One element of the API response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSensor {
    #[serde(default)]
    pub description: Option<String>,
    /// Sensor identifier; the API sends strings or numbers
    pub source: serde_json::Value,
    pub quality: ApiQuality,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiQuality {
    pub index: serde_json::Number,
}

impl ApiSensor {
    /// Label shown in reports.
    pub fn label(&self) -> String {
        match self.description.as_deref() {
            Some(d) if !d.trim().is_empty() => d.to_string(),
            _ => {
                let id = match &self.source {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                format!("Sensor {id}")
            }
        }
    }

    pub fn into_reading(self) -> Result<SensorReading, FetchError> {
        let index = self
            .quality
            .index
            .as_i64()
            .or_else(|| self.quality.index.as_f64().map(|f| f.round() as i64))
            .ok_or_else(|| FetchError::Parse(format!("invalid index {}", self.quality.index)))?;
        Ok(SensorReading::new(index, self.label()))
    }
}

/// Parse an API response body into readings, keeping API order.
pub fn parse_readings(body: &str) -> Result<Vec<SensorReading>, FetchError> {
    let sensors: Vec<ApiSensor> =
        serde_json::from_str(body).map_err(|e| FetchError::Parse(e.to_string()))?;
    sensors.into_iter().map(ApiSensor::into_reading).collect()
}

/// Delay before retry number `retry` (1-based).
pub fn backoff_delay(policy: &RetryConfig, retry: u32) -> Duration {
    let exp = retry.saturating_sub(1).min(31);
    let millis = policy.backoff_factor_ms.saturating_mul(1u64 << exp);
    Duration::from_millis(millis).min(policy.max_backoff)
}

/// Air-quality API client.
pub struct AqiClient {
    config: SourceConfig,
    client: reqwest::Client,
}

impl AqiClient {
    /// Create a new client.
    pub fn new(config: SourceConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FetchError::Config(e.to_string()))?;

        Ok(Self { config, client })
    }

    /// Build the query URL for the window ending at `end`.
    pub fn query_url(&self, end: DateTime<Utc>, window_minutes: i64) -> String {
        let start = end - ChronoDuration::minutes(window_minutes);
        format!(
            "{}?start={}&end={}",
            self.config.endpoint,
            start.format(QUERY_TIME_FORMAT),
            end.format(QUERY_TIME_FORMAT)
        )
    }

    /// Fetch readings for the configured trailing window.
    pub async fn fetch(&self) -> Result<Vec<SensorReading>, FetchError> {
        self.fetch_readings(self.config.window_minutes).await
    }

    /// Fetch readings for `[now - window_minutes, now]`.
    pub async fn fetch_readings(
        &self,
        window_minutes: i64,
    ) -> Result<Vec<SensorReading>, FetchError> {
        let url = self.query_url(Utc::now(), window_minutes);
        tracing::info!(%url, "fetching AQI readings");

        let body = self.get_with_retry(&url).await?;
        let readings = parse_readings(&body)?;

        tracing::info!(sensors = readings.len(), "fetched AQI readings");
        Ok(readings)
    }

    async fn get_with_retry(&self, url: &str) -> Result<String, FetchError> {
        let policy = &self.config.retry;
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let reason = match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status == reqwest::StatusCode::OK {
                        return response.text().await.map_err(|e| {
                            FetchError::NetworkUnavailable {
                                attempts: attempt,
                                reason: format!("failed reading body: {e}"),
                            }
                        });
                    }

                    if !policy.retry_statuses.contains(&status.as_u16()) {
                        return Err(FetchError::NetworkUnavailable {
                            attempts: attempt,
                            reason: format!("unexpected status {status}"),
                        });
                    }
                    format!("status {status}")
                }
                Err(e) => e.to_string(),
            };

            if attempt >= max_attempts {
                return Err(FetchError::NetworkUnavailable {
                    attempts: attempt,
                    reason,
                });
            }

            let delay = backoff_delay(policy, attempt);
            tracing::warn!(attempt, %reason, delay_ms = delay.as_millis() as u64, "AQI request failed, retrying");
            tokio::time::sleep(delay).await;
        }
    }
}
