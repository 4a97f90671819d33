//! Cumulative run statistics.
//!
//! Counters survive across runs in a small JSON file so `aire-bot status`
//! can show how the bot has been doing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::publish::PublishOutcome;

/// Counters for all runs so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunStats {
    pub runs: u64,
    pub fetch_failures: u64,
    pub posts_published: u64,
    pub publish_failures: u64,
    pub alerts_sent: u64,
    pub last_run: Option<DateTime<Utc>>,
    /// Sensors in the last successful fetch
    pub last_sensor_count: Option<usize>,
}

/// Run statistics bound to a file.
#[derive(Debug)]
pub struct RunLog {
    stats: RunStats,
    persist_path: Option<PathBuf>,
}

impl RunLog {
    /// In-memory log.
    pub fn new() -> Self {
        Self {
            stats: RunStats::default(),
            persist_path: None,
        }
    }

    /// Log backed by `path`, starting from its previous contents if any.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::warn!("Could not load previous run stats: {e}");
        }

        log
    }

    pub fn record_run_started(&mut self) {
        self.stats.runs += 1;
        self.stats.last_run = Some(Utc::now());
    }

    pub fn record_fetch_failure(&mut self) {
        self.stats.fetch_failures += 1;
    }

    pub fn record_fetch(&mut self, sensors: usize) {
        self.stats.last_sensor_count = Some(sensors);
    }

    pub fn record_alerts(&mut self, count: u64) {
        self.stats.alerts_sent += count;
    }

    pub fn record_publish(&mut self, outcomes: &[PublishOutcome]) {
        for outcome in outcomes {
            self.stats.posts_published += outcome.posted.len() as u64;
            if !outcome.is_success() {
                self.stats.publish_failures += 1;
            }
        }
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Human-readable summary.
    pub fn summary(&self) -> String {
        let stats = &self.stats;
        let last_run = stats
            .last_run
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        let sensors = stats
            .last_sensor_count
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-".to_string());
        format!(
            "Run Statistics:\n\
             - Runs: {}\n\
             - Last run: {}\n\
             - Sensors in last fetch: {}\n\
             - Fetch failures: {}\n\
             - Posts published: {}\n\
             - Publish failures: {}\n\
             - Alerts sent: {}",
            stats.runs,
            last_run,
            sensors,
            stats.fetch_failures,
            stats.posts_published,
            stats.publish_failures,
            stats.alerts_sent
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let json = serde_json::to_string_pretty(&self.stats).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                self.stats = serde_json::from_str(&content).map_err(std::io::Error::other)?;
            }
        }
        Ok(())
    }
}

impl Default for RunLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::{PostRef, PublishError};

    #[test]
    fn test_counting() {
        let mut log = RunLog::new();
        log.record_run_started();
        log.record_fetch(12);
        log.record_alerts(1);
        log.record_publish(&[
            PublishOutcome {
                platform: "twitter".to_string(),
                posted: vec![PostRef::new("1"), PostRef::new("2")],
                error: None,
            },
            PublishOutcome {
                platform: "mastodon".to_string(),
                posted: Vec::new(),
                error: Some(PublishError::Network("down".to_string())),
            },
        ]);

        let stats = log.stats();
        assert_eq!(stats.runs, 1);
        assert_eq!(stats.posts_published, 2);
        assert_eq!(stats.publish_failures, 1);
        assert_eq!(stats.alerts_sent, 1);
        assert_eq!(stats.last_sensor_count, Some(12));
        assert!(stats.last_run.is_some());
    }

    #[test]
    fn test_persistence_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");

        let mut first = RunLog::with_persistence(path.clone());
        first.record_run_started();
        first.record_fetch_failure();
        first.save().unwrap();

        let mut second = RunLog::with_persistence(path);
        second.record_run_started();
        assert_eq!(second.stats().runs, 2);
        assert_eq!(second.stats().fetch_failures, 1);
    }

    #[test]
    fn test_summary_format() {
        let summary = RunLog::new().summary();
        assert!(summary.contains("Runs: 0"));
        assert!(summary.contains("Last run: never"));
        assert!(summary.contains("Alerts sent"));
    }
}
