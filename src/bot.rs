//! One bot run: fetch, detect sensor changes, compose, capture, publish.
//!
//! Steps run in sequence. Only a failed fetch stops the run; every other
//! failure is logged and the run carries on with what it has.

use crate::alert::Alerter;
use crate::config::Config;
use crate::publish::{publish_all, publishers_from_config, Publication, PublishOutcome, Publisher};
use crate::report::{Composer, ReportOrder};
use crate::screenshot::{collector_from_config, ScreenshotCollector};
use crate::sensors::{AqiClient, FetchError, SensorReading};
use crate::snapshot::{diff, diff_tracking_appeared, SensorDiff, SensorSnapshot, SnapshotError, SnapshotStore};
use crate::stats::RunLog;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::Instrument;
use uuid::Uuid;

/// Order of the published post text.
pub const POST_ORDER: ReportOrder = ReportOrder::IndexDescending;
/// Order of the image description.
pub const ALT_TEXT_ORDER: ReportOrder = ReportOrder::Alphabetical;

/// Bot error types.
#[derive(Debug)]
pub enum BotError {
    /// The AQI source could not be read; the operator has been alerted
    Fetch(FetchError),
}

impl std::fmt::Display for BotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BotError::Fetch(e) => write!(f, "Run aborted: {e}"),
        }
    }
}

impl std::error::Error for BotError {}

impl From<FetchError> for BotError {
    fn from(e: FetchError) -> Self {
        BotError::Fetch(e)
    }
}

/// The two report variants of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedReport {
    /// Worst sensors first; posted as text
    pub text: String,
    /// Alphabetical; attached as image description
    pub alt_text: String,
}

/// What a run did.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub readings: Vec<SensorReading>,
    /// `None` when there was no usable previous snapshot
    pub diff: Option<SensorDiff>,
    pub report: ComposedReport,
    pub image: Option<PathBuf>,
    pub outcomes: Vec<PublishOutcome>,
}

/// Everything needed for a run, built once from [`Config`].
pub struct Bot {
    config: Config,
    fetcher: AqiClient,
    composer: Composer,
    store: SnapshotStore,
    alerter: Alerter,
    screenshots: Box<dyn ScreenshotCollector>,
    publishers: Vec<Box<dyn Publisher>>,
    log: RunLog,
}

impl Bot {
    /// Build a bot with the collaborators named in `config`.
    pub fn from_config(config: Config) -> Result<Self, BotError> {
        let alerter = Alerter::from_config(&config);
        let screenshots = collector_from_config(&config.screenshot);
        let publishers = publishers_from_config(&config);
        Self::new(config, alerter, screenshots, publishers)
    }

    /// Build a bot with explicit collaborators.
    pub fn new(
        config: Config,
        alerter: Alerter,
        screenshots: Box<dyn ScreenshotCollector>,
        publishers: Vec<Box<dyn Publisher>>,
    ) -> Result<Self, BotError> {
        let fetcher = AqiClient::new(config.source.clone())?;
        let composer = Composer::new(config.report.clone());
        let store = SnapshotStore::new(config.snapshot_path());
        let log = RunLog::with_persistence(config.stats_path());

        Ok(Self {
            config,
            fetcher,
            composer,
            store,
            alerter,
            screenshots,
            publishers,
            log,
        })
    }

    pub fn publisher_names(&self) -> Vec<&str> {
        self.publishers.iter().map(|p| p.name()).collect()
    }

    pub fn stats(&self) -> &RunLog {
        &self.log
    }

    /// Run once. Stats are saved whatever the outcome.
    pub async fn run(&mut self) -> Result<RunReport, BotError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run", %run_id);

        let alerts_before = self.alerter.sent();
        self.log.record_run_started();
        let result = self.run_steps(run_id).instrument(span).await;
        self.log.record_alerts(self.alerter.sent() - alerts_before);

        if let Err(e) = self.log.save() {
            tracing::warn!("Could not save run stats: {e}");
        }
        result
    }

    async fn run_steps(&mut self, run_id: Uuid) -> Result<RunReport, BotError> {
        let readings = self.fetch().await?;
        let diff = self.detect_changes(&readings).await;
        let report = self.compose(&readings, Utc::now());

        if readings.is_empty() {
            tracing::warn!("AQI source returned no sensors, nothing to publish");
            return Ok(RunReport {
                run_id,
                readings,
                diff,
                report,
                image: None,
                outcomes: Vec::new(),
            });
        }

        let image = self.screenshots.capture().await;
        let publication = Publication {
            text: &report.text,
            alt_text: &report.alt_text,
            image: image.as_deref(),
            chunk_limit: self.config.report.chunk_limit,
            thread_replies: self.config.publish.thread_replies,
        };
        let outcomes = publish_all(&self.publishers, &publication).await;
        self.log.record_publish(&outcomes);

        Ok(RunReport {
            run_id,
            readings,
            diff,
            report,
            image,
            outcomes,
        })
    }

    /// Fetch readings, alerting the operator when the source is down.
    pub async fn fetch(&mut self) -> Result<Vec<SensorReading>, FetchError> {
        match self.fetcher.fetch().await {
            Ok(readings) => {
                self.log.record_fetch(readings.len());
                Ok(readings)
            }
            Err(e) => {
                tracing::error!("{e}");
                self.log.record_fetch_failure();
                if matches!(e, FetchError::NetworkUnavailable { .. }) {
                    self.alerter.network_down().await;
                }
                Err(e)
            }
        }
    }

    /// Compare with the previous snapshot, alert on changes, then overwrite
    /// the snapshot with the current sensors.
    pub async fn detect_changes(&mut self, readings: &[SensorReading]) -> Option<SensorDiff> {
        let result = match self.store.load() {
            Ok(previous) => {
                let previous = previous.names();
                let d = if self.config.change_detection.track_new_sensors {
                    diff_tracking_appeared(&previous, readings)
                } else {
                    diff(&previous, readings)
                };
                if d.has_changes() {
                    tracing::info!(disappeared = ?d.disappeared, appeared = ?d.appeared, "sensor set changed");
                    self.alerter.sensor_diff(&d).await;
                }
                Some(d)
            }
            Err(SnapshotError::Missing(path)) => {
                tracing::info!(?path, "no previous sensor snapshot, skipping change detection");
                None
            }
            Err(e) => {
                tracing::warn!("Skipping change detection: {e}");
                None
            }
        };

        let snapshot = SensorSnapshot::from_readings(readings, Utc::now());
        if let Err(e) = self.store.save(&snapshot) {
            tracing::warn!("Could not save sensor snapshot: {e}");
        }

        result
    }

    /// Render both report variants.
    pub fn compose(&self, readings: &[SensorReading], now: DateTime<Utc>) -> ComposedReport {
        ComposedReport {
            text: self.composer.compose(readings, POST_ORDER, now),
            alt_text: self.composer.compose(readings, ALT_TEXT_ORDER, now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::LogChannel;
    use crate::screenshot::NoScreenshot;

    fn test_bot(dir: &std::path::Path) -> Bot {
        let config = Config {
            data_path: dir.to_path_buf(),
            ..Config::default()
        };
        Bot::new(
            config,
            Alerter::new(Box::new(LogChannel), ""),
            Box::new(NoScreenshot),
            Vec::new(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_first_run_writes_snapshot_without_diff() {
        let dir = tempfile::tempdir().unwrap();
        let mut bot = test_bot(dir.path());

        let readings = vec![SensorReading::new(10, "A"), SensorReading::new(20, "B")];
        assert!(bot.detect_changes(&readings).await.is_none());

        let d = bot.detect_changes(&readings[..1]).await.unwrap();
        assert_eq!(d.disappeared.len(), 1);
        assert!(d.disappeared.contains("B"));
        assert!(d.appeared.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sensors.json"), "garbage").unwrap();
        let mut bot = test_bot(dir.path());

        let readings = vec![SensorReading::new(10, "A")];
        assert!(bot.detect_changes(&readings).await.is_none());
        assert!(bot.detect_changes(&readings).await.is_some());
    }

    #[test]
    fn test_compose_variants() {
        let dir = tempfile::tempdir().unwrap();
        let bot = test_bot(dir.path());
        let readings = vec![SensorReading::new(30, "Areguá"), SensorReading::new(180, "Zeballos")];

        let report = bot.compose(&readings, Utc::now());
        let z = report.text.find("Zeballos").unwrap();
        let a = report.text.find("Areguá").unwrap();
        assert!(z < a, "worst sensor first");

        let z = report.alt_text.find("Zeballos").unwrap();
        let a = report.alt_text.find("Areguá").unwrap();
        assert!(a < z, "alphabetical");
    }
}
