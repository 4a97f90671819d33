//! Report rendering.

use crate::config::ReportConfig;
use crate::sensors::SensorReading;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp format printed under the header.
pub const REPORT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Ordering of the lines in a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum ReportOrder {
    /// As returned by the API
    Natural,
    /// Worst air first
    IndexDescending,
    /// By sensor label
    Alphabetical,
}

/// Return the readings in the requested order. Sorting is stable.
pub fn sorted(readings: &[SensorReading], order: ReportOrder) -> Vec<SensorReading> {
    let mut out = readings.to_vec();
    match order {
        ReportOrder::Natural => {}
        ReportOrder::IndexDescending => out.sort_by(|a, b| b.index().cmp(&a.index())),
        ReportOrder::Alphabetical => out.sort_by(|a, b| {
            a.source()
                .to_lowercase()
                .cmp(&b.source().to_lowercase())
        }),
    }
    out
}

/// One report line.
pub fn format_line(reading: &SensorReading) -> String {
    format!(
        "{}: {} - {}",
        reading.source(),
        reading.index(),
        reading.severity().label()
    )
}

/// Render readings under `header` (followed by `updated`) and above `footer`.
pub fn build_report(readings: &[SensorReading], header: &str, updated: &str, footer: &str) -> String {
    let mut text = format!("{header}\n{updated}\n");
    for reading in readings {
        text.push('\n');
        text.push_str(&format_line(reading));
    }
    text.push_str("\n\n");
    text.push_str(footer);
    text.push('\n');
    text
}

/// Builds reports with the configured header, footer and timezone.
#[derive(Debug, Clone)]
pub struct Composer {
    config: ReportConfig,
}

impl Composer {
    pub fn new(config: ReportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// Render `readings` in `order`, stamped with `now` in local time.
    pub fn compose(
        &self,
        readings: &[SensorReading],
        order: ReportOrder,
        now: DateTime<Utc>,
    ) -> String {
        let updated = now
            .with_timezone(&self.config.tz())
            .format(REPORT_TIME_FORMAT)
            .to_string();
        build_report(
            &sorted(readings, order),
            &self.config.header,
            &updated,
            &self.config.footer,
        )
    }
}
