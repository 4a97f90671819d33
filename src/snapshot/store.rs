//! Persistence of the sensor-name snapshot between runs.
//!
//! One JSON file, overwritten on every run. Only the labels are kept.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::sensors::SensorReading;

/// Current on-disk schema version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Sensor labels seen in one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub version: u32,
    pub captured_at: DateTime<Utc>,
    pub sensors: Vec<String>,
}

impl SensorSnapshot {
    /// Snapshot of the labels in `readings`, in reading order.
    pub fn from_readings(readings: &[SensorReading], captured_at: DateTime<Utc>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            captured_at,
            sensors: readings.iter().map(|r| r.source().to_string()).collect(),
        }
    }

    pub fn names(&self) -> BTreeSet<String> {
        self.sensors.iter().cloned().collect()
    }
}

/// Snapshot persistence errors.
#[derive(Debug)]
pub enum SnapshotError {
    /// No snapshot has been written yet
    Missing(PathBuf),
    Io(String),
    Parse(String),
    UnsupportedVersion(u32),
}

impl std::fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotError::Missing(path) => write!(f, "No snapshot at {path:?}"),
            SnapshotError::Io(e) => write!(f, "Snapshot IO error: {e}"),
            SnapshotError::Parse(e) => write!(f, "Snapshot parse error: {e}"),
            SnapshotError::UnsupportedVersion(v) => {
                write!(f, "Unsupported snapshot version {v} (expected {SNAPSHOT_VERSION})")
            }
        }
    }
}

impl std::error::Error for SnapshotError {}

/// File-backed snapshot store.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the previous run's snapshot.
    pub fn load(&self) -> Result<SensorSnapshot, SnapshotError> {
        if !self.path.exists() {
            return Err(SnapshotError::Missing(self.path.clone()));
        }

        let file = File::open(&self.path).map_err(|e| SnapshotError::Io(e.to_string()))?;
        let snapshot: SensorSnapshot = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| SnapshotError::Parse(e.to_string()))?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(snapshot.version));
        }
        Ok(snapshot)
    }

    /// Overwrite the stored snapshot.
    pub fn save(&self, snapshot: &SensorSnapshot) -> Result<(), SnapshotError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| SnapshotError::Io(e.to_string()))?;
            }
        }

        let file = File::create(&self.path).map_err(|e| SnapshotError::Io(e.to_string()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, snapshot)
            .map_err(|e| SnapshotError::Parse(e.to_string()))?;
        writer.flush().map_err(|e| SnapshotError::Io(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("nested").join("sensors.json"));

        let readings = vec![SensorReading::new(10, "A"), SensorReading::new(99, "B")];
        let snapshot = SensorSnapshot::from_readings(&readings, Utc::now());
        store.save(&snapshot).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, snapshot);
        assert_eq!(loaded.names(), ["A", "B"].iter().map(|s| s.to_string()).collect());
    }

    #[test]
    fn test_missing_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("sensors.json"));
        assert!(matches!(store.load(), Err(SnapshotError::Missing(_))));
    }

    #[test]
    fn test_corrupt_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sensors.json");
        std::fs::write(&path, b"\x80\x04\x95 not json").unwrap();
        assert!(matches!(
            SnapshotStore::new(&path).load(),
            Err(SnapshotError::Parse(_))
        ));
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sensors.json");
        std::fs::write(
            &path,
            r#"{"version": 7, "captured_at": "2024-01-01T00:00:00Z", "sensors": ["A"]}"#,
        )
        .unwrap();
        assert!(matches!(
            SnapshotStore::new(&path).load(),
            Err(SnapshotError::UnsupportedVersion(7))
        ));
    }
}
