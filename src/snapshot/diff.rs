//! Sensor-set change detection between runs.

use crate::sensors::SensorReading;
use std::collections::BTreeSet;

/// Sensors that changed state since the previous run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SensorDiff {
    /// Sensors that came online. `None` unless new-sensor tracking is enabled.
    pub appeared: Option<BTreeSet<String>>,
    /// Sensors present last run and missing now
    pub disappeared: BTreeSet<String>,
}

impl SensorDiff {
    pub fn has_changes(&self) -> bool {
        !self.disappeared.is_empty() || self.appeared.as_ref().is_some_and(|a| !a.is_empty())
    }
}

fn current_names(current: &[SensorReading]) -> BTreeSet<String> {
    current.iter().map(|r| r.source().to_string()).collect()
}

/// Compare the previous run's sensor names with the current readings.
///
/// Only disappearances are detected; `appeared` is always `None`. New sensors
/// were never reported historically, and changing that is opt-in through
/// [`diff_tracking_appeared`].
pub fn diff(previous: &BTreeSet<String>, current: &[SensorReading]) -> SensorDiff {
    let current = current_names(current);
    SensorDiff {
        appeared: None,
        disappeared: previous.difference(&current).cloned().collect(),
    }
}

/// Like [`diff`], but also fills in the sensors that appeared.
pub fn diff_tracking_appeared(previous: &BTreeSet<String>, current: &[SensorReading]) -> SensorDiff {
    let names = current_names(current);
    SensorDiff {
        appeared: Some(names.difference(previous).cloned().collect()),
        ..diff(previous, current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_disappeared_only() {
        let previous = set(&["A", "B", "C"]);
        let current = vec![SensorReading::new(10, "A"), SensorReading::new(20, "C")];

        let d = diff(&previous, &current);
        assert_eq!(d.disappeared, set(&["B"]));
        assert_eq!(d.appeared, None);
        assert!(d.has_changes());
    }

    #[test]
    fn test_new_sensor_is_not_reported_by_default() {
        let previous = set(&["A"]);
        let current = vec![SensorReading::new(10, "A"), SensorReading::new(20, "D")];

        let d = diff(&previous, &current);
        assert!(d.appeared.is_none());
        assert!(!d.has_changes());
    }

    #[test]
    fn test_tracking_appeared() {
        let previous = set(&["A", "B"]);
        let current = vec![SensorReading::new(10, "A"), SensorReading::new(20, "D")];

        let d = diff_tracking_appeared(&previous, &current);
        assert_eq!(d.appeared, Some(set(&["D"])));
        assert_eq!(d.disappeared, set(&["B"]));
    }

    #[test]
    fn test_no_changes() {
        let previous = set(&["A"]);
        let current = vec![SensorReading::new(10, "A")];
        assert!(!diff_tracking_appeared(&previous, &current).has_changes());
    }
}
