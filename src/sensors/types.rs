//! Sensor reading model.
//!
//! A reading is one sensor's air-quality index for the queried window, with
//! a severity band derived from fixed thresholds.

/// Severity band of an AQI value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Libre,
    Maso,
    NoTanBien,
    Insalubre,
    MuyInsalubre,
    Peligroso,
}

impl Severity {
    /// Classify an index. Each bound is the first value of the next band.
    pub fn from_index(index: i64) -> Self {
        if index < 51 {
            Severity::Libre
        } else if index < 101 {
            Severity::Maso
        } else if index < 151 {
            Severity::NoTanBien
        } else if index < 201 {
            Severity::Insalubre
        } else if index < 301 {
            Severity::MuyInsalubre
        } else {
            Severity::Peligroso
        }
    }

    /// Short name of the band.
    pub fn name(&self) -> &'static str {
        match self {
            Severity::Libre => "Libre",
            Severity::Maso => "Maso",
            Severity::NoTanBien => "No tan bien",
            Severity::Insalubre => "Insalubre",
            Severity::MuyInsalubre => "Muy Insalubre",
            Severity::Peligroso => "Peligroso",
        }
    }

    /// Emoji-prefixed label used in published reports.
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Libre => "🟢👍 Libre",
            Severity::Maso => "🟡😐 Maso",
            Severity::NoTanBien => "🟠⚠😷️👶💔👴🤰 No tan bien",
            Severity::Insalubre => "🔴⚠😷‼️ Insalubre",
            Severity::MuyInsalubre => "🟣☣️☣️ Muy Insalubre",
            Severity::Peligroso => "🟤☠️☠️ Peligroso",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One sensor's reading. Fields are private so severity always matches index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorReading {
    index: i64,
    source: String,
    severity: Severity,
}

impl SensorReading {
    pub fn new(index: i64, source: impl Into<String>) -> Self {
        Self {
            index,
            source: source.into(),
            severity: Severity::from_index(index),
        }
    }

    pub fn index(&self) -> i64 {
        self.index
    }

    /// Sensor description, or `Sensor {id}` when the API had none.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }
}

impl std::fmt::Display for SensorReading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{}:{}>", self.source, self.index)
    }
}
