use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a monitored patient
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientId(String);

impl PatientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PatientId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PatientId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One sampled set of vital signs.
///
/// Values are taken as delivered by the sensor; range checks happen in the
/// threshold evaluator so that a rejected reading can still be reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalSnapshot {
    pub patient_id: PatientId,
    /// Beats per minute
    pub heart_rate: f64,
    /// Blood oxygen saturation in percent
    pub spo2: f64,
    /// Body temperature in degrees Celsius
    pub temperature: f64,
    pub timestamp: DateTime<Utc>,
}

impl VitalSnapshot {
    pub fn new(
        patient_id: impl Into<PatientId>,
        heart_rate: f64,
        spo2: f64,
        temperature: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            patient_id: patient_id.into(),
            heart_rate,
            spo2,
            temperature,
            timestamp,
        }
    }

    /// Raw value of one metric
    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::HeartRate => self.heart_rate,
            Metric::Spo2 => self.spo2,
            Metric::Temperature => self.temperature,
        }
    }
}

/// A monitored vital sign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    HeartRate,
    Spo2,
    Temperature,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::HeartRate, Metric::Spo2, Metric::Temperature];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::HeartRate => "heart_rate",
            Metric::Spo2 => "spo2",
            Metric::Temperature => "temperature",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a single metric, ordered Normal < Warning < Critical
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricSeverity {
    Normal,
    Warning,
    Critical,
}

impl MetricSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricSeverity::Normal => "normal",
            MetricSeverity::Warning => "warning",
            MetricSeverity::Critical => "critical",
        }
    }
}

/// Per-metric severities derived from one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSeverities {
    pub heart_rate: MetricSeverity,
    pub spo2: MetricSeverity,
    pub temperature: MetricSeverity,
}

impl MetricSeverities {
    pub fn get(&self, metric: Metric) -> MetricSeverity {
        match metric {
            Metric::HeartRate => self.heart_rate,
            Metric::Spo2 => self.spo2,
            Metric::Temperature => self.temperature,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, MetricSeverity)> + '_ {
        Metric::ALL.into_iter().map(move |metric| (metric, self.get(metric)))
    }

    /// Highest severity across all metrics
    pub fn worst(&self) -> MetricSeverity {
        self.iter().map(|(_, severity)| severity).max().unwrap_or(MetricSeverity::Normal)
    }

    /// Number of metrics at exactly `severity`
    pub fn count_at(&self, severity: MetricSeverity) -> usize {
        self.iter().filter(|(_, s)| *s == severity).count()
    }

    /// Metrics at exactly `severity`, in declaration order
    pub fn metrics_at(&self, severity: MetricSeverity) -> Vec<Metric> {
        self.iter().filter(|(_, s)| *s == severity).map(|(metric, _)| metric).collect()
    }
}

impl Default for MetricSeverities {
    fn default() -> Self {
        Self {
            heart_rate: MetricSeverity::Normal,
            spo2: MetricSeverity::Normal,
            temperature: MetricSeverity::Normal,
        }
    }
}
