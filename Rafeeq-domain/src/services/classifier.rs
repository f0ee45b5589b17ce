//! Emotional state classifier

use serde::Serialize;

use crate::entities::{EmotionalState, Metric, MetricSeverities, MetricSeverity};

/// Combine per-metric severities into one distress level.
///
/// The worst severity decides, and two or more simultaneous critical metrics
/// are promoted one level further.
pub fn classify(severities: &MetricSeverities) -> EmotionalState {
    match severities.count_at(MetricSeverity::Critical) {
        0 if severities.worst() == MetricSeverity::Warning => EmotionalState::MildStress,
        0 => EmotionalState::Stable,
        1 => EmotionalState::ModerateDistress,
        _ => EmotionalState::CriticalDistress,
    }
}

/// Classification of one snapshot together with the metrics behind it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment {
    pub severities: MetricSeverities,
    pub state: EmotionalState,
    /// Critical metrics when any, otherwise warning metrics
    pub metrics: Vec<Metric>,
}

pub fn assess(severities: MetricSeverities) -> Assessment {
    let critical = severities.metrics_at(MetricSeverity::Critical);
    let metrics = if critical.is_empty() {
        severities.metrics_at(MetricSeverity::Warning)
    } else {
        critical
    };

    Assessment {
        state: classify(&severities),
        severities,
        metrics,
    }
}
