//! Threshold evaluator: maps one snapshot to per-metric severities

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::entities::{Metric, MetricSeverities, MetricSeverity, VitalSnapshot};
use crate::error::EngineError;

/// Plausible heart rate ceiling in bpm
pub const MAX_HEART_RATE: f64 = 300.0;
/// Plausible body temperature range in °C
pub const MIN_TEMPERATURE: f64 = 30.0;
pub const MAX_TEMPERATURE: f64 = 44.0;

/// Warning and critical boundaries per metric. Both sides are inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_threshold_order"))]
pub struct VitalThresholds {
    #[validate(range(min = 1.0, max = 300.0))]
    pub heart_rate_warning: f64,
    #[validate(range(min = 1.0, max = 300.0))]
    pub heart_rate_critical: f64,
    #[validate(range(min = 0.0, max = 100.0))]
    pub spo2_warning: f64,
    #[validate(range(min = 0.0, max = 100.0))]
    pub spo2_critical: f64,
    #[validate(range(min = 30.0, max = 44.0))]
    pub temperature_warning: f64,
    #[validate(range(min = 30.0, max = 44.0))]
    pub temperature_critical: f64,
}

impl Default for VitalThresholds {
    fn default() -> Self {
        Self {
            heart_rate_warning: 120.0,
            heart_rate_critical: 140.0,
            spo2_warning: 93.0,
            spo2_critical: 90.0,
            temperature_warning: 37.5,
            temperature_critical: 38.5,
        }
    }
}

/// Rising metrics need warning <= critical, SpO2 falls so the order flips
fn validate_threshold_order(thresholds: &VitalThresholds) -> Result<(), ValidationError> {
    if thresholds.heart_rate_warning > thresholds.heart_rate_critical {
        return Err(ValidationError::new("heart_rate_warning_above_critical"));
    }
    if thresholds.spo2_warning < thresholds.spo2_critical {
        return Err(ValidationError::new("spo2_warning_below_critical"));
    }
    if thresholds.temperature_warning > thresholds.temperature_critical {
        return Err(ValidationError::new("temperature_warning_above_critical"));
    }
    Ok(())
}

/// Evaluate a snapshot against the thresholds.
///
/// Rejects values outside the physical domain of each metric instead of
/// classifying them.
pub fn evaluate(snapshot: &VitalSnapshot, thresholds: &VitalThresholds) -> Result<MetricSeverities, EngineError> {
    check_domain(snapshot)?;

    Ok(MetricSeverities {
        heart_rate: rising(snapshot.heart_rate, thresholds.heart_rate_warning, thresholds.heart_rate_critical),
        spo2: falling(snapshot.spo2, thresholds.spo2_warning, thresholds.spo2_critical),
        temperature: rising(
            snapshot.temperature,
            thresholds.temperature_warning,
            thresholds.temperature_critical,
        ),
    })
}

fn rising(value: f64, warning: f64, critical: f64) -> MetricSeverity {
    if value >= critical {
        MetricSeverity::Critical
    } else if value >= warning {
        MetricSeverity::Warning
    } else {
        MetricSeverity::Normal
    }
}

fn falling(value: f64, warning: f64, critical: f64) -> MetricSeverity {
    if value <= critical {
        MetricSeverity::Critical
    } else if value <= warning {
        MetricSeverity::Warning
    } else {
        MetricSeverity::Normal
    }
}

fn check_domain(snapshot: &VitalSnapshot) -> Result<(), EngineError> {
    for metric in Metric::ALL {
        let value = snapshot.value(metric);
        let invalid = |reason: &str| EngineError::InvalidReading {
            metric,
            value,
            reason: reason.to_string(),
        };

        if !value.is_finite() {
            return Err(invalid("value is not a finite number"));
        }

        match metric {
            Metric::HeartRate if value < 0.0 => return Err(invalid("heart rate cannot be negative")),
            Metric::HeartRate if value > MAX_HEART_RATE => return Err(invalid("heart rate above 300 bpm")),
            Metric::Spo2 if !(0.0..=100.0).contains(&value) => {
                return Err(invalid("SpO2 must be between 0 and 100 percent"))
            }
            Metric::Temperature if !(MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&value) => {
                return Err(invalid("temperature outside 30-44 °C"))
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snapshot(heart_rate: f64, spo2: f64, temperature: f64) -> VitalSnapshot {
        VitalSnapshot::new("patient-1", heart_rate, spo2, temperature, Utc::now())
    }

    fn eval(heart_rate: f64, spo2: f64, temperature: f64) -> MetricSeverities {
        evaluate(&snapshot(heart_rate, spo2, temperature), &VitalThresholds::default()).unwrap()
    }

    #[test]
    fn test_normal_reading() {
        assert_eq!(eval(75.0, 97.0, 36.8), MetricSeverities::default());
    }

    #[test]
    fn test_boundaries_are_inclusive() {
        assert_eq!(eval(119.9, 97.0, 36.8).heart_rate, MetricSeverity::Normal);
        assert_eq!(eval(120.0, 97.0, 36.8).heart_rate, MetricSeverity::Warning);
        assert_eq!(eval(140.0, 97.0, 36.8).heart_rate, MetricSeverity::Critical);

        assert_eq!(eval(75.0, 93.1, 36.8).spo2, MetricSeverity::Normal);
        assert_eq!(eval(75.0, 93.0, 36.8).spo2, MetricSeverity::Warning);
        assert_eq!(eval(75.0, 90.0, 36.8).spo2, MetricSeverity::Critical);

        assert_eq!(eval(75.0, 97.0, 37.4).temperature, MetricSeverity::Normal);
        assert_eq!(eval(75.0, 97.0, 37.5).temperature, MetricSeverity::Warning);
        assert_eq!(eval(75.0, 97.0, 38.5).temperature, MetricSeverity::Critical);
    }

    #[test]
    fn test_heart_rate_scenario() {
        let severities = eval(145.0, 98.0, 36.8);
        assert_eq!(severities.heart_rate, MetricSeverity::Critical);
        assert_eq!(severities.spo2, MetricSeverity::Normal);
        assert_eq!(severities.temperature, MetricSeverity::Normal);
    }

    #[test]
    fn test_out_of_domain_readings_are_rejected() {
        let thresholds = VitalThresholds::default();
        let cases = [
            (snapshot(-1.0, 97.0, 36.8), Metric::HeartRate),
            (snapshot(301.0, 97.0, 36.8), Metric::HeartRate),
            (snapshot(75.0, 100.5, 36.8), Metric::Spo2),
            (snapshot(75.0, -0.1, 36.8), Metric::Spo2),
            (snapshot(75.0, 97.0, 12.0), Metric::Temperature),
            (snapshot(75.0, 97.0, f64::NAN), Metric::Temperature),
            (snapshot(f64::INFINITY, 97.0, 36.8), Metric::HeartRate),
        ];

        for (reading, expected) in cases {
            match evaluate(&reading, &thresholds) {
                Err(EngineError::InvalidReading { metric, .. }) => assert_eq!(metric, expected),
                other => panic!("expected InvalidReading for {:?}, got {:?}", reading, other),
            }
        }
    }

    #[test]
    fn test_extreme_but_valid_values() {
        let severities = eval(0.0, 0.0, 44.0);
        assert_eq!(severities.heart_rate, MetricSeverity::Normal);
        assert_eq!(severities.spo2, MetricSeverity::Critical);
        assert_eq!(severities.temperature, MetricSeverity::Critical);
    }

    #[test]
    fn test_threshold_order_is_validated() {
        assert!(VitalThresholds::default().validate().is_ok());

        let swapped = VitalThresholds {
            spo2_warning: 88.0,
            ..VitalThresholds::default()
        };
        assert!(swapped.validate().is_err());
    }
}
