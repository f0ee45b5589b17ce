//! Sensor sources feeding the monitoring loop

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::entities::{PatientId, VitalSnapshot};
use crate::error::SourceError;

/// A lazily sampled, restartable stream of readings
#[async_trait]
pub trait VitalSource: Send {
    /// Readings available at this tick, at most one per patient
    async fn sample(&mut self) -> Result<Vec<VitalSnapshot>, SourceError>;

    /// Called after `sample` reported a disconnect
    async fn reconnect(&mut self) -> Result<(), SourceError> {
        Ok(())
    }
}

/// Synthetic sensor that mostly reports a healthy baseline with occasional spikes
#[derive(Debug)]
pub struct SimulatedVitalSource {
    patients: Vec<PatientId>,
    rng: StdRng,
    spike_one_in: u32,
}

impl SimulatedVitalSource {
    pub fn new(patients: Vec<PatientId>) -> Self {
        Self {
            patients,
            rng: StdRng::from_entropy(),
            spike_one_in: 25,
        }
    }

    /// Deterministic source for tests
    pub fn with_seed(patients: Vec<PatientId>, seed: u64) -> Self {
        Self {
            patients,
            rng: StdRng::seed_from_u64(seed),
            spike_one_in: 25,
        }
    }

    /// Spike on average once every `n` samples per patient; 0 disables spikes
    pub fn spike_one_in(mut self, n: u32) -> Self {
        self.spike_one_in = n;
        self
    }

    fn reading(&mut self, patient_id: &PatientId) -> VitalSnapshot {
        let mut heart_rate = (75 + self.rng.gen_range(-5..=5)) as f64;
        let mut spo2 = (97 + self.rng.gen_range(-1..=1)) as f64;
        let mut temperature = round_tenth(36.8 + self.rng.gen_range(-0.2..=0.2));

        if self.spike_one_in > 0 && self.rng.gen_ratio(1, self.spike_one_in) {
            match self.rng.gen_range(0..3) {
                0 => heart_rate = self.rng.gen_range(145..=165) as f64,
                1 => spo2 = self.rng.gen_range(85..=91) as f64,
                _ => temperature = round_tenth(self.rng.gen_range(38.6..=39.5)),
            }
        }

        VitalSnapshot::new(patient_id.clone(), heart_rate, spo2, temperature, Utc::now())
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[async_trait]
impl VitalSource for SimulatedVitalSource {
    async fn sample(&mut self) -> Result<Vec<VitalSnapshot>, SourceError> {
        let patients = self.patients.clone();
        Ok(patients.iter().map(|id| self.reading(id)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_baseline_without_spikes() {
        let mut source = SimulatedVitalSource::with_seed(vec![PatientId::new("p1")], 7).spike_one_in(0);

        for _ in 0..200 {
            let readings = source.sample().await.unwrap();
            assert_eq!(readings.len(), 1);
            let r = &readings[0];
            assert!((70.0..=80.0).contains(&r.heart_rate), "hr {}", r.heart_rate);
            assert!((96.0..=98.0).contains(&r.spo2), "spo2 {}", r.spo2);
            assert!((36.6..=37.0).contains(&r.temperature), "temp {}", r.temperature);
        }
    }

    #[tokio::test]
    async fn test_spikes_reach_critical_ranges() {
        let mut source = SimulatedVitalSource::with_seed(vec![PatientId::new("p1")], 42).spike_one_in(1);
        let mut spiked = 0;

        for _ in 0..60 {
            let r = source.sample().await.unwrap().remove(0);
            if r.heart_rate >= 145.0 || r.spo2 <= 91.0 || r.temperature >= 38.6 {
                spiked += 1;
            }
        }
        assert_eq!(spiked, 60);
    }

    #[tokio::test]
    async fn test_one_reading_per_patient() {
        let patients = vec![PatientId::new("a"), PatientId::new("b"), PatientId::new("c")];
        let mut source = SimulatedVitalSource::with_seed(patients.clone(), 1);

        let readings = source.sample().await.unwrap();
        let ids: Vec<PatientId> = readings.into_iter().map(|r| r.patient_id).collect();
        assert_eq!(ids, patients);
    }
}
