//! "What are this patient's vitals right now."
//!
//! Candidate sources are tried in a fixed order and the first hit wins:
//!
//! 1. the live poll cache entry of the resolved device
//! 2. the latest entry of `vitals[patient]` on the resolved device
//! 3. the resolved device's legacy flat bucket, or its only patient bucket
//! 4. `vitals[patient]` on any device in the directory
//!
//! Only validated [`VitalReading`]s are ever returned, so at most one current
//! reading exists per patient and query.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::directory::DeviceDirectory;
use crate::poll::LiveSnapshot;
use crate::resolver::resolve_device;
use crate::timestamp;
use crate::types::{Device, History, VitalReading};

/// Where a surfaced reading came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VitalsSource {
    Live,
    PatientHistory,
    LegacyBucket,
    DirectoryScan,
}

/// Inputs visible to every extraction strategy
pub struct MergeContext<'a> {
    pub patient_id: &'a str,
    /// Device chosen by the resolver, if any
    pub device: Option<&'a Device>,
    pub directory: &'a DeviceDirectory,
    pub live: &'a LiveSnapshot,
}

/// A reading picked by a strategy, borrowed from the context
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub device_id: &'a str,
    pub reading: &'a VitalReading,
    /// History key or live update time, when known
    pub recorded_at: Option<DateTime<Utc>>,
}

pub trait ExtractionStrategy: Send + Sync {
    fn source(&self) -> VitalsSource;

    fn extract<'a>(&self, ctx: &MergeContext<'a>) -> Option<Candidate<'a>>;
}

// ============================================================================
// STRATEGIES
// ============================================================================

pub struct LiveReading;

impl ExtractionStrategy for LiveReading {
    fn source(&self) -> VitalsSource {
        VitalsSource::Live
    }

    fn extract<'a>(&self, ctx: &MergeContext<'a>) -> Option<Candidate<'a>> {
        let device = ctx.device?;
        let reading = ctx.live.vital(&device.id)?;
        Some(Candidate {
            device_id: &device.id,
            reading,
            recorded_at: ctx.live.last_updated.get(&device.id).copied(),
        })
    }
}

pub struct PatientHistory;

impl ExtractionStrategy for PatientHistory {
    fn source(&self) -> VitalsSource {
        VitalsSource::PatientHistory
    }

    fn extract<'a>(&self, ctx: &MergeContext<'a>) -> Option<Candidate<'a>> {
        let device = ctx.device?;
        latest_vital(device, device.vitals.by_patient.get(ctx.patient_id)?)
    }
}

pub struct LegacyBucket;

impl ExtractionStrategy for LegacyBucket {
    fn source(&self) -> VitalsSource {
        VitalsSource::LegacyBucket
    }

    fn extract<'a>(&self, ctx: &MergeContext<'a>) -> Option<Candidate<'a>> {
        let device = ctx.device?;
        latest_vital(device, &device.vitals.legacy).or_else(|| {
            let mut buckets = device.vitals.by_patient.values();
            match (buckets.next(), buckets.next()) {
                (Some(only), None) => latest_vital(device, only),
                _ => None,
            }
        })
    }
}

pub struct DirectoryScan;

impl ExtractionStrategy for DirectoryScan {
    fn source(&self) -> VitalsSource {
        VitalsSource::DirectoryScan
    }

    fn extract<'a>(&self, ctx: &MergeContext<'a>) -> Option<Candidate<'a>> {
        ctx.directory.iter().find_map(|device| {
            let bucket = device.vitals.by_patient.get(ctx.patient_id)?;
            latest_vital(device, bucket)
        })
    }
}

fn latest_vital<'a>(device: &'a Device, history: &'a History) -> Option<Candidate<'a>> {
    history.iter().rev().find_map(|(key, reading)| {
        reading.as_vital().map(|reading| Candidate {
            device_id: &device.id,
            reading,
            recorded_at: timestamp::parse(Some(key.as_str())),
        })
    })
}

// ============================================================================
// MERGER
// ============================================================================

/// The reading surfaced for a patient, with its provenance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedVitals {
    pub reading: VitalReading,
    pub source: VitalsSource,
    pub device_id: String,
    pub recorded_at: Option<DateTime<Utc>>,
}

pub struct VitalsMerger {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl Default for VitalsMerger {
    fn default() -> Self {
        Self {
            strategies: vec![
                Box::new(LiveReading),
                Box::new(PatientHistory),
                Box::new(LegacyBucket),
                Box::new(DirectoryScan),
            ],
        }
    }
}

impl VitalsMerger {
    /// A merger with no strategies; build it up with [`Self::with_strategy`]
    pub fn empty() -> Self {
        Self { strategies: Vec::new() }
    }

    /// Append a strategy after the existing ones
    #[must_use]
    pub fn with_strategy(mut self, strategy: impl ExtractionStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn merge(&self, patient_id: &str, directory: &DeviceDirectory, live: &LiveSnapshot) -> Option<MergedVitals> {
        let ctx = MergeContext {
            patient_id,
            device: resolve_device(patient_id, directory),
            directory,
            live,
        };

        let merged = self.strategies.iter().find_map(|strategy| {
            strategy.extract(&ctx).map(|candidate| MergedVitals {
                reading: candidate.reading.clone(),
                source: strategy.source(),
                device_id: candidate.device_id.to_string(),
                recorded_at: candidate.recorded_at,
            })
        });

        match &merged {
            Some(vitals) => debug!(
                patient_id = %patient_id,
                device_id = %vitals.device_id,
                source = ?vitals.source,
                "Current vitals resolved"
            ),
            None => debug!(patient_id = %patient_id, "No vitals available"),
        }

        merged
    }
}

/// Current reading for `patient_id` using the default resolution order
pub fn current_vitals(patient_id: &str, directory: &DeviceDirectory, live: &LiveSnapshot) -> Option<VitalReading> {
    VitalsMerger::default()
        .merge(patient_id, directory, live)
        .map(|merged| merged.reading)
}

/// The patient's validated vital readings on `device`, oldest first
pub fn vitals_history<'a>(patient_id: &str, device: &'a Device) -> Vec<(&'a str, &'a VitalReading)> {
    device
        .vitals
        .by_patient
        .get(patient_id)
        .map(|history| {
            history
                .iter()
                .filter_map(|(key, reading)| reading.as_vital().map(|vital| (key.as_str(), vital)))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Reading;
    use serde_json::{json, Value};

    fn vital(heart_rate: u32) -> Value {
        json!({
            "heartRate": heart_rate,
            "oxygenLevel": 95,
            "temperature": 37.0,
            "bloodPressure": { "systolic": 130, "diastolic": 85 },
            "timestamp": "2025-01-01_10-00-00"
        })
    }

    fn live(device_id: &str, heart_rate: u32) -> LiveSnapshot {
        let reading = Reading::from_value(&vital(heart_rate)).unwrap();
        LiveSnapshot::from_readings([(device_id.to_string(), reading)], Utc::now())
    }

    fn heart_rate(merged: Option<MergedVitals>) -> Option<(f64, VitalsSource)> {
        merged.map(|m| (m.reading.heart_rate, m.source))
    }

    #[test]
    fn test_live_takes_precedence() {
        let directory = DeviceDirectory::from_json(&json!({
            "D1": {
                "deviceInfo": { "currentPatientId": "P1" },
                "vitals": { "P1": { "2099-01-01_00-00-00": vital(99) } }
            }
        }));

        let merged = VitalsMerger::default().merge("P1", &directory, &live("D1", 61));
        assert_eq!(heart_rate(merged), Some((61.0, VitalsSource::Live)));
    }

    #[test]
    fn test_environmental_live_entry_is_skipped() {
        let directory = DeviceDirectory::from_json(&json!({
            "D1": {
                "deviceInfo": { "currentPatientId": "P1" },
                "vitals": { "P1": { "2025-01-01_10-00-00": vital(77) } }
            }
        }));
        let room = Reading::from_value(&json!({
            "temperature": 21, "humidity": 45, "airQuality": 90,
            "co2Level": 400, "lightLevel": 250, "noiseLevel": 30
        }))
        .unwrap();
        let snapshot = LiveSnapshot::from_readings([("D1".to_string(), room)], Utc::now());

        let merged = VitalsMerger::default().merge("P1", &directory, &snapshot);
        assert_eq!(heart_rate(merged), Some((77.0, VitalsSource::PatientHistory)));
    }

    #[test]
    fn test_patient_history_latest_key_wins() {
        let directory = DeviceDirectory::from_json(&json!({
            "D1": {
                "deviceInfo": { "currentPatientId": "P1" },
                "vitals": { "P1": {
                    "2025-01-01_11-00-00": vital(88),
                    "2025-01-01_10-00-00": vital(66)
                } }
            }
        }));

        let merged = VitalsMerger::default()
            .merge("P1", &directory, &LiveSnapshot::default())
            .unwrap();
        assert_eq!(merged.reading.heart_rate, 88.0);
        assert_eq!(merged.recorded_at, timestamp::parse(Some("2025-01-01_11-00-00")));
    }

    #[test]
    fn test_legacy_bucket_then_directory_scan() {
        let legacy = DeviceDirectory::from_json(&json!({
            "D1": {
                "deviceInfo": { "currentPatientId": "P1" },
                "vitals": { "2025-01-01_10-00-00": vital(55) }
            }
        }));
        let merged = VitalsMerger::default().merge("P1", &legacy, &LiveSnapshot::default());
        assert_eq!(heart_rate(merged), Some((55.0, VitalsSource::LegacyBucket)));

        let misassigned = DeviceDirectory::from_json(&json!({
            "D1": { "deviceInfo": { "currentPatientId": "P2" } },
            "D2": { "vitals": { "P1": { "2025-01-01_10-00-00": vital(44) } } }
        }));
        let merged = VitalsMerger::default().merge("P1", &misassigned, &LiveSnapshot::default());
        assert_eq!(heart_rate(merged), Some((44.0, VitalsSource::DirectoryScan)));
    }

    #[test]
    fn test_nothing_anywhere_is_none() {
        let directory = DeviceDirectory::from_json(&json!({
            "D1": { "deviceInfo": { "currentPatientId": "P1" }, "vitals": { "P1": { "t": { "heartRate": null } } } }
        }));

        assert!(current_vitals("P1", &directory, &LiveSnapshot::default()).is_none());
        assert!(current_vitals("P404", &directory, &LiveSnapshot::default()).is_none());
    }

    #[test]
    fn test_custom_strategy_list() {
        let directory = DeviceDirectory::from_json(&json!({
            "D1": { "deviceInfo": { "currentPatientId": "P1" }, "vitals": { "P1": { "2025-01-01_10-00-00": vital(70) } } }
        }));

        let only_live = VitalsMerger::empty().with_strategy(LiveReading);
        assert!(only_live.merge("P1", &directory, &LiveSnapshot::default()).is_none());

        let with_history = VitalsMerger::empty().with_strategy(LiveReading).with_strategy(PatientHistory);
        let merged = with_history.merge("P1", &directory, &LiveSnapshot::default());
        assert_eq!(heart_rate(merged), Some((70.0, VitalsSource::PatientHistory)));
    }

    #[test]
    fn test_history_is_oldest_first() {
        let directory = DeviceDirectory::from_json(&json!({
            "D1": { "vitals": { "P1": {
                "2025-01-01_12-00-00": vital(3),
                "2025-01-01_10-00-00": vital(1),
                "2025-01-01_11-00-00": vital(2)
            } } }
        }));
        let device = directory.get("D1").unwrap();

        let rates: Vec<f64> = vitals_history("P1", device).iter().map(|(_, r)| r.heart_rate).collect();
        assert_eq!(rates, vec![1.0, 2.0, 3.0]);
        assert!(vitals_history("P2", device).is_empty());
    }
}
