//! File-backed collaborators.

use async_trait::async_trait;
use chrono::Utc;
use error_common::MonitorError;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use vitals_engine::{DirectorySource, LiveSnapshot, Reading};

/// Serves directory documents from JSON files. A missing file is an empty directory.
pub struct FixtureSource {
    patients: PathBuf,
    devices: PathBuf,
}

impl FixtureSource {
    pub fn new(patients: impl Into<PathBuf>, devices: impl Into<PathBuf>) -> Self {
        Self {
            patients: patients.into(),
            devices: devices.into(),
        }
    }
}

#[async_trait]
impl DirectorySource for FixtureSource {
    async fn fetch_patients(&self) -> error_common::Result<Value> {
        read_document(&self.patients).await
    }

    async fn fetch_devices(&self) -> error_common::Result<Value> {
        read_document(&self.devices).await
    }
}

async fn read_document(path: &Path) -> error_common::Result<Value> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "Fixture not found; using an empty directory");
            return Ok(json!({}));
        }
        Err(e) => return Err(MonitorError::Storage(format!("{}: {e}", path.display()))),
    };

    serde_json::from_slice(&raw).map_err(|e| MonitorError::Decode(format!("{}: {e}", path.display())))
}

/// Build a live snapshot from a `{ deviceId: reading }` file, stamped now
pub async fn load_live(path: &Path) -> error_common::Result<LiveSnapshot> {
    let document = read_document(path).await?;
    let readings = document
        .as_object()
        .into_iter()
        .flatten()
        .filter_map(|(device_id, raw)| {
            let reading = Reading::from_value(raw);
            if reading.is_none() {
                debug!(device_id = %device_id, "Skipping malformed live reading");
            }
            reading.map(|reading| (device_id.clone(), reading))
        });

    Ok(LiveSnapshot::from_readings(readings, Utc::now()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_fixture_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let source = FixtureSource::new(dir.path().join("patients.json"), dir.path().join("devices.json"));
        assert_eq!(source.fetch_devices().await.unwrap(), json!({}));
    }

    #[tokio::test]
    async fn test_corrupt_fixture_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.json");
        tokio::fs::write(&path, "[").await.unwrap();

        let source = FixtureSource::new(dir.path().join("patients.json"), &path);
        assert!(matches!(source.fetch_devices().await, Err(MonitorError::Decode(_))));
    }

    #[tokio::test]
    async fn test_live_file_skips_malformed_readings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live.json");
        let document = json!({
            "MON-1": { "heartRate": 80, "oxygenLevel": 97, "temperature": 36.9,
                       "bloodPressure": { "systolic": 118, "diastolic": 77 } },
            "MON-2": { "heartRate": "n/a" }
        });
        tokio::fs::write(&path, document.to_string()).await.unwrap();

        let snapshot = load_live(&path).await.unwrap();
        assert!(snapshot.vital("MON-1").is_some());
        assert!(snapshot.reading("MON-2").is_none());
    }
}
