//! Patient and device directories, validated once at the collaborator boundary.

use async_trait::async_trait;
use error_common::MonitorError;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::types::{Alert, Device, DeviceInfo, DeviceVitals, History, Patient, Reading};

// ============================================================================
// DIRECTORY SOURCE TRAIT
// ============================================================================

/// Backend that serves the raw directory documents
#[async_trait]
pub trait DirectorySource: Send + Sync {
    /// Mapping of patient id to patient record
    async fn fetch_patients(&self) -> error_common::Result<Value>;

    /// Mapping of device id to device record, nested vitals and alerts included
    async fn fetch_devices(&self) -> error_common::Result<Value>;
}

// ============================================================================
// DEVICE DIRECTORY
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceDirectory {
    devices: BTreeMap<String, Device>,
}

impl DeviceDirectory {
    pub fn new(devices: impl IntoIterator<Item = Device>) -> Self {
        Self {
            devices: devices.into_iter().map(|device| (device.id.clone(), device)).collect(),
        }
    }

    /// Build from the backend's `{ deviceId: device }` document.
    ///
    /// Records that are not objects are skipped; readings and alerts that fail
    /// validation are dropped individually.
    pub fn from_json(document: &Value) -> Self {
        let Some(entries) = document.as_object() else {
            warn!("Device directory document is not an object; treating as empty");
            return Self::default();
        };

        let devices = entries
            .iter()
            .filter_map(|(id, raw)| {
                let device = parse_device(id, raw);
                if device.is_none() {
                    warn!(device_id = %id, "Skipping malformed device record");
                }
                device
            })
            .collect::<Vec<_>>();

        Self::new(devices)
    }

    pub fn get(&self, device_id: &str) -> Option<&Device> {
        self.devices.get(device_id)
    }

    /// Devices in id order
    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

pub fn parse_device(id: &str, raw: &Value) -> Option<Device> {
    let record = raw.as_object()?;

    let info = match record.get("deviceInfo") {
        Some(value) => DeviceInfo::deserialize(value).unwrap_or_else(|e| {
            debug!(device_id = %id, error = %e, "Unreadable deviceInfo; using defaults");
            DeviceInfo::default()
        }),
        None => DeviceInfo::default(),
    };

    let vitals = record
        .get("vitals")
        .and_then(Value::as_object)
        .map(|entries| parse_vitals(id, entries))
        .unwrap_or_default();

    let alerts = record
        .get("alerts")
        .and_then(Value::as_object)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|(alert_id, value)| match Alert::deserialize(value) {
                    Ok(alert) => Some((alert_id.clone(), alert)),
                    Err(e) => {
                        debug!(device_id = %id, alert_id = %alert_id, error = %e, "Dropping malformed alert");
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    Some(Device {
        id: id.to_string(),
        info,
        vitals,
        alerts,
    })
}

/// Split a `vitals` map into per-patient buckets and the legacy flat bucket.
///
/// An entry whose value looks like a reading itself (`heartRate`/`humidity`)
/// belongs to the flat timestamp-keyed shape; anything else is a patient bucket.
fn parse_vitals(device_id: &str, entries: &serde_json::Map<String, Value>) -> DeviceVitals {
    let mut vitals = DeviceVitals::default();

    for (key, value) in entries {
        let Some(object) = value.as_object() else {
            debug!(device_id = %device_id, key = %key, "Ignoring non-object vitals entry");
            continue;
        };

        if object.contains_key("heartRate") || object.contains_key("humidity") {
            match Reading::from_value(value) {
                Some(reading) => {
                    vitals.legacy.insert(key.clone(), reading);
                }
                None => debug!(device_id = %device_id, timestamp = %key, "Dropping malformed reading"),
            }
            continue;
        }

        let history: History = object
            .iter()
            .filter_map(|(timestamp, raw)| {
                let reading = Reading::from_value(raw);
                if reading.is_none() {
                    debug!(device_id = %device_id, timestamp = %timestamp, "Dropping malformed reading");
                }
                reading.map(|reading| (timestamp.clone(), reading))
            })
            .collect();

        if !history.is_empty() {
            vitals.by_patient.insert(key.clone(), history);
        }
    }

    vitals
}

// ============================================================================
// PATIENT DIRECTORY
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatientDirectory {
    patients: BTreeMap<String, Patient>,
}

impl PatientDirectory {
    pub fn new(patients: impl IntoIterator<Item = Patient>) -> Self {
        Self {
            patients: patients.into_iter().map(|patient| (patient.id.clone(), patient)).collect(),
        }
    }

    pub fn from_json(document: &Value) -> Self {
        let Some(entries) = document.as_object() else {
            warn!("Patient directory document is not an object; treating as empty");
            return Self::default();
        };

        let patients = entries.iter().filter_map(|(id, raw)| match Patient::deserialize(raw) {
            Ok(mut patient) => {
                if patient.id.is_empty() {
                    patient.id.clone_from(id);
                }
                Some(patient)
            }
            Err(e) => {
                warn!(patient_id = %id, error = %e, "Skipping malformed patient record");
                None
            }
        });

        Self::new(patients)
    }

    pub fn get(&self, patient_id: &str) -> Option<&Patient> {
        self.patients.get(patient_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Patient> {
        self.patients.values()
    }

    pub fn len(&self) -> usize {
        self.patients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patients.is_empty()
    }
}

// ============================================================================
// DIRECTORY STORE
// ============================================================================

/// Latest directory snapshots; each refresh swaps in a whole new snapshot
pub struct DirectoryStore {
    source: Arc<dyn DirectorySource>,
    patients: RwLock<Arc<PatientDirectory>>,
    devices: RwLock<Arc<DeviceDirectory>>,
}

impl DirectoryStore {
    pub fn new(source: Arc<dyn DirectorySource>) -> Self {
        Self {
            source,
            patients: RwLock::new(Arc::new(PatientDirectory::default())),
            devices: RwLock::new(Arc::new(DeviceDirectory::default())),
        }
    }

    pub async fn patients(&self) -> Arc<PatientDirectory> {
        Arc::clone(&*self.patients.read().await)
    }

    pub async fn devices(&self) -> Arc<DeviceDirectory> {
        Arc::clone(&*self.devices.read().await)
    }

    /// Refresh both directories independently.
    ///
    /// A failure on one side leaves that side's previous snapshot in place;
    /// the first error encountered is returned.
    pub async fn refresh_all(&self) -> Result<(), MonitorError> {
        let (patients, devices) = tokio::join!(self.source.fetch_patients(), self.source.fetch_devices());

        let mut first_error = None;

        match patients {
            Ok(document) => {
                let directory = PatientDirectory::from_json(&document);
                info!(patients = directory.len(), "Patient directory refreshed");
                *self.patients.write().await = Arc::new(directory);
            }
            Err(e) => {
                error_common::log_error("patient directory refresh", &e);
                first_error = Some(e);
            }
        }

        match devices {
            Ok(document) => self.install_devices(&document).await,
            Err(e) => {
                error_common::log_error("device directory refresh", &e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Re-fetch only the device directory (alerts and vitals freshness)
    pub async fn refresh_alerts_only(&self) -> Result<Arc<DeviceDirectory>, MonitorError> {
        let document = self.source.fetch_devices().await.map_err(|e| {
            error_common::log_error("device directory refresh", &e);
            e
        })?;
        self.install_devices(&document).await;
        Ok(self.devices().await)
    }

    async fn install_devices(&self, document: &Value) {
        let directory = DeviceDirectory::from_json(document);
        debug!(devices = directory.len(), "Device directory refreshed");
        *self.devices.write().await = Arc::new(directory);
    }
}
