use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ============================================================================
// ENUMS
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    VitalsMonitor,
    EnvironmentalSensor,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Online,
    Offline,
    Maintenance,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Critical,
    Warning,
    #[default]
    #[serde(other)]
    Info,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClinicalStatus {
    Stable,
    Critical,
    Recovering,
    Observation,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
    #[default]
    #[serde(other)]
    Unknown,
}

// ============================================================================
// READINGS
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BloodPressure {
    pub systolic: f64,
    pub diastolic: f64,
}

/// Point-in-time vital signs from a bedside monitor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VitalReading {
    pub heart_rate: f64,
    pub oxygen_level: f64,
    pub temperature: f64,
    pub blood_pressure: BloodPressure,
    #[serde(default)]
    pub device_status: DeviceStatus,
    #[serde(default, deserialize_with = "lenient_number")]
    pub battery_level: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub signal_strength: Option<f64>,
    #[serde(default)]
    pub timestamp: String,
    /// Pre-assignment devices stamped the patient on each reading
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
}

/// Room conditions from an environmental sensor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentalReading {
    pub temperature: f64,
    pub humidity: f64,
    pub air_quality: f64,
    pub co2_level: f64,
    pub light_level: f64,
    pub noise_level: f64,
    #[serde(default)]
    pub timestamp: String,
}

/// A validated reading with an explicit discriminant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reading {
    Vital(VitalReading),
    Environmental(EnvironmentalReading),
}

impl Reading {
    /// Discriminate and validate a raw backend payload.
    ///
    /// `heartRate` marks a vital reading, `humidity` an environmental one.
    /// Anything that fails validation is `None`, never an error.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        if object.contains_key("heartRate") {
            VitalReading::deserialize(value).ok().map(Reading::Vital)
        } else if object.contains_key("humidity") {
            EnvironmentalReading::deserialize(value).ok().map(Reading::Environmental)
        } else {
            None
        }
    }

    pub fn as_vital(&self) -> Option<&VitalReading> {
        match self {
            Reading::Vital(reading) => Some(reading),
            Reading::Environmental(_) => None,
        }
    }

    pub fn as_environmental(&self) -> Option<&EnvironmentalReading> {
        match self {
            Reading::Environmental(reading) => Some(reading),
            Reading::Vital(_) => None,
        }
    }

    pub fn timestamp(&self) -> &str {
        match self {
            Reading::Vital(reading) => &reading.timestamp,
            Reading::Environmental(reading) => &reading.timestamp,
        }
    }
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(Value::as_f64))
}

// ============================================================================
// ALERTS
// ============================================================================

/// Every field is read leniently: an unreadable field falls back to its
/// default instead of dropping the alert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    #[serde(rename = "type", default, deserialize_with = "lenient_alert_type")]
    pub alert_type: AlertType,
    #[serde(default, deserialize_with = "lenient_message")]
    pub message: String,
    /// Non-string timestamps read as `None` and sort as "now"
    #[serde(default, deserialize_with = "lenient_string")]
    pub timestamp: Option<String>,
    /// Only a literal `true` resolves an alert
    #[serde(default, deserialize_with = "lenient_flag")]
    pub resolved: bool,
}

fn lenient_alert_type<'de, D>(deserializer: D) -> Result<AlertType, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(AlertType::deserialize(value).unwrap_or_default())
}

fn lenient_message<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_string(deserializer)?.unwrap_or_default())
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| match value {
        Value::String(text) => Some(text),
        _ => None,
    }))
}

fn lenient_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(matches!(value, Some(Value::Bool(true))))
}

// ============================================================================
// DEVICE
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    #[serde(rename = "type", default)]
    pub kind: DeviceKind,
    #[serde(default)]
    pub room_id: Option<String>,
    /// Explicit assignment; authoritative when present
    #[serde(default)]
    pub current_patient_id: Option<String>,
}

/// Reading history keyed by sentinel timestamp strings.
///
/// Keys are zero-padded `YYYY-MM-DD_HH-MM-SS`, so `BTreeMap` order is
/// chronological and the last entry is the latest.
pub type History = BTreeMap<String, Reading>;

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DeviceVitals {
    /// patient id -> timestamp -> reading
    pub by_patient: BTreeMap<String, History>,
    /// Flat timestamp -> reading map written by unmigrated devices
    pub legacy: History,
}

impl DeviceVitals {
    pub fn is_empty(&self) -> bool {
        self.legacy.is_empty() && self.by_patient.values().all(BTreeMap::is_empty)
    }

    pub fn latest_for(&self, patient_id: &str) -> Option<(&str, &Reading)> {
        latest(self.by_patient.get(patient_id)?)
    }

    pub fn latest_legacy(&self) -> Option<(&str, &Reading)> {
        latest(&self.legacy)
    }

    /// Latest entry of the only patient bucket, if there is exactly one
    pub fn latest_single_bucket(&self) -> Option<(&str, &Reading)> {
        let mut buckets = self.by_patient.values();
        match (buckets.next(), buckets.next()) {
            (Some(bucket), None) => latest(bucket),
            _ => None,
        }
    }

    /// Most recent reading across every bucket, legacy included
    pub fn latest_overall(&self) -> Option<(&str, &Reading)> {
        self.by_patient
            .values()
            .chain(std::iter::once(&self.legacy))
            .filter_map(latest)
            .max_by(|(a, _), (b, _)| a.cmp(b))
    }
}

pub(crate) fn latest(history: &History) -> Option<(&str, &Reading)> {
    history.iter().next_back().map(|(key, reading)| (key.as_str(), reading))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    pub id: String,
    pub info: DeviceInfo,
    pub vitals: DeviceVitals,
    pub alerts: BTreeMap<String, Alert>,
}

impl Device {
    pub fn is_assigned_to(&self, patient_id: &str) -> bool {
        self.info.current_patient_id.as_deref() == Some(patient_id)
    }
}

// ============================================================================
// PATIENT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PersonalInfo {
    pub name: String,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub room_id: Option<String>,
    pub bed_id: Option<String>,
    pub ward: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CurrentStatus {
    pub diagnosis: String,
    pub status: ClinicalStatus,
    pub last_updated: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct MedicalHistory {
    pub conditions: Vec<String>,
    pub medications: Vec<String>,
    pub allergies: Vec<String>,
}

/// Risk payload as returned by the remote prediction call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    #[serde(default)]
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub risk_score: f64,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub predicted_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Patient {
    pub id: String,
    pub personal_info: PersonalInfo,
    pub current_status: CurrentStatus,
    pub medical_history: MedicalHistory,
    /// Snapshot delivered with the directory; may be older than the local cache
    pub prediction: Option<RiskAssessment>,
}
