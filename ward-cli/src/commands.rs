use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use serde_json::json;
use std::fmt::Write;
use std::sync::Arc;
use vitals_engine::timestamp;
use vitals_engine::{
    active_alerts, critical_only, latest_environment, resolve_with_association, sorted_by_recency, vitals_history,
    warning_only, ActiveAlert, AlertCounts, AlertType, Association, DeviceDirectory, DirectoryStore, EngineConfig,
    HttpBackend, JsonFileStore, LiveSnapshot, PatientDirectory, PredictionEntry, PredictionService, VitalsMerger,
};

use crate::cli::{AlertFilter, Cli, Command, PredictionCommand};
use crate::fixtures::{load_live, FixtureSource};

/// Directory snapshots and live readings loaded for one invocation
pub struct Session {
    pub devices: Arc<DeviceDirectory>,
    pub patients: Arc<PatientDirectory>,
    pub live: LiveSnapshot,
    pub json: bool,
}

impl Session {
    pub async fn open(cli: &Cli) -> Result<Self> {
        let store = DirectoryStore::new(Arc::new(FixtureSource::new(&cli.patients, &cli.devices)));
        store.refresh_all().await.context("loading directory fixtures")?;

        let live = match &cli.live {
            Some(path) => load_live(path).await.context("loading live readings")?,
            None => LiveSnapshot::default(),
        };

        Ok(Self {
            devices: store.devices().await,
            patients: store.patients().await,
            live,
            json: cli.json,
        })
    }
}

/// Execute the parsed command and return what should be printed
pub async fn run(cli: &Cli, config: &EngineConfig) -> Result<String> {
    match &cli.command {
        Command::Resolve { patient_id } => resolve(&Session::open(cli).await?, patient_id),
        Command::Vitals { patient_id, history } => vitals(&Session::open(cli).await?, patient_id, *history),
        Command::Alerts(filter) => alerts(&Session::open(cli).await?, filter),
        Command::Environment { room_id } => environment(&Session::open(cli).await?, room_id),
        Command::Prediction(action) => prediction(action, config, cli.json).await,
    }
}

fn render<T: Serialize>(as_json: bool, value: &T, text: impl FnOnce() -> String) -> Result<String> {
    if as_json {
        Ok(serde_json::to_string_pretty(value)?)
    } else {
        Ok(text())
    }
}

// ============================================================================
// DIRECTORY COMMANDS
// ============================================================================

pub fn resolve(session: &Session, patient_id: &str) -> Result<String> {
    let resolved = resolve_with_association(patient_id, &session.devices);
    let value = match resolved {
        Some((device, association)) => json!({
            "patientId": patient_id,
            "deviceId": device.id,
            "association": association_label(association),
        }),
        None => json!({ "patientId": patient_id, "deviceId": null }),
    };

    render(session.json, &value, || match resolved {
        Some((device, association)) => {
            format!("{patient_id} -> {} ({})", device.id.bold(), association_label(association))
        }
        None => format!("{patient_id}: no device"),
    })
}

fn association_label(association: Association) -> &'static str {
    match association {
        Association::Assigned => "assigned",
        Association::LegacyReading => "legacy reading",
    }
}

pub fn vitals(session: &Session, patient_id: &str, with_history: bool) -> Result<String> {
    let merged = VitalsMerger::default().merge(patient_id, &session.devices, &session.live);
    let history = if with_history {
        merged
            .as_ref()
            .and_then(|merged| session.devices.get(&merged.device_id))
            .map(|device| vitals_history(patient_id, device))
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    let value = json!({ "patientId": patient_id, "current": merged, "history": history });

    render(session.json, &value, || {
        let mut out = String::new();
        let name = session
            .patients
            .get(patient_id)
            .map(|patient| patient.personal_info.name.as_str())
            .filter(|name| !name.is_empty())
            .unwrap_or(patient_id);

        let Some(merged) = &merged else {
            let _ = write!(out, "{name}: no device / no data");
            return out;
        };

        let reading = &merged.reading;
        let _ = writeln!(out, "{} (device {}, source {:?})", name.bold(), merged.device_id, merged.source);
        let _ = writeln!(out, "  Heart rate      {:.0} bpm", reading.heart_rate);
        let _ = writeln!(out, "  SpO2            {:.0} %", reading.oxygen_level);
        let _ = writeln!(out, "  Temperature     {:.1} C", reading.temperature);
        let _ = writeln!(
            out,
            "  Blood pressure  {:.0}/{:.0} mmHg",
            reading.blood_pressure.systolic, reading.blood_pressure.diastolic
        );
        let _ = write!(out, "  Recorded        {}", timestamp::display(Some(reading.timestamp.as_str())));

        for (key, entry) in &history {
            let _ = write!(
                out,
                "\n  {}  HR {:.0}  SpO2 {:.0}",
                timestamp::display(Some(*key)),
                entry.heart_rate,
                entry.oxygen_level
            );
        }
        out
    })
}

pub fn alerts(session: &Session, filter: &AlertFilter) -> Result<String> {
    let board = sorted_by_recency(active_alerts(&session.devices), chrono::Utc::now());
    let selected: Vec<&ActiveAlert> = if filter.critical {
        critical_only(&board)
    } else if filter.warning {
        warning_only(&board)
    } else {
        board.iter().collect()
    };
    let counts = AlertCounts::tally(&board);

    let value = json!({ "counts": counts, "alerts": selected });

    render(session.json, &value, || {
        let mut out = format!(
            "{} critical, {} warning, {} info",
            counts.critical, counts.warning, counts.info
        );
        for entry in &selected {
            let label = match entry.alert.alert_type {
                AlertType::Critical => "CRITICAL".red().bold(),
                AlertType::Warning => "WARNING".yellow(),
                AlertType::Info => "INFO".normal(),
            };
            let _ = write!(
                out,
                "\n{}  {:<8}  {}  {}",
                timestamp::display(entry.alert.timestamp.as_deref()),
                label,
                entry.device_id,
                entry.alert.message
            );
        }
        out
    })
}

pub fn environment(session: &Session, room_id: &str) -> Result<String> {
    let latest = latest_environment(room_id, &session.devices);
    let value = json!({
        "roomId": room_id,
        "recordedAt": latest.map(|(key, _)| key),
        "reading": latest.map(|(_, reading)| reading),
    });

    render(session.json, &value, || match latest {
        Some((key, reading)) => format!(
            "Room {room_id} at {}\n  Temperature {:.1} C  Humidity {:.0} %  CO2 {:.0} ppm\n  Air quality {:.0}  Light {:.0} lux  Noise {:.0} dB",
            timestamp::display(Some(key)),
            reading.temperature,
            reading.humidity,
            reading.co2_level,
            reading.air_quality,
            reading.light_level,
            reading.noise_level
        ),
        None => format!("Room {room_id}: no environmental data"),
    })
}

// ============================================================================
// PREDICTION CACHE
// ============================================================================

pub async fn prediction(action: &PredictionCommand, config: &EngineConfig, as_json: bool) -> Result<String> {
    let store = Arc::new(JsonFileStore::new(&config.prediction_cache_path));
    let service = PredictionService::load(store, config.prediction_ttl()).await;

    match action {
        PredictionCommand::Show { patient_id: Some(patient_id) } => {
            let entry = service.cached(patient_id).await;
            render(as_json, &entry, || match &entry {
                Some(entry) => describe_entry(patient_id, entry),
                None => format!("{patient_id}: no prediction available"),
            })
        }
        PredictionCommand::Show { patient_id: None } => {
            let entries = service.entries().await;
            render(as_json, &entries, || {
                if entries.is_empty() {
                    return "No cached predictions".to_string();
                }
                entries
                    .iter()
                    .map(|(patient_id, entry)| describe_entry(patient_id, entry))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        PredictionCommand::Evict { patient_id: Some(patient_id) } => {
            let removed = service.remove(patient_id).await.context("saving prediction cache")?;
            render(as_json, &json!({ "removed": removed }), || {
                if removed {
                    format!("Removed prediction for {patient_id}")
                } else {
                    format!("{patient_id}: nothing cached")
                }
            })
        }
        PredictionCommand::Evict { patient_id: None } => {
            let evicted = service.evict_stale().await;
            render(as_json, &json!({ "evicted": evicted }), || format!("Evicted {evicted} stale entries"))
        }
        PredictionCommand::Assess { patient_id } => {
            let backend = HttpBackend::from_config(config)?;
            let entry = service
                .with_client(Arc::new(backend))
                .assess(patient_id)
                .await
                .with_context(|| format!("assessing {patient_id}"))?;
            render(as_json, &entry, || describe_entry(patient_id, &entry))
        }
    }
}

fn describe_entry(patient_id: &str, entry: &PredictionEntry) -> String {
    format!(
        "{patient_id}: {:?} risk (score {:.2}, confidence {:.0}%), cached {}",
        entry.risk_level,
        entry.risk_score,
        entry.confidence * 100.0,
        entry.last_updated.format("%Y-%m-%d %H:%M:%S")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn session(json: bool) -> Session {
        let devices = DeviceDirectory::from_json(&json!({
            "MON-1": {
                "deviceInfo": { "type": "vitals_monitor", "roomId": "R1", "currentPatientId": "P1" },
                "vitals": { "P1": {
                    "2025-01-01_10-00-00": { "heartRate": 71, "oxygenLevel": 97, "temperature": 36.6,
                                             "bloodPressure": { "systolic": 117, "diastolic": 75 },
                                             "timestamp": "2025-01-01_10-00-00" }
                } },
                "alerts": {
                    "a1": { "type": "critical", "message": "SpO2 dropping", "timestamp": "2025-01-01_10-05-00" },
                    "a2": { "type": "warning", "message": "Battery low", "timestamp": "2025-01-01_09-00-00" }
                }
            },
            "ENV-1": {
                "deviceInfo": { "type": "environmental_sensor", "roomId": "R1" },
                "vitals": { "2025-01-01_10-00-00": { "temperature": 22, "humidity": 41, "airQuality": 90,
                                                     "co2Level": 430, "lightLevel": 300, "noiseLevel": 33 } }
            }
        }));

        Session {
            devices: Arc::new(devices),
            patients: Arc::new(PatientDirectory::default()),
            live: LiveSnapshot::default(),
            json,
        }
    }

    #[test]
    fn test_resolve_json_output() {
        let output: Value = serde_json::from_str(&resolve(&session(true), "P1").unwrap()).unwrap();
        assert_eq!(output["deviceId"], "MON-1");
        assert_eq!(output["association"], "assigned");

        let missing: Value = serde_json::from_str(&resolve(&session(true), "P9").unwrap()).unwrap();
        assert!(missing["deviceId"].is_null());
    }

    #[test]
    fn test_vitals_text_and_missing_patient() {
        let text = vitals(&session(false), "P1", true).unwrap();
        assert!(text.contains("71 bpm"));
        assert!(text.contains("2025-01-01 10:00:00"));

        let text = vitals(&session(false), "P9", false).unwrap();
        assert!(text.contains("no device / no data"));
    }

    #[test]
    fn test_alert_filter() {
        let filter = AlertFilter { critical: true, warning: false };
        let output: Value = serde_json::from_str(&alerts(&session(true), &filter).unwrap()).unwrap();

        assert_eq!(output["counts"]["critical"], 1);
        assert_eq!(output["counts"]["warning"], 1);
        assert_eq!(output["alerts"].as_array().unwrap().len(), 1);
        assert_eq!(output["alerts"][0]["alert_id"], "a1");
    }

    #[test]
    fn test_environment_output() {
        let output: Value = serde_json::from_str(&environment(&session(true), "R1").unwrap()).unwrap();
        assert_eq!(output["recordedAt"], "2025-01-01_10-00-00");
        assert_eq!(output["reading"]["humidity"], 41.0);
    }

    #[tokio::test]
    async fn test_prediction_show_and_evict_on_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            prediction_cache_path: dir.path().join("cache.json"),
            ..EngineConfig::default()
        };

        let shown = prediction(&PredictionCommand::Show { patient_id: None }, &config, false).await.unwrap();
        assert_eq!(shown, "No cached predictions");

        let evicted = prediction(&PredictionCommand::Evict { patient_id: Some("P1".into()) }, &config, true)
            .await
            .unwrap();
        let evicted: Value = serde_json::from_str(&evicted).unwrap();
        assert_eq!(evicted["removed"], false);

        let assess = prediction(&PredictionCommand::Assess { patient_id: "P1".into() }, &config, false).await;
        assert!(assess.is_err());
    }
}
