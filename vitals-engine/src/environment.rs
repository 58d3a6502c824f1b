use crate::directory::DeviceDirectory;
use crate::types::{DeviceKind, EnvironmentalReading};

/// Latest room conditions reported by any environmental sensor in `room_id`.
///
/// Returns the sentinel key alongside the reading. Sensors whose history holds
/// no valid environmental reading are ignored.
pub fn latest_environment<'a>(room_id: &str, directory: &'a DeviceDirectory) -> Option<(&'a str, &'a EnvironmentalReading)> {
    directory
        .iter()
        .filter(|device| device.info.kind == DeviceKind::EnvironmentalSensor)
        .filter(|device| device.info.room_id.as_deref() == Some(room_id))
        .flat_map(|device| {
            device
                .vitals
                .by_patient
                .values()
                .chain(std::iter::once(&device.vitals.legacy))
                .flat_map(|history| history.iter())
        })
        .filter_map(|(key, reading)| reading.as_environmental().map(|reading| (key.as_str(), reading)))
        .max_by(|(a, _), (b, _)| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn conditions(temperature: f64) -> Value {
        json!({
            "temperature": temperature,
            "humidity": 45,
            "airQuality": 92,
            "co2Level": 420,
            "lightLevel": 250,
            "noiseLevel": 38
        })
    }

    #[test]
    fn test_latest_across_room_sensors() {
        let directory = DeviceDirectory::from_json(&json!({
            "ENV-1": {
                "deviceInfo": { "type": "environmental_sensor", "roomId": "R101" },
                "vitals": {
                    "2025-01-01_09-00-00": conditions(21.0),
                    "2025-01-01_11-00-00": conditions(22.5)
                }
            },
            "ENV-2": {
                "deviceInfo": { "type": "environmental_sensor", "roomId": "R101" },
                "vitals": { "2025-01-01_10-00-00": conditions(23.0) }
            },
            "ENV-3": {
                "deviceInfo": { "type": "environmental_sensor", "roomId": "R202" },
                "vitals": { "2025-01-01_12-00-00": conditions(19.0) }
            }
        }));

        let (key, reading) = latest_environment("R101", &directory).unwrap();
        assert_eq!(key, "2025-01-01_11-00-00");
        assert_eq!(reading.temperature, 22.5);
    }

    #[test]
    fn test_monitors_in_room_are_ignored() {
        let directory = DeviceDirectory::from_json(&json!({
            "MON-1": {
                "deviceInfo": { "type": "vitals_monitor", "roomId": "R101" },
                "vitals": { "2025-01-01_09-00-00": conditions(21.0) }
            }
        }));

        assert!(latest_environment("R101", &directory).is_none());
        assert!(latest_environment("R999", &directory).is_none());
    }
}
