//! Live clinical data reconciliation for the WardWatch dashboard.
//!
//! Merges polled device telemetry with the patient/device directories to
//! answer "what are this patient's vitals right now", keeps an ordered view of
//! unresolved device alerts, and caches remote risk assessments with a TTL.
//!
//! # Example
//!
//! ```rust
//! use vitals_engine::{current_vitals, resolve_device, DeviceDirectory, LiveSnapshot};
//! use serde_json::json;
//!
//! let devices = DeviceDirectory::from_json(&json!({
//!     "MON-7": {
//!         "deviceInfo": { "type": "vitals_monitor", "currentPatientId": "P1" },
//!         "vitals": { "P1": { "2025-01-01_10-00-00": {
//!             "heartRate": 72, "oxygenLevel": 97, "temperature": 36.8,
//!             "bloodPressure": { "systolic": 120, "diastolic": 80 }
//!         } } }
//!     }
//! }));
//!
//! assert_eq!(resolve_device("P1", &devices).map(|d| d.id.as_str()), Some("MON-7"));
//! let vitals = current_vitals("P1", &devices, &LiveSnapshot::default()).unwrap();
//! assert_eq!(vitals.heart_rate, 72.0);
//! ```

// Core modules
pub mod timestamp;
pub mod types;
pub mod error;
pub mod config;
pub mod directory;
pub mod resolver;
pub mod poll;
pub mod merger;
pub mod alerts;
pub mod environment;
pub mod prediction;
pub mod http;

// Re-exports
pub use types::*;
pub use error::*;
pub use self::config::*;
pub use directory::*;
pub use resolver::*;
pub use poll::*;
pub use merger::*;
pub use alerts::*;
pub use environment::*;
pub use prediction::*;
pub use http::*;
