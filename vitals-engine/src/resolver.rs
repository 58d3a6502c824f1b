//! Which device currently serves a patient.
//!
//! Devices moved from stamping the patient on each reading to an explicit
//! `currentPatientId` assignment. Both signals are honored, assignment first,
//! so that live data from unmigrated devices is not dropped.

use crate::directory::DeviceDirectory;
use crate::types::Device;

/// One link of the association chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Association {
    /// `deviceInfo.currentPatientId` names the patient
    Assigned,
    /// The device's latest reading carries the patient's id
    LegacyReading,
}

/// Resolve the device serving `patient_id`, or `None` if nothing matches.
///
/// Every device is checked for an explicit assignment before any device is
/// checked for a legacy reading match; within a link, devices are visited in
/// id order.
pub fn resolve_device<'a>(patient_id: &str, directory: &'a DeviceDirectory) -> Option<&'a Device> {
    resolve_with_association(patient_id, directory).map(|(device, _)| device)
}

pub fn resolve_with_association<'a>(
    patient_id: &str,
    directory: &'a DeviceDirectory,
) -> Option<(&'a Device, Association)> {
    if patient_id.is_empty() {
        return None;
    }

    let assigned = directory
        .iter()
        .find(|device| device.is_assigned_to(patient_id))
        .map(|device| (device, Association::Assigned));

    assigned.or_else(|| {
        directory
            .iter()
            .find(|device| latest_reading_names(device, patient_id))
            .map(|device| (device, Association::LegacyReading))
    })
}

fn latest_reading_names(device: &Device, patient_id: &str) -> bool {
    device
        .vitals
        .latest_overall()
        .and_then(|(_, reading)| reading.as_vital())
        .and_then(|reading| reading.patient_id.as_deref())
        == Some(patient_id)
}
