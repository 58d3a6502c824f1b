//! Device alerts flattened into one newest-first list.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::directory::{DeviceDirectory, DirectoryStore};
use crate::timestamp;
use crate::types::{Alert, AlertType};

/// An unresolved alert together with where it lives
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveAlert {
    pub device_id: String,
    pub alert_id: String,
    pub alert: Alert,
}

/// Every unresolved alert in the directory, in device then alert id order
pub fn active_alerts(directory: &DeviceDirectory) -> Vec<ActiveAlert> {
    directory
        .iter()
        .flat_map(|device| {
            device
                .alerts
                .iter()
                .filter(|(_, alert)| !alert.resolved)
                .map(move |(alert_id, alert)| ActiveAlert {
                    device_id: device.id.clone(),
                    alert_id: alert_id.clone(),
                    alert: alert.clone(),
                })
        })
        .collect()
}

/// Newest first. Unparsable timestamps count as `now`; ties keep input order.
pub fn sorted_by_recency(mut alerts: Vec<ActiveAlert>, now: DateTime<Utc>) -> Vec<ActiveAlert> {
    alerts.sort_by_cached_key(|entry| std::cmp::Reverse(timestamp::normalize_or(entry.alert.timestamp.as_deref(), now)));
    alerts
}

pub fn critical_only(alerts: &[ActiveAlert]) -> Vec<&ActiveAlert> {
    of_type(alerts, AlertType::Critical)
}

pub fn warning_only(alerts: &[ActiveAlert]) -> Vec<&ActiveAlert> {
    of_type(alerts, AlertType::Warning)
}

fn of_type(alerts: &[ActiveAlert], alert_type: AlertType) -> Vec<&ActiveAlert> {
    alerts.iter().filter(|entry| entry.alert.alert_type == alert_type).collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AlertCounts {
    pub critical: usize,
    pub warning: usize,
    pub info: usize,
}

impl AlertCounts {
    pub fn tally(alerts: &[ActiveAlert]) -> Self {
        alerts.iter().fold(Self::default(), |mut counts, entry| {
            match entry.alert.alert_type {
                AlertType::Critical => counts.critical += 1,
                AlertType::Warning => counts.warning += 1,
                AlertType::Info => counts.info += 1,
            }
            counts
        })
    }

    pub fn total(&self) -> usize {
        self.critical + self.warning + self.info
    }
}

// ============================================================================
// ALERT MONITOR
// ============================================================================

/// What alert-presenting views render
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlertBoard {
    pub alerts: Vec<ActiveAlert>,
    pub counts: AlertCounts,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Periodically re-fetches the device directory and republishes active alerts.
///
/// Subscribers are only woken when the alert list or error state changes.
pub struct AlertMonitor {
    board: watch::Receiver<AlertBoard>,
    task: JoinHandle<()>,
}

impl AlertMonitor {
    pub fn start(store: Arc<DirectoryStore>, interval: Duration) -> Self {
        let (sender, board) = watch::channel(AlertBoard::default());
        info!(interval_secs = interval.as_secs(), "Starting alert monitor");
        let task = tokio::spawn(run_monitor(store, interval, sender));
        Self { board, task }
    }

    pub fn subscribe(&self) -> watch::Receiver<AlertBoard> {
        self.board.clone()
    }

    pub fn board(&self) -> AlertBoard {
        self.board.borrow().clone()
    }

    pub fn stop(self) {
        info!("Stopping alert monitor");
        self.task.abort();
    }
}

impl Drop for AlertMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_monitor(store: Arc<DirectoryStore>, interval: Duration, sender: watch::Sender<AlertBoard>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let now = Utc::now();

        let outcome = store
            .refresh_alerts_only()
            .await
            .map(|directory| sorted_by_recency(active_alerts(&directory), now));

        let changed = sender.send_if_modified(|board| {
            board.refreshed_at = Some(now);
            match outcome {
                Ok(alerts) => {
                    let changed = board.alerts != alerts || board.error.is_some();
                    if changed {
                        board.counts = AlertCounts::tally(&alerts);
                        board.alerts = alerts;
                        board.error = None;
                    }
                    changed
                }
                Err(e) => {
                    // Keep the last good list; only the status line changes
                    let message = e.to_string();
                    let changed = board.error.as_deref() != Some(message.as_str());
                    board.error = Some(message);
                    changed
                }
            }
        });

        if changed {
            debug!("Alert board updated");
        }
    }
}
