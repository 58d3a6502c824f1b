//! Live poll cache: the latest reading per device, refreshed on a timer.
//!
//! One subscription is active at a time. Changing the device set stops the
//! current timer task and starts a new one; an empty set holds no timer at
//! all. Manual [`LivePollCache::refresh`] and timer ticks share one fetch path,
//! and a device already being fetched is skipped by whichever caller comes
//! second. Results that land after their subscription was replaced or
//! stopped are discarded.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::types::{Reading, VitalReading};

// ============================================================================
// READING SOURCE TRAIT
// ============================================================================

/// Backend that serves the latest reading per device
#[async_trait]
pub trait ReadingSource: Send + Sync {
    /// Best-effort fetch for `device_ids`.
    ///
    /// Failures are per id. An id missing from the result had nothing to report.
    async fn fetch_latest(&self, device_ids: &[String]) -> HashMap<String, error_common::Result<Value>>;
}

// ============================================================================
// SNAPSHOT
// ============================================================================

/// Point-in-time copy of the cache handed to callers
#[derive(Debug, Clone, Default)]
pub struct LiveSnapshot {
    pub vitals: HashMap<String, Reading>,
    pub last_updated: HashMap<String, DateTime<Utc>>,
    pub loading: bool,
    /// Last transport error of the most recent cycle
    pub error: Option<String>,
}

impl LiveSnapshot {
    pub fn reading(&self, device_id: &str) -> Option<&Reading> {
        self.vitals.get(device_id)
    }

    pub fn vital(&self, device_id: &str) -> Option<&VitalReading> {
        self.reading(device_id).and_then(Reading::as_vital)
    }

    /// Seed a snapshot directly, e.g. from a fixture file
    pub fn from_readings(readings: impl IntoIterator<Item = (String, Reading)>, at: DateTime<Utc>) -> Self {
        let vitals: HashMap<_, _> = readings.into_iter().collect();
        let last_updated = vitals.keys().map(|id| (id.clone(), at)).collect();
        Self {
            vitals,
            last_updated,
            loading: false,
            error: None,
        }
    }
}

// ============================================================================
// CACHE
// ============================================================================

#[derive(Default)]
struct PollState {
    vitals: HashMap<String, Reading>,
    last_updated: HashMap<String, DateTime<Utc>>,
    error: Option<String>,
    /// Device id to the generation of the cycle fetching it
    in_flight: HashMap<String, u64>,
}

struct PollShared {
    source: Arc<dyn ReadingSource>,
    state: RwLock<PollState>,
    generation: AtomicU64,
    fetches: AtomicU64,
    running_timers: AtomicUsize,
}

struct Subscription {
    generation: u64,
    device_ids: Arc<Vec<String>>,
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct LivePollCache {
    shared: Arc<PollShared>,
    interval: Duration,
    subscription: Mutex<Option<Subscription>>,
}

impl LivePollCache {
    pub fn new(source: Arc<dyn ReadingSource>, interval: Duration) -> Self {
        Self {
            shared: Arc::new(PollShared {
                source,
                state: RwLock::new(PollState::default()),
                generation: AtomicU64::new(0),
                fetches: AtomicU64::new(0),
                running_timers: AtomicUsize::new(0),
            }),
            interval,
            subscription: Mutex::new(None),
        }
    }

    /// Poll `device_ids` from now on, replacing any previous subscription.
    ///
    /// The first fetch happens immediately; an empty set only stops polling.
    pub async fn subscribe(&self, device_ids: impl IntoIterator<Item = String>) {
        let device_ids: Vec<String> = device_ids.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        let mut slot = self.subscription.lock().await;

        if let Some(previous) = slot.take() {
            self.cancel(previous);
        }

        if device_ids.is_empty() {
            debug!("Empty device set; live polling idle");
            return;
        }

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let device_ids = Arc::new(device_ids);
        let (cancel, cancelled) = watch::channel(false);

        info!(
            devices = device_ids.len(),
            interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            "Starting live polling"
        );

        let task = tokio::spawn(run_timer(
            Arc::clone(&self.shared),
            Arc::clone(&device_ids),
            generation,
            self.interval,
            cancelled,
        ));

        *slot = Some(Subscription {
            generation,
            device_ids,
            cancel,
            task,
        });
    }

    /// Stop polling; in-flight results will be discarded
    pub async fn stop(&self) {
        if let Some(previous) = self.subscription.lock().await.take() {
            self.cancel(previous);
        }
    }

    /// Run an out-of-band cycle now for the subscribed devices.
    ///
    /// Devices already being fetched by the timer are skipped.
    pub async fn refresh(&self) {
        let current = self
            .subscription
            .lock()
            .await
            .as_ref()
            .map(|subscription| (Arc::clone(&subscription.device_ids), subscription.generation));

        match current {
            Some((device_ids, generation)) => self.shared.run_cycle(&device_ids, generation).await,
            None => debug!("Refresh requested with no active subscription"),
        }
    }

    pub async fn snapshot(&self) -> LiveSnapshot {
        let state = self.shared.state.read().await;
        let current = self.shared.generation.load(Ordering::SeqCst);
        LiveSnapshot {
            vitals: state.vitals.clone(),
            last_updated: state.last_updated.clone(),
            loading: state.in_flight.values().any(|owner| *owner == current),
            error: state.error.clone(),
        }
    }

    pub async fn is_polling(&self) -> bool {
        self.subscription.lock().await.is_some()
    }

    pub async fn device_ids(&self) -> Vec<String> {
        self.subscription
            .lock()
            .await
            .as_ref()
            .map(|subscription| subscription.device_ids.to_vec())
            .unwrap_or_default()
    }

    /// Timer tasks still alive, including ones finishing a cancelled cycle
    pub fn running_timers(&self) -> usize {
        self.shared.running_timers.load(Ordering::SeqCst)
    }

    /// Fetches issued so far (timer and manual)
    pub fn fetch_count(&self) -> u64 {
        self.shared.fetches.load(Ordering::SeqCst)
    }

    fn cancel(&self, subscription: Subscription) {
        // Invalidate results of any cycle still in flight
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        let _ = subscription.cancel.send(true);
        info!(devices = subscription.device_ids.len(), "Stopped live polling");
    }
}

impl Drop for LivePollCache {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.get_mut().take() {
            subscription.task.abort();
        }
    }
}

struct TimerGuard<'a>(&'a AtomicUsize);

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn run_timer(
    shared: Arc<PollShared>,
    device_ids: Arc<Vec<String>>,
    generation: u64,
    period: Duration,
    mut cancelled: watch::Receiver<bool>,
) {
    shared.running_timers.fetch_add(1, Ordering::SeqCst);
    let _guard = TimerGuard(&shared.running_timers);

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancelled.changed() => break,
        }
        shared.run_cycle(&device_ids, generation).await;
        if *cancelled.borrow() {
            break;
        }
    }
}

impl PollShared {
    async fn run_cycle(&self, device_ids: &[String], generation: u64) {
        // A claim held by a replaced subscription does not block this one
        let claimed: Vec<String> = {
            let mut state = self.state.write().await;
            let mut claimed = Vec::with_capacity(device_ids.len());
            for id in device_ids {
                if state.in_flight.get(id) != Some(&generation) {
                    state.in_flight.insert(id.clone(), generation);
                    claimed.push(id.clone());
                }
            }
            claimed
        };

        if claimed.is_empty() {
            debug!("Every device already in flight; cycle coalesced");
            return;
        }

        self.fetches.fetch_add(1, Ordering::SeqCst);
        let mut results = self.source.fetch_latest(&claimed).await;

        let mut state = self.state.write().await;
        for id in &claimed {
            if state.in_flight.get(id) == Some(&generation) {
                state.in_flight.remove(id);
            }
        }

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(devices = claimed.len(), "Discarding results for a stale subscription");
            return;
        }

        let now = Utc::now();
        let mut cycle_error = None;

        for id in claimed {
            match results.remove(&id) {
                Some(Ok(raw)) => match Reading::from_value(&raw) {
                    Some(reading) => {
                        state.vitals.insert(id.clone(), reading);
                        state.last_updated.insert(id, now);
                    }
                    None => debug!(device_id = %id, "Discarding malformed live reading"),
                },
                Some(Err(e)) => {
                    warn!(device_id = %id, error_code = e.code(), error = %e, "Live reading fetch failed");
                    cycle_error = Some(format!("{id}: {e}"));
                }
                None => {}
            }
        }

        state.error = cycle_error;
    }
}
