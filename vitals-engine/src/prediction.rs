//! Client-side cache of the latest risk assessment per patient.
//!
//! The cache is an optimization layer, never a record of truth: entries age
//! out after a fixed TTL measured from local write time, and losing the backing
//! store simply means "no prediction available".

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use error_common::MonitorError;
use serde::{Deserialize, Serialize};
use std::collections::{btree_map, BTreeMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::timestamp;
use crate::types::{Patient, RiskAssessment, RiskLevel};

pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

// ============================================================================
// CACHE ENTRY
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PredictionEntry {
    pub risk_level: RiskLevel,
    pub risk_score: f64,
    pub confidence: f64,
    pub recommendations: Vec<String>,
    /// Remote assessment time, if the payload carried a readable one
    pub predicted_at: Option<DateTime<Utc>>,
    /// Local cache write time
    pub last_updated: DateTime<Utc>,
}

impl PredictionEntry {
    pub fn from_assessment(assessment: &RiskAssessment, now: DateTime<Utc>) -> Self {
        Self {
            risk_level: assessment.risk_level,
            risk_score: assessment.risk_score,
            confidence: assessment.confidence,
            recommendations: assessment.recommendations.clone(),
            predicted_at: timestamp::parse(assessment.predicted_at.as_deref()),
            last_updated: now,
        }
    }

    /// The later of `last_updated` and `predicted_at`
    pub fn freshness(&self) -> DateTime<Utc> {
        self.predicted_at.map_or(self.last_updated, |predicted| predicted.max(self.last_updated))
    }

    pub fn is_stale(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        // A negative age (freshness in the future) never counts as stale
        (now - self.freshness()).to_std().is_ok_and(|age| age > ttl)
    }

    pub fn to_assessment(&self) -> RiskAssessment {
        RiskAssessment {
            risk_level: self.risk_level,
            risk_score: self.risk_score,
            confidence: self.confidence,
            recommendations: self.recommendations.clone(),
            predicted_at: self.predicted_at.map(|at| at.to_rfc3339()),
        }
    }
}

pub type Entries = BTreeMap<String, PredictionEntry>;

// ============================================================================
// PREDICTION CACHE
// ============================================================================

/// In-memory TTL cache with lazy, single-pass eviction (no per-entry timers)
#[derive(Debug, Clone)]
pub struct PredictionCache {
    entries: Entries,
    ttl: Duration,
}

impl Default for PredictionCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl PredictionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Entries::new(),
            ttl,
        }
    }

    /// Seed from persisted entries, dropping whatever is already stale
    pub fn from_entries(entries: Entries, ttl: Duration, now: DateTime<Utc>) -> Self {
        let mut cache = Self { entries, ttl };
        let evicted = cache.evict_stale(now);
        if evicted > 0 {
            info!(evicted, "Evicted stale predictions on load");
        }
        cache
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get_at(&mut self, patient_id: &str, now: DateTime<Utc>) -> Option<&PredictionEntry> {
        let stale = self.entries.get(patient_id)?.is_stale(now, self.ttl);
        if stale {
            debug!(patient_id = %patient_id, "Prediction expired");
            self.entries.remove(patient_id);
            return None;
        }
        self.entries.get(patient_id)
    }

    pub fn get(&mut self, patient_id: &str) -> Option<&PredictionEntry> {
        self.get_at(patient_id, Utc::now())
    }

    /// Store a fresh assessment; `last_updated` is always the local `now`
    pub fn put_at(&mut self, patient_id: &str, assessment: &RiskAssessment, now: DateTime<Utc>) -> &PredictionEntry {
        let entry = PredictionEntry::from_assessment(assessment, now);
        match self.entries.entry(patient_id.to_string()) {
            btree_map::Entry::Occupied(mut slot) => {
                slot.insert(entry);
                slot.into_mut()
            }
            btree_map::Entry::Vacant(slot) => slot.insert(entry),
        }
    }

    pub fn put(&mut self, patient_id: &str, assessment: &RiskAssessment) -> &PredictionEntry {
        self.put_at(patient_id, assessment, Utc::now())
    }

    /// Remove every stale entry in one pass, returning how many went
    pub fn evict_stale(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, entry| !entry.is_stale(now, ttl));
        before - self.entries.len()
    }

    pub fn remove(&mut self, patient_id: &str) -> bool {
        self.entries.remove(patient_id).is_some()
    }

    pub fn entries(&self) -> &Entries {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// PERSISTENCE
// ============================================================================

/// Where the cache survives between sessions
#[async_trait]
pub trait PredictionStore: Send + Sync {
    async fn load(&self) -> error_common::Result<Entries>;

    async fn save(&self, entries: &Entries) -> error_common::Result<()>;
}

/// JSON document on local disk. A missing file is an empty cache.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn storage_error(&self, e: impl std::fmt::Display) -> MonitorError {
        MonitorError::Storage(format!("{}: {}", self.path.display(), e))
    }

    /// Sibling of the target, unique per process and save
    fn staging_path(&self) -> PathBuf {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{}.{}.tmp", std::process::id(), NEXT.fetch_add(1, Ordering::Relaxed)));
        PathBuf::from(name)
    }
}

#[async_trait]
impl PredictionStore for JsonFileStore {
    async fn load(&self) -> error_common::Result<Entries> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Entries::new()),
            Err(e) => return Err(self.storage_error(e)),
        };

        serde_json::from_slice(&raw).map_err(|e| MonitorError::Decode(format!("{}: {}", self.path.display(), e)))
    }

    async fn save(&self, entries: &Entries) -> error_common::Result<()> {
        let body = serde_json::to_vec_pretty(entries).map_err(|e| self.storage_error(e))?;

        // Staged next to the target, then renamed into place
        let staging = self.staging_path();
        tokio::fs::write(&staging, body).await.map_err(|e| self.storage_error(e))?;
        if let Err(e) = tokio::fs::rename(&staging, &self.path).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(self.storage_error(e));
        }
        Ok(())
    }
}

/// Volatile store for tests and short-lived sessions
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<Entries>,
}

#[async_trait]
impl PredictionStore for MemoryStore {
    async fn load(&self) -> error_common::Result<Entries> {
        Ok(self.entries.read().await.clone())
    }

    async fn save(&self, entries: &Entries) -> error_common::Result<()> {
        *self.entries.write().await = entries.clone();
        Ok(())
    }
}

// ============================================================================
// PREDICTION SERVICE
// ============================================================================

/// Remote risk model; treated as an opaque call per patient
#[async_trait]
pub trait PredictionClient: Send + Sync {
    async fn predict(&self, patient_id: &str) -> error_common::Result<RiskAssessment>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionOrigin {
    /// Fetched by this client within the TTL
    Cache,
    /// Snapshot delivered with the patient directory
    Directory,
}

/// What a risk badge renders
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskBadge {
    pub assessment: RiskAssessment,
    pub origin: PredictionOrigin,
}

pub struct PredictionService {
    cache: RwLock<PredictionCache>,
    store: Arc<dyn PredictionStore>,
    /// Held across snapshot and save so the newest snapshot lands last
    save_lock: Mutex<()>,
    client: Option<Arc<dyn PredictionClient>>,
}

impl PredictionService {
    /// Load persisted entries; an unreadable store starts an empty cache
    pub async fn load(store: Arc<dyn PredictionStore>, ttl: Duration) -> Self {
        let entries = match store.load().await {
            Ok(entries) => entries,
            Err(e) => {
                error_common::log_error("prediction cache load", &e);
                Entries::new()
            }
        };

        let cache = PredictionCache::from_entries(entries, ttl, Utc::now());
        info!(entries = cache.len(), "Prediction cache loaded");

        Self {
            cache: RwLock::new(cache),
            store,
            save_lock: Mutex::new(()),
            client: None,
        }
    }

    pub fn with_client(mut self, client: Arc<dyn PredictionClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Run a remote prediction and cache the result.
    ///
    /// Persisting is best-effort: a store failure is logged, the fresh entry
    /// is still returned and served from memory.
    pub async fn assess(&self, patient_id: &str) -> error_common::Result<PredictionEntry> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| MonitorError::Unavailable("no prediction client configured".into()))?;

        let assessment = client.predict(patient_id).await.map_err(|e| {
            error_common::log_error("risk prediction", &e);
            e
        })?;

        let entry = self.cache.write().await.put(patient_id, &assessment).clone();
        debug!(patient_id = %patient_id, risk_level = ?entry.risk_level, "Prediction cached");

        if let Err(e) = self.persist().await {
            error_common::log_error("prediction cache persist", &e);
        }
        Ok(entry)
    }

    pub async fn cached(&self, patient_id: &str) -> Option<PredictionEntry> {
        self.cache.write().await.get(patient_id).cloned()
    }

    /// A fresh cache entry always wins over the directory snapshot
    pub async fn badge_for(&self, patient: &Patient) -> Option<RiskBadge> {
        if let Some(entry) = self.cached(&patient.id).await {
            return Some(RiskBadge {
                assessment: entry.to_assessment(),
                origin: PredictionOrigin::Cache,
            });
        }

        patient.prediction.clone().map(|assessment| RiskBadge {
            assessment,
            origin: PredictionOrigin::Directory,
        })
    }

    pub async fn evict_stale(&self) -> usize {
        let evicted = self.cache.write().await.evict_stale(Utc::now());
        if evicted > 0 {
            info!(evicted, "Evicted stale predictions");
            if let Err(e) = self.persist().await {
                error_common::log_error("prediction cache persist", &e);
            }
        }
        evicted
    }

    pub async fn remove(&self, patient_id: &str) -> error_common::Result<bool> {
        let removed = self.cache.write().await.remove(patient_id);
        if removed {
            self.persist().await?;
        }
        Ok(removed)
    }

    pub async fn entries(&self) -> Entries {
        self.cache.read().await.entries().clone()
    }

    pub async fn persist(&self) -> error_common::Result<()> {
        let _saving = self.save_lock.lock().await;
        let snapshot = self.entries().await;
        self.store.save(&snapshot).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn assessment(level: RiskLevel, predicted_at: Option<&str>) -> RiskAssessment {
        RiskAssessment {
            risk_level: level,
            risk_score: 0.72,
            confidence: 0.9,
            recommendations: vec!["Increase monitoring frequency".into()],
            predicted_at: predicted_at.map(str::to_string),
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap()
    }

    fn minutes(n: i64) -> chrono::Duration {
        chrono::Duration::minutes(n)
    }

    #[test]
    fn test_entry_expires_after_an_hour() {
        let mut cache = PredictionCache::default();
        cache.put_at("P1", &assessment(RiskLevel::High, None), t0());

        assert!(cache.get_at("P1", t0() + minutes(59)).is_some());
        assert!(cache.get_at("P1", t0() + minutes(61)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_stamps_local_time() {
        let mut cache = PredictionCache::default();

        // Remote clock two hours behind must not cause immediate eviction
        let entry = cache.put_at("P1", &assessment(RiskLevel::Medium, Some("2025-01-01_08-00-00")), t0());
        assert_eq!(entry.last_updated, t0());
        assert!(cache.get_at("P1", t0() + minutes(30)).is_some());
    }

    #[test]
    fn test_newer_predicted_at_extends_freshness() {
        let mut cache = PredictionCache::default();
        cache.put_at("P1", &assessment(RiskLevel::Low, Some("2025-01-01T10:30:00Z")), t0());

        assert!(cache.get_at("P1", t0() + minutes(85)).is_some());
        assert!(cache.get_at("P1", t0() + minutes(91)).is_none());
    }

    #[test]
    fn test_evict_stale_single_pass() {
        let mut cache = PredictionCache::default();
        cache.put_at("P1", &assessment(RiskLevel::High, None), t0());
        cache.put_at("P2", &assessment(RiskLevel::Low, None), t0() + minutes(30));
        cache.put_at("P3", &assessment(RiskLevel::Low, None), t0() + minutes(45));

        assert_eq!(cache.evict_stale(t0() + minutes(80)), 1);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.evict_stale(t0() + minutes(200)), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_from_entries_drops_stale() {
        let mut entries = Entries::new();
        entries.insert("old".into(), PredictionEntry::from_assessment(&assessment(RiskLevel::High, None), t0()));
        entries.insert(
            "new".into(),
            PredictionEntry::from_assessment(&assessment(RiskLevel::Low, None), t0() + minutes(100)),
        );

        let cache = PredictionCache::from_entries(entries, DEFAULT_TTL, t0() + minutes(120));
        assert_eq!(cache.entries().keys().collect::<Vec<_>>(), vec!["new"]);
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::default();
        let mut entries = Entries::new();
        entries.insert("P1".into(), PredictionEntry::from_assessment(&assessment(RiskLevel::High, None), t0()));

        tokio_test::block_on(async {
            store.save(&entries).await.unwrap();
            assert_eq!(store.load().await.unwrap(), entries);
        });
    }

    #[tokio::test]
    async fn test_json_store_missing_and_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();

        let missing = JsonFileStore::new(dir.path().join("absent.json"));
        assert!(missing.load().await.unwrap().is_empty());

        let corrupt_path = dir.path().join("corrupt.json");
        tokio::fs::write(&corrupt_path, b"{ not json").await.unwrap();
        let corrupt = JsonFileStore::new(&corrupt_path);
        assert!(matches!(corrupt.load().await, Err(MonitorError::Decode(_))));

        // A corrupt store degrades to an empty cache
        let service = PredictionService::load(Arc::new(corrupt), DEFAULT_TTL).await;
        assert!(service.entries().await.is_empty());
    }

    struct CountingClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PredictionClient for CountingClient {
        async fn predict(&self, patient_id: &str) -> error_common::Result<RiskAssessment> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if patient_id == "P-down" {
                return Err(MonitorError::Status { status: 502, url: "/predict".into() });
            }
            Ok(assessment(RiskLevel::Critical, None))
        }
    }

    #[tokio::test]
    async fn test_assess_persists_and_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictions.json");
        let client = Arc::new(CountingClient { calls: AtomicUsize::new(0) });

        let service = PredictionService::load(Arc::new(JsonFileStore::new(&path)), DEFAULT_TTL)
            .await
            .with_client(client.clone());

        let entry = service.assess("P1").await.unwrap();
        assert_eq!(entry.risk_level, RiskLevel::Critical);
        assert!(service.assess("P-down").await.is_err());
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);

        let reloaded = PredictionService::load(Arc::new(JsonFileStore::new(&path)), DEFAULT_TTL).await;
        assert_eq!(reloaded.cached("P1").await, Some(entry));
        assert!(reloaded.cached("P-down").await.is_none());

        assert!(reloaded.remove("P1").await.unwrap());
        assert!(!reloaded.remove("P1").await.unwrap());
        let again = PredictionService::load(Arc::new(JsonFileStore::new(&path)), DEFAULT_TTL).await;
        assert!(again.entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_saves_to_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictions.json");

        let saves = (0..16).map(|i| {
            let path = path.clone();
            async move {
                let mut entries = Entries::new();
                entries.insert(format!("P{i}"), PredictionEntry::from_assessment(&assessment(RiskLevel::Low, None), t0()));
                JsonFileStore::new(path).save(&entries).await
            }
        });
        for result in futures::future::join_all(saves).await {
            result.unwrap();
        }

        assert_eq!(JsonFileStore::new(&path).load().await.unwrap().len(), 1);
        let mut listing = tokio::fs::read_dir(dir.path()).await.unwrap();
        let mut files = Vec::new();
        while let Some(file) = listing.next_entry().await.unwrap() {
            files.push(file.file_name());
        }
        assert_eq!(files, vec![std::ffi::OsString::from("predictions.json")]);
    }

    #[tokio::test]
    async fn test_concurrent_assessments_all_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictions.json");
        let service = PredictionService::load(Arc::new(JsonFileStore::new(&path)), DEFAULT_TTL)
            .await
            .with_client(Arc::new(CountingClient { calls: AtomicUsize::new(0) }));

        let patients: Vec<String> = (0..8).map(|i| format!("P{i}")).collect();
        let results = futures::future::join_all(patients.iter().map(|id| service.assess(id))).await;
        assert!(results.iter().all(Result::is_ok));

        let reloaded = JsonFileStore::new(&path).load().await.unwrap();
        assert_eq!(reloaded.len(), 8);
    }

    #[tokio::test]
    async fn test_assess_without_client_is_unavailable() {
        let service = PredictionService::load(Arc::new(MemoryStore::default()), DEFAULT_TTL).await;
        assert!(matches!(service.assess("P1").await, Err(MonitorError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_fresh_cache_wins_over_directory_snapshot() {
        let service = PredictionService::load(Arc::new(MemoryStore::default()), DEFAULT_TTL)
            .await
            .with_client(Arc::new(CountingClient { calls: AtomicUsize::new(0) }));

        let patient = Patient {
            id: "P1".into(),
            prediction: Some(assessment(RiskLevel::Low, Some("2030-01-01T00:00:00Z"))),
            ..Patient::default()
        };

        let badge = service.badge_for(&patient).await.unwrap();
        assert_eq!(badge.origin, PredictionOrigin::Directory);
        assert_eq!(badge.assessment.risk_level, RiskLevel::Low);

        service.assess("P1").await.unwrap();
        let badge = service.badge_for(&patient).await.unwrap();
        assert_eq!(badge.origin, PredictionOrigin::Cache);
        assert_eq!(badge.assessment.risk_level, RiskLevel::Critical);

        let unknown = Patient { id: "P9".into(), ..Patient::default() };
        assert!(service.badge_for(&unknown).await.is_none());
    }
}
