//! Time-bounded JSON cache.
//!
//! Every entry is a file `<dir>/<key>.json` holding `{timestamp, payload}`.
//! A bounded in-memory tier sits in front of the directory so repeated
//! lookups within one process skip the filesystem. Reads never fail: a
//! missing, truncated or stale record is simply a miss. Writes are
//! best-effort.

use super::types::WeatherQuery;
use crate::config::Config;
use crate::utils::{round_to_decimals, sanitize_city};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Decimal places kept when keying by coordinates.
pub const COORD_KEY_PRECISION: u32 = 4;

/// Longest time-to-live moka accepts (1000 years). The file tier is not bounded.
const MAX_MEMORY_TTL: Duration = Duration::from_secs(1_000 * 365 * 24 * 3600);

#[derive(Error, Debug)]
enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    ByCity(String),
    /// Coordinates already formatted at [`COORD_KEY_PRECISION`].
    ByCoords { lat: String, lon: String },
}

impl CacheKey {
    /// `None` when a city name has nothing left after sanitizing.
    pub fn for_query(query: &WeatherQuery) -> Option<Self> {
        match query {
            WeatherQuery::City(city) => {
                let name = sanitize_city(city);
                if name.is_empty() {
                    None
                } else {
                    Some(CacheKey::ByCity(name))
                }
            }
            WeatherQuery::Coords { lat, lon } => Some(CacheKey::ByCoords {
                lat: format_coordinate(*lat),
                lon: format_coordinate(*lon),
            }),
        }
    }

    pub fn file_name(&self) -> String {
        match self {
            CacheKey::ByCity(name) => format!("city_{}.json", name),
            CacheKey::ByCoords { lat, lon } => format!("coords_{}_{}.json", lat, lon),
        }
    }
}

fn format_coordinate(value: f64) -> String {
    // Adding 0.0 folds -0.0 into 0.0.
    let rounded = round_to_decimals(value, COORD_KEY_PRECISION) + 0.0;
    format!("{:.*}", COORD_KEY_PRECISION as usize, rounded)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Unix epoch seconds at write time.
    pub timestamp: f64,
    #[serde(alias = "data")]
    pub payload: Value,
}

pub struct CacheStore {
    dir: PathBuf,
    ttl: Duration,
    memory: Option<Cache<CacheKey, CacheEntry>>,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration, memory_capacity: u64) -> Self {
        let memory = (memory_capacity > 0 && !ttl.is_zero()).then(|| {
            Cache::builder()
                .max_capacity(memory_capacity)
                .time_to_live(ttl.min(MAX_MEMORY_TTL))
                .build()
        });

        Self {
            dir: dir.into(),
            ttl,
            memory,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.cache_dir.clone(),
            Duration::from_secs(config.cache_ttl_secs),
            config.cache_memory_capacity,
        )
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, key: &CacheKey) -> Option<Value> {
        let now = epoch_seconds();

        if let Some(memory) = &self.memory {
            if let Some(entry) = memory.get(key).await {
                if self.is_fresh(&entry, now) {
                    return Some(entry.payload);
                }
            }
        }

        let entry = self.read_entry(key).await?;
        if !self.is_fresh(&entry, now) {
            tracing::debug!("Cache entry {} is stale", key.file_name());
            return None;
        }

        if let Some(memory) = &self.memory {
            memory.insert(key.clone(), entry.clone()).await;
        }
        Some(entry.payload)
    }

    pub async fn put(&self, key: &CacheKey, payload: Value) {
        let entry = CacheEntry {
            timestamp: epoch_seconds(),
            payload,
        };

        if let Some(memory) = &self.memory {
            memory.insert(key.clone(), entry.clone()).await;
        }

        if let Err(e) = self.write_entry(key, &entry).await {
            tracing::warn!("Failed to write cache entry {}: {}", key.file_name(), e);
        }
    }

    fn is_fresh(&self, entry: &CacheEntry, now: f64) -> bool {
        let age = now - entry.timestamp;
        age.is_finite() && age >= 0.0 && age < self.ttl.as_secs_f64()
    }

    async fn read_entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        let path = self.dir.join(key.file_name());

        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::debug!("Cache read failed for {}: {}", path.display(), e);
                }
                return None;
            }
        };

        match serde_json::from_slice(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::debug!("Ignoring unreadable cache file {}: {}", path.display(), e);
                None
            }
        }
    }

    async fn write_entry(&self, key: &CacheKey, entry: &CacheEntry) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let target = self.dir.join(key.file_name());
        let staging = self
            .dir
            .join(format!(".{}.{}.tmp", key.file_name(), uuid::Uuid::new_v4()));

        let body = serde_json::to_vec(entry)?;
        let staged = match tokio::fs::write(&staging, body).await {
            Ok(()) => tokio::fs::rename(&staging, &target).await,
            Err(e) => Err(e),
        };

        if let Err(e) = staged {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e.into());
        }
        Ok(())
    }
}

fn epoch_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn city_key(name: &str) -> CacheKey {
        CacheKey::for_query(&WeatherQuery::City(name.to_string())).unwrap()
    }

    async fn write_raw(store: &CacheStore, key: &CacheKey, body: &str) {
        tokio::fs::create_dir_all(store.dir()).await.unwrap();
        tokio::fs::write(store.dir().join(key.file_name()), body)
            .await
            .unwrap();
    }

    #[test]
    fn test_city_key_is_sanitized() {
        assert_eq!(city_key("Dhaka").file_name(), "city_dhaka.json");
        assert_eq!(city_key(" Cox's Bazar ").file_name(), "city_coxs bazar.json");
        assert_eq!(city_key("../secret").file_name(), "city_secret.json");
        assert_eq!(city_key("DHAKA"), city_key("dhaka"));
        assert!(CacheKey::for_query(&WeatherQuery::City("?!".into())).is_none());
    }

    #[test]
    fn test_coordinate_keys_are_normalized() {
        let a = CacheKey::for_query(&WeatherQuery::Coords { lat: 23.7, lon: 90.4 }).unwrap();
        let b = CacheKey::for_query(&WeatherQuery::Coords { lat: 23.70, lon: 90.40000 }).unwrap();
        let c = CacheKey::for_query(&WeatherQuery::Coords { lat: 23.70001, lon: 90.4 }).unwrap();
        let d = CacheKey::for_query(&WeatherQuery::Coords { lat: 23.7001, lon: 90.4 }).unwrap();

        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_ne!(a, d);
        assert_eq!(a.file_name(), "coords_23.7000_90.4000.json");

        let zero = CacheKey::for_query(&WeatherQuery::Coords { lat: -0.00001, lon: 0.0 }).unwrap();
        assert_eq!(zero.file_name(), "coords_0.0000_0.0000.json");
    }

    #[tokio::test]
    async fn test_put_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let store = CacheStore::new(dir.path(), Duration::from_secs(600), 0);
        let key = city_key("Dhaka");
        let payload = json!({ "current": { "name": "Dhaka" }, "uvi": 7.5 });

        store.put(&key, payload.clone()).await;

        assert_eq!(store.get(&key).await, Some(payload));
        assert!(dir.path().join("city_dhaka.json").exists());
    }

    #[tokio::test]
    async fn test_missing_entry_is_a_miss() {
        let dir = tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("not-created-yet"), Duration::from_secs(600), 10);

        assert_eq!(store.get(&city_key("Rajshahi")).await, None);
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let dir = tempdir().unwrap();
        let store = CacheStore::new(dir.path(), Duration::from_secs(600), 0);
        let key = city_key("Dhaka");

        let old = epoch_seconds() - 600.0;
        write_raw(&store, &key, &json!({ "timestamp": old, "payload": { "ok": true } }).to_string()).await;
        assert_eq!(store.get(&key).await, None);

        let recent = epoch_seconds() - 590.0;
        write_raw(&store, &key, &json!({ "timestamp": recent, "payload": { "ok": true } }).to_string()).await;
        assert_eq!(store.get(&key).await, Some(json!({ "ok": true })));
    }

    #[tokio::test]
    async fn test_corrupt_entries_are_misses() {
        let dir = tempdir().unwrap();
        let store = CacheStore::new(dir.path(), Duration::from_secs(600), 0);
        let key = city_key("Chittagong");

        write_raw(&store, &key, "{\"timestamp\": 17000").await;
        assert_eq!(store.get(&key).await, None);

        write_raw(&store, &key, "").await;
        assert_eq!(store.get(&key).await, None);

        write_raw(&store, &key, &json!({ "payload": { "ok": true } }).to_string()).await;
        assert_eq!(store.get(&key).await, None);

        write_raw(&store, &key, &json!({ "timestamp": "yesterday", "payload": 1 }).to_string()).await;
        assert_eq!(store.get(&key).await, None);
    }

    #[tokio::test]
    async fn test_future_timestamp_is_a_miss() {
        let dir = tempdir().unwrap();
        let store = CacheStore::new(dir.path(), Duration::from_secs(600), 0);
        let key = city_key("Dhaka");

        let ahead = epoch_seconds() + 3600.0;
        write_raw(&store, &key, &json!({ "timestamp": ahead, "payload": 1 }).to_string()).await;
        assert_eq!(store.get(&key).await, None);
    }

    #[tokio::test]
    async fn test_legacy_data_field_is_accepted() {
        let dir = tempdir().unwrap();
        let store = CacheStore::new(dir.path(), Duration::from_secs(600), 0);
        let key = city_key("Sylhet");

        let body = json!({ "timestamp": epoch_seconds(), "data": { "error": null } });
        write_raw(&store, &key, &body.to_string()).await;

        assert_eq!(store.get(&key).await, Some(json!({ "error": null })));
    }

    #[tokio::test]
    async fn test_write_failure_is_swallowed() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("cache");
        std::fs::write(&blocker, "not a directory").unwrap();

        let store = CacheStore::new(&blocker, Duration::from_secs(600), 0);
        let key = city_key("Dhaka");

        store.put(&key, json!({ "ok": true })).await;
        assert_eq!(store.get(&key).await, None);
    }

    #[tokio::test]
    async fn test_memory_tier_serves_repeat_reads() {
        let dir = tempdir().unwrap();
        let store = CacheStore::new(dir.path(), Duration::from_secs(600), 100);
        let key = city_key("Dhaka");

        store.put(&key, json!({ "hot": true })).await;
        std::fs::remove_file(dir.path().join(key.file_name())).unwrap();

        assert_eq!(store.get(&key).await, Some(json!({ "hot": true })));
    }

    #[tokio::test]
    async fn test_zero_ttl_never_hits() {
        let dir = tempdir().unwrap();
        let store = CacheStore::new(dir.path(), Duration::ZERO, 100);
        let key = city_key("Dhaka");

        store.put(&key, json!(1)).await;
        assert_eq!(store.get(&key).await, None);
    }

    #[tokio::test]
    async fn test_last_writer_wins() {
        let dir = tempdir().unwrap();
        let store = CacheStore::new(dir.path(), Duration::from_secs(600), 0);
        let key = city_key("Dhaka");

        store.put(&key, json!({ "version": 1 })).await;
        store.put(&key, json!({ "version": 2 })).await;

        assert_eq!(store.get(&key).await, Some(json!({ "version": 2 })));
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn test_ttl_beyond_memory_limit_still_caches() {
        let dir = tempdir().unwrap();
        let store = CacheStore::new(dir.path(), Duration::from_secs(40_000_000_000), 10);
        let key = city_key("Dhaka");

        assert_eq!(store.ttl(), Duration::from_secs(40_000_000_000));
        store.put(&key, json!({ "ok": true })).await;
        assert_eq!(store.get(&key).await, Some(json!({ "ok": true })));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_staging_file() {
        let dir = tempdir().unwrap();
        let store = CacheStore::new(dir.path(), Duration::from_secs(600), 0);
        let key = city_key("Dhaka");

        // a non-empty directory at the target path makes the rename fail
        let target = dir.path().join(key.file_name());
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("occupied"), "x").unwrap();

        store.put(&key, json!({ "ok": true })).await;

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![key.file_name()]);
        assert_eq!(store.get(&key).await, None);
    }
}
