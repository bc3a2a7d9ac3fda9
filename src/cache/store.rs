//! Versioned result cache over a pluggable storage backend
//!
//! Centralizes result caching for dashboard pages without changing any
//! payload shapes: each page passes a namespace and key parts, and gets back
//! exactly the payload it cached. Caching is best-effort throughout; no
//! storage fault ever reaches the caller.

use std::collections::HashMap;

use chrono::{DateTime, Local};
use serde_json::Value;

use super::backend::StorageBackend;
use super::entry::CacheEntry;

/// Prefix shared by every cache key in the backing store.
pub const STORAGE_PREFIX: &str = "__cache__";

/// Per-namespace entry cap; exceeding it triggers oldest-first eviction.
pub const MAX_ENTRIES_PER_PAGE: usize = 30;

/// How many entries one eviction pass removes.
const EVICT_BATCH: usize = 5;

/// Version served for namespaces that were never registered.
const DEFAULT_VERSION: &str = "v1";

/// Per-namespace cache policy.
struct Namespace {
    version: String,
    default_ttl_ms: i64,
}

/// Key-addressed, versioned, TTL-bound cache with capacity eviction.
///
/// Entries are invalidated by schema version, by TTL, and by a fixed daily
/// cutoff at local noon (upstream data refreshes on a daily batch cadence,
/// so a wall-clock TTL alone would keep stale entries alive across the
/// refresh boundary). Invalid and corrupt entries are deleted the moment a
/// read sees them.
pub struct CacheStore<B: StorageBackend> {
    backend: B,
    namespaces: HashMap<String, Namespace>,
}

impl<B: StorageBackend> CacheStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            namespaces: HashMap::new(),
        }
    }

    /// Declare a namespace's current schema version and default TTL.
    ///
    /// Bump the version whenever the cached payload's shape changes; old
    /// entries then read as invalid instead of feeding stale shapes to new
    /// code. Unregistered namespaces fall back to version `"v1"` with no
    /// TTL bound (the daily cutoff still applies).
    pub fn register_namespace(
        &mut self,
        name: impl Into<String>,
        version: impl Into<String>,
        default_ttl_ms: i64,
    ) {
        self.namespaces.insert(
            name.into(),
            Namespace {
                version: version.into(),
                default_ttl_ms,
            },
        );
    }

    /// Build the full storage key for a namespace + discriminator parts.
    ///
    /// Format: `__cache__:{namespace}:{version}:{part:part:...}`. Stable
    /// across restarts; exposed for diagnostics.
    pub fn make_key(&self, namespace: &str, parts: &[&str]) -> String {
        [
            STORAGE_PREFIX,
            namespace,
            self.version_of(namespace),
            &parts.join(":"),
        ]
        .join(":")
    }

    /// Look up a cached payload. Absent, corrupt, and invalid entries all
    /// read as a miss; the latter two are deleted on the way out.
    pub fn get(&mut self, namespace: &str, parts: &[&str]) -> Option<Value> {
        self.get_at(namespace, parts, Local::now())
    }

    /// `get` against an explicit clock instant.
    pub fn get_at(&mut self, namespace: &str, parts: &[&str], now: DateTime<Local>) -> Option<Value> {
        let key = self.make_key(namespace, parts);
        let raw = self.backend.get_item(&key)?;

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!("removing corrupt cache entry {}: {}", key, err);
                self.backend.remove_item(&key);
                return None;
            }
        };

        if !entry.is_valid(now, self.version_of(namespace), self.default_ttl_of(namespace)) {
            self.backend.remove_item(&key);
            return None;
        }

        Some(entry.data)
    }

    /// Cache a payload under the namespace + parts.
    ///
    /// `ttl_ms` falls back to the namespace default. If the backend rejects
    /// the write, the oldest entries for the namespace are evicted and the
    /// write retried exactly once; a second failure drops it silently.
    pub fn set(&mut self, namespace: &str, parts: &[&str], payload: Value, ttl_ms: Option<i64>) {
        self.set_at(namespace, parts, payload, ttl_ms, Local::now())
    }

    /// `set` against an explicit clock instant.
    pub fn set_at(
        &mut self,
        namespace: &str,
        parts: &[&str],
        payload: Value,
        ttl_ms: Option<i64>,
        now: DateTime<Local>,
    ) {
        let key = self.make_key(namespace, parts);
        let ttl = ttl_ms.unwrap_or_else(|| self.default_ttl_of(namespace));
        let entry = CacheEntry::new(self.version_of(namespace), payload, now, Some(ttl));

        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::debug!("cache entry failed to serialize, dropping: {}", err);
                return;
            }
        };

        if self.backend.set_item(&key, &raw).is_err() {
            self.evict_oldest(namespace, EVICT_BATCH);
            if let Err(err) = self.backend.set_item(&key, &raw) {
                tracing::debug!("cache write dropped for {}: {}", key, err);
                return;
            }
        }

        self.trim_namespace(namespace);
    }

    /// Remove every invalid entry for the namespace. Periodic housekeeping;
    /// reads self-heal anyway, so this only reclaims space early.
    pub fn clear_expired(&mut self, namespace: &str) {
        self.clear_expired_at(namespace, Local::now())
    }

    /// `clear_expired` against an explicit clock instant.
    pub fn clear_expired_at(&mut self, namespace: &str, now: DateTime<Local>) {
        let prefix = page_prefix(namespace);
        let version = self.version_of(namespace).to_string();
        let default_ttl = self.default_ttl_of(namespace);

        for key in self.backend.keys() {
            if !key.starts_with(&prefix) {
                continue;
            }
            let Some(raw) = self.backend.get_item(&key) else {
                continue;
            };
            let keep = serde_json::from_str::<CacheEntry>(&raw)
                .map(|entry| entry.is_valid(now, &version, default_ttl))
                .unwrap_or(false);
            if !keep {
                self.backend.remove_item(&key);
            }
        }
    }

    /// Number of entries currently stored for the namespace.
    pub fn entry_count(&self, namespace: &str) -> usize {
        let prefix = page_prefix(namespace);
        self.backend
            .keys()
            .iter()
            .filter(|k| k.starts_with(&prefix))
            .count()
    }

    /// Approximate bytes used by the whole store.
    pub fn used_bytes(&self) -> u64 {
        self.backend.used_bytes()
    }

    /// Namespaces with at least one stored entry, sorted.
    pub fn stored_namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .backend
            .keys()
            .iter()
            .filter_map(|k| {
                k.strip_prefix(STORAGE_PREFIX)?
                    .strip_prefix(':')?
                    .split(':')
                    .next()
                    .map(str::to_string)
            })
            .collect();
        names.sort();
        names.dedup();
        names
    }

    fn version_of(&self, namespace: &str) -> &str {
        self.namespaces
            .get(namespace)
            .map(|ns| ns.version.as_str())
            .unwrap_or(DEFAULT_VERSION)
    }

    fn default_ttl_of(&self, namespace: &str) -> i64 {
        self.namespaces
            .get(namespace)
            .map(|ns| ns.default_ttl_ms)
            .unwrap_or(0)
    }

    /// Namespace entries ordered oldest-write-first. Corrupt entries sort
    /// first (timestamp 0) so eviction reclaims them before anything else.
    fn page_entries_oldest_first(&self, namespace: &str) -> Vec<(String, i64)> {
        let prefix = page_prefix(namespace);
        let mut entries: Vec<(String, i64)> = self
            .backend
            .keys()
            .into_iter()
            .filter(|k| k.starts_with(&prefix))
            .map(|key| {
                let ts = self
                    .backend
                    .get_item(&key)
                    .and_then(|raw| serde_json::from_str::<CacheEntry>(&raw).ok())
                    .map(|entry| entry.timestamp)
                    .unwrap_or(0);
                (key, ts)
            })
            .collect();
        // Key as tie-break keeps eviction deterministic for same-ms writes.
        entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        entries
    }

    fn evict_oldest(&mut self, namespace: &str, count: usize) {
        for (key, _) in self
            .page_entries_oldest_first(namespace)
            .into_iter()
            .take(count)
        {
            self.backend.remove_item(&key);
        }
    }

    /// Enforce the per-namespace capacity after a successful write.
    fn trim_namespace(&mut self, namespace: &str) {
        if self.entry_count(namespace) > MAX_ENTRIES_PER_PAGE {
            self.evict_oldest(namespace, EVICT_BATCH);
        }
    }
}

fn page_prefix(namespace: &str) -> String {
    format!("{}:{}:", STORAGE_PREFIX, namespace)
}
