//! Pluggable key-value storage behind the result cache
//!
//! The cache never touches a concrete store directly; it goes through
//! `StorageBackend` so tests can drive an in-memory map while production
//! uses the file-backed store. Backends expose a small string-keyed surface
//! and report write failures (quota, I/O) as typed errors the cache layer
//! degrades on.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors a backend can raise on write. Reads never fail; a missing or
/// unreadable value is simply absent.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage quota exceeded")]
    QuotaExceeded,

    #[error("failed to persist store: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize store: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// String-keyed storage surface the cache is written against.
pub trait StorageBackend {
    /// Get the value for a key, or None if absent.
    fn get_item(&self, key: &str) -> Option<String>;

    /// Set a key to a value. May fail on quota or I/O; the caller decides
    /// how to degrade.
    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a key. Removing an absent key is a no-op.
    fn remove_item(&mut self, key: &str);

    /// All keys currently present, in no particular order.
    fn keys(&self) -> Vec<String>;

    /// Approximate bytes used by keys and values together.
    fn used_bytes(&self) -> u64;
}

fn map_bytes(items: &HashMap<String, String>) -> u64 {
    items
        .iter()
        .map(|(k, v)| (k.len() + v.len()) as u64)
        .sum()
}

fn would_exceed(
    items: &HashMap<String, String>,
    quota: Option<u64>,
    key: &str,
    value: &str,
) -> bool {
    let Some(quota) = quota else {
        return false;
    };
    let replaced = items.get(key).map(|v| (key.len() + v.len()) as u64);
    let projected =
        map_bytes(items) - replaced.unwrap_or(0) + (key.len() + value.len()) as u64;
    projected > quota
}

/// In-memory backend for tests and ephemeral sessions.
///
/// An optional byte quota makes quota-exceeded paths reproducible.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    items: HashMap<String, String>,
    quota: Option<u64>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that rejects writes once keys+values exceed `quota` bytes.
    pub fn with_quota(quota: u64) -> Self {
        Self {
            items: HashMap::new(),
            quota: Some(quota),
        }
    }
}

impl StorageBackend for MemoryBackend {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.get(key).cloned()
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        if would_exceed(&self.items, self.quota, key, value) {
            return Err(StorageError::QuotaExceeded);
        }
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&mut self, key: &str) {
        self.items.remove(key);
    }

    fn keys(&self) -> Vec<String> {
        self.items.keys().cloned().collect()
    }

    fn used_bytes(&self) -> u64 {
        map_bytes(&self.items)
    }
}

/// File-backed backend: one JSON object holding every key, rewritten on
/// mutation. The file doubles as the persisted cache layout, so entries
/// survive process restarts.
pub struct FileBackend {
    path: PathBuf,
    items: HashMap<String, String>,
    quota: Option<u64>,
}

impl FileBackend {
    /// Open (or create) the store at `path`.
    ///
    /// A corrupt or unreadable file degrades to an empty store rather than
    /// erroring; the cache treats it as nothing cached.
    pub fn open(path: impl AsRef<Path>, quota: Option<u64>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let items = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(items) => items,
                Err(err) => {
                    tracing::debug!("discarding corrupt store {:?}: {}", path, err);
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        Ok(Self { path, items, quota })
    }

    fn persist(&self) -> Result<(), StorageError> {
        let contents = serde_json::to_string(&self.items)?;
        fs::write(&self.path, contents)?;
        Ok(())
    }
}

impl StorageBackend for FileBackend {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.get(key).cloned()
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        if would_exceed(&self.items, self.quota, key, value) {
            return Err(StorageError::QuotaExceeded);
        }

        let previous = self.items.insert(key.to_string(), value.to_string());
        if let Err(err) = self.persist() {
            // Keep the in-memory mirror consistent with what is on disk.
            match previous {
                Some(old) => {
                    self.items.insert(key.to_string(), old);
                }
                None => {
                    self.items.remove(key);
                }
            }
            return Err(err);
        }
        Ok(())
    }

    fn remove_item(&mut self, key: &str) {
        if self.items.remove(key).is_some() {
            if let Err(err) = self.persist() {
                tracing::debug!("failed to persist removal of {}: {}", key, err);
            }
        }
    }

    fn keys(&self) -> Vec<String> {
        self.items.keys().cloned().collect()
    }

    fn used_bytes(&self) -> u64 {
        map_bytes(&self.items)
    }
}
