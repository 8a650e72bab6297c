//! Durable key-value storage boundary.
//!
//! Token metadata and derived pool addresses are immutable once resolved,
//! so they are persisted across process restarts. The position cache is
//! deliberately NOT backed by this layer; it is rebuilt every lifetime.

use anyhow::{Context, Result};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info};

/// Durable key-value storage collaborator.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn put(&self, key: &str, value: String);
    /// All stored keys, used to pre-seed in-memory caches at startup.
    fn keys(&self) -> Vec<String>;
    /// Persist pending writes. A no-op for non-durable implementations.
    fn flush(&self) -> Result<()>;
}

/// In-memory store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|v| v.clone())
    }

    fn put(&self, key: &str, value: String) {
        self.entries.insert(key.to_string(), value);
    }

    fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// JSON-file-backed store: loaded once at open, written on `flush`.
pub struct JsonFileStore {
    path: PathBuf,
    entries: DashMap<String, String>,
}

impl JsonFileStore {
    /// Open a store at `path`, loading existing entries if present.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = DashMap::new();

        if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading store at {}", path.display()))?;
            let loaded: BTreeMap<String, String> =
                serde_json::from_str(&raw).with_context(|| "parsing store contents")?;
            for (k, v) in loaded {
                entries.insert(k, v);
            }
            info!(path = %path.display(), entries = entries.len(), "loaded durable store");
        } else {
            debug!(path = %path.display(), "starting empty durable store");
        }

        Ok(Self { path, entries })
    }
}

impl KvStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|v| v.clone())
    }

    fn put(&self, key: &str, value: String) {
        self.entries.insert(key.to_string(), value);
    }

    fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    fn flush(&self) -> Result<()> {
        // BTreeMap for stable on-disk ordering.
        let snapshot: BTreeMap<String, String> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(&self.path, raw)
            .with_context(|| format!("writing store at {}", self.path.display()))?;

        debug!(path = %self.path.display(), entries = snapshot.len(), "flushed durable store");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryStore::new();
        assert!(store.get("a").is_none());

        store.put("a", "1".into());
        assert_eq!(store.get("a").as_deref(), Some("1"));
        assert_eq!(store.keys(), vec!["a".to_string()]);
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("lpscope-store-{}", std::process::id()));
        let path = dir.join("tokens.json");

        {
            let store = JsonFileStore::open(&path).unwrap();
            store.put("token/1/0xabc", r#"{"decimals":6}"#.into());
            store.flush().unwrap();
        }

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(
            reopened.get("token/1/0xabc").as_deref(),
            Some(r#"{"decimals":6}"#)
        );

        std::fs::remove_dir_all(dir).ok();
    }
}
