//! Shared endpoint registry.
//!
//! Independent processes on one host discover a running browser through a
//! process-identity-keyed pointer to its control endpoint. The store is an
//! external collaborator consumed behind [`EndpointRegistry`]; this module
//! ships a file-backed implementation for single-host sharing and an
//! in-memory one for tests and embedders that don't want cross-process
//! reuse. A broken store is never fatal: callers degrade to always-launch.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{RenderError, Result};

#[async_trait]
pub trait EndpointRegistry: Send + Sync {
    /// Record `endpoint` under `key`, replacing any previous value.
    async fn publish(&self, key: &str, endpoint: &str, ttl: Duration) -> Result<()>;

    /// Current endpoint for `key`, if present and not expired.
    async fn lookup(&self, key: &str) -> Result<Option<String>>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn invalidate(&self, key: &str) -> Result<()>;
}

/// Stable identity for "the browser this process family shares on this
/// host": host identifier plus engine type. Falls back through hostname to a
/// fixed marker so the pool still works on exotic systems.
pub fn process_identity_key(engine: &str) -> String {
    let host = host_identifier();
    format!("rasterpool:{}:{}", engine, host)
}

fn host_identifier() -> String {
    for path in ["/etc/machine-id", "/var/lib/dbus/machine-id"] {
        if let Ok(raw) = fs::read_to_string(path) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }
    if let Ok(raw) = fs::read_to_string("/proc/sys/kernel/hostname") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    "unknown-host".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct Entry {
    endpoint: String,
    expires_at: u64,
}

/// JSON-file registry under a state directory. Writes go through a temp file
/// rename so readers never observe a torn file.
pub struct FileRegistry {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn read_entries(&self) -> Result<HashMap<String, Entry>> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(HashMap::new()),
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| RenderError::Registry(format!("corrupt registry file: {}", e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(RenderError::Registry(format!(
                "cannot read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn write_entries(&self, entries: &HashMap<String, Entry>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                RenderError::Registry(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        let tmp = self.path.with_extension("tmp");
        let raw = serde_json::to_string_pretty(entries)?;
        fs::write(&tmp, raw)
            .and_then(|_| fs::rename(&tmp, &self.path))
            .map_err(|e| {
                RenderError::Registry(format!("cannot write {}: {}", self.path.display(), e))
            })
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[async_trait]
impl EndpointRegistry for FileRegistry {
    async fn publish(&self, key: &str, endpoint: &str, ttl: Duration) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_entries().unwrap_or_default();
        let now = now_unix();
        entries.retain(|_, e| e.expires_at > now);
        entries.insert(
            key.to_string(),
            Entry {
                endpoint: endpoint.to_string(),
                expires_at: now.saturating_add(ttl.as_secs()),
            },
        );
        self.write_entries(&entries)
    }

    async fn lookup(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().await;
        let entries = self.read_entries()?;
        Ok(entries
            .get(key)
            .filter(|e| e.expires_at > now_unix())
            .map(|e| e.endpoint.clone()))
    }

    async fn invalidate(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_entries().unwrap_or_default();
        if entries.remove(key).is_some() {
            self.write_entries(&entries)?;
        }
        Ok(())
    }
}

/// Process-local registry. No cross-process reuse, no I/O.
#[derive(Default)]
pub struct MemoryRegistry {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EndpointRegistry for MemoryRegistry {
    async fn publish(&self, key: &str, endpoint: &str, ttl: Duration) -> Result<()> {
        self.entries.lock().await.insert(
            key.to_string(),
            Entry {
                endpoint: endpoint.to_string(),
                expires_at: now_unix().saturating_add(ttl.as_secs()),
            },
        );
        Ok(())
    }

    async fn lookup(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .entries
            .lock()
            .await
            .get(key)
            .filter(|e| e.expires_at > now_unix())
            .map(|e| e.endpoint.clone()))
    }

    async fn invalidate(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

/// Build the configured registry: file-backed when a path is set, otherwise
/// in-memory.
pub fn registry_from_config(path: Option<&Path>) -> Box<dyn EndpointRegistry> {
    match path {
        Some(p) => Box::new(FileRegistry::new(p)),
        None => Box::new(MemoryRegistry::new()),
    }
}
