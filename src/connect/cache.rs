//! Connection cache
//!
//! Process-wide map of serverId -> working base URL, plus the global offline
//! flag. Entries carry no TTL: a cached URL is trusted until a consumer
//! observes it failing during actual use and calls `invalidate`.
//!
//! The map is replaced copy-on-write so concurrent races never observe a
//! partially-updated map. Persistence is a plain `id=url|id=url` key-value
//! file under the data dir, written best-effort off the resolution path.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use crate::config::Config;

const CACHE_FILE: &str = "connections";

/// serverId -> baseURL cache with offline flag
pub struct ConnectionCache {
    map: RwLock<Arc<HashMap<String, String>>>,
    offline: AtomicBool,
    persist_path: Option<PathBuf>,
}

impl ConnectionCache {
    /// Cache persisted under the platform data dir
    pub fn new() -> Self {
        Self::with_path(Config::data_dir().map(|d| d.join(CACHE_FILE)))
    }

    /// Cache with an explicit persistence file, or none
    pub fn with_path(persist_path: Option<PathBuf>) -> Self {
        Self {
            map: RwLock::new(Arc::new(HashMap::new())),
            offline: AtomicBool::new(false),
            persist_path,
        }
    }

    /// Cache that never touches disk (tests, one-shot commands)
    pub fn in_memory() -> Self {
        Self::with_path(None)
    }

    pub fn get(&self, server_id: &str) -> Option<String> {
        let map = self.map.read().ok()?;
        map.get(server_id).cloned()
    }

    /// Insert or replace an entry. The map is cloned and swapped whole so
    /// readers never see an intermediate state.
    pub fn put(&self, server_id: impl Into<String>, url: impl Into<String>) {
        if let Ok(mut guard) = self.map.write() {
            let mut next: HashMap<String, String> = (**guard).clone();
            next.insert(server_id.into(), url.into());
            *guard = Arc::new(next);
        }
    }

    /// Drop an entry after its URL failed in actual use, forcing the next
    /// resolution to probe again
    pub fn invalidate(&self, server_id: &str) {
        if let Ok(mut guard) = self.map.write() {
            if guard.contains_key(server_id) {
                let mut next: HashMap<String, String> = (**guard).clone();
                next.remove(server_id);
                *guard = Arc::new(next);
                debug!(server_id, "cache entry invalidated");
            }
        }
    }

    /// Current contents, for display and persistence
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.map
            .read()
            .map(|m| (**m).clone())
            .unwrap_or_default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::Relaxed)
    }

    /// Load persisted entries at startup, merging them under any entries
    /// already resolved in memory
    pub fn restore(&self) -> usize {
        let Some(path) = &self.persist_path else {
            return 0;
        };
        let Ok(contents) = std::fs::read_to_string(path) else {
            return 0;
        };

        let persisted = decode(&contents);
        let count = persisted.len();

        if let Ok(mut guard) = self.map.write() {
            let mut next = persisted;
            // In-memory entries are fresher than anything on disk
            for (k, v) in guard.iter() {
                next.insert(k.clone(), v.clone());
            }
            *guard = Arc::new(next);
        }

        debug!(count, "connection cache restored");
        count
    }

    /// Write the current map to disk in the background. Failure to persist
    /// is logged, never propagated: the cache keeps working from memory.
    ///
    /// The snapshot is taken inside the spawned task, not at call time, so
    /// a write scheduled before a `put` cannot land after it and clobber
    /// the newer entry with an older map.
    pub fn persist_in_background(self: &Arc<Self>) {
        let Some(path) = self.persist_path.clone() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let cache = Arc::clone(self);
                handle.spawn(async move {
                    if let Err(e) = write_snapshot(&path, &cache.snapshot()) {
                        warn!("failed to persist connection cache: {}", e);
                    }
                });
            }
            Err(_) => {
                if let Err(e) = write_snapshot(&path, &self.snapshot()) {
                    warn!("failed to persist connection cache: {}", e);
                }
            }
        }
    }
}

impl Default for ConnectionCache {
    fn default() -> Self {
        Self::new()
    }
}

fn write_snapshot(path: &PathBuf, snapshot: &HashMap<String, String>) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, encode(snapshot))
}

/// Encode as `id=url|id=url`, sorted by id so the file is diff-stable
fn encode(map: &HashMap<String, String>) -> String {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("|")
}

fn decode(s: &str) -> HashMap<String, String> {
    s.split('|')
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            if k.is_empty() || v.is_empty() {
                return None;
            }
            Some((k.to_string(), v.to_string()))
        })
        .collect()
}
