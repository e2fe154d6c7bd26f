//! Local media store
//!
//! Holds everything a sync pass persists: media records keyed by
//! (serverId, ratingKey) with their derived unification key cached alongside,
//! collection records with last-seen stamps, collection membership rows, and
//! the sync completion flags. Backed by in-memory maps behind a lock, with a
//! JSON snapshot on disk under the data dir; `in_memory()` skips the disk
//! entirely for tests and one-shot commands.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::{debug, warn};

use crate::config::Config;
use crate::models::{CollectionMember, CollectionRecord, MediaRecord};
use crate::unify::unification_key;

const STORE_FILE: &str = "catalog.json";

/// Composite-key separator; never appears in machine ids or rating keys
const SEP: char = '\t';

/// Sync completion flags, persisted with the catalog
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SyncFlags {
    /// Set once the first sync pass completes, even a fully-failed one, so
    /// app bootstrap never deadlocks on a transient outage
    pub first_sync_complete: bool,
    /// Epoch seconds of the last completed pass
    pub last_sync_at: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    record: MediaRecord,
    /// Cached so reads never recompute identity
    unification_key: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    media: BTreeMap<String, StoredRecord>,
    collections: BTreeMap<String, CollectionRecord>,
    members: BTreeSet<CollectionMember>,
    flags: SyncFlags,
}

/// Upsertable local store for the synced catalog
pub struct MediaStore {
    data: RwLock<StoreData>,
    persist_path: Option<PathBuf>,
}

fn media_key(server_id: &str, rating_key: &str) -> String {
    format!("{}{}{}", server_id, SEP, rating_key)
}

impl MediaStore {
    /// Store persisted under the platform data dir
    pub fn open_default() -> Self {
        Self::open(Config::data_dir().map(|d| d.join(STORE_FILE)))
    }

    /// Store with an explicit snapshot file, loading it if present
    pub fn open(persist_path: Option<PathBuf>) -> Self {
        let data = persist_path
            .as_ref()
            .and_then(|p| std::fs::read_to_string(p).ok())
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();

        Self {
            data: RwLock::new(data),
            persist_path,
        }
    }

    /// Store that never touches disk
    pub fn in_memory() -> Self {
        Self::open(None)
    }

    // -------------------------------------------------------------------------
    // Media records
    // -------------------------------------------------------------------------

    /// Insert or replace one record by (serverId, ratingKey). Running the
    /// same sync twice leaves exactly one record per key.
    pub fn upsert_record(&self, record: MediaRecord) {
        let key = media_key(&record.server_id, &record.rating_key);
        let stored = StoredRecord {
            unification_key: unification_key(&record),
            record,
        };
        if let Ok(mut data) = self.data.write() {
            data.media.insert(key, stored);
        }
    }

    /// Upsert a batch, returning how many records were written
    pub fn upsert_records(&self, records: Vec<MediaRecord>) -> usize {
        let count = records.len();
        for record in records {
            self.upsert_record(record);
        }
        count
    }

    pub fn record(&self, server_id: &str, rating_key: &str) -> Option<MediaRecord> {
        let data = self.data.read().ok()?;
        data.media
            .get(&media_key(server_id, rating_key))
            .map(|s| s.record.clone())
    }

    /// The cached unification key column
    pub fn cached_unification_key(&self, server_id: &str, rating_key: &str) -> Option<String> {
        let data = self.data.read().ok()?;
        data.media
            .get(&media_key(server_id, rating_key))
            .map(|s| s.unification_key.clone())
    }

    /// All records, in stable (serverId, ratingKey) order
    pub fn records(&self) -> Vec<MediaRecord> {
        self.data
            .read()
            .map(|d| d.media.values().map(|s| s.record.clone()).collect())
            .unwrap_or_default()
    }

    pub fn record_count(&self) -> usize {
        self.data.read().map(|d| d.media.len()).unwrap_or(0)
    }

    // -------------------------------------------------------------------------
    // Collections
    // -------------------------------------------------------------------------

    /// Insert or refresh a collection, stamping it as seen now
    pub fn upsert_collection(&self, collection: CollectionRecord) {
        let key = media_key(&collection.server_id, &collection.rating_key);
        if let Ok(mut data) = self.data.write() {
            data.collections.insert(key, collection);
        }
    }

    pub fn collections(&self) -> Vec<CollectionRecord> {
        self.data
            .read()
            .map(|d| d.collections.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Replace a collection's membership rows for one server in one step,
    /// so reruns never accumulate stale associations
    pub fn set_members(&self, server_id: &str, collection_key: &str, media_keys: &[String]) {
        if let Ok(mut data) = self.data.write() {
            data.members.retain(|m| {
                !(m.server_id == server_id && m.collection_key == collection_key)
            });
            for media_key in media_keys {
                data.members.insert(CollectionMember {
                    collection_key: collection_key.to_string(),
                    server_id: server_id.to_string(),
                    media_key: media_key.clone(),
                });
            }
        }
    }

    pub fn members(&self, server_id: &str, collection_key: &str) -> Vec<String> {
        self.data
            .read()
            .map(|d| {
                d.members
                    .iter()
                    .filter(|m| m.server_id == server_id && m.collection_key == collection_key)
                    .map(|m| m.media_key.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Delete collections whose last-seen stamp is older than the retention
    /// window, along with their membership rows. Returns the purge count.
    ///
    /// The window protects against a single failed pass wiping every
    /// collection: one skipped observation keeps a collection alive.
    pub fn purge_stale_collections(&self, now: u64, retention_secs: u64) -> usize {
        let cutoff = now.saturating_sub(retention_secs);
        let Ok(mut data) = self.data.write() else {
            return 0;
        };

        let stale: Vec<(String, CollectionRecord)> = data
            .collections
            .iter()
            .filter(|(_, c)| c.last_seen < cutoff)
            .map(|(k, c)| (k.clone(), c.clone()))
            .collect();

        for (key, collection) in &stale {
            data.collections.remove(key);
            data.members.retain(|m| {
                !(m.server_id == collection.server_id
                    && m.collection_key == collection.rating_key)
            });
        }

        if !stale.is_empty() {
            debug!(purged = stale.len(), "stale collections purged");
        }
        stale.len()
    }

    // -------------------------------------------------------------------------
    // Sync flags
    // -------------------------------------------------------------------------

    pub fn flags(&self) -> SyncFlags {
        self.data.read().map(|d| d.flags).unwrap_or_default()
    }

    /// Record that a sync pass finished, full or partial
    pub fn mark_sync_complete(&self, now: u64) {
        if let Ok(mut data) = self.data.write() {
            data.flags.first_sync_complete = true;
            data.flags.last_sync_at = Some(now);
        }
    }

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------

    /// Write the snapshot to disk; a no-op for in-memory stores
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = {
            let data = self
                .data
                .read()
                .map_err(|_| anyhow::anyhow!("store lock poisoned"))?;
            serde_json::to_string(&*data)?
        };
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Best-effort save for paths where persistence failure must not
    /// propagate
    pub fn save_quietly(&self) {
        if let Err(e) = self.save() {
            warn!("failed to persist media store: {}", e);
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
