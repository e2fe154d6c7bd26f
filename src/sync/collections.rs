//! Collection sync stage
//!
//! Runs after the library stage reports at least partial success. For every
//! reachable server: list collections per movie/show section, refresh their
//! last-seen stamps, rebuild membership rows, and finally purge collections
//! that have not been observed within the retention window. The window keeps
//! a single failed or skipped pass from wiping every collection.

use tracing::{debug, warn};

use crate::api::ServerClient;
use crate::models::{CollectionRecord, MediaKind, Server};
use crate::sync::engine::SyncEngine;
use crate::sync::now_epoch;

impl SyncEngine {
    /// Run the collection stage for the servers that synced, returning
    /// (collections seen, collections purged). Per-server and per-collection
    /// failures are logged and skipped, mirroring the library stage.
    pub(crate) async fn sync_collections(
        &self,
        reachable: &[(Server, String)],
    ) -> (usize, usize) {
        let now = now_epoch();
        let mut seen = 0;

        for (server, base_url) in reachable {
            if self.cancel.is_cancelled() {
                return (seen, 0);
            }
            match self.sync_server_collections(server, base_url, now).await {
                Ok(count) => seen += count,
                Err(e) => {
                    warn!(server = %server.name, "collection sync failed: {:#}", e);
                }
            }
        }

        let purged = self
            .store
            .purge_stale_collections(now, self.retention_secs);

        (seen, purged)
    }

    async fn sync_server_collections(
        &self,
        server: &Server,
        base_url: &str,
        now: u64,
    ) -> anyhow::Result<usize> {
        let client = ServerClient::new(base_url, &server.access_token);
        let sections = client.sections().await?;

        let mut seen = 0;

        for section in sections
            .iter()
            .filter(|s| matches!(s.kind, Some(MediaKind::Movie) | Some(MediaKind::Show)))
        {
            let entries = match client.collections(&section.key).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(
                        server = %server.name,
                        section = %section.title,
                        "collection listing failed: {:#}", e
                    );
                    continue;
                }
            };

            for entry in entries {
                if self.cancel.is_cancelled() {
                    return Ok(seen);
                }

                // Membership fetch failing skips only this collection; its
                // record still gets stamped so retention will not purge it
                // over a transient member-list error
                self.store.upsert_collection(CollectionRecord {
                    server_id: server.machine_id.clone(),
                    rating_key: entry.rating_key.clone(),
                    title: entry.title.clone(),
                    last_seen: now,
                });
                seen += 1;

                match client.collection_children(&entry.rating_key).await {
                    Ok(members) => {
                        self.store
                            .set_members(&server.machine_id, &entry.rating_key, &members);
                    }
                    Err(e) => {
                        warn!(
                            server = %server.name,
                            collection = %entry.title,
                            "membership fetch failed: {:#}", e
                        );
                    }
                }
            }

            debug!(
                server = %server.name,
                section = %section.title,
                "collections synced"
            );
        }

        Ok(seen)
    }
}
