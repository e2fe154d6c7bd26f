//! Sync orchestrator
//!
//! Drives one full synchronization pass: enumerate the account's servers,
//! resolve a connection per server, pull library contents into the local
//! store, then chain the collection stage. One server failing never aborts
//! the run; the run only stops early on cancellation.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::server::{LibrarySection, PAGE_SIZE};
use crate::api::{AccountClient, ServerClient};
use crate::connect::ConnectionResolver;
use crate::models::{
    MediaKind, Server, ServerFailure, SyncOutcome, SyncProgress, SyncReport,
};
use crate::store::MediaStore;
use crate::sync::{now_epoch, CancelHandle, ProgressThrottle};

/// Default collection retention window: 7 days
pub const DEFAULT_RETENTION_SECS: u64 = 7 * 24 * 3600;

/// Orchestrates full sync passes
pub struct SyncEngine {
    pub(crate) account: AccountClient,
    pub(crate) resolver: ConnectionResolver,
    pub(crate) store: Arc<MediaStore>,
    pub(crate) progress: Option<UnboundedSender<SyncProgress>>,
    pub(crate) cancel: CancelHandle,
    pub(crate) retention_secs: u64,
}

impl SyncEngine {
    pub fn new(
        account: AccountClient,
        resolver: ConnectionResolver,
        store: Arc<MediaStore>,
    ) -> Self {
        Self {
            account,
            resolver,
            store,
            progress: None,
            cancel: CancelHandle::new(),
            retention_secs: DEFAULT_RETENTION_SECS,
        }
    }

    /// Attach a progress channel; emissions are throttled to roughly one per
    /// second plus one on every section completion
    pub fn with_progress(mut self, sender: UnboundedSender<SyncProgress>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Override the collection retention window
    pub fn with_retention_secs(mut self, secs: u64) -> Self {
        self.retention_secs = secs;
        self
    }

    /// Handle for cancelling this engine's in-flight pass
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Run one full sync pass
    ///
    /// Servers are processed strictly in account-list order, never
    /// interleaved, so progress and failures attribute cleanly. The run
    /// completes and sets the first-sync flag even when every server fails;
    /// only cancellation (or a failed server-list fetch) errors out.
    pub async fn run_full_sync(&self) -> Result<SyncReport> {
        let run_id = Uuid::new_v4();
        info!(%run_id, "sync pass starting");

        let servers = self.account.resources().await?;

        // A fresh account with no servers yet is a trivially complete sync,
        // not something to block on
        if servers.is_empty() {
            info!(%run_id, "no servers on account, sync trivially complete");
            self.store.mark_sync_complete(now_epoch());
            self.store.save_quietly();
            return Ok(self.report(run_id, SyncOutcome::Succeeded, 0, vec![], 0, 0, 0));
        }

        let mut failures: Vec<ServerFailure> = Vec::new();
        let mut reachable: Vec<(Server, String)> = Vec::new();
        let mut records_upserted = 0;

        for server in &servers {
            if self.cancel.is_cancelled() {
                anyhow::bail!("sync cancelled");
            }

            let Some(base_url) = self.resolver.resolve(server).await else {
                warn!(server = %server.name, "unreachable, skipping for this run");
                failures.push(ServerFailure {
                    server_id: server.machine_id.clone(),
                    server_name: server.name.clone(),
                    reason: "unreachable".to_string(),
                });
                continue;
            };

            match self.sync_server(server, &base_url).await {
                Ok(count) => {
                    records_upserted += count;
                    reachable.push((server.clone(), base_url));
                }
                Err(e) if self.cancel.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!(server = %server.name, "sync failed: {:#}", e);
                    failures.push(ServerFailure {
                        server_id: server.machine_id.clone(),
                        server_name: server.name.clone(),
                        reason: format!("{:#}", e),
                    });
                }
            }
        }

        let outcome = if failures.is_empty() {
            SyncOutcome::Succeeded
        } else if failures.len() == servers.len() {
            // Every server failed; the run still completes so bootstrap
            // never hangs on a transient full outage
            SyncOutcome::Failed
        } else {
            SyncOutcome::Partial
        };

        self.store.mark_sync_complete(now_epoch());

        // Collection stage only runs on at least partial success
        let (collections_seen, collections_purged) = if outcome != SyncOutcome::Failed {
            self.sync_collections(&reachable).await
        } else {
            (0, 0)
        };

        self.store.save_quietly();

        let report = self.report(
            run_id,
            outcome,
            servers.len(),
            failures,
            records_upserted,
            collections_seen,
            collections_purged,
        );
        info!(%run_id, "{}", report);
        Ok(report)
    }

    /// Sync one reachable server's movie and show sections into the store,
    /// returning how many records were upserted. A single section failing is
    /// logged and skipped; only the section listing itself failing fails the
    /// server.
    async fn sync_server(&self, server: &Server, base_url: &str) -> Result<usize> {
        let client = ServerClient::new(base_url, &server.access_token);
        let sections = client.sections().await?;

        let synced: Vec<&LibrarySection> = sections
            .iter()
            .filter(|s| matches!(s.kind, Some(MediaKind::Movie) | Some(MediaKind::Show)))
            .collect();

        debug!(server = %server.name, sections = synced.len(), "syncing sections");

        let mut throttle = ProgressThrottle::new(self.progress.clone());
        let mut upserted = 0;

        for section in synced {
            match self
                .sync_section(&client, server, section, &mut throttle)
                .await
            {
                Ok(count) => upserted += count,
                Err(e) if self.cancel.is_cancelled() => return Err(e),
                Err(e) => {
                    // Partial metadata failure: skip this section, keep its
                    // siblings
                    warn!(
                        server = %server.name,
                        section = %section.title,
                        "section sync failed: {:#}", e
                    );
                }
            }
        }

        Ok(upserted)
    }

    /// Walk one section page by page, mapping and upserting as we go
    async fn sync_section(
        &self,
        client: &ServerClient,
        server: &Server,
        section: &LibrarySection,
        throttle: &mut ProgressThrottle,
    ) -> Result<usize> {
        let mut fetched = 0;
        let mut upserted = 0;
        let mut total;

        loop {
            if self.cancel.is_cancelled() {
                anyhow::bail!("sync cancelled");
            }

            let page = client
                .section_items(&server.machine_id, &section.key, fetched, PAGE_SIZE)
                .await?;
            total = page.total;

            if page.items.is_empty() {
                break;
            }

            fetched += page.items.len();
            upserted += self.store.upsert_records(page.items);
            throttle.emit(fetched, total, &section.title);

            if fetched >= total {
                break;
            }
        }

        throttle.emit_final(fetched, total, &section.title);
        debug!(
            server = %server.name,
            section = %section.title,
            items = fetched,
            "section synced"
        );
        Ok(upserted)
    }

    #[allow(clippy::too_many_arguments)]
    fn report(
        &self,
        run_id: Uuid,
        outcome: SyncOutcome,
        servers_total: usize,
        failures: Vec<ServerFailure>,
        records_upserted: usize,
        collections_seen: usize,
        collections_purged: usize,
    ) -> SyncReport {
        SyncReport {
            run_id,
            outcome,
            servers_total,
            servers_failed: failures.len(),
            records_upserted,
            collections_seen,
            collections_purged,
            failures,
            finished_at: now_epoch(),
        }
    }
}
