//! CLI Command Handlers
//!
//! Implements all CLI commands by wiring the config, connection layer, sync
//! engine, and store together. Each handler takes CLI args and Output,
//! returns ExitCode.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::api::AccountClient;
use crate::cli::{
    validate_machine_id, CatalogCmd, ExitCode, KindFilter, Output, ResolveCmd, ServersCmd,
    StatusCmd, SyncCmd,
};
use crate::config::Config;
use crate::connect::{ConnectionCache, ConnectionResolver, HttpProber, ResolverTiers};
use crate::models::MediaKind;
use crate::store::MediaStore;
use crate::sync::SyncEngine;
use crate::unify;

// =============================================================================
// Wiring Helpers
// =============================================================================

fn account_client(config: &Config, output: &Output) -> Result<AccountClient, ExitCode> {
    let Some(token) = config.get_account_token() else {
        return Err(output.error(
            "No account token. Set MEDLEY_TOKEN or account_token in the config file.",
            ExitCode::NoToken,
        ));
    };
    Ok(match &config.account_url {
        Some(url) => AccountClient::with_base_url(token, url),
        None => AccountClient::new(token),
    })
}

fn resolver(config: &Config) -> ConnectionResolver {
    let tiers = ResolverTiers {
        direct: Duration::from_secs(config.direct_timeout_secs.unwrap_or(10)),
        relay: Duration::from_secs(config.relay_timeout_secs.unwrap_or(30)),
    };
    let cache = Arc::new(ConnectionCache::new());
    cache.restore();
    ConnectionResolver::with_tiers(Arc::new(HttpProber::new()), cache, tiers)
}

/// Machine ids of the servers the account owns. Ownership only improves the
/// primary pick, so a missing token or a failed fetch yields an empty set
/// without reporting anything.
async fn owned_servers(config: &Config) -> HashSet<String> {
    let Some(token) = config.get_account_token() else {
        return HashSet::new();
    };
    let client = match &config.account_url {
        Some(url) => AccountClient::with_base_url(token, url),
        None => AccountClient::new(token),
    };
    match client.resources().await {
        Ok(servers) => servers
            .into_iter()
            .filter(|s| s.owned)
            .map(|s| s.machine_id)
            .collect(),
        Err(_) => HashSet::new(),
    }
}

// =============================================================================
// Servers Command
// =============================================================================

pub async fn servers_cmd(_cmd: ServersCmd, output: &Output) -> ExitCode {
    let config = Config::load();
    let client = match account_client(&config, output) {
        Ok(c) => c,
        Err(code) => return code,
    };

    output.info("Fetching server list...");

    match client.resources().await {
        Ok(servers) => {
            if output.is_json() {
                if let Err(e) = output.print_list(&servers) {
                    return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
                }
            } else {
                for server in &servers {
                    println!("{}", server);
                    for candidate in &server.candidates {
                        println!("  {}", candidate);
                    }
                }
            }
            ExitCode::Success
        }
        Err(e) => output.error(format!("Server list failed: {}", e), ExitCode::NetworkError),
    }
}

// =============================================================================
// Resolve Command
// =============================================================================

#[derive(Debug, Serialize)]
struct ResolveView {
    machine_id: String,
    url: String,
    cached: bool,
}

impl fmt::Display for ResolveView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let origin = if self.cached { "cached" } else { "probed" };
        write!(f, "{} -> {} ({})", self.machine_id, self.url, origin)
    }
}

pub async fn resolve_cmd(cmd: ResolveCmd, output: &Output) -> ExitCode {
    if let Err(e) = validate_machine_id(&cmd.machine_id) {
        return output.error(e, ExitCode::InvalidArgs);
    }

    let config = Config::load();
    let client = match account_client(&config, output) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let resolver = resolver(&config);

    if cmd.fresh {
        resolver.cache().invalidate(&cmd.machine_id);
    }
    let cached = resolver.cache().get(&cmd.machine_id).is_some();

    let servers = match client.resources().await {
        Ok(servers) => servers,
        Err(e) => {
            return output.error(format!("Server list failed: {}", e), ExitCode::NetworkError)
        }
    };

    let Some(server) = servers.iter().find(|s| s.machine_id == cmd.machine_id) else {
        return output.error(
            format!("No server with machine id {}", cmd.machine_id),
            ExitCode::ServerUnavailable,
        );
    };

    output.info(format!("Resolving {}...", server.name));

    match resolver.resolve(server).await {
        Some(url) => {
            let view = ResolveView {
                machine_id: cmd.machine_id,
                url,
                cached,
            };
            if let Err(e) = output.print(&view) {
                return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
            }
            ExitCode::Success
        }
        None => output.error(
            format!("{} is unreachable on every path", server.name),
            ExitCode::ServerUnavailable,
        ),
    }
}

// =============================================================================
// Sync Command
// =============================================================================

pub async fn sync_cmd(cmd: SyncCmd, output: &Output) -> ExitCode {
    let config = Config::load();
    let client = match account_client(&config, output) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let resolver = resolver(&config);
    let store = Arc::new(MediaStore::open_default());

    let retention_secs = config
        .collection_retention_days
        .map(|d| d * 24 * 3600)
        .unwrap_or(crate::sync::engine::DEFAULT_RETENTION_SECS);

    let mut engine =
        SyncEngine::new(client, resolver, store).with_retention_secs(retention_secs);

    let mut printer = None;
    if !cmd.quiet && !output.is_json() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        engine = engine.with_progress(tx);
        printer = Some(tokio::spawn(async move {
            while let Some(progress) = rx.recv().await {
                eprintln!("  {}", progress);
            }
        }));
    }

    output.info("Starting sync pass...");
    let result = engine.run_full_sync().await;

    // Drop the engine (and with it the progress sender) so the printer
    // task sees the channel close
    drop(engine);
    if let Some(printer) = printer {
        let _ = printer.await;
    }

    match result {
        Ok(report) => {
            if let Err(e) = output.print(&report) {
                return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
            }
            match report.outcome {
                crate::models::SyncOutcome::Failed => output.error(
                    "every server failed this pass",
                    ExitCode::NetworkError,
                ),
                _ => ExitCode::Success,
            }
        }
        Err(e) => output.error(format!("Sync failed: {}", e), ExitCode::Error),
    }
}

// =============================================================================
// Catalog Command
// =============================================================================

pub async fn catalog_cmd(cmd: CatalogCmd, output: &Output) -> ExitCode {
    let config = Config::load();
    let store = MediaStore::open_default();
    let records = store.records();

    if records.is_empty() {
        output.info("Local catalog is empty. Run `medley sync` first.");
    }

    // The catalog must work offline and without a token; an absent owned
    // set just means no owned-server preference in the primary pick
    let owned = owned_servers(&config).await;

    let mut items = unify::unify(&records, &owned);

    if let Some(filter) = cmd.kind {
        let kind = match filter {
            KindFilter::Movie => MediaKind::Movie,
            KindFilter::Show => MediaKind::Show,
        };
        items.retain(|i| i.kind == kind);
    }
    if cmd.duplicates {
        items.retain(|i| i.sources.len() > 1);
    }

    if let Err(e) = output.print_list(&items) {
        return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
    }
    ExitCode::Success
}

// =============================================================================
// Status Command
// =============================================================================

#[derive(Debug, Serialize)]
struct StatusView {
    first_sync_complete: bool,
    last_sync_at: Option<u64>,
    records: usize,
    collections: usize,
    cached_connections: HashMap<String, String>,
}

impl fmt::Display for StatusView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "first sync complete: {}", self.first_sync_complete)?;
        match self.last_sync_at {
            Some(at) => writeln!(f, "last sync: {} (epoch)", at)?,
            None => writeln!(f, "last sync: never")?,
        }
        writeln!(f, "records: {}", self.records)?;
        writeln!(f, "collections: {}", self.collections)?;
        write!(f, "cached connections: {}", self.cached_connections.len())?;
        for (id, url) in &self.cached_connections {
            write!(f, "\n  {} -> {}", id, url)?;
        }
        Ok(())
    }
}

pub async fn status_cmd(_cmd: StatusCmd, output: &Output) -> ExitCode {
    let store = MediaStore::open_default();
    let cache = ConnectionCache::new();
    cache.restore();

    let flags = store.flags();
    let view = StatusView {
        first_sync_complete: flags.first_sync_complete,
        last_sync_at: flags.last_sync_at,
        records: store.record_count(),
        collections: store.collections().len(),
        cached_connections: cache.snapshot(),
    };

    if let Err(e) = output.print(&view) {
        return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
    }
    ExitCode::Success
}

// =============================================================================
// Unit Tests
// =============================================================================
