//! Connection resolver
//!
//! Finds a working base URL for a server by racing its candidate paths.
//! Direct (non-relay) candidates race first under a short timeout tier;
//! relay candidates get a long tier of their own so a slow relay-only server
//! is never starved by a timeout meant for LAN traffic. The first successful
//! probe wins its race and every sibling probe is cancelled.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::connect::cache::ConnectionCache;
use crate::connect::probe::Prober;
use crate::models::{ConnectionCandidate, Server};

/// Timeout tiers for the candidate races
#[derive(Debug, Clone, Copy)]
pub struct ResolverTiers {
    /// Applied to direct (LAN/WAN) candidates
    pub direct: Duration,
    /// Applied to relay candidates and the last-resort retry
    pub relay: Duration,
}

impl Default for ResolverTiers {
    fn default() -> Self {
        Self {
            direct: Duration::from_secs(10),
            relay: Duration::from_secs(30),
        }
    }
}

/// Resolves servers to working base URLs, reading and writing the
/// connection cache
pub struct ConnectionResolver {
    prober: Arc<dyn Prober>,
    cache: Arc<ConnectionCache>,
    tiers: ResolverTiers,
}

impl ConnectionResolver {
    pub fn new(prober: Arc<dyn Prober>, cache: Arc<ConnectionCache>) -> Self {
        Self::with_tiers(prober, cache, ResolverTiers::default())
    }

    /// Construct with explicit tiers (tests compress these)
    pub fn with_tiers(
        prober: Arc<dyn Prober>,
        cache: Arc<ConnectionCache>,
        tiers: ResolverTiers,
    ) -> Self {
        Self {
            prober,
            cache,
            tiers,
        }
    }

    pub fn cache(&self) -> &Arc<ConnectionCache> {
        &self.cache
    }

    /// Resolve a working base URL for `server`, or None if every tier is
    /// exhausted.
    ///
    /// The cache is authoritative: a hit short-circuits all probing. Staleness
    /// is not detected here; a consumer that sees the cached URL fail in use
    /// invalidates it and resolves again.
    pub async fn resolve(&self, server: &Server) -> Option<String> {
        if self.cache.is_offline() {
            debug!(server = %server.name, "offline, skipping resolution");
            return None;
        }

        if let Some(cached) = self.cache.get(&server.machine_id) {
            debug!(server = %server.name, url = %cached, "cache hit");
            return Some(cached);
        }

        // Dedup by raw URI string; the account API routinely lists the same
        // address twice (e.g. plain IP and wrapped hostname)
        let mut seen = HashSet::new();
        let candidates: Vec<ConnectionCandidate> = server
            .candidates
            .iter()
            .filter(|c| seen.insert(c.uri.clone()))
            .cloned()
            .collect();

        if candidates.is_empty() {
            debug!(server = %server.name, "no connection candidates");
            return None;
        }

        let (direct, relay): (Vec<_>, Vec<_>) =
            candidates.iter().cloned().partition(|c| !c.relay);

        let mut winner = None;

        if !direct.is_empty() {
            winner = self.race(server, &direct, self.tiers.direct).await;
        }

        if winner.is_none() && !relay.is_empty() {
            debug!(server = %server.name, "direct tier exhausted, racing relay tier");
            winner = self.race(server, &relay, self.tiers.relay).await;
        }

        // A relay-capable server whose candidate list carries no explicit
        // relay entry gets one more shot at everything under the long tier
        if winner.is_none() && relay.is_empty() && server.relay_capable {
            debug!(server = %server.name, "last resort: retrying all candidates at relay tier");
            winner = self.race(server, &candidates, self.tiers.relay).await;
        }

        match winner {
            Some(url) => {
                info!(server = %server.name, %url, "connection resolved");
                self.cache.put(server.machine_id.clone(), url.clone());
                self.cache.persist_in_background();
                Some(url)
            }
            None => {
                info!(server = %server.name, "unreachable: all tiers exhausted");
                None
            }
        }
    }

    /// Race one set of candidates: one probe task per candidate, first
    /// success wins, remaining tasks are aborted. Yields None when every
    /// probe fails or times out.
    async fn race(
        &self,
        server: &Server,
        candidates: &[ConnectionCandidate],
        timeout: Duration,
    ) -> Option<String> {
        let mut tasks = JoinSet::new();

        for candidate in candidates {
            let prober = Arc::clone(&self.prober);
            let url = candidate.uri.clone();
            let token = server.access_token.clone();
            tasks.spawn(async move { prober.probe(&url, &token, timeout).await });
        }

        while let Some(joined) = tasks.join_next().await {
            // Aborted siblings surface as join errors; a probe completing
            // anyway after the race is decided is equally uninteresting
            let Ok(result) = joined else { continue };

            if result.success {
                debug!(server = %server.name, "{}", result);
                tasks.abort_all();
                return Some(result.url);
            }
            debug!(server = %server.name, "{}", result);
        }

        None
    }
}
