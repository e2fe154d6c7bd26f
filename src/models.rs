//! Data structures and types for medley
//!
//! Contains all shared models used across the application organized by domain:
//! - **Servers**: account-level server descriptions and their network paths
//! - **Connectivity**: probe outcomes consumed by the connection resolver
//! - **Catalog**: per-server media records and collection records
//! - **Sync**: progress tuples and the terminal report of one sync pass

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

// =============================================================================
// Server Models
// =============================================================================

/// One network path by which a server might be reached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionCandidate {
    /// "http" or "https"
    pub protocol: String,
    /// IP address or hostname
    pub host: String,
    pub port: u16,
    /// Composed URI; falls back to protocol://host:port when the server
    /// did not send one
    pub uri: String,
    /// LAN address as reported by the account API
    pub local: bool,
    /// Proxied through the account provider's relay service
    pub relay: bool,
}

impl ConnectionCandidate {
    /// Build a candidate, composing the URI when the descriptor omitted it
    pub fn new(
        protocol: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        uri: Option<String>,
        local: bool,
        relay: bool,
    ) -> Self {
        let protocol = protocol.into();
        let host = host.into();
        let uri = uri.unwrap_or_else(|| format!("{}://{}:{}", protocol, host, port));
        Self {
            protocol,
            host,
            port,
            uri,
            local,
            relay,
        }
    }
}

impl fmt::Display for ConnectionCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags = Vec::new();
        if self.local {
            tags.push("local");
        }
        if self.relay {
            tags.push("relay");
        }
        if tags.is_empty() {
            write!(f, "{}", self.uri)
        } else {
            write!(f, "{} [{}]", self.uri, tags.join(","))
        }
    }
}

/// One media server known to the account
///
/// Created when the account's resource list is fetched; immutable for the
/// duration of a sync pass and replaced wholesale on the next refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    /// Globally unique machine identifier
    pub machine_id: String,
    pub name: String,
    /// Per-server access token
    pub access_token: String,
    /// Owned by the signed-in account (vs shared with it)
    pub owned: bool,
    /// Server advertises relay capability, even if no candidate carries
    /// the relay flag yet
    pub relay_capable: bool,
    pub candidates: Vec<ConnectionCandidate>,
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) - {} paths",
            self.name,
            self.machine_id,
            self.candidates.len()
        )
    }
}

// =============================================================================
// Connectivity Models
// =============================================================================

/// Outcome of one reachability probe
///
/// Ephemeral: only the winning URL of a race is ever cached or persisted.
#[derive(Debug, Clone)]
pub struct ConnectionResult {
    pub url: String,
    pub success: bool,
    /// End-to-end latency; `Duration::MAX` on failure so a failed probe can
    /// never win a fastest-success comparison
    pub latency: Duration,
    /// Coarse classification for logs; never used for control flow
    pub error: Option<String>,
}

impl ConnectionResult {
    pub fn ok(url: impl Into<String>, latency: Duration) -> Self {
        Self {
            url: url.into(),
            success: true,
            latency,
            error: None,
        }
    }

    pub fn failed(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            success: false,
            latency: Duration::MAX,
            error: Some(error.into()),
        }
    }
}

impl fmt::Display for ConnectionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.success {
            write!(f, "{} ok in {}ms", self.url, self.latency.as_millis())
        } else {
            write!(
                f,
                "{} failed: {}",
                self.url,
                self.error.as_deref().unwrap_or("unknown")
            )
        }
    }
}

// =============================================================================
// Catalog Models
// =============================================================================

/// Kind discriminator for catalog items
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Show,
    Season,
    Episode,
    Collection,
}

impl MediaKind {
    /// Parse a library section or item type string ("movie", "show", ...)
    pub fn from_type_str(s: &str) -> Option<Self> {
        match s {
            "movie" => Some(MediaKind::Movie),
            "show" => Some(MediaKind::Show),
            "season" => Some(MediaKind::Season),
            "episode" => Some(MediaKind::Episode),
            "collection" => Some(MediaKind::Collection),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Show => "show",
            MediaKind::Season => "season",
            MediaKind::Episode => "episode",
            MediaKind::Collection => "collection",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// External identifiers attached to a catalog item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIds {
    pub imdb: Option<String>,
    pub tmdb: Option<String>,
}

impl ExternalIds {
    pub fn is_empty(&self) -> bool {
        self.imdb.is_none() && self.tmdb.is_none()
    }

    /// Extract external IDs with the documented fallback order:
    /// structured guid entries first, then the legacy single agent guid,
    /// else none.
    ///
    /// Structured guids look like `imdb://tt1877830` or `tmdb://414906`.
    /// Legacy agent guids look like
    /// `com.plexapp.agents.imdb://tt1877830?lang=en`.
    pub fn from_guids(structured: &[String], legacy: Option<&str>) -> Self {
        let mut ids = ExternalIds::default();

        for guid in structured {
            if let Some(id) = guid.strip_prefix("imdb://") {
                if ids.imdb.is_none() && !id.is_empty() {
                    ids.imdb = Some(id.to_string());
                }
            } else if let Some(id) = guid.strip_prefix("tmdb://") {
                if ids.tmdb.is_none() && !id.is_empty() {
                    ids.tmdb = Some(id.to_string());
                }
            }
        }

        if ids.is_empty() {
            if let Some(legacy) = legacy {
                // com.plexapp.agents.imdb://tt123?lang=en
                // com.plexapp.agents.themoviedb://42?lang=en
                if let Ok(re) = regex::Regex::new(r"agents\.(imdb|themoviedb)://([^?]+)") {
                    if let Some(caps) = re.captures(legacy) {
                        let id = caps[2].to_string();
                        match &caps[1] {
                            "imdb" => ids.imdb = Some(id),
                            "themoviedb" => ids.tmdb = Some(id),
                            _ => {}
                        }
                    }
                }
            }
        }

        ids
    }
}

/// Raw metadata for one catalog item as fetched from one server
///
/// Persisted keyed by `(server_id, rating_key)`; the derived unification key
/// is computed once at upsert time and cached alongside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub server_id: String,
    /// Server-local key ("rating key")
    pub rating_key: String,
    pub title: String,
    pub kind: MediaKind,
    pub ids: ExternalIds,
    pub year: Option<u16>,
    /// Library section this item was fetched from
    pub section_key: String,
}

impl fmt::Display for MediaRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let year = self.year.map(|y| format!(" ({})", y)).unwrap_or_default();
        write!(
            f,
            "{}{} [{}] @{}",
            self.title, year, self.kind, self.server_id
        )
    }
}

/// One collection as fetched from one server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionRecord {
    pub server_id: String,
    pub rating_key: String,
    pub title: String,
    /// Epoch seconds of the last sync pass that observed this collection
    pub last_seen: u64,
}

/// Membership of one media record in one collection
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectionMember {
    pub collection_key: String,
    pub server_id: String,
    pub media_key: String,
}

// =============================================================================
// Sync Models
// =============================================================================

/// Transient per-run liveness counters, throttled by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncProgress {
    pub current: usize,
    pub total: usize,
    /// Library section (or stage) currently being processed
    pub label: String,
}

impl fmt::Display for SyncProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {}", self.current, self.total, self.label)
    }
}

/// Terminal state of one sync pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOutcome {
    /// Every server synced
    Succeeded,
    /// At least one server synced, at least one failed
    Partial,
    /// Every server failed (the run still completes; see SyncReport)
    Failed,
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOutcome::Succeeded => write!(f, "succeeded"),
            SyncOutcome::Partial => write!(f, "partial"),
            SyncOutcome::Failed => write!(f, "failed"),
        }
    }
}

/// One server's failure inside an otherwise-continuing run
#[derive(Debug, Clone, Serialize)]
pub struct ServerFailure {
    pub server_id: String,
    pub server_name: String,
    pub reason: String,
}

/// Report returned by one full sync pass
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub outcome: SyncOutcome,
    pub servers_total: usize,
    pub servers_failed: usize,
    pub records_upserted: usize,
    pub collections_seen: usize,
    pub collections_purged: usize,
    pub failures: Vec<ServerFailure>,
    /// Epoch seconds
    pub finished_at: u64,
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sync {}: {}/{} servers ok, {} records",
            self.outcome,
            self.servers_total - self.servers_failed,
            self.servers_total,
            self.records_upserted
        )
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // ConnectionCandidate Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_candidate_composes_uri_when_missing() {
        let c = ConnectionCandidate::new("https", "10.0.0.5", 32400, None, true, false);
        assert_eq!(c.uri, "https://10.0.0.5:32400");
    }

    #[test]
    fn test_candidate_keeps_provided_uri() {
        let c = ConnectionCandidate::new(
            "https",
            "10.0.0.5",
            32400,
            Some("https://10-0-0-5.example.direct:32400".to_string()),
            true,
            false,
        );
        assert_eq!(c.uri, "https://10-0-0-5.example.direct:32400");
    }

    #[test]
    fn test_candidate_display_tags() {
        let c = ConnectionCandidate::new("http", "relay.example.com", 8443, None, false, true);
        assert_eq!(c.to_string(), "http://relay.example.com:8443 [relay]");
    }

    // -------------------------------------------------------------------------
    // ConnectionResult Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_failed_probe_has_infinite_latency() {
        let r = ConnectionResult::failed("http://x", "timeout");
        assert!(!r.success);
        assert_eq!(r.latency, Duration::MAX);

        let ok = ConnectionResult::ok("http://y", Duration::from_millis(12));
        assert!(ok.latency < r.latency);
    }

    // -------------------------------------------------------------------------
    // MediaKind Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_media_kind_round_trip() {
        for s in ["movie", "show", "season", "episode", "collection"] {
            let kind = MediaKind::from_type_str(s).unwrap();
            assert_eq!(kind.as_str(), s);
        }
        assert_eq!(MediaKind::from_type_str("artist"), None);
    }

    #[test]
    fn test_media_kind_serde() {
        let json = serde_json::to_string(&MediaKind::Movie).unwrap();
        assert_eq!(json, "\"movie\"");
        let parsed: MediaKind = serde_json::from_str("\"show\"").unwrap();
        assert_eq!(parsed, MediaKind::Show);
    }

    // -------------------------------------------------------------------------
    // ExternalIds Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_structured_guids_win() {
        let ids = ExternalIds::from_guids(
            &["imdb://tt1877830".to_string(), "tmdb://414906".to_string()],
            Some("com.plexapp.agents.imdb://tt9999999?lang=en"),
        );
        assert_eq!(ids.imdb.as_deref(), Some("tt1877830"));
        assert_eq!(ids.tmdb.as_deref(), Some("414906"));
    }

    #[test]
    fn test_legacy_guid_fallback() {
        let ids =
            ExternalIds::from_guids(&[], Some("com.plexapp.agents.imdb://tt0133093?lang=en"));
        assert_eq!(ids.imdb.as_deref(), Some("tt0133093"));
        assert_eq!(ids.tmdb, None);

        let ids =
            ExternalIds::from_guids(&[], Some("com.plexapp.agents.themoviedb://603?lang=en"));
        assert_eq!(ids.tmdb.as_deref(), Some("603"));
    }

    #[test]
    fn test_no_guids_yields_empty() {
        let ids = ExternalIds::from_guids(&[], None);
        assert!(ids.is_empty());

        // Unrecognized schemes are ignored
        let ids = ExternalIds::from_guids(&["tvdb://81189".to_string()], None);
        assert!(ids.is_empty());
    }

    // -------------------------------------------------------------------------
    // Display Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_sync_progress_display() {
        let p = SyncProgress {
            current: 3,
            total: 120,
            label: "Movies".to_string(),
        };
        assert_eq!(p.to_string(), "3/120 Movies");
    }

    #[test]
    fn test_media_record_display() {
        let r = MediaRecord {
            server_id: "s1".to_string(),
            rating_key: "42".to_string(),
            title: "The Matrix".to_string(),
            kind: MediaKind::Movie,
            ids: ExternalIds::default(),
            year: Some(1999),
            section_key: "1".to_string(),
        };
        assert_eq!(r.to_string(), "The Matrix (1999) [movie] @s1");
    }
}
