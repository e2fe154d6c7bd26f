//! Connection resolver race tests
//!
//! Races scripted probes with known latencies and outcomes to pin down the
//! tiered-racing contract: fastest success wins, failures never win, the
//! cache short-circuits, and relay-only servers survive the direct tier.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use medley::connect::{ConnectionCache, ConnectionResolver, Prober, ResolverTiers};
use medley::models::{ConnectionCandidate, ConnectionResult, Server};

/// Scripted probe outcomes: url -> (latency, succeeds)
struct FakeProber {
    script: HashMap<String, (Duration, bool)>,
    probes: AtomicUsize,
}

impl FakeProber {
    fn new(script: Vec<(&str, Duration, bool)>) -> Self {
        Self {
            script: script
                .into_iter()
                .map(|(url, latency, ok)| (url.to_string(), (latency, ok)))
                .collect(),
            probes: AtomicUsize::new(0),
        }
    }

    fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self, base_url: &str, _token: &str, timeout: Duration) -> ConnectionResult {
        self.probes.fetch_add(1, Ordering::SeqCst);

        let Some((latency, ok)) = self.script.get(base_url).copied() else {
            return ConnectionResult::failed(base_url, "unknown url");
        };

        if latency > timeout {
            tokio::time::sleep(timeout).await;
            return ConnectionResult::failed(base_url, "timeout");
        }

        tokio::time::sleep(latency).await;
        if ok {
            ConnectionResult::ok(base_url, latency)
        } else {
            ConnectionResult::failed(base_url, "connect error")
        }
    }
}

fn candidate(uri: &str, relay: bool) -> ConnectionCandidate {
    ConnectionCandidate::new("http", "ignored", 32400, Some(uri.to_string()), !relay, relay)
}

fn server(id: &str, relay_capable: bool, candidates: Vec<ConnectionCandidate>) -> Server {
    Server {
        machine_id: id.to_string(),
        name: format!("server-{}", id),
        access_token: "tok".to_string(),
        owned: true,
        relay_capable,
        candidates,
    }
}

fn short_tiers() -> ResolverTiers {
    ResolverTiers {
        direct: Duration::from_millis(100),
        relay: Duration::from_millis(500),
    }
}

fn resolver_with(
    prober: Arc<FakeProber>,
) -> (ConnectionResolver, Arc<ConnectionCache>) {
    let cache = Arc::new(ConnectionCache::in_memory());
    let resolver = ConnectionResolver::with_tiers(prober, Arc::clone(&cache), short_tiers());
    (resolver, cache)
}

// =============================================================================
// Race Correctness
// =============================================================================

#[tokio::test]
async fn test_fastest_success_wins() {
    let prober = Arc::new(FakeProber::new(vec![
        ("http://slow", Duration::from_millis(80), true),
        ("http://fast", Duration::from_millis(10), true),
    ]));
    let (resolver, _) = resolver_with(Arc::clone(&prober));

    let server = server(
        "s1",
        false,
        vec![candidate("http://slow", false), candidate("http://fast", false)],
    );

    let url = resolver.resolve(&server).await;
    assert_eq!(url.as_deref(), Some("http://fast"));
}

#[tokio::test]
async fn test_fast_failure_never_wins() {
    // The failing probe finishes first; the slower success must still win
    let prober = Arc::new(FakeProber::new(vec![
        ("http://broken", Duration::from_millis(5), false),
        ("http://working", Duration::from_millis(60), true),
    ]));
    let (resolver, cache) = resolver_with(Arc::clone(&prober));

    let server = server(
        "s1",
        false,
        vec![
            candidate("http://broken", false),
            candidate("http://working", false),
        ],
    );

    let url = resolver.resolve(&server).await;
    assert_eq!(url.as_deref(), Some("http://working"));
    assert_eq!(cache.get("s1").as_deref(), Some("http://working"));
}

#[tokio::test]
async fn test_all_fail_yields_none_and_no_cache_entry() {
    let prober = Arc::new(FakeProber::new(vec![
        ("http://a", Duration::from_millis(5), false),
        ("http://b", Duration::from_millis(10), false),
    ]));
    let (resolver, cache) = resolver_with(Arc::clone(&prober));

    let server = server(
        "s1",
        false,
        vec![candidate("http://a", false), candidate("http://b", false)],
    );

    assert_eq!(resolver.resolve(&server).await, None);
    assert_eq!(cache.get("s1"), None);
}

// =============================================================================
// Cache Behavior
// =============================================================================

#[tokio::test]
async fn test_cache_short_circuits_probing() {
    let prober = Arc::new(FakeProber::new(vec![(
        "http://a",
        Duration::from_millis(5),
        true,
    )]));
    let (resolver, _) = resolver_with(Arc::clone(&prober));

    let server = server("s1", false, vec![candidate("http://a", false)]);

    assert_eq!(resolver.resolve(&server).await.as_deref(), Some("http://a"));
    let after_first = prober.probe_count();
    assert_eq!(after_first, 1);

    // Second resolution must not probe at all
    assert_eq!(resolver.resolve(&server).await.as_deref(), Some("http://a"));
    assert_eq!(prober.probe_count(), after_first);
}

#[tokio::test]
async fn test_invalidate_forces_reprobe() {
    let prober = Arc::new(FakeProber::new(vec![(
        "http://a",
        Duration::from_millis(5),
        true,
    )]));
    let (resolver, cache) = resolver_with(Arc::clone(&prober));
    let server = server("s1", false, vec![candidate("http://a", false)]);

    resolver.resolve(&server).await;
    cache.invalidate("s1");
    resolver.resolve(&server).await;

    assert_eq!(prober.probe_count(), 2);
}

#[tokio::test]
async fn test_offline_skips_probing() {
    let prober = Arc::new(FakeProber::new(vec![(
        "http://a",
        Duration::from_millis(5),
        true,
    )]));
    let (resolver, cache) = resolver_with(Arc::clone(&prober));
    cache.set_offline(true);

    let server = server("s1", false, vec![candidate("http://a", false)]);
    assert_eq!(resolver.resolve(&server).await, None);
    assert_eq!(prober.probe_count(), 0);
}

// =============================================================================
// Tiered Fallback
// =============================================================================

#[tokio::test]
async fn test_relay_tier_outlives_direct_timeout() {
    // Relay latency (200ms) exceeds the direct tier (100ms) but fits the
    // relay tier (500ms); a relay-only server must still resolve
    let prober = Arc::new(FakeProber::new(vec![(
        "http://relay",
        Duration::from_millis(200),
        true,
    )]));
    let (resolver, _) = resolver_with(Arc::clone(&prober));

    let server = server("s1", true, vec![candidate("http://relay", true)]);

    let url = resolver.resolve(&server).await;
    assert_eq!(url.as_deref(), Some("http://relay"));
}

#[tokio::test]
async fn test_relay_tier_raced_after_direct_fails() {
    let prober = Arc::new(FakeProber::new(vec![
        ("http://direct", Duration::from_millis(5), false),
        ("http://relay", Duration::from_millis(20), true),
    ]));
    let (resolver, _) = resolver_with(Arc::clone(&prober));

    let server = server(
        "s1",
        true,
        vec![
            candidate("http://direct", false),
            candidate("http://relay", true),
        ],
    );

    assert_eq!(
        resolver.resolve(&server).await.as_deref(),
        Some("http://relay")
    );
}

#[tokio::test]
async fn test_last_resort_retry_for_relay_capable_server() {
    // 200ms exceeds the direct tier, and the candidate list has no relay
    // entry; a relay-capable server gets a retry at the long tier
    let prober = Arc::new(FakeProber::new(vec![(
        "http://only",
        Duration::from_millis(200),
        true,
    )]));
    let (resolver, _) = resolver_with(Arc::clone(&prober));

    let server = server("s1", true, vec![candidate("http://only", false)]);
    assert_eq!(
        resolver.resolve(&server).await.as_deref(),
        Some("http://only")
    );
    // Once in the direct tier (timed out), once in the retry
    assert_eq!(prober.probe_count(), 2);
}

#[tokio::test]
async fn test_no_last_resort_without_relay_capability() {
    let prober = Arc::new(FakeProber::new(vec![(
        "http://only",
        Duration::from_millis(200),
        true,
    )]));
    let (resolver, _) = resolver_with(Arc::clone(&prober));

    let server = server("s1", false, vec![candidate("http://only", false)]);
    assert_eq!(resolver.resolve(&server).await, None);
    assert_eq!(prober.probe_count(), 1);
}

// =============================================================================
// Candidate Handling
// =============================================================================

#[tokio::test]
async fn test_duplicate_uris_probed_once() {
    let prober = Arc::new(FakeProber::new(vec![(
        "http://a",
        Duration::from_millis(5),
        false,
    )]));
    let (resolver, _) = resolver_with(Arc::clone(&prober));

    let server = server(
        "s1",
        false,
        vec![candidate("http://a", false), candidate("http://a", false)],
    );

    resolver.resolve(&server).await;
    assert_eq!(prober.probe_count(), 1);
}

#[tokio::test]
async fn test_concurrent_resolutions_share_the_cache() {
    let prober = Arc::new(FakeProber::new(vec![
        ("http://one", Duration::from_millis(5), true),
        ("http://two", Duration::from_millis(5), true),
        ("http://three", Duration::from_millis(5), true),
    ]));
    let (resolver, cache) = resolver_with(Arc::clone(&prober));
    let resolver = Arc::new(resolver);

    let servers = vec![
        server("s1", false, vec![candidate("http://one", false)]),
        server("s2", false, vec![candidate("http://two", false)]),
        server("s3", false, vec![candidate("http://three", false)]),
    ];

    let handles: Vec<_> = servers
        .into_iter()
        .map(|s| {
            let resolver = Arc::clone(&resolver);
            tokio::spawn(async move { resolver.resolve(&s).await })
        })
        .collect();

    let results: Vec<_> = futures::future::join_all(handles).await;
    for result in results {
        assert!(result.unwrap().is_some());
    }

    // All three winners landed despite concurrent copy-on-write updates
    assert_eq!(cache.snapshot().len(), 3);
}

#[tokio::test]
async fn test_no_candidates_yields_none() {
    let prober = Arc::new(FakeProber::new(vec![]));
    let (resolver, _) = resolver_with(Arc::clone(&prober));

    let server = server("s1", false, vec![]);
    assert_eq!(resolver.resolve(&server).await, None);
    assert_eq!(prober.probe_count(), 0);
}
