//! medley - one catalog across all your media servers
//!
//! The headless core of a multi-server media-browsing client: finds a
//! working connection to each of the account's servers (racing LAN, WAN,
//! and relay paths under tiered timeouts), keeps a local catalog in sync in
//! the background, and folds duplicate titles across servers into unified
//! entries.
//!
//! # Modules
//!
//! - `models` - Shared domain types (servers, candidates, records, reports)
//! - `api` - Account and per-server HTTP clients
//! - `connect` - Probing, connection cache, and the tiered resolver
//! - `store` - Local upsertable media store with snapshot persistence
//! - `unify` - Cross-server deduplication engine
//! - `sync` - The orchestrator driving one full sync pass
//! - `config` - Config file and token handling
//! - `cli` / `commands` - Scriptable command-line surface

pub mod api;
pub mod cli;
pub mod commands;
pub mod config;
pub mod connect;
pub mod models;
pub mod store;
pub mod sync;
pub mod unify;

// Re-export commonly used types
pub use api::{AccountClient, ServerClient};
pub use config::Config;
pub use connect::{ConnectionCache, ConnectionResolver, HttpProber, Prober, ResolverTiers};
pub use models::{
    CollectionMember, CollectionRecord, ConnectionCandidate, ConnectionResult, ExternalIds,
    MediaKind, MediaRecord, Server, ServerFailure, SyncOutcome, SyncProgress, SyncReport,
};
pub use store::MediaStore;
pub use sync::{CancelHandle, SyncEngine};
pub use unify::{normalize_title, unification_key, unify, UnifiedItem};
