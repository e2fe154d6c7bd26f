//! Background synchronization
//!
//! - `engine` - one full sync pass: enumerate servers, resolve, fetch, upsert
//! - `collections` - the dependent second stage: collections and memberships
//!
//! The OS-level scheduler that triggers passes periodically is an external
//! collaborator; this module only knows how to run one pass now and report
//! progress while doing it.

pub mod collections;
pub mod engine;

pub use engine::SyncEngine;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc::UnboundedSender;

use crate::models::SyncProgress;

/// Cooperative cancellation for an in-flight sync pass
///
/// Checked at server and page boundaries; partially-written records for the
/// in-progress server are fine to leave behind since the next pass upserts
/// idempotently.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Rate-limits progress emission so a caller can render a progress bar
/// without being flooded; completion emits unconditionally
pub(crate) struct ProgressThrottle {
    sender: Option<UnboundedSender<SyncProgress>>,
    last_emit: Option<Instant>,
    min_interval: Duration,
}

impl ProgressThrottle {
    pub(crate) fn new(sender: Option<UnboundedSender<SyncProgress>>) -> Self {
        Self {
            sender,
            last_emit: None,
            min_interval: Duration::from_secs(1),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_interval(
        sender: Option<UnboundedSender<SyncProgress>>,
        min_interval: Duration,
    ) -> Self {
        Self {
            sender,
            last_emit: None,
            min_interval,
        }
    }

    /// Emit unless one was sent within the last interval
    pub(crate) fn emit(&mut self, current: usize, total: usize, label: &str) {
        let due = match self.last_emit {
            Some(at) => at.elapsed() >= self.min_interval,
            None => true,
        };
        if due {
            self.send(current, total, label);
        }
    }

    /// Always emit, regardless of the throttle (section/stage completion)
    pub(crate) fn emit_final(&mut self, current: usize, total: usize, label: &str) {
        self.send(current, total, label);
    }

    fn send(&mut self, current: usize, total: usize, label: &str) {
        self.last_emit = Some(Instant::now());
        if let Some(sender) = &self.sender {
            // Receiver gone just means nobody is watching anymore
            let _ = sender.send(SyncProgress {
                current,
                total,
                label: label.to_string(),
            });
        }
    }
}

/// Current time as epoch seconds
pub(crate) fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
