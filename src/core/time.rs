//! Clock, id and token helpers.
//!
//! Everything time-dependent in the engine reads an injected [`Clock`] so retention,
//! debounce windows and timestamps can be driven deterministically in tests.

use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use ulid::Ulid;

pub const DAY_MS: u64 = 24 * 60 * 60 * 1000;

pub trait Clock: Send + Sync {
    /// Milliseconds since the unix epoch.
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Hand-driven clock. Clones share the same instant.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn advance(&self, delta_ms: u64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }

    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Returns unix-epoch seconds with `Z` suffix (e.g. `1771220592Z`).
pub fn now_epoch_z() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("{}Z", secs)
}

pub fn new_event_id() -> String {
    Ulid::new().to_string()
}

/// Fresh Space / share-link record id.
pub fn new_id() -> String {
    Ulid::new().to_string().to_lowercase()
}

/// Opaque share token: 32 hex chars of SHA-256 over two independent ULIDs.
pub fn new_share_token() -> String {
    let mut hasher = Sha256::new();
    hasher.update(Ulid::new().to_bytes());
    hasher.update(Ulid::new().to_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..32].to_string()
}
