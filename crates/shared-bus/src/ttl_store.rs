//! # Bounded TTL Key Store
//!
//! Remembers keys for a fixed time-to-live. Used to suppress repeated
//! deliveries of the same webhook.
//!
//! ## Design
//!
//! - Entries expire `ttl` after first sighting; expired entries are treated
//!   as absent even before a sweep removes them.
//! - Capacity is bounded: when full, expired entries are swept first, then
//!   the entry closest to expiry is evicted.
//! - A background sweeper removes expired entries on a fixed interval.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Result of [`TtlStore::record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recorded {
    /// The key was absent (or expired) and is now live.
    pub inserted: bool,
    /// A live key was dropped to stay within capacity.
    pub evicted_live: bool,
}

/// Time-bounded set of keys.
pub struct TtlStore {
    entries: Mutex<HashMap<String, Instant>>,
    ttl: Duration,
    max_entries: usize,
    evicted: AtomicU64,
}

impl TtlStore {
    /// Default time-to-live: 24 hours.
    pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

    /// Default capacity.
    pub const DEFAULT_MAX_ENTRIES: usize = 100_000;

    /// Create a store with the default capacity.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, Self::DEFAULT_MAX_ENTRIES)
    }

    /// Create a store holding at most `max_entries` keys.
    #[must_use]
    pub fn with_capacity(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
            evicted: AtomicU64::new(0),
        }
    }

    /// Record `key` unless a live entry exists.
    ///
    /// Returns `true` if the key was recorded (first sighting), `false` if
    /// it is a duplicate within the TTL. Check and insert are atomic.
    pub fn insert_if_absent(&self, key: &str) -> bool {
        self.record(key).inserted
    }

    /// Like [`insert_if_absent`](Self::insert_if_absent), also reporting
    /// whether a live key had to be evicted to make room.
    pub fn record(&self, key: &str) -> Recorded {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        if let Some(expires_at) = entries.get(key) {
            if *expires_at > now {
                return Recorded {
                    inserted: false,
                    evicted_live: false,
                };
            }
        }

        let mut evicted_live = false;
        if entries.len() >= self.max_entries && !entries.contains_key(key) {
            entries.retain(|_, expires_at| *expires_at > now);
            if entries.len() >= self.max_entries {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, expires_at)| **expires_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                    self.evicted.fetch_add(1, Ordering::Relaxed);
                    evicted_live = true;
                    warn!(
                        capacity = self.max_entries,
                        "TTL store full, evicted oldest live key"
                    );
                }
            }
        }

        entries.insert(key.to_string(), now + self.ttl);
        Recorded {
            inserted: true,
            evicted_live,
        }
    }

    /// True if a live entry exists for `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .lock()
            .get(key)
            .is_some_and(|expires_at| *expires_at > now)
    }

    /// Forget `key`. Returns whether an entry was present.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    /// Remove expired entries, returning how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, expires_at| *expires_at > now);
        before - entries.len()
    }

    /// Number of stored entries, including expired ones not yet swept.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True if no entries are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Time-to-live applied to new entries.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Live keys evicted because the store was full.
    #[must_use]
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Run [`sweep`](Self::sweep) every `interval` until `shutdown` flips to `true`.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = store.sweep();
                        if removed > 0 {
                            debug!(removed, remaining = store.len(), "Swept expired keys");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("TTL sweeper stopped");
        })
    }
}

impl Default for TtlStore {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL)
    }
}
