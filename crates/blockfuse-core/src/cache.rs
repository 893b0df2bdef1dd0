//! Generic in-memory TTL cache.
//!
//! One cache type serves every client: beacon responses, relay bodies, the
//! relay negative cache, and the serialized snapshot envelope. Entries carry
//! their own expiry; success and error entries can age out at different
//! rates so a transient upstream failure is retried sooner than a good
//! response is refreshed.

use dashmap::DashMap;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Thread-safe key→value store with separate TTLs for ok and error entries.
///
/// Readers either see a still-valid entry or a miss; expired entries are
/// removed eagerly on the read path. Concurrent writers race with
/// last-writer-wins semantics.
pub struct TtlCache<V> {
    entries: DashMap<String, Entry<V>>,
    ok_ttl: Duration,
    err_ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    /// Creates a cache. A zero `err_ttl` means error entries use `ok_ttl`.
    #[must_use]
    pub fn new(ok_ttl: Duration, err_ttl: Duration) -> Self {
        let err_ttl = if err_ttl.is_zero() { ok_ttl } else { err_ttl };
        Self {
            entries: DashMap::new(),
            ok_ttl,
            err_ttl,
        }
    }

    /// Returns the cached value for `key` if present and not expired.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if now < entry.expires_at => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, entry| now >= entry.expires_at);
        }
        None
    }

    /// Stores a value, unconditionally overwriting any previous entry.
    /// Error entries expire after the error TTL.
    pub fn set(&self, key: impl Into<String>, value: V, is_error: bool) {
        let ttl = if is_error { self.err_ttl } else { self.ok_ttl };
        self.entries.insert(
            key.into(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Returns true if `key` exists and has not expired.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}
