use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::models::chat::{HistoryEntry, SessionId};

pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Cached rolling history plus the time of the last `put`
#[derive(Debug, Clone)]
struct CacheEntry {
    history: Vec<HistoryEntry>,
    written_at: Instant,
}

impl CacheEntry {
    /// An entry is stale once its age is strictly greater than the TTL;
    /// at exactly `ttl` it is still served.
    fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.written_at) > ttl
    }
}

/// Thread-safe in-memory session history cache.
///
/// DashMap shards the key space, so operations on different sessions do
/// not block each other. Expiration is lazy: `get` evicts a stale entry
/// it finds, `exists` only reports. `sweep_expired` bounds memory and is
/// never needed for correctness.
///
/// Every operation has an `*_at` variant taking `now` explicitly; the
/// plain variants use `Instant::now()`.
#[derive(Clone)]
pub struct SessionCache {
    storage: Arc<DashMap<SessionId, CacheEntry>>,
    ttl: Duration,
}

impl SessionCache {
    pub fn new(ttl: Duration) -> Self {
        info!("Initializing session cache (ttl: {:?})", ttl);
        Self {
            storage: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Cached history, or None on miss / expiry (expired entry is evicted)
    pub fn get(&self, session_id: &str) -> Option<Vec<HistoryEntry>> {
        self.get_at(session_id, Instant::now())
    }

    pub fn get_at(&self, session_id: &str, now: Instant) -> Option<Vec<HistoryEntry>> {
        {
            let entry = self.storage.get(session_id)?;
            if !entry.is_expired(self.ttl, now) {
                debug!("Session {} served from cache", session_id);
                return Some(entry.history.clone());
            }
        }

        // Re-check under the shard write lock: a concurrent `put` may have
        // refreshed the entry between the read above and this removal.
        if self
            .storage
            .remove_if(session_id, |_, entry| entry.is_expired(self.ttl, now))
            .is_some()
        {
            debug!("Session {} expired, removed from cache", session_id);
            return None;
        }

        self.storage
            .get(session_id)
            .filter(|entry| !entry.is_expired(self.ttl, now))
            .map(|entry| entry.history.clone())
    }

    /// Create or overwrite, stamping the current time
    pub fn put(&self, session_id: &str, history: Vec<HistoryEntry>) {
        self.put_at(session_id, history, Instant::now());
    }

    pub fn put_at(&self, session_id: &str, history: Vec<HistoryEntry>, now: Instant) {
        debug!("Caching {} history entries for session {}", history.len(), session_id);
        self.storage.insert(
            session_id.to_string(),
            CacheEntry {
                history,
                written_at: now,
            },
        );
    }

    /// Remove one session; true if something was removed
    pub fn invalidate(&self, session_id: &str) -> bool {
        self.invalidate_at(session_id, Instant::now())
    }

    /// An entry that is already stale is dropped but reported as not removed.
    pub fn invalidate_at(&self, session_id: &str, now: Instant) -> bool {
        match self.storage.remove(session_id) {
            Some((_, entry)) => !entry.is_expired(self.ttl, now),
            None => false,
        }
    }

    /// Drop every entry; returns how many were held
    pub fn invalidate_all(&self) -> usize {
        let count = self.storage.len();
        self.storage.clear();
        info!("Cleared {} cached sessions", count);
        count
    }

    /// Evict every stale entry; returns the number evicted
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    pub fn sweep_expired_at(&self, now: Instant) -> usize {
        let mut evicted = 0usize;
        self.storage.retain(|_, entry| {
            let keep = !entry.is_expired(self.ttl, now);
            if !keep {
                evicted += 1;
            }
            keep
        });

        if evicted > 0 {
            info!("Swept {} expired sessions", evicted);
        }
        evicted
    }

    /// Present and fresh; never evicts
    pub fn exists(&self, session_id: &str) -> bool {
        self.exists_at(session_id, Instant::now())
    }

    pub fn exists_at(&self, session_id: &str, now: Instant) -> bool {
        self.storage
            .get(session_id)
            .map(|entry| !entry.is_expired(self.ttl, now))
            .unwrap_or(false)
    }

    /// Entries currently held, stale ones included
    pub fn size(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
