//! Cache (C10): bounded latest-by-device cache with TTL and lazy eviction,
//! mirroring the teacher's `RwLock<HashMap<_,_>>` shared-state idiom.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use canon_protocol::CanonicalRecord;

struct Entry {
    record: CanonicalRecord,
    expires_at: Instant,
}

#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
}

/// `map<deviceId, record>` with entry expiry (spec §4.10). Evicts the
/// entry with the earliest expiration when over `max_size`.
pub struct Cache {
    inner: RwLock<HashMap<String, Entry>>,
    max_size: usize,
    default_ttl: Duration,
    stats: CacheStats,
}

impl Cache {
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            max_size,
            default_ttl,
            stats: CacheStats::default(),
        }
    }

    pub fn set(&self, device_id: impl Into<String>, record: CanonicalRecord) {
        self.set_with_ttl(device_id, record, self.default_ttl);
    }

    pub fn set_with_ttl(&self, device_id: impl Into<String>, record: CanonicalRecord, ttl: Duration) {
        let mut inner = self.inner.write().unwrap();
        let expires_at = Instant::now() + ttl;
        inner.insert(device_id.into(), Entry { record, expires_at });

        while inner.len() > self.max_size {
            if let Some(oldest_key) = inner
                .iter()
                .min_by_key(|(_, e)| e.expires_at)
                .map(|(k, _)| k.clone())
            {
                inner.remove(&oldest_key);
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            } else {
                break;
            }
        }
    }

    pub fn get(&self, device_id: &str) -> Option<CanonicalRecord> {
        // Fast path: a non-expired hit only needs a read lock.
        {
            let inner = self.inner.read().unwrap();
            if let Some(entry) = inner.get(device_id) {
                if entry.expires_at > Instant::now() {
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.record.clone());
                }
            } else {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        }
        // Expired: remove it under a write lock.
        let mut inner = self.inner.write().unwrap();
        inner.remove(device_id);
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn all_devices(&self) -> Vec<String> {
        let now = Instant::now();
        self.inner
            .read()
            .unwrap()
            .iter()
            .filter(|(_, e)| e.expires_at > now)
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Periodic sweep (spec: "every 60s removes expired entries").
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.write().unwrap();
        let before = inner.len();
        inner.retain(|_, e| e.expires_at > now);
        let removed = before - inner.len();
        if removed > 0 {
            self.stats.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            size: self.len(),
        }
    }
}
