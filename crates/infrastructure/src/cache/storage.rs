use crate::wire;
use aegis_dns_domain::{config::CacheConfig, RequestFingerprint};
use hickory_proto::op::Message;
use lru::LruCache;
use rustc_hash::FxHashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// TTL stamped onto answers served stale in optimistic mode.
pub const STALE_TTL_SECS: u32 = 10;

/// A cache hit as handed back to the pipeline.
#[derive(Debug, Clone)]
pub struct CachedAnswer {
    pub message: Message,
    /// Upstream that originally produced the response.
    pub upstream: Arc<str>,
}

#[derive(Debug)]
pub enum CacheLookup {
    Fresh(CachedAnswer),
    /// Expired but inside the hard-expiry window, optimistic mode only.
    /// The caller owes the fingerprint a background refresh.
    Stale(CachedAnswer),
    Miss,
}

struct Entry {
    message: Message,
    upstream: Arc<str>,
    stored_at: Instant,
    expires_at: Instant,
    hard_expires_at: Instant,
    size: usize,
}

struct Inner {
    entries: LruCache<RequestFingerprint, Entry>,
    bytes: usize,
}

/// Per-question response cache.
///
/// LRU by byte budget. Expiry honors the answer TTL clamped between the
/// configured floor and ceiling; negative answers follow the SOA minimum and
/// the negative ceiling. An entry's expiry is never moved on read.
pub struct ResponseCache {
    config: CacheConfig,
    inner: Mutex<Inner>,
    /// Fingerprints with an optimistic refresh in flight; at most one per
    /// key at any instant.
    refreshing: Mutex<FxHashSet<RequestFingerprint>>,
}

impl ResponseCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                bytes: 0,
            }),
            refreshing: Mutex::new(FxHashSet::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.clear();
        inner.bytes = 0;
    }

    /// Effective TTL for a response under this configuration.
    fn effective_ttl(&self, message: &Message) -> u32 {
        let ttl = if wire::is_negative(message) {
            let soa = wire::soa_minimum(message).unwrap_or(self.config.negative_ceiling_secs);
            soa.min(self.config.negative_ceiling_secs)
        } else {
            wire::min_answer_ttl(message)
                .unwrap_or(0)
                .min(self.config.ttl_ceiling_secs)
        };
        ttl.max(self.config.ttl_floor_secs)
    }

    pub fn put(&self, key: RequestFingerprint, message: &Message, upstream: Arc<str>, size: usize) {
        if !self.config.enabled {
            return;
        }

        let ttl = self.effective_ttl(message);
        if ttl == 0 {
            return;
        }

        let now = Instant::now();
        let expires_at = now + Duration::from_secs(u64::from(ttl));
        let entry = Entry {
            message: message.clone(),
            upstream,
            stored_at: now,
            expires_at,
            hard_expires_at: expires_at
                + Duration::from_secs(u64::from(self.config.stale_hard_expiry_secs)),
            size,
        };

        let mut inner = self.inner.lock().unwrap();
        if let Some(old) = inner.entries.put(key, entry) {
            inner.bytes -= old.size;
        }
        inner.bytes += size;

        // Evict LRU until the byte budget holds.
        while inner.bytes > self.config.max_bytes {
            match inner.entries.pop_lru() {
                Some((_, evicted)) => inner.bytes -= evicted.size,
                None => break,
            }
        }
    }

    pub fn get(&self, key: &RequestFingerprint) -> CacheLookup {
        if !self.config.enabled {
            return CacheLookup::Miss;
        }

        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();

        let Some(entry) = inner.entries.get(key) else {
            return CacheLookup::Miss;
        };

        if now < entry.expires_at {
            let elapsed = now.duration_since(entry.stored_at).as_secs() as u32;
            let mut message = entry.message.clone();
            wire::age_ttls(&mut message, elapsed);
            return CacheLookup::Fresh(CachedAnswer {
                message,
                upstream: Arc::clone(&entry.upstream),
            });
        }

        if self.config.optimistic && now < entry.hard_expires_at {
            let mut message = entry.message.clone();
            wire::clamp_ttls(&mut message, STALE_TTL_SECS);
            return CacheLookup::Stale(CachedAnswer {
                message,
                upstream: Arc::clone(&entry.upstream),
            });
        }

        let size = entry.size;
        inner.entries.pop(key);
        inner.bytes -= size;
        debug!(?key, "Expired cache entry dropped");
        CacheLookup::Miss
    }

    /// Claim the single refresh slot for `key`. Returns false when another
    /// refresh is already in flight.
    pub fn begin_refresh(&self, key: &RequestFingerprint) -> bool {
        self.refreshing.lock().unwrap().insert(key.clone())
    }

    /// Release the refresh slot, whatever the refresh outcome was.
    pub fn end_refresh(&self, key: &RequestFingerprint) {
        self.refreshing.lock().unwrap().remove(key);
    }
}
