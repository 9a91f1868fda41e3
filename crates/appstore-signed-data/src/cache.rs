//! In-memory capacity/TTL cache.
//!
//! [`CacheStore`] is a bounded key/value store whose entries carry a
//! monotonic expiry. Eviction is purely time based:
//!
//! 1. On `put` at capacity, every expired entry is purged.
//! 2. If the store is still full, the single entry with the earliest
//!    `expires_at` is evicted, regardless of how recently it was read.
//!
//! `get` treats an expired entry as a miss but leaves it in place; it is
//! removed lazily by the next `put` that needs room, or by [`CacheStore::clear`].
//!
//! [`CertificateCache`] specializes the store to map a certificate chain
//! fingerprint to the leaf key recovered from that chain.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::chain::VerifiedKey;

/// Default capacity of the certificate cache.
pub const DEFAULT_CERTIFICATE_CACHE_MAX_SIZE: usize = 32;

/// Default TTL of certificate cache entries (15 minutes).
pub const DEFAULT_CERTIFICATE_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

/// A cached value and its expiry.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// Cached value.
    pub value: V,

    /// Monotonic instant after which the entry is stale.
    pub expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Capacity- and TTL-bounded key/value store.
///
/// Clones share the same underlying map.
#[derive(Debug)]
pub struct CacheStore<K, V> {
    inner: Arc<Mutex<HashMap<K, CacheEntry<V>>>>,
    max_size: usize,
}

impl<K, V> Clone for CacheStore<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            max_size: self.max_size,
        }
    }
}

impl<K, V> CacheStore<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    /// Create an empty store holding at most `max_size` entries.
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            max_size,
        }
    }

    /// Configured capacity.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Get a live value.
    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub(crate) fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        let entries = self.lock();
        entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone())
    }

    /// Insert a value that expires after `ttl`, replacing any previous entry.
    ///
    /// Never fails: when the store is full an entry is evicted first.
    pub fn put(&self, key: K, value: V, ttl: Duration) {
        self.put_at(key, value, ttl, Instant::now());
    }

    pub(crate) fn put_at(&self, key: K, value: V, ttl: Duration, now: Instant) {
        let mut entries = self.lock();
        Self::ensure_capacity(&mut entries, self.max_size, now);
        entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: now + ttl,
            },
        );
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Whether `key` has an entry, live or expired.
    pub fn contains_key(&self, key: &K) -> bool {
        self.lock().contains_key(key)
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn ensure_capacity(entries: &mut HashMap<K, CacheEntry<V>>, max_size: usize, now: Instant) {
        if entries.len() < max_size {
            return;
        }

        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        if before != entries.len() {
            debug!(purged = before - entries.len(), "purged expired cache entries");
        }

        if entries.len() < max_size {
            return;
        }

        let earliest = entries
            .iter()
            .min_by_key(|(_, entry)| entry.expires_at)
            .map(|(key, _)| key.clone());
        if let Some(key) = earliest {
            debug!(key = ?key, "evicting cache entry with earliest expiry");
            entries.remove(&key);
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, CacheEntry<V>>> {
        // Entries are replaced wholesale, so a poisoned map is still consistent.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// SHA-256 over the ordered DER certificates of a chain.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainFingerprint([u8; 32]);

impl ChainFingerprint {
    /// Fingerprint an ordered chain.
    ///
    /// Each certificate is length-prefixed so that different splits of the
    /// same concatenated bytes never collide.
    pub fn of(chain: &[Vec<u8>]) -> Self {
        let mut hasher = Sha256::new();
        for der in chain {
            hasher.update((der.len() as u64).to_be_bytes());
            hasher.update(der);
        }
        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Debug for ChainFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ChainFingerprint({})", self.to_hex())
    }
}

impl std::fmt::Display for ChainFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Cache of trust-verified leaf keys, keyed by chain fingerprint.
#[derive(Debug, Clone)]
pub struct CertificateCache {
    store: CacheStore<ChainFingerprint, VerifiedKey>,
    ttl: Duration,
}

impl CertificateCache {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            store: CacheStore::new(max_size),
            ttl,
        }
    }

    /// TTL applied to new entries.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, fingerprint: &ChainFingerprint) -> Option<VerifiedKey> {
        self.store.get(fingerprint)
    }

    pub fn insert(&self, fingerprint: ChainFingerprint, key: VerifiedKey) {
        self.store.put(fingerprint, key, self.ttl);
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn clear(&self) {
        self.store.clear();
    }
}

impl Default for CertificateCache {
    fn default() -> Self {
        Self::new(
            DEFAULT_CERTIFICATE_CACHE_MAX_SIZE,
            DEFAULT_CERTIFICATE_CACHE_TTL,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn test_cache_roundtrip() {
        let cache = CacheStore::new(4);
        cache.put("a".to_string(), 1, MINUTE);

        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.get(&"b".to_string()), None);
    }

    #[test]
    fn test_expired_entry_is_a_miss_but_not_deleted() {
        let cache = CacheStore::new(4);
        let now = Instant::now();
        cache.put_at("a", 1, MINUTE, now);

        assert_eq!(cache.get_at(&"a", now + 2 * MINUTE), None);
        assert!(cache.contains_key(&"a"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_evicts_earliest_expiry_not_least_recently_used() {
        let cache = CacheStore::new(2);
        let now = Instant::now();

        cache.put_at("long", 1, 10 * MINUTE, now);
        cache.put_at("short", 2, 5 * MINUTE, now);

        // Reading "short" does not protect it.
        assert_eq!(cache.get_at(&"short", now), Some(2));

        cache.put_at("third", 3, 10 * MINUTE, now);

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains_key(&"short"));
        assert_eq!(cache.get_at(&"long", now), Some(1));
        assert_eq!(cache.get_at(&"third", now), Some(3));
    }

    #[test]
    fn test_put_purges_all_expired_before_evicting() {
        let cache = CacheStore::new(3);
        let now = Instant::now();

        cache.put_at("stale-1", 1, MINUTE, now);
        cache.put_at("stale-2", 2, MINUTE, now);
        cache.put_at("fresh", 3, 10 * MINUTE, now);

        let later = now + 2 * MINUTE;
        cache.put_at("new", 4, MINUTE, later);

        assert_eq!(cache.len(), 2);
        assert!(cache.contains_key(&"fresh"));
        assert!(cache.contains_key(&"new"));
    }

    #[test]
    fn test_put_below_capacity_keeps_expired_entries() {
        let cache = CacheStore::new(3);
        let now = Instant::now();

        cache.put_at("stale", 1, MINUTE, now);
        cache.put_at("other", 2, MINUTE, now + 2 * MINUTE);

        assert!(cache.contains_key(&"stale"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_put_replaces_entry_wholesale() {
        let cache = CacheStore::new(2);
        let now = Instant::now();

        cache.put_at("a", 1, MINUTE, now);
        cache.put_at("a", 2, 10 * MINUTE, now);

        assert_eq!(cache.get_at(&"a", now + 5 * MINUTE), Some(2));
    }

    #[test]
    fn test_zero_capacity_still_accepts_insert() {
        let cache = CacheStore::new(0);
        cache.put("a", 1, MINUTE);
        cache.put("b", 2, MINUTE);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"b"), Some(2));
    }

    #[test]
    fn test_clear() {
        let cache = CacheStore::new(2);
        cache.put("a", 1, MINUTE);
        cache.clear();

        assert!(cache.is_empty());
    }

    #[test]
    fn test_clones_share_entries() {
        let cache = CacheStore::new(2);
        let other = cache.clone();
        cache.put("a", 1, MINUTE);

        assert_eq!(other.get(&"a"), Some(1));
    }

    #[test]
    fn test_fingerprint_depends_on_order_and_boundaries() {
        let a = vec![vec![1u8, 2], vec![3u8]];
        let b = vec![vec![3u8], vec![1u8, 2]];
        let c = vec![vec![1u8], vec![2u8, 3]];

        assert_eq!(ChainFingerprint::of(&a), ChainFingerprint::of(&a.clone()));
        assert_ne!(ChainFingerprint::of(&a), ChainFingerprint::of(&b));
        assert_ne!(ChainFingerprint::of(&a), ChainFingerprint::of(&c));
        assert_eq!(ChainFingerprint::of(&a).to_hex().len(), 64);
    }
}
