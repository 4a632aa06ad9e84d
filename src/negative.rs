//! Negative caching: remember cache keys known to be absent from the backend.
//!
//! The contract consults the negative cache before every backend read so
//! that repeated misses do not repeatedly reach the backend. A read miss
//! marks the key; a write through the contract un-marks it.
//!
//! Reads and writes may interleave when a contract is shared. Every
//! un-mark advances a write epoch, and a read only marks its misses if
//! the epoch it saw before reaching the backend is still current.

use crate::error::{Error, Result};
use dashmap::{DashMap, DashSet};
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Default upper bound on entries held by [`BoundedNegativeCache`].
const DEFAULT_MAX_ENTRIES: usize = 100_000;

/// Tracks cache keys confirmed absent from the backend.
///
/// Implementations use interior mutability and must be safe to share
/// between threads.
pub trait NegativeCache: Send + Sync {
    type Key;

    /// Return the keys that are NOT known to be absent, preserving order.
    fn filter(&self, keys: &[Self::Key]) -> Vec<Self::Key>;

    /// Mark keys as absent. Returns the keys that were marked.
    fn add(&self, keys: &[Self::Key]) -> Vec<Self::Key>;

    /// Un-mark keys. Returns the keys successfully un-marked.
    ///
    /// Advances the write epoch.
    fn remove(&self, keys: &[Self::Key], confirm: bool) -> Vec<Self::Key>;

    /// Current write epoch. Any `remove` makes it change.
    fn write_epoch(&self) -> u64 {
        0
    }

    /// Mark keys as absent unless a `remove` happened after `epoch` was
    /// read. Returns the keys that were marked.
    ///
    /// The default marks unconditionally; implementations shared between
    /// tasks override this together with [`NegativeCache::write_epoch`].
    fn add_if_unchanged(&self, keys: &[Self::Key], epoch: u64) -> Vec<Self::Key> {
        let _ = epoch;
        self.add(keys)
    }
}

/// Write epoch guarding mark/un-mark ordering.
///
/// Holding the guard serializes conditional marks against un-marks, so a
/// mark can never land between an un-mark and its epoch bump.
struct WriteEpoch {
    counter: Mutex<u64>,
}

impl WriteEpoch {
    fn new() -> Self {
        WriteEpoch {
            counter: Mutex::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, u64> {
        // The counter stays valid even if a holder panicked.
        self.counter.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self) -> u64 {
        *self.lock()
    }
}

/// Pass-through negative cache: negative caching disabled.
pub struct NoNegativeCache<K> {
    _key: PhantomData<fn() -> K>,
}

impl<K> NoNegativeCache<K> {
    pub fn new() -> Self {
        NoNegativeCache { _key: PhantomData }
    }
}

impl<K> Default for NoNegativeCache<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone> NegativeCache for NoNegativeCache<K> {
    type Key = K;

    fn filter(&self, keys: &[K]) -> Vec<K> {
        keys.to_vec()
    }

    fn add(&self, keys: &[K]) -> Vec<K> {
        keys.to_vec()
    }

    fn remove(&self, keys: &[K], _confirm: bool) -> Vec<K> {
        keys.to_vec()
    }
}

/// Unbounded set-based negative cache.
///
/// Entries persist until un-marked by a write. Growth is unbounded; use
/// [`BoundedNegativeCache`] when the key space is large.
pub struct SetNegativeCache<K: Eq + Hash> {
    store: DashSet<K>,
    epoch: WriteEpoch,
}

impl<K: Eq + Hash> SetNegativeCache<K> {
    pub fn new() -> Self {
        SetNegativeCache {
            store: DashSet::new(),
            epoch: WriteEpoch::new(),
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.store.contains(key)
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

impl<K: Eq + Hash> Default for SetNegativeCache<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> NegativeCache for SetNegativeCache<K>
where
    K: Eq + Hash + Clone + Send + Sync,
{
    type Key = K;

    fn filter(&self, keys: &[K]) -> Vec<K> {
        keys.iter()
            .filter(|key| !self.store.contains(*key))
            .cloned()
            .collect()
    }

    fn add(&self, keys: &[K]) -> Vec<K> {
        let _guard = self.epoch.lock();
        for key in keys {
            self.store.insert(key.clone());
        }
        keys.to_vec()
    }

    fn remove(&self, keys: &[K], _confirm: bool) -> Vec<K> {
        let mut epoch = self.epoch.lock();
        *epoch += 1;
        for key in keys {
            self.store.remove(key);
        }
        keys.to_vec()
    }

    fn write_epoch(&self) -> u64 {
        self.epoch.current()
    }

    fn add_if_unchanged(&self, keys: &[K], epoch: u64) -> Vec<K> {
        let current = self.epoch.lock();
        if *current != epoch {
            debug!(
                "Negative cache written since read (epoch {} -> {}), {} keys not marked",
                epoch,
                *current,
                keys.len()
            );
            return Vec::new();
        }
        for key in keys {
            self.store.insert(key.clone());
        }
        keys.to_vec()
    }
}

/// Configuration for [`BoundedNegativeCache`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NegativeCacheConfig {
    /// Maximum number of keys held at once.
    pub max_entries: usize,
    /// How long a key stays marked absent. `None` keeps it until written.
    pub ttl: Option<Duration>,
}

impl Default for NegativeCacheConfig {
    fn default() -> Self {
        NegativeCacheConfig {
            max_entries: DEFAULT_MAX_ENTRIES,
            ttl: None,
        }
    }
}

impl NegativeCacheConfig {
    /// Build configuration from environment variables.
    ///
    /// - `NEGATIVE_CACHE_MAX_ENTRIES`: maximum entries (default 100000)
    /// - `NEGATIVE_CACHE_TTL_SECS`: entry lifetime in seconds (default: none)
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if a variable is set but not a valid integer
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from any name-to-value source, using the same
    /// variable names as [`NegativeCacheConfig::from_env`].
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if a value is present but not a valid integer
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = NegativeCacheConfig::default();

        if let Some(raw) = lookup("NEGATIVE_CACHE_MAX_ENTRIES") {
            config.max_entries = raw.trim().parse::<usize>().map_err(|e| {
                Error::ConfigError(format!("Invalid NEGATIVE_CACHE_MAX_ENTRIES '{}': {}", raw, e))
            })?;
        }

        if let Some(raw) = lookup("NEGATIVE_CACHE_TTL_SECS") {
            let secs = raw.trim().parse::<u64>().map_err(|e| {
                Error::ConfigError(format!("Invalid NEGATIVE_CACHE_TTL_SECS '{}': {}", raw, e))
            })?;
            config.ttl = Some(Duration::from_secs(secs));
        }

        Ok(config)
    }
}

/// Negative cache with a capacity limit and optional entry lifetime.
///
/// Expired entries are treated as unknown and purged lazily. When the
/// cache is full and nothing has expired, new keys are simply not marked;
/// the only cost is an extra backend lookup for them.
///
/// The bound is exact: marks are serialized, so concurrent callers never
/// push the cache past `max_entries`.
pub struct BoundedNegativeCache<K: Eq + Hash> {
    entries: DashMap<K, Instant>,
    max_entries: usize,
    ttl: Option<Duration>,
    epoch: WriteEpoch,
}

impl<K: Eq + Hash> BoundedNegativeCache<K> {
    /// Create a bounded negative cache.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if `max_entries` is zero
    pub fn new(config: NegativeCacheConfig) -> Result<Self> {
        if config.max_entries == 0 {
            return Err(Error::ConfigError(
                "negative cache max_entries must be greater than zero".to_string(),
            ));
        }

        info!(
            "✓ Bounded negative cache initialized (max entries: {}, ttl: {:?})",
            config.max_entries, config.ttl
        );

        Ok(BoundedNegativeCache {
            entries: DashMap::new(),
            max_entries: config.max_entries,
            ttl: config.ttl,
            epoch: WriteEpoch::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, marked_at: Instant) -> bool {
        match self.ttl {
            Some(ttl) => marked_at.elapsed() >= ttl,
            None => false,
        }
    }

    /// Drop every expired entry. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        if self.ttl.is_none() {
            return 0;
        }
        let before = self.entries.len();
        self.entries.retain(|_, marked_at| !self.is_expired(*marked_at));
        before.saturating_sub(self.entries.len())
    }

    /// Insert marks up to capacity. Callers hold the epoch guard so the
    /// length check and the insert are not interleaved with other marks.
    fn mark(&self, keys: &[K]) -> Vec<K>
    where
        K: Clone,
    {
        let mut added = Vec::with_capacity(keys.len());
        for key in keys {
            if self.entries.len() >= self.max_entries && !self.entries.contains_key(key) {
                self.purge_expired();
                if self.entries.len() >= self.max_entries {
                    debug!("Negative cache full ({} entries), key not marked", self.max_entries);
                    continue;
                }
            }
            self.entries.insert(key.clone(), Instant::now());
            added.push(key.clone());
        }
        added
    }
}

impl<K> NegativeCache for BoundedNegativeCache<K>
where
    K: Eq + Hash + Clone + Send + Sync,
{
    type Key = K;

    fn filter(&self, keys: &[K]) -> Vec<K> {
        keys.iter()
            .filter(|key| {
                // Copy the timestamp out so the shard lock is released before removal.
                let marked_at = self.entries.get(*key).map(|entry| *entry.value());
                match marked_at {
                    Some(at) if self.is_expired(at) => {
                        self.entries.remove_if(*key, |_, at| self.is_expired(*at));
                        true
                    }
                    Some(_) => false,
                    None => true,
                }
            })
            .cloned()
            .collect()
    }

    fn add(&self, keys: &[K]) -> Vec<K> {
        let _guard = self.epoch.lock();
        self.mark(keys)
    }

    fn remove(&self, keys: &[K], _confirm: bool) -> Vec<K> {
        let mut epoch = self.epoch.lock();
        *epoch += 1;
        for key in keys {
            self.entries.remove(key);
        }
        keys.to_vec()
    }

    fn write_epoch(&self) -> u64 {
        self.epoch.current()
    }

    fn add_if_unchanged(&self, keys: &[K], epoch: u64) -> Vec<K> {
        let current = self.epoch.lock();
        if *current != epoch {
            debug!(
                "Negative cache written since read (epoch {} -> {}), {} keys not marked",
                epoch,
                *current,
                keys.len()
            );
            return Vec::new();
        }
        self.mark(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_negative_cache_passes_everything() {
        let neg = NoNegativeCache::<u32>::new();
        assert_eq!(neg.filter(&[1, 2, 3]), vec![1, 2, 3]);
        assert_eq!(neg.add(&[1]), vec![1]);
        assert_eq!(neg.filter(&[1]), vec![1]);
        assert_eq!(neg.remove(&[1, 2], true), vec![1, 2]);
    }

    #[test]
    fn test_set_negative_cache_filter_preserves_order() {
        let neg = SetNegativeCache::new();
        neg.add(&[2, 4]);

        assert_eq!(neg.filter(&[5, 4, 3, 2, 1]), vec![5, 3, 1]);
        assert!(neg.contains(&4));
        assert_eq!(neg.len(), 2);
    }

    #[test]
    fn test_set_negative_cache_remove_is_idempotent() {
        let neg = SetNegativeCache::new();
        neg.add(&["a".to_string()]);

        let removed = neg.remove(&["a".to_string(), "b".to_string()], true);
        assert_eq!(removed, vec!["a".to_string(), "b".to_string()]);
        assert!(neg.is_empty());

        // Removing again still succeeds.
        assert_eq!(neg.remove(&["a".to_string()], false), vec!["a".to_string()]);
    }

    #[test]
    fn test_set_negative_cache_clear() {
        let neg = SetNegativeCache::new();
        neg.add(&[1, 2, 3]);
        neg.clear();
        assert_eq!(neg.filter(&[1, 2, 3]), vec![1, 2, 3]);
    }

    #[test]
    fn test_bounded_rejects_zero_capacity() {
        let result = BoundedNegativeCache::<u32>::new(NegativeCacheConfig {
            max_entries: 0,
            ttl: None,
        });
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_bounded_capacity_limit() {
        let neg = BoundedNegativeCache::new(NegativeCacheConfig {
            max_entries: 2,
            ttl: None,
        })
        .expect("Failed to create negative cache");

        assert_eq!(neg.add(&[1, 2, 3]), vec![1, 2]);
        assert_eq!(neg.len(), 2);
        assert_eq!(neg.filter(&[1, 2, 3]), vec![3]);

        // Re-marking an existing key is allowed at capacity.
        assert_eq!(neg.add(&[1]), vec![1]);

        neg.remove(&[1], true);
        assert_eq!(neg.add(&[3]), vec![3]);
        assert_eq!(neg.filter(&[1, 2, 3]), vec![1]);
    }

    #[test]
    fn test_bounded_ttl_expiry() {
        let neg = BoundedNegativeCache::new(NegativeCacheConfig {
            max_entries: 10,
            ttl: Some(Duration::from_millis(20)),
        })
        .expect("Failed to create negative cache");

        neg.add(&[1]);
        assert!(neg.filter(&[1]).is_empty());

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(neg.filter(&[1]), vec![1]);
        assert!(neg.is_empty());
    }

    #[test]
    fn test_bounded_full_cache_purges_expired() {
        let neg = BoundedNegativeCache::new(NegativeCacheConfig {
            max_entries: 1,
            ttl: Some(Duration::from_millis(20)),
        })
        .expect("Failed to create negative cache");

        neg.add(&[1]);
        std::thread::sleep(Duration::from_millis(40));

        assert_eq!(neg.add(&[2]), vec![2]);
        assert_eq!(neg.len(), 1);
        assert_eq!(neg.filter(&[1, 2]), vec![1]);
    }

    #[test]
    fn test_config_default() {
        let config = NegativeCacheConfig::default();
        assert_eq!(config.max_entries, 100_000);
        assert_eq!(config.ttl, None);
    }

    fn lookup_from(
        vars: &[(&'static str, &'static str)],
    ) -> impl Fn(&str) -> Option<String> {
        let vars: std::collections::HashMap<&str, &str> = vars.iter().copied().collect();
        move |name| vars.get(name).map(|value| value.to_string())
    }

    #[test]
    fn test_config_from_lookup() {
        let config = NegativeCacheConfig::from_lookup(lookup_from(&[
            ("NEGATIVE_CACHE_MAX_ENTRIES", " 500 "),
            ("NEGATIVE_CACHE_TTL_SECS", "30"),
        ]))
        .expect("Failed to parse config");
        assert_eq!(config.max_entries, 500);
        assert_eq!(config.ttl, Some(Duration::from_secs(30)));

        let config =
            NegativeCacheConfig::from_lookup(lookup_from(&[])).expect("Failed to parse config");
        assert_eq!(config, NegativeCacheConfig::default());
    }

    #[test]
    fn test_config_from_lookup_rejects_garbage() {
        let err = NegativeCacheConfig::from_lookup(lookup_from(&[(
            "NEGATIVE_CACHE_TTL_SECS",
            "soon",
        )]))
        .unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));

        let err = NegativeCacheConfig::from_lookup(lookup_from(&[(
            "NEGATIVE_CACHE_MAX_ENTRIES",
            "-1",
        )]))
        .unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_set_add_if_unchanged_skips_after_write() {
        let neg = SetNegativeCache::new();
        let epoch = neg.write_epoch();

        assert_eq!(neg.add_if_unchanged(&[1], epoch), vec![1]);

        let stale = neg.write_epoch();
        neg.remove(&[1], true);
        assert!(neg.add_if_unchanged(&[1, 2], stale).is_empty());
        assert!(neg.is_empty());

        assert_eq!(neg.add_if_unchanged(&[2], neg.write_epoch()), vec![2]);
        assert!(neg.contains(&2));
    }

    #[test]
    fn test_bounded_add_if_unchanged_skips_after_write() {
        let neg = BoundedNegativeCache::new(NegativeCacheConfig::default())
            .expect("Failed to create negative cache");
        let stale = neg.write_epoch();

        // A write to any key invalidates marks computed before it.
        neg.remove(&[9], false);
        assert!(neg.add_if_unchanged(&[1], stale).is_empty());
        assert_eq!(neg.filter(&[1]), vec![1]);

        assert_eq!(neg.add_if_unchanged(&[1], neg.write_epoch()), vec![1]);
        assert!(neg.filter(&[1]).is_empty());
    }

    #[test]
    fn test_no_negative_cache_add_if_unchanged() {
        let neg = NoNegativeCache::<u32>::new();
        assert_eq!(neg.write_epoch(), 0);
        assert_eq!(neg.add_if_unchanged(&[1], 0), vec![1]);
    }

    #[test]
    fn test_bounded_capacity_holds_under_concurrent_adds() {
        let neg = BoundedNegativeCache::new(NegativeCacheConfig {
            max_entries: 8,
            ttl: None,
        })
        .expect("Failed to create negative cache");

        let added: usize = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8u32)
                .map(|worker| {
                    let neg = &neg;
                    scope.spawn(move || {
                        (0..64u32)
                            .map(|i| neg.add(&[worker * 1000 + i]).len())
                            .sum::<usize>()
                    })
                })
                .collect();
            workers
                .into_iter()
                .map(|worker| worker.join().expect("Failed to join worker"))
                .sum()
        });

        assert_eq!(added, 8);
        assert_eq!(neg.len(), 8);
    }
}
