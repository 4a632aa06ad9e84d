//! Cache contract - main entry point for cache operations.

use crate::backend::CacheBackend;
use crate::error::{Error, Result};
use crate::key::{IdentityKey, KeyFunction};
use crate::negative::{NegativeCache, NoNegativeCache};
use crate::observability::{CacheMetrics, NoOpMetrics};
use crate::serialization::{IdentitySerde, Serde};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::time::Instant;

/// Core cache contract - composes key function, serde, negative cache
/// and backend into the batch cache API.
///
/// Every batch operation makes at most one backend call. Misses are
/// never errors; backend and serde failures propagate unchanged.
///
/// Collaborators default to identity / no-op implementations and are
/// replaced with the `with_*` methods.
///
/// # Example
///
/// ```
/// use cache_contract::{backend::InMemoryBackend, negative::SetNegativeCache, CacheContract};
///
/// # async fn example() -> cache_contract::Result<()> {
/// let cache = CacheContract::new(InMemoryBackend::<u32, u32>::new())
///     .with_negative_cache(SetNegativeCache::new());
///
/// assert!(cache.set_one(1, 2, true).await?);
/// assert_eq!(cache.get_one(1).await?, Some(2));
/// assert_eq!(cache.get_one(2).await?, None);
/// # Ok(())
/// # }
/// ```
pub struct CacheContract<
    B: CacheBackend,
    F = IdentityKey<<B as CacheBackend>::Key>,
    S = IdentitySerde<<B as CacheBackend>::Value>,
    N = NoNegativeCache<<B as CacheBackend>::Key>,
> {
    backend: B,
    key_fn: F,
    serde: S,
    negative_cache: N,
    metrics: Box<dyn CacheMetrics>,
}

impl<B: CacheBackend> CacheContract<B> {
    /// Create a contract over `backend` with identity keys, identity
    /// serde and negative caching disabled.
    pub fn new(backend: B) -> Self {
        CacheContract {
            backend,
            key_fn: IdentityKey::new(),
            serde: IdentitySerde::new(),
            negative_cache: NoNegativeCache::new(),
            metrics: Box::new(NoOpMetrics),
        }
    }
}

impl<B: CacheBackend, F, S, N> CacheContract<B, F, S, N> {
    /// Replace the key function.
    pub fn with_key_fn<K>(self, key_fn: K) -> CacheContract<B, K, S, N>
    where
        K: KeyFunction<Output = B::Key>,
    {
        CacheContract {
            backend: self.backend,
            key_fn,
            serde: self.serde,
            negative_cache: self.negative_cache,
            metrics: self.metrics,
        }
    }

    /// Replace the value serde.
    pub fn with_serde<T>(self, serde: T) -> CacheContract<B, F, T, N>
    where
        T: Serde<Stored = B::Value>,
    {
        CacheContract {
            backend: self.backend,
            key_fn: self.key_fn,
            serde,
            negative_cache: self.negative_cache,
            metrics: self.metrics,
        }
    }

    /// Enable negative caching with the given implementation.
    pub fn with_negative_cache<M>(self, negative_cache: M) -> CacheContract<B, F, S, M>
    where
        M: NegativeCache<Key = B::Key>,
    {
        CacheContract {
            backend: self.backend,
            key_fn: self.key_fn,
            serde: self.serde,
            negative_cache,
            metrics: self.metrics,
        }
    }

    /// Set custom metrics handler.
    pub fn with_metrics(mut self, metrics: Box<dyn CacheMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Get backend reference (for advanced use).
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Get mutable backend reference (for advanced use).
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Get negative cache reference.
    pub fn negative_cache(&self) -> &N {
        &self.negative_cache
    }
}

impl<B, F, S, N> CacheContract<B, F, S, N>
where
    B: CacheBackend,
    F: KeyFunction<Output = B::Key>,
    F::Input: Eq + Hash,
    S: Serde<Stored = B::Value>,
    N: NegativeCache<Key = B::Key>,
{
    /// Get the value for a single key.
    ///
    /// Returns `Ok(None)` when the key has no value; a miss is never an error.
    pub async fn get_one(&self, key: F::Input) -> Result<Option<S::Value>> {
        let found = self.get_many([key]).await?;
        Ok(found.into_values().next())
    }

    /// Get the value for a single key, or `default` when it has none.
    pub async fn get_one_or(&self, key: F::Input, default: S::Value) -> Result<S::Value> {
        Ok(self.get_one(key).await?.unwrap_or(default))
    }

    /// Batch read.
    ///
    /// Keys known to be absent are answered by the negative cache without
    /// touching the backend. Keys the backend does not have are marked
    /// absent for later reads, unless a write went through the negative
    /// cache while the backend was being read. The result holds only keys
    /// that resolved to a value.
    ///
    /// # Errors
    ///
    /// - `Error::BackendError`: the backend failed
    /// - `Error::DeserializationError` / `Error::InvalidCacheEntry` /
    ///   `Error::VersionMismatch`: a stored value could not be decoded
    pub async fn get_many<I>(&self, keys: I) -> Result<HashMap<F::Input, S::Value>>
    where
        I: IntoIterator<Item = F::Input>,
    {
        let timer = Instant::now();

        // Last caller key wins when two map to the same cache key.
        let mut caller_keys: HashMap<B::Key, F::Input> = HashMap::new();
        for key in keys {
            caller_keys.insert(self.key_fn.cache_key(&key), key);
        }

        let cache_keys: Vec<B::Key> = caller_keys.keys().cloned().collect();
        let exist_keys = self.negative_cache.filter(&cache_keys);

        let negative_hits = cache_keys.len().saturating_sub(exist_keys.len());
        if negative_hits > 0 {
            self.metrics.record_negative_hits(negative_hits);
        }

        if exist_keys.is_empty() {
            debug!(
                "» GET_MANY {} keys answered by negative cache",
                cache_keys.len()
            );
            return Ok(HashMap::new());
        }

        // A miss observed before a concurrent write must not hide that write.
        let epoch = self.negative_cache.write_epoch();
        let found = self
            .backend
            .get_many(&exist_keys)
            .await
            .map_err(|e| self.report_error("get_many", e))?;

        let missing: Vec<B::Key> = exist_keys
            .into_iter()
            .filter(|key| !found.contains_key(key))
            .collect();
        if !missing.is_empty() {
            self.negative_cache.add_if_unchanged(&missing, epoch);
        }

        let mut results = HashMap::with_capacity(found.len());
        for (cache_key, stored) in found {
            // Ignore keys the backend returned without being asked for them.
            let Some(caller_key) = caller_keys.remove(&cache_key) else {
                continue;
            };
            let value = self
                .serde
                .deserialize(stored)
                .map_err(|e| self.report_error("get_many", e))?;
            results.insert(caller_key, value);
        }

        let elapsed = timer.elapsed();
        self.metrics.record_hits(results.len(), elapsed);
        self.metrics.record_misses(missing.len(), elapsed);

        debug!(
            "✓ GET_MANY {} keys: {} hits, {} misses, {} negative in {:?}",
            cache_keys.len(),
            results.len(),
            missing.len(),
            negative_hits,
            elapsed
        );

        Ok(results)
    }

    /// Set a single key.
    ///
    /// Returns `true` only if `confirm` is true and the write was confirmed.
    pub async fn set_one(&self, key: F::Input, value: S::Value, confirm: bool) -> Result<bool> {
        let confirmed = self.set_many([(key, value)], confirm).await?;
        Ok(confirm && !confirmed.is_empty())
    }

    /// Batch write.
    ///
    /// Written keys are un-marked in the negative cache before the backend
    /// write, and again once it returns so that reads which missed while
    /// the write was in flight cannot leave them marked. With `confirm`
    /// set, the result holds the caller keys that both the negative cache
    /// and the backend report as done; without it the result is always
    /// empty.
    ///
    /// # Errors
    ///
    /// - `Error::SerializationError`: a value could not be encoded
    /// - `Error::BackendError`: the backend failed
    pub async fn set_many<I>(&self, entries: I, confirm: bool) -> Result<HashSet<F::Input>>
    where
        I: IntoIterator<Item = (F::Input, S::Value)>,
    {
        let timer = Instant::now();

        let mut caller_keys: HashMap<B::Key, F::Input> = HashMap::new();
        let mut stored: HashMap<B::Key, B::Value> = HashMap::new();
        for (key, value) in entries {
            let cache_key = self.key_fn.cache_key(&key);
            let serialized = self
                .serde
                .serialize(value)
                .map_err(|e| self.report_error("set_many", e))?;
            stored.insert(cache_key.clone(), serialized);
            caller_keys.insert(cache_key, key);
        }

        if stored.is_empty() {
            return Ok(HashSet::new());
        }

        let requested = stored.len();
        let cache_keys: Vec<B::Key> = stored.keys().cloned().collect();
        let negative_done: HashSet<B::Key> = self
            .negative_cache
            .remove(&cache_keys, confirm)
            .into_iter()
            .collect();

        let written = self.backend.set_many(stored, confirm).await;
        self.negative_cache.remove(&cache_keys, false);
        let backend_done = written.map_err(|e| self.report_error("set_many", e))?;

        if !confirm {
            self.metrics.record_set(requested, 0, timer.elapsed());
            debug!("✓ SET_MANY {} keys (unconfirmed)", requested);
            return Ok(HashSet::new());
        }

        let confirmed: HashSet<F::Input> = backend_done
            .into_iter()
            .filter(|key| negative_done.contains(key))
            .filter_map(|key| caller_keys.remove(&key))
            .collect();

        let elapsed = timer.elapsed();
        self.metrics.record_set(requested, confirmed.len(), elapsed);
        debug!(
            "✓ SET_MANY {} keys, {} confirmed in {:?}",
            requested,
            confirmed.len(),
            elapsed
        );

        Ok(confirmed)
    }

    /// Delete a single key.
    ///
    /// Returns `true` only if `confirm` is true and the key existed.
    pub async fn delete_one(&self, key: F::Input, confirm: bool) -> Result<bool> {
        let confirmed = self.delete_many([key], confirm).await?;
        Ok(confirm && !confirmed.is_empty())
    }

    /// Batch delete.
    ///
    /// With `confirm` set, the result holds the caller keys the backend
    /// actually removed; keys that were already absent are not reported.
    /// The negative cache is left untouched.
    ///
    /// # Errors
    ///
    /// Returns `Error::BackendError` if the backend fails
    pub async fn delete_many<I>(&self, keys: I, confirm: bool) -> Result<HashSet<F::Input>>
    where
        I: IntoIterator<Item = F::Input>,
    {
        let timer = Instant::now();

        let mut caller_keys: HashMap<B::Key, F::Input> = HashMap::new();
        for key in keys {
            caller_keys.insert(self.key_fn.cache_key(&key), key);
        }

        if caller_keys.is_empty() {
            return Ok(HashSet::new());
        }

        let requested = caller_keys.len();
        let cache_keys: Vec<B::Key> = caller_keys.keys().cloned().collect();
        let deleted = self
            .backend
            .delete_many(&cache_keys, confirm)
            .await
            .map_err(|e| self.report_error("delete_many", e))?;

        let confirmed: HashSet<F::Input> = if confirm {
            deleted
                .into_iter()
                .filter_map(|key| caller_keys.remove(&key))
                .collect()
        } else {
            HashSet::new()
        };

        let elapsed = timer.elapsed();
        self.metrics.record_delete(requested, confirmed.len(), elapsed);
        debug!(
            "✓ DELETE_MANY {} keys, {} confirmed in {:?}",
            requested,
            confirmed.len(),
            elapsed
        );

        Ok(confirmed)
    }

    /// Remove every entry from the backend.
    ///
    /// Returns `true` only if `confirm` is true and the backend reports success.
    ///
    /// # Errors
    ///
    /// Returns `Error::BackendError` if the backend fails
    pub async fn clear(&self, confirm: bool) -> Result<bool> {
        let cleared = self
            .backend
            .clear(confirm)
            .await
            .map_err(|e| self.report_error("clear", e))?;
        Ok(confirm && cleared)
    }

    /// Check that the backend is reachable.
    pub async fn health_check(&self) -> Result<bool> {
        self.backend.health_check().await
    }

    fn report_error(&self, operation: &str, error: Error) -> Error {
        warn!("✗ Cache {} failed: {}", operation, error);
        self.metrics.record_error(operation, &error.to_string());
        error
    }
}
