//! Shareable cache handle for use across tasks and threads.

use crate::backend::CacheBackend;
use crate::contract::CacheContract;
use crate::error::Result;
use crate::key::KeyFunction;
use crate::negative::NegativeCache;
use crate::serialization::Serde;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::ops::Deref;
use std::sync::Arc;

/// Cheap-to-clone handle around a [`CacheContract`].
///
/// Cloning only increments a reference count, so every clone talks to the
/// same backend and the same negative cache.
///
/// # Example
///
/// ```
/// use cache_contract::{backend::InMemoryBackend, CacheContract, CacheService};
///
/// # async fn example() -> cache_contract::Result<()> {
/// let cache = CacheService::new(CacheContract::new(InMemoryBackend::<u32, u32>::new()));
/// let other = cache.clone();
///
/// cache.set_one(1, 10, true).await?;
/// assert_eq!(other.get_one(1).await?, Some(10));
/// # Ok(())
/// # }
/// ```
pub struct CacheService<B: CacheBackend, F, S, N> {
    contract: Arc<CacheContract<B, F, S, N>>,
}

impl<B: CacheBackend, F, S, N> Clone for CacheService<B, F, S, N> {
    fn clone(&self) -> Self {
        CacheService {
            contract: Arc::clone(&self.contract),
        }
    }
}

impl<B: CacheBackend, F, S, N> CacheService<B, F, S, N> {
    pub fn new(contract: CacheContract<B, F, S, N>) -> Self {
        CacheService {
            contract: Arc::new(contract),
        }
    }

    /// Get the underlying contract.
    pub fn contract(&self) -> &CacheContract<B, F, S, N> {
        &self.contract
    }
}

impl<B: CacheBackend, F, S, N> Deref for CacheService<B, F, S, N> {
    type Target = CacheContract<B, F, S, N>;

    fn deref(&self) -> &Self::Target {
        &self.contract
    }
}

impl<B, F, S, N> CacheService<B, F, S, N>
where
    B: CacheBackend,
    F: KeyFunction<Output = B::Key>,
    F::Input: Eq + Hash,
    S: Serde<Stored = B::Value>,
    N: NegativeCache<Key = B::Key>,
{
    /// Look up several keys, returning each caller's result in input order.
    ///
    /// Keys are gathered into a single batch read.
    pub async fn get_ordered(&self, keys: Vec<F::Input>) -> Result<Vec<Option<S::Value>>>
    where
        F::Input: Clone,
        S::Value: Clone,
    {
        let found: HashMap<F::Input, S::Value> = self.contract.get_many(keys.clone()).await?;
        Ok(keys.iter().map(|key| found.get(key).cloned()).collect())
    }

    /// Write several entries and report whether every key was confirmed.
    pub async fn set_all(&self, entries: Vec<(F::Input, S::Value)>, confirm: bool) -> Result<bool>
    where
        F::Input: Clone,
    {
        let wanted: HashSet<F::Input> = entries.iter().map(|(key, _)| key.clone()).collect();
        let confirmed = self.contract.set_many(entries, confirm).await?;
        Ok(confirm && wanted.iter().all(|key| confirmed.contains(key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::negative::{BoundedNegativeCache, NegativeCacheConfig, SetNegativeCache};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    /// Backend that can park one read (after reading the store) or one
    /// write (before writing it) until released.
    struct GatedBackend {
        inner: InMemoryBackend<u32, u32>,
        gate_read: AtomicBool,
        gate_write: AtomicBool,
        parked: Notify,
        release: Notify,
    }

    impl GatedBackend {
        fn new() -> Self {
            GatedBackend {
                inner: InMemoryBackend::new(),
                gate_read: AtomicBool::new(false),
                gate_write: AtomicBool::new(false),
                parked: Notify::new(),
                release: Notify::new(),
            }
        }

        async fn park(&self) {
            self.parked.notify_one();
            self.release.notified().await;
        }
    }

    impl CacheBackend for GatedBackend {
        type Key = u32;
        type Value = u32;

        async fn get_many(&self, keys: &[u32]) -> Result<HashMap<u32, u32>> {
            let found = self.inner.get_many(keys).await?;
            if self.gate_read.swap(false, Ordering::SeqCst) {
                self.park().await;
            }
            Ok(found)
        }

        async fn set_many(
            &self,
            entries: HashMap<u32, u32>,
            confirm: bool,
        ) -> Result<HashSet<u32>> {
            if self.gate_write.swap(false, Ordering::SeqCst) {
                self.park().await;
            }
            self.inner.set_many(entries, confirm).await
        }

        async fn delete_many(&self, keys: &[u32], confirm: bool) -> Result<HashSet<u32>> {
            self.inner.delete_many(keys, confirm).await
        }

        async fn clear(&self, confirm: bool) -> Result<bool> {
            self.inner.clear(confirm).await
        }
    }

    #[tokio::test]
    async fn test_service_clones_share_state() {
        let cache = CacheService::new(
            CacheContract::new(InMemoryBackend::<u32, u32>::new())
                .with_negative_cache(SetNegativeCache::new()),
        );
        let other = cache.clone();

        assert_eq!(other.get_one(1).await.expect("Failed to get"), None);
        assert!(cache.negative_cache().contains(&1));

        cache.set_one(1, 10, true).await.expect("Failed to set");
        assert!(!other.negative_cache().contains(&1));
        assert_eq!(other.get_one(1).await.expect("Failed to get"), Some(10));
    }

    #[tokio::test]
    async fn test_service_get_ordered() {
        let cache = CacheService::new(CacheContract::new(InMemoryBackend::<u32, u32>::new()));
        cache
            .set_many([(1, 10), (3, 30)], false)
            .await
            .expect("Failed to set");

        let values = cache
            .get_ordered(vec![3, 2, 1, 3])
            .await
            .expect("Failed to get");
        assert_eq!(values, vec![Some(30), None, Some(10), Some(30)]);
    }

    #[tokio::test]
    async fn test_service_set_all() {
        let cache = CacheService::new(CacheContract::new(InMemoryBackend::<u32, u32>::new()));

        assert!(cache
            .set_all(vec![(1, 10), (2, 20)], true)
            .await
            .expect("Failed to set"));
        assert!(!cache
            .set_all(vec![(3, 30)], false)
            .await
            .expect("Failed to set"));
        assert_eq!(cache.contract().backend().len().await, 3);
    }

    #[tokio::test]
    async fn test_service_concurrent_reads() {
        let cache = CacheService::new(CacheContract::new(InMemoryBackend::<u32, u32>::new()));
        cache
            .set_many((0..16).map(|i| (i, i * 2)), false)
            .await
            .expect("Failed to set");

        let reads = (0..16).map(|i| {
            let cache = cache.clone();
            async move { cache.get_one(i).await }
        });
        let results = futures::future::join_all(reads).await;

        for (i, result) in results.into_iter().enumerate() {
            assert_eq!(result.expect("Failed to get"), Some(i as u32 * 2));
        }
    }

    #[tokio::test]
    async fn test_stale_miss_does_not_hide_concurrent_write() {
        let cache = CacheService::new(
            CacheContract::new(GatedBackend::new())
                .with_negative_cache(SetNegativeCache::new()),
        );
        let reader = cache.clone();
        cache.backend().gate_read.store(true, Ordering::SeqCst);

        // The read misses, parks, and only resumes after the write is confirmed.
        let read = async { reader.get_one(7).await };
        let write = async {
            cache.backend().parked.notified().await;
            let written = cache.set_one(7, 70, true).await;
            cache.backend().release.notify_one();
            written
        };
        let (stale, written) = tokio::join!(read, write);

        assert_eq!(stale.expect("Failed to get"), None);
        assert!(written.expect("Failed to set"));
        assert!(!cache.negative_cache().contains(&7));
        assert_eq!(cache.get_one(7).await.expect("Failed to get"), Some(70));
    }

    #[tokio::test]
    async fn test_miss_during_inflight_write_is_cleared() {
        let negative = BoundedNegativeCache::new(NegativeCacheConfig::default())
            .expect("Failed to create negative cache");
        let cache = CacheService::new(
            CacheContract::new(GatedBackend::new()).with_negative_cache(negative),
        );
        let reader = cache.clone();
        cache.backend().gate_write.store(true, Ordering::SeqCst);

        // The write un-marks 7 and parks before reaching the store; a read
        // in that window misses and marks 7 absent.
        let write = async { cache.set_one(7, 70, true).await };
        let read = async {
            cache.backend().parked.notified().await;
            let stale = reader.get_one(7).await;
            cache.backend().release.notify_one();
            stale
        };
        let (written, stale) = tokio::join!(write, read);

        assert!(written.expect("Failed to set"));
        assert_eq!(stale.expect("Failed to get"), None);
        assert_eq!(cache.negative_cache().len(), 0);
        assert_eq!(cache.get_one(7).await.expect("Failed to get"), Some(70));
    }
}
