//! In-memory cache backend implementation.

use super::CacheBackend;
use crate::error::Result;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;

/// In-process reference backend.
///
/// Stores entries in a concurrent map with no expiration and no
/// eviction. Cloning shares the underlying storage, so a clone kept by
/// the caller observes everything written through the contract.
///
/// # Example
///
/// ```
/// use cache_contract::backend::{CacheBackend, InMemoryBackend};
/// use std::collections::HashMap;
///
/// # async fn example() -> cache_contract::Result<()> {
/// let backend = InMemoryBackend::<String, Vec<u8>>::new();
/// let written = backend
///     .set_many(HashMap::from([("k".to_string(), b"v".to_vec())]), true)
///     .await?;
/// assert_eq!(written.len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct InMemoryBackend<K = String, V = Vec<u8>>
where
    K: Eq + Hash,
{
    store: Arc<DashMap<K, V>>,
}

impl<K: Eq + Hash, V> Clone for InMemoryBackend<K, V> {
    fn clone(&self) -> Self {
        InMemoryBackend {
            store: Arc::clone(&self.store),
        }
    }
}

impl<K: Eq + Hash, V> InMemoryBackend<K, V> {
    /// Create an empty backend.
    pub fn new() -> Self {
        InMemoryBackend {
            store: Arc::new(DashMap::new()),
        }
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.store.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl<K: Eq + Hash, V> Default for InMemoryBackend<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> CacheBackend for InMemoryBackend<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    type Key = K;
    type Value = V;

    async fn get_many(&self, keys: &[K]) -> Result<HashMap<K, V>> {
        let found: HashMap<K, V> = keys
            .iter()
            .filter_map(|key| {
                self.store
                    .get(key)
                    .map(|entry| (key.clone(), entry.value().clone()))
            })
            .collect();

        debug!(
            "✓ InMemory GET_MANY {} keys -> {} hits",
            keys.len(),
            found.len()
        );
        Ok(found)
    }

    async fn set_many(&self, entries: HashMap<K, V>, confirm: bool) -> Result<HashSet<K>> {
        let count = entries.len();
        let mut written = HashSet::new();
        for (key, value) in entries {
            if confirm {
                written.insert(key.clone());
            }
            self.store.insert(key, value);
        }

        debug!("✓ InMemory SET_MANY {} keys", count);
        Ok(written)
    }

    async fn delete_many(&self, keys: &[K], confirm: bool) -> Result<HashSet<K>> {
        let mut deleted = HashSet::new();
        for key in keys {
            if let Some((key, _)) = self.store.remove(key) {
                if confirm {
                    deleted.insert(key);
                }
            }
        }

        debug!("✓ InMemory DELETE_MANY {} keys", keys.len());
        Ok(deleted)
    }

    async fn clear(&self, confirm: bool) -> Result<bool> {
        self.store.clear();
        warn!("⚠ InMemory CLEAR executed - all cache cleared!");
        Ok(confirm)
    }
}
