//! Cache backend trait and implementations.
//!
//! A backend is the actual storage behind the contract. It sees only
//! canonical cache keys and stored (already serialized) values, and every
//! operation is batched so an implementation can serve each call in a
//! single round trip.

mod inmemory;

pub use inmemory::InMemoryBackend;

use crate::error::Result;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Batched storage operations every backend must provide.
///
/// # Confirm flag
///
/// Write, delete and clear take a `confirm` flag. When `false` the call
/// is fire-and-forget: the backend performs the operation but reports an
/// empty set (or `false`). When `true` the backend reports exactly which
/// keys it durably handled, which may cost an extra round trip on some
/// stores.
#[allow(async_fn_in_trait)]
pub trait CacheBackend: Send + Sync {
    /// Canonical key type.
    type Key: Eq + Hash + Clone + Send + Sync;

    /// Stored value type.
    type Value: Send + Sync;

    /// Fetch values for the given keys.
    ///
    /// Keys with no stored value are omitted from the result; a miss is
    /// never an error.
    async fn get_many(&self, keys: &[Self::Key]) -> Result<HashMap<Self::Key, Self::Value>>;

    /// Store every given pair unconditionally.
    ///
    /// Returns the written keys if `confirm` is true, otherwise an empty set.
    /// Must accept an empty mapping.
    async fn set_many(
        &self,
        entries: HashMap<Self::Key, Self::Value>,
        confirm: bool,
    ) -> Result<HashSet<Self::Key>>;

    /// Delete the given keys. Deleting a missing key is a no-op.
    ///
    /// Returns the keys that were actually removed if `confirm` is true,
    /// otherwise an empty set.
    async fn delete_many(&self, keys: &[Self::Key], confirm: bool)
        -> Result<HashSet<Self::Key>>;

    /// Remove every entry. Returns `true` only if `confirm` is true.
    async fn clear(&self, confirm: bool) -> Result<bool>;

    /// Check that the backend is reachable.
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}
