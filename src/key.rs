//! Key functions: map caller keys to canonical cache keys.
//!
//! A key function must be pure and deterministic: the same caller key
//! always yields the same cache key.

use std::fmt::Display;
use std::marker::PhantomData;

/// Maps a caller-supplied key to the canonical key the backend stores under.
pub trait KeyFunction: Send + Sync {
    /// Key type supplied by the caller.
    type Input;

    /// Canonical key type handed to the backend.
    type Output;

    /// Compute the cache key for `key`.
    fn cache_key(&self, key: &Self::Input) -> Self::Output;
}

/// Identity key function: the caller key is the cache key.
///
/// This is the default key function of [`crate::CacheContract`].
pub struct IdentityKey<K> {
    _key: PhantomData<fn() -> K>,
}

impl<K> IdentityKey<K> {
    pub fn new() -> Self {
        IdentityKey { _key: PhantomData }
    }
}

impl<K> Default for IdentityKey<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone> KeyFunction for IdentityKey<K> {
    type Input = K;
    type Output = K;

    fn cache_key(&self, key: &K) -> K {
        key.clone()
    }
}

/// Key function backed by a closure.
///
/// # Example
///
/// ```
/// use cache_contract::key::{key_fn, KeyFunction};
///
/// let lower = key_fn(|name: &String| name.to_lowercase());
/// assert_eq!(lower.cache_key(&"Alice".to_string()), "alice");
/// ```
pub struct FnKey<F, I, O> {
    func: F,
    _types: PhantomData<fn(&I) -> O>,
}

impl<F, I, O> KeyFunction for FnKey<F, I, O>
where
    F: Fn(&I) -> O + Send + Sync,
{
    type Input = I;
    type Output = O;

    fn cache_key(&self, key: &I) -> O {
        (self.func)(key)
    }
}

/// Wrap a closure as a [`KeyFunction`].
pub fn key_fn<F, I, O>(func: F) -> FnKey<F, I, O>
where
    F: Fn(&I) -> O + Send + Sync,
{
    FnKey {
        func,
        _types: PhantomData,
    }
}

/// Namespacing key function.
///
/// Final cache key format: `"{prefix}:{key}"`
pub struct PrefixedKey<K> {
    prefix: String,
    _key: PhantomData<fn() -> K>,
}

impl<K> PrefixedKey<K> {
    pub fn new(prefix: impl Into<String>) -> Self {
        PrefixedKey {
            prefix: prefix.into(),
            _key: PhantomData,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl<K: Display> KeyFunction for PrefixedKey<K> {
    type Input = K;
    type Output = String;

    fn cache_key(&self, key: &K) -> String {
        format!("{}:{}", self.prefix, key)
    }
}
