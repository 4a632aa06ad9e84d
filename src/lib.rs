//! # cache-contract
//!
//! A backend-agnostic contract for batched key-value caching.
//!
//! ## Features
//!
//! - **Batch First:** `get_many` / `set_many` / `delete_many` make one backend call each
//! - **Backend Agnostic:** Any storage implementing `CacheBackend` plugs in
//! - **Key Normalization:** Caller keys mapped to canonical cache keys by a `KeyFunction`
//! - **Pluggable Serde:** Identity, versioned Postcard envelope, or JSON
//! - **Negative Caching:** Known-absent keys never reach the backend twice
//! - **Confirm Flag:** Choose per call between fire-and-forget and confirmed writes
//!
//! ## Quick Start
//!
//! ```ignore
//! use cache_contract::{
//!     backend::InMemoryBackend,
//!     key::PrefixedKey,
//!     negative::SetNegativeCache,
//!     serialization::PostcardSerde,
//!     CacheContract,
//! };
//!
//! // 1. Pick a backend
//! let backend = InMemoryBackend::<String, Vec<u8>>::new();
//!
//! // 2. Compose the contract
//! let cache = CacheContract::new(backend)
//!     .with_key_fn(PrefixedKey::<u64>::new("user"))
//!     .with_serde(PostcardSerde::<User>::new())
//!     .with_negative_cache(SetNegativeCache::new());
//!
//! // 3. Use it
//! cache.set_one(42, user, true).await?;
//! let user = cache.get_one(42).await?;
//! ```

#[macro_use]
extern crate log;

pub mod backend;
pub mod contract;
pub mod error;
pub mod key;
pub mod negative;
pub mod observability;
pub mod serialization;
pub mod service;

// Re-exports for convenience
pub use backend::CacheBackend;
pub use contract::CacheContract;
pub use error::{Error, Result};
pub use key::KeyFunction;
pub use negative::NegativeCache;
pub use serialization::Serde;
pub use service::CacheService;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
