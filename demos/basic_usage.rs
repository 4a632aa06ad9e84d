//! Basic usage example of the cache contract.

use cache_contract::{
    backend::InMemoryBackend,
    error::Result,
    key::PrefixedKey,
    negative::{BoundedNegativeCache, NegativeCacheConfig, SetNegativeCache},
    observability::CacheStats,
    serialization::PostcardSerde,
    CacheContract,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Example entity: Employment
#[derive(Clone, Serialize, Deserialize, Debug)]
struct Employment {
    id: String,
    employer_name: String,
    salary: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .try_init()
        .ok();

    println!("\n=== Cache Contract - Basic Example ===\n");

    // 1. Plain contract: identity keys and values, no negative cache
    println!("1. Single-key operations on an in-memory backend:");
    let cache = CacheContract::new(InMemoryBackend::<u32, u32>::new());

    println!("   set_one(1, 2, confirm)  -> {}", cache.set_one(1, 2, true).await?);
    println!("   get_one(1)              -> {:?}", cache.get_one(1).await?);
    println!("   get_one(2)              -> {:?}", cache.get_one(2).await?);
    println!("   delete_one(1, confirm)  -> {}", cache.delete_one(1, true).await?);
    println!("   delete_one(1, no-confirm) -> {}", cache.delete_one(1, false).await?);
    println!("   get_one(1)              -> {:?}\n", cache.get_one(1).await?);

    // 2. Negative caching
    println!("2. Negative caching:");
    let cache = CacheContract::new(InMemoryBackend::<u32, u32>::new())
        .with_negative_cache(SetNegativeCache::new());

    cache.get_many([10, 11]).await?;
    println!(
        "   ✓ keys 10 and 11 known absent: {} entries in negative cache",
        cache.negative_cache().len()
    );
    cache.set_one(10, 100, true).await?;
    println!(
        "   ✓ writing key 10 un-marks it: get_one(10) -> {:?}\n",
        cache.get_one(10).await?
    );

    // 3. Typed entities with namespaced keys, postcard values and metrics
    println!("3. Typed entities:");
    let stats = Arc::new(CacheStats::new());
    let negative = BoundedNegativeCache::new(NegativeCacheConfig::from_env()?)?;
    let cache = CacheContract::new(InMemoryBackend::<String, Vec<u8>>::new())
        .with_key_fn(PrefixedKey::<String>::new("employment"))
        .with_serde(PostcardSerde::<Employment>::new())
        .with_negative_cache(negative)
        .with_metrics(Box::new(Arc::clone(&stats)));

    let confirmed = cache
        .set_many(
            [
                (
                    "emp_001".to_string(),
                    Employment {
                        id: "emp_001".to_string(),
                        employer_name: "Acme Corp".to_string(),
                        salary: 75000.0,
                    },
                ),
                (
                    "emp_002".to_string(),
                    Employment {
                        id: "emp_002".to_string(),
                        employer_name: "Tech Inc".to_string(),
                        salary: 95000.0,
                    },
                ),
            ],
            true,
        )
        .await?;
    println!("   ✓ {} employments confirmed written", confirmed.len());

    let found = cache
        .get_many(["emp_001".to_string(), "emp_003".to_string()])
        .await?;
    for emp in found.values() {
        println!(
            "   ✓ {} loaded: {} (${:.2})",
            emp.id, emp.employer_name, emp.salary
        );
    }
    cache.get_one("emp_003".to_string()).await?;

    let snapshot = stats.snapshot();
    println!(
        "   ✓ hits: {}, misses: {}, negative hits: {}, miss rate: {:.2}\n",
        snapshot.hits,
        snapshot.misses,
        snapshot.negative_hits,
        snapshot.miss_rate()
    );

    println!("=== Example Complete ===\n");

    Ok(())
}
