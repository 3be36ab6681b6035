// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use async_trait::async_trait;
use futures::future::join_all;
use knn_native::cache::{
    CacheError, EntryContext, FsIndexLoader, IndexLoader, NativeMemoryCache,
};
use knn_native::core::space::SpaceType;
use knn_native::core::types::BuildParams;
use knn_native::index::builder::IndexBuilder;
use knn_native::index::loaded::{LoadError, LoadedIndex};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Filesystem loader that counts invocations and can slow each load down,
/// so tests can observe single-flight behavior.
struct CountingLoader {
    inner: FsIndexLoader,
    loads: AtomicUsize,
    delay: Duration,
}

impl CountingLoader {
    fn new(delay: Duration) -> Self {
        Self {
            inner: FsIndexLoader,
            loads: AtomicUsize::new(0),
            delay,
        }
    }

    fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IndexLoader for CountingLoader {
    async fn load(&self, ctx: &EntryContext) -> Result<LoadedIndex, LoadError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.inner.load(ctx).await
    }

    async fn estimate_size(&self, ctx: &EntryContext) -> u64 {
        self.inner.estimate_size(ctx).await
    }
}

async fn build_index(dir: &TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    let vectors: Vec<Vec<f32>> = (0..8).map(|i| vec![i as f32, 0.0, 1.0, 2.0]).collect();
    let ids: Vec<i64> = (0..8).collect();
    IndexBuilder::build(&ids, &vectors, SpaceType::L2, &BuildParams::default(), &path)
        .await
        .unwrap();
    path
}

#[tokio::test]
async fn test_fifty_concurrent_gets_trigger_one_load() {
    let dir = TempDir::new().unwrap();
    let path = build_index(&dir, "shared.knn").await;
    let loader = Arc::new(CountingLoader::new(Duration::from_millis(100)));
    let cache = Arc::new(NativeMemoryCache::new(u64::MAX, loader.clone()));
    let ctx = EntryContext::new(path.to_string_lossy(), SpaceType::L2);

    let tasks: Vec<_> = (0..50)
        .map(|_| {
            let cache = cache.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move { cache.get(&ctx, false).await })
        })
        .collect();

    let results: Vec<Arc<LoadedIndex>> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    assert_eq!(results.len(), 50);
    assert_eq!(loader.load_count(), 1);
    // Every caller observes the very same entry
    for handle in &results[1..] {
        assert!(Arc::ptr_eq(&results[0], handle));
    }
}

#[tokio::test]
async fn test_load_failure_propagates_to_all_waiters_then_allows_retry() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("not_built_yet.knn");
    let loader = Arc::new(CountingLoader::new(Duration::from_millis(100)));
    let cache = Arc::new(NativeMemoryCache::new(u64::MAX, loader.clone()));
    let ctx = EntryContext::new(missing.to_string_lossy(), SpaceType::L2);

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let cache = cache.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move { cache.get(&ctx, false).await })
        })
        .collect();

    for result in join_all(tasks).await {
        assert!(matches!(result.unwrap(), Err(CacheError::Load(_))));
    }
    assert_eq!(loader.load_count(), 1);

    // Failures are not cached: once the file exists a retry loads it
    build_index(&dir, "not_built_yet.knn").await;
    assert!(cache.get(&ctx, false).await.is_ok());
    assert_eq!(loader.load_count(), 2);
}

#[tokio::test]
async fn test_eviction_under_byte_budget() {
    let dir = TempDir::new().unwrap();
    let path_a = build_index(&dir, "a.knn").await;
    let path_b = build_index(&dir, "b.knn").await;
    let size_a = std::fs::metadata(&path_a).unwrap().len();
    let size_b = std::fs::metadata(&path_b).unwrap().len();

    // Room for one index at a time
    let loader = Arc::new(CountingLoader::new(Duration::ZERO));
    let cache = NativeMemoryCache::new(size_a.max(size_b) + 1, loader.clone());
    let ctx_a = EntryContext::new(path_a.to_string_lossy(), SpaceType::L2);
    let ctx_b = EntryContext::new(path_b.to_string_lossy(), SpaceType::L2);

    let first_a = cache.get(&ctx_a, false).await.unwrap();
    cache.get(&ctx_b, false).await.unwrap();

    // Loading B had to evict A, closing it
    assert!(first_a.is_closed());
    let stats = cache.stats().await;
    assert_eq!(stats.evictions, 1);
    assert_eq!(stats.entries, 1);

    // A fresh get for A reloads it rather than reusing the closed entry
    let second_a = cache.get(&ctx_a, false).await.unwrap();
    assert!(!second_a.is_closed());
    assert!(!Arc::ptr_eq(&first_a, &second_a));
    assert_eq!(loader.load_count(), 3);
}

#[tokio::test]
async fn test_warmup_may_exceed_budget_and_evicts_afterward() {
    let dir = TempDir::new().unwrap();
    let path_a = build_index(&dir, "a.knn").await;
    let path_b = build_index(&dir, "b.knn").await;
    let size_a = std::fs::metadata(&path_a).unwrap().len();

    let loader = Arc::new(CountingLoader::new(Duration::ZERO));
    let cache = NativeMemoryCache::new(size_a + 1, loader);
    let ctx_a = EntryContext::new(path_a.to_string_lossy(), SpaceType::L2);
    let ctx_b = EntryContext::new(path_b.to_string_lossy(), SpaceType::L2);

    let a = cache.get(&ctx_a, true).await.unwrap();
    let b = cache.get(&ctx_b, true).await.unwrap();

    // The warmup load went through and pushed A out instead of refusing
    assert!(a.is_closed());
    assert!(!b.is_closed());
    assert_eq!(cache.stats().await.entries, 1);
}

#[tokio::test]
async fn test_invalidate_during_in_flight_load_discards_result() {
    let dir = TempDir::new().unwrap();
    let path = build_index(&dir, "inflight.knn").await;
    let loader = Arc::new(CountingLoader::new(Duration::from_millis(200)));
    let cache = Arc::new(NativeMemoryCache::new(u64::MAX, loader));
    let ctx = EntryContext::new(path.to_string_lossy(), SpaceType::L2);

    let task = {
        let cache = cache.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move { cache.get(&ctx, false).await })
    };

    // Let the load start, then invalidate its key
    tokio::time::sleep(Duration::from_millis(50)).await;
    cache.invalidate(&ctx.key).await;

    assert!(matches!(
        task.await.unwrap(),
        Err(CacheError::Invalidated(_))
    ));
    assert_eq!(cache.stats().await.entries, 0);
}

#[tokio::test]
async fn test_invalidate_during_failing_load_does_not_poison_later_gets() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("rebuilt.knn");
    let loader = Arc::new(CountingLoader::new(Duration::from_millis(200)));
    let cache = Arc::new(NativeMemoryCache::new(u64::MAX, loader));
    let ctx = EntryContext::new(missing.to_string_lossy(), SpaceType::L2);

    // The in-flight load is doomed (no file yet); invalidate it anyway
    let task = {
        let cache = cache.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move { cache.get(&ctx, false).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    cache.invalidate(&ctx.key).await;
    assert!(task.await.unwrap().is_err());

    // The invalidation must not outlive the failed load: once the file
    // exists a fresh get loads and caches it
    build_index(&dir, "rebuilt.knn").await;
    let index = cache.get(&ctx, false).await.unwrap();
    assert!(!index.is_closed());
    assert_eq!(cache.stats().await.entries, 1);
}
