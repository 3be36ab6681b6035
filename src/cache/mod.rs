// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use crate::core::space::SpaceType;
use crate::core::types::QueryParams;
use crate::index::loaded::{LoadError, LoadedIndex};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Default byte budget for the process-wide cache instance.
const DEFAULT_CACHE_BUDGET: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Error, Clone)]
pub enum CacheError {
    #[error("Load failed: {0}")]
    Load(String),

    #[error("Entry of {requested} bytes exceeds cache budget of {budget} bytes")]
    CapacityExceeded { requested: u64, budget: u64 },

    #[error("Entry was invalidated while loading: {0}")]
    Invalidated(String),
}

/// Everything needed to load one cache entry: the index file path acting
/// as the cache key, the space the index was built for, and the query
/// parameters to apply after load.
#[derive(Debug, Clone)]
pub struct EntryContext {
    pub key: String,
    pub space: SpaceType,
    pub query_params: QueryParams,
}

impl EntryContext {
    pub fn new(key: impl Into<String>, space: SpaceType) -> Self {
        Self {
            key: key.into(),
            space,
            query_params: QueryParams::default(),
        }
    }

    pub fn with_query_params(mut self, query_params: QueryParams) -> Self {
        self.query_params = query_params;
        self
    }
}

/// Strategy for materializing a cache entry from storage.
#[async_trait]
pub trait IndexLoader: Send + Sync {
    async fn load(&self, ctx: &EntryContext) -> Result<LoadedIndex, LoadError>;

    /// Expected entry size in bytes, used for the pre-load capacity check.
    /// Zero when unknown.
    async fn estimate_size(&self, ctx: &EntryContext) -> u64;
}

/// Default loader: the key is a filesystem path to a persisted index.
pub struct FsIndexLoader;

#[async_trait]
impl IndexLoader for FsIndexLoader {
    async fn load(&self, ctx: &EntryContext) -> Result<LoadedIndex, LoadError> {
        LoadedIndex::load(Path::new(&ctx.key), ctx.space, &ctx.query_params).await
    }

    async fn estimate_size(&self, ctx: &EntryContext) -> u64 {
        tokio::fs::metadata(&ctx.key)
            .await
            .map(|m| m.len())
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
    pub usage_bytes: u64,
}

struct CacheEntry {
    value: Arc<LoadedIndex>,
    size: u64,
}

#[derive(Default)]
struct CacheState {
    map: HashMap<String, CacheEntry>,
    // Least recently used first
    access_order: Vec<String>,
    usage: u64,
    // Keys invalidated while their load was still in flight
    tombstones: HashSet<String>,
    stats: CacheStats,
}

impl CacheState {
    fn touch(&mut self, key: &str) {
        self.access_order.retain(|k| k != key);
        self.access_order.push(key.to_string());
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        self.access_order.retain(|k| k != key);
        let entry = self.map.remove(key)?;
        self.usage -= entry.size;
        Some(entry)
    }

    /// Evict least-recently-used entries until usage plus `headroom` fits
    /// the budget. `exclude` protects a just-inserted entry.
    fn evict_to_fit(&mut self, budget: u64, headroom: u64, exclude: Option<&str>) {
        while self.usage + headroom > budget {
            let victim = self
                .access_order
                .iter()
                .find(|k| Some(k.as_str()) != exclude)
                .cloned();
            let victim = match victim {
                Some(v) => v,
                None => break,
            };
            if let Some(entry) = self.remove(&victim) {
                entry.value.close();
                self.stats.evictions += 1;
                debug!("Evicted index entry {}", victim);
            }
        }
    }
}

type LoadSlot = Arc<Mutex<Option<Result<Arc<LoadedIndex>, CacheError>>>>;

/// Process-wide cache of loaded native indexes, keyed by index file path.
///
/// Bounded by a byte budget with least-recently-used eviction; concurrent
/// misses for the same key coalesce into a single load whose outcome every
/// waiter observes. Failures are never cached. No map-wide lock is held
/// across a load.
pub struct NativeMemoryCache {
    budget_bytes: u64,
    loader: Arc<dyn IndexLoader>,
    state: Mutex<CacheState>,
    in_flight: DashMap<String, LoadSlot>,
}

impl NativeMemoryCache {
    pub fn new(budget_bytes: u64, loader: Arc<dyn IndexLoader>) -> Self {
        Self {
            budget_bytes,
            loader,
            state: Mutex::new(CacheState::default()),
            in_flight: DashMap::new(),
        }
    }

    /// Lazily-initialized process-wide instance backed by the filesystem
    /// loader. Initialization is idempotent; there is no teardown.
    pub fn global() -> Arc<NativeMemoryCache> {
        static GLOBAL: OnceLock<Arc<NativeMemoryCache>> = OnceLock::new();
        GLOBAL
            .get_or_init(|| {
                Arc::new(NativeMemoryCache::new(
                    DEFAULT_CACHE_BUDGET,
                    Arc::new(FsIndexLoader),
                ))
            })
            .clone()
    }

    pub fn budget_bytes(&self) -> u64 {
        self.budget_bytes
    }

    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        let mut stats = state.stats.clone();
        stats.entries = state.map.len();
        stats.usage_bytes = state.usage;
        stats
    }

    /// Return the cached index for `ctx.key`, loading it on a miss.
    ///
    /// Warmup requests skip the pre-load capacity check and may overshoot
    /// the budget, evicting other entries afterward; regular requests make
    /// room first and are refused outright only when the size estimate
    /// alone exceeds the whole budget.
    pub async fn get(
        &self,
        ctx: &EntryContext,
        is_warmup: bool,
    ) -> Result<Arc<LoadedIndex>, CacheError> {
        let mut leader_guard = loop {
            if let Some(value) = self.lookup(&ctx.key).await {
                return Ok(value);
            }

            // Register as leader for this key, or wait on whoever already is.
            match self.in_flight.entry(ctx.key.clone()) {
                dashmap::mapref::entry::Entry::Occupied(occupied) => {
                    let slot = occupied.get().clone();
                    drop(occupied);
                    let guard = slot.lock().await;
                    match guard.as_ref() {
                        Some(Ok(value)) => {
                            self.touch_hit(&ctx.key).await;
                            return Ok(value.clone());
                        }
                        Some(Err(e)) => return Err(e.clone()),
                        // Leader vanished without publishing; retry as a miss
                        None => continue,
                    }
                }
                dashmap::mapref::entry::Entry::Vacant(vacant) => {
                    let slot: LoadSlot = Arc::new(Mutex::new(None));
                    let guard = slot
                        .clone()
                        .try_lock_owned()
                        .expect("fresh slot is uncontended");
                    vacant.insert(slot);
                    break guard;
                }
            }
        };

        // Another task may have published between the lookup and the
        // registration.
        if let Some(value) = self.lookup(&ctx.key).await {
            *leader_guard = Some(Ok(value.clone()));
            self.in_flight.remove(&ctx.key);
            return Ok(value);
        }

        {
            let mut state = self.state.lock().await;
            state.stats.misses += 1;
        }

        if !is_warmup {
            let estimate = self.loader.estimate_size(ctx).await;
            if estimate > self.budget_bytes {
                let err = CacheError::CapacityExceeded {
                    requested: estimate,
                    budget: self.budget_bytes,
                };
                warn!("Refusing load of {}: {}", ctx.key, err);
                self.state.lock().await.tombstones.remove(&ctx.key);
                *leader_guard = Some(Err(err.clone()));
                self.in_flight.remove(&ctx.key);
                return Err(err);
            }
            let mut state = self.state.lock().await;
            state.evict_to_fit(self.budget_bytes, estimate, None);
        }

        // The load itself runs without any cache-wide lock held.
        let result = self.loader.load(ctx).await;

        let published = match result {
            Err(e) => {
                warn!("Failed to load index {}: {}", ctx.key, e);
                // A tombstone set while this load was in flight must not
                // outlive it; the failure itself is never cached
                self.state.lock().await.tombstones.remove(&ctx.key);
                Err(CacheError::Load(e.to_string()))
            }
            Ok(index) => {
                let size = index.size_estimate();
                let value = Arc::new(index);
                let mut state = self.state.lock().await;
                if state.tombstones.remove(&ctx.key) {
                    value.close();
                    Err(CacheError::Invalidated(ctx.key.clone()))
                } else {
                    state.map.insert(
                        ctx.key.clone(),
                        CacheEntry {
                            value: value.clone(),
                            size,
                        },
                    );
                    state.touch(&ctx.key);
                    state.usage += size;
                    state.evict_to_fit(self.budget_bytes, 0, Some(&ctx.key));
                    Ok(value)
                }
            }
        };

        *leader_guard = Some(published.clone());
        self.in_flight.remove(&ctx.key);
        published
    }

    async fn lookup(&self, key: &str) -> Option<Arc<LoadedIndex>> {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.map.get(key) {
            let value = entry.value.clone();
            state.stats.hits += 1;
            state.touch(key);
            Some(value)
        } else {
            None
        }
    }

    async fn touch_hit(&self, key: &str) {
        let mut state = self.state.lock().await;
        if state.map.contains_key(key) {
            state.stats.hits += 1;
            state.touch(key);
        }
    }

    /// Close and remove the entry for `key`. A load in flight for the key
    /// completes but its result is closed and discarded.
    pub async fn invalidate(&self, key: &str) {
        let mut state = self.state.lock().await;
        match state.remove(key) {
            Some(entry) => {
                entry.value.close();
                info!("Invalidated index entry {}", key);
            }
            // No live entry: a load still in flight must not publish one
            None => {
                if self.in_flight.contains_key(key) {
                    state.tombstones.insert(key.to_string());
                }
            }
        }
    }

    /// Close and remove every entry.
    pub async fn evict_all(&self) {
        let mut state = self.state.lock().await;
        let live: HashSet<String> = state.map.keys().cloned().collect();
        let drained: Vec<CacheEntry> = state.map.drain().map(|(_, entry)| entry).collect();
        for entry in &drained {
            entry.value.close();
        }
        state.stats.evictions += drained.len() as u64;
        state.access_order.clear();
        state.usage = 0;
        for slot in self.in_flight.iter() {
            if !live.contains(slot.key()) {
                state.tombstones.insert(slot.key().clone());
            }
        }
        info!("Evicted all index entries");
    }
}
