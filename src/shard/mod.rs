// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use crate::cache::{CacheError, EntryContext, NativeMemoryCache};
use crate::core::space::SpaceType;
use crate::core::types::QueryParams;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum WarmupError {
    #[error("Discovery failed: {0}")]
    Discovery(String),
}

/// Integration seam: the search engine side knows which on-disk index
/// files belong to a shard and which space each was built for.
#[async_trait]
pub trait EngineFileDiscovery: Send + Sync {
    /// Name of the shard's index, for logging.
    fn index_name(&self) -> &str;

    /// All `(file path, space)` pairs eligible for warmup.
    async fn engine_files(&self) -> Result<Vec<(String, SpaceType)>, WarmupError>;
}

/// Outcome of warming one shard: keys that loaded and keys that failed,
/// with the failure kept per key instead of aborting the rest.
#[derive(Debug, Default)]
pub struct WarmupReport {
    pub loaded: Vec<String>,
    pub failed: Vec<(String, CacheError)>,
}

/// Proactively populates the cache with a shard's indexes before queries
/// arrive.
pub struct ShardWarmer {
    cache: Arc<NativeMemoryCache>,
    query_params: QueryParams,
}

impl ShardWarmer {
    pub fn new(cache: Arc<NativeMemoryCache>) -> Self {
        Self {
            cache,
            query_params: QueryParams::default(),
        }
    }

    pub fn with_query_params(mut self, query_params: QueryParams) -> Self {
        self.query_params = query_params;
        self
    }

    pub async fn warmup(
        &self,
        discovery: &dyn EngineFileDiscovery,
    ) -> Result<WarmupReport, WarmupError> {
        info!("Warming up index: {}", discovery.index_name());
        let mut report = WarmupReport::default();

        for (path, space) in discovery.engine_files().await? {
            let ctx = EntryContext::new(&path, space)
                .with_query_params(self.query_params.clone());
            match self.cache.get(&ctx, true).await {
                Ok(_) => report.loaded.push(path),
                Err(e) => {
                    warn!("Warmup failed for {}: {}", path, e);
                    report.failed.push((path, e));
                }
            }
        }

        info!(
            "Warmup of {} finished: {} loaded, {} failed",
            discovery.index_name(),
            report.loaded.len(),
            report.failed.len()
        );
        Ok(report)
    }
}
