// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use crate::core::encoding::EncodedVector;
use crate::core::space::SpaceType;
use crate::core::types::{QueryMatch, QueryParams};
use crate::index::builder::{PersistedIndex, INDEX_FORMAT_VERSION};
use crate::index::hnsw::{HnswError, HnswIndex};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::debug;

const DEFAULT_EF_SEARCH: usize = 100;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed index file: {0}")]
    Malformed(String),

    #[error("Incompatible version: found {found}, expected {expected}")]
    IncompatibleVersion { found: u32, expected: u32 },

    #[error("Index was built for space {found}, requested {requested}")]
    SpaceMismatch {
        found: SpaceType,
        requested: SpaceType,
    },

    #[error("Index handle is closed")]
    HandleClosed,

    #[error("Search failed: {0}")]
    Search(String),
}

/// A deserialized index bound to its space and query-time parameters.
///
/// Exactly one cache entry owns a `LoadedIndex`; callers only ever borrow
/// it through a reference-counted handle. `close` invalidates the handle
/// for subsequent searches while the memory itself is reclaimed when the
/// last borrow drops.
pub struct LoadedIndex {
    space: SpaceType,
    graph: HnswIndex,
    ef_search: usize,
    size_estimate: u64,
    closed: AtomicBool,
}

impl fmt::Debug for LoadedIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedIndex")
            .field("space", &self.space)
            .field("node_count", &self.graph.node_count())
            .field("ef_search", &self.ef_search)
            .field("size_estimate", &self.size_estimate)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl LoadedIndex {
    /// Deserialize the index file at `path` and apply query parameters.
    ///
    /// Any partially built state is dropped before an error propagates.
    pub async fn load(
        path: &Path,
        space: SpaceType,
        query_params: &QueryParams,
    ) -> Result<LoadedIndex, LoadError> {
        let bytes = tokio::fs::read(path).await?;
        let size_estimate = bytes.len() as u64;

        let blob: PersistedIndex =
            serde_cbor::from_slice(&bytes).map_err(|e| LoadError::Malformed(e.to_string()))?;

        if blob.metadata.version != INDEX_FORMAT_VERSION {
            return Err(LoadError::IncompatibleVersion {
                found: blob.metadata.version,
                expected: INDEX_FORMAT_VERSION,
            });
        }
        if blob.metadata.space != space {
            return Err(LoadError::SpaceMismatch {
                found: blob.metadata.space,
                requested: space,
            });
        }

        let mut graph = HnswIndex::new(space, blob.metadata.config.clone());
        for node in blob.nodes {
            graph
                .restore_node(node)
                .map_err(|e| LoadError::Malformed(e.to_string()))?;
        }
        if let Some(entry_point) = blob.metadata.entry_point {
            graph.set_entry_point(entry_point);
        }

        let ef_search = query_params.ef_search.unwrap_or(DEFAULT_EF_SEARCH);
        debug!(
            "Loaded {} index from {} ({} nodes, {} bytes, efSearch={})",
            space,
            path.display(),
            graph.node_count(),
            size_estimate,
            ef_search
        );

        Ok(LoadedIndex {
            space,
            graph,
            ef_search,
            size_estimate,
            closed: AtomicBool::new(false),
        })
    }

    pub fn space(&self) -> SpaceType {
        self.space
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.graph.dimension()
    }

    pub fn ef_search(&self) -> usize {
        self.ef_search
    }

    /// Index file byte size, used as a proxy for the in-memory footprint.
    pub fn size_estimate(&self) -> u64 {
        self.size_estimate
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Invalidate the handle. Safe to call more than once; searches after
    /// close fail while outstanding borrows keep the memory alive.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("Closed {} index handle", self.space);
        }
    }

    /// Search with an already-encoded query. Results are ascending by raw
    /// distance, at most `min(k, node_count)` of them.
    pub fn search(
        &self,
        query: &EncodedVector,
        k: usize,
    ) -> Result<Vec<QueryMatch>, LoadError> {
        if self.is_closed() {
            return Err(LoadError::HandleClosed);
        }
        self.graph
            .search(query, k, self.ef_search)
            .map_err(|e: HnswError| LoadError::Search(e.to_string()))
    }
}
