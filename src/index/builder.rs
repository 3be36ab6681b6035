// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use crate::core::encoding::{encode_batch, EncodingError};
use crate::core::space::SpaceType;
use crate::core::types::{BuildParams, Document};
use crate::index::hnsw::{HnswConfig, HnswIndex, HnswNode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

pub const INDEX_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("Number of IDs does not match number of vectors: {ids} vs {vectors}")]
    CountMismatch { ids: usize, vectors: usize },

    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Index construction failed: {0}")]
    Graph(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub version: u32,
    pub space: SpaceType,
    pub config: HnswConfig,
    pub dimension: Option<usize>,
    pub node_count: usize,
    pub entry_point: Option<i64>,
}

/// On-disk representation of a built index: one opaque CBOR blob, written
/// once and read back whole.
#[derive(Serialize, Deserialize)]
pub struct PersistedIndex {
    pub metadata: IndexMetadata,
    pub nodes: Vec<HnswNode>,
}

impl PersistedIndex {
    pub fn from_index(index: &HnswIndex) -> Self {
        Self {
            metadata: IndexMetadata {
                version: INDEX_FORMAT_VERSION,
                space: index.space(),
                config: index.config().clone(),
                dimension: index.dimension(),
                node_count: index.node_count(),
                entry_point: index.entry_point(),
            },
            nodes: index.nodes().cloned().collect(),
        }
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>, BuildError> {
        serde_cbor::to_vec(self).map_err(|e| BuildError::Serialization(e.to_string()))
    }
}

pub struct IndexBuilder;

impl IndexBuilder {
    /// Build an index from parallel id/vector arrays and persist it at
    /// `path`.
    ///
    /// The transient dataset of encoded documents is dropped whether
    /// construction succeeds or fails. A failed write may leave a
    /// truncated file behind; callers must not treat it as a valid index.
    pub async fn build(
        ids: &[i64],
        vectors: &[Vec<f32>],
        space: SpaceType,
        params: &BuildParams,
        path: &Path,
    ) -> Result<(), BuildError> {
        if ids.is_empty() {
            return Err(BuildError::MissingArgument("ids"));
        }
        if vectors.is_empty() {
            return Err(BuildError::MissingArgument("vectors"));
        }
        if ids.len() != vectors.len() {
            return Err(BuildError::CountMismatch {
                ids: ids.len(),
                vectors: vectors.len(),
            });
        }

        let encoded = encode_batch(space, vectors)?;
        let dataset: Vec<Document> = ids
            .iter()
            .zip(encoded)
            .map(|(id, vector)| Document::new(*id, vector))
            .collect();

        let config = HnswConfig::from_build_params(params);
        let mut index = HnswIndex::new(space, config);
        for document in dataset {
            index
                .insert(document.id, document.vector)
                .map_err(|e| BuildError::Graph(e.to_string()))?;
        }

        let blob = PersistedIndex::from_index(&index).to_cbor()?;
        tokio::fs::write(path, &blob).await?;

        info!(
            "Built {} index with {} documents ({} bytes) at {}",
            space,
            index.node_count(),
            blob.len(),
            path.display()
        );
        Ok(())
    }
}
