// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use crate::core::encoding::{encode, EncodingError};
use crate::core::types::QueryMatch;
use crate::index::loaded::{LoadError, LoadedIndex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("Invalid pointer to index")]
    InvalidPointer,

    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Search failed: {0}")]
    Search(String),
}

/// A scored match: the raw engine distance translated into the space's
/// bounded similarity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredMatch {
    pub id: i64,
    pub score: f32,
}

/// Orchestrates a single query: encode the raw vector for the index's
/// space, run the graph search, and return matches nearest first.
pub struct QueryEngine;

impl QueryEngine {
    /// Search for the `k` nearest documents to `raw_query`.
    ///
    /// Results are ascending by raw distance, at most
    /// `min(k, indexed documents)` of them. Distance ties keep the order
    /// the underlying search produced them in.
    pub fn search(
        index: &LoadedIndex,
        raw_query: &[f32],
        k: usize,
    ) -> Result<Vec<QueryMatch>, QueryError> {
        if raw_query.is_empty() {
            return Err(QueryError::MissingArgument("query vector"));
        }
        if index.is_closed() {
            return Err(QueryError::InvalidPointer);
        }

        let encoded = encode(index.space(), raw_query)?;
        index.search(&encoded, k).map_err(|e| match e {
            LoadError::HandleClosed => QueryError::InvalidPointer,
            other => QueryError::Search(other.to_string()),
        })
    }

    /// Like [`QueryEngine::search`], with each raw distance translated
    /// into the space's similarity score (higher is better).
    pub fn search_scored(
        index: &LoadedIndex,
        raw_query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredMatch>, QueryError> {
        let space = index.space();
        let matches = Self::search(index, raw_query, k)?;
        Ok(matches
            .into_iter()
            .map(|m| ScoredMatch {
                id: m.id,
                score: space.score_translation(m.distance),
            })
            .collect())
    }
}
