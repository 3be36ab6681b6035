// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use crate::core::encoding::EncodedVector;
use serde::{Deserialize, Serialize};

/// One row of the transient build dataset: a caller-supplied id paired with
/// its encoded vector. Owned by the builder and dropped once the graph is
/// constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub vector: EncodedVector,
}

impl Document {
    pub fn new(id: i64, vector: EncodedVector) -> Self {
        Self { id, vector }
    }
}

/// A single nearest-neighbor match: the document id and the raw engine
/// distance (not score-translated).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryMatch {
    pub id: i64,
    pub distance: f32,
}

impl QueryMatch {
    pub fn new(id: i64, distance: f32) -> Self {
        QueryMatch { id, distance }
    }
}

impl PartialOrd for QueryMatch {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.distance.partial_cmp(&other.distance)
    }
}

impl Ord for QueryMatch {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    }
}

impl Eq for QueryMatch {}

/// Build-time parameters, each forwarded to the graph construction only
/// when present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildParams {
    pub ef_construction: Option<usize>,
    pub m: Option<usize>,
    pub index_thread_qty: Option<usize>,
}

/// Query-time parameters, applied to a loaded index immediately after load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryParams {
    pub ef_search: Option<usize>,
}
