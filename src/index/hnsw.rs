// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use crate::core::encoding::EncodedVector;
use crate::core::space::SpaceType;
use crate::core::types::{BuildParams, QueryMatch};
use crate::index::distance::raw_distance;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum HnswError {
    #[error("Document with id {0} already exists")]
    DuplicateId(i64),

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Graph corrupted: {0}")]
    GraphCorrupted(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HnswConfig {
    pub max_connections: usize,
    pub max_connections_layer_0: usize,
    pub ef_construction: usize,
    /// Accepted for engine compatibility; graph construction here runs on
    /// the calling thread.
    pub index_thread_qty: Option<usize>,
    pub seed: Option<u64>,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            max_connections: 16,
            max_connections_layer_0: 32,
            ef_construction: 200,
            index_thread_qty: None,
            seed: None,
        }
    }
}

impl HnswConfig {
    /// Build a config from caller parameters, forwarding each one only
    /// when present.
    pub fn from_build_params(params: &BuildParams) -> Self {
        let mut config = HnswConfig::default();
        if let Some(ef) = params.ef_construction {
            config.ef_construction = ef;
        }
        if let Some(m) = params.m {
            config.max_connections = m;
            config.max_connections_layer_0 = m * 2;
        }
        config.index_thread_qty = params.index_thread_qty;
        config
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswNode {
    id: i64,
    vector: EncodedVector,
    level: usize,
    // neighbors[i] = neighbor ids at layer i
    neighbors: Vec<Vec<i64>>,
}

impl HnswNode {
    fn new(id: i64, vector: EncodedVector, level: usize) -> Self {
        Self {
            id,
            vector,
            level,
            neighbors: vec![Vec::new(); level + 1],
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn vector(&self) -> &EncodedVector {
        &self.vector
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn neighbors(&self, layer: usize) -> &[i64] {
        &self.neighbors[layer]
    }
}

#[derive(Clone, PartialEq)]
struct Candidate {
    id: i64,
    distance: f32,
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.distance.partial_cmp(&other.distance)
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other).unwrap_or(Ordering::Equal)
    }
}

/// Graph-based approximate nearest neighbor index over encoded vectors,
/// parameterized by the space whose distance it searches under.
pub struct HnswIndex {
    space: SpaceType,
    config: HnswConfig,
    nodes: HashMap<i64, HnswNode>,
    entry_point: Option<i64>,
    dimension: Option<usize>,
    rng: StdRng,
}

impl HnswIndex {
    pub fn new(space: SpaceType, config: HnswConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            space,
            config,
            nodes: HashMap::new(),
            entry_point: None,
            dimension: None,
            rng,
        }
    }

    pub fn space(&self) -> SpaceType {
        self.space
    }

    pub fn config(&self) -> &HnswConfig {
        &self.config
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn entry_point(&self) -> Option<i64> {
        self.entry_point
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn nodes(&self) -> impl Iterator<Item = &HnswNode> {
        self.nodes.values()
    }

    /// Approximate in-memory footprint of the stored vectors in bytes.
    pub fn vector_bytes(&self) -> usize {
        self.nodes.values().map(|n| n.vector.size_bytes()).sum()
    }

    fn assign_level(&mut self) -> usize {
        // Geometric level distribution, ~59% of nodes at level 0
        let p = 0.408;
        let mut level = 0;
        while self.rng.gen::<f64>() < p {
            level += 1;
        }
        level
    }

    /// Dimension is only recoverable from dense and bit-packed layouts;
    /// sparse index lists are validated upstream at encode time.
    fn known_dimension(vector: &EncodedVector) -> Option<usize> {
        match vector {
            EncodedVector::Dense(_) | EncodedVector::PackedBits(_) => Some(vector.dimension()),
            EncodedVector::SparseIndices(_) => None,
        }
    }

    fn check_dimension(&mut self, vector: &EncodedVector) -> Result<(), HnswError> {
        if let Some(actual) = Self::known_dimension(vector) {
            match self.dimension {
                Some(expected) if expected != actual => {
                    return Err(HnswError::DimensionMismatch { expected, actual });
                }
                None => self.dimension = Some(actual),
                _ => {}
            }
        }
        Ok(())
    }

    pub fn insert(&mut self, id: i64, vector: EncodedVector) -> Result<(), HnswError> {
        if self.nodes.contains_key(&id) {
            return Err(HnswError::DuplicateId(id));
        }
        self.check_dimension(&vector)?;

        let level = self.assign_level();
        let mut node = HnswNode::new(id, vector, level);

        let entry_point = match self.entry_point {
            Some(ep) => ep,
            None => {
                self.entry_point = Some(id);
                self.nodes.insert(id, node);
                return Ok(());
            }
        };

        let entry_level = self
            .nodes
            .get(&entry_point)
            .map(|n| n.level)
            .ok_or_else(|| HnswError::GraphCorrupted("entry point missing".to_string()))?;

        // Greedy descent through the layers above the new node's level
        let mut nearest = entry_point;
        for lc in ((level + 1)..=entry_level).rev() {
            let found = self.search_layer(&node.vector, nearest, 1, lc);
            if let Some(best) = found.first() {
                nearest = best.id;
            }
        }

        // Connect at every layer the new node participates in
        for lc in (0..=level.min(entry_level)).rev() {
            let candidates =
                self.search_layer(&node.vector, nearest, self.config.ef_construction, lc);
            if let Some(best) = candidates.first() {
                nearest = best.id;
            }

            let m = if lc == 0 {
                self.config.max_connections_layer_0
            } else {
                self.config.max_connections
            };
            let selected: Vec<i64> = candidates.iter().take(m).map(|c| c.id).collect();

            for neighbor_id in &selected {
                node.neighbors[lc].push(*neighbor_id);
            }

            // Back-links, pruning neighbors that overflow their budget
            for neighbor_id in selected {
                let overflow = {
                    let neighbor = match self.nodes.get_mut(&neighbor_id) {
                        Some(n) => n,
                        None => continue,
                    };
                    if neighbor.level < lc {
                        continue;
                    }
                    neighbor.neighbors[lc].push(id);
                    neighbor.neighbors[lc].len() > m
                };
                if overflow {
                    self.prune_neighbor(neighbor_id, lc, m, id, &node.vector);
                }
            }
        }

        let new_level = node.level;
        self.nodes.insert(id, node);
        if new_level > entry_level {
            self.entry_point = Some(id);
        }
        Ok(())
    }

    /// Keep only the `m` closest connections of `neighbor_id` at `layer`.
    /// The freshly inserted node is not in the map yet, so its vector is
    /// passed in separately.
    fn prune_neighbor(
        &mut self,
        neighbor_id: i64,
        layer: usize,
        m: usize,
        new_id: i64,
        new_vector: &EncodedVector,
    ) {
        let (base_vector, connected) = match self.nodes.get(&neighbor_id) {
            Some(n) => (n.vector.clone(), n.neighbors[layer].clone()),
            None => return,
        };
        let mut scored: Vec<Candidate> = connected
            .iter()
            .map(|&cid| {
                let vector = if cid == new_id {
                    new_vector
                } else {
                    match self.nodes.get(&cid) {
                        Some(n) => &n.vector,
                        None => return Candidate {
                            id: cid,
                            distance: f32::MAX,
                        },
                    }
                };
                Candidate {
                    id: cid,
                    distance: raw_distance(self.space, &base_vector, vector),
                }
            })
            .collect();
        scored.sort();
        scored.truncate(m);
        if let Some(neighbor) = self.nodes.get_mut(&neighbor_id) {
            neighbor.neighbors[layer] = scored.into_iter().map(|c| c.id).collect();
        }
    }

    /// Best-first search restricted to one layer. Returns candidates in
    /// ascending distance order, at most `ef` of them.
    fn search_layer(
        &self,
        query: &EncodedVector,
        entry_point: i64,
        ef: usize,
        layer: usize,
    ) -> Vec<Candidate> {
        let entry_node = match self.nodes.get(&entry_point) {
            Some(n) => n,
            None => return Vec::new(),
        };

        let entry = Candidate {
            id: entry_point,
            distance: raw_distance(self.space, query, &entry_node.vector),
        };

        let mut visited: HashSet<i64> = HashSet::new();
        visited.insert(entry_point);

        // candidates: nearest-first; results: bounded, farthest on top
        let mut candidates: BinaryHeap<std::cmp::Reverse<Candidate>> = BinaryHeap::new();
        let mut results: BinaryHeap<Candidate> = BinaryHeap::new();
        candidates.push(std::cmp::Reverse(entry.clone()));
        results.push(entry);

        while let Some(std::cmp::Reverse(current)) = candidates.pop() {
            let farthest = results.peek().map(|c| c.distance).unwrap_or(f32::MAX);
            if current.distance > farthest && results.len() >= ef {
                break;
            }

            let node = match self.nodes.get(&current.id) {
                Some(n) => n,
                None => continue,
            };
            if node.level < layer {
                continue;
            }

            for &neighbor_id in node.neighbors(layer) {
                if !visited.insert(neighbor_id) {
                    continue;
                }
                let neighbor = match self.nodes.get(&neighbor_id) {
                    Some(n) => n,
                    None => continue,
                };
                let distance = raw_distance(self.space, query, &neighbor.vector);
                let farthest = results.peek().map(|c| c.distance).unwrap_or(f32::MAX);
                if results.len() < ef || distance < farthest {
                    let candidate = Candidate {
                        id: neighbor_id,
                        distance,
                    };
                    candidates.push(std::cmp::Reverse(candidate.clone()));
                    results.push(candidate);
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        results.into_sorted_vec()
    }

    /// Search for the `k` nearest documents. Results come back ascending
    /// by raw distance, at most `min(k, node_count)` of them.
    pub fn search(
        &self,
        query: &EncodedVector,
        k: usize,
        ef: usize,
    ) -> Result<Vec<QueryMatch>, HnswError> {
        let entry_point = match self.entry_point {
            Some(ep) => ep,
            None => return Ok(Vec::new()),
        };

        if let (Some(expected), Some(actual)) = (self.dimension, Self::known_dimension(query)) {
            if expected != actual {
                return Err(HnswError::DimensionMismatch { expected, actual });
            }
        }

        let entry_level = self
            .nodes
            .get(&entry_point)
            .map(|n| n.level)
            .ok_or_else(|| HnswError::GraphCorrupted("entry point missing".to_string()))?;

        let mut nearest = entry_point;
        for lc in (1..=entry_level).rev() {
            let found = self.search_layer(query, nearest, 1, lc);
            if let Some(best) = found.first() {
                nearest = best.id;
            }
        }

        let mut matches = self.search_layer(query, nearest, ef.max(k), 0);
        matches.truncate(k);
        Ok(matches
            .into_iter()
            .map(|c| QueryMatch::new(c.id, c.distance))
            .collect())
    }

    /// Reinsert a node exactly as persisted, without rebuilding edges.
    pub fn restore_node(&mut self, node: HnswNode) -> Result<(), HnswError> {
        if self.nodes.contains_key(&node.id) {
            return Err(HnswError::DuplicateId(node.id));
        }
        if let Some(actual) = Self::known_dimension(&node.vector) {
            if self.dimension.is_none() {
                self.dimension = Some(actual);
            }
        }
        self.nodes.insert(node.id, node);
        Ok(())
    }

    pub fn set_entry_point(&mut self, id: i64) {
        self.entry_point = Some(id);
    }
}
