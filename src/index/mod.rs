// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

pub mod builder;
pub mod distance;
pub mod hnsw;
pub mod loaded;

pub use builder::{BuildError, IndexBuilder};
pub use hnsw::{HnswConfig, HnswError, HnswIndex};
pub use loaded::{LoadError, LoadedIndex};
