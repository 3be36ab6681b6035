// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

#![recursion_limit = "1024"]

pub mod cache;
pub mod core;
pub mod index;
pub mod query;
pub mod shard;
