// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SpaceError {
    #[error("Unable to find space: {0}")]
    UnknownSpace(String),
}

/// Storage layout a space requires from the vector encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingKind {
    /// Raw little-endian float array, one element per dimension.
    Dense,
    /// Ascending 32-bit indices of the non-zero dimensions.
    SparseIndices,
    /// One bit per dimension in 32-bit words, trailing word holds the
    /// original dimension count.
    PackedBits,
}

/// Distance metrics supported by the index engine.
///
/// Each space pairs a raw engine distance with a translation to a bounded,
/// higher-is-better similarity score. The engine-facing name differs from
/// the public identifier for `InnerProduct`, which the underlying engine
/// knows as a negated dot product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpaceType {
    L2,
    CosineSimil,
    L1,
    Linf,
    InnerProduct,
    HammingBit,
    JaccardSparse,
    BitJaccard,
}

impl SpaceType {
    pub const DEFAULT: SpaceType = SpaceType::L2;

    pub fn all() -> &'static [SpaceType] {
        &[
            SpaceType::L2,
            SpaceType::CosineSimil,
            SpaceType::L1,
            SpaceType::Linf,
            SpaceType::InnerProduct,
            SpaceType::HammingBit,
            SpaceType::JaccardSparse,
            SpaceType::BitJaccard,
        ]
    }

    /// Public identifier used in configuration and on the wire.
    pub fn value(&self) -> &'static str {
        match self {
            SpaceType::L2 => "l2",
            SpaceType::CosineSimil => "cosinesimil",
            SpaceType::L1 => "l1",
            SpaceType::Linf => "linf",
            SpaceType::InnerProduct => "innerproduct",
            SpaceType::HammingBit => "hammingbit",
            SpaceType::JaccardSparse => "jaccard_sparse",
            SpaceType::BitJaccard => "bit_jaccard",
        }
    }

    /// Name the underlying engine uses for this space. The engine scores
    /// inner product as a negated dot product, where more negative means
    /// more similar.
    pub fn engine_name(&self) -> &'static str {
        match self {
            SpaceType::InnerProduct => "negdotprod",
            other => other.value(),
        }
    }

    /// Resolve a space from its public identifier, case-insensitively.
    pub fn resolve(name: &str) -> Result<SpaceType, SpaceError> {
        for space in SpaceType::all() {
            if space.value().eq_ignore_ascii_case(name) {
                return Ok(*space);
            }
        }
        Err(SpaceError::UnknownSpace(name.to_string()))
    }

    /// Translate a raw engine distance into a bounded similarity score.
    ///
    /// Inner product distances range over all of f32 with more negative
    /// meaning more similar; the piecewise form keeps the score positive
    /// and monotonically higher for closer matches.
    pub fn score_translation(&self, raw_score: f32) -> f32 {
        match self {
            SpaceType::L2
            | SpaceType::CosineSimil
            | SpaceType::L1
            | SpaceType::Linf
            | SpaceType::HammingBit => 1.0 / (1.0 + raw_score),
            SpaceType::InnerProduct => {
                if raw_score >= 0.0 {
                    1.0 / (1.0 + raw_score)
                } else {
                    -raw_score + 1.0
                }
            }
            SpaceType::JaccardSparse | SpaceType::BitJaccard => 1.0 - raw_score,
        }
    }

    pub fn encoding(&self) -> EncodingKind {
        match self {
            SpaceType::JaccardSparse => EncodingKind::SparseIndices,
            SpaceType::BitJaccard => EncodingKind::PackedBits,
            _ => EncodingKind::Dense,
        }
    }
}

impl fmt::Display for SpaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value())
    }
}
