// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use crate::core::space::{EncodingKind, SpaceType};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EncodingError {
    #[error("Invalid dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Dimension of vectors for {space} must be > 1, got {dimension}")]
    InvalidDimension { space: SpaceType, dimension: usize },
}

/// Metric-specific storage representation of a dense float vector.
///
/// Dense spaces keep the raw floats. The two Jaccard spaces rewrite the
/// vector into a sparser form; the original engine did this in place over
/// the input buffer, here each variant owns a separate output buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EncodedVector {
    /// Identity copy of the input, one element per dimension.
    Dense(Vec<f32>),
    /// Ascending indices of the non-zero dimensions.
    SparseIndices(Vec<u32>),
    /// Packed bitset, one bit per dimension in 32-bit words. The trailing
    /// word holds the original dimension count so the decoder can tell
    /// padding bits from real ones.
    PackedBits(Vec<u32>),
}

impl EncodedVector {
    /// Number of dimensions of the source vector.
    pub fn dimension(&self) -> usize {
        match self {
            EncodedVector::Dense(data) => data.len(),
            // The index list alone cannot recover the dimension; report
            // the minimal dimension consistent with the indices.
            EncodedVector::SparseIndices(indices) => {
                indices.last().map(|i| *i as usize + 1).unwrap_or(0)
            }
            EncodedVector::PackedBits(words) => {
                words.last().map(|d| *d as usize).unwrap_or(0)
            }
        }
    }

    pub fn as_dense(&self) -> Option<&[f32]> {
        match self {
            EncodedVector::Dense(data) => Some(data),
            _ => None,
        }
    }

    /// Positions of set bits, excluding the trailing dimension word.
    pub fn set_bit_positions(&self) -> Vec<u32> {
        match self {
            EncodedVector::PackedBits(words) if !words.is_empty() => {
                let dim = *words.last().unwrap() as usize;
                let mut positions = Vec::new();
                for i in 0..dim {
                    let word = i / 32;
                    let shift = i & 31;
                    if words[word] & (1 << shift) != 0 {
                        positions.push(i as u32);
                    }
                }
                positions
            }
            _ => Vec::new(),
        }
    }

    /// Approximate in-memory footprint in bytes.
    pub fn size_bytes(&self) -> usize {
        match self {
            EncodedVector::Dense(data) => data.len() * std::mem::size_of::<f32>(),
            EncodedVector::SparseIndices(indices) => indices.len() * std::mem::size_of::<u32>(),
            EncodedVector::PackedBits(words) => words.len() * std::mem::size_of::<u32>(),
        }
    }
}

/// Encode a raw vector into the layout its space requires.
pub fn encode(space: SpaceType, raw: &[f32]) -> Result<EncodedVector, EncodingError> {
    match space.encoding() {
        EncodingKind::Dense => Ok(EncodedVector::Dense(raw.to_vec())),
        EncodingKind::SparseIndices => {
            let indices: Vec<u32> = raw
                .iter()
                .enumerate()
                .filter(|(_, v)| **v != 0.0)
                .map(|(i, _)| i as u32)
                .collect();
            Ok(EncodedVector::SparseIndices(indices))
        }
        EncodingKind::PackedBits => {
            let dim = raw.len();
            if dim < 2 {
                return Err(EncodingError::InvalidDimension {
                    space,
                    dimension: dim,
                });
            }
            let mut words = Vec::with_capacity(dim / 32 + 2);
            for (i, elem) in raw.iter().enumerate() {
                let shift = i & 31;
                if shift == 0 {
                    words.push(0u32);
                }
                if *elem != 0.0 {
                    *words.last_mut().unwrap() |= 1 << shift;
                }
            }
            words.push(dim as u32);
            Ok(EncodedVector::PackedBits(words))
        }
    }
}

/// Encode a batch of vectors, enforcing a uniform dimension across the
/// batch. The first vector fixes the expected dimension.
pub fn encode_batch(
    space: SpaceType,
    vectors: &[Vec<f32>],
) -> Result<Vec<EncodedVector>, EncodingError> {
    let mut encoded = Vec::with_capacity(vectors.len());
    let mut expected = None;
    for raw in vectors {
        match expected {
            None => expected = Some(raw.len()),
            Some(dim) if dim != raw.len() => {
                return Err(EncodingError::DimensionMismatch {
                    expected: dim,
                    actual: raw.len(),
                });
            }
            _ => {}
        }
        encoded.push(encode(space, raw)?);
    }
    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_encode_is_identity() {
        let raw = vec![1.5, -2.0, 0.0, 3.25];
        let encoded = encode(SpaceType::L2, &raw).unwrap();
        assert_eq!(encoded, EncodedVector::Dense(raw.clone()));
        assert_eq!(encoded.as_dense().unwrap(), raw.as_slice());
        assert_eq!(encoded.dimension(), 4);
    }

    #[test]
    fn test_sparse_encode_collects_nonzero_indices() {
        let raw = vec![0.0, 1.0, 0.0, 0.5, -3.0, 0.0];
        let encoded = encode(SpaceType::JaccardSparse, &raw).unwrap();
        assert_eq!(encoded, EncodedVector::SparseIndices(vec![1, 3, 4]));
    }

    #[test]
    fn test_sparse_encode_all_zero() {
        let encoded = encode(SpaceType::JaccardSparse, &[0.0, 0.0, 0.0]).unwrap();
        assert_eq!(encoded, EncodedVector::SparseIndices(vec![]));
    }

    #[test]
    fn test_bit_encode_sets_expected_bits() {
        let mut raw = vec![0.0f32; 40];
        raw[0] = 1.0;
        raw[31] = 2.0;
        raw[32] = -1.0;
        raw[39] = 0.25;
        let encoded = encode(SpaceType::BitJaccard, &raw).unwrap();
        match &encoded {
            EncodedVector::PackedBits(words) => {
                assert_eq!(words.len(), 3);
                assert_eq!(words[0], (1 << 0) | (1 << 31));
                assert_eq!(words[1], (1 << 0) | (1 << 7));
                assert_eq!(words[2], 40);
            }
            other => panic!("expected packed bits, got {:?}", other),
        }
        assert_eq!(encoded.set_bit_positions(), vec![0, 31, 32, 39]);
        assert_eq!(encoded.dimension(), 40);
    }

    #[test]
    fn test_bit_encode_flushes_trailing_word() {
        // 33 dims: second word exists even though only bit 0 of it is used
        let mut raw = vec![0.0f32; 33];
        raw[1] = 1.0;
        let encoded = encode(SpaceType::BitJaccard, &raw).unwrap();
        match encoded {
            EncodedVector::PackedBits(words) => {
                assert_eq!(words, vec![1 << 1, 0, 33]);
            }
            other => panic!("expected packed bits, got {:?}", other),
        }
    }

    #[test]
    fn test_bit_encode_rejects_dim_below_two() {
        let err = encode(SpaceType::BitJaccard, &[1.0]).unwrap_err();
        assert_eq!(
            err,
            EncodingError::InvalidDimension {
                space: SpaceType::BitJaccard,
                dimension: 1,
            }
        );
    }

    #[test]
    fn test_batch_rejects_inconsistent_dimension() {
        let vectors = vec![vec![1.0, 2.0], vec![1.0, 2.0, 3.0]];
        let err = encode_batch(SpaceType::L2, &vectors).unwrap_err();
        assert_eq!(
            err,
            EncodingError::DimensionMismatch {
                expected: 2,
                actual: 3,
            }
        );
    }

    #[test]
    fn test_batch_preserves_order() {
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let encoded = encode_batch(SpaceType::L2, &vectors).unwrap();
        assert_eq!(encoded.len(), 2);
        assert_eq!(encoded[0].as_dense().unwrap(), &[1.0, 0.0]);
        assert_eq!(encoded[1].as_dense().unwrap(), &[0.0, 1.0]);
    }
}
