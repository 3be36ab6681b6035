// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use crate::core::encoding::EncodedVector;
use crate::core::space::SpaceType;

/// Raw engine distance between two encoded vectors under the given space.
///
/// Callers guarantee both vectors were encoded for `space`; mismatched
/// representations fall back to the maximum distance rather than panic.
pub fn raw_distance(space: SpaceType, a: &EncodedVector, b: &EncodedVector) -> f32 {
    match (space, a, b) {
        (SpaceType::L2, EncodedVector::Dense(x), EncodedVector::Dense(y)) => euclidean(x, y),
        (SpaceType::L1, EncodedVector::Dense(x), EncodedVector::Dense(y)) => manhattan(x, y),
        (SpaceType::Linf, EncodedVector::Dense(x), EncodedVector::Dense(y)) => chebyshev(x, y),
        (SpaceType::CosineSimil, EncodedVector::Dense(x), EncodedVector::Dense(y)) => {
            1.0 - cosine_similarity(x, y)
        }
        (SpaceType::InnerProduct, EncodedVector::Dense(x), EncodedVector::Dense(y)) => {
            // Negated dot product: more negative means more similar.
            -dot_product(x, y)
        }
        (SpaceType::HammingBit, EncodedVector::Dense(x), EncodedVector::Dense(y)) => {
            hamming(x, y)
        }
        (
            SpaceType::JaccardSparse,
            EncodedVector::SparseIndices(x),
            EncodedVector::SparseIndices(y),
        ) => jaccard_sparse(x, y),
        (SpaceType::BitJaccard, EncodedVector::PackedBits(x), EncodedVector::PackedBits(y)) => {
            jaccard_bits(x, y)
        }
        _ => f32::MAX,
    }
}

pub fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

pub fn manhattan(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum()
}

pub fn chebyshev(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f32::max)
}

pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot = dot_product(a, b);
    let mag_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

/// Count of positions whose values differ.
pub fn hamming(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).filter(|(x, y)| x != y).count() as f32
}

/// Jaccard distance over ascending non-zero index lists.
pub fn jaccard_sparse(a: &[u32], b: &[u32]) -> f32 {
    let mut intersection = 0usize;
    let (mut i, mut j) = (0usize, 0usize);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Equal => {
                intersection += 1;
                i += 1;
                j += 1;
            }
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
        }
    }
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        return 0.0;
    }
    1.0 - intersection as f32 / union as f32
}

/// Jaccard distance over packed bit words. The trailing word of each
/// buffer is the dimension count, not bit data.
pub fn jaccard_bits(a: &[u32], b: &[u32]) -> f32 {
    let a_bits = &a[..a.len().saturating_sub(1)];
    let b_bits = &b[..b.len().saturating_sub(1)];
    let words = a_bits.len().min(b_bits.len());
    let mut intersection = 0u32;
    let mut union = 0u32;
    for i in 0..words {
        intersection += (a_bits[i] & b_bits[i]).count_ones();
        union += (a_bits[i] | b_bits[i]).count_ones();
    }
    for word in &a_bits[words..] {
        union += word.count_ones();
    }
    for word in &b_bits[words..] {
        union += word.count_ones();
    }
    if union == 0 {
        return 0.0;
    }
    1.0 - intersection as f32 / union as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::encoding::encode;
    use approx::assert_relative_eq;

    #[test]
    fn test_euclidean() {
        assert_relative_eq!(euclidean(&[0.0, 0.0], &[3.0, 4.0]), 5.0);
        assert_relative_eq!(euclidean(&[1.0, 1.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_manhattan_and_chebyshev() {
        assert_relative_eq!(manhattan(&[0.0, 0.0], &[3.0, -4.0]), 7.0);
        assert_relative_eq!(chebyshev(&[0.0, 0.0], &[3.0, -4.0]), 4.0);
    }

    #[test]
    fn test_cosine_zero_magnitude() {
        assert_relative_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_inner_product_is_negated_dot() {
        let a = encode(SpaceType::InnerProduct, &[1.0, 2.0]).unwrap();
        let b = encode(SpaceType::InnerProduct, &[3.0, 4.0]).unwrap();
        assert_relative_eq!(raw_distance(SpaceType::InnerProduct, &a, &b), -11.0);
    }

    #[test]
    fn test_hamming_counts_differing_positions() {
        assert_relative_eq!(hamming(&[1.0, 0.0, 2.0], &[1.0, 1.0, 3.0]), 2.0);
    }

    #[test]
    fn test_jaccard_sparse() {
        // {1,3,4} vs {3,4,7}: intersection 2, union 4
        assert_relative_eq!(jaccard_sparse(&[1, 3, 4], &[3, 4, 7]), 0.5);
        assert_relative_eq!(jaccard_sparse(&[], &[]), 0.0);
        assert_relative_eq!(jaccard_sparse(&[1], &[2]), 1.0);
    }

    #[test]
    fn test_jaccard_bits_matches_sparse() {
        let mut v1 = vec![0.0f32; 40];
        let mut v2 = vec![0.0f32; 40];
        for i in [1usize, 3, 4] {
            v1[i] = 1.0;
        }
        for i in [3usize, 4, 37] {
            v2[i] = 1.0;
        }
        let a = encode(SpaceType::BitJaccard, &v1).unwrap();
        let b = encode(SpaceType::BitJaccard, &v2).unwrap();
        assert_relative_eq!(raw_distance(SpaceType::BitJaccard, &a, &b), 0.5);
    }

    #[test]
    fn test_identical_bit_vectors_have_zero_distance() {
        let mut v = vec![0.0f32; 64];
        v[5] = 1.0;
        v[63] = 1.0;
        let a = encode(SpaceType::BitJaccard, &v).unwrap();
        let b = encode(SpaceType::BitJaccard, &v).unwrap();
        assert_relative_eq!(raw_distance(SpaceType::BitJaccard, &a, &b), 0.0);
    }
}
