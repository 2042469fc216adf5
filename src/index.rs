//! # Similarity index
//!
//! Exact nearest-neighbor search over a fixed set of vectors using squared
//! Euclidean (L2) distance.
//!
//! The index is read-only once built. Position `i` in the index is the `i`-th
//! vector passed to [`SimilarityIndex::build`]; callers rely on that alignment
//! to map results back to their records.
//!
//! Ranking is deterministic: ascending distance, ties broken by ascending
//! position.

use std::cmp::Ordering;

use rayon::prelude::*;
use serde::Serialize;

use crate::error::{Result, SearchError};

/// One search hit: a position in the index and its squared L2 distance to the query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f64,
}

impl Neighbor {
    /// Similarity score reported to callers: `1 - distance`.
    ///
    /// This is only a relative ranking signal. Squared distances above 1 give
    /// negative scores, so it is neither bounded nor a probability.
    pub fn score(&self) -> f64 {
        1.0 - self.distance
    }
}

/// Flat (brute-force) L2 index over vectors of one dimensionality.
#[derive(Debug, Clone)]
pub struct SimilarityIndex {
    dimension: usize,
    /// Row-major, `len() * dimension` entries.
    data: Vec<f64>,
}

impl SimilarityIndex {
    /// Build an index from `vectors`, in order.
    ///
    /// # Errors
    /// - [`SearchError::EmptyInput`] if `vectors` is empty.
    /// - [`SearchError::DimensionMismatch`] if the vectors differ in length (or are zero-length).
    /// - [`SearchError::NonFiniteVector`] if any component is NaN or infinite.
    pub fn build<V: AsRef<[f64]>>(vectors: &[V]) -> Result<Self> {
        let first = vectors.first().ok_or(SearchError::EmptyInput)?;
        let dimension = first.as_ref().len();
        if dimension == 0 {
            return Err(SearchError::DimensionMismatch {
                expected: 1,
                actual: 0,
            });
        }

        let mut data = Vec::with_capacity(vectors.len() * dimension);
        for (position, v) in vectors.iter().enumerate() {
            let v = v.as_ref();
            if v.len() != dimension {
                return Err(SearchError::DimensionMismatch {
                    expected: dimension,
                    actual: v.len(),
                });
            }
            if !v.iter().all(|x| x.is_finite()) {
                return Err(SearchError::NonFiniteVector { position });
            }
            data.extend_from_slice(v);
        }

        Ok(Self { dimension, data })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of indexed vectors.
    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Return up to `k` nearest neighbors of `query`, closest first.
    ///
    /// # Errors
    /// - [`SearchError::UninitializedIndex`] if the index holds no vectors.
    /// - [`SearchError::DimensionMismatch`] if `query.len() != self.dimension()`.
    pub fn search(&self, query: &[f64], k: usize) -> Result<Vec<Neighbor>> {
        if self.is_empty() {
            return Err(SearchError::UninitializedIndex);
        }
        if query.len() != self.dimension {
            return Err(SearchError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut neighbors: Vec<Neighbor> = self
            .data
            .par_chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, v)| Neighbor {
                position,
                distance: squared_l2(v, query),
            })
            .collect();

        neighbors.sort_unstable_by(rank);
        neighbors.truncate(k);
        Ok(neighbors)
    }
}

fn rank(a: &Neighbor, b: &Neighbor) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then(a.position.cmp(&b.position))
}

/// Squared Euclidean distance `Σ (a[i] - b[i])^2`. Slices must be equal length.
pub fn squared_l2(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
