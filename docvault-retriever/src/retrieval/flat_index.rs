//! Exact nearest-neighbor search over a flat, row-major vector buffer.

use crate::error::{RetrievalError, Result};
use crate::storage::PositionId;
use serde::Serialize;

/// One search hit: a position in the index and its squared L2 distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Neighbor {
    pub position: PositionId,
    pub distance: f32,
}

/// Brute-force index of fixed-dimension vectors.
///
/// Vectors are stored contiguously; position `i` occupies
/// `data[i * dimension..(i + 1) * dimension]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// Wrap an existing row-major buffer, e.g. one read from disk.
    pub fn from_flat(dimension: usize, data: Vec<f32>) -> Result<Self> {
        if dimension == 0 || data.len() % dimension != 0 {
            return Err(RetrievalError::DimensionMismatch {
                expected: dimension,
                actual: data.len(),
            });
        }
        Ok(Self { dimension, data })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.data.len().checked_div(self.dimension).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_flat(&self) -> &[f32] {
        &self.data
    }

    pub fn vector(&self, position: PositionId) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// Check every vector's length without modifying the index.
    pub fn check_batch(&self, vectors: &[Vec<f32>]) -> Result<()> {
        match vectors.iter().find(|v| v.len() != self.dimension) {
            Some(bad) => Err(RetrievalError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            }),
            None => Ok(()),
        }
    }

    /// Append a batch of vectors; the whole batch is rejected if any has the wrong length.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        self.check_batch(vectors)?;
        self.data.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    /// Replace the whole contents with `vectors`.
    pub fn rebuild(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        self.check_batch(vectors)?;
        self.data = vectors.iter().flatten().copied().collect();
        Ok(())
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// The `k` nearest vectors to `query`, ascending by distance with ties
    /// broken by smaller position.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dimension {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut neighbors: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, vector)| Neighbor {
                position,
                distance: squared_l2(query, vector),
            })
            .collect();

        let by_distance = |a: &Neighbor, b: &Neighbor| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.position.cmp(&b.position))
        };
        if k < neighbors.len() {
            neighbors.select_nth_unstable_by(k - 1, by_distance);
            neighbors.truncate(k);
        }
        neighbors.sort_unstable_by(by_distance);
        Ok(neighbors)
    }
}

pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
