//! Pluggable similarity-search backends.
//!
//! Two historical implementations of the index diverged: a brute-force
//! cosine scan over the raw embedding matrix, and an approximate
//! nearest-neighbor variant. Both now live behind [`SearchBackend`], and
//! callers depend only on the candidate contract. The threshold filter is
//! applied uniformly by the index, regardless of backend.
//!
//! Score semantics differ per backend and must not be mixed:
//! [`LinearCosine`] scores are cosine similarity in `[-1, 1]`;
//! [`Hnsw`] scores are negated Euclidean distance in `(-inf, 0]`.

use instant_distance::{Builder, HnswMap, Point, Search};

use crate::index::Matrix;

/// Strategy for scoring stored embeddings against a query vector.
///
/// [`rebuild`](SearchBackend::rebuild) is invoked by the index after every
/// mutation (add, load) so that search itself stays a pure function of
/// current state. Backends with no derived state treat it as a no-op.
pub trait SearchBackend: Send + Sync {
    /// Short identifier used in config and stats output.
    fn kind(&self) -> &'static str;

    /// Refresh derived state from the current matrix.
    fn rebuild(&mut self, matrix: &Matrix);

    /// Score candidate rows for `query`.
    ///
    /// Returns `(row_index, score)` pairs, higher score = more similar.
    /// The exhaustive backend returns every row in insertion order; the
    /// approximate backend returns its `k` nearest candidates. Threshold
    /// filtering, final ordering, and truncation are the index's job.
    fn candidates(&self, matrix: &Matrix, query: &[f32], k: usize) -> Vec<(usize, f32)>;
}

/// Exhaustive cosine-similarity scan over the embedding matrix.
///
/// The primary backend. Exact, deterministic, and cheap at corpus scale
/// (a few thousand documents).
#[derive(Debug, Default)]
pub struct LinearCosine;

impl SearchBackend for LinearCosine {
    fn kind(&self) -> &'static str {
        "linear"
    }

    fn rebuild(&mut self, _matrix: &Matrix) {}

    fn candidates(&self, matrix: &Matrix, query: &[f32], _k: usize) -> Vec<(usize, f32)> {
        (0..matrix.rows())
            .map(|i| (i, cosine_similarity(query, matrix.row(i))))
            .collect()
    }
}

/// A point wrapper for instant-distance holding one embedding row.
#[derive(Clone, Debug)]
struct RowPoint(Vec<f32>);

impl Point for RowPoint {
    fn distance(&self, other: &Self) -> f32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt()
    }
}

/// Approximate nearest-neighbor backend over an HNSW graph.
///
/// The graph is derived state, rebuilt from the matrix after mutations;
/// persistence stays the documents/embeddings pair either way. Scores are
/// negated Euclidean distance, so a meaningful threshold is zero or
/// negative. Result order among near-equal distances is not guaranteed to
/// follow insertion order.
#[derive(Default)]
pub struct Hnsw {
    graph: Option<HnswMap<RowPoint, usize>>,
}

impl Hnsw {
    pub fn new() -> Self {
        Self { graph: None }
    }
}

impl SearchBackend for Hnsw {
    fn kind(&self) -> &'static str {
        "hnsw"
    }

    fn rebuild(&mut self, matrix: &Matrix) {
        if matrix.rows() == 0 {
            self.graph = None;
            return;
        }
        let points: Vec<RowPoint> = (0..matrix.rows())
            .map(|i| RowPoint(matrix.row(i).to_vec()))
            .collect();
        let values: Vec<usize> = (0..matrix.rows()).collect();
        self.graph = Some(Builder::default().build(points, values));
    }

    fn candidates(&self, _matrix: &Matrix, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let Some(graph) = self.graph.as_ref() else {
            return Vec::new();
        };
        let point = RowPoint(query.to_vec());
        let mut search = Search::default();
        graph
            .search(&point, &mut search)
            .take(k)
            .map(|item| (*item.value, -item.distance))
            .collect()
    }
}

/// Cosine similarity between two vectors, in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix_of(rows: &[&[f32]]) -> Matrix {
        let mut m = Matrix::new();
        m.append_rows(&rows.iter().map(|r| r.to_vec()).collect::<Vec<_>>())
            .unwrap();
        m
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_empty_and_mismatched() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_linear_scores_all_rows_in_order() {
        let m = matrix_of(&[&[1.0, 0.0], &[0.0, 1.0], &[1.0, 1.0]]);
        let backend = LinearCosine;
        let cands = backend.candidates(&m, &[1.0, 0.0], 1);
        assert_eq!(cands.len(), 3);
        assert_eq!(cands[0].0, 0);
        assert!((cands[0].1 - 1.0).abs() < 1e-6);
        assert!(cands[1].1.abs() < 1e-6);
    }

    #[test]
    fn test_hnsw_nearest_first() {
        let m = matrix_of(&[&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0], &[0.0, 0.0, 1.0]]);
        let mut backend = Hnsw::new();
        backend.rebuild(&m);
        let cands = backend.candidates(&m, &[1.0, 0.0, 0.0], 2);
        assert_eq!(cands.len(), 2);
        assert_eq!(cands[0].0, 0);
        assert!(cands[0].1.abs() < 1e-6, "exact match has distance 0");
        assert!(cands[0].1 >= cands[1].1);
    }

    #[test]
    fn test_hnsw_empty_matrix() {
        let mut backend = Hnsw::new();
        backend.rebuild(&Matrix::new());
        assert!(backend.candidates(&Matrix::new(), &[1.0], 5).is_empty());
    }
}
