//! Exact nearest-neighbor index over flat f32 vectors.
//!
//! A brute-force squared-Euclidean scan over row-major storage. The index is
//! rebuilt wholesale by [`FlatIndex::rebuild`], which assembles the new
//! vector set off to the side and swaps it in atomically — no observer ever
//! sees a transiently empty index mid-rebuild.
//!
//! There is no incremental update, deletion, or persistence: the memory this
//! index backs is rebuilt once per run.

use crate::tensor::{squared_l2, Tensor};

/// Exact squared-L2 nearest-neighbor index over vectors of one dimension.
#[derive(Clone, Debug)]
pub struct FlatIndex {
    dim: usize,
    /// Row-major flat storage: data[i * dim .. (i+1) * dim] = vector i.
    data: Vec<f32>,
    len: usize,
}

impl FlatIndex {
    /// Create an empty index over vectors of dimension `dim`.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            data: Vec::new(),
            len: 0,
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of indexed vectors.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Indexed vector `i` as a flat slice.
    pub fn row(&self, i: usize) -> &[f32] {
        assert!(i < self.len, "index row {} out of bounds ({})", i, self.len);
        &self.data[i * self.dim..(i + 1) * self.dim]
    }

    /// Drop all indexed vectors.
    pub fn clear(&mut self) {
        self.data.clear();
        self.len = 0;
    }

    /// Replace the index contents with the concatenation of `parts`.
    ///
    /// Each part is a rank-2 `(n, dim)` tensor. The replacement set is built
    /// in full before being swapped in, so the index never presents a
    /// partially populated state.
    ///
    /// # Panics
    /// Panics if any part's row dimension differs from the index dimension.
    pub fn rebuild(&mut self, parts: &[&Tensor]) {
        let total: usize = parts.iter().map(|t| t.batch()).sum();
        let mut fresh = Vec::with_capacity(total * self.dim);
        for part in parts {
            assert_eq!(
                part.row_dim(),
                self.dim,
                "index rebuild with dim {}, expected {}",
                part.row_dim(),
                self.dim
            );
            fresh.extend_from_slice(part.data());
        }
        self.data = fresh;
        self.len = total;
    }

    /// Nearest indexed vector for each query row, by squared Euclidean
    /// distance. Ties resolve to the lowest index.
    ///
    /// # Panics
    /// Panics on an empty index or mismatched query dimension — callers
    /// guard readiness before searching (see
    /// [`PrototypeMemory`](crate::memory::PrototypeMemory)).
    pub fn search(&self, queries: &Tensor) -> Vec<usize> {
        assert!(!self.is_empty(), "search on an empty index");
        assert_eq!(
            queries.row_dim(),
            self.dim,
            "query dim {} does not match index dim {}",
            queries.row_dim(),
            self.dim
        );
        (0..queries.batch())
            .map(|qi| {
                let q = queries.row(qi);
                let mut best = 0usize;
                let mut best_dist = f32::INFINITY;
                for i in 0..self.len {
                    let d = squared_l2(q, self.row(i));
                    if d < best_dist {
                        best_dist = d;
                        best = i;
                    }
                }
                best
            })
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
