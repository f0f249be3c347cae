//! Prototype memory: an append-only store of feature prototypes with
//! nearest-neighbor retrieval.
//!
//! Populated once, during the unsupervised memory-construction phase, then
//! read-only for the rest of the run. There is no deletion, no versioning,
//! and no concurrent-access contract.
//!
//! # Retrieval policy (inherited, asymmetric)
//!
//! This module reproduces the original system's policy exactly:
//!
//! - `add_prototypes` clears the index and rebuilds it from the *previous*
//!   batch concatenated with the *new* batch (just the new batch when it is
//!   the first). The searchable index therefore always reflects only the two
//!   most recent batches, while `history` retains every batch ever added.
//! - `search` resolves neighbor *positions* against `history[0]` — the
//!   first-ever batch — honoring the original's intent to "always retrieve
//!   from the original prototype set". A neighbor position beyond the first
//!   batch's bounds is a typed [`InvalidNeighborIndex`] error.
//!
//! The index/result asymmetry is deliberate fidelity, not an oversight of
//! this port: a consistent alternative (parallel arrays mapping each indexed
//! vector to its own originating prototype) exists but would change model
//! behavior, so it was not taken.
//!
//! [`InvalidNeighborIndex`]: crate::error::NdspcError::InvalidNeighborIndex

use crate::error::{NdspcError, Result};
use crate::memory::index::FlatIndex;
use crate::tensor::Tensor;
use tracing::debug;

/// Default minimum indexed vectors before `search` is allowed.
pub const DEFAULT_MIN_PROTOTYPES: usize = 10;

/// Append-only nearest-neighbor memory of flattened feature prototypes.
#[derive(Clone, Debug)]
pub struct PrototypeMemory {
    dim: usize,
    min_prototypes: usize,
    index: FlatIndex,
    /// Every batch ever added, in insertion order. Never mutated after push.
    history: Vec<Tensor>,
}

impl PrototypeMemory {
    /// Create an empty memory over prototypes of dimension `dim`, with the
    /// default readiness threshold of [`DEFAULT_MIN_PROTOTYPES`].
    pub fn new(dim: usize) -> Self {
        Self::with_min_prototypes(dim, DEFAULT_MIN_PROTOTYPES)
    }

    /// Create with an explicit readiness threshold.
    pub fn with_min_prototypes(dim: usize, min_prototypes: usize) -> Self {
        Self {
            dim,
            min_prototypes,
            index: FlatIndex::new(dim),
            history: Vec::new(),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn min_prototypes(&self) -> usize {
        self.min_prototypes
    }

    /// Number of currently indexed (searchable) vectors.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Number of batches ever added.
    pub fn batches(&self) -> usize {
        self.history.len()
    }

    /// `true` once enough vectors are indexed for `search` to succeed.
    pub fn ready(&self) -> bool {
        self.index.len() >= self.min_prototypes && !self.index.is_empty()
    }

    /// The live search index (two most recent batches).
    pub fn index(&self) -> &FlatIndex {
        &self.index
    }

    /// Add a rank-2 `(n, dim)` batch of prototypes.
    ///
    /// The index is rebuilt from the previous batch plus this one (or this
    /// one alone if it is the first); the raw batch is appended to the
    /// history regardless of what ends up indexed.
    pub fn add_prototypes(&mut self, batch: Tensor) -> Result<()> {
        if batch.row_dim() != self.dim {
            return Err(NdspcError::DimensionMismatch {
                expected: self.dim,
                got: batch.row_dim(),
            });
        }
        match self.history.last() {
            Some(previous) => self.index.rebuild(&[previous, &batch]),
            None => self.index.rebuild(&[&batch]),
        }
        self.history.push(batch);
        debug!(
            indexed = self.index.len(),
            batches = self.history.len(),
            "prototype batch added"
        );
        Ok(())
    }

    /// Retrieve the nearest stored prototype for each query row.
    ///
    /// Neighbors are found in the live index by squared Euclidean distance;
    /// the returned vectors are read from the first-ever batch at the
    /// neighbor's position. Returns one `(dim)` row per query, assembled
    /// into a `(B, dim)` tensor.
    ///
    /// # Errors
    /// - [`MemoryEmpty`] if no batch was ever added.
    /// - [`MemoryNotReady`] if fewer than `min_prototypes` vectors are
    ///   indexed.
    /// - [`InvalidNeighborIndex`] if a neighbor position falls outside the
    ///   first batch.
    ///
    /// All are fatal for the current forward pass; there is no fallback.
    ///
    /// [`MemoryEmpty`]: NdspcError::MemoryEmpty
    /// [`MemoryNotReady`]: NdspcError::MemoryNotReady
    /// [`InvalidNeighborIndex`]: NdspcError::InvalidNeighborIndex
    pub fn search(&self, queries: &Tensor) -> Result<Tensor> {
        if self.history.is_empty() {
            return Err(NdspcError::MemoryEmpty);
        }
        if self.index.len() < self.min_prototypes {
            return Err(NdspcError::MemoryNotReady {
                found: self.index.len(),
                needed: self.min_prototypes,
            });
        }
        if queries.row_dim() != self.dim {
            return Err(NdspcError::DimensionMismatch {
                expected: self.dim,
                got: queries.row_dim(),
            });
        }

        let neighbors = self.index.search(queries);
        let first = &self.history[0];
        let mut out = Vec::with_capacity(neighbors.len() * self.dim);
        for &n in &neighbors {
            if n >= first.batch() {
                return Err(NdspcError::InvalidNeighborIndex {
                    index: n,
                    len: first.batch(),
                });
            }
            out.extend_from_slice(first.row(n));
        }
        Ok(Tensor::from_data(out, &[neighbors.len(), self.dim]))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn batch(rows: &[&[f32]]) -> Tensor {
        let dim = rows[0].len();
        let data: Vec<f32> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Tensor::from_data(data, &[rows.len(), dim])
    }

    fn random_batch(rng: &mut ChaCha8Rng, n: usize, dim: usize) -> Tensor {
        let data = (0..n * dim).map(|_| rng.gen_range(-1.0..1.0)).collect();
        Tensor::from_data(data, &[n, dim])
    }

    #[test]
    fn test_search_empty_memory_fails() {
        let mem = PrototypeMemory::new(4);
        let err = mem.search(&batch(&[&[0.0; 4]])).unwrap_err();
        assert!(matches!(err, NdspcError::MemoryEmpty));
    }

    #[test]
    fn test_search_under_populated_fails_not_ready() {
        let mut mem = PrototypeMemory::new(2);
        mem.add_prototypes(batch(&[&[1.0, 0.0], &[0.0, 1.0]])).unwrap();
        let err = mem.search(&batch(&[&[1.0, 0.0]])).unwrap_err();
        match err {
            NdspcError::MemoryNotReady { found, needed } => {
                assert_eq!(found, 2);
                assert_eq!(needed, DEFAULT_MIN_PROTOTYPES);
            }
            other => panic!("expected MemoryNotReady, got {:?}", other),
        }
        assert!(!mem.ready());
    }

    #[test]
    fn test_self_match_after_single_batch() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut mem = PrototypeMemory::new(8);
        let protos = random_batch(&mut rng, 12, 8);
        let fifth: Vec<f32> = protos.row(5).to_vec();
        mem.add_prototypes(protos).unwrap();
        assert!(mem.ready());

        let hit = mem.search(&Tensor::from_data(fifth.clone(), &[1, 8])).unwrap();
        assert_eq!(hit.row(0), fifth.as_slice());
    }

    #[test]
    fn test_far_query_returns_a_stored_member() {
        let mut rng = ChaCha8Rng::seed_from_u64(12);
        let mut mem = PrototypeMemory::new(8);
        let protos = random_batch(&mut rng, 20, 8);
        let stored: Vec<Vec<f32>> = (0..20).map(|i| protos.row(i).to_vec()).collect();
        mem.add_prototypes(protos).unwrap();

        // Way outside the data distribution: still a valid nearest neighbor.
        let far = Tensor::from_data(vec![1000.0; 8], &[1, 8]);
        let hit = mem.search(&far).unwrap();
        assert!(stored.iter().any(|s| s.as_slice() == hit.row(0)));
    }

    #[test]
    fn test_index_window_is_two_most_recent_batches() {
        let mut mem = PrototypeMemory::with_min_prototypes(1, 1);
        let p = batch(&[&[100.0]]);
        let a = batch(&[&[1.0], &[2.0]]);
        let b = batch(&[&[3.0]]);
        mem.add_prototypes(p).unwrap();
        mem.add_prototypes(a).unwrap();
        mem.add_prototypes(b).unwrap();

        // Index holds A ++ B, and nothing from P.
        let idx = mem.index();
        assert_eq!(idx.len(), 3);
        assert_eq!(idx.row(0), &[1.0]);
        assert_eq!(idx.row(1), &[2.0]);
        assert_eq!(idx.row(2), &[3.0]);
        // History still remembers everything.
        assert_eq!(mem.batches(), 3);
    }

    #[test]
    fn test_results_drawn_from_first_batch_positions() {
        // First batch has 3 rows; second batch's rows are nearer to the
        // query, but the value returned is read from the FIRST batch at the
        // matched position.
        let mut mem = PrototypeMemory::with_min_prototypes(1, 1);
        mem.add_prototypes(batch(&[&[10.0], &[20.0], &[30.0]])).unwrap();
        mem.add_prototypes(batch(&[&[0.0], &[1.0]])).unwrap();

        // Index is [10, 20, 30, 0, 1]; query 21 matches position 1 (20.0),
        // which also exists in the first batch: value 20.0 comes back.
        let hit = mem.search(&batch(&[&[21.0]])).unwrap();
        assert_eq!(hit.row(0), &[20.0]);
    }

    #[test]
    fn test_neighbor_beyond_first_batch_is_typed_error() {
        let mut mem = PrototypeMemory::with_min_prototypes(1, 1);
        mem.add_prototypes(batch(&[&[10.0]])).unwrap();
        mem.add_prototypes(batch(&[&[0.0], &[1.0]])).unwrap();

        // Index is [10, 0, 1]; query 1.1 matches position 2, outside the
        // single-row first batch.
        let err = mem.search(&batch(&[&[1.1]])).unwrap_err();
        match err {
            NdspcError::InvalidNeighborIndex { index, len } => {
                assert_eq!(index, 2);
                assert_eq!(len, 1);
            }
            other => panic!("expected InvalidNeighborIndex, got {:?}", other),
        }
    }

    #[test]
    fn test_dimension_mismatch_on_add() {
        let mut mem = PrototypeMemory::new(4);
        let err = mem.add_prototypes(batch(&[&[0.0, 1.0]])).unwrap_err();
        assert!(matches!(err, NdspcError::DimensionMismatch { expected: 4, got: 2 }));
    }

    #[test]
    fn test_batch_of_one_keeps_leading_dimension() {
        let mut rng = ChaCha8Rng::seed_from_u64(13);
        let mut mem = PrototypeMemory::new(8);
        mem.add_prototypes(random_batch(&mut rng, 10, 8)).unwrap();
        let hit = mem.search(&random_batch(&mut rng, 1, 8)).unwrap();
        assert_eq!(hit.shape(), &[1, 8]);
    }
}
