//! Tensor type for ndspc.
//!
//! A flat `Vec<f32>` with shape metadata, row-major throughout. Feature maps
//! are rank-4 `(batch, channel, height, width)`; flattened prototypes and
//! queries are rank-2 `(batch, dim)`; biases are rank-1.
//!
//! Shape errors are caller bugs, so constructors and accessors assert rather
//! than returning `Result` — the typed errors in [`crate::error`] are
//! reserved for runtime conditions (memory readiness, neighbor bounds).

use serde::{Deserialize, Serialize};

/// Flat f32 tensor with shape metadata, row-major layout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    data: Vec<f32>,
    shape: Vec<usize>,
}

impl Tensor {
    /// Create a zero-filled tensor of the given shape.
    pub fn zeros(shape: &[usize]) -> Self {
        let n: usize = shape.iter().product();
        Self {
            data: vec![0.0; n],
            shape: shape.to_vec(),
        }
    }

    /// Create a tensor from raw data.
    ///
    /// # Panics
    /// Panics if `data.len()` does not match the product of `shape`.
    pub fn from_data(data: Vec<f32>, shape: &[usize]) -> Self {
        let n: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            n,
            "data length {} does not match shape {:?}",
            data.len(),
            shape
        );
        Self {
            data,
            shape: shape.to_vec(),
        }
    }

    /// Get the shape.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Total number of elements.
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Leading (batch) dimension.
    ///
    /// # Panics
    /// Panics on a rank-0 tensor.
    pub fn batch(&self) -> usize {
        assert!(!self.shape.is_empty(), "rank-0 tensor has no batch dimension");
        self.shape[0]
    }

    /// Get the raw data as a slice.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Get mutable access to the raw data.
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Per-example dimensionality: product of all non-batch dimensions.
    pub fn row_dim(&self) -> usize {
        self.shape[1..].iter().product()
    }

    /// One example's data as a flat slice, regardless of rank.
    pub fn row(&self, i: usize) -> &[f32] {
        let d = self.row_dim();
        &self.data[i * d..(i + 1) * d]
    }

    /// Reshape `(B, ...)` to `(B, D)` where `D` is the product of the
    /// trailing dimensions.
    ///
    /// The batch dimension is always preserved — a batch of one keeps its
    /// leading dimension rather than collapsing to a bare vector.
    pub fn flatten_batch(&self) -> Tensor {
        Tensor {
            data: self.data.clone(),
            shape: vec![self.batch(), self.row_dim()],
        }
    }

    /// Reinterpret the data with a new shape of equal element count.
    ///
    /// # Panics
    /// Panics if the element counts differ.
    pub fn reshape(mut self, shape: &[usize]) -> Tensor {
        let n: usize = shape.iter().product();
        assert_eq!(
            self.data.len(),
            n,
            "cannot reshape {} elements to {:?}",
            self.data.len(),
            shape
        );
        self.shape = shape.to_vec();
        self
    }
}

/// Squared Euclidean distance between two equal-length slices.
#[inline]
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeros() {
        let t = Tensor::zeros(&[2, 3, 4, 4]);
        assert_eq!(t.numel(), 96);
        assert_eq!(t.shape(), &[2, 3, 4, 4]);
        assert!(t.data().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_flatten_batch_preserves_leading_dim() {
        let t = Tensor::zeros(&[1, 16, 8, 8]);
        let flat = t.flatten_batch();
        // A batch of one must not collapse its leading dimension.
        assert_eq!(flat.shape(), &[1, 1024]);
    }

    #[test]
    fn test_row_access() {
        let t = Tensor::from_data(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        assert_eq!(t.row(0), &[1.0, 2.0, 3.0]);
        assert_eq!(t.row(1), &[4.0, 5.0, 6.0]);
        assert_eq!(t.row_dim(), 3);
    }

    #[test]
    fn test_squared_l2() {
        let a = [1.0, 2.0, 3.0];
        let b = [1.0, 0.0, 0.0];
        assert!((squared_l2(&a, &b) - 13.0).abs() < 1e-6);
        assert_eq!(squared_l2(&a, &a), 0.0);
    }

    #[test]
    #[should_panic(expected = "does not match shape")]
    fn test_from_data_shape_mismatch_panics() {
        Tensor::from_data(vec![1.0, 2.0], &[3]);
    }
}
