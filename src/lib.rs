//! # ndspc: Neuro-Dynamic Sparse Prototype Classifier
//!
//! A small memory-augmented binary classifier: a convolutional feature
//! extractor feeds a dynamic sparsity gate, which feeds an associative
//! nearest-neighbor memory of previously observed feature prototypes, whose
//! retrieved prototype is scored by a linear predictor.
//!
//! ## Quick Start
//!
//! ```rust
//! use ndspc::{Batch, Classifier, NdspcConfig, Tensor, TrainingPipeline};
//!
//! let config = NdspcConfig {
//!     img_size: 8,
//!     epochs: 1,
//!     ..NdspcConfig::default()
//! };
//!
//! let mut model = Classifier::new(&config);
//! let mut pipeline = TrainingPipeline::new(&model, &config);
//!
//! // The data-loading collaborator yields pre-batched image tensors and
//! // binary labels; here, one batch of twelve blank 8x8 images.
//! let batches = vec![Batch {
//!     images: Tensor::zeros(&[12, 3, 8, 8]),
//!     labels: vec![1.0; 12],
//! }];
//!
//! // Phase 1: unsupervised memory construction (no gradients).
//! pipeline.build_memory(&mut model, &batches).unwrap();
//!
//! // Phase 2: supervised fine-tuning against the frozen memory.
//! let losses = pipeline.fine_tune(&mut model, &batches).unwrap();
//! assert_eq!(losses.len(), 1);
//!
//! // Inference: per-example probabilities in [0, 1].
//! let probs = model.forward(&batches[0].images).unwrap();
//! assert_eq!(probs.shape(), &[12, 1]);
//! ```
//!
//! ## Core Concepts
//!
//! - **Prototype**: a flattened post-convolution feature vector of one
//!   training example, stored for nearest-neighbor retrieval.
//! - **SparsityGate**: zeroes all but the highest-scoring fraction of
//!   feature channels, per example.
//! - **PrototypeMemory**: the associative store standing in for a learned
//!   representation at inference time — built once in Phase 1, frozen after.
//! - **Phase 1 / Phase 2**: gradient-free memory construction, then
//!   supervised fine-tuning with a prune-freeze gradient mask.
//!
//! Image loading, augmentation, dataset layout, and device placement belong
//! to collaborating crates; this core consumes fixed-size image tensors and
//! binary labels.

pub mod error;
pub mod gate;
pub mod memory;
pub mod model;
pub mod nn;
pub mod tensor;
pub mod train;

// Re-exports for convenience
pub use error::{NdspcError, Result};
pub use gate::SparsityGate;
pub use memory::{FlatIndex, PrototypeMemory};
pub use model::{Classifier, ClassifierSnapshot};
pub use tensor::Tensor;
pub use train::{Adam, Batch, TrainingPipeline};

use serde::{Deserialize, Serialize};

/// Configuration surface consumed by the core.
///
/// `batch_size` documents the batch geometry the data-loading collaborator
/// should produce; the core itself accepts whatever batch sizes arrive.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NdspcConfig {
    /// Proportion of feature channels the gate retains per example.
    pub keep_fraction: f64,
    /// Square input image size; determines the prototype dimensionality.
    pub img_size: usize,
    /// Feature-extractor output channels.
    pub conv_channels: usize,
    /// Adam learning rate.
    pub learning_rate: f32,
    /// Batch geometry for the data-loading collaborator.
    pub batch_size: usize,
    /// Phase-2 epoch count.
    pub epochs: usize,
    /// Minimum indexed prototypes before the memory accepts searches.
    pub min_prototypes: usize,
    /// Seed for parameter initialization and epoch shuffling.
    pub seed: u64,
}

impl Default for NdspcConfig {
    fn default() -> Self {
        Self {
            keep_fraction: 0.2,
            img_size: 64,
            conv_channels: 16,
            learning_rate: 1e-3,
            batch_size: 8,
            epochs: 20,
            min_prototypes: 10,
            seed: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NdspcConfig::default();
        assert_eq!(config.keep_fraction, 0.2);
        assert_eq!(config.img_size, 64);
        assert_eq!(config.conv_channels, 16);
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.epochs, 20);
        assert_eq!(config.min_prototypes, 10);
    }
}
