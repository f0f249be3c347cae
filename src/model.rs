//! The classifier: convolutional features → sparsity gate → prototype
//! memory lookup → linear head → probability.
//!
//! # Gradient flow
//!
//! The memory lookup returns a stored, detached prototype — it is a function
//! of the current input only through non-differentiable index selection. The
//! classification loss therefore reaches the linear predictor and nothing
//! upstream of the lookup; the convolution and gate parameters keep their
//! initialized values, modulated only by the structural prune mask (see
//! [`crate::train`]). This is inherited model behavior, reproduced on
//! purpose rather than "fixed" by making the lookup differentiable.
//!
//! # Phase-1 features
//!
//! [`Classifier::extract_features`] returns the *pre-activation* convolution
//! output, while [`Classifier::forward`] applies ReLU before the gate. The
//! memory is thus built from pre-ReLU features and queried with gated
//! post-ReLU ones — another inherited asymmetry, kept as-is.

use crate::error::Result;
use crate::gate::SparsityGate;
use crate::memory::PrototypeMemory;
use crate::nn::{relu, sigmoid, Conv2d, Linear};
use crate::tensor::Tensor;
use crate::NdspcConfig;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Memory-augmented binary classifier.
pub struct Classifier {
    pub conv1: Conv2d,
    pub gate: SparsityGate,
    pub memory: PrototypeMemory,
    pub predictor: Linear,
    prototype_dim: usize,
    config: NdspcConfig,
}

impl Classifier {
    /// Build a classifier from a config. Parameter initialization is
    /// deterministic in `config.seed`.
    pub fn new(config: &NdspcConfig) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let conv1 = Conv2d::new(3, config.conv_channels, 3, 1, &mut rng);
        let gate = SparsityGate::new(config.conv_channels, config.keep_fraction, &mut rng);

        // Size the prototype dimension from a dummy forward pass, so it
        // tracks whatever spatial shape the convolution actually produces.
        let dummy = Tensor::zeros(&[1, 3, config.img_size, config.img_size]);
        let features = conv1.forward(&dummy);
        let prototype_dim = features.numel() / features.batch();

        let memory = PrototypeMemory::with_min_prototypes(prototype_dim, config.min_prototypes);
        let predictor = Linear::new(prototype_dim, 1, &mut rng);

        Self {
            conv1,
            gate,
            memory,
            predictor,
            prototype_dim,
            config: config.clone(),
        }
    }

    /// Flattened feature dimensionality `D = channels * height * width`.
    pub fn prototype_dim(&self) -> usize {
        self.prototype_dim
    }

    pub fn config(&self) -> &NdspcConfig {
        &self.config
    }

    /// Pre-gate, pre-activation convolution output, `(B, C, H, W)`.
    ///
    /// Used only during memory construction; bypasses the gate and head.
    pub fn extract_features(&self, images: &Tensor) -> Tensor {
        self.conv1.forward(images)
    }

    /// Full forward pass: per-example probability in `[0, 1]`, shape
    /// `(B, 1)`. A batch of one keeps its leading dimension.
    ///
    /// # Errors
    /// Propagates the memory's typed errors ([`MemoryEmpty`],
    /// [`MemoryNotReady`], [`InvalidNeighborIndex`]) — an unready memory
    /// aborts the pass, never degrades silently.
    ///
    /// [`MemoryEmpty`]: crate::NdspcError::MemoryEmpty
    /// [`MemoryNotReady`]: crate::NdspcError::MemoryNotReady
    /// [`InvalidNeighborIndex`]: crate::NdspcError::InvalidNeighborIndex
    pub fn forward(&self, images: &Tensor) -> Result<Tensor> {
        Ok(self.forward_trace(images)?.1)
    }

    /// Forward pass that also returns the retrieved prototypes, so the
    /// training step can compute predictor gradients without re-running the
    /// lookup. Returns `(prototypes (B, D), probabilities (B, 1))`.
    pub(crate) fn forward_trace(&self, images: &Tensor) -> Result<(Tensor, Tensor)> {
        let features = relu(&self.conv1.forward(images));
        let gated = self.gate.forward(&features);
        let prototypes = self.memory.search(&gated.flatten_batch())?;
        let probs = sigmoid(&self.predictor.forward(&prototypes));
        Ok((prototypes, probs))
    }

    /// Export learned parameters for persistence by the outer harness.
    ///
    /// The prototype memory is deliberately not included: it is rebuilt once
    /// per run and holds no state across restarts.
    pub fn snapshot(&self) -> ClassifierSnapshot {
        ClassifierSnapshot {
            config: self.config.clone(),
            conv1_weight: self.conv1.weight.clone(),
            conv1_bias: self.conv1.bias.clone(),
            gate_conv_weight: self.gate.score_conv.weight.clone(),
            gate_conv_bias: self.gate.score_conv.bias.clone(),
            gate_fc_weight: self.gate.score_fc.weight.clone(),
            gate_fc_bias: self.gate.score_fc.bias.clone(),
            predictor_weight: self.predictor.weight.clone(),
            predictor_bias: self.predictor.bias.clone(),
        }
    }

    /// Restore a classifier from a snapshot. The memory comes back empty;
    /// Phase 1 must run again before the restored model can predict.
    pub fn from_snapshot(snap: ClassifierSnapshot) -> Self {
        let mut model = Self::new(&snap.config);
        model.conv1.weight = snap.conv1_weight;
        model.conv1.bias = snap.conv1_bias;
        model.gate.score_conv.weight = snap.gate_conv_weight;
        model.gate.score_conv.bias = snap.gate_conv_bias;
        model.gate.score_fc.weight = snap.gate_fc_weight;
        model.gate.score_fc.bias = snap.gate_fc_bias;
        model.predictor.weight = snap.predictor_weight;
        model.predictor.bias = snap.predictor_bias;
        model
    }
}

/// Serializable parameter set of a [`Classifier`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClassifierSnapshot {
    pub config: NdspcConfig,
    pub conv1_weight: Tensor,
    pub conv1_bias: Tensor,
    pub gate_conv_weight: Tensor,
    pub gate_conv_bias: Tensor,
    pub gate_fc_weight: Tensor,
    pub gate_fc_bias: Tensor,
    pub predictor_weight: Tensor,
    pub predictor_bias: Tensor,
}

// =============================================================================
// Tests
// =============================================================================
