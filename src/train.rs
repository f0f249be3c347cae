//! Two-phase training: unsupervised memory construction, then supervised
//! fine-tuning with a structural prune-freeze gradient mask.
//!
//! # Protocol
//!
//! The phases run in strict sequence, never interleaved:
//!
//! - **Phase 1** ([`TrainingPipeline::build_memory`]): one gradient-free
//!   pass over the data; each batch's pre-activation features are flattened
//!   and appended to the prototype memory.
//! - **Phase 2** ([`TrainingPipeline::fine_tune`]): a fixed number of
//!   epochs of binary cross-entropy descent. Before each optimizer step the
//!   convolution weight gradient is multiplied element-wise by
//!   `weight != 0`, so a weight driven to exactly zero stays zero for the
//!   rest of the run — a crude emulation of permanent synaptic pruning.
//!
//! # What actually receives gradient
//!
//! The memory lookup returns detached stored vectors, so the only
//! differentiable path from the loss is through the linear predictor. The
//! convolution and gate parameters see identically-zero gradients; they are
//! still passed through the masked optimizer step so the pruning invariant
//! holds structurally. See the module docs in [`crate::model`].

use crate::error::{NdspcError, Result};
use crate::model::Classifier;
use crate::tensor::Tensor;
use crate::NdspcConfig;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

/// One pre-batched training unit: images `(B, 3, S, S)` and binary labels.
#[derive(Clone, Debug)]
pub struct Batch {
    pub images: Tensor,
    pub labels: Vec<f32>,
}

/// Adam hyperparameters.
#[derive(Clone, Copy, Debug)]
pub struct AdamConfig {
    pub beta1: f32,
    pub beta2: f32,
    pub eps: f32,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
        }
    }
}

/// Moment buffers for a single parameter tensor.
#[derive(Clone, Debug)]
struct Moment {
    m: Vec<f32>,
    v: Vec<f32>,
}

/// Adam optimizer over explicitly registered parameter tensors.
///
/// A parameter whose gradient is identically zero is left bit-identical by
/// the step: both moments stay (or decay to) zero and the update vanishes,
/// so there is no weight-decay drift.
#[derive(Clone, Debug)]
pub struct Adam {
    lr: f32,
    config: AdamConfig,
    moments: Vec<Moment>,
    step: u64,
}

impl Adam {
    pub fn new(lr: f32) -> Self {
        Self::with_config(lr, AdamConfig::default())
    }

    pub fn with_config(lr: f32, config: AdamConfig) -> Self {
        Self {
            lr,
            config,
            moments: Vec::new(),
            step: 0,
        }
    }

    /// Register a parameter tensor of `numel` elements; returns its slot id.
    pub fn register(&mut self, numel: usize) -> usize {
        self.moments.push(Moment {
            m: vec![0.0; numel],
            v: vec![0.0; numel],
        });
        self.moments.len() - 1
    }

    /// Advance the shared step counter. Call once per optimizer step, before
    /// the per-parameter updates.
    pub fn begin_step(&mut self) {
        self.step += 1;
    }

    /// Apply one Adam update to a registered parameter.
    ///
    /// # Panics
    /// Panics if `param`/`grad` lengths differ from the registered size.
    pub fn update(&mut self, slot: usize, param: &mut [f32], grad: &[f32]) {
        let moment = &mut self.moments[slot];
        assert_eq!(param.len(), moment.m.len(), "parameter size changed since registration");
        assert_eq!(param.len(), grad.len(), "gradient length does not match parameter");

        let AdamConfig { beta1, beta2, eps } = self.config;
        let bc1 = 1.0 - beta1.powi(self.step as i32);
        let bc2 = 1.0 - beta2.powi(self.step as i32);
        for i in 0..param.len() {
            moment.m[i] = beta1 * moment.m[i] + (1.0 - beta1) * grad[i];
            moment.v[i] = beta2 * moment.v[i] + (1.0 - beta2) * grad[i] * grad[i];
            let m_hat = moment.m[i] / bc1;
            let v_hat = moment.v[i] / bc2;
            param[i] -= self.lr * m_hat / (v_hat.sqrt() + eps);
        }
    }
}

/// Multiply `grad` element-wise by `weight != 0`.
///
/// Gradient entries over weights that are exactly zero are erased, freezing
/// those weights permanently once pruned.
pub fn apply_gradient_mask(grad: &mut [f32], weight: &[f32]) {
    assert_eq!(grad.len(), weight.len(), "gradient/weight length mismatch");
    for (g, &w) in grad.iter_mut().zip(weight.iter()) {
        if w == 0.0 {
            *g = 0.0;
        }
    }
}

/// Mean binary cross-entropy of `(B, 1)` probabilities against labels.
///
/// Probabilities are clamped to `[1e-7, 1 - 1e-7]` so the loss stays finite
/// at saturated outputs.
pub fn bce_loss(probs: &Tensor, labels: &[f32]) -> f64 {
    assert_eq!(
        probs.batch(),
        labels.len(),
        "probability batch {} does not match {} labels",
        probs.batch(),
        labels.len()
    );
    let mut total = 0.0f64;
    for (&p, &y) in probs.data().iter().zip(labels.iter()) {
        let p = p.clamp(1e-7, 1.0 - 1e-7) as f64;
        let y = y as f64;
        total -= y * p.ln() + (1.0 - y) * (1.0 - p).ln();
    }
    total / labels.len() as f64
}

/// Slot ids for the parameters the optimizer actually steps.
///
/// The gate sub-network and convolution bias have no gradient path from the
/// loss at all, so they are not registered — equivalent to an optimizer
/// that skips absent gradients.
#[derive(Clone, Debug)]
struct ParamSlots {
    conv1_weight: usize,
    predictor_weight: usize,
    predictor_bias: usize,
}

/// Orchestrates the two training phases over pre-batched data.
///
/// Batches arrive pre-formed from the data-loading collaborator; the
/// pipeline shuffles their *order* each epoch with a seeded RNG so repeated
/// runs are reproducible.
pub struct TrainingPipeline {
    config: NdspcConfig,
    optimizer: Adam,
    slots: ParamSlots,
    rng: ChaCha8Rng,
}

impl TrainingPipeline {
    /// Create a pipeline for `model`, registering its trainable parameters.
    pub fn new(model: &Classifier, config: &NdspcConfig) -> Self {
        let mut optimizer = Adam::new(config.learning_rate);
        let slots = ParamSlots {
            conv1_weight: optimizer.register(model.conv1.weight.numel()),
            predictor_weight: optimizer.register(model.predictor.weight.numel()),
            predictor_bias: optimizer.register(model.predictor.bias.numel()),
        };
        Self {
            config: config.clone(),
            optimizer,
            slots,
            // Offset so the pipeline's stream is independent of the
            // parameter-init stream drawn from the same config seed.
            rng: ChaCha8Rng::seed_from_u64(config.seed ^ 0x5eed_5eed),
        }
    }

    /// Phase 1: populate the prototype memory with one gradient-free pass.
    ///
    /// No loss is computed; each batch contributes its flattened
    /// pre-activation features as prototypes.
    pub fn build_memory(&self, model: &mut Classifier, batches: &[Batch]) -> Result<()> {
        for batch in batches {
            let features = model.extract_features(&batch.images);
            model.memory.add_prototypes(features.flatten_batch())?;
        }
        info!(
            prototypes = model.memory.len(),
            batches = model.memory.batches(),
            "prototype memory built"
        );
        Ok(())
    }

    /// Phase 2: supervised fine-tuning for `config.epochs` epochs.
    ///
    /// Returns the mean loss of each epoch. Fails up front with
    /// [`MemoryNotReady`] if Phase 1 has not populated the memory — the
    /// run crashes loudly rather than proceeding with a corrupt signal.
    ///
    /// [`MemoryNotReady`]: NdspcError::MemoryNotReady
    pub fn fine_tune(&mut self, model: &mut Classifier, batches: &[Batch]) -> Result<Vec<f64>> {
        if !model.memory.ready() {
            return Err(NdspcError::MemoryNotReady {
                found: model.memory.len(),
                needed: model.memory.min_prototypes(),
            });
        }

        let mut epoch_losses = Vec::with_capacity(self.config.epochs);
        let mut order: Vec<usize> = (0..batches.len()).collect();
        for epoch in 0..self.config.epochs {
            order.shuffle(&mut self.rng);
            let mut total = 0.0f64;
            for &i in &order {
                total += self.train_step(model, &batches[i])?;
            }
            let mean_loss = total / batches.len() as f64;
            info!(epoch = epoch + 1, mean_loss, "epoch complete");
            epoch_losses.push(mean_loss);
        }
        Ok(epoch_losses)
    }

    /// One supervised step on a single batch; returns its loss.
    pub fn train_step(&mut self, model: &mut Classifier, batch: &Batch) -> Result<f64> {
        let (prototypes, probs) = model.forward_trace(&batch.images)?;
        let b = batch.labels.len();
        assert_eq!(
            probs.batch(),
            b,
            "model produced {} outputs for {} labels",
            probs.batch(),
            b
        );
        let loss = bce_loss(&probs, &batch.labels);

        // Fused sigmoid + BCE gradient wrt the logit: (p - y) / B.
        let dz: Vec<f32> = probs
            .data()
            .iter()
            .zip(batch.labels.iter())
            .map(|(&p, &y)| (p - y) / b as f32)
            .collect();

        // Predictor gradients; the retrieved prototypes are the layer input.
        let d = prototypes.row_dim();
        let mut grad_w = vec![0.0f32; d];
        let mut grad_b = 0.0f32;
        for (i, &dzi) in dz.iter().enumerate() {
            grad_b += dzi;
            for (gw, &x) in grad_w.iter_mut().zip(prototypes.row(i).iter()) {
                *gw += dzi * x;
            }
        }

        // The lookup is detached, so no gradient reaches conv1; its buffer
        // is identically zero. The prune mask still runs over it so the
        // freeze invariant is enforced on every step.
        let mut conv_grad = vec![0.0f32; model.conv1.weight.numel()];
        apply_gradient_mask(&mut conv_grad, model.conv1.weight.data());

        self.optimizer.begin_step();
        self.optimizer
            .update(self.slots.conv1_weight, model.conv1.weight.data_mut(), &conv_grad);
        self.optimizer
            .update(self.slots.predictor_weight, model.predictor.weight.data_mut(), &grad_w);
        self.optimizer
            .update(self.slots.predictor_bias, model.predictor.bias.data_mut(), &[grad_b]);

        Ok(loss)
    }
}

// =============================================================================
// Tests
// =============================================================================
