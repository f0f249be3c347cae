//! Dynamic sparsity gate: per-example, per-channel selective suppression.
//!
//! The gate emulates selective neural firing. A small scoring sub-network
//! (conv → global average pool → linear) assigns a relevance score to every
//! channel of every example; channels below that example's upper score
//! quantile are zeroed outright.
//!
//! # Tie-break rule
//!
//! The mask keeps channels whose score is *strictly greater* than the
//! per-example threshold. Scores exactly at the boundary are dropped, so a
//! row of all-equal scores selects zero channels. This is the deterministic
//! tie-break the whole crate assumes; at `keep_fraction = 1.0` the gate
//! short-circuits and keeps every channel.
//!
//! # Gradient semantics
//!
//! The threshold is a hard, non-differentiable cut. Multiplying by the
//! resulting {0, 1} mask passes gradient unchanged through kept elements and
//! exactly zero through masked ones; nothing in the crate differentiates
//! through the threshold itself.

use crate::nn::{global_avg_pool, Conv2d, Linear};
use crate::tensor::Tensor;
use rand_chacha::ChaCha8Rng;

/// Hidden width of the scoring sub-network's convolution.
const SCORE_CHANNELS: usize = 16;

/// Per-example top-fraction channel gate.
#[derive(Clone, Debug)]
pub struct SparsityGate {
    keep_fraction: f64,
    in_channels: usize,
    pub score_conv: Conv2d,
    pub score_fc: Linear,
}

impl SparsityGate {
    /// Create a gate over `in_channels` feature channels.
    ///
    /// `keep_fraction` is the proportion of channels retained per example
    /// (upper bound; boundary ties are dropped).
    pub fn new(in_channels: usize, keep_fraction: f64, rng: &mut ChaCha8Rng) -> Self {
        Self {
            keep_fraction,
            in_channels,
            score_conv: Conv2d::new(in_channels, SCORE_CHANNELS, 3, 1, rng),
            score_fc: Linear::new(SCORE_CHANNELS, in_channels, rng),
        }
    }

    pub fn keep_fraction(&self) -> f64 {
        self.keep_fraction
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    /// Per-example, per-channel relevance scores: `(B, C, H, W)` → `(B, C)`.
    ///
    /// The sub-network pools spatially before scoring, so the output depends
    /// on channel statistics rather than exact spatial layout.
    pub fn scores(&self, x: &Tensor) -> Tensor {
        let pooled = global_avg_pool(&self.score_conv.forward(x));
        self.score_fc.forward(&pooled)
    }

    /// Build the `(B, C)` binary mask from a score tensor.
    ///
    /// Each row's threshold is the upper quantile of that row at cut
    /// `1 - keep_fraction` (linear interpolation between order statistics);
    /// the mask is `score > threshold`. At `keep_fraction >= 1.0` every
    /// channel is kept.
    pub fn channel_mask(&self, scores: &Tensor) -> Tensor {
        let b = scores.batch();
        let c = scores.row_dim();
        if self.keep_fraction >= 1.0 {
            return Tensor::from_data(vec![1.0; b * c], &[b, c]);
        }
        let mut mask = Tensor::zeros(&[b, c]);
        let mdat = mask.data_mut();
        for bi in 0..b {
            let row = scores.row(bi);
            let threshold = upper_quantile(row, 1.0 - self.keep_fraction);
            for (ci, &s) in row.iter().enumerate() {
                if s > threshold {
                    mdat[bi * c + ci] = 1.0;
                }
            }
        }
        mask
    }

    /// Forward pass: zero the low-relevance channels of `x`.
    ///
    /// Output has the same shape as the input; masked channels are exactly
    /// zero, kept channels pass through unchanged.
    pub fn forward(&self, x: &Tensor) -> Tensor {
        let shape = x.shape();
        assert_eq!(shape.len(), 4, "SparsityGate expects a rank-4 input, got {:?}", shape);
        let (b, c, h, w) = (shape[0], shape[1], shape[2], shape[3]);
        assert_eq!(
            c, self.in_channels,
            "SparsityGate expects {} channels, got {}",
            self.in_channels, c
        );

        let mask = self.channel_mask(&self.scores(x));
        let plane = h * w;
        let mut out = x.clone();
        let odat = out.data_mut();
        let mdat = mask.data();
        for bi in 0..b {
            for ci in 0..c {
                if mdat[bi * c + ci] == 0.0 {
                    let base = (bi * c + ci) * plane;
                    odat[base..base + plane].fill(0.0);
                }
            }
        }
        out
    }
}

/// Quantile of a slice at `cut` in `[0, 1]`, with linear interpolation
/// between order statistics (`cut = 0` is the minimum, `cut = 1` the max).
fn upper_quantile(values: &[f32], cut: f64) -> f32 {
    assert!(!values.is_empty(), "quantile of empty slice");
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let cut = cut.clamp(0.0, 1.0);
    let pos = cut * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = (pos - lo as f64) as f32;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

// =============================================================================
// Tests
// =============================================================================
