//! Neural network layers: 2-D convolution, linear projection, pooling,
//! and the activations the classifier needs.
//!
//! All layers are plain forward passes over flat row-major storage. The only
//! parameters that receive gradients from the classification loss are the
//! linear predictor's (see [`crate::train`]); everything else is shaped by
//! initialization and the structural prune mask, so no general backward pass
//! lives here.
//!
//! Initialization is deterministic: layers draw from a caller-supplied
//! ChaCha8 RNG, so the same seed always produces the same parameters.

use crate::tensor::Tensor;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// 2-D convolution with square kernel and zero padding.
///
/// Weight layout is `(out_channels, in_channels, kernel, kernel)`, bias is
/// `(out_channels)`. With `kernel = 3, padding = 1` the spatial size is
/// preserved, which is what the classifier relies on when sizing the
/// prototype dimension.
#[derive(Clone, Debug)]
pub struct Conv2d {
    pub weight: Tensor,
    pub bias: Tensor,
    in_channels: usize,
    out_channels: usize,
    kernel: usize,
    padding: usize,
}

impl Conv2d {
    /// Create with uniform `±1/sqrt(fan_in)` initialization,
    /// `fan_in = in_channels * kernel * kernel`.
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        padding: usize,
        rng: &mut ChaCha8Rng,
    ) -> Self {
        let fan_in = in_channels * kernel * kernel;
        let bound = 1.0 / (fan_in as f32).sqrt();
        let weight = Tensor::from_data(
            (0..out_channels * fan_in)
                .map(|_| rng.gen_range(-bound..bound))
                .collect(),
            &[out_channels, in_channels, kernel, kernel],
        );
        let bias = Tensor::from_data(
            (0..out_channels).map(|_| rng.gen_range(-bound..bound)).collect(),
            &[out_channels],
        );
        Self {
            weight,
            bias,
            in_channels,
            out_channels,
            kernel,
            padding,
        }
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    /// Forward pass: `(B, Cin, H, W)` → `(B, Cout, H', W')` where
    /// `H' = H + 2*padding - kernel + 1`.
    ///
    /// # Panics
    /// Panics if the input channel count does not match.
    pub fn forward(&self, x: &Tensor) -> Tensor {
        let shape = x.shape();
        assert_eq!(shape.len(), 4, "Conv2d expects a rank-4 input, got {:?}", shape);
        let (b, cin, h, w) = (shape[0], shape[1], shape[2], shape[3]);
        assert_eq!(
            cin, self.in_channels,
            "Conv2d expects {} input channels, got {}",
            self.in_channels, cin
        );

        let k = self.kernel;
        let p = self.padding as isize;
        let h_out = h + 2 * self.padding - k + 1;
        let w_out = w + 2 * self.padding - k + 1;
        let mut out = Tensor::zeros(&[b, self.out_channels, h_out, w_out]);

        let wdat = self.weight.data();
        let xdat = x.data();
        let odat = out.data_mut();
        for bi in 0..b {
            for oc in 0..self.out_channels {
                let obase = (bi * self.out_channels + oc) * h_out * w_out;
                for oy in 0..h_out {
                    for ox in 0..w_out {
                        let mut acc = self.bias.data()[oc];
                        for ic in 0..cin {
                            let xbase = (bi * cin + ic) * h * w;
                            let wbase = ((oc * cin + ic) * k) * k;
                            for ky in 0..k {
                                let iy = oy as isize + ky as isize - p;
                                if iy < 0 || iy >= h as isize {
                                    continue;
                                }
                                for kx in 0..k {
                                    let ix = ox as isize + kx as isize - p;
                                    if ix < 0 || ix >= w as isize {
                                        continue;
                                    }
                                    acc += wdat[wbase + ky * k + kx]
                                        * xdat[xbase + iy as usize * w + ix as usize];
                                }
                            }
                        }
                        odat[obase + oy * w_out + ox] = acc;
                    }
                }
            }
        }
        out
    }
}

/// Fully connected layer. Weight layout is `(out_features, in_features)`.
#[derive(Clone, Debug)]
pub struct Linear {
    pub weight: Tensor,
    pub bias: Tensor,
    in_features: usize,
    out_features: usize,
}

impl Linear {
    /// Create with uniform `±1/sqrt(in_features)` initialization.
    pub fn new(in_features: usize, out_features: usize, rng: &mut ChaCha8Rng) -> Self {
        let bound = 1.0 / (in_features as f32).sqrt();
        let weight = Tensor::from_data(
            (0..out_features * in_features)
                .map(|_| rng.gen_range(-bound..bound))
                .collect(),
            &[out_features, in_features],
        );
        let bias = Tensor::from_data(
            (0..out_features).map(|_| rng.gen_range(-bound..bound)).collect(),
            &[out_features],
        );
        Self {
            weight,
            bias,
            in_features,
            out_features,
        }
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.out_features
    }

    /// Forward pass: `(B, in_features)` → `(B, out_features)`.
    pub fn forward(&self, x: &Tensor) -> Tensor {
        assert_eq!(
            x.row_dim(),
            self.in_features,
            "Linear expects {} input features, got {}",
            self.in_features,
            x.row_dim()
        );
        let b = x.batch();
        let mut out = Tensor::zeros(&[b, self.out_features]);
        let wdat = self.weight.data();
        let odat = out.data_mut();
        for bi in 0..b {
            let row = x.row(bi);
            for o in 0..self.out_features {
                let wrow = &wdat[o * self.in_features..(o + 1) * self.in_features];
                let mut acc = self.bias.data()[o];
                for (xv, wv) in row.iter().zip(wrow.iter()) {
                    acc += xv * wv;
                }
                odat[bi * self.out_features + o] = acc;
            }
        }
        out
    }
}

/// Global average pool: `(B, C, H, W)` → `(B, C)`.
pub fn global_avg_pool(x: &Tensor) -> Tensor {
    let shape = x.shape();
    assert_eq!(shape.len(), 4, "global_avg_pool expects a rank-4 input");
    let (b, c, h, w) = (shape[0], shape[1], shape[2], shape[3]);
    let plane = h * w;
    let mut out = Tensor::zeros(&[b, c]);
    let xdat = x.data();
    let odat = out.data_mut();
    for bi in 0..b {
        for ci in 0..c {
            let base = (bi * c + ci) * plane;
            let sum: f32 = xdat[base..base + plane].iter().sum();
            odat[bi * c + ci] = sum / plane as f32;
        }
    }
    out
}

/// Element-wise ReLU.
pub fn relu(x: &Tensor) -> Tensor {
    let data = x.data().iter().map(|&v| v.max(0.0)).collect();
    Tensor::from_data(data, x.shape())
}

/// Element-wise logistic sigmoid.
pub fn sigmoid(x: &Tensor) -> Tensor {
    let data = x.data().iter().map(|&v| 1.0 / (1.0 + (-v).exp())).collect();
    Tensor::from_data(data, x.shape())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    #[test]
    fn test_conv2d_preserves_spatial_size_with_padding() {
        let conv = Conv2d::new(3, 16, 3, 1, &mut rng());
        let x = Tensor::zeros(&[2, 3, 8, 8]);
        let y = conv.forward(&x);
        assert_eq!(y.shape(), &[2, 16, 8, 8]);
    }

    #[test]
    fn test_conv2d_identity_kernel() {
        // A 1x1 kernel with weight 1 and bias 0 copies the input through.
        let mut conv = Conv2d::new(1, 1, 1, 0, &mut rng());
        conv.weight = Tensor::from_data(vec![1.0], &[1, 1, 1, 1]);
        conv.bias = Tensor::from_data(vec![0.0], &[1]);
        let x = Tensor::from_data(vec![1.0, 2.0, 3.0, 4.0], &[1, 1, 2, 2]);
        let y = conv.forward(&x);
        assert_eq!(y.data(), x.data());
    }

    #[test]
    fn test_conv2d_3x3_sum_kernel() {
        // All-ones 3x3 kernel, pad 1: the center output is the sum of all
        // nine inputs; corners see only the in-bounds 2x2 window.
        let mut conv = Conv2d::new(1, 1, 3, 1, &mut rng());
        conv.weight = Tensor::from_data(vec![1.0; 9], &[1, 1, 3, 3]);
        conv.bias = Tensor::from_data(vec![0.0], &[1]);
        let x = Tensor::from_data((1..=9).map(|v| v as f32).collect(), &[1, 1, 3, 3]);
        let y = conv.forward(&x);
        assert_eq!(y.data()[4], 45.0); // center: 1+..+9
        assert_eq!(y.data()[0], 1.0 + 2.0 + 4.0 + 5.0); // top-left 2x2
    }

    #[test]
    fn test_linear_known_values() {
        let mut lin = Linear::new(2, 1, &mut rng());
        lin.weight = Tensor::from_data(vec![2.0, -1.0], &[1, 2]);
        lin.bias = Tensor::from_data(vec![0.5], &[1]);
        let x = Tensor::from_data(vec![3.0, 4.0], &[1, 2]);
        let y = lin.forward(&x);
        assert!((y.data()[0] - (6.0 - 4.0 + 0.5)).abs() < 1e-6);
    }

    #[test]
    fn test_global_avg_pool() {
        let x = Tensor::from_data(vec![1.0, 2.0, 3.0, 4.0, 10.0, 10.0, 10.0, 10.0], &[1, 2, 2, 2]);
        let y = global_avg_pool(&x);
        assert_eq!(y.shape(), &[1, 2]);
        assert!((y.data()[0] - 2.5).abs() < 1e-6);
        assert!((y.data()[1] - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_relu_and_sigmoid() {
        let x = Tensor::from_data(vec![-1.0, 0.0, 2.0], &[1, 3]);
        assert_eq!(relu(&x).data(), &[0.0, 0.0, 2.0]);
        let s = sigmoid(&x);
        assert!((s.data()[1] - 0.5).abs() < 1e-6);
        assert!(s.data().iter().all(|&p| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn test_seeded_init_is_deterministic() {
        let a = Conv2d::new(3, 4, 3, 1, &mut rng());
        let b = Conv2d::new(3, 4, 3, 1, &mut rng());
        assert_eq!(a.weight, b.weight);
        assert_eq!(a.bias, b.bias);
    }
}
