//! Squeeze-and-excitation convolution
//!
//! Rescales each channel by a gate computed from global channel statistics,
//! then optionally resamples with a strided (or transposed) convolution.

use ndarray::{s, Array2};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::base::{BaseOp, WeightTransform};
use super::conv::SpatialConv;
use crate::error::{Result, VolnasError};
use crate::layers::{check_channels, AdaptiveAvgPool3d, ConvSpec, Linear, ReLU, Sigmoid, Volume};

/// Width of the excitation bottleneck
pub const SE_HIDDEN_UNITS: usize = 1;

/// Options for [`SEConvOp`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SEConvOptions {
    pub kernel_size: usize,
    pub stride: usize,
    pub dilation: usize,
    pub use_transpose: bool,
    pub dropout_rate: f64,
    pub ops_order: String,
}

impl Default for SEConvOptions {
    fn default() -> Self {
        Self {
            kernel_size: 3,
            stride: 1,
            dilation: 1,
            use_transpose: false,
            dropout_rate: 0.0,
            ops_order: "weight_norm".to_string(),
        }
    }
}

impl SEConvOptions {
    pub fn with_kernel_size(mut self, kernel_size: usize) -> Self {
        self.kernel_size = kernel_size;
        self
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub fn transposed(mut self) -> Self {
        self.use_transpose = true;
        self
    }

    pub fn with_dropout(mut self, rate: f64) -> Self {
        self.dropout_rate = rate;
        self
    }

    pub fn with_ops_order(mut self, ops_order: impl Into<String>) -> Self {
        self.ops_order = ops_order.into();
        self
    }
}

/// Weight-transform of [`SEConvOp`]
#[derive(Debug, Clone)]
pub struct SETransform {
    pool: AdaptiveAvgPool3d,
    /// Squeeze to the bottleneck
    squeeze: Linear,
    /// Excite back to one gate per channel
    excite: Linear,
    /// Resampling convolution, present when stride >= 2
    conv: Option<SpatialConv>,
}

impl SETransform {
    /// Per-channel gates in `[0, 1]`, shape `(batch, channel)`
    pub fn gates(&self, x: &Volume) -> Result<Array2<f64>> {
        check_channels(x, self.squeeze.in_features())?;
        let pooled = self.pool.forward(x);
        let hidden = ReLU.forward(&self.squeeze.forward(&pooled));
        Ok(Sigmoid.forward(&self.excite.forward(&hidden)))
    }

    pub fn conv(&self) -> Option<&SpatialConv> {
        self.conv.as_ref()
    }
}

impl WeightTransform for SETransform {
    fn weight_call(&mut self, x: &Volume) -> Result<Volume> {
        let gates = self.gates(x)?;
        let mut gated = x.to_owned();
        for ((b, c), &gate) in gates.indexed_iter() {
            gated
                .slice_mut(s![b, c, .., .., ..])
                .mapv_inplace(|v| v * gate);
        }

        match &self.conv {
            Some(conv) => conv.forward(&gated),
            None => Ok(gated),
        }
    }

    fn num_parameters(&self) -> usize {
        self.squeeze.num_parameters()
            + self.excite.num_parameters()
            + self.conv.as_ref().map_or(0, SpatialConv::num_parameters)
    }
}

/// Squeeze-and-excitation convolution operation
pub type SEConvOp = BaseOp<SETransform>;

impl BaseOp<SETransform> {
    /// Build an SE op.
    ///
    /// Below stride 2 there is no convolution, the output keeps the input
    /// channels, and normalization is off whatever the ops-order says.
    pub fn new<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        options: SEConvOptions,
        rng: &mut R,
    ) -> Result<Self> {
        let resamples = options.stride >= 2;
        if !resamples && in_channels != out_channels {
            return Err(VolnasError::ConfigError(format!(
                "se_conv without resampling keeps channels, got in={} out={}",
                in_channels, out_channels
            )));
        }

        let conv = if resamples {
            let spec = ConvSpec::new(in_channels, out_channels, options.kernel_size)
                .with_stride(options.stride)
                .with_dilation(options.dilation);
            Some(SpatialConv::new(spec, options.use_transpose, rng)?)
        } else {
            None
        };

        let transform = SETransform {
            pool: AdaptiveAvgPool3d,
            squeeze: Linear::new(in_channels, SE_HIDDEN_UNITS, rng),
            excite: Linear::new(SE_HIDDEN_UNITS, in_channels, rng),
            conv,
        };

        debug!(
            in_channels,
            out_channels,
            stride = options.stride,
            transposed = options.use_transpose,
            "Built se_conv op"
        );

        let mut op = BaseOp::assemble(
            in_channels,
            out_channels,
            options.dropout_rate,
            &options.ops_order,
            transform,
            rng,
        )?;
        if !resamples {
            op.disable_norm();
        }
        Ok(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn rng() -> Xoshiro256PlusPlus {
        Xoshiro256PlusPlus::seed_from_u64(21)
    }

    fn random_volume(shape: (usize, usize, usize, usize, usize)) -> Volume {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(9);
        Volume::from_shape_simple_fn(shape, || rng.gen_range(-1.0..1.0))
    }

    #[test]
    fn test_stride_one_keeps_shape_and_skips_norm() {
        let mut op = SEConvOp::new(32, 32, SEConvOptions::default(), &mut rng()).unwrap();
        assert!(op.norm().is_none());
        assert!(op.transform().conv().is_none());

        let x = random_volume((2, 32, 4, 4, 4));
        let y = op.apply(&x).unwrap();
        assert_eq!(y.shape(), x.shape());
    }

    #[test]
    fn test_stride_one_is_pure_gating() {
        let mut op = SEConvOp::new(4, 4, SEConvOptions::default(), &mut rng()).unwrap();
        let x = random_volume((1, 4, 3, 3, 3));
        let gates = op.transform().gates(&x).unwrap();
        assert!(gates.iter().all(|&g| (0.0..=1.0).contains(&g)));

        let y = op.apply(&x).unwrap();
        for c in 0..4 {
            let expected = x.slice(s![0, c, .., .., ..]).mapv(|v| v * gates[[0, c]]);
            let actual = y.slice(s![0, c, .., .., ..]);
            for (a, b) in actual.iter().zip(expected.iter()) {
                assert!((a - b).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_down_and_up() {
        let x = random_volume((1, 8, 8, 8, 8));
        let mut down =
            SEConvOp::new(8, 8, SEConvOptions::default().with_stride(2), &mut rng()).unwrap();
        assert!(down.norm().is_some());
        assert_eq!(down.apply(&x).unwrap().shape(), &[1, 8, 4, 4, 4]);

        let options = SEConvOptions::default().with_stride(2).transposed();
        let mut up = SEConvOp::new(8, 8, options, &mut rng()).unwrap();
        assert_eq!(up.apply(&x).unwrap().shape(), &[1, 8, 16, 16, 16]);
    }

    #[test]
    fn test_bottleneck_is_single_unit() {
        let op = SEConvOp::new(64, 64, SEConvOptions::default(), &mut rng()).unwrap();
        // squeeze 64*1+1, excite 1*64+64
        assert_eq!(op.num_parameters(), 65 + 128);
    }

    #[test]
    fn test_channel_change_needs_resampling() {
        assert!(SEConvOp::new(4, 8, SEConvOptions::default(), &mut rng()).is_err());
        let options = SEConvOptions::default().with_stride(2);
        let mut op = SEConvOp::new(4, 8, options, &mut rng()).unwrap();
        let y = op.apply(&random_volume((1, 4, 4, 4, 4))).unwrap();
        assert_eq!(y.shape(), &[1, 8, 2, 2, 2]);
    }

    #[test]
    fn test_repeated_weight_stage_reports_channel_mismatch() {
        // The second weight stage sees the conv's 8 channels, the gate expects 4
        let options = SEConvOptions::default()
            .with_stride(2)
            .with_ops_order("weight_weight");
        let mut op = SEConvOp::new(4, 8, options, &mut rng()).unwrap();
        let err = op.apply(&Volume::ones((1, 4, 8, 8, 8))).unwrap_err();
        assert!(matches!(err, VolnasError::ShapeError { .. }));

        let wrong = random_volume((1, 8, 2, 2, 2));
        assert!(op.transform().gates(&wrong).is_err());
    }
}
