//! Standard, dilated, depthwise-separable and transposed convolution ops

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::base::{BaseOp, WeightTransform};
use crate::error::Result;
use crate::layers::{Conv3d, ConvSpec, ConvTranspose3d, Volume};

/// Convolution options; defaults to a 3x3x3, stride 1 convolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvOptions {
    pub kernel_size: usize,
    pub stride: usize,
    pub dilation: usize,
    pub use_transpose: bool,
    pub use_depthwise: bool,
    pub dropout_rate: f64,
    pub ops_order: String,
}

impl Default for ConvOptions {
    fn default() -> Self {
        Self {
            kernel_size: 3,
            stride: 1,
            dilation: 1,
            use_transpose: false,
            use_depthwise: false,
            dropout_rate: 0.0,
            ops_order: "weight_norm_act".to_string(),
        }
    }
}

impl ConvOptions {
    pub fn with_kernel_size(mut self, kernel_size: usize) -> Self {
        self.kernel_size = kernel_size;
        self
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_dilation(mut self, dilation: usize) -> Self {
        self.dilation = dilation;
        self
    }

    pub fn transposed(mut self) -> Self {
        self.use_transpose = true;
        self
    }

    pub fn depthwise(mut self) -> Self {
        self.use_depthwise = true;
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

/// Which convolution a [`ConvOps`] performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConvMode {
    Standard,
    Dilated,
    Depthwise,
}

impl fmt::Display for ConvMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConvMode::Standard => "standard",
            ConvMode::Dilated => "dilated",
            ConvMode::Depthwise => "depthwise",
        };
        f.write_str(name)
    }
}

/// A forward or transposed convolution behind one interface
#[derive(Debug, Clone)]
pub enum SpatialConv {
    Forward(Conv3d),
    Transposed(ConvTranspose3d),
}

impl SpatialConv {
    pub fn new<R: Rng + ?Sized>(spec: ConvSpec, transposed: bool, rng: &mut R) -> Result<Self> {
        Ok(if transposed {
            SpatialConv::Transposed(ConvTranspose3d::new(spec, rng)?)
        } else {
            SpatialConv::Forward(Conv3d::new(spec, rng)?)
        })
    }

    pub fn spec(&self) -> &ConvSpec {
        match self {
            SpatialConv::Forward(conv) => conv.spec(),
            SpatialConv::Transposed(conv) => conv.spec(),
        }
    }

    pub fn is_transposed(&self) -> bool {
        matches!(self, SpatialConv::Transposed(_))
    }

    pub fn forward(&self, x: &Volume) -> Result<Volume> {
        match self {
            SpatialConv::Forward(conv) => conv.forward(x),
            SpatialConv::Transposed(conv) => conv.forward(x),
        }
    }

    pub fn num_parameters(&self) -> usize {
        match self {
            SpatialConv::Forward(conv) => conv.num_parameters(),
            SpatialConv::Transposed(conv) => conv.num_parameters(),
        }
    }
}

/// Weight-transform of [`ConvOps`]
#[derive(Debug, Clone)]
pub struct ConvTransform {
    mode: ConvMode,
    /// Main (or depthwise) convolution
    conv: SpatialConv,
    /// 1x1x1 channel mixer, present for depthwise-separable mode
    pointwise: Option<Conv3d>,
}

impl ConvTransform {
    fn new<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        options: &ConvOptions,
        rng: &mut R,
    ) -> Result<Self> {
        let base = ConvSpec::new(in_channels, out_channels, options.kernel_size)
            .with_stride(options.stride)
            .with_dilation(options.dilation);

        if options.use_depthwise {
            let depth_spec = ConvSpec {
                out_channels: in_channels,
                groups: in_channels,
                ..base
            };
            let conv = SpatialConv::new(depth_spec, options.use_transpose, rng)?;
            let pointwise = Conv3d::new(ConvSpec::new(in_channels, out_channels, 1), rng)?;
            Ok(Self {
                mode: ConvMode::Depthwise,
                conv,
                pointwise: Some(pointwise),
            })
        } else {
            let mode = if options.dilation > 1 {
                ConvMode::Dilated
            } else {
                ConvMode::Standard
            };
            Ok(Self {
                mode,
                conv: SpatialConv::new(base, options.use_transpose, rng)?,
                pointwise: None,
            })
        }
    }

    pub fn mode(&self) -> ConvMode {
        self.mode
    }

    pub fn is_transposed(&self) -> bool {
        self.conv.is_transposed()
    }

    pub fn conv(&self) -> &SpatialConv {
        &self.conv
    }

    pub fn pointwise(&self) -> Option<&Conv3d> {
        self.pointwise.as_ref()
    }
}

impl WeightTransform for ConvTransform {
    fn weight_call(&mut self, x: &Volume) -> Result<Volume> {
        let out = self.conv.forward(x)?;
        match &self.pointwise {
            Some(pointwise) => pointwise.forward(&out),
            None => Ok(out),
        }
    }

    fn num_parameters(&self) -> usize {
        self.conv.num_parameters() + self.pointwise.as_ref().map_or(0, Conv3d::num_parameters)
    }
}

/// Convolution operation
pub type ConvOps = BaseOp<ConvTransform>;

impl BaseOp<ConvTransform> {
    /// Build a convolution op; the mode follows `use_depthwise`,
    /// `use_transpose` and `dilation`
    pub fn new<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        options: ConvOptions,
        rng: &mut R,
    ) -> Result<Self> {
        let transform = ConvTransform::new(in_channels, out_channels, &options, rng)?;
        debug!(
            in_channels,
            out_channels,
            mode = %transform.mode(),
            transposed = options.use_transpose,
            stride = options.stride,
            "Built conv op"
        );
        BaseOp::assemble(
            in_channels,
            out_channels,
            options.dropout_rate,
            &options.ops_order,
            transform,
            rng,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VolnasError;
    use ndarray::{s, Axis};
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn rng() -> Xoshiro256PlusPlus {
        Xoshiro256PlusPlus::seed_from_u64(11)
    }

    fn random_volume(shape: (usize, usize, usize, usize, usize)) -> Volume {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);
        Volume::from_shape_simple_fn(shape, || rng.gen_range(-1.0..1.0))
    }

    #[test]
    fn test_modes() {
        let cases = [
            (ConvOptions::default(), ConvMode::Standard, false),
            (ConvOptions::default().with_dilation(2), ConvMode::Dilated, false),
            (ConvOptions::default().depthwise(), ConvMode::Depthwise, false),
            (ConvOptions::default().with_stride(2).transposed(), ConvMode::Standard, true),
        ];
        for (options, mode, transposed) in cases {
            let op = ConvOps::new(8, 8, options, &mut rng()).unwrap();
            assert_eq!(op.transform().mode(), mode);
            assert_eq!(op.transform().is_transposed(), transposed);
        }
    }

    #[test]
    fn test_resolution() {
        let x = random_volume((1, 4, 8, 8, 8));
        let same = ConvOps::new(4, 4, ConvOptions::default(), &mut rng()).unwrap();
        let down = ConvOps::new(4, 4, ConvOptions::default().with_stride(2), &mut rng()).unwrap();
        let up = ConvOps::new(4, 4, ConvOptions::default().with_stride(2).transposed(), &mut rng())
            .unwrap();

        for (mut op, size) in [(same, 8), (down, 4), (up, 16)] {
            let y = op.apply(&x).unwrap();
            assert_eq!(y.shape(), &[1, 4, size, size, size]);
        }
    }

    #[test]
    fn test_depthwise_separable_changes_channels() {
        let options = ConvOptions::default().depthwise();
        let mut op = ConvOps::new(4, 6, options, &mut rng()).unwrap();
        let y = op.apply(&random_volume((2, 4, 4, 4, 4))).unwrap();
        assert_eq!(y.shape(), &[2, 6, 4, 4, 4]);
        let pointwise = op.transform().pointwise().unwrap();
        assert_eq!(pointwise.spec().kernel_size, 1);
        assert_eq!(op.transform().conv().spec().groups, 4);
        // depthwise 4*1*27+4, pointwise 6*4+6, norm 2*6
        assert_eq!(op.num_parameters(), 112 + 30 + 12);
    }

    #[test]
    fn test_weight_norm_act_pipeline() {
        let mut op = ConvOps::new(32, 32, ConvOptions::default(), &mut rng()).unwrap();
        assert_eq!(op.norm().unwrap().num_groups(), 2);

        let x = random_volume((1, 32, 4, 4, 4));
        let y = op.apply(&x).unwrap();

        // Recompute conv -> group norm -> relu by hand
        let conv_out = op.transform().conv().forward(&x).unwrap();
        let normed = op.norm().unwrap().forward(&conv_out).unwrap();
        let expected = normed.mapv(|v| v.max(0.0));
        for (a, b) in y.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-9);
        }

        // Pre-activation statistics per group sit on the conv output
        for g in 0..2 {
            let block = normed.slice(s![0, g * 16..(g + 1) * 16, .., .., ..]);
            assert!(block.mean().unwrap().abs() < 1e-9);
        }
        assert!(y.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_dropout_before_weight() {
        let options = ConvOptions::default()
            .with_kernel_size(1)
            .with_dropout(0.5)
            .with_ops_order("weight");
        let mut op = ConvOps::new(8, 8, options, &mut rng()).unwrap();
        assert_eq!(op.dropout_rate(), 0.5);

        // Zero the bias so a dropped input channel leaves a trace only via weights
        if let SpatialConv::Forward(conv) = &mut op.transform_mut().conv {
            conv.bias_mut().fill(0.0);
            conv.weight_mut().fill(0.0);
            for c in 0..8 {
                conv.weight_mut()[[c, c, 0, 0, 0]] = 1.0;
            }
        }
        let y = op.apply(&Volume::ones((4, 8, 2, 2, 2))).unwrap();
        let zeroed = y
            .axis_iter(Axis(0))
            .flat_map(|sample| sample.outer_iter().map(|ch| ch.sum()).collect::<Vec<_>>())
            .filter(|&sum| sum == 0.0)
            .count();
        assert!(zeroed > 0, "dropout should drop some channels");

        op.eval();
        let y = op.apply(&Volume::ones((1, 8, 2, 2, 2))).unwrap();
        assert!(y.iter().all(|&v| (v - 1.0).abs() < 1e-12));
    }

    #[test]
    fn test_unrecognized_order() {
        let options = ConvOptions::default().with_ops_order("weight_foo");
        let mut op = ConvOps::new(4, 4, options, &mut rng()).unwrap();
        let err = op.apply(&random_volume((1, 4, 4, 4, 4))).unwrap_err();
        assert!(matches!(err, VolnasError::ConfigError(_)));
    }
}
