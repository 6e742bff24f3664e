//! Average and max pooling ops

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::base::{BaseOp, WeightTransform};
use crate::error::{Result, VolnasError};
use crate::layers::{AvgPool3d, MaxPool3d, Volume};

/// Pooling reduction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolType {
    Avg,
    Max,
}

impl FromStr for PoolType {
    type Err = VolnasError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "avg" => Ok(PoolType::Avg),
            "max" => Ok(PoolType::Max),
            other => Err(VolnasError::Unimplemented(format!("pool type '{}'", other))),
        }
    }
}

impl fmt::Display for PoolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PoolType::Avg => "avg",
            PoolType::Max => "max",
        })
    }
}

/// Options for [`PoolingOp`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolOptions {
    pub kernel_size: usize,
    pub stride: usize,
    pub ops_order: String,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            kernel_size: 2,
            stride: 2,
            ops_order: "weight".to_string(),
        }
    }
}

impl PoolOptions {
    /// Non-overlapping windows of `size`
    pub fn with_window(mut self, size: usize) -> Self {
        self.kernel_size = size;
        self.stride = size;
        self
    }

    pub fn with_ops_order(mut self, ops_order: impl Into<String>) -> Self {
        self.ops_order = ops_order.into();
        self
    }
}

/// Weight-transform of [`PoolingOp`]
#[derive(Debug, Clone, Copy)]
pub enum PoolTransform {
    Avg(AvgPool3d),
    Max(MaxPool3d),
}

impl PoolTransform {
    pub fn pool_type(&self) -> PoolType {
        match self {
            PoolTransform::Avg(_) => PoolType::Avg,
            PoolTransform::Max(_) => PoolType::Max,
        }
    }
}

impl WeightTransform for PoolTransform {
    fn weight_call(&mut self, x: &Volume) -> Result<Volume> {
        match self {
            PoolTransform::Avg(pool) => pool.forward(x),
            PoolTransform::Max(pool) => pool.forward(x),
        }
    }
}

/// Pooling operation, no learnable parameters
pub type PoolingOp = BaseOp<PoolTransform>;

impl BaseOp<PoolTransform> {
    pub fn new<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        pool_type: PoolType,
        options: PoolOptions,
        rng: &mut R,
    ) -> Result<Self> {
        if in_channels != out_channels {
            return Err(VolnasError::ConfigError(format!(
                "pooling keeps channels, got in={} out={}",
                in_channels, out_channels
            )));
        }

        let transform = match pool_type {
            PoolType::Avg => PoolTransform::Avg(AvgPool3d::new(options.kernel_size, options.stride)?),
            PoolType::Max => PoolTransform::Max(MaxPool3d::new(options.kernel_size, options.stride)?),
        };
        debug!(
            channels = in_channels,
            pool = %pool_type,
            kernel_size = options.kernel_size,
            stride = options.stride,
            "Built pooling op"
        );

        BaseOp::assemble(in_channels, out_channels, 0.0, &options.ops_order, transform, rng)
    }

    /// Build from a pool type name; anything but `avg`/`max` is unimplemented
    pub fn from_name<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        pool_type: &str,
        options: PoolOptions,
        rng: &mut R,
    ) -> Result<Self> {
        Self::new(in_channels, out_channels, pool_type.parse()?, options, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn rng() -> Xoshiro256PlusPlus {
        Xoshiro256PlusPlus::seed_from_u64(0)
    }

    #[test]
    fn test_avg_pool_8_to_4() {
        let mut op = PoolingOp::new(3, 3, PoolType::Avg, PoolOptions::default(), &mut rng()).unwrap();
        let y = op.apply(&Volume::ones((2, 3, 8, 8, 8))).unwrap();
        assert_eq!(y.shape(), &[2, 3, 4, 4, 4]);
        assert!(y.iter().all(|&v| (v - 1.0).abs() < 1e-12));
        assert_eq!(op.num_parameters(), 0);
        assert!(op.norm().is_none());
        assert!(!op.has_activation());
    }

    #[test]
    fn test_max_pool() {
        let mut op = PoolingOp::from_name(1, 1, "max", PoolOptions::default(), &mut rng()).unwrap();
        assert_eq!(op.transform().pool_type(), PoolType::Max);
        let x = Volume::from_shape_fn((1, 1, 2, 2, 2), |(_, _, z, y, x)| (z * 4 + y * 2 + x) as f64);
        let y = op.apply(&x).unwrap();
        assert_eq!(y.shape(), &[1, 1, 1, 1, 1]);
        assert_eq!(y[[0, 0, 0, 0, 0]], 7.0);
    }

    #[test]
    fn test_unknown_pool_type() {
        let err = PoolingOp::from_name(4, 4, "lp", PoolOptions::default(), &mut rng()).unwrap_err();
        assert!(matches!(err, VolnasError::Unimplemented(_)));
        assert_eq!("avg".parse::<PoolType>().unwrap(), PoolType::Avg);
    }

    #[test]
    fn test_pool_with_norm_order() {
        let options = PoolOptions::default().with_ops_order("weight_norm_act");
        let mut op = PoolingOp::new(32, 32, PoolType::Max, options, &mut rng()).unwrap();
        assert_eq!(op.norm().unwrap().num_groups(), 2);
        let y = op.apply(&Volume::ones((1, 32, 4, 4, 4))).unwrap();
        assert_eq!(y.shape(), &[1, 32, 2, 2, 2]);
    }
}
