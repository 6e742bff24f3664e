//! Operation registry
//!
//! Maps symbolic operation names to factories and partitions the names by
//! how they change spatial resolution. Resampling entries always scale by
//! [`RESAMPLE_STRIDE`].

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use rand::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, VolnasError};
use crate::ops::{
    ConvMode, ConvOps, ConvOptions, IdentityOp, Operation, OperationKind, OpsConfig, PoolOptions,
    PoolType, PoolingOp, SEConvOp, SEConvOptions,
};
use crate::ops::OperationKind::{Conv, Identity, Pooling, SEConv};
use self::Resolution::{Down, Norm, Up};

/// Factor by which down entries shrink and up entries grow each spatial axis
pub const RESAMPLE_STRIDE: usize = 2;

/// Builds an operation on `channels` under shared defaults
pub type OpFactory = fn(usize, &OpsConfig, &mut dyn RngCore) -> Result<Operation>;

/// How an operation changes spatial resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Divides each spatial extent by [`RESAMPLE_STRIDE`]
    Down,
    /// Multiplies each spatial extent by [`RESAMPLE_STRIDE`]
    Up,
    /// Preserves spatial extents
    Norm,
}

impl Resolution {
    pub fn all() -> [Self; 3] {
        [Resolution::Down, Resolution::Up, Resolution::Norm]
    }

    /// Names in this partition, in registry order
    pub fn op_names(&self) -> &'static [&'static str] {
        match self {
            Resolution::Down => &DOWN_OPS,
            Resolution::Up => &UP_OPS,
            Resolution::Norm => &NORM_OPS,
        }
    }

    /// Stride the entries of this class are built with
    pub fn stride(&self) -> usize {
        match self {
            Resolution::Down | Resolution::Up => RESAMPLE_STRIDE,
            Resolution::Norm => 1,
        }
    }

    /// Spatial extent after an op of this class
    pub fn output_extent(&self, len: usize) -> usize {
        match self {
            Resolution::Down => len / RESAMPLE_STRIDE,
            Resolution::Up => len * RESAMPLE_STRIDE,
            Resolution::Norm => len,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Resolution::Down => "down",
            Resolution::Up => "up",
            Resolution::Norm => "norm",
        })
    }
}

impl FromStr for Resolution {
    type Err = VolnasError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "down" => Ok(Resolution::Down),
            "up" => Ok(Resolution::Up),
            "norm" => Ok(Resolution::Norm),
            other => Err(VolnasError::ConfigError(format!(
                "unknown resolution class '{}', expected down, up or norm",
                other
            ))),
        }
    }
}

/// Resolution-reducing operations
pub const DOWN_OPS: [&str; 6] = [
    "avg_pool",
    "max_pool",
    "down_se_conv",
    "down_dil_conv",
    "down_dep_conv",
    "down_conv",
];

/// Resolution-increasing operations
pub const UP_OPS: [&str; 4] = ["up_se_conv", "up_dep_conv", "up_conv", "up_dil_conv"];

/// Resolution-preserving operations
pub const NORM_OPS: [&str; 5] = ["identity", "se_conv", "dil_conv", "dep_conv", "conv"];

/// One named factory
#[derive(Debug, Clone, Copy)]
pub struct RegistryEntry {
    pub name: &'static str,
    pub resolution: Resolution,
    /// Kind of the operation the factory builds
    pub kind: OperationKind,
    factory: OpFactory,
}

const fn entry(
    name: &'static str,
    resolution: Resolution,
    kind: OperationKind,
    factory: OpFactory,
) -> RegistryEntry {
    RegistryEntry { name, resolution, kind, factory }
}

static ENTRIES: [RegistryEntry; 15] = [
    entry("identity", Norm, Identity, identity),
    entry("se_conv", Norm, SEConv, se_conv),
    entry("dil_conv", Norm, Conv(ConvMode::Dilated), dil_conv),
    entry("dep_conv", Norm, Conv(ConvMode::Depthwise), dep_conv),
    entry("conv", Norm, Conv(ConvMode::Standard), conv),
    entry("avg_pool", Down, Pooling(PoolType::Avg), avg_pool),
    entry("max_pool", Down, Pooling(PoolType::Max), max_pool),
    entry("down_se_conv", Down, SEConv, down_se_conv),
    entry("down_dil_conv", Down, Conv(ConvMode::Dilated), down_dil_conv),
    entry("down_dep_conv", Down, Conv(ConvMode::Depthwise), down_dep_conv),
    entry("down_conv", Down, Conv(ConvMode::Standard), down_conv),
    entry("up_se_conv", Up, SEConv, up_se_conv),
    entry("up_dep_conv", Up, Conv(ConvMode::Depthwise), up_dep_conv),
    entry("up_conv", Up, Conv(ConvMode::Standard), up_conv),
    entry("up_dil_conv", Up, Conv(ConvMode::Dilated), up_dil_conv),
];

fn conv_options(config: &OpsConfig) -> ConvOptions {
    ConvOptions::default()
        .with_kernel_size(config.kernel_size)
        .with_dropout(config.dropout_rate)
        .with_ops_order(config.conv_ops_order.as_str())
}

fn se_options(config: &OpsConfig) -> SEConvOptions {
    SEConvOptions::default()
        .with_kernel_size(config.kernel_size)
        .with_dropout(config.dropout_rate)
        .with_ops_order(config.se_ops_order.as_str())
}

fn pool_options(config: &OpsConfig) -> PoolOptions {
    PoolOptions::default()
        .with_window(RESAMPLE_STRIDE)
        .with_ops_order(config.pool_ops_order.as_str())
}

fn identity(c: usize, config: &OpsConfig, rng: &mut dyn RngCore) -> Result<Operation> {
    Ok(IdentityOp::new(c, c, &config.identity_ops_order, rng)?.into())
}

fn se_conv(c: usize, config: &OpsConfig, rng: &mut dyn RngCore) -> Result<Operation> {
    Ok(SEConvOp::new(c, c, se_options(config), rng)?.into())
}

fn dil_conv(c: usize, config: &OpsConfig, rng: &mut dyn RngCore) -> Result<Operation> {
    Ok(ConvOps::new(c, c, conv_options(config).with_dilation(2), rng)?.into())
}

fn dep_conv(c: usize, config: &OpsConfig, rng: &mut dyn RngCore) -> Result<Operation> {
    Ok(ConvOps::new(c, c, conv_options(config).depthwise(), rng)?.into())
}

fn conv(c: usize, config: &OpsConfig, rng: &mut dyn RngCore) -> Result<Operation> {
    Ok(ConvOps::new(c, c, conv_options(config), rng)?.into())
}

fn avg_pool(c: usize, config: &OpsConfig, rng: &mut dyn RngCore) -> Result<Operation> {
    Ok(PoolingOp::new(c, c, PoolType::Avg, pool_options(config), rng)?.into())
}

fn max_pool(c: usize, config: &OpsConfig, rng: &mut dyn RngCore) -> Result<Operation> {
    Ok(PoolingOp::new(c, c, PoolType::Max, pool_options(config), rng)?.into())
}

fn down_se_conv(c: usize, config: &OpsConfig, rng: &mut dyn RngCore) -> Result<Operation> {
    let options = se_options(config).with_stride(RESAMPLE_STRIDE);
    Ok(SEConvOp::new(c, c, options, rng)?.into())
}

fn down_dil_conv(c: usize, config: &OpsConfig, rng: &mut dyn RngCore) -> Result<Operation> {
    let options = conv_options(config)
        .with_stride(RESAMPLE_STRIDE)
        .with_dilation(2);
    Ok(ConvOps::new(c, c, options, rng)?.into())
}

fn down_dep_conv(c: usize, config: &OpsConfig, rng: &mut dyn RngCore) -> Result<Operation> {
    let options = conv_options(config).with_stride(RESAMPLE_STRIDE).depthwise();
    Ok(ConvOps::new(c, c, options, rng)?.into())
}

fn down_conv(c: usize, config: &OpsConfig, rng: &mut dyn RngCore) -> Result<Operation> {
    let options = conv_options(config).with_stride(RESAMPLE_STRIDE);
    Ok(ConvOps::new(c, c, options, rng)?.into())
}

fn up_se_conv(c: usize, config: &OpsConfig, rng: &mut dyn RngCore) -> Result<Operation> {
    let options = se_options(config).with_stride(RESAMPLE_STRIDE).transposed();
    Ok(SEConvOp::new(c, c, options, rng)?.into())
}

fn up_dep_conv(c: usize, config: &OpsConfig, rng: &mut dyn RngCore) -> Result<Operation> {
    let options = conv_options(config)
        .with_stride(RESAMPLE_STRIDE)
        .depthwise()
        .transposed();
    Ok(ConvOps::new(c, c, options, rng)?.into())
}

fn up_conv(c: usize, config: &OpsConfig, rng: &mut dyn RngCore) -> Result<Operation> {
    let options = conv_options(config).with_stride(RESAMPLE_STRIDE).transposed();
    Ok(ConvOps::new(c, c, options, rng)?.into())
}

fn up_dil_conv(c: usize, config: &OpsConfig, rng: &mut dyn RngCore) -> Result<Operation> {
    let options = conv_options(config)
        .with_stride(RESAMPLE_STRIDE)
        .with_dilation(2)
        .transposed();
    Ok(ConvOps::new(c, c, options, rng)?.into())
}

/// Name → factory lookup table
#[derive(Debug, Clone)]
pub struct OpsRegistry {
    config: OpsConfig,
    entries: HashMap<&'static str, RegistryEntry>,
}

impl Default for OpsRegistry {
    fn default() -> Self {
        Self::with_config(OpsConfig::default())
    }
}

impl OpsRegistry {
    /// Create a registry after validating `config`
    pub fn new(config: OpsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_config(config))
    }

    fn with_config(config: OpsConfig) -> Self {
        let entries = ENTRIES.iter().map(|entry| (entry.name, *entry)).collect();
        Self { config, entries }
    }

    pub fn config(&self) -> &OpsConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&RegistryEntry> {
        self.entries.get(name)
    }

    pub fn resolution_of(&self, name: &str) -> Option<Resolution> {
        self.get(name).map(|entry| entry.resolution)
    }

    /// Entries in table order
    pub fn entries(&self) -> impl Iterator<Item = &'static RegistryEntry> {
        ENTRIES.iter()
    }

    /// Names in table order
    pub fn names(&self) -> impl Iterator<Item = &'static str> {
        ENTRIES.iter().map(|entry| entry.name)
    }

    /// Build `name` with freshly initialized parameters.
    ///
    /// Uses the configured seed when present, entropy otherwise.
    pub fn create(&self, name: &str, channels: usize, stride: usize) -> Result<Operation> {
        let mut rng = match self.config.seed {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };
        self.create_with_rng(name, channels, stride, &mut rng)
    }

    /// Build `name`, drawing parameters from `rng`.
    ///
    /// `stride` is accepted for the factory calling convention only: down and
    /// up entries always resample by [`RESAMPLE_STRIDE`] and norm entries run
    /// at stride 1.
    pub fn create_with_rng(
        &self,
        name: &str,
        channels: usize,
        stride: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Operation> {
        let entry = self
            .get(name)
            .ok_or_else(|| VolnasError::UnknownOperation(name.to_string()))?;

        let op = (entry.factory)(channels, &self.config, rng)?;
        debug!(
            name,
            channels,
            requested_stride = stride,
            stride = entry.resolution.stride(),
            resolution = %entry.resolution,
            parameters = op.num_parameters(),
            "Created operation"
        );
        Ok(op)
    }
}
