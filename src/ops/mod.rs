//! Candidate operations for volumetric search cells
//!
//! Every operation runs the same staged pipeline ([`BaseOp`]) around a
//! kind-specific weight-transform:
//! - [`ConvOps`] - standard, dilated, depthwise-separable, transposed
//! - [`SEConvOp`] - squeeze-and-excitation gating, optionally resampled
//! - [`PoolingOp`] - average or max pooling
//! - [`IdentityOp`] - pass-through
//!
//! [`Operation`] wraps the four kinds behind one `apply` entry point.

mod base;
mod config;
mod conv;
mod identity;
mod order;
mod pooling;
mod se_conv;

pub use base::{group_count, BaseOp, WeightTransform, CHANNELS_PER_GROUP};
pub use config::OpsConfig;
pub use conv::{ConvMode, ConvOps, ConvOptions, ConvTransform, SpatialConv};
pub use identity::{IdentityOp, IdentityTransform};
pub use order::{OpsOrder, Stage, STAGE_SEPARATOR};
pub use pooling::{PoolOptions, PoolTransform, PoolType, PoolingOp};
pub use se_conv::{SEConvOp, SEConvOptions, SETransform, SE_HIDDEN_UNITS};

use std::fmt;

use crate::error::Result;
use crate::layers::Volume;

/// Operation kind, without configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Identity,
    Conv(ConvMode),
    SEConv,
    Pooling(PoolType),
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Identity => write!(f, "identity"),
            OperationKind::Conv(mode) => write!(f, "{} conv", mode),
            OperationKind::SEConv => write!(f, "se conv"),
            OperationKind::Pooling(pool) => write!(f, "{} pool", pool),
        }
    }
}

/// A configured candidate operation
#[derive(Debug, Clone)]
pub enum Operation {
    Identity(IdentityOp),
    Conv(ConvOps),
    SEConv(SEConvOp),
    Pooling(PoolingOp),
}

impl Operation {
    /// Apply to a `(batch, in_channels, depth, height, width)` volume
    pub fn apply(&mut self, x: &Volume) -> Result<Volume> {
        match self {
            Operation::Identity(op) => op.apply(x),
            Operation::Conv(op) => op.apply(x),
            Operation::SEConv(op) => op.apply(x),
            Operation::Pooling(op) => op.apply(x),
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Identity(_) => OperationKind::Identity,
            Operation::Conv(op) => OperationKind::Conv(op.transform().mode()),
            Operation::SEConv(_) => OperationKind::SEConv,
            Operation::Pooling(op) => OperationKind::Pooling(op.transform().pool_type()),
        }
    }

    pub fn in_channels(&self) -> usize {
        match self {
            Operation::Identity(op) => op.in_channels(),
            Operation::Conv(op) => op.in_channels(),
            Operation::SEConv(op) => op.in_channels(),
            Operation::Pooling(op) => op.in_channels(),
        }
    }

    pub fn out_channels(&self) -> usize {
        match self {
            Operation::Identity(op) => op.out_channels(),
            Operation::Conv(op) => op.out_channels(),
            Operation::SEConv(op) => op.out_channels(),
            Operation::Pooling(op) => op.out_channels(),
        }
    }

    pub fn ops_order(&self) -> &OpsOrder {
        match self {
            Operation::Identity(op) => op.ops_order(),
            Operation::Conv(op) => op.ops_order(),
            Operation::SEConv(op) => op.ops_order(),
            Operation::Pooling(op) => op.ops_order(),
        }
    }

    /// Whether a normalization stage will run
    pub fn normalizes(&self) -> bool {
        match self {
            Operation::Identity(op) => op.norm().is_some(),
            Operation::Conv(op) => op.norm().is_some(),
            Operation::SEConv(op) => op.norm().is_some(),
            Operation::Pooling(op) => op.norm().is_some(),
        }
    }

    pub fn num_parameters(&self) -> usize {
        match self {
            Operation::Identity(op) => op.num_parameters(),
            Operation::Conv(op) => op.num_parameters(),
            Operation::SEConv(op) => op.num_parameters(),
            Operation::Pooling(op) => op.num_parameters(),
        }
    }

    /// Set training mode
    pub fn train(&mut self) {
        match self {
            Operation::Identity(op) => op.train(),
            Operation::Conv(op) => op.train(),
            Operation::SEConv(op) => op.train(),
            Operation::Pooling(op) => op.train(),
        }
    }

    /// Set evaluation mode
    pub fn eval(&mut self) {
        match self {
            Operation::Identity(op) => op.eval(),
            Operation::Conv(op) => op.eval(),
            Operation::SEConv(op) => op.eval(),
            Operation::Pooling(op) => op.eval(),
        }
    }
}

impl From<IdentityOp> for Operation {
    fn from(op: IdentityOp) -> Self {
        Operation::Identity(op)
    }
}

impl From<ConvOps> for Operation {
    fn from(op: ConvOps) -> Self {
        Operation::Conv(op)
    }
}

impl From<SEConvOp> for Operation {
    fn from(op: SEConvOp) -> Self {
        Operation::SEConv(op)
    }
}

impl From<PoolingOp> for Operation {
    fn from(op: PoolingOp) -> Self {
        Operation::Pooling(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn test_operation_dispatch() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let mut ops: Vec<Operation> = vec![
            IdentityOp::new(4, 4, "weight", &mut rng).unwrap().into(),
            ConvOps::new(4, 4, ConvOptions::default(), &mut rng).unwrap().into(),
            SEConvOp::new(4, 4, SEConvOptions::default(), &mut rng).unwrap().into(),
            PoolingOp::new(4, 4, PoolType::Avg, PoolOptions::default(), &mut rng)
                .unwrap()
                .into(),
        ];
        let x = Volume::ones((1, 4, 4, 4, 4));
        let sizes: Vec<usize> = ops
            .iter_mut()
            .map(|op| op.apply(&x).unwrap().dim().2)
            .collect();
        assert_eq!(sizes, vec![4, 4, 4, 2]);
        assert_eq!(ops[1].kind(), OperationKind::Conv(ConvMode::Standard));
        assert_eq!(ops[3].kind().to_string(), "avg pool");
        assert!(!ops[2].normalizes());
        assert!(ops.iter().all(|op| op.in_channels() == 4 && op.out_channels() == 4));
    }
}
