//! volnas - Volumetric operation catalog for neural architecture search
//!
//! This crate provides the candidate operations a NAS controller composes
//! into cells over 3-D volumes `(batch, channel, depth, height, width)`:
//! - Convolutions: standard, dilated, depthwise-separable, transposed
//! - Squeeze-and-excitation convolution
//! - Average and max pooling
//! - Identity
//!
//! # Modules
//!
//! - [`layers`] - Tensor primitives (convolution, group norm, pooling, ...)
//! - [`ops`] - Staged operations and their shared pipeline
//! - [`nas`] - Operation registry and Down/Up/Norm partitions
//! - [`cli`] - Command-line interface
//!
//! # Example
//!
//! ```
//! use volnas::prelude::*;
//!
//! let registry = OpsRegistry::new(OpsConfig::default().with_seed(7)).unwrap();
//! let mut op = registry.create("down_conv", 16, 2).unwrap();
//! let y = op.apply(&Volume::ones((1, 16, 8, 8, 8))).unwrap();
//! assert_eq!(y.shape(), &[1, 16, 4, 4, 4]);
//! ```

// Core error handling
pub mod error;

// Numerics
pub mod layers;
pub mod ops;

// Search space
pub mod nas;

// Services
pub mod cli;

pub use error::{Result, VolnasError};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{Result, VolnasError};

    // Tensors
    pub use crate::layers::Volume;

    // Operations
    pub use crate::ops::{
        ConvOps, ConvOptions, IdentityOp, Operation, OperationKind, OpsConfig, OpsOrder,
        PoolOptions, PoolType, PoolingOp, SEConvOp, SEConvOptions, Stage,
    };

    // Registry
    pub use crate::nas::{OpsRegistry, Resolution, DOWN_OPS, NORM_OPS, UP_OPS};
}
