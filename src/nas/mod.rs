//! Search-space metadata for a NAS controller
//!
//! The registry is the menu a controller samples from: each name maps to a
//! factory, and the Down/Up/Norm partitions tell it which entries change
//! spatial resolution.

mod registry;

pub use registry::{
    OpFactory, OpsRegistry, RegistryEntry, Resolution, DOWN_OPS, NORM_OPS, RESAMPLE_STRIDE,
    UP_OPS,
};
