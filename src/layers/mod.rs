//! Volumetric tensor primitives
//!
//! Forward-only layers over 5-D arrays laid out as
//! `(batch, channel, depth, height, width)`:
//! - [`Conv3d`] / [`ConvTranspose3d`] - grouped, strided, dilated convolution
//! - [`GroupNorm`] - group normalization with affine parameters
//! - [`AvgPool3d`] / [`MaxPool3d`] / [`AdaptiveAvgPool3d`] - pooling
//! - [`Linear`] - fully connected layer over `(batch, features)`
//! - [`Dropout3d`] - channel dropout
//! - [`ReLU`] / [`Sigmoid`] - element-wise activations

mod conv;
mod dense;
mod dropout;
mod norm;
mod pool;

pub use conv::{Conv3d, ConvSpec, ConvTranspose3d, Padding};
pub use dense::Linear;
pub use dropout::Dropout3d;
pub use norm::GroupNorm;
pub use pool::{AdaptiveAvgPool3d, AvgPool3d, MaxPool3d};

use ndarray::{Array, Array5, Dimension, ShapeBuilder};
use rand::Rng;

use crate::error::{Result, VolnasError};

/// 5-D volume `(batch, channel, depth, height, width)`
pub type Volume = Array5<f64>;

/// Rectified linear unit
#[derive(Debug, Clone, Copy, Default)]
pub struct ReLU;

impl ReLU {
    /// Apply `max(x, 0)` element-wise
    pub fn forward<D: Dimension>(&self, x: &Array<f64, D>) -> Array<f64, D> {
        x.mapv(|v| v.max(0.0))
    }
}

/// Logistic sigmoid
#[derive(Debug, Clone, Copy, Default)]
pub struct Sigmoid;

impl Sigmoid {
    /// Apply `1 / (1 + e^-x)` element-wise
    pub fn forward<D: Dimension>(&self, x: &Array<f64, D>) -> Array<f64, D> {
        x.mapv(|v| 1.0 / (1.0 + (-v).exp()))
    }
}

/// Uniform initialization in `[-1/sqrt(fan_in), 1/sqrt(fan_in))`
pub(crate) fn uniform_init<Sh, D, R>(shape: Sh, fan_in: usize, rng: &mut R) -> Array<f64, D>
where
    Sh: ShapeBuilder<Dim = D>,
    D: Dimension,
    R: Rng + ?Sized,
{
    let bound = 1.0 / (fan_in.max(1) as f64).sqrt();
    Array::from_shape_fn(shape, |_| rng.gen_range(-bound..bound))
}

/// Fail with a shape error unless `x` has `expected` channels
pub(crate) fn check_channels(x: &Volume, expected: usize) -> Result<()> {
    let channels = x.dim().1;
    if channels != expected {
        return Err(VolnasError::ShapeError {
            expected: format!("{} channels", expected),
            actual: format!("{} channels (shape {:?})", channels, x.shape()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn test_relu() {
        let x = Array2::from_shape_vec((1, 4), vec![-2.0, -0.5, 0.0, 3.0]).unwrap();
        let y = ReLU.forward(&x);
        assert_eq!(y.as_slice().unwrap(), &[0.0, 0.0, 0.0, 3.0]);
    }

    #[test]
    fn test_sigmoid_range() {
        let x = Array2::from_shape_vec((1, 3), vec![-50.0, 0.0, 50.0]).unwrap();
        let y = Sigmoid.forward(&x);
        assert!(y[[0, 0]] >= 0.0 && y[[0, 0]] < 1e-6);
        assert!((y[[0, 1]] - 0.5).abs() < 1e-12);
        assert!(y[[0, 2]] <= 1.0 && y[[0, 2]] > 1.0 - 1e-6);
    }

    #[test]
    fn test_uniform_init_bound() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        let w: Array2<f64> = uniform_init((16, 16), 4, &mut rng);
        assert!(w.iter().all(|&v| v.abs() <= 0.5));
    }

    #[test]
    fn test_check_channels() {
        let x = Volume::zeros((1, 3, 2, 2, 2));
        assert!(check_channels(&x, 3).is_ok());
        assert!(matches!(
            check_channels(&x, 4),
            Err(VolnasError::ShapeError { .. })
        ));
    }
}
