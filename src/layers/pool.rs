//! Windowed and global pooling

use ndarray::{s, Array2, Array5, ArrayView3, Zip};

use super::Volume;
use crate::error::{Result, VolnasError};

/// Output length of an unpadded window sweep
fn window_len(len: usize, kernel_size: usize, stride: usize) -> Option<usize> {
    (len >= kernel_size).then(|| (len - kernel_size) / stride + 1)
}

fn check_window(kernel_size: usize, stride: usize) -> Result<()> {
    if kernel_size == 0 || stride == 0 {
        return Err(VolnasError::ConfigError(format!(
            "pooling kernel_size={} and stride={} must be positive",
            kernel_size, stride
        )));
    }
    Ok(())
}

/// Slide a cubic window over every (sample, channel) and reduce it to a value
fn pool3d<F>(x: &Volume, kernel_size: usize, stride: usize, reduce: F) -> Result<Volume>
where
    F: Fn(ArrayView3<f64>) -> f64 + Sync,
{
    let (n, c, d, h, w) = x.dim();
    let (od, oh, ow) = match (
        window_len(d, kernel_size, stride),
        window_len(h, kernel_size, stride),
        window_len(w, kernel_size, stride),
    ) {
        (Some(od), Some(oh), Some(ow)) => (od, oh, ow),
        _ => {
            return Err(VolnasError::ShapeError {
                expected: format!("spatial extent of at least {} per axis", kernel_size),
                actual: format!("{:?}", x.shape()),
            })
        }
    };

    let mut out = Array5::zeros((n, c, od, oh, ow));
    Zip::indexed(&mut out).par_for_each(|(b, ch, z, y, xi), value| {
        let (z0, y0, x0) = (z * stride, y * stride, xi * stride);
        let window = x.slice(s![
            b,
            ch,
            z0..z0 + kernel_size,
            y0..y0 + kernel_size,
            x0..x0 + kernel_size
        ]);
        *value = reduce(window);
    });

    Ok(out)
}

/// Average pooling over cubic windows
#[derive(Debug, Clone, Copy)]
pub struct AvgPool3d {
    kernel_size: usize,
    stride: usize,
}

impl AvgPool3d {
    pub fn new(kernel_size: usize, stride: usize) -> Result<Self> {
        check_window(kernel_size, stride)?;
        Ok(Self { kernel_size, stride })
    }

    pub fn forward(&self, x: &Volume) -> Result<Volume> {
        pool3d(x, self.kernel_size, self.stride, |window| {
            window.mean().unwrap_or(0.0)
        })
    }
}

/// Max pooling over cubic windows
#[derive(Debug, Clone, Copy)]
pub struct MaxPool3d {
    kernel_size: usize,
    stride: usize,
}

impl MaxPool3d {
    pub fn new(kernel_size: usize, stride: usize) -> Result<Self> {
        check_window(kernel_size, stride)?;
        Ok(Self { kernel_size, stride })
    }

    pub fn forward(&self, x: &Volume) -> Result<Volume> {
        pool3d(x, self.kernel_size, self.stride, |window| {
            window.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v))
        })
    }
}

/// Global average pooling to one value per (sample, channel)
#[derive(Debug, Clone, Copy, Default)]
pub struct AdaptiveAvgPool3d;

impl AdaptiveAvgPool3d {
    /// Returns a `(batch, channel)` matrix
    pub fn forward(&self, x: &Volume) -> Array2<f64> {
        let (n, c, _, _, _) = x.dim();
        Array2::from_shape_fn((n, c), |(b, ch)| {
            x.slice(s![b, ch, .., .., ..]).mean().unwrap_or(0.0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> Volume {
        Volume::from_shape_fn((1, 2, 8, 8, 8), |(_, c, z, y, x)| {
            (c * 512 + z * 64 + y * 8 + x) as f64
        })
    }

    #[test]
    fn test_avg_pool_halves() {
        let pool = AvgPool3d::new(2, 2).unwrap();
        let out = pool.forward(&ramp()).unwrap();
        assert_eq!(out.shape(), &[1, 2, 4, 4, 4]);
        // Mean of {0,1,8,9,64,65,72,73}
        assert!((out[[0, 0, 0, 0, 0]] - 36.5).abs() < 1e-12);
    }

    #[test]
    fn test_max_pool_halves() {
        let pool = MaxPool3d::new(2, 2).unwrap();
        let out = pool.forward(&ramp()).unwrap();
        assert_eq!(out.shape(), &[1, 2, 4, 4, 4]);
        assert_eq!(out[[0, 0, 0, 0, 0]], 73.0);
        assert_eq!(out[[0, 1, 3, 3, 3]], 1023.0);
    }

    #[test]
    fn test_odd_extent_floors() {
        let pool = AvgPool3d::new(2, 2).unwrap();
        let out = pool.forward(&Volume::ones((1, 1, 5, 7, 3))).unwrap();
        assert_eq!(out.shape(), &[1, 1, 2, 3, 1]);
    }

    #[test]
    fn test_window_larger_than_input() {
        let pool = MaxPool3d::new(2, 2).unwrap();
        assert!(pool.forward(&Volume::ones((1, 1, 1, 4, 4))).is_err());
        assert!(AvgPool3d::new(0, 2).is_err());
    }

    #[test]
    fn test_global_average() {
        let out = AdaptiveAvgPool3d.forward(&ramp());
        assert_eq!(out.shape(), &[1, 2]);
        assert!((out[[0, 0]] - 255.5).abs() < 1e-9);
        assert!((out[[0, 1]] - 767.5).abs() < 1e-9);
    }
}
