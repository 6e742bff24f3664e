//! Strided, dilated and grouped 3-D convolutions

use ndarray::parallel::prelude::*;
use ndarray::{Array1, Array5, ArrayView4, ArrayViewMut4, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{check_channels, uniform_init, Volume};
use crate::error::{Result, VolnasError};

/// Per-axis zero padding, possibly uneven between the two ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Padding {
    /// Zeros before the first element
    pub front: usize,
    /// Zeros after the last element
    pub back: usize,
}

impl Padding {
    /// Equal padding on both ends
    pub fn symmetric(pad: usize) -> Self {
        Self { front: pad, back: pad }
    }

    /// Padding that maps an axis of length `L` to `L / stride`.
    ///
    /// The total is `dilation * (kernel - 1) - stride + 1`; the front gets
    /// the floor half and the back takes the remainder.
    pub fn same(kernel_size: usize, stride: usize, dilation: usize) -> Self {
        let total = (dilation * kernel_size.saturating_sub(1) + 1).saturating_sub(stride);
        let front = total / 2;
        Self {
            front,
            back: total - front,
        }
    }

    /// Sum of both ends
    pub fn total(&self) -> usize {
        self.front + self.back
    }
}

/// Shape and hyperparameters shared by forward and transposed convolutions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvSpec {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub dilation: usize,
    pub groups: usize,
    /// Explicit padding; `None` means [`Padding::same`]
    pub padding: Option<Padding>,
}

impl ConvSpec {
    /// Dense 3x3x3-style convolution with stride 1 and no dilation
    pub fn new(in_channels: usize, out_channels: usize, kernel_size: usize) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel_size,
            stride: 1,
            dilation: 1,
            groups: 1,
            padding: None,
        }
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_dilation(mut self, dilation: usize) -> Self {
        self.dilation = dilation;
        self
    }

    pub fn with_groups(mut self, groups: usize) -> Self {
        self.groups = groups;
        self
    }

    pub fn with_padding(mut self, padding: Padding) -> Self {
        self.padding = Some(padding);
        self
    }

    /// Padding actually applied
    pub fn resolved_padding(&self) -> Padding {
        self.padding
            .unwrap_or_else(|| Padding::same(self.kernel_size, self.stride, self.dilation))
    }

    /// Receptive field of one kernel along an axis
    fn effective_kernel(&self) -> usize {
        self.dilation * (self.kernel_size - 1) + 1
    }

    /// Check that every size is positive, groups divide both channel counts
    /// and same padding can reach `L / stride`
    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("in_channels", self.in_channels),
            ("out_channels", self.out_channels),
            ("kernel_size", self.kernel_size),
            ("stride", self.stride),
            ("dilation", self.dilation),
            ("groups", self.groups),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(VolnasError::ConfigError(format!("{} must be positive", name)));
            }
        }
        if self.in_channels % self.groups != 0 || self.out_channels % self.groups != 0 {
            return Err(VolnasError::ConfigError(format!(
                "groups={} must divide in_channels={} and out_channels={}",
                self.groups, self.in_channels, self.out_channels
            )));
        }
        if self.padding.is_none() && self.effective_kernel() < self.stride {
            return Err(VolnasError::ConfigError(format!(
                "same padding needs a kernel span of at least the stride, got span {} for stride {}",
                self.effective_kernel(),
                self.stride
            )));
        }
        Ok(())
    }

    /// Output length of the forward convolution along one axis
    fn forward_len(&self, len: usize) -> Option<usize> {
        let padded = len + self.resolved_padding().total();
        let span = self.effective_kernel();
        (padded >= span).then(|| (padded - span) / self.stride + 1)
    }

    /// Output length of the transposed convolution along one axis
    fn transposed_len(&self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        let full = (len - 1) * self.stride + self.effective_kernel();
        full.checked_sub(self.resolved_padding().total())
            .filter(|&n| n > 0)
    }
}

/// Position `index * stride + tap * dilation - front` if it lands inside `[0, len)`
#[inline]
fn strided_index(
    index: usize,
    tap: usize,
    stride: usize,
    dilation: usize,
    front: usize,
    len: usize,
) -> Option<usize> {
    let pos = (index * stride + tap * dilation).checked_sub(front)?;
    (pos < len).then_some(pos)
}

fn extent_error(spec: &ConvSpec, x: &Volume) -> VolnasError {
    VolnasError::ShapeError {
        expected: format!(
            "spatial extent covering a {}-wide kernel (dilation {}, padding {:?})",
            spec.kernel_size,
            spec.dilation,
            spec.resolved_padding()
        ),
        actual: format!("{:?}", x.shape()),
    }
}

/// 3-D convolution
#[derive(Debug, Clone)]
pub struct Conv3d {
    spec: ConvSpec,
    /// Shape `(out, in / groups, k, k, k)`
    weight: Array5<f64>,
    bias: Array1<f64>,
}

impl Conv3d {
    /// Create a convolution with uniformly initialized parameters
    pub fn new<R: Rng + ?Sized>(spec: ConvSpec, rng: &mut R) -> Result<Self> {
        spec.validate()?;
        let k = spec.kernel_size;
        let in_per_group = spec.in_channels / spec.groups;
        let fan_in = in_per_group * k * k * k;

        let weight = uniform_init((spec.out_channels, in_per_group, k, k, k), fan_in, rng);
        let bias = uniform_init(spec.out_channels, fan_in, rng);

        Ok(Self { spec, weight, bias })
    }

    pub fn spec(&self) -> &ConvSpec {
        &self.spec
    }

    pub fn weight(&self) -> &Array5<f64> {
        &self.weight
    }

    pub fn weight_mut(&mut self) -> &mut Array5<f64> {
        &mut self.weight
    }

    pub fn bias_mut(&mut self) -> &mut Array1<f64> {
        &mut self.bias
    }

    pub fn num_parameters(&self) -> usize {
        self.weight.len() + self.bias.len()
    }

    /// Forward pass, parallel over the batch axis
    pub fn forward(&self, x: &Volume) -> Result<Volume> {
        check_channels(x, self.spec.in_channels)?;
        let (n, _, d, h, w) = x.dim();
        let (od, oh, ow) = match (
            self.spec.forward_len(d),
            self.spec.forward_len(h),
            self.spec.forward_len(w),
        ) {
            (Some(od), Some(oh), Some(ow)) => (od, oh, ow),
            _ => return Err(extent_error(&self.spec, x)),
        };

        let mut out = Array5::zeros((n, self.spec.out_channels, od, oh, ow));
        out.axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(x.axis_iter(Axis(0)).into_par_iter())
            .for_each(|(mut sample_out, sample)| self.forward_sample(sample, &mut sample_out));

        Ok(out)
    }

    fn forward_sample(&self, x: ArrayView4<f64>, out: &mut ArrayViewMut4<f64>) {
        let spec = &self.spec;
        let k = spec.kernel_size;
        let front = spec.resolved_padding().front;
        let in_per_group = spec.in_channels / spec.groups;
        let out_per_group = spec.out_channels / spec.groups;
        let (_, d, h, w) = x.dim();
        let (channels, od, oh, ow) = out.dim();

        for oc in 0..channels {
            let group = oc / out_per_group;
            for z in 0..od {
                for y in 0..oh {
                    for xi in 0..ow {
                        let mut acc = self.bias[oc];
                        for icg in 0..in_per_group {
                            let ic = group * in_per_group + icg;
                            for kd in 0..k {
                                let Some(iz) = strided_index(z, kd, spec.stride, spec.dilation, front, d) else {
                                    continue;
                                };
                                for kh in 0..k {
                                    let Some(iy) = strided_index(y, kh, spec.stride, spec.dilation, front, h) else {
                                        continue;
                                    };
                                    for kw in 0..k {
                                        let Some(ix) = strided_index(xi, kw, spec.stride, spec.dilation, front, w) else {
                                            continue;
                                        };
                                        acc += self.weight[[oc, icg, kd, kh, kw]] * x[[ic, iz, iy, ix]];
                                    }
                                }
                            }
                        }
                        out[[oc, z, y, xi]] = acc;
                    }
                }
            }
        }
    }
}

/// Transposed 3-D convolution (the adjoint of [`Conv3d`] with the same spec)
#[derive(Debug, Clone)]
pub struct ConvTranspose3d {
    spec: ConvSpec,
    /// Shape `(in, out / groups, k, k, k)`
    weight: Array5<f64>,
    bias: Array1<f64>,
}

impl ConvTranspose3d {
    /// Create a transposed convolution with uniformly initialized parameters
    pub fn new<R: Rng + ?Sized>(spec: ConvSpec, rng: &mut R) -> Result<Self> {
        spec.validate()?;
        let k = spec.kernel_size;
        let out_per_group = spec.out_channels / spec.groups;
        let fan_in = out_per_group * k * k * k;

        let weight = uniform_init((spec.in_channels, out_per_group, k, k, k), fan_in, rng);
        let bias = uniform_init(spec.out_channels, fan_in, rng);

        Ok(Self { spec, weight, bias })
    }

    pub fn spec(&self) -> &ConvSpec {
        &self.spec
    }

    pub fn weight(&self) -> &Array5<f64> {
        &self.weight
    }

    pub fn weight_mut(&mut self) -> &mut Array5<f64> {
        &mut self.weight
    }

    pub fn bias_mut(&mut self) -> &mut Array1<f64> {
        &mut self.bias
    }

    pub fn num_parameters(&self) -> usize {
        self.weight.len() + self.bias.len()
    }

    /// Forward pass, parallel over the batch axis
    pub fn forward(&self, x: &Volume) -> Result<Volume> {
        check_channels(x, self.spec.in_channels)?;
        let (n, _, d, h, w) = x.dim();
        let (od, oh, ow) = match (
            self.spec.transposed_len(d),
            self.spec.transposed_len(h),
            self.spec.transposed_len(w),
        ) {
            (Some(od), Some(oh), Some(ow)) => (od, oh, ow),
            _ => return Err(extent_error(&self.spec, x)),
        };

        let mut out = Array5::zeros((n, self.spec.out_channels, od, oh, ow));
        out.axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(x.axis_iter(Axis(0)).into_par_iter())
            .for_each(|(mut sample_out, sample)| self.forward_sample(sample, &mut sample_out));

        Ok(out)
    }

    /// Scatter each input voxel through the kernel into the cropped output
    fn forward_sample(&self, x: ArrayView4<f64>, out: &mut ArrayViewMut4<f64>) {
        let spec = &self.spec;
        let k = spec.kernel_size;
        let front = spec.resolved_padding().front;
        let in_per_group = spec.in_channels / spec.groups;
        let out_per_group = spec.out_channels / spec.groups;
        let (_, od, oh, ow) = out.dim();

        for (oc, mut channel) in out.axis_iter_mut(Axis(0)).enumerate() {
            channel.fill(self.bias[oc]);
        }

        for ((ic, z, y, xi), &value) in x.indexed_iter() {
            if value == 0.0 {
                continue;
            }
            let group = ic / in_per_group;
            for ocg in 0..out_per_group {
                let oc = group * out_per_group + ocg;
                for kd in 0..k {
                    let Some(tz) = strided_index(z, kd, spec.stride, spec.dilation, front, od) else {
                        continue;
                    };
                    for kh in 0..k {
                        let Some(ty) = strided_index(y, kh, spec.stride, spec.dilation, front, oh) else {
                            continue;
                        };
                        for kw in 0..k {
                            let Some(tx) = strided_index(xi, kw, spec.stride, spec.dilation, front, ow) else {
                                continue;
                            };
                            out[[oc, tz, ty, tx]] += value * self.weight[[ic, ocg, kd, kh, kw]];
                        }
                    }
                }
            }
        }
    }
}
