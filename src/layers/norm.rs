//! Group normalization

use ndarray::parallel::prelude::*;
use ndarray::{s, Array1, Axis};

use super::{check_channels, Volume};
use crate::error::{Result, VolnasError};

/// Group Normalization
///
/// Normalizes each group of channels over the group's channels and all
/// spatial positions, per sample. Independent of batch size.
#[derive(Debug, Clone)]
pub struct GroupNorm {
    num_groups: usize,
    num_channels: usize,
    /// Epsilon for numerical stability
    eps: f64,
    /// Learnable scale (gamma)
    gamma: Array1<f64>,
    /// Learnable shift (beta)
    beta: Array1<f64>,
}

impl GroupNorm {
    /// Create a group norm with unit scale and zero shift
    pub fn new(num_groups: usize, num_channels: usize) -> Result<Self> {
        if num_groups == 0 || num_channels == 0 || num_channels % num_groups != 0 {
            return Err(VolnasError::ConfigError(format!(
                "num_channels={} must be a positive multiple of num_groups={}",
                num_channels, num_groups
            )));
        }
        Ok(Self {
            num_groups,
            num_channels,
            eps: 1e-5,
            gamma: Array1::ones(num_channels),
            beta: Array1::zeros(num_channels),
        })
    }

    pub fn with_eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }

    pub fn num_groups(&self) -> usize {
        self.num_groups
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn gamma_mut(&mut self) -> &mut Array1<f64> {
        &mut self.gamma
    }

    pub fn beta_mut(&mut self) -> &mut Array1<f64> {
        &mut self.beta
    }

    pub fn num_parameters(&self) -> usize {
        self.gamma.len() + self.beta.len()
    }

    /// Forward pass
    pub fn forward(&self, x: &Volume) -> Result<Volume> {
        check_channels(x, self.num_channels)?;
        let per_group = self.num_channels / self.num_groups;
        let mut out = x.to_owned();

        out.axis_iter_mut(Axis(0))
            .into_par_iter()
            .for_each(|mut sample| {
                for g in 0..self.num_groups {
                    let start = g * per_group;
                    let mut block = sample.slice_mut(s![start..start + per_group, .., .., ..]);
                    let count = block.len().max(1) as f64;
                    let mean = block.sum() / count;
                    let var = block.fold(0.0, |acc, &v| acc + (v - mean) * (v - mean)) / count;
                    let inv_std = 1.0 / (var + self.eps).sqrt();

                    for (offset, mut channel) in block.axis_iter_mut(Axis(0)).enumerate() {
                        let c = start + offset;
                        let (gamma, beta) = (self.gamma[c], self.beta[c]);
                        channel.mapv_inplace(|v| (v - mean) * inv_std * gamma + beta);
                    }
                }
            });

        Ok(out)
    }
}
