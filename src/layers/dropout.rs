//! Channel dropout

use ndarray::{s, Axis};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use super::Volume;

/// Dropout3d
///
/// Zeroes entire channels of each sample with probability `rate` and scales
/// the survivors by `1 / (1 - rate)`. Pass-through in evaluation mode.
#[derive(Debug, Clone)]
pub struct Dropout3d {
    rate: f64,
    /// Whether in training mode
    training: bool,
    rng: Xoshiro256PlusPlus,
}

impl Dropout3d {
    /// Create new dropout layer; the mask stream is seeded from `rng`
    pub fn new<R: Rng + ?Sized>(rate: f64, rng: &mut R) -> Self {
        Self {
            rate,
            training: true,
            rng: Xoshiro256PlusPlus::seed_from_u64(rng.gen()),
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Set training mode
    pub fn train(&mut self) {
        self.training = true;
    }

    /// Set evaluation mode
    pub fn eval(&mut self) {
        self.training = false;
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    /// Forward pass
    pub fn forward(&mut self, x: &Volume) -> Volume {
        if !self.training || self.rate <= 0.0 {
            return x.to_owned();
        }
        if self.rate >= 1.0 {
            return Volume::zeros(x.raw_dim());
        }

        let scale = 1.0 / (1.0 - self.rate);
        let mut out = x.to_owned();
        for b in 0..out.len_of(Axis(0)) {
            for c in 0..out.len_of(Axis(1)) {
                let keep = self.rng.gen::<f64>() >= self.rate;
                let factor = if keep { scale } else { 0.0 };
                out.slice_mut(s![b, c, .., .., ..]).mapv_inplace(|v| v * factor);
            }
        }
        out
    }
}
