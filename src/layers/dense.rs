//! Fully connected layer

use ndarray::{Array1, Array2};
use rand::Rng;

use super::uniform_init;

/// Linear layer `y = x·W + b`
#[derive(Debug, Clone)]
pub struct Linear {
    /// Input dimension
    in_features: usize,
    /// Output dimension
    out_features: usize,
    /// Weights, shape `(in, out)`
    weights: Array2<f64>,
    /// Bias
    bias: Array1<f64>,
}

impl Linear {
    /// Create new linear layer
    pub fn new<R: Rng + ?Sized>(in_features: usize, out_features: usize, rng: &mut R) -> Self {
        Self {
            in_features,
            out_features,
            weights: uniform_init((in_features, out_features), in_features, rng),
            bias: uniform_init(out_features, in_features, rng),
        }
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.out_features
    }

    pub fn weights_mut(&mut self) -> &mut Array2<f64> {
        &mut self.weights
    }

    pub fn bias_mut(&mut self) -> &mut Array1<f64> {
        &mut self.bias
    }

    pub fn num_parameters(&self) -> usize {
        self.weights.len() + self.bias.len()
    }

    /// Forward pass over a `(batch, in)` matrix
    pub fn forward(&self, x: &Array2<f64>) -> Array2<f64> {
        x.dot(&self.weights) + &self.bias
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn test_linear_shape() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let fc = Linear::new(8, 1, &mut rng);
        let out = fc.forward(&Array2::ones((3, 8)));
        assert_eq!(out.shape(), &[3, 1]);
        assert_eq!(fc.num_parameters(), 9);
    }

    #[test]
    fn test_linear_values() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let mut fc = Linear::new(2, 2, &mut rng);
        fc.weights_mut().assign(&ndarray::arr2(&[[1.0, 0.0], [0.0, 2.0]]));
        fc.bias_mut().fill(1.0);
        let out = fc.forward(&ndarray::arr2(&[[3.0, 4.0]]));
        assert_eq!(out, ndarray::arr2(&[[4.0, 9.0]]));
    }
}
