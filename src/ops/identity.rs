//! Pass-through op

use rand::Rng;

use super::base::{BaseOp, WeightTransform};
use crate::error::{Result, VolnasError};
use crate::layers::Volume;

/// Weight-transform that returns its input
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransform;

impl WeightTransform for IdentityTransform {
    fn weight_call(&mut self, x: &Volume) -> Result<Volume> {
        Ok(x.to_owned())
    }
}

/// Identity operation; norm and act stages still run if ordered
pub type IdentityOp = BaseOp<IdentityTransform>;

impl BaseOp<IdentityTransform> {
    pub fn new<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        ops_order: &str,
        rng: &mut R,
    ) -> Result<Self> {
        if in_channels != out_channels {
            return Err(VolnasError::ConfigError(format!(
                "identity keeps channels, got in={} out={}",
                in_channels, out_channels
            )));
        }
        BaseOp::assemble(in_channels, out_channels, 0.0, ops_order, IdentityTransform, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn test_identity_weight_only() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        let mut op = IdentityOp::new(2, 2, "weight", &mut rng).unwrap();
        let x = Volume::from_shape_fn((1, 2, 2, 2, 2), |(_, c, z, _, _)| (c + z) as f64 - 1.0);
        assert_eq!(op.apply(&x).unwrap(), x);
    }

    #[test]
    fn test_identity_normalizes_and_activates() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        let mut op = IdentityOp::new(16, 16, "weight_norm_act", &mut rng).unwrap();
        let x = Volume::from_shape_fn((1, 16, 2, 2, 2), |(_, c, z, y, x)| (c * 8 + z * 4 + y * 2 + x) as f64);
        let y = op.apply(&x).unwrap();
        assert_eq!(y.shape(), x.shape());
        assert!(y.iter().all(|&v| v >= 0.0));
        // Half the voxels sit below the mean and are clipped
        let zeros = y.iter().filter(|&&v| v == 0.0).count();
        assert_eq!(zeros, y.len() / 2);
    }

    #[test]
    fn test_identity_rejects_channel_change() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        assert!(IdentityOp::new(2, 4, "weight", &mut rng).is_err());
    }
}
