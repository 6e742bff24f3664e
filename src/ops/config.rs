//! Defaults applied when the registry builds operations

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::order::OpsOrder;
use crate::error::{Result, VolnasError};

/// Operation defaults shared by all registry entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpsConfig {
    /// Kernel size of every convolution
    pub kernel_size: usize,
    /// Channel dropout rate ahead of convolution weights
    pub dropout_rate: f64,
    /// Ops-order for conv, dil_conv, dep_conv and their down/up variants
    pub conv_ops_order: String,
    /// Ops-order for se_conv variants
    pub se_ops_order: String,
    /// Ops-order for pooling
    pub pool_ops_order: String,
    /// Ops-order for identity
    pub identity_ops_order: String,
    /// Seed for parameter initialization; entropy when absent
    pub seed: Option<u64>,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            kernel_size: 3,
            dropout_rate: 0.0,
            conv_ops_order: "weight_norm_act".to_string(),
            se_ops_order: "weight_norm".to_string(),
            pool_ops_order: "weight".to_string(),
            identity_ops_order: "weight_norm_act".to_string(),
            seed: None,
        }
    }
}

impl OpsConfig {
    pub fn with_kernel_size(mut self, kernel_size: usize) -> Self {
        self.kernel_size = kernel_size;
        self
    }

    pub fn with_dropout(mut self, rate: f64) -> Self {
        self.dropout_rate = rate;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_conv_ops_order(mut self, ops_order: impl Into<String>) -> Self {
        self.conv_ops_order = ops_order.into();
        self
    }

    /// Check sizes, rates and every ops-order string
    pub fn validate(&self) -> Result<()> {
        // Stride-2 down and up entries need a span of at least 2 to pad to same
        if self.kernel_size < 2 {
            return Err(VolnasError::ConfigError(format!(
                "kernel_size must be at least 2, got {}",
                self.kernel_size
            )));
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(VolnasError::ConfigError(format!(
                "dropout_rate must be in [0, 1), got {}",
                self.dropout_rate
            )));
        }
        for order in [
            &self.conv_ops_order,
            &self.se_ops_order,
            &self.pool_ops_order,
            &self.identity_ops_order,
        ] {
            order.parse::<OpsOrder>()?;
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
