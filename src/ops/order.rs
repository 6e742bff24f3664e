//! Ops-order: which pipeline stages run, and in what order

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, VolnasError};

/// Separator between stage tokens in an ops-order string
pub const STAGE_SEPARATOR: char = '_';

/// One stage of an operation pipeline
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Dropout followed by the weight-transform
    Weight,
    /// Group normalization
    Norm,
    /// ReLU activation
    Act,
    /// Token that names no stage; rejected when the pipeline reaches it
    Unrecognized(String),
}

impl Stage {
    /// Parse a single token, keeping unknown tokens for later reporting
    pub fn parse(token: &str) -> Self {
        match token {
            "weight" => Stage::Weight,
            "norm" => Stage::Norm,
            "act" => Stage::Act,
            other => Stage::Unrecognized(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Stage::Weight => "weight",
            Stage::Norm => "norm",
            Stage::Act => "act",
            Stage::Unrecognized(token) => token,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered stage sequence parsed from a string such as `weight_norm_act`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpsOrder {
    stages: Vec<Stage>,
}

impl OpsOrder {
    /// Parse leniently; see [`OpsOrder::validate`] for the strict check
    pub fn parse(order: &str) -> Self {
        Self {
            stages: order.split(STAGE_SEPARATOR).map(Stage::parse).collect(),
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn contains(&self, stage: &Stage) -> bool {
        self.stages.contains(stage)
    }

    /// Tokens that name no stage
    pub fn unrecognized(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().filter_map(|stage| match stage {
            Stage::Unrecognized(token) => Some(token.as_str()),
            _ => None,
        })
    }

    /// Fail on the first unrecognized token
    pub fn validate(&self) -> Result<()> {
        match self.unrecognized().next() {
            Some(token) => Err(unrecognized_stage(token)),
            None => Ok(()),
        }
    }
}

pub(crate) fn unrecognized_stage(token: &str) -> VolnasError {
    VolnasError::ConfigError(format!("Unrecognized op: {}", token))
}

impl Default for OpsOrder {
    fn default() -> Self {
        Self {
            stages: vec![Stage::Weight, Stage::Norm, Stage::Act],
        }
    }
}

impl FromStr for OpsOrder {
    type Err = VolnasError;

    fn from_str(s: &str) -> Result<Self> {
        let order = Self::parse(s);
        order.validate()?;
        Ok(order)
    }
}

impl fmt::Display for OpsOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stage) in self.stages.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", STAGE_SEPARATOR)?;
            }
            write!(f, "{}", stage)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keeps_order() {
        let order = OpsOrder::parse("act_weight_norm");
        assert_eq!(order.stages(), &[Stage::Act, Stage::Weight, Stage::Norm]);
        assert_eq!(order.to_string(), "act_weight_norm");
    }

    #[test]
    fn test_default_order() {
        assert_eq!(OpsOrder::default(), OpsOrder::parse("weight_norm_act"));
    }

    #[test]
    fn test_unrecognized_token() {
        let order = OpsOrder::parse("weight_foo");
        assert_eq!(order.unrecognized().collect::<Vec<_>>(), vec!["foo"]);
        assert!(order.validate().unwrap_err().is_config());
        assert!("weight_foo".parse::<OpsOrder>().is_err());
        assert!("weight_norm".parse::<OpsOrder>().is_ok());
    }

    #[test]
    fn test_contains() {
        let order = OpsOrder::parse("weight");
        assert!(order.contains(&Stage::Weight));
        assert!(!order.contains(&Stage::Norm));
    }
}
