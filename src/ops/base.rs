//! Shared staged pipeline behind every operation

use rand::Rng;
use tracing::warn;

use super::order::{unrecognized_stage, OpsOrder, Stage};
use crate::error::{Result, VolnasError};
use crate::layers::{check_channels, Dropout3d, GroupNorm, ReLU, Volume};

/// Channels per normalization group
pub const CHANNELS_PER_GROUP: usize = 16;

/// Number of normalization groups for `out_channels`.
///
/// One group per 16 channels when that divides evenly, otherwise a single
/// group so small or odd channel counts stay valid.
pub fn group_count(out_channels: usize) -> usize {
    if out_channels >= CHANNELS_PER_GROUP && out_channels % CHANNELS_PER_GROUP == 0 {
        out_channels / CHANNELS_PER_GROUP
    } else {
        1
    }
}

/// The parameter-bearing computation specific to an operation kind
pub trait WeightTransform: std::fmt::Debug {
    fn weight_call(&mut self, x: &Volume) -> Result<Volume>;

    fn num_parameters(&self) -> usize {
        0
    }
}

/// Staged pipeline {dropout + weight, norm, act} run in ops-order
#[derive(Debug, Clone)]
pub struct BaseOp<W> {
    in_channels: usize,
    out_channels: usize,
    order: OpsOrder,
    dropout: Option<Dropout3d>,
    norm: Option<GroupNorm>,
    activation: Option<ReLU>,
    transform: W,
}

impl<W: WeightTransform> BaseOp<W> {
    /// Wrap a weight-transform in the stages `ops_order` asks for
    pub(crate) fn assemble<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        dropout_rate: f64,
        ops_order: &str,
        transform: W,
        rng: &mut R,
    ) -> Result<Self> {
        if in_channels == 0 || out_channels == 0 {
            return Err(VolnasError::ConfigError(format!(
                "channel counts must be positive, got in={} out={}",
                in_channels, out_channels
            )));
        }

        let order = OpsOrder::parse(ops_order);
        for token in order.unrecognized() {
            warn!(token, ops_order, "Unrecognized stage in ops-order");
        }

        let norm = if order.contains(&Stage::Norm) {
            Some(GroupNorm::new(group_count(out_channels), out_channels)?)
        } else {
            None
        };
        let activation = order.contains(&Stage::Act).then_some(ReLU);
        let dropout = (dropout_rate > 0.0).then(|| Dropout3d::new(dropout_rate, rng));

        Ok(Self {
            in_channels,
            out_channels,
            order,
            dropout,
            norm,
            activation,
            transform,
        })
    }

    /// Run the stages in declared order
    pub fn apply(&mut self, x: &Volume) -> Result<Volume> {
        check_channels(x, self.in_channels)?;
        let mut out = x.to_owned();

        for stage in self.order.stages() {
            match stage {
                Stage::Weight => {
                    if let Some(dropout) = self.dropout.as_mut() {
                        out = dropout.forward(&out);
                    }
                    out = self.transform.weight_call(&out)?;
                }
                Stage::Norm => {
                    if let Some(norm) = &self.norm {
                        out = norm.forward(&out)?;
                    }
                }
                Stage::Act => {
                    if let Some(activation) = &self.activation {
                        out = activation.forward(&out);
                    }
                }
                Stage::Unrecognized(token) => return Err(unrecognized_stage(token)),
            }
        }

        Ok(out)
    }

    pub(crate) fn disable_norm(&mut self) {
        self.norm = None;
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub fn ops_order(&self) -> &OpsOrder {
        &self.order
    }

    pub fn norm(&self) -> Option<&GroupNorm> {
        self.norm.as_ref()
    }

    pub fn has_activation(&self) -> bool {
        self.activation.is_some()
    }

    pub fn dropout_rate(&self) -> f64 {
        self.dropout.as_ref().map_or(0.0, Dropout3d::rate)
    }

    pub fn transform(&self) -> &W {
        &self.transform
    }

    pub fn transform_mut(&mut self) -> &mut W {
        &mut self.transform
    }

    /// Set training mode
    pub fn train(&mut self) {
        if let Some(dropout) = self.dropout.as_mut() {
            dropout.train();
        }
    }

    /// Set evaluation mode
    pub fn eval(&mut self) {
        if let Some(dropout) = self.dropout.as_mut() {
            dropout.eval();
        }
    }

    pub fn num_parameters(&self) -> usize {
        self.transform.num_parameters() + self.norm.as_ref().map_or(0, GroupNorm::num_parameters)
    }
}
