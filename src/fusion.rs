//! Activity index fusion.
//!
//! `H = alpha*RSI_n + beta*POP_n + gamma*FLOW_n - delta*ME_n`, each feature
//! normalized by its ceiling and capped at 1, the sum clamped to `[0, 1]`.
//! Ring motion enters negatively: broad surface motion without ripples or
//! pops is wind or the feeder itself, not fish.

use crate::config::{FusionConfig, FusionWeights, NormalizationConfig};
use crate::features::FeatureVector;

#[derive(Debug, Clone)]
pub struct ActivityFusion {
    weights: FusionWeights,
    ceilings: NormalizationConfig,
}

impl ActivityFusion {
    pub fn new(weights: FusionWeights, ceilings: NormalizationConfig) -> Self {
        Self { weights, ceilings }
    }

    pub fn from_config(config: &FusionConfig) -> Self {
        Self::new(config.weights.clone(), config.normalization.clone())
    }

    /// Fused activity index, always within `[0, 1]`.
    pub fn activity_index(&self, fv: &FeatureVector) -> f32 {
        let w = &self.weights;
        let c = &self.ceilings;
        let h = w.alpha * normalize(fv.rsi, c.rsi_max)
            + w.beta * normalize(fv.pop, c.pop_max)
            + w.gamma * normalize(fv.flow, c.flow_max)
            - w.delta * normalize(fv.me_ring(), c.me_max);
        if h.is_nan() { 0.0 } else { h.clamp(0.0, 1.0) }
    }
}

fn normalize(value: f32, ceiling: f32) -> f32 {
    if !(value.is_finite() && ceiling > 0.0) {
        // +inf saturates; NaN and bad ceilings contribute nothing.
        return if value == f32::INFINITY { 1.0 } else { 0.0 };
    }
    (value / ceiling).clamp(0.0, 1.0)
}
