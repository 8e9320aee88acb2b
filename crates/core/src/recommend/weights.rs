//! Weight sets for signal fusion

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

use super::WEIGHT_SUM_TOLERANCE;

/// Split between the collaborative and content signals of the base score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HybridWeights {
    /// Weight for the collaborative score (default: 0.60)
    pub collaborative: f64,
    /// Weight for the content score (default: 0.40)
    pub content: f64,
}

impl HybridWeights {
    pub fn validate(&self) -> Result<(), DomainError> {
        validate_weight_set("hybrid", &[self.collaborative, self.content])
    }

    /// Base score before seasonal blending
    pub fn combine(&self, collaborative: f64, content: f64) -> f64 {
        self.collaborative * collaborative + self.content * content
    }
}

impl Default for HybridWeights {
    fn default() -> Self {
        super::DEFAULT_HYBRID_WEIGHTS
    }
}

/// Sub-signal weights for content similarity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContentWeights {
    /// Awarded in full on an exact category match (default: 0.40)
    pub category: f64,
    /// Scaled by relative price closeness (default: 0.20)
    pub price: f64,
    /// Awarded in full when the overlap policy reports a shared season (default: 0.40)
    pub season: f64,
}

impl ContentWeights {
    pub fn validate(&self) -> Result<(), DomainError> {
        validate_weight_set("content", &[self.category, self.price, self.season])
    }
}

impl Default for ContentWeights {
    fn default() -> Self {
        super::DEFAULT_CONTENT_WEIGHTS
    }
}

/// Final-stage blend of the base score with the seasonal score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlendWeights {
    /// Weight kept by the base score (default: 0.70)
    pub base: f64,
    /// Weight given to seasonality (default: 0.30)
    pub seasonal: f64,
}

impl BlendWeights {
    pub fn validate(&self) -> Result<(), DomainError> {
        validate_weight_set("blend", &[self.base, self.seasonal])
    }
}

impl Default for BlendWeights {
    fn default() -> Self {
        super::DEFAULT_BLEND_WEIGHTS
    }
}

fn validate_weight_set(name: &'static str, weights: &[f64]) -> Result<(), DomainError> {
    let sum: f64 = weights.iter().sum();
    let well_formed = weights.iter().all(|weight| weight.is_finite() && *weight >= 0.0);

    if !well_formed || (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(DomainError::InvalidWeights { name, sum });
    }
    Ok(())
}
