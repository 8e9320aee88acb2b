//! Hybrid product recommendation engine
//!
//! Fuses collaborative filtering over interaction history, content similarity
//! over product attributes, and a seasonal adjustment into one ranked output.

mod engine;
mod seasonal;
mod similarity;
mod snapshot;
mod types;
mod weights;

pub use engine::HybridRecommender;
pub use seasonal::{SeasonTable, SeasonalAdjuster, BUILTIN_SEASONS};
pub use similarity::{
    cosine_similarity, predict_affinity, ContentScorer, Neighborhood, Permissive,
    SeasonalOverlapPolicy, SharedSeasonTags,
};
pub use snapshot::{NeighborSnapshot, RefreshTicket, SnapshotCell};
pub use types::*;
pub use weights::{BlendWeights, ContentWeights, HybridWeights};

use crate::errors::ApplicationError;

/// Result type for recommendation operations
pub type RecommendResult<T> = Result<T, ApplicationError>;

/// Default split between collaborative and content signals
pub const DEFAULT_HYBRID_WEIGHTS: HybridWeights =
    HybridWeights { collaborative: 0.60, content: 0.40 };

/// Default sub-signal weights for content similarity
pub const DEFAULT_CONTENT_WEIGHTS: ContentWeights =
    ContentWeights { category: 0.40, price: 0.20, season: 0.40 };

/// Default base/seasonal blend applied at the final ranking stage
pub const DEFAULT_BLEND_WEIGHTS: BlendWeights = BlendWeights { base: 0.70, seasonal: 0.30 };

/// Seasonal score for products with no known season
pub const SEASONAL_NEUTRAL_SCORE: f64 = 1.0;

/// Seasonal score lost per month of distance from the nearest in-season month
pub const DEFAULT_SEASONAL_DECAY_STEP: f64 = 0.10;

/// Lowest seasonal score an off-season product can receive
pub const DEFAULT_SEASONAL_FLOOR: f64 = 0.20;

/// Allowed drift when checking that a weight set sums to 1.0
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;
