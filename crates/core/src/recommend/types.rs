//! Types for the recommendation engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ProductId, UserId};

/// Request for personalised recommendations
#[derive(Debug, Clone)]
pub struct RecommendationRequest {
    /// User to rank candidates for
    pub user_id: UserId,
    /// Products to rank, in caller order (used for tie-breaking)
    pub candidates: Vec<ProductId>,
    /// Reference instant for seasonal scoring
    pub now: DateTime<Utc>,
}

impl RecommendationRequest {
    pub fn new(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self { user_id: UserId::new(user_id), candidates: Vec::new(), now }
    }

    pub fn with_candidates<I, P>(mut self, candidates: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.candidates = candidates.into_iter().map(ProductId::new).collect();
        self
    }
}

/// Whether a surface applies the seasonal blend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeasonalMode {
    #[default]
    Adjusted,
    /// Rank on content similarity alone
    Agnostic,
}

/// Request for products related to an anchor product
#[derive(Debug, Clone)]
pub struct SimilarProductsRequest {
    pub product_id: ProductId,
    pub pool: Vec<ProductId>,
    pub limit: usize,
    pub now: DateTime<Utc>,
    pub seasonal_mode: SeasonalMode,
}

impl SimilarProductsRequest {
    pub fn new(product_id: impl Into<String>, limit: usize, now: DateTime<Utc>) -> Self {
        Self {
            product_id: ProductId::new(product_id),
            pool: Vec::new(),
            limit,
            now,
            seasonal_mode: SeasonalMode::Adjusted,
        }
    }

    pub fn with_pool<I, P>(mut self, pool: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.pool = pool.into_iter().map(ProductId::new).collect();
        self
    }

    pub fn season_agnostic(mut self) -> Self {
        self.seasonal_mode = SeasonalMode::Agnostic;
        self
    }
}

/// Individual signal scores behind a result
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ScoreBreakdown {
    /// Neighbor-weighted affinity (0.0 on cold start)
    pub collaborative: f64,
    /// Attribute similarity to the reference product (0.0 - 1.0)
    pub content: f64,
    /// Seasonal score (0.2 - 1.0; 1.0 when not applied)
    pub seasonal: f64,
}

/// One of the scoring signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Collaborative,
    Content,
    Seasonal,
}

/// A ranked product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub product_id: ProductId,
    pub final_score: f64,
    pub breakdown: ScoreBreakdown,
    /// Weighted share of `final_score` supplied by each signal
    pub contributions: ScoreBreakdown,
}

impl RecommendationResult {
    /// Signal with the largest share of the final score. Ties go to the
    /// earlier of collaborative, content, seasonal.
    pub fn dominant_signal(&self) -> Signal {
        let shares = [
            (Signal::Collaborative, self.contributions.collaborative),
            (Signal::Content, self.contributions.content),
            (Signal::Seasonal, self.contributions.seasonal),
        ];

        let mut dominant = shares[0];
        for share in &shares[1..] {
            if share.1 > dominant.1 {
                dominant = *share;
            }
        }
        dominant.0
    }
}

/// Stable sort, highest score first; equal scores keep their input order.
pub(crate) fn sort_by_final_score(results: &mut [RecommendationResult]) {
    results.sort_by(|a, b| {
        b.final_score.partial_cmp(&a.final_score).unwrap_or(std::cmp::Ordering::Equal)
    });
}
