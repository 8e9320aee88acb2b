//! Collaborative and content-based similarity scoring

use std::sync::Arc;

use crate::domain::{ProductAttributes, ProductId, UserId, UserInteractionVector};
use crate::errors::DomainError;

use super::weights::ContentWeights;

/// Cosine similarity between two users' interaction vectors.
///
/// Interaction weights are non-negative, so the result lies in `[0, 1]`.
/// Norms cover each vector's full product set, not just the shared products.
/// Disjoint or all-zero vectors score 0.0.
pub fn cosine_similarity(a: &UserInteractionVector, b: &UserInteractionVector) -> f64 {
    let (smaller, larger) = if a.len() <= b.len() { (a, b) } else { (b, a) };

    let mut shared = false;
    let mut dot = 0.0;
    for (product, weight) in smaller.iter() {
        if let Some(other) = larger.contribution(product) {
            shared = true;
            dot += weight * other;
        }
    }

    if !shared {
        return 0.0;
    }

    let denom = a.norm() * b.norm();
    if denom == 0.0 {
        return 0.0;
    }

    let result = dot / denom;
    if !result.is_finite() {
        return 0.0;
    }
    result.clamp(0.0, 1.0)
}

/// Similarity-weighted average of the neighbors' affinity for `target_product`.
///
/// Every user other than `target_user` with a non-empty vector and positive
/// similarity is a neighbor. Returns 0.0 when there are no neighbors or none of
/// them interacted with the product.
pub fn predict_affinity<'a, I>(
    target_user: &UserId,
    target_product: &ProductId,
    target_vector: &UserInteractionVector,
    others: I,
) -> f64
where
    I: IntoIterator<Item = (&'a UserId, &'a UserInteractionVector)>,
{
    Neighborhood::build(target_user, target_vector, others).affinity(target_product)
}

#[derive(Debug, Clone, Copy)]
struct Neighbor<'a> {
    user_id: &'a UserId,
    similarity: f64,
    vector: &'a UserInteractionVector,
}

/// Users with positive similarity to a target user, computed once and reused
/// across every candidate product of a request.
#[derive(Debug, Clone, Default)]
pub struct Neighborhood<'a> {
    neighbors: Vec<Neighbor<'a>>,
}

impl<'a> Neighborhood<'a> {
    pub fn build<I>(target_user: &UserId, target_vector: &UserInteractionVector, others: I) -> Self
    where
        I: IntoIterator<Item = (&'a UserId, &'a UserInteractionVector)>,
    {
        if target_vector.is_empty() {
            return Self::default();
        }

        let mut neighbors: Vec<Neighbor<'a>> = others
            .into_iter()
            .filter(|(user_id, vector)| *user_id != target_user && !vector.is_empty())
            .filter_map(|(user_id, vector)| {
                let similarity = cosine_similarity(target_vector, vector);
                (similarity > 0.0).then_some(Neighbor { user_id, similarity, vector })
            })
            .collect();

        // Fixed accumulation order keeps repeated calls bit-identical.
        neighbors.sort_by(|a, b| a.user_id.cmp(b.user_id));
        Self { neighbors }
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn affinity(&self, product_id: &ProductId) -> f64 {
        let mut score_sum = 0.0;
        let mut sim_sum = 0.0;

        for neighbor in &self.neighbors {
            if let Some(contribution) = neighbor.vector.contribution(product_id) {
                score_sum += contribution * neighbor.similarity;
                sim_sum += neighbor.similarity;
            }
        }

        if sim_sum == 0.0 {
            0.0
        } else {
            score_sum / sim_sum
        }
    }
}

/// Decides whether two products count as "in the same season" for content
/// similarity.
pub trait SeasonalOverlapPolicy: Send + Sync {
    fn same_season(&self, a: &ProductAttributes, b: &ProductAttributes) -> bool;
}

/// Treats every pair of products as seasonally compatible.
///
/// This is a placeholder with no evidence behind it: it awards the full
/// season weight to every pair. Swap in a real policy once season data is
/// trustworthy.
#[derive(Debug, Clone, Copy, Default)]
pub struct Permissive;

impl SeasonalOverlapPolicy for Permissive {
    fn same_season(&self, _a: &ProductAttributes, _b: &ProductAttributes) -> bool {
        true
    }
}

/// Products share a season when their season tag sets intersect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SharedSeasonTags;

impl SeasonalOverlapPolicy for SharedSeasonTags {
    fn same_season(&self, a: &ProductAttributes, b: &ProductAttributes) -> bool {
        a.season_tags.intersection(&b.season_tags).next().is_some()
    }
}

impl<F> SeasonalOverlapPolicy for F
where
    F: Fn(&ProductAttributes, &ProductAttributes) -> bool + Send + Sync,
{
    fn same_season(&self, a: &ProductAttributes, b: &ProductAttributes) -> bool {
        self(a, b)
    }
}

/// Attribute-based product similarity
#[derive(Clone)]
pub struct ContentScorer {
    weights: ContentWeights,
    overlap: Arc<dyn SeasonalOverlapPolicy>,
}

impl std::fmt::Debug for ContentScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentScorer").field("weights", &self.weights).finish_non_exhaustive()
    }
}

impl ContentScorer {
    /// Create a scorer with default weights and the permissive overlap policy
    pub fn new() -> Self {
        Self { weights: ContentWeights::default(), overlap: Arc::new(Permissive) }
    }

    /// Create with custom weights, rejecting sets that do not sum to 1.0
    pub fn with_weights(weights: ContentWeights) -> Result<Self, DomainError> {
        weights.validate()?;
        Ok(Self { weights, overlap: Arc::new(Permissive) })
    }

    pub fn with_overlap_policy(mut self, policy: Arc<dyn SeasonalOverlapPolicy>) -> Self {
        self.overlap = policy;
        self
    }

    pub fn weights(&self) -> ContentWeights {
        self.weights
    }

    /// Weighted sum of category match, price closeness and seasonal overlap,
    /// in `[0, 1]`.
    pub fn content_similarity(&self, a: &ProductAttributes, b: &ProductAttributes) -> f64 {
        let category = match (&a.category_id, &b.category_id) {
            (Some(left), Some(right)) if left == right => self.weights.category,
            _ => 0.0,
        };

        let price = match (a.price_value(), b.price_value()) {
            (Some(left), Some(right)) => {
                let max = left.max(right);
                if max > 0.0 {
                    self.weights.price * (1.0 - (left - right).abs() / max)
                } else {
                    0.0
                }
            }
            _ => 0.0,
        };

        let season =
            if self.overlap.same_season(a, b) { self.weights.season } else { 0.0 };

        (category + price + season).clamp(0.0, 1.0)
    }

    /// Up to `limit` products from `pool` most similar to `target`.
    ///
    /// The target itself is excluded. Ties keep their pool order.
    pub fn top_similar<'p>(
        &self,
        target: &ProductAttributes,
        pool: &'p [ProductAttributes],
        limit: usize,
    ) -> Result<Vec<(&'p ProductAttributes, f64)>, DomainError> {
        if limit == 0 {
            return Err(DomainError::InvalidLimit);
        }

        let mut scored: Vec<(&'p ProductAttributes, f64)> = pool
            .iter()
            .filter(|candidate| candidate.product_id != target.product_id)
            .map(|candidate| (candidate, self.content_similarity(target, candidate)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }
}

impl Default for ContentScorer {
    fn default() -> Self {
        Self::new()
    }
}
