use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::domain::product::ProductId;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of user action behind an interaction record.
///
/// The set is open: upstream may introduce new kinds at any time. Anything
/// not recognised lands in `Other` and is ignored by scoring.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum InteractionType {
    View,
    Purchase,
    Wishlist,
    Rating,
    Cart,
    Other(String),
}

impl InteractionType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::View => "view",
            Self::Purchase => "purchase",
            Self::Wishlist => "wishlist",
            Self::Rating => "rating",
            Self::Cart => "cart",
            Self::Other(raw) => raw,
        }
    }

    pub fn is_recognised(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl From<&str> for InteractionType {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "view" => Self::View,
            "purchase" => Self::Purchase,
            "wishlist" => Self::Wishlist,
            "rating" => Self::Rating,
            "cart" => Self::Cart,
            _ => Self::Other(value.to_owned()),
        }
    }
}

impl Serialize for InteractionType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for InteractionType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from(raw.as_str()))
    }
}

/// One aggregated (user, product, type) observation. Upstream guarantees at
/// most one record per triple.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub user_id: UserId,
    pub product_id: ProductId,
    #[serde(rename = "type")]
    pub kind: InteractionType,
    pub score: f64,
    pub count: u32,
    pub updated_at: DateTime<Utc>,
}

impl InteractionRecord {
    /// `score × count`, or `None` when the record must not contribute.
    pub fn contribution(&self) -> Option<f64> {
        if !self.kind.is_recognised() || !self.score.is_finite() || self.score < 0.0 {
            return None;
        }
        Some(self.score * f64::from(self.count))
    }
}

/// Per-user mapping of product to aggregated interaction weight.
///
/// Ordered by product id so iteration (and therefore every score derived from
/// it) is deterministic.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UserInteractionVector {
    weights: BTreeMap<ProductId, f64>,
    norm: f64,
}

impl UserInteractionVector {
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a InteractionRecord>,
    {
        let mut weights = BTreeMap::new();
        for record in records {
            if let Some(contribution) = record.contribution() {
                *weights.entry(record.product_id.clone()).or_insert(0.0) += contribution;
            }
        }
        Self::with_norm(weights)
    }

    pub fn from_weights<I, P>(weights: I) -> Self
    where
        I: IntoIterator<Item = (P, f64)>,
        P: Into<String>,
    {
        Self::with_norm(
            weights.into_iter().map(|(product, weight)| (ProductId::new(product), weight)).collect(),
        )
    }

    fn with_norm(weights: BTreeMap<ProductId, f64>) -> Self {
        let norm = weights.values().map(|weight| weight * weight).sum::<f64>().sqrt();
        Self { weights, norm }
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn contribution(&self, product_id: &ProductId) -> Option<f64> {
        self.weights.get(product_id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ProductId, f64)> {
        self.weights.iter().map(|(product, weight)| (product, *weight))
    }

    /// Euclidean norm over every product in the vector, computed once at
    /// construction.
    pub fn norm(&self) -> f64 {
        self.norm
    }

    /// Product with the highest contribution; ties go to the lowest product id.
    pub fn strongest_product(&self) -> Option<&ProductId> {
        let mut best: Option<(&ProductId, f64)> = None;
        for (product, weight) in &self.weights {
            match best {
                Some((_, best_weight)) if *weight <= best_weight => {}
                _ => best = Some((product, *weight)),
            }
        }
        best.map(|(product, _)| product)
    }
}
