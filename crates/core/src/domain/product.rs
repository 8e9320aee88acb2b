use std::collections::BTreeSet;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProductId(pub String);

impl ProductId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CategoryId(pub String);

impl CategoryId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Read-only snapshot of the catalog attributes the recommender looks at.
///
/// Every attribute may be missing. A missing attribute is "unknown": two
/// products that both lack a category are not considered to share one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductAttributes {
    pub product_id: ProductId,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub season_tags: BTreeSet<String>,
}

impl ProductAttributes {
    pub fn new(product_id: impl Into<String>) -> Self {
        Self {
            product_id: ProductId::new(product_id),
            category_id: None,
            price: None,
            season_tags: BTreeSet::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category_id = Some(CategoryId::new(category));
        self
    }

    pub fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_season_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.season_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Price as `f64` for similarity math. Negative prices are upstream data
    /// errors and read as missing.
    pub fn price_value(&self) -> Option<f64> {
        self.price
            .filter(|price| !price.is_sign_negative())
            .and_then(|price| price.to_f64())
            .filter(|value| value.is_finite())
    }
}
