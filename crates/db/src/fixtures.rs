//! Loadable datasets for demos and integration tests.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use harvest_core::domain::{InteractionRecord, ProductAttributes};

use crate::repositories::{InMemoryInteractionStore, InMemoryProductCatalog};

const DEMO_DATASET: &str = include_str!("../fixtures/demo.json");

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("could not read dataset `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse dataset: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid dataset: {0}")]
    Invalid(String),
}

/// Products and interaction history in one serializable bundle.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub products: Vec<ProductAttributes>,
    #[serde(default)]
    pub interactions: Vec<InteractionRecord>,
}

impl Dataset {
    pub fn from_json_str(raw: &str) -> Result<Self, FixtureError> {
        let dataset: Self = serde_json::from_str(raw)?;
        dataset.validate()?;
        Ok(dataset)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, FixtureError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|source| FixtureError::ReadFile { path: path.to_path_buf(), source })?;
        let dataset = Self::from_json_str(&raw)?;

        info!(
            event_name = "fixtures.dataset.loaded",
            path = %path.display(),
            products = dataset.products.len(),
            interactions = dataset.interactions.len(),
            "loaded dataset from file"
        );
        Ok(dataset)
    }

    /// Product ids must be unique, and so must (user, product, type) triples.
    pub fn validate(&self) -> Result<(), FixtureError> {
        let mut products = HashSet::new();
        for product in &self.products {
            if !products.insert(&product.product_id) {
                return Err(FixtureError::Invalid(format!(
                    "duplicate product `{}`",
                    product.product_id
                )));
            }
        }

        let mut triples = HashSet::new();
        for record in &self.interactions {
            if !triples.insert((&record.user_id, &record.product_id, &record.kind)) {
                return Err(FixtureError::Invalid(format!(
                    "duplicate `{}` interaction for user `{}` on product `{}`",
                    record.kind.as_str(),
                    record.user_id,
                    record.product_id
                )));
            }
        }

        Ok(())
    }

    pub fn into_stores(self) -> (InMemoryInteractionStore, InMemoryProductCatalog) {
        (
            InMemoryInteractionStore::from_records(self.interactions),
            InMemoryProductCatalog::from_products(self.products),
        )
    }
}

/// Small produce shop: ten products and five shoppers with overlapping tastes.
pub fn demo_dataset() -> Result<Dataset, FixtureError> {
    Dataset::from_json_str(DEMO_DATASET)
}
