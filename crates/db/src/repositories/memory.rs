use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use harvest_core::domain::{
    InteractionRecord, InteractionType, ProductAttributes, ProductId, UserId,
};
use harvest_core::errors::StoreError;
use harvest_core::ports::{InteractionStore, ProductCatalog};

/// Interaction history keyed by user, holding at most one record per
/// (user, product, type).
#[derive(Debug, Default)]
pub struct InMemoryInteractionStore {
    interactions: RwLock<HashMap<UserId, Vec<InteractionRecord>>>,
}

impl InMemoryInteractionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from records, later duplicates of a triple replacing earlier ones.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = InteractionRecord>,
    {
        let mut interactions: HashMap<UserId, Vec<InteractionRecord>> = HashMap::new();
        for record in records {
            upsert_into(interactions.entry(record.user_id.clone()).or_default(), record);
        }
        Self { interactions: RwLock::new(interactions) }
    }

    /// Register one more occurrence of an interaction.
    ///
    /// An existing record for the triple has its count bumped and takes the
    /// new score and timestamp; otherwise a record with count 1 is created.
    pub async fn record(
        &self,
        user_id: &UserId,
        product_id: &ProductId,
        kind: InteractionType,
        score: f64,
        at: DateTime<Utc>,
    ) {
        let mut interactions = self.interactions.write().await;
        let records = interactions.entry(user_id.clone()).or_default();

        match records
            .iter_mut()
            .find(|record| &record.product_id == product_id && record.kind == kind)
        {
            Some(existing) => {
                existing.count = existing.count.saturating_add(1);
                existing.score = score;
                existing.updated_at = at;
            }
            None => records.push(InteractionRecord {
                user_id: user_id.clone(),
                product_id: product_id.clone(),
                kind,
                score,
                count: 1,
                updated_at: at,
            }),
        }
    }

    /// Insert `record`, replacing any existing record for the same triple.
    pub async fn upsert(&self, record: InteractionRecord) {
        let mut interactions = self.interactions.write().await;
        upsert_into(interactions.entry(record.user_id.clone()).or_default(), record);
    }

    pub async fn user_count(&self) -> usize {
        self.interactions.read().await.len()
    }

    pub async fn record_count(&self) -> usize {
        self.interactions.read().await.values().map(Vec::len).sum()
    }
}

fn upsert_into(records: &mut Vec<InteractionRecord>, record: InteractionRecord) {
    match records
        .iter_mut()
        .find(|existing| existing.product_id == record.product_id && existing.kind == record.kind)
    {
        Some(existing) => *existing = record,
        None => records.push(record),
    }
}

#[async_trait::async_trait]
impl InteractionStore for InMemoryInteractionStore {
    async fn interactions_for(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<InteractionRecord>, StoreError> {
        let interactions = self.interactions.read().await;
        Ok(interactions.get(user_id).cloned().unwrap_or_default())
    }

    async fn all_user_interactions(
        &self,
    ) -> Result<HashMap<UserId, Vec<InteractionRecord>>, StoreError> {
        Ok(self.interactions.read().await.clone())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryProductCatalog {
    products: RwLock<HashMap<ProductId, ProductAttributes>>,
}

impl InMemoryProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_products<I>(products: I) -> Self
    where
        I: IntoIterator<Item = ProductAttributes>,
    {
        let products =
            products.into_iter().map(|product| (product.product_id.clone(), product)).collect();
        Self { products: RwLock::new(products) }
    }

    pub async fn upsert(&self, product: ProductAttributes) {
        let mut products = self.products.write().await;
        products.insert(product.product_id.clone(), product);
    }

    /// Every catalog id in ascending order, usable as a candidate pool.
    pub async fn product_ids(&self) -> Vec<ProductId> {
        let mut ids: Vec<ProductId> = self.products.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.products.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.products.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl ProductCatalog for InMemoryProductCatalog {
    async fn attributes(
        &self,
        product_id: &ProductId,
    ) -> Result<Option<ProductAttributes>, StoreError> {
        let products = self.products.read().await;
        Ok(products.get(product_id).cloned())
    }
}
