use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::{InteractionRecord, ProductAttributes, ProductId, UserId};
use crate::errors::StoreError;

/// Source of interaction history. The recommender only ever reads from it.
#[async_trait]
pub trait InteractionStore: Send + Sync {
    async fn interactions_for(&self, user_id: &UserId)
        -> Result<Vec<InteractionRecord>, StoreError>;

    /// Every user's history, used as the collaborative neighbor pool.
    async fn all_user_interactions(
        &self,
    ) -> Result<HashMap<UserId, Vec<InteractionRecord>>, StoreError>;
}

/// Read-only product attribute lookup.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// `Ok(None)` means the id does not resolve to a product.
    async fn attributes(
        &self,
        product_id: &ProductId,
    ) -> Result<Option<ProductAttributes>, StoreError>;
}
