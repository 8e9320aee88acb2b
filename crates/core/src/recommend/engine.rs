//! Hybrid recommender implementation

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::RecommenderConfig;
use crate::domain::{ProductAttributes, ProductId, UserId, UserInteractionVector};
use crate::errors::{ApplicationError, DomainError};
use crate::ports::{InteractionStore, ProductCatalog};

use super::seasonal::{SeasonTable, SeasonalAdjuster};
use super::similarity::{ContentScorer, Neighborhood, SeasonalOverlapPolicy};
use super::snapshot::{NeighborSnapshot, SnapshotCell};
use super::types::{
    sort_by_final_score, RecommendationRequest, RecommendationResult, ScoreBreakdown,
    SeasonalMode, SimilarProductsRequest,
};
use super::weights::HybridWeights;
use super::{RecommendResult, SEASONAL_NEUTRAL_SCORE};

/// The main recommendation engine
pub struct HybridRecommender {
    interactions: Arc<dyn InteractionStore>,
    catalog: Arc<dyn ProductCatalog>,
    hybrid: HybridWeights,
    content: ContentScorer,
    seasonal: SeasonalAdjuster,
    /// Neighbor pool published by `refresh()`
    snapshot: SnapshotCell,
}

impl std::fmt::Debug for HybridRecommender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridRecommender")
            .field("hybrid", &self.hybrid)
            .field("content", &self.content)
            .field("seasonal", &self.seasonal)
            .field("snapshot_generation", &self.snapshot.generation())
            .finish_non_exhaustive()
    }
}

impl HybridRecommender {
    /// Create an engine with default weights and the built-in season table
    pub fn new(interactions: Arc<dyn InteractionStore>, catalog: Arc<dyn ProductCatalog>) -> Self {
        Self {
            interactions,
            catalog,
            hybrid: HybridWeights::default(),
            content: ContentScorer::new(),
            seasonal: SeasonalAdjuster::default(),
            snapshot: SnapshotCell::new(),
        }
    }

    /// Create from validated configuration. Bad weights or season tables are
    /// rejected here rather than producing meaningless scores later.
    pub fn from_config(
        interactions: Arc<dyn InteractionStore>,
        catalog: Arc<dyn ProductCatalog>,
        config: &RecommenderConfig,
    ) -> RecommendResult<Self> {
        config.hybrid.validate()?;
        let content = ContentScorer::with_weights(config.content)?;
        let seasonal = SeasonalAdjuster::new(SeasonTable::from_map(&config.seasons)?)
            .with_decay(config.seasonal.decay_step, config.seasonal.floor)?
            .with_blend(config.blend)?;

        Ok(Self {
            interactions,
            catalog,
            hybrid: config.hybrid,
            content,
            seasonal,
            snapshot: SnapshotCell::new(),
        })
    }

    pub fn with_overlap_policy(mut self, policy: Arc<dyn SeasonalOverlapPolicy>) -> Self {
        self.content = self.content.with_overlap_policy(policy);
        self
    }

    pub fn with_season_table(mut self, table: SeasonTable) -> Self {
        self.seasonal = self.seasonal.with_table(table);
        self
    }

    /// Rank `candidates` for `user_id`, highest final score first.
    pub async fn recommend_for_user(
        &self,
        user_id: &UserId,
        candidates: &[ProductId],
        now: DateTime<Utc>,
    ) -> RecommendResult<Vec<RecommendationResult>> {
        self.recommend(RecommendationRequest {
            user_id: user_id.clone(),
            candidates: candidates.to_vec(),
            now,
        })
        .await
    }

    pub async fn recommend(
        &self,
        request: RecommendationRequest,
    ) -> RecommendResult<Vec<RecommendationResult>> {
        let records = self.interactions.interactions_for(&request.user_id).await?;
        let user_vector = UserInteractionVector::from_records(&records);

        // Cold-start users have no neighbors, so skip loading the pool.
        let pool = if user_vector.is_empty() {
            debug!(
                event_name = "recommend.user.cold_start",
                user_id = %request.user_id,
                "user has no usable interactions"
            );
            None
        } else {
            Some(self.neighbor_pool().await?)
        };

        let neighborhood = match &pool {
            Some(pool) => Neighborhood::build(&request.user_id, &user_vector, pool.vectors()),
            None => Neighborhood::default(),
        };

        let reference = self.reference_product(&user_vector).await?;

        let blend = self.seasonal.blend_weights();
        let mut results = Vec::with_capacity(request.candidates.len());
        let mut seen = HashSet::new();
        let mut dropped = 0usize;

        for candidate_id in &request.candidates {
            if !seen.insert(candidate_id) {
                continue;
            }

            let Some(candidate) = self.catalog.attributes(candidate_id).await? else {
                dropped += 1;
                debug!(
                    event_name = "recommend.candidate.dropped",
                    product_id = %candidate_id,
                    "candidate does not resolve to a catalog product"
                );
                continue;
            };

            let collaborative = neighborhood.affinity(candidate_id);
            let content = reference
                .as_ref()
                .map(|reference| self.content.content_similarity(reference, &candidate))
                .unwrap_or(0.0);
            let seasonal = self.seasonal.seasonal_score(&candidate, request.now);

            let base = self.hybrid.combine(collaborative, content);
            let final_score = self.seasonal.blend(base, seasonal);

            results.push(RecommendationResult {
                product_id: candidate.product_id,
                final_score,
                breakdown: ScoreBreakdown { collaborative, content, seasonal },
                contributions: ScoreBreakdown {
                    collaborative: blend.base * self.hybrid.collaborative * collaborative,
                    content: blend.base * self.hybrid.content * content,
                    seasonal: blend.seasonal * seasonal,
                },
            });
        }

        sort_by_final_score(&mut results);

        info!(
            event_name = "recommend.user.completed",
            user_id = %request.user_id,
            candidates = request.candidates.len(),
            ranked = results.len(),
            dropped,
            neighbors = neighborhood.len(),
            snapshot_generation = pool.as_ref().map(|pool| pool.generation()).unwrap_or(0),
            "ranked candidates for user"
        );

        Ok(results)
    }

    /// Products from `pool` most similar to `product_id`, seasonally adjusted.
    pub async fn find_similar_products(
        &self,
        product_id: &ProductId,
        pool: &[ProductId],
        limit: usize,
        now: DateTime<Utc>,
    ) -> RecommendResult<Vec<RecommendationResult>> {
        self.similar_products(SimilarProductsRequest {
            product_id: product_id.clone(),
            pool: pool.to_vec(),
            limit,
            now,
            seasonal_mode: SeasonalMode::Adjusted,
        })
        .await
    }

    pub async fn similar_products(
        &self,
        request: SimilarProductsRequest,
    ) -> RecommendResult<Vec<RecommendationResult>> {
        if request.limit == 0 {
            return Err(DomainError::InvalidLimit.into());
        }

        let Some(target) = self.catalog.attributes(&request.product_id).await? else {
            warn!(
                event_name = "recommend.similar.unknown_target",
                product_id = %request.product_id,
                "anchor product does not resolve; nothing to compare against"
            );
            return Ok(Vec::new());
        };

        let mut seen = HashSet::new();
        let mut resolved: Vec<ProductAttributes> = Vec::with_capacity(request.pool.len());
        for candidate_id in &request.pool {
            if candidate_id == &target.product_id || !seen.insert(candidate_id) {
                continue;
            }
            match self.catalog.attributes(candidate_id).await? {
                Some(candidate) => resolved.push(candidate),
                None => debug!(
                    event_name = "recommend.candidate.dropped",
                    product_id = %candidate_id,
                    "candidate does not resolve to a catalog product"
                ),
            }
        }

        let ranked = self.content.top_similar(&target, &resolved, request.limit)?;
        let blend = self.seasonal.blend_weights();

        let mut results: Vec<RecommendationResult> = ranked
            .into_iter()
            .map(|(candidate, content)| {
                let (seasonal, final_score, contributions) = match request.seasonal_mode {
                    SeasonalMode::Adjusted => {
                        let seasonal = self.seasonal.seasonal_score(candidate, request.now);
                        let shares = ScoreBreakdown {
                            collaborative: 0.0,
                            content: blend.base * content,
                            seasonal: blend.seasonal * seasonal,
                        };
                        (seasonal, self.seasonal.blend(content, seasonal), shares)
                    }
                    SeasonalMode::Agnostic => {
                        let shares = ScoreBreakdown { collaborative: 0.0, content, seasonal: 0.0 };
                        (SEASONAL_NEUTRAL_SCORE, content, shares)
                    }
                };
                RecommendationResult {
                    product_id: candidate.product_id.clone(),
                    final_score,
                    breakdown: ScoreBreakdown { collaborative: 0.0, content, seasonal },
                    contributions,
                }
            })
            .collect();

        sort_by_final_score(&mut results);

        info!(
            event_name = "recommend.similar.completed",
            product_id = %request.product_id,
            pool = request.pool.len(),
            ranked = results.len(),
            seasonal_mode = ?request.seasonal_mode,
            "ranked similar products"
        );

        Ok(results)
    }

    /// Rebuild the neighbor pool from the interaction store and swap it in.
    ///
    /// On store failure the previous snapshot stays in place and the error is
    /// returned. When overlapping refreshes finish out of order, the one that
    /// read the store last wins.
    pub async fn refresh(&self) -> RecommendResult<()> {
        let ticket = self.snapshot.begin_refresh();
        let started_at = Utc::now();
        let interactions = match self.interactions.all_user_interactions().await {
            Ok(interactions) => interactions,
            Err(error) => {
                warn!(
                    event_name = "recommend.refresh.failed",
                    error = %error,
                    previous_generation = self.snapshot.generation().unwrap_or(0),
                    "neighbor pool refresh failed; keeping previous snapshot"
                );
                return Err(ApplicationError::Store(error));
            }
        };

        let snapshot = NeighborSnapshot::build(&interactions, started_at);
        let Some(published) = self.snapshot.publish(ticket, snapshot) else {
            debug!(
                event_name = "recommend.refresh.superseded",
                current_generation = self.snapshot.generation().unwrap_or(0),
                "a later refresh already published; discarding this one"
            );
            return Ok(());
        };

        info!(
            event_name = "recommend.refresh.swapped",
            generation = published.generation(),
            users = published.len(),
            newest_update = ?published.newest_update(),
            "neighbor pool snapshot published"
        );

        Ok(())
    }

    /// Drop the precomputed pool; later requests load neighbors live.
    pub fn invalidate(&self) {
        if self.snapshot.clear() {
            info!(event_name = "recommend.refresh.invalidated", "neighbor pool snapshot dropped");
        }
    }

    pub fn snapshot_generation(&self) -> Option<u64> {
        self.snapshot.generation()
    }

    async fn neighbor_pool(&self) -> RecommendResult<Arc<NeighborSnapshot>> {
        if let Some(snapshot) = self.snapshot.load() {
            return Ok(snapshot);
        }

        let interactions = self.interactions.all_user_interactions().await?;
        Ok(Arc::new(NeighborSnapshot::build(&interactions, Utc::now())))
    }

    async fn reference_product(
        &self,
        user_vector: &UserInteractionVector,
    ) -> RecommendResult<Option<ProductAttributes>> {
        let Some(product_id) = user_vector.strongest_product() else {
            return Ok(None);
        };

        let reference = self.catalog.attributes(product_id).await?;
        if reference.is_none() {
            debug!(
                event_name = "recommend.reference.unresolved",
                product_id = %product_id,
                "strongest interacted product is missing from the catalog"
            );
        }
        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal::Decimal;
    use tokio::sync::Notify;

    use super::*;
    use crate::config::RecommenderConfig;
    use crate::domain::{InteractionRecord, InteractionType};
    use crate::errors::StoreError;
    use crate::recommend::types::Signal;
    use crate::recommend::weights::HybridWeights;

    #[derive(Default)]
    struct FakeStore {
        interactions: Mutex<HashMap<UserId, Vec<InteractionRecord>>>,
        products: HashMap<ProductId, ProductAttributes>,
        unavailable: AtomicBool,
        /// Catalog lookups for these ids fail.
        broken_products: Mutex<HashSet<ProductId>>,
    }

    impl FakeStore {
        fn with_products(products: Vec<ProductAttributes>) -> Self {
            Self {
                products: products.into_iter().map(|p| (p.product_id.clone(), p)).collect(),
                ..Self::default()
            }
        }

        fn record(&self, user: &str, product: &str, kind: &str, score: f64, count: u32) {
            let record = InteractionRecord {
                user_id: UserId::new(user),
                product_id: ProductId::new(product),
                kind: InteractionType::from(kind),
                score,
                count,
                updated_at: may(),
            };
            let mut interactions = self.interactions.lock().expect("lock");
            interactions.entry(record.user_id.clone()).or_default().push(record);
        }

        fn check_available(&self) -> Result<(), StoreError> {
            if self.unavailable.load(Ordering::SeqCst) {
                Err(StoreError::Unavailable("interaction store offline".to_owned()))
            } else {
                Ok(())
            }
        }

        fn break_product(&self, product: &str) {
            self.broken_products.lock().expect("lock").insert(ProductId::new(product));
        }
    }

    #[async_trait]
    impl InteractionStore for FakeStore {
        async fn interactions_for(
            &self,
            user_id: &UserId,
        ) -> Result<Vec<InteractionRecord>, StoreError> {
            self.check_available()?;
            let interactions = self.interactions.lock().expect("lock");
            Ok(interactions.get(user_id).cloned().unwrap_or_default())
        }

        async fn all_user_interactions(
            &self,
        ) -> Result<HashMap<UserId, Vec<InteractionRecord>>, StoreError> {
            self.check_available()?;
            Ok(self.interactions.lock().expect("lock").clone())
        }
    }

    #[async_trait]
    impl ProductCatalog for FakeStore {
        async fn attributes(
            &self,
            product_id: &ProductId,
        ) -> Result<Option<ProductAttributes>, StoreError> {
            if self.broken_products.lock().expect("lock").contains(product_id) {
                return Err(StoreError::Unavailable(format!("catalog lookup for {product_id}")));
            }
            Ok(self.products.get(product_id).cloned())
        }
    }

    /// Holds its first full-history read until released, after taking a copy
    /// of the data as it was at call time.
    struct SlowFirstRead {
        inner: FakeStore,
        reads: AtomicUsize,
        release: Notify,
    }

    #[async_trait]
    impl InteractionStore for SlowFirstRead {
        async fn interactions_for(
            &self,
            user_id: &UserId,
        ) -> Result<Vec<InteractionRecord>, StoreError> {
            self.inner.interactions_for(user_id).await
        }

        async fn all_user_interactions(
            &self,
        ) -> Result<HashMap<UserId, Vec<InteractionRecord>>, StoreError> {
            let data = self.inner.all_user_interactions().await?;
            if self.reads.fetch_add(1, Ordering::SeqCst) == 0 {
                self.release.notified().await;
            }
            Ok(data)
        }
    }

    #[async_trait]
    impl ProductCatalog for SlowFirstRead {
        async fn attributes(
            &self,
            product_id: &ProductId,
        ) -> Result<Option<ProductAttributes>, StoreError> {
            self.inner.attributes(product_id).await
        }
    }

    fn may() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 15, 9, 0, 0).single().expect("valid date")
    }

    fn product(id: &str, category: &str, price: Option<i64>) -> ProductAttributes {
        let product = ProductAttributes::new(id).with_category(category);
        match price {
            Some(price) => product.with_price(Decimal::new(price, 0)),
            None => product,
        }
    }

    fn engine(store: &Arc<FakeStore>) -> HybridRecommender {
        HybridRecommender::new(store.clone(), store.clone())
    }

    fn ids(values: &[&str]) -> Vec<ProductId> {
        values.iter().map(|value| ProductId::new(*value)).collect()
    }

    fn find<'a>(results: &'a [RecommendationResult], id: &str) -> &'a RecommendationResult {
        results.iter().find(|r| r.product_id.as_str() == id).expect("product in results")
    }

    #[tokio::test]
    async fn content_and_seasonal_drive_scores_without_other_users() {
        let store = Arc::new(FakeStore::with_products(vec![
            product("1", "strawberry", Some(10)),
            product("2", "strawberry", Some(8)),
        ]));
        store.record("U", "1", "purchase", 5.0, 1);

        let results = engine(&store)
            .recommend_for_user(&UserId::new("U"), &ids(&["1", "2"]), may())
            .await
            .expect("recommendations");

        let second = find(&results, "2");
        assert_eq!(second.breakdown.collaborative, 0.0);
        assert!(second.final_score > 0.0);
        // content = 0.4 + 0.2 * 0.8 + 0.4 = 0.96; base = 0.4 * 0.96; final = 0.7 * base + 0.3
        assert!((second.final_score - 0.5688).abs() < 1e-9);
        assert_eq!(results[0].product_id.as_str(), "1");
    }

    #[tokio::test]
    async fn cold_start_user_gets_seasonal_only_scores() {
        let store = Arc::new(FakeStore::with_products(vec![
            product("A", "strawberry", Some(4)),
            product("B", "pumpkin", Some(6)),
        ]));
        store.record("veteran", "A", "purchase", 5.0, 3);

        let results = engine(&store)
            .recommend_for_user(&UserId::new("newcomer"), &ids(&["B", "A"]), may())
            .await
            .expect("recommendations");

        assert_eq!(results.len(), 2);
        for result in &results {
            assert_eq!(result.breakdown.collaborative, 0.0);
            assert_eq!(result.breakdown.content, 0.0);
            assert!((result.final_score - 0.3 * result.breakdown.seasonal).abs() < 1e-12);
        }
        // Strawberries are in season in May, pumpkins are not.
        assert_eq!(results[0].product_id.as_str(), "A");
    }

    #[tokio::test]
    async fn similar_users_drive_collaborative_score() {
        let store = Arc::new(FakeStore::with_products(vec![
            product("A", "apple", None),
            product("X", "pear", None),
        ]));
        store.record("U", "A", "view", 1.0, 1);
        store.record("V", "A", "view", 1.0, 1);
        store.record("V", "X", "purchase", 4.0, 1);

        let results = engine(&store)
            .recommend_for_user(&UserId::new("U"), &ids(&["X"]), may())
            .await
            .expect("recommendations");

        let x = find(&results, "X");
        assert!((x.breakdown.collaborative - 4.0).abs() < 1e-12);
        assert!((x.breakdown.content - 0.4).abs() < 1e-12);
        // pear is three months from season in May
        assert!((x.breakdown.seasonal - 0.7).abs() < 1e-12);
        assert!((x.final_score - 2.002).abs() < 1e-9);

        let shares = x.contributions;
        let total = shares.collaborative + shares.content + shares.seasonal;
        assert!((total - x.final_score).abs() < 1e-9);
        assert_eq!(x.dominant_signal(), Signal::Collaborative);
    }

    #[tokio::test]
    async fn repeated_calls_are_deterministic() {
        let store = Arc::new(FakeStore::with_products(vec![
            product("A", "apple", Some(3)),
            product("B", "apple", Some(3)),
            product("C", "corn", Some(2)),
            product("D", "grape", None),
        ]));
        for (user, product, score) in
            [("U", "A", 2.0), ("V", "A", 1.0), ("V", "B", 3.0), ("W", "A", 1.0), ("W", "C", 2.0)]
        {
            store.record(user, product, "purchase", score, 1);
        }
        let engine = engine(&store);
        let candidates = ids(&["D", "C", "B", "A"]);

        let first = engine.recommend_for_user(&UserId::new("U"), &candidates, may()).await;
        let second = engine.recommend_for_user(&UserId::new("U"), &candidates, may()).await;

        assert_eq!(first.expect("first"), second.expect("second"));
    }

    #[tokio::test]
    async fn unresolvable_and_duplicate_candidates_are_skipped() {
        let store = Arc::new(FakeStore::with_products(vec![product("A", "apple", Some(3))]));

        let results = engine(&store)
            .recommend_for_user(&UserId::new("U"), &ids(&["ghost", "A", "A"]), may())
            .await
            .expect("recommendations");

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].product_id.as_str(), "A");
    }

    #[tokio::test]
    async fn store_failure_propagates_instead_of_empty_result() {
        let store = Arc::new(FakeStore::with_products(vec![product("A", "apple", None)]));
        store.unavailable.store(true, Ordering::SeqCst);

        let error = engine(&store)
            .recommend_for_user(&UserId::new("U"), &ids(&["A"]), may())
            .await
            .expect_err("store is offline");

        assert!(matches!(error, ApplicationError::Store(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn catalog_failure_on_candidate_propagates() {
        let store = Arc::new(FakeStore::with_products(vec![
            product("A", "apple", None),
            product("B", "pear", None),
        ]));
        store.break_product("B");

        let error = engine(&store)
            .recommend_for_user(&UserId::new("newcomer"), &ids(&["A", "B"]), may())
            .await
            .expect_err("catalog lookup for B fails");

        assert!(matches!(error, ApplicationError::Store(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn catalog_failure_on_reference_product_propagates() {
        let store = Arc::new(FakeStore::with_products(vec![
            product("A", "apple", None),
            product("X", "pear", None),
        ]));
        store.record("U", "A", "purchase", 5.0, 1);
        store.break_product("A");

        let error = engine(&store)
            .recommend_for_user(&UserId::new("U"), &ids(&["X"]), may())
            .await
            .expect_err("reference lookup fails");

        assert!(error.is_transient());
    }

    #[tokio::test]
    async fn catalog_failure_in_similar_products_propagates() {
        let store = Arc::new(FakeStore::with_products(vec![
            product("straw-1", "strawberry", Some(10)),
            product("straw-2", "strawberry", Some(10)),
        ]));
        let engine = engine(&store);

        store.break_product("straw-2");
        let pool_error = engine
            .find_similar_products(&ProductId::new("straw-1"), &ids(&["straw-2"]), 3, may())
            .await
            .expect_err("pool lookup fails");
        assert!(matches!(pool_error, ApplicationError::Store(StoreError::Unavailable(_))));

        store.break_product("straw-1");
        let anchor_error = engine
            .find_similar_products(&ProductId::new("straw-1"), &ids(&["straw-2"]), 3, may())
            .await
            .expect_err("anchor lookup fails");
        assert!(matches!(anchor_error, ApplicationError::Store(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn slower_overlapping_refresh_does_not_replace_newer_snapshot() {
        let store = Arc::new(SlowFirstRead {
            inner: FakeStore::with_products(vec![
                product("A", "apple", None),
                product("X", "pear", None),
            ]),
            reads: AtomicUsize::new(0),
            release: Notify::new(),
        });
        store.inner.record("U", "A", "view", 1.0, 1);
        let engine = HybridRecommender::new(store.clone(), store.clone());

        let (slow, fast) = tokio::join!(engine.refresh(), async {
            store.inner.record("V", "A", "view", 1.0, 1);
            store.inner.record("V", "X", "purchase", 4.0, 1);
            let result = engine.refresh().await;
            store.release.notify_one();
            result
        });
        slow.expect("slow refresh");
        fast.expect("fast refresh");

        assert_eq!(engine.snapshot_generation(), Some(1));
        let results = engine
            .recommend_for_user(&UserId::new("U"), &ids(&["X"]), may())
            .await
            .expect("recommendations");
        assert!((results[0].breakdown.collaborative - 4.0).abs() < 1e-12);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn reads_during_refresh_see_a_whole_snapshot() {
        let store = Arc::new(FakeStore::with_products(vec![
            product("A", "apple", Some(2)),
            product("X", "pear", Some(3)),
        ]));
        store.record("U", "A", "view", 1.0, 2);
        store.record("V", "A", "view", 1.0, 1);
        store.record("V", "X", "purchase", 4.0, 1);
        let engine = Arc::new(engine(&store));
        let candidates = ids(&["X", "A"]);
        let expected = engine
            .recommend_for_user(&UserId::new("U"), &candidates, may())
            .await
            .expect("live");

        let refresher = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                for _ in 0..50 {
                    engine.refresh().await?;
                    tokio::task::yield_now().await;
                }
                Ok::<_, ApplicationError>(())
            })
        };
        let reader = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                let mut seen = Vec::new();
                for _ in 0..50 {
                    seen.push(
                        engine.recommend_for_user(&UserId::new("U"), &candidates, may()).await?,
                    );
                    tokio::task::yield_now().await;
                }
                Ok::<_, ApplicationError>(seen)
            })
        };

        refresher.await.expect("refresher task").expect("refreshes");
        let seen = reader.await.expect("reader task").expect("reads");
        assert!(seen.iter().all(|results| results == &expected));
        assert_eq!(engine.snapshot_generation(), Some(50));
    }

    #[tokio::test]
    async fn refreshed_snapshot_serves_neighbors_until_invalidated() {
        let store = Arc::new(FakeStore::with_products(vec![
            product("A", "apple", None),
            product("X", "pear", None),
        ]));
        store.record("U", "A", "view", 1.0, 1);
        let engine = engine(&store);

        engine.refresh().await.expect("refresh");
        assert_eq!(engine.snapshot_generation(), Some(1));

        // A neighbor that appears after the refresh is invisible to the snapshot.
        store.record("V", "A", "view", 1.0, 1);
        store.record("V", "X", "purchase", 4.0, 1);
        let cached = engine
            .recommend_for_user(&UserId::new("U"), &ids(&["X"]), may())
            .await
            .expect("cached");
        assert_eq!(cached[0].breakdown.collaborative, 0.0);

        engine.invalidate();
        assert_eq!(engine.snapshot_generation(), None);
        let live = engine
            .recommend_for_user(&UserId::new("U"), &ids(&["X"]), may())
            .await
            .expect("live");
        assert!((live[0].breakdown.collaborative - 4.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn refresh_is_idempotent_and_matches_live_scoring() {
        let store = Arc::new(FakeStore::with_products(vec![
            product("A", "apple", Some(2)),
            product("X", "pear", Some(3)),
        ]));
        store.record("U", "A", "view", 1.0, 2);
        store.record("V", "A", "view", 1.0, 1);
        store.record("V", "X", "purchase", 4.0, 1);
        let engine = engine(&store);
        let candidates = ids(&["X", "A"]);

        let live = engine.recommend_for_user(&UserId::new("U"), &candidates, may()).await;
        engine.refresh().await.expect("first refresh");
        engine.refresh().await.expect("second refresh");
        let cached = engine.recommend_for_user(&UserId::new("U"), &candidates, may()).await;

        assert_eq!(engine.snapshot_generation(), Some(2));
        assert_eq!(live.expect("live"), cached.expect("cached"));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_snapshot() {
        let store = Arc::new(FakeStore::default());
        let engine = engine(&store);
        engine.refresh().await.expect("refresh");

        store.unavailable.store(true, Ordering::SeqCst);
        let error = engine.refresh().await.expect_err("store is offline");

        assert!(error.is_transient());
        assert_eq!(engine.snapshot_generation(), Some(1));
    }

    #[tokio::test]
    async fn similar_products_exclude_anchor_and_apply_season() {
        let store = Arc::new(FakeStore::with_products(vec![
            product("straw-1", "strawberry", Some(10)),
            product("straw-2", "strawberry", Some(10)),
            product("pump-1", "pumpkin", Some(10)),
            product("apple-1", "apple", Some(20)),
        ]));

        let results = engine(&store)
            .find_similar_products(
                &ProductId::new("straw-1"),
                &ids(&["straw-1", "pump-1", "straw-2", "apple-1", "ghost"]),
                2,
                may(),
            )
            .await
            .expect("similar products");

        let ranked: Vec<&str> = results.iter().map(|r| r.product_id.as_str()).collect();
        assert_eq!(ranked, vec!["straw-2", "pump-1"]);
        assert!(results.iter().all(|r| r.breakdown.collaborative == 0.0));
        // straw-2: content 1.0, in season -> 0.7 + 0.3
        assert!((results[0].final_score - 1.0).abs() < 1e-12);
        // pump-1: content 0.6, September is four months out in May -> 0.6 seasonal
        assert!((results[1].final_score - (0.7 * 0.6 + 0.3 * 0.6)).abs() < 1e-12);
    }

    #[tokio::test]
    async fn season_agnostic_mode_ranks_on_content_alone() {
        let store = Arc::new(FakeStore::with_products(vec![
            product("straw-1", "strawberry", Some(10)),
            product("pump-1", "pumpkin", Some(10)),
        ]));
        let request = SimilarProductsRequest::new("straw-1", 5, may())
            .with_pool(["pump-1"])
            .season_agnostic();

        let results = engine(&store).similar_products(request).await.expect("similar products");

        assert_eq!(results.len(), 1);
        assert!((results[0].final_score - results[0].breakdown.content).abs() < 1e-12);
        assert_eq!(results[0].breakdown.seasonal, SEASONAL_NEUTRAL_SCORE);
        assert_eq!(results[0].dominant_signal(), Signal::Content);
    }

    #[tokio::test]
    async fn similar_products_validate_limit_and_tolerate_unknown_anchor() {
        let store = Arc::new(FakeStore::with_products(vec![product("A", "apple", None)]));
        let engine = engine(&store);

        let error = engine
            .find_similar_products(&ProductId::new("A"), &ids(&["A"]), 0, may())
            .await
            .expect_err("zero limit");
        assert!(matches!(error, ApplicationError::Domain(DomainError::InvalidLimit)));

        let results = engine
            .find_similar_products(&ProductId::new("ghost"), &ids(&["A"]), 3, may())
            .await
            .expect("unknown anchor");
        assert!(results.is_empty());
    }

    #[test]
    fn from_config_rejects_invalid_weights() {
        let store = Arc::new(FakeStore::default());
        let config = RecommenderConfig {
            hybrid: HybridWeights { collaborative: 0.9, content: 0.4 },
            ..RecommenderConfig::default()
        };

        let error = HybridRecommender::from_config(store.clone(), store, &config)
            .expect_err("weights sum to 1.3");
        assert!(matches!(
            error,
            ApplicationError::Domain(DomainError::InvalidWeights { name: "hybrid", .. })
        ));
    }
}
