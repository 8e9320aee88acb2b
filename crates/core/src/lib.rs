pub mod config;
pub mod domain;
pub mod errors;
pub mod ports;
pub mod recommend;
pub mod telemetry;

pub use config::{AppConfig, LoadOptions, RecommenderConfig};
pub use domain::{
    CategoryId, InteractionRecord, InteractionType, ProductAttributes, ProductId, UserId,
    UserInteractionVector,
};
pub use errors::{ApplicationError, DomainError, StoreError};
pub use ports::{InteractionStore, ProductCatalog};
pub use recommend::{
    HybridRecommender, RecommendationRequest, RecommendationResult, ScoreBreakdown, SeasonalMode,
    Signal, SimilarProductsRequest,
};
