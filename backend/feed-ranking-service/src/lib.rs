pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod services;
pub mod stores;
pub mod utils;

pub use cache::{CachedRankingModel, ModelCacheConfig, RankingModelCache, MODEL_FORMAT_VERSION};
pub use config::Config;
pub use error::{AppError, Result};
pub use metrics::{CacheMetrics, CacheMetricsSnapshot};

// Re-export the engine components
pub use services::{
    AuthorDiversityLimiter, CandidateAggregator, ModelTrainer, PersonalizedFeedEngine,
    ProximityBooster, RecallConfig, TrainerConfig,
};
