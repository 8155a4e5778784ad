use actix_web::{web, App, HttpServer};
use feed_ranking_service::cache::{ModelCacheConfig, RankingModelCache};
use feed_ranking_service::config::Config;
use feed_ranking_service::handlers::{clear_ranking_model, get_feed, AppState};
use feed_ranking_service::metrics::CacheMetrics;
use feed_ranking_service::services::trainer::TrainingConfig;
use feed_ranking_service::services::{PersonalizedFeedEngine, RecallConfig, TrainerConfig};
use feed_ranking_service::stores::{
    HttpProximityLookup, PostgresEngagementStore, RedisModelStore, StaticFeatureFlags,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    dotenvy::dotenv().ok();

    // Load config
    let config = Config::from_env().expect("Failed to load config");

    info!(
        "Starting {} on port {}",
        config.service.service_name, config.service.port
    );

    // Relational store
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .expect("Failed to connect to Postgres");
    let store = Arc::new(PostgresEngagementStore::new(pool));

    // Model cache over Redis
    let model_store = Arc::new(
        RedisModelStore::new(&config.redis.url)
            .await
            .expect("Failed to connect to Redis"),
    );
    let cache_metrics = Arc::new(CacheMetrics::default());
    let cache = Arc::new(RankingModelCache::new(
        model_store,
        cache_metrics,
        ModelCacheConfig::default(),
    ));

    // Proximity lookup and instance flags
    let proximity = Arc::new(HttpProximityLookup::new(&config.proximity)?);
    let flags = Arc::new(StaticFeatureFlags {
        proximity_boost: config.ranking.proximity_boost_enabled,
    });

    let trainer_config = TrainerConfig {
        training: TrainingConfig {
            learning_rate: config.ranking.learning_rate,
            max_iterations: config.ranking.training_iterations,
            target_error: config.ranking.training_error_threshold,
        },
        ..Default::default()
    };

    let engine = Arc::new(PersonalizedFeedEngine::new(
        store,
        cache,
        proximity,
        flags,
        trainer_config,
        RecallConfig::default(),
    ));

    let state = web::Data::new(AppState { engine });
    let bind_addr = ("0.0.0.0", config.service.port);

    info!("HTTP server listening on {}:{}", bind_addr.0, bind_addr.1);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .service(get_feed)
            .service(clear_ranking_model)
    })
    .bind(bind_addr)?
    .run()
    .await?;

    Ok(())
}
