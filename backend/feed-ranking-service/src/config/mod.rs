use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub ranking: RankingConfig,
    pub proximity: ProximityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub port: u16,
    pub service_name: String,
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    pub proximity_boost_enabled: bool,
    pub learning_rate: f64,
    pub training_iterations: u32,
    pub training_error_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProximityConfig {
    pub base_url: String,
    pub radius_km: u32,
    pub timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Config {
            service: ServiceConfig {
                port: std::env::var("APP_PORT")
                    .unwrap_or_else(|_| "8012".to_string())
                    .parse()?,
                service_name: std::env::var("SERVICE_NAME")
                    .unwrap_or_else(|_| "feed-ranking-service".to_string()),
                log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")?,
                max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()?,
            },
            redis: RedisConfig {
                url: std::env::var("REDIS_URL")
                    .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            },
            ranking: RankingConfig {
                proximity_boost_enabled: std::env::var("PROXIMITY_BOOST_ENABLED")
                    .unwrap_or_else(|_| "true".to_string())
                    .parse()?,
                learning_rate: std::env::var("TRAINING_LEARNING_RATE")
                    .unwrap_or_else(|_| "0.3".to_string())
                    .parse()?,
                training_iterations: std::env::var("TRAINING_ITERATIONS")
                    .unwrap_or_else(|_| "1000".to_string())
                    .parse()?,
                training_error_threshold: std::env::var("TRAINING_ERROR_THRESHOLD")
                    .unwrap_or_else(|_| "0.005".to_string())
                    .parse()?,
            },
            proximity: ProximityConfig {
                base_url: std::env::var("PROXIMITY_SERVICE_URL")
                    .unwrap_or_else(|_| "http://localhost:8020".to_string()),
                radius_km: std::env::var("PROXIMITY_RADIUS_KM")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()?,
                timeout_secs: std::env::var("PROXIMITY_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()?,
            },
        })
    }
}
