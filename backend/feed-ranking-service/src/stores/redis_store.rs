//! Redis implementation of [`ModelStore`].

use super::ModelStore;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::sync::Arc;

#[derive(Clone)]
pub struct RedisModelStore {
    client: Arc<ConnectionManager>,
}

impl RedisModelStore {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| AppError::Cache(format!("Failed to create Redis client: {}", e)))?;

        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| AppError::Cache(format!("Failed to create Redis connection: {}", e)))?;

        Ok(Self {
            client: Arc::new(manager),
        })
    }

    /// Connection health check, called from a periodic background task to
    /// keep the managed connection alive.
    pub async fn ping(&self) -> Result<()> {
        redis::cmd("PING")
            .query_async::<_, String>(&mut self.client.as_ref().clone())
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ModelStore for RedisModelStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut self.client.as_ref().clone())
            .await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        redis::cmd("SETEX")
            .arg(key)
            .arg(ttl_secs)
            .arg(value)
            .query_async::<_, ()>(&mut self.client.as_ref().clone())
            .await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        redis::cmd("DEL")
            .arg(key)
            .query_async::<_, ()>(&mut self.client.as_ref().clone())
            .await?;
        Ok(())
    }
}
