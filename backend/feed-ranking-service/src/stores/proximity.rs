//! HTTP implementation of [`ProximityLookup`].
//!
//! The proximity service caches school-distance lookups on its side; this
//! client stays stateless and simply translates one GET per request.

use super::ProximityLookup;
use crate::config::ProximityConfig;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

pub struct HttpProximityLookup {
    http: reqwest::Client,
    base_url: String,
    radius_km: u32,
}

#[derive(Debug, Deserialize)]
struct NearbySchoolsResponse {
    school_ids: Vec<String>,
}

impl HttpProximityLookup {
    pub fn new(config: &ProximityConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration(format!("proximity client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            radius_km: config.radius_km,
        })
    }
}

#[async_trait]
impl ProximityLookup for HttpProximityLookup {
    async fn nearby_schools(&self, school_id: &str) -> Result<Vec<String>> {
        let url = format!("{}/schools/{}/nearby", self.base_url, school_id);
        let response = self
            .http
            .get(&url)
            .query(&[("radius_km", self.radius_km)])
            .send()
            .await?
            .error_for_status()
            .map_err(|e| AppError::Lookup(e.to_string()))?;

        let body: NearbySchoolsResponse = response.json().await?;
        Ok(body.school_ids)
    }
}
