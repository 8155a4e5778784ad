//! Per-user model training.
//!
//! Builds a labeled training set from recent engagement history and fits
//! the compact feed-forward network in [`network`]. Training runs inline
//! in the request future; the networks are small enough that a full run
//! finishes in well under two seconds.

pub mod network;

pub use network::{
    validate_shape, FeedForwardNetwork, SerializedModel, TrainingConfig, TrainingReport,
};

use crate::error::{AppError, Result};
use crate::models::{CandidatePost, UserContext};
use crate::services::features::{self, BatchStats, FeatureVector};
use crate::stores::EngagementStore;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// One labeled example: feature vector plus a {0, 1} relevance label.
#[derive(Debug, Clone)]
pub struct TrainingExample {
    pub features: FeatureVector,
    pub label: f64,
}

/// Trainer tunables. The engagement window and the negative-sample cap
/// bound how much history one training run reads.
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub window_days: i64,
    pub max_negative_examples: usize,
    pub max_positive_source_posts: usize,
    pub training: TrainingConfig,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            window_days: 7,
            max_negative_examples: 1000,
            max_positive_source_posts: 1000,
            training: TrainingConfig::default(),
        }
    }
}

/// A freshly trained model with its run statistics.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub network: FeedForwardNetwork,
    pub report: TrainingReport,
    pub example_count: usize,
}

pub struct ModelTrainer {
    store: Arc<dyn EngagementStore>,
    config: TrainerConfig,
}

impl ModelTrainer {
    pub fn new(store: Arc<dyn EngagementStore>, config: TrainerConfig) -> Self {
        Self { store, config }
    }

    /// Train a relevance model for the user. Returns `None` when the
    /// positive set is empty (nothing to learn from); store and numeric
    /// faults propagate to the caller.
    pub async fn train_for_user(
        &self,
        ctx: &UserContext,
        reference_ts: DateTime<Utc>,
    ) -> Result<Option<TrainedModel>> {
        let examples = self.build_training_set(ctx, reference_ts).await?;
        if examples.is_empty() {
            debug!(user_id = %ctx.user_id, "empty positive set, skipping training");
            return Ok(None);
        }

        let example_count = examples.len();
        let mut network = FeedForwardNetwork::new(&mut rand::thread_rng());
        let report = network.train(&examples, &self.config.training);

        if !report.error.is_finite() {
            return Err(AppError::Training(format!(
                "training diverged after {} iterations",
                report.iterations
            )));
        }

        debug!(
            user_id = %ctx.user_id,
            examples = example_count,
            error = report.error,
            iterations = report.iterations,
            "trained ranking model"
        );

        Ok(Some(TrainedModel {
            network,
            report,
            example_count,
        }))
    }

    /// Assemble the labeled set. Positives are the user's own engagements
    /// plus followed-author posts and posts followed accounts engaged
    /// with; negatives are an equal-opportunity sample of public local
    /// posts from the same window that are not in the positive set.
    /// An empty positive set yields an empty result without fetching
    /// negatives.
    pub async fn build_training_set(
        &self,
        ctx: &UserContext,
        reference_ts: DateTime<Utc>,
    ) -> Result<Vec<TrainingExample>> {
        let since = reference_ts - Duration::days(self.config.window_days);

        let positives = self.gather_positives(ctx, since).await?;
        if positives.is_empty() {
            return Ok(Vec::new());
        }

        let positive_ids: HashSet<Uuid> = positives.iter().map(|p| p.id).collect();
        let negatives = self
            .store
            .public_local_posts(since, self.config.max_negative_examples, &positive_ids)
            .await?;

        if negatives.is_empty() {
            warn!(user_id = %ctx.user_id, "no negative examples in window");
        }

        // Normalize both label sets against shared batch maxima so a count
        // means the same thing regardless of label.
        let mut batch: Vec<&CandidatePost> = positives.iter().collect();
        batch.extend(negatives.iter());
        let stats = batch_stats(&batch);

        let mut examples = Vec::with_capacity(positives.len() + negatives.len());
        for post in &positives {
            examples.push(TrainingExample {
                features: features::extract(post, ctx, &stats, reference_ts),
                label: 1.0,
            });
        }
        for post in &negatives {
            examples.push(TrainingExample {
                features: features::extract(post, ctx, &stats, reference_ts),
                label: 0.0,
            });
        }

        Ok(examples)
    }

    async fn gather_positives(
        &self,
        ctx: &UserContext,
        since: DateTime<Utc>,
    ) -> Result<Vec<CandidatePost>> {
        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut positives: Vec<CandidatePost> = Vec::new();
        let mut push_unique = |posts: Vec<CandidatePost>, positives: &mut Vec<CandidatePost>| {
            for post in posts {
                if seen.insert(post.id) {
                    positives.push(post);
                }
            }
        };

        let history = self.store.engagement_history(ctx.user_id, since).await?;
        push_unique(history.reacted, &mut positives);
        push_unique(history.replied, &mut positives);
        push_unique(history.renoted, &mut positives);

        if !ctx.following.is_empty() {
            let followed_posts = self
                .store
                .posts_by_authors(&ctx.following, since, self.config.max_positive_source_posts)
                .await?;
            push_unique(followed_posts, &mut positives);

            let followed_engaged = self
                .store
                .posts_engaged_by_followed(
                    ctx.user_id,
                    since,
                    self.config.max_positive_source_posts,
                )
                .await?;
            push_unique(followed_engaged, &mut positives);
        }

        Ok(positives)
    }
}

fn batch_stats(posts: &[&CandidatePost]) -> BatchStats {
    let mut stats = BatchStats::default();
    for post in posts {
        stats.observe(post);
    }
    stats
}
