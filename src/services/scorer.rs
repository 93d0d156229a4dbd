//! Multi-signal content scorer.
//!
//! Every sub-score is normalized to [0, 100] before weighting and the weighted
//! sum is clamped to [0, 100] whether or not the weights sum to one.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Newsletter, UserProfile};

/// Subscriber count at which the popularity signal saturates
const SUBSCRIBER_SATURATION: f64 = 1_000_000.0;
/// Days for the recency signal to fall to 1/e
const RECENCY_DECAY_DAYS: f64 = 30.0;
const POINTS_PER_INTERACTION: f64 = 20.0;
const DEPTH_MATCH_POINTS: f64 = 50.0;

/// Weight applied to each sub-score
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoringWeights {
    pub category: f64,
    pub subscribers: f64,
    pub interaction_history: f64,
    pub content_depth: f64,
    pub recency: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            category: 0.30,
            subscribers: 0.20,
            interaction_history: 0.25,
            content_depth: 0.15,
            recency: 0.10,
        }
    }
}

/// Individual sub-scores for one (item, profile) pair, each in [0, 100]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub category: f64,
    pub subscribers: f64,
    pub interaction_history: f64,
    pub content_depth: f64,
    pub recency: f64,
}

impl ScoreBreakdown {
    /// Weighted total clamped to [0, 100]; NaN collapses to 0
    pub fn total(&self, weights: &ScoringWeights) -> f64 {
        let sum = self.category * weights.category
            + self.subscribers * weights.subscribers
            + self.interaction_history * weights.interaction_history
            + self.content_depth * weights.content_depth
            + self.recency * weights.recency;

        if sum.is_nan() {
            0.0
        } else {
            sum.clamp(0.0, 100.0)
        }
    }
}

/// Share of the reader's selected categories found in the item's labels.
///
/// A selected category matches when it appears, case-insensitively, as a
/// substring of any of the item's category labels.
pub fn category_match(item: &Newsletter, profile: &UserProfile) -> f64 {
    if profile.categories.is_empty() {
        return 0.0;
    }

    let labels: Vec<String> = item.categories.iter().map(|c| c.to_lowercase()).collect();
    let matched = profile
        .categories
        .iter()
        .map(|c| c.to_lowercase())
        .filter(|selected| labels.iter().any(|label| label.contains(selected.as_str())))
        .count();

    matched as f64 / profile.categories.len() as f64 * 100.0
}

/// Logarithmic popularity score
pub fn subscriber_score(subscribers: u64) -> f64 {
    let scaled = 100.0 * (subscribers as f64 + 1.0).ln() / SUBSCRIBER_SATURATION.ln();
    scaled.min(100.0)
}

pub fn interaction_history_score(item: &Newsletter, profile: &UserProfile) -> f64 {
    (POINTS_PER_INTERACTION * profile.interactions_with(&item.id) as f64).min(100.0)
}

pub fn content_depth_score(item: &Newsletter, profile: &UserProfile) -> f64 {
    match profile.depth {
        Some(depth) if depth == item.content_type => DEPTH_MATCH_POINTS,
        _ => 0.0,
    }
}

/// Exponential decay from the last publish time. Unknown ⇒ 0.
pub fn recency_score(last_published_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(published) = last_published_at else {
        return 0.0;
    };

    let days = ((now - published).num_seconds() as f64 / 86_400.0).max(0.0);
    (100.0 * (-days / RECENCY_DECAY_DAYS).exp()).max(0.0)
}

/// Stateless scorer. The caller supplies the weights or uses the defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct Scorer {
    weights: ScoringWeights,
}

impl Scorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    pub fn breakdown(&self, item: &Newsletter, profile: &UserProfile) -> ScoreBreakdown {
        self.breakdown_at(item, profile, Utc::now())
    }

    pub fn breakdown_at(
        &self,
        item: &Newsletter,
        profile: &UserProfile,
        now: DateTime<Utc>,
    ) -> ScoreBreakdown {
        ScoreBreakdown {
            category: category_match(item, profile),
            subscribers: subscriber_score(item.subscriber_count),
            interaction_history: interaction_history_score(item, profile),
            content_depth: content_depth_score(item, profile),
            recency: recency_score(item.last_published_at, now),
        }
    }

    /// Score in [0, 100]
    pub fn score(&self, item: &Newsletter, profile: &UserProfile) -> f64 {
        self.breakdown(item, profile).total(&self.weights)
    }
}
