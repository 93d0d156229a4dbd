//! Offline weight adaptation.
//!
//! [`LearningService::retrain`] turns recent interaction feedback into a
//! [`WeightProposal`]. Adoption is up to the caller.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    db::{with_timeout, InteractionStore, ItemStore, ProfileStore},
    error::AppResult,
    models::{InteractionFilter, ItemUpdate, Newsletter, Sentiment, UserProfile},
    services::scorer::{category_match, subscriber_score, Scorer, ScoringWeights},
};

const DECAY: f64 = 0.9;
const DECAY_THRESHOLD: f64 = 50.0;

/// Majority sentiment one reader expressed about one item
#[derive(Debug, Clone)]
pub struct Feedback {
    pub item_id: Uuid,
    pub positive: bool,
    pub profile: UserProfile,
}

/// Produces scoring weights from recent feedback
pub trait WeightAdapter: Send + Sync {
    fn adapt(&self, recent_items: &[Newsletter], feedback: &[Feedback]) -> ScoringWeights;
}

/// Decays the category and subscriber weights for each negative signal on an
/// item that scored high on that component. Never increases a weight.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicDecay {
    base: ScoringWeights,
}

impl HeuristicDecay {
    pub fn new(base: ScoringWeights) -> Self {
        Self { base }
    }
}

impl WeightAdapter for HeuristicDecay {
    fn adapt(&self, recent_items: &[Newsletter], feedback: &[Feedback]) -> ScoringWeights {
        let items: HashMap<Uuid, &Newsletter> = recent_items.iter().map(|i| (i.id, i)).collect();
        let mut weights = self.base;

        for entry in feedback.iter().filter(|f| !f.positive) {
            let Some(item) = items.get(&entry.item_id) else {
                continue;
            };
            if category_match(item, &entry.profile) > DECAY_THRESHOLD {
                weights.category *= DECAY;
            }
            if subscriber_score(item.subscriber_count) > DECAY_THRESHOLD {
                weights.subscribers *= DECAY;
            }
        }

        weights
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WeightProposal {
    pub weights: ScoringWeights,
    pub items_considered: usize,
    pub negative_items: usize,
    pub generated_at: DateTime<Utc>,
}

#[derive(Default)]
struct ItemTally {
    positive: usize,
    negative: usize,
    last_positive_user: Option<Uuid>,
    last_negative_user: Option<Uuid>,
}

impl ItemTally {
    fn majority(&self) -> Option<(bool, Uuid)> {
        if self.positive >= self.negative {
            self.last_positive_user.map(|user| (true, user))
        } else {
            self.last_negative_user.map(|user| (false, user))
        }
    }
}

#[derive(Clone)]
pub struct LearningService {
    items: Arc<dyn ItemStore>,
    interactions: Arc<dyn InteractionStore>,
    profiles: Arc<dyn ProfileStore>,
    adapter: Arc<dyn WeightAdapter>,
    window: chrono::Duration,
    page_size: usize,
    timeout: Duration,
}

impl LearningService {
    pub fn new(
        items: Arc<dyn ItemStore>,
        interactions: Arc<dyn InteractionStore>,
        profiles: Arc<dyn ProfileStore>,
        adapter: Arc<dyn WeightAdapter>,
        window: chrono::Duration,
        page_size: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            items,
            interactions,
            profiles,
            adapter,
            window,
            page_size,
            timeout,
        }
    }

    /// Builds a weight proposal from the recent interaction window and
    /// refreshes the stored quality score of every item in it
    pub async fn retrain(&self) -> AppResult<WeightProposal> {
        let filter = InteractionFilter::recent(Utc::now() - self.window, self.page_size);
        let recent = with_timeout(
            "interaction query",
            self.timeout,
            self.interactions.query(&filter),
        )
        .await?;

        // Oldest first, so the last user seen per sentiment is the most recent
        let mut tallies: HashMap<Uuid, ItemTally> = HashMap::new();
        for interaction in &recent {
            let tally = tallies.entry(interaction.item_id).or_default();
            match interaction.interaction_type.sentiment() {
                Sentiment::Positive => {
                    tally.positive += 1;
                    tally.last_positive_user = Some(interaction.user_id);
                }
                Sentiment::Negative => {
                    tally.negative += 1;
                    tally.last_negative_user = Some(interaction.user_id);
                }
                Sentiment::Neutral => {}
            }
        }

        let mut recent_items = Vec::with_capacity(tallies.len());
        let mut feedback = Vec::new();
        for (item_id, tally) in &tallies {
            let Some(item) =
                with_timeout("item lookup", self.timeout, self.items.get(*item_id)).await?
            else {
                tracing::debug!(item_id = %item_id, "Skipping feedback for unknown item");
                continue;
            };

            if let Some((positive, user_id)) = tally.majority() {
                let profile = with_timeout(
                    "profile lookup",
                    self.timeout,
                    self.profiles.get_profile(user_id),
                )
                .await?
                .unwrap_or_else(|| UserProfile::empty(user_id));

                feedback.push(Feedback {
                    item_id: *item_id,
                    positive,
                    profile,
                });
            }
            recent_items.push(item);
        }

        let weights = self.adapter.adapt(&recent_items, &feedback);
        self.refresh_item_scores(&recent_items, weights).await;

        let proposal = WeightProposal {
            weights,
            items_considered: feedback.len(),
            negative_items: feedback.iter().filter(|f| !f.positive).count(),
            generated_at: Utc::now(),
        };

        tracing::info!(
            items_considered = proposal.items_considered,
            negative_items = proposal.negative_items,
            weights = ?proposal.weights,
            "Weight proposal generated"
        );

        Ok(proposal)
    }

    async fn refresh_item_scores(&self, items: &[Newsletter], weights: ScoringWeights) {
        let scorer = Scorer::new(weights);
        let anonymous = UserProfile::empty(Uuid::nil());

        for item in items {
            let update = ItemUpdate {
                recommendation_score: Some(scorer.score(item, &anonymous)),
                status: None,
            };
            if let Err(e) =
                with_timeout("item update", self.timeout, self.items.update(item.id, &update)).await
            {
                tracing::warn!(item_id = %item.id, error = %e, "Failed to refresh item score");
            }
        }
    }
}
