use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cadence, ContentDepth, Interaction, InteractionType};

/// Engagement state kept per user for the recommender
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecommendationProfile {
    #[serde(default)]
    pub viewed: HashSet<Uuid>,
    #[serde(default)]
    pub subscribed: HashSet<Uuid>,
    /// Running interaction score per newsletter
    #[serde(default)]
    pub interaction_scores: HashMap<Uuid, i64>,
}

impl RecommendationProfile {
    /// Applies an engagement change. Set membership is idempotent, score
    /// increments are not.
    pub fn apply(&mut self, delta: &EngagementDelta) {
        match delta.interaction_type {
            InteractionType::View => {
                self.viewed.insert(delta.item_id);
            }
            InteractionType::Subscribe => {
                self.subscribed.insert(delta.item_id);
            }
            InteractionType::Unsubscribe => {
                self.subscribed.remove(&delta.item_id);
            }
            InteractionType::Read | InteractionType::Dismiss => {}
        }

        let change = delta.interaction_type.score_delta();
        if change != 0 {
            *self.interaction_scores.entry(delta.item_id).or_insert(0) += change;
        }
    }

    pub fn score_for(&self, item_id: &Uuid) -> i64 {
        self.interaction_scores.get(item_id).copied().unwrap_or(0)
    }
}

/// A reader's preferences and engagement history.
///
/// Every field except the id defaults to empty, so partially populated
/// profiles still score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub user_id: Uuid,
    /// Selected categories
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub cadence: Option<Cadence>,
    #[serde(default)]
    pub depth: Option<ContentDepth>,
    /// Recent interactions, oldest first. Loaded with a recency cap and never
    /// persisted as part of the profile.
    #[serde(default, skip_serializing)]
    pub interaction_history: Vec<Interaction>,
    #[serde(default)]
    pub recommendation: RecommendationProfile,
}

impl UserProfile {
    /// Profile with no preferences or history
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            categories: Vec::new(),
            cadence: None,
            depth: None,
            interaction_history: Vec::new(),
            recommendation: RecommendationProfile::default(),
        }
    }

    /// Number of loaded history entries against `item_id`
    pub fn interactions_with(&self, item_id: &Uuid) -> usize {
        self.interaction_history
            .iter()
            .filter(|i| i.item_id == *item_id)
            .count()
    }
}

/// Explicit preference change; `None` leaves a field untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PreferenceUpdate {
    #[serde(default)]
    pub categories: Option<Vec<String>>,
    #[serde(default)]
    pub cadence: Option<Cadence>,
    #[serde(default)]
    pub depth: Option<ContentDepth>,
}

/// Engagement change produced by a recorded interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngagementDelta {
    pub item_id: Uuid,
    pub interaction_type: InteractionType,
}

/// Partial update accepted by the profile store
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileUpdate {
    Preferences(PreferenceUpdate),
    Engagement(EngagementDelta),
}

impl UserProfile {
    pub fn apply(&mut self, update: &ProfileUpdate) {
        match update {
            ProfileUpdate::Preferences(prefs) => {
                if let Some(categories) = &prefs.categories {
                    self.categories = categories.clone();
                }
                if prefs.cadence.is_some() {
                    self.cadence = prefs.cadence;
                }
                if prefs.depth.is_some() {
                    self.depth = prefs.depth;
                }
            }
            ProfileUpdate::Engagement(delta) => self.recommendation.apply(delta),
        }
    }
}
