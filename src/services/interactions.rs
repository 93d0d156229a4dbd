use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    db::{with_timeout, InsightStore, InteractionStore, ProfileStore},
    error::{AppError, AppResult},
    models::{EngagementDelta, Insight, Interaction, InteractionType, ProfileUpdate, Sentiment},
    services::allocator::{VariantAllocator, BASELINE_VARIANT},
};

/// Records reader interactions and keeps the engagement profile in step
#[derive(Clone)]
pub struct InteractionRecorder {
    interactions: Arc<dyn InteractionStore>,
    profiles: Arc<dyn ProfileStore>,
    insights: Arc<dyn InsightStore>,
    allocator: VariantAllocator,
    experiment_id: Option<Uuid>,
    timeout: Duration,
}

impl InteractionRecorder {
    pub fn new(
        interactions: Arc<dyn InteractionStore>,
        profiles: Arc<dyn ProfileStore>,
        insights: Arc<dyn InsightStore>,
        allocator: VariantAllocator,
        experiment_id: Option<Uuid>,
        timeout: Duration,
    ) -> Self {
        Self {
            interactions,
            profiles,
            insights,
            allocator,
            experiment_id,
            timeout,
        }
    }

    /// Appends the interaction and applies its engagement delta.
    ///
    /// Positive and negative interactions are also counted against the
    /// reader's variant for the day; that step only logs on failure.
    pub async fn record(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        interaction_type: InteractionType,
        duration_secs: Option<u32>,
    ) -> AppResult<Uuid> {
        if user_id.is_nil() || item_id.is_nil() {
            return Err(AppError::InvalidInput(
                "user id and item id must not be nil".to_string(),
            ));
        }

        let interaction = Interaction::new(user_id, item_id, interaction_type, duration_secs);
        let id = with_timeout(
            "interaction append",
            self.timeout,
            self.interactions.append(&interaction),
        )
        .await?;

        let update = ProfileUpdate::Engagement(EngagementDelta {
            item_id,
            interaction_type,
        });
        with_timeout(
            "profile update",
            self.timeout,
            self.profiles.update_profile(user_id, &update),
        )
        .await?;

        tracing::info!(
            user_id = %user_id,
            item_id = %item_id,
            interaction = ?interaction_type,
            "Interaction recorded"
        );

        if let Err(e) = self.attribute(user_id, interaction_type).await {
            tracing::warn!(
                user_id = %user_id,
                operation = "attribute_interaction",
                error = %e,
                "Failed to attribute interaction to a variant"
            );
        }

        Ok(id)
    }

    async fn attribute(&self, user_id: Uuid, interaction_type: InteractionType) -> AppResult<()> {
        let positive = match interaction_type.sentiment() {
            Sentiment::Positive => true,
            Sentiment::Negative => false,
            Sentiment::Neutral => return Ok(()),
        };

        let variant = match self.experiment_id {
            Some(experiment_id) => self
                .allocator
                .lookup(user_id, experiment_id)
                .await?
                .map(|a| a.variant)
                .unwrap_or_else(|| BASELINE_VARIANT.to_string()),
            None => BASELINE_VARIANT.to_string(),
        };

        let insight = Insight::outcome(Utc::now().date_naive(), variant, positive);
        with_timeout("insight write", self.timeout, self.insights.append(&insight)).await
    }
}
