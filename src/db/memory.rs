use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        Assignment, DateRange, Experiment, Insight, Interaction, InteractionFilter, ItemFilter,
        ItemUpdate, Newsletter, ProfileUpdate, UserProfile,
    },
};

use super::store::{ExperimentStore, InsightStore, InteractionStore, ItemStore, ProfileStore};

/// In-process store backing every storage trait.
///
/// Used when no database is configured and throughout the tests.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryStoreInner>>,
}

#[derive(Default)]
struct MemoryStoreInner {
    items: HashMap<Uuid, Newsletter>,
    interactions: Vec<Interaction>,
    experiments: HashMap<Uuid, Experiment>,
    assignments: HashMap<(Uuid, Uuid), Assignment>,
    insights: HashMap<(NaiveDate, String), Insight>,
    profiles: HashMap<Uuid, UserProfile>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_item(&self, item: Newsletter) {
        self.inner.write().await.items.insert(item.id, item);
    }

    pub async fn insert_profile(&self, profile: UserProfile) {
        self.inner
            .write()
            .await
            .profiles
            .insert(profile.user_id, profile);
    }

    /// Number of assignments stored for an experiment
    pub async fn assignment_count(&self, experiment_id: Uuid) -> usize {
        self.inner
            .read()
            .await
            .assignments
            .keys()
            .filter(|(_, exp)| *exp == experiment_id)
            .count()
    }
}

#[async_trait::async_trait]
impl ItemStore for MemoryStore {
    async fn find(&self, filter: &ItemFilter) -> AppResult<Vec<Newsletter>> {
        let inner = self.inner.read().await;
        let mut items: Vec<Newsletter> = inner
            .items
            .values()
            .filter(|item| filter.status.map_or(true, |status| item.status == status))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.title.cmp(&b.title));
        items.truncate(filter.limit);
        Ok(items)
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Newsletter>> {
        Ok(self.inner.read().await.items.get(&id).cloned())
    }

    async fn update(&self, id: Uuid, update: &ItemUpdate) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(item) = inner.items.get_mut(&id) {
            if let Some(score) = update.recommendation_score {
                item.recommendation_score = score;
            }
            if let Some(status) = update.status {
                item.status = status;
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl InteractionStore for MemoryStore {
    async fn append(&self, interaction: &Interaction) -> AppResult<Uuid> {
        self.inner
            .write()
            .await
            .interactions
            .push(interaction.clone());
        Ok(interaction.id)
    }

    async fn query(&self, filter: &InteractionFilter) -> AppResult<Vec<Interaction>> {
        let inner = self.inner.read().await;
        let mut matched: Vec<Interaction> = inner
            .interactions
            .iter()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect();
        matched.sort_by_key(|i| i.occurred_at);

        // Keep the newest `limit` entries
        if matched.len() > filter.limit {
            matched.drain(..matched.len() - filter.limit);
        }
        Ok(matched)
    }
}

#[async_trait::async_trait]
impl ExperimentStore for MemoryStore {
    async fn get(&self, experiment_id: Uuid) -> AppResult<Option<Experiment>> {
        Ok(self
            .inner
            .read()
            .await
            .experiments
            .get(&experiment_id)
            .cloned())
    }

    async fn put(&self, experiment: &Experiment) -> AppResult<()> {
        self.inner
            .write()
            .await
            .experiments
            .insert(experiment.id, experiment.clone());
        Ok(())
    }

    async fn get_assignment(
        &self,
        user_id: Uuid,
        experiment_id: Uuid,
    ) -> AppResult<Option<Assignment>> {
        Ok(self
            .inner
            .read()
            .await
            .assignments
            .get(&(user_id, experiment_id))
            .cloned())
    }

    async fn put_assignment_if_absent(&self, assignment: &Assignment) -> AppResult<Assignment> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .assignments
            .entry((assignment.user_id, assignment.experiment_id))
            .or_insert_with(|| assignment.clone());
        Ok(stored.clone())
    }
}

#[async_trait::async_trait]
impl InsightStore for MemoryStore {
    async fn append(&self, insight: &Insight) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .insights
            .entry((insight.date, insight.variant.clone()))
            .and_modify(|existing| existing.merge(insight))
            .or_insert_with(|| insight.clone());
        Ok(())
    }

    async fn query(&self, range: &DateRange, variant: Option<String>) -> AppResult<Vec<Insight>> {
        let inner = self.inner.read().await;
        let mut insights: Vec<Insight> = inner
            .insights
            .values()
            .filter(|i| range.contains(i.date))
            .filter(|i| variant.as_ref().map_or(true, |v| &i.variant == v))
            .cloned()
            .collect();
        insights.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.variant.cmp(&b.variant)));
        Ok(insights)
    }
}

#[async_trait::async_trait]
impl ProfileStore for MemoryStore {
    async fn get_profile(&self, user_id: Uuid) -> AppResult<Option<UserProfile>> {
        Ok(self.inner.read().await.profiles.get(&user_id).cloned())
    }

    async fn update_profile(&self, user_id: Uuid, update: &ProfileUpdate) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .profiles
            .entry(user_id)
            .or_insert_with(|| UserProfile::empty(user_id))
            .apply(update);
        Ok(())
    }
}
