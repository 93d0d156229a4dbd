//! Storage collaborators consumed by the recommendation core.
//!
//! Each trait is a narrow, async view over an external store. Implementations
//! live in [`super::memory`] and [`super::postgres`].
use std::future::Future;
use std::time::Duration;

use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        Assignment, DateRange, Experiment, Insight, Interaction, InteractionFilter, ItemFilter,
        ItemUpdate, Newsletter, ProfileUpdate, UserProfile,
    },
};

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ItemStore: Send + Sync {
    async fn find(&self, filter: &ItemFilter) -> AppResult<Vec<Newsletter>>;

    async fn get(&self, id: Uuid) -> AppResult<Option<Newsletter>>;

    async fn update(&self, id: Uuid, update: &ItemUpdate) -> AppResult<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait InteractionStore: Send + Sync {
    /// Appends an interaction and returns its id
    async fn append(&self, interaction: &Interaction) -> AppResult<Uuid>;

    /// Returns matching interactions, oldest first, at most `filter.limit`
    async fn query(&self, filter: &InteractionFilter) -> AppResult<Vec<Interaction>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ExperimentStore: Send + Sync {
    async fn get(&self, experiment_id: Uuid) -> AppResult<Option<Experiment>>;

    async fn put(&self, experiment: &Experiment) -> AppResult<()>;

    async fn get_assignment(
        &self,
        user_id: Uuid,
        experiment_id: Uuid,
    ) -> AppResult<Option<Assignment>>;

    /// Stores `assignment` unless one already exists for the same
    /// (user, experiment) pair. Returns whichever assignment is stored
    /// afterwards.
    async fn put_assignment_if_absent(&self, assignment: &Assignment) -> AppResult<Assignment>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait InsightStore: Send + Sync {
    /// Merges the record into its (date, variant) bucket
    async fn append(&self, insight: &Insight) -> AppResult<()>;

    async fn query(&self, range: &DateRange, variant: Option<String>) -> AppResult<Vec<Insight>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ProfileStore: Send + Sync {
    /// Returns the stored profile without interaction history
    async fn get_profile(&self, user_id: Uuid) -> AppResult<Option<UserProfile>>;

    /// Applies a partial update, creating an empty profile first if needed
    async fn update_profile(&self, user_id: Uuid, update: &ProfileUpdate) -> AppResult<()>;
}

/// Runs a store call under `limit`, mapping expiry to `StoreUnavailable`
pub async fn with_timeout<T, F>(operation: &'static str, limit: Duration, fut: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(AppError::StoreUnavailable(format!(
            "{} timed out after {}ms",
            operation,
            limit.as_millis()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_passes_result_through() {
        let result = with_timeout("fast", Duration::from_millis(100), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_with_timeout_maps_expiry() {
        let result: AppResult<()> = with_timeout("slow", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;

        match result {
            Err(AppError::StoreUnavailable(msg)) => assert!(msg.contains("slow timed out")),
            other => panic!("expected StoreUnavailable, got {:?}", other),
        }
    }
}
