use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    View,
    Subscribe,
    Unsubscribe,
    Read,
    Dismiss,
}

/// Outcome of an interaction from the point of view of the recommender
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl InteractionType {
    /// Change applied to the reader's running interaction score for the item
    pub fn score_delta(self) -> i64 {
        match self {
            InteractionType::View => 1,
            InteractionType::Subscribe => 5,
            InteractionType::Read => 3,
            InteractionType::Dismiss => -2,
            InteractionType::Unsubscribe => 0,
        }
    }

    pub fn sentiment(self) -> Sentiment {
        match self {
            InteractionType::Subscribe | InteractionType::Read => Sentiment::Positive,
            InteractionType::View => Sentiment::Neutral,
            InteractionType::Dismiss | InteractionType::Unsubscribe => Sentiment::Negative,
        }
    }
}

/// A single user action against a newsletter. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub item_id: Uuid,
    pub interaction_type: InteractionType,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub duration_secs: Option<u32>,
}

impl Interaction {
    pub fn new(
        user_id: Uuid,
        item_id: Uuid,
        interaction_type: InteractionType,
        duration_secs: Option<u32>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            item_id,
            interaction_type,
            occurred_at: Utc::now(),
            duration_secs,
        }
    }
}

/// Bounded query against the interaction store.
///
/// `since` and `limit` are always set so that no read pulls a full lifetime
/// log. Results are ordered oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionFilter {
    pub user_ids: Option<Vec<Uuid>>,
    pub item_ids: Option<Vec<Uuid>>,
    pub since: DateTime<Utc>,
    pub limit: usize,
}

impl InteractionFilter {
    pub fn recent(since: DateTime<Utc>, limit: usize) -> Self {
        Self {
            user_ids: None,
            item_ids: None,
            since,
            limit,
        }
    }

    pub fn for_users(mut self, user_ids: Vec<Uuid>) -> Self {
        self.user_ids = Some(user_ids);
        self
    }

    pub fn for_items(mut self, item_ids: Vec<Uuid>) -> Self {
        self.item_ids = Some(item_ids);
        self
    }

    pub fn matches(&self, interaction: &Interaction) -> bool {
        interaction.occurred_at >= self.since
            && self
                .user_ids
                .as_ref()
                .map_or(true, |ids| ids.contains(&interaction.user_id))
            && self
                .item_ids
                .as_ref()
                .map_or(true, |ids| ids.contains(&interaction.item_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_deltas() {
        assert_eq!(InteractionType::View.score_delta(), 1);
        assert_eq!(InteractionType::Subscribe.score_delta(), 5);
        assert_eq!(InteractionType::Read.score_delta(), 3);
        assert_eq!(InteractionType::Dismiss.score_delta(), -2);
        assert_eq!(InteractionType::Unsubscribe.score_delta(), 0);
    }

    #[test]
    fn test_sentiment() {
        assert_eq!(InteractionType::Subscribe.sentiment(), Sentiment::Positive);
        assert_eq!(InteractionType::Read.sentiment(), Sentiment::Positive);
        assert_eq!(InteractionType::View.sentiment(), Sentiment::Neutral);
        assert_eq!(InteractionType::Dismiss.sentiment(), Sentiment::Negative);
        assert_eq!(InteractionType::Unsubscribe.sentiment(), Sentiment::Negative);
    }

    #[test]
    fn test_filter_matches() {
        let user = Uuid::new_v4();
        let item = Uuid::new_v4();
        let interaction = Interaction::new(user, item, InteractionType::View, None);

        let since = Utc::now() - chrono::Duration::days(1);
        assert!(InteractionFilter::recent(since, 10).matches(&interaction));
        assert!(InteractionFilter::recent(since, 10)
            .for_users(vec![user])
            .for_items(vec![item])
            .matches(&interaction));
        assert!(!InteractionFilter::recent(since, 10)
            .for_users(vec![Uuid::new_v4()])
            .matches(&interaction));

        let future = Utc::now() + chrono::Duration::days(1);
        assert!(!InteractionFilter::recent(future, 10).matches(&interaction));
    }
}
