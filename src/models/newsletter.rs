use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Length of content a newsletter delivers, and a reader's preference for it
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContentDepth {
    /// Short summaries
    Quick,
    /// Long-form content
    Deep,
}

/// How often a newsletter publishes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    Active,
    Inactive,
}

/// A recommendable newsletter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Newsletter {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Category labels, matched against a reader's selected categories
    #[serde(default)]
    pub categories: BTreeSet<String>,
    /// Free-form tags (display only)
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub subscriber_count: u64,
    pub content_type: ContentDepth,
    pub cadence: Cadence,
    #[serde(default)]
    pub last_published_at: Option<DateTime<Utc>>,
    /// Generic quality score, refreshed by retraining
    #[serde(default)]
    pub recommendation_score: f64,
    #[serde(default)]
    pub status: ItemStatus,
}

impl Newsletter {
    /// Creates an active newsletter with no categories or subscribers
    pub fn new(title: impl Into<String>, content_type: ContentDepth, cadence: Cadence) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: None,
            categories: BTreeSet::new(),
            tags: BTreeSet::new(),
            subscriber_count: 0,
            content_type,
            cadence,
            last_published_at: None,
            recommendation_score: 0.0,
            status: ItemStatus::Active,
        }
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_subscribers(mut self, subscriber_count: u64) -> Self {
        self.subscriber_count = subscriber_count;
        self
    }

    pub fn published_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_published_at = Some(at);
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == ItemStatus::Active
    }
}

/// Filter passed to the item store
#[derive(Debug, Clone, PartialEq)]
pub struct ItemFilter {
    pub status: Option<ItemStatus>,
    pub limit: usize,
}

impl ItemFilter {
    pub fn active(limit: usize) -> Self {
        Self {
            status: Some(ItemStatus::Active),
            limit,
        }
    }
}

/// Partial update applied to a stored newsletter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemUpdate {
    pub recommendation_score: Option<f64>,
    pub status: Option<ItemStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_newsletter_is_active() {
        let item = Newsletter::new("Morning Brew", ContentDepth::Quick, Cadence::Daily);
        assert!(item.is_active());
        assert_eq!(item.subscriber_count, 0);
        assert!(item.last_published_at.is_none());
    }

    #[test]
    fn test_deserialize_with_missing_optional_fields() {
        let json = r#"{
            "id": "6f9b8c3e-2a8e-4a55-9a8e-1c7a2f1a0b11",
            "title": "Stratechery",
            "content_type": "deep",
            "cadence": "weekly"
        }"#;
        let item: Newsletter = serde_json::from_str(json).unwrap();
        assert!(item.categories.is_empty());
        assert_eq!(item.status, ItemStatus::Active);
        assert_eq!(item.content_type, ContentDepth::Deep);
    }

    #[test]
    fn test_enum_serialization() {
        assert_eq!(serde_json::to_string(&ContentDepth::Quick).unwrap(), "\"quick\"");
        assert_eq!(serde_json::to_string(&Cadence::Monthly).unwrap(), "\"monthly\"");
        assert_eq!(serde_json::to_string(&ItemStatus::Inactive).unwrap(), "\"inactive\"");
    }
}
