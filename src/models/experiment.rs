use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Experiment lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentStatus {
    Draft,
    Running,
    Paused,
    Completed,
}

/// Observed performance for one variant
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct VariantMetrics {
    pub click_through_rate: f64,
    pub conversion_rate: f64,
    pub average_engagement: f64,
}

/// One named scoring strategy within an experiment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Variant {
    pub name: String,
    /// Relative traffic weight, must be > 0
    pub weight: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub metrics: VariantMetrics,
}

impl Variant {
    pub fn new(name: impl Into<String>, weight: f64, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            weight,
            description: description.into(),
            metrics: VariantMetrics::default(),
        }
    }
}

/// A/B test over recommendation strategies.
///
/// Variants are kept in insertion order; allocation walks them in that order
/// and ties when concluding go to the earliest variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Experiment {
    pub id: Uuid,
    pub name: String,
    pub status: ExperimentStatus,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    pub variants: Vec<Variant>,
    #[serde(default)]
    pub winner: Option<String>,
}

impl Experiment {
    /// Creates a running experiment
    pub fn new(name: impl Into<String>, variants: Vec<Variant>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            status: ExperimentStatus::Running,
            started_at: Some(Utc::now()),
            ended_at: None,
            variants,
            winner: None,
        }
    }

    /// Checks that variants are non-empty, uniquely named and positively weighted
    pub fn validate(&self) -> AppResult<()> {
        if self.variants.is_empty() {
            return Err(AppError::InvalidInput(format!(
                "experiment {} has no variants",
                self.id
            )));
        }

        let mut seen = HashSet::new();
        for variant in &self.variants {
            if !seen.insert(variant.name.as_str()) {
                return Err(AppError::InvalidInput(format!(
                    "duplicate variant name '{}'",
                    variant.name
                )));
            }
            if !variant.weight.is_finite() || variant.weight <= 0.0 {
                return Err(AppError::InvalidInput(format!(
                    "variant '{}' has non-positive weight {}",
                    variant.name, variant.weight
                )));
            }
        }

        Ok(())
    }

    pub fn variant(&self, name: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.name == name)
    }
}

/// Durable binding of a user to a variant for one experiment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    pub user_id: Uuid,
    pub experiment_id: Uuid,
    pub variant: String,
    pub assigned_at: DateTime<Utc>,
}

impl Assignment {
    pub fn new(user_id: Uuid, experiment_id: Uuid, variant: impl Into<String>) -> Self {
        Self {
            user_id,
            experiment_id,
            variant: variant.into(),
            assigned_at: Utc::now(),
        }
    }
}
