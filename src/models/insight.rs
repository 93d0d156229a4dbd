use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Pre-aggregated performance for one (date, variant) bucket
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Insight {
    pub date: NaiveDate,
    pub variant: String,
    pub total_recommendations: u64,
    pub positive_interactions: u64,
    pub negative_interactions: u64,
    pub average_score: f64,
}

impl Insight {
    /// Insight for a batch of issued recommendations
    pub fn recommendations(
        date: NaiveDate,
        variant: impl Into<String>,
        count: u64,
        average_score: f64,
    ) -> Self {
        Self {
            date,
            variant: variant.into(),
            total_recommendations: count,
            positive_interactions: 0,
            negative_interactions: 0,
            average_score,
        }
    }

    /// Insight carrying a single interaction outcome
    pub fn outcome(date: NaiveDate, variant: impl Into<String>, positive: bool) -> Self {
        Self {
            date,
            variant: variant.into(),
            total_recommendations: 0,
            positive_interactions: u64::from(positive),
            negative_interactions: u64::from(!positive),
            average_score: 0.0,
        }
    }

    /// Folds another record for the same bucket into this one.
    ///
    /// Counts add; the average score is weighted by recommendation count.
    pub fn merge(&mut self, other: &Insight) {
        let total = self.total_recommendations + other.total_recommendations;
        if total > 0 {
            self.average_score = (self.average_score * self.total_recommendations as f64
                + other.average_score * other.total_recommendations as f64)
                / total as f64;
        }
        self.total_recommendations = total;
        self.positive_interactions += other.positive_interactions;
        self.negative_interactions += other.negative_interactions;
    }
}

/// Inclusive range of insight dates
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> AppResult<Self> {
        if start > end {
            return Err(AppError::InvalidInput(format!(
                "date range start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn single(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Mean score achieved by a variant over a range
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VariantPerformance {
    pub variant: String,
    pub average_score: f64,
    pub total_recommendations: u64,
    pub positive_interactions: u64,
    pub negative_interactions: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceSummary {
    pub total_recommendations: u64,
    pub positive_interaction_rate: f64,
    /// At most three variants, best mean score first
    pub top_variants: Vec<VariantPerformance>,
}
