use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, Utc};

use crate::{
    db::{with_timeout, InsightStore},
    error::AppResult,
    models::{DateRange, Insight, PerformanceSummary, VariantPerformance},
};

const TOP_VARIANTS: usize = 3;

/// Per-variant rollup of insight records, in variant name order.
///
/// `average_score` is the mean over the records that carry recommendations;
/// outcome-only records have no score of their own.
pub fn breakdown(insights: &[Insight]) -> Vec<VariantPerformance> {
    let mut grouped: BTreeMap<&str, (VariantPerformance, usize)> = BTreeMap::new();

    for insight in insights {
        let (entry, scored) = grouped.entry(insight.variant.as_str()).or_insert_with(|| {
            (
                VariantPerformance {
                    variant: insight.variant.clone(),
                    average_score: 0.0,
                    total_recommendations: 0,
                    positive_interactions: 0,
                    negative_interactions: 0,
                },
                0,
            )
        });
        if insight.total_recommendations > 0 {
            entry.average_score += insight.average_score;
            *scored += 1;
        }
        entry.total_recommendations += insight.total_recommendations;
        entry.positive_interactions += insight.positive_interactions;
        entry.negative_interactions += insight.negative_interactions;
    }

    grouped
        .into_values()
        .map(|(mut performance, scored)| {
            if scored > 0 {
                performance.average_score /= scored as f64;
            }
            performance
        })
        .collect()
}

/// Totals and the best variants for a set of insight records
pub fn summarize(insights: &[Insight]) -> PerformanceSummary {
    let total_recommendations: u64 = insights.iter().map(|i| i.total_recommendations).sum();
    let positive: u64 = insights.iter().map(|i| i.positive_interactions).sum();

    let positive_interaction_rate = if total_recommendations == 0 {
        0.0
    } else {
        positive as f64 / total_recommendations as f64
    };

    let mut top_variants = breakdown(insights);
    top_variants.sort_by(|a, b| {
        b.average_score
            .partial_cmp(&a.average_score)
            .unwrap_or(Ordering::Equal)
    });
    top_variants.truncate(TOP_VARIANTS);

    PerformanceSummary {
        total_recommendations,
        positive_interaction_rate,
        top_variants,
    }
}

#[derive(Clone)]
pub struct InsightsAggregator {
    insights: Arc<dyn InsightStore>,
    timeout: Duration,
}

impl InsightsAggregator {
    pub fn new(insights: Arc<dyn InsightStore>, timeout: Duration) -> Self {
        Self { insights, timeout }
    }

    async fn load(&self, range: &DateRange) -> AppResult<Vec<Insight>> {
        with_timeout(
            "insight query",
            self.timeout,
            self.insights.query(range, None),
        )
        .await
    }

    pub async fn performance(&self, range: &DateRange) -> AppResult<PerformanceSummary> {
        Ok(summarize(&self.load(range).await?))
    }

    pub async fn variant_breakdown(&self, range: &DateRange) -> AppResult<Vec<VariantPerformance>> {
        Ok(breakdown(&self.load(range).await?))
    }

    /// Logs yesterday's summary
    pub async fn report_previous_day(&self) -> AppResult<PerformanceSummary> {
        let today = Utc::now().date_naive();
        let yesterday = today.checked_sub_days(Days::new(1)).unwrap_or(today);
        let summary = self.performance(&DateRange::single(yesterday)).await?;

        let top = summary
            .top_variants
            .iter()
            .map(|v| v.variant.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        tracing::info!(
            date = %yesterday,
            total_recommendations = summary.total_recommendations,
            positive_interaction_rate = summary.positive_interaction_rate,
            top_variants = %top,
            "Daily recommendation performance"
        );

        Ok(summary)
    }
}
