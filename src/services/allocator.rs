//! A/B variant allocation.
//!
//! Users are placed into a variant by a weighted random draw the first time
//! they are seen; the resulting assignment is written with a create-if-absent
//! store call so concurrent first requests converge on one variant.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use uuid::Uuid;

use crate::{
    db::{with_timeout, Cache, CacheKey, ExperimentStore, InsightStore},
    error::{AppError, AppResult},
    models::{Assignment, DateRange, Experiment, ExperimentStatus, Variant, VariantMetrics},
};

/// Variant used whenever no experiment assignment applies
pub const BASELINE_VARIANT: &str = "baseline";

const ASSIGNMENT_CACHE_TTL: u64 = 86400; // 24 hours

/// Weighted random choice over `variants` in their stored order.
///
/// Draws `r` in `[0, total)` and subtracts each weight in turn; the first
/// variant that brings the remainder to `<= 0` wins. The last variant absorbs
/// any floating point drift.
pub fn pick_variant<'a, R: Rng + ?Sized>(variants: &'a [Variant], rng: &mut R) -> Option<&'a Variant> {
    let total: f64 = variants.iter().map(|v| v.weight).sum();
    if variants.is_empty() || total.is_nan() || total <= 0.0 {
        return None;
    }

    let mut remainder = rng.gen_range(0.0..total);
    for variant in variants {
        remainder -= variant.weight;
        if remainder <= 0.0 {
            return Some(variant);
        }
    }

    variants.last()
}

/// Variant with the highest `click_through_rate × weight`; ties keep the
/// earliest variant.
pub fn select_winner(variants: &[Variant]) -> Option<&Variant> {
    let mut best: Option<(&Variant, f64)> = None;
    for variant in variants {
        let performance = variant.metrics.click_through_rate * variant.weight;
        match best {
            Some((_, best_performance)) if performance <= best_performance => {}
            _ => best = Some((variant, performance)),
        }
    }
    best.map(|(variant, _)| variant)
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[derive(Clone)]
pub struct VariantAllocator {
    experiments: Arc<dyn ExperimentStore>,
    insights: Arc<dyn InsightStore>,
    cache: Option<Cache>,
    timeout: Duration,
}

impl VariantAllocator {
    pub fn new(
        experiments: Arc<dyn ExperimentStore>,
        insights: Arc<dyn InsightStore>,
        cache: Option<Cache>,
        timeout: Duration,
    ) -> Self {
        Self {
            experiments,
            insights,
            cache,
            timeout,
        }
    }

    async fn load_experiment(&self, experiment_id: Uuid) -> AppResult<Experiment> {
        let experiment = with_timeout(
            "experiment lookup",
            self.timeout,
            self.experiments.get(experiment_id),
        )
        .await?
        .ok_or(AppError::ExperimentNotFound(experiment_id))?;

        if experiment.variants.is_empty() {
            return Err(AppError::ExperimentNotFound(experiment_id));
        }

        Ok(experiment)
    }

    /// Returns the user's variant, creating the assignment on first use.
    ///
    /// Store outages yield the baseline variant without recording an
    /// assignment. Unknown experiments and invalid input are returned as
    /// errors.
    pub async fn assign(&self, user_id: Uuid, experiment_id: Uuid) -> AppResult<String> {
        if user_id.is_nil() {
            return Err(AppError::InvalidInput("user id must not be nil".to_string()));
        }

        match self.assign_or_create(user_id, experiment_id).await {
            Err(e) if e.is_degradable() => {
                tracing::warn!(
                    user_id = %user_id,
                    experiment_id = %experiment_id,
                    operation = "assign_variant",
                    error = %e,
                    "Variant allocation failed, using baseline"
                );
                Ok(BASELINE_VARIANT.to_string())
            }
            result => result,
        }
    }

    async fn assign_or_create(&self, user_id: Uuid, experiment_id: Uuid) -> AppResult<String> {
        let experiment = self.load_experiment(experiment_id).await?;

        // Existing assignments stand even if the experiment was edited since
        if let Some(existing) = self.lookup(user_id, experiment_id).await? {
            return Ok(existing.variant);
        }

        experiment.validate()?;

        let chosen = {
            let mut rng = rand::thread_rng();
            pick_variant(&experiment.variants, &mut rng)
                .map(|v| v.name.clone())
                .ok_or(AppError::ExperimentNotFound(experiment_id))?
        };

        let candidate = Assignment::new(user_id, experiment_id, chosen);
        let stored = with_timeout(
            "assignment write",
            self.timeout,
            self.experiments.put_assignment_if_absent(&candidate),
        )
        .await?;

        if stored.variant != candidate.variant {
            tracing::info!(
                user_id = %user_id,
                experiment_id = %experiment_id,
                variant = %stored.variant,
                "Concurrent assignment already stored, keeping it"
            );
        } else {
            tracing::info!(
                user_id = %user_id,
                experiment = %experiment.name,
                variant = %stored.variant,
                "Assigned user to variant"
            );
        }

        self.cache_assignment(&stored);
        Ok(stored.variant)
    }

    /// Existing assignment for the pair, if any. Never creates one.
    pub async fn lookup(&self, user_id: Uuid, experiment_id: Uuid) -> AppResult<Option<Assignment>> {
        let key = CacheKey::Assignment {
            experiment_id,
            user_id,
        };

        if let Some(cache) = &self.cache {
            match cache.get_from_cache::<Assignment>(&key).await {
                Ok(Some(cached)) => {
                    tracing::debug!(user_id = %user_id, experiment_id = %experiment_id, "Assignment cache hit");
                    return Ok(Some(cached));
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "Assignment cache read failed"),
            }
        }

        let stored = with_timeout(
            "assignment lookup",
            self.timeout,
            self.experiments.get_assignment(user_id, experiment_id),
        )
        .await?;

        if let Some(assignment) = &stored {
            self.cache_assignment(assignment);
        }
        Ok(stored)
    }

    fn cache_assignment(&self, assignment: &Assignment) {
        if let Some(cache) = &self.cache {
            let key = CacheKey::Assignment {
                experiment_id: assignment.experiment_id,
                user_id: assignment.user_id,
            };
            cache.set_in_background(&key, assignment, ASSIGNMENT_CACHE_TTL);
        }
    }

    /// Picks the best-performing variant and completes the experiment
    pub async fn conclude(&self, experiment_id: Uuid) -> AppResult<Experiment> {
        let mut experiment = self.load_experiment(experiment_id).await?;

        let winner = select_winner(&experiment.variants)
            .map(|v| v.name.clone())
            .ok_or(AppError::ExperimentNotFound(experiment_id))?;

        experiment.status = ExperimentStatus::Completed;
        experiment.ended_at = Some(Utc::now());
        experiment.winner = Some(winner.clone());

        with_timeout(
            "experiment write",
            self.timeout,
            self.experiments.put(&experiment),
        )
        .await?;

        tracing::info!(
            experiment = %experiment.name,
            winner = %winner,
            "Experiment concluded"
        );

        Ok(experiment)
    }

    /// Recomputes each variant's metrics from insight records in `range`
    pub async fn refresh_metrics(
        &self,
        experiment_id: Uuid,
        range: &DateRange,
    ) -> AppResult<Experiment> {
        let mut experiment = self.load_experiment(experiment_id).await?;
        let insights = with_timeout(
            "insight query",
            self.timeout,
            self.insights.query(range, None),
        )
        .await?;

        // (recommendations, positives, negatives, score sum, scored buckets)
        let mut totals: HashMap<&str, (u64, u64, u64, f64, u64)> = HashMap::new();
        for insight in &insights {
            let entry = totals.entry(insight.variant.as_str()).or_default();
            entry.0 += insight.total_recommendations;
            entry.1 += insight.positive_interactions;
            entry.2 += insight.negative_interactions;
            if insight.total_recommendations > 0 {
                entry.3 += insight.average_score;
                entry.4 += 1;
            }
        }

        for variant in &mut experiment.variants {
            let (recommendations, positives, negatives, score_sum, buckets) = totals
                .get(variant.name.as_str())
                .copied()
                .unwrap_or_default();

            variant.metrics = VariantMetrics {
                click_through_rate: ratio(positives, recommendations),
                conversion_rate: ratio(positives, positives + negatives),
                average_engagement: if buckets == 0 {
                    0.0
                } else {
                    score_sum / buckets as f64
                },
            };
        }

        with_timeout(
            "experiment write",
            self.timeout,
            self.experiments.put(&experiment),
        )
        .await?;

        Ok(experiment)
    }
}
