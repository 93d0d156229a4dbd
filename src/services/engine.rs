//! Single entry point over the recommendation, experiment and insight
//! services. The HTTP layer and the background jobs both go through it.
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{
    config::Config,
    db::{Cache, ExperimentStore, InsightStore, InteractionStore, ItemStore, ProfileStore},
    error::AppResult,
    models::{
        DateRange, Experiment, InteractionType, PerformanceSummary, RecommendOptions,
        RecommendationScore, VariantPerformance,
    },
    services::{
        insights::InsightsAggregator,
        interactions::InteractionRecorder,
        learning::{HeuristicDecay, LearningService, WeightAdapter, WeightProposal},
        recommendations::{RecommendationService, RecommendationSettings},
        scorer::ScoringWeights,
        VariantAllocator,
    },
};

const MIN_JOB_PERIOD: Duration = Duration::from_secs(1);

/// Store handles the engine is built from
#[derive(Clone)]
pub struct Stores {
    pub items: Arc<dyn ItemStore>,
    pub interactions: Arc<dyn InteractionStore>,
    pub experiments: Arc<dyn ExperimentStore>,
    pub insights: Arc<dyn InsightStore>,
    pub profiles: Arc<dyn ProfileStore>,
}

impl Stores {
    /// Uses one backend for every store
    pub fn shared<S>(store: S) -> Self
    where
        S: ItemStore + InteractionStore + ExperimentStore + InsightStore + ProfileStore + Clone + 'static,
    {
        Self {
            items: Arc::new(store.clone()),
            interactions: Arc::new(store.clone()),
            experiments: Arc::new(store.clone()),
            insights: Arc::new(store.clone()),
            profiles: Arc::new(store),
        }
    }
}

#[derive(Clone)]
pub struct Engine {
    recommendations: RecommendationService,
    recorder: InteractionRecorder,
    allocator: VariantAllocator,
    insights: InsightsAggregator,
    learning: LearningService,
    default_limit: usize,
    auto_apply_weights: bool,
}

impl Engine {
    pub fn new(stores: Stores, cache: Option<Cache>, config: &Config) -> Self {
        Self::with_adapter(stores, cache, config, Arc::new(HeuristicDecay::default()))
    }

    pub fn with_adapter(
        stores: Stores,
        cache: Option<Cache>,
        config: &Config,
        adapter: Arc<dyn WeightAdapter>,
    ) -> Self {
        let timeout = config.store_timeout();
        let allocator = VariantAllocator::new(
            stores.experiments.clone(),
            stores.insights.clone(),
            cache.clone(),
            timeout,
        );

        let recommendations = RecommendationService::new(
            stores.items.clone(),
            stores.interactions.clone(),
            stores.profiles.clone(),
            stores.insights.clone(),
            allocator.clone(),
            cache,
            RecommendationSettings::from_config(config),
        );

        let recorder = InteractionRecorder::new(
            stores.interactions.clone(),
            stores.profiles.clone(),
            stores.insights.clone(),
            allocator.clone(),
            config.experiment_id,
            timeout,
        );

        let learning = LearningService::new(
            stores.items,
            stores.interactions,
            stores.profiles,
            adapter,
            config.interaction_window(),
            config.interaction_page_size,
            timeout,
        );

        Self {
            recommendations,
            recorder,
            allocator,
            insights: InsightsAggregator::new(stores.insights, timeout),
            learning,
            default_limit: config.default_limit,
            auto_apply_weights: config.auto_apply_weights,
        }
    }

    /// Limit used when a request does not carry one
    pub fn default_limit(&self) -> usize {
        self.default_limit
    }

    pub async fn recommend(
        &self,
        user_id: Option<Uuid>,
        options: RecommendOptions,
    ) -> AppResult<Vec<RecommendationScore>> {
        self.recommendations.recommend(user_id, options).await
    }

    pub async fn record_interaction(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        interaction_type: InteractionType,
        duration_secs: Option<u32>,
    ) -> AppResult<Uuid> {
        self.recorder
            .record(user_id, item_id, interaction_type, duration_secs)
            .await
    }

    pub async fn assign_variant(&self, user_id: Uuid, experiment_id: Uuid) -> AppResult<String> {
        self.allocator.assign(user_id, experiment_id).await
    }

    pub async fn get_performance(&self, range: &DateRange) -> AppResult<PerformanceSummary> {
        self.insights.performance(range).await
    }

    pub async fn variant_breakdown(&self, range: &DateRange) -> AppResult<Vec<VariantPerformance>> {
        self.insights.variant_breakdown(range).await
    }

    /// Completes the experiment. With a `metrics_range`, variant metrics are
    /// recomputed from that range's insights before the winner is chosen.
    pub async fn conclude_experiment(
        &self,
        experiment_id: Uuid,
        metrics_range: Option<DateRange>,
    ) -> AppResult<Experiment> {
        if let Some(range) = metrics_range {
            self.allocator.refresh_metrics(experiment_id, &range).await?;
        }
        self.allocator.conclude(experiment_id).await
    }

    pub async fn current_weights(&self) -> ScoringWeights {
        self.recommendations.current_weights().await
    }

    pub async fn adopt_weights(&self, weights: ScoringWeights) {
        self.recommendations.adopt_weights(weights).await
    }

    /// Runs the learning pass. The proposal is adopted only when
    /// `auto_apply_weights` is set.
    pub async fn retrain(&self) -> AppResult<WeightProposal> {
        let proposal = self.learning.retrain().await?;
        if self.auto_apply_weights {
            self.adopt_weights(proposal.weights).await;
        }
        Ok(proposal)
    }

    /// Starts the periodic retraining and reporting tasks. Periods shorter
    /// than one second are raised to one second.
    pub fn spawn_background_jobs(
        &self,
        retrain_every: Duration,
        report_every: Duration,
    ) -> Vec<JoinHandle<()>> {
        let retrain_every = retrain_every.max(MIN_JOB_PERIOD);
        let report_every = report_every.max(MIN_JOB_PERIOD);

        let retrain = {
            let engine = self.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(retrain_every);
                // The first tick completes immediately
                interval.tick().await;
                loop {
                    interval.tick().await;
                    if let Err(e) = engine.retrain().await {
                        tracing::warn!(error = %e, "Scheduled retraining failed");
                    }
                }
            })
        };

        let report = {
            let insights = self.insights.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(report_every);
                interval.tick().await;
                loop {
                    interval.tick().await;
                    if let Err(e) = insights.report_previous_day().await {
                        tracing::warn!(error = %e, "Scheduled insights report failed");
                    }
                }
            })
        };

        vec![retrain, report]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{Cadence, ContentDepth, Newsletter, UserProfile, Variant};
    use chrono::Utc;

    fn engine(store: &MemoryStore, config: &Config) -> Engine {
        Engine::new(Stores::shared(store.clone()), None, config)
    }

    async fn seed_negative_feedback(store: &MemoryStore, engine: &Engine) {
        let item = Newsletter::new("AI Weekly", ContentDepth::Deep, Cadence::Weekly)
            .with_categories(["Technology"])
            .with_subscribers(400_000);
        store.insert_item(item.clone()).await;

        let mut reader = UserProfile::empty(Uuid::new_v4());
        reader.categories = vec!["technology".to_string()];
        store.insert_profile(reader.clone()).await;

        engine
            .record_interaction(reader.user_id, item.id, InteractionType::Dismiss, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_retrain_is_manual_by_default() {
        let store = MemoryStore::new();
        let engine = engine(&store, &Config::default());
        seed_negative_feedback(&store, &engine).await;

        let proposal = engine.retrain().await.unwrap();
        assert_ne!(proposal.weights, ScoringWeights::default());
        assert_eq!(engine.current_weights().await, ScoringWeights::default());
    }

    #[tokio::test]
    async fn test_retrain_auto_applies_when_configured() {
        let store = MemoryStore::new();
        let config = Config {
            auto_apply_weights: true,
            ..Config::default()
        };
        let engine = engine(&store, &config);
        seed_negative_feedback(&store, &engine).await;

        let proposal = engine.retrain().await.unwrap();
        assert_eq!(engine.current_weights().await, proposal.weights);
    }

    #[tokio::test]
    async fn test_background_jobs_survive_zero_period() {
        let store = MemoryStore::new();
        let jobs = engine(&store, &Config::default())
            .spawn_background_jobs(Duration::ZERO, Duration::ZERO);

        tokio::task::yield_now().await;
        for job in jobs {
            assert!(!job.is_finished());
            job.abort();
        }
    }

    #[tokio::test]
    async fn test_conclude_with_metrics_refresh() {
        let store = MemoryStore::new();
        let engine = engine(&store, &Config::default());
        let experiment = Experiment::new(
            "ranking",
            vec![
                Variant::new("baseline", 1.0, "hybrid"),
                Variant::new("popularity", 1.0, "subscriber count"),
            ],
        );
        ExperimentStore::put(&store, &experiment).await.unwrap();

        let today = Utc::now().date_naive();
        for insight in [
            crate::models::Insight::recommendations(today, "baseline", 10, 0.5),
            crate::models::Insight::recommendations(today, "popularity", 10, 0.5),
            crate::models::Insight::outcome(today, "popularity", true),
        ] {
            InsightStore::append(&store, &insight).await.unwrap();
        }

        let concluded = engine
            .conclude_experiment(experiment.id, Some(DateRange::single(today)))
            .await
            .unwrap();

        assert_eq!(concluded.winner.as_deref(), Some("popularity"));
        assert_eq!(concluded.status, crate::models::ExperimentStatus::Completed);
    }
}
