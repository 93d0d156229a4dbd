//! Recommendation orchestration.
//!
//! Resolves the reader's variant, scores active candidates with the variant's
//! strategy and records the batch as an insight. Every transient failure
//! degrades to a fixed fallback list instead of reaching the caller.
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    cached,
    config::Config,
    db::{with_timeout, Cache, CacheKey, InsightStore, InteractionStore, ItemStore, ProfileStore},
    error::{AppError, AppResult},
    models::{
        Cadence, ContentDepth, Insight, Interaction, InteractionFilter, ItemFilter, Newsletter,
        RecommendOptions, RecommendationScore, UserProfile,
    },
    services::{
        allocator::{VariantAllocator, BASELINE_VARIANT},
        scorer::{ScoreBreakdown, Scorer, ScoringWeights},
    },
};

const CANDIDATE_CACHE_TTL: u64 = 300; // 5 minutes

/// Largest share of the total score the content signal may contribute
const CONTENT_SHARE: f64 = 0.6;
/// Cap on the collaborative signal
const COLLABORATIVE_CAP: f64 = 0.4;
/// Collaborative score for items no other reader has touched yet
const COLLABORATIVE_FLOOR: f64 = 0.1;

const FALLBACK_SCORE: f64 = 0.7;
const FALLBACK_REASON: &str =
    "Showing popular picks because personalized recommendations are unavailable right now";

/// Ranking strategy behind an experiment variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringStrategy {
    /// Collaborative plus content, capped at 1
    Hybrid,
    /// Content score only
    ContentBased,
    /// Collaborative score only, rescaled to [0, 1]
    Collaborative,
    /// Subscriber count only
    Popularity,
}

impl ScoringStrategy {
    /// Strategy for a variant name; unknown names rank like the baseline
    pub fn for_variant(name: &str) -> Self {
        match name {
            "content_based" => ScoringStrategy::ContentBased,
            "collaborative" => ScoringStrategy::Collaborative,
            "popularity" => ScoringStrategy::Popularity,
            _ => ScoringStrategy::Hybrid,
        }
    }

    /// Total on the [0, 1] scale
    pub fn combine(self, collaborative: f64, breakdown: &ScoreBreakdown, weights: &ScoringWeights) -> f64 {
        let content_fraction = breakdown.total(weights) / 100.0;
        let total = match self {
            ScoringStrategy::Hybrid => collaborative + content_fraction * CONTENT_SHARE,
            ScoringStrategy::ContentBased => content_fraction,
            ScoringStrategy::Collaborative => collaborative / COLLABORATIVE_CAP,
            ScoringStrategy::Popularity => breakdown.subscribers / 100.0,
        };
        total.clamp(0.0, 1.0)
    }
}

/// Per-candidate collaborative signal.
///
/// For each candidate, the peers are the other readers who touched it. Among
/// the peers' interactions, the fraction that targeted the candidate is the
/// score, capped at 0.4. Candidates with no peers get the 0.1 floor.
pub fn collaborative_scores(
    user_id: Uuid,
    candidate_ids: &[Uuid],
    candidate_interactions: &[Interaction],
    peer_interactions: &[Interaction],
) -> HashMap<Uuid, f64> {
    let mut peers_by_item: HashMap<Uuid, HashSet<Uuid>> = HashMap::new();
    for interaction in candidate_interactions {
        if interaction.user_id != user_id {
            peers_by_item
                .entry(interaction.item_id)
                .or_default()
                .insert(interaction.user_id);
        }
    }

    candidate_ids
        .iter()
        .map(|item_id| {
            let score = match peers_by_item.get(item_id) {
                Some(peers) if !peers.is_empty() => {
                    let (total, hits) = peer_interactions
                        .iter()
                        .filter(|i| peers.contains(&i.user_id))
                        .fold((0usize, 0usize), |(total, hits), i| {
                            (total + 1, hits + usize::from(i.item_id == *item_id))
                        });
                    if total == 0 {
                        COLLABORATIVE_FLOOR
                    } else {
                        (hits as f64 / total as f64).min(COLLABORATIVE_CAP)
                    }
                }
                _ => COLLABORATIVE_FLOOR,
            };
            (*item_id, score)
        })
        .collect()
}

fn fallback_item(id: u128, title: &str, description: &str, depth: ContentDepth, cadence: Cadence) -> Newsletter {
    let mut item = Newsletter::new(title, depth, cadence);
    item.id = Uuid::from_u128(id);
    item.description = Some(description.to_string());
    item
}

/// Fixed list served whenever personalization is impossible.
///
/// Returns `min(limit, 3)` items and cannot fail.
pub fn fallback_recommendations(limit: usize) -> Vec<RecommendationScore> {
    let items = [
        fallback_item(
            0x0f1a_0001,
            "The Daily Briefing",
            "The day's most important stories in five minutes",
            ContentDepth::Quick,
            Cadence::Daily,
        ),
        fallback_item(
            0x0f1a_0002,
            "The Weekly Deep Dive",
            "One topic explored in depth every week",
            ContentDepth::Deep,
            Cadence::Weekly,
        ),
        fallback_item(
            0x0f1a_0003,
            "Tech & Culture Roundup",
            "A curated digest of technology and culture",
            ContentDepth::Quick,
            Cadence::Weekly,
        ),
    ];

    items
        .into_iter()
        .take(limit)
        .map(|item| RecommendationScore {
            item,
            score: FALLBACK_SCORE,
            variant: None,
            reasons: vec![FALLBACK_REASON.to_string()],
        })
        .collect()
}

fn reasons_for(
    item: &Newsletter,
    profile: &UserProfile,
    breakdown: &ScoreBreakdown,
    collaborative: f64,
) -> Vec<String> {
    let mut reasons = Vec::new();

    if breakdown.category >= 50.0 {
        reasons.push("Matches the categories you follow".to_string());
    }
    if collaborative > COLLABORATIVE_FLOOR {
        reasons.push("Popular with readers who engage with the same newsletters".to_string());
    }
    if breakdown.content_depth > 0.0 {
        reasons.push(match item.content_type {
            ContentDepth::Quick => "Fits your preference for quick reads".to_string(),
            ContentDepth::Deep => "Fits your preference for long-form content".to_string(),
        });
    }
    if profile.cadence == Some(item.cadence) {
        reasons.push("Arrives on the schedule you prefer".to_string());
    }
    if breakdown.recency >= 50.0 {
        reasons.push("Published recently".to_string());
    }
    if breakdown.subscribers >= 60.0 {
        reasons.push(format!("Read by {} subscribers", item.subscriber_count));
    }
    if reasons.is_empty() {
        reasons.push("Recommended for you".to_string());
    }

    reasons
}

/// Tunables for the orchestrator, usually taken from [`Config`]
#[derive(Debug, Clone)]
pub struct RecommendationSettings {
    pub experiment_id: Option<Uuid>,
    pub candidate_pool_size: usize,
    pub interaction_window: chrono::Duration,
    pub interaction_page_size: usize,
    pub max_limit: usize,
    pub timeout: Duration,
}

impl RecommendationSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            experiment_id: config.experiment_id,
            candidate_pool_size: config.candidate_pool_size,
            interaction_window: config.interaction_window(),
            interaction_page_size: config.interaction_page_size,
            max_limit: config.max_limit,
            timeout: config.store_timeout(),
        }
    }
}

impl Default for RecommendationSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Orchestrates scoring and ranking for one reader
#[derive(Clone)]
pub struct RecommendationService {
    items: Arc<dyn ItemStore>,
    interactions: Arc<dyn InteractionStore>,
    profiles: Arc<dyn ProfileStore>,
    insights: Arc<dyn InsightStore>,
    allocator: VariantAllocator,
    cache: Option<Cache>,
    weights: Arc<RwLock<ScoringWeights>>,
    settings: RecommendationSettings,
}

impl RecommendationService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        items: Arc<dyn ItemStore>,
        interactions: Arc<dyn InteractionStore>,
        profiles: Arc<dyn ProfileStore>,
        insights: Arc<dyn InsightStore>,
        allocator: VariantAllocator,
        cache: Option<Cache>,
        settings: RecommendationSettings,
    ) -> Self {
        Self {
            items,
            interactions,
            profiles,
            insights,
            allocator,
            cache,
            weights: Arc::new(RwLock::new(ScoringWeights::default())),
            settings,
        }
    }

    pub async fn current_weights(&self) -> ScoringWeights {
        *self.weights.read().await
    }

    /// Replaces the weights used for subsequent requests
    pub async fn adopt_weights(&self, weights: ScoringWeights) {
        *self.weights.write().await = weights;
        tracing::info!(?weights, "Adopted new scoring weights");
    }

    /// Ranked recommendations for `user_id`, at most `options.limit` long.
    ///
    /// A missing user or any transient failure yields the fallback list.
    /// Only a malformed user id is returned as an error.
    pub async fn recommend(
        &self,
        user_id: Option<Uuid>,
        options: RecommendOptions,
    ) -> AppResult<Vec<RecommendationScore>> {
        let limit = options.limit.min(self.settings.max_limit);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let Some(user_id) = user_id else {
            tracing::warn!(
                operation = "recommend",
                cause = %AppError::Unauthorized,
                "Serving fallback recommendations"
            );
            return Ok(fallback_recommendations(limit));
        };

        if user_id.is_nil() {
            return Err(AppError::InvalidInput("user id must not be nil".to_string()));
        }

        match self.personalized(user_id, limit, options.force_refresh).await {
            Ok(recommendations) => Ok(recommendations),
            Err(e) if e.is_degradable() => {
                tracing::warn!(
                    user_id = %user_id,
                    operation = "recommend",
                    error = %e,
                    "Serving fallback recommendations"
                );
                Ok(fallback_recommendations(limit))
            }
            Err(e) => Err(e),
        }
    }

    async fn personalized(
        &self,
        user_id: Uuid,
        limit: usize,
        force_refresh: bool,
    ) -> AppResult<Vec<RecommendationScore>> {
        let variant = self.resolve_variant(user_id).await;

        let candidates = self.load_candidates(force_refresh).await?;
        if candidates.is_empty() {
            tracing::warn!(user_id = %user_id, "No active candidates, serving fallback");
            return Ok(fallback_recommendations(limit));
        }

        let profile = self.load_profile(user_id).await?;
        let collaborative = self.collaborative_for(user_id, &candidates).await?;

        let weights = self.current_weights().await;
        let scorer = Scorer::new(weights);
        let strategy = ScoringStrategy::for_variant(&variant);
        let now = Utc::now();

        let mut scored: Vec<RecommendationScore> = candidates
            .into_iter()
            .map(|item| {
                let breakdown = scorer.breakdown_at(&item, &profile, now);
                let collab = collaborative
                    .get(&item.id)
                    .copied()
                    .unwrap_or(COLLABORATIVE_FLOOR);
                let score = strategy.combine(collab, &breakdown, &weights);
                let reasons = reasons_for(&item, &profile, &breakdown, collab);
                RecommendationScore {
                    item,
                    score,
                    variant: Some(variant.clone()),
                    reasons,
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.item.title.cmp(&b.item.title))
        });
        scored.truncate(limit);

        self.record_batch(user_id, &variant, &scored).await;

        tracing::info!(
            user_id = %user_id,
            variant = %variant,
            returned = scored.len(),
            "Recommendations generated"
        );

        Ok(scored)
    }

    /// Variant for the configured experiment; any allocator error falls
    /// back to the baseline
    async fn resolve_variant(&self, user_id: Uuid) -> String {
        let Some(experiment_id) = self.settings.experiment_id else {
            return BASELINE_VARIANT.to_string();
        };

        match self.allocator.assign(user_id, experiment_id).await {
            Ok(variant) => variant,
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    experiment_id = %experiment_id,
                    operation = "assign_variant",
                    error = %e,
                    "Variant allocation failed, using baseline"
                );
                BASELINE_VARIANT.to_string()
            }
        }
    }

    async fn load_candidates(&self, force_refresh: bool) -> AppResult<Vec<Newsletter>> {
        let filter = ItemFilter::active(self.settings.candidate_pool_size);
        let key = CacheKey::Candidates(self.settings.candidate_pool_size);
        let fetch = with_timeout("candidate fetch", self.settings.timeout, self.items.find(&filter));

        if force_refresh {
            let fresh = fetch.await?;
            if let Some(cache) = &self.cache {
                cache.set_in_background(&key, &fresh, CANDIDATE_CACHE_TTL);
            }
            return Ok(fresh);
        }

        cached!(self.cache.as_ref(), key, CANDIDATE_CACHE_TTL, fetch)
    }

    /// Stored profile plus recent history; a missing profile scores as empty
    async fn load_profile(&self, user_id: Uuid) -> AppResult<UserProfile> {
        let stored = with_timeout(
            "profile lookup",
            self.settings.timeout,
            self.profiles.get_profile(user_id),
        )
        .await?;
        let mut profile = stored.unwrap_or_else(|| UserProfile::empty(user_id));

        let filter = InteractionFilter::recent(
            Utc::now() - self.settings.interaction_window,
            self.settings.interaction_page_size,
        )
        .for_users(vec![user_id]);
        profile.interaction_history = with_timeout(
            "history query",
            self.settings.timeout,
            self.interactions.query(&filter),
        )
        .await?;

        Ok(profile)
    }

    async fn collaborative_for(
        &self,
        user_id: Uuid,
        candidates: &[Newsletter],
    ) -> AppResult<HashMap<Uuid, f64>> {
        let candidate_ids: Vec<Uuid> = candidates.iter().map(|c| c.id).collect();
        let since = Utc::now() - self.settings.interaction_window;

        let on_candidates = with_timeout(
            "candidate interactions",
            self.settings.timeout,
            self.interactions.query(
                &InteractionFilter::recent(since, self.settings.interaction_page_size)
                    .for_items(candidate_ids.clone()),
            ),
        )
        .await?;

        let peers: Vec<Uuid> = on_candidates
            .iter()
            .map(|i| i.user_id)
            .filter(|id| *id != user_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let peer_interactions = if peers.is_empty() {
            Vec::new()
        } else {
            with_timeout(
                "peer interactions",
                self.settings.timeout,
                self.interactions.query(
                    &InteractionFilter::recent(since, self.settings.interaction_page_size)
                        .for_users(peers),
                ),
            )
            .await?
        };

        Ok(collaborative_scores(
            user_id,
            &candidate_ids,
            &on_candidates,
            &peer_interactions,
        ))
    }

    /// Folds the batch into today's insight bucket. Failures are logged only.
    async fn record_batch(&self, user_id: Uuid, variant: &str, batch: &[RecommendationScore]) {
        if batch.is_empty() {
            return;
        }

        let average = batch.iter().map(|r| r.score).sum::<f64>() / batch.len() as f64;
        let insight = Insight::recommendations(
            Utc::now().date_naive(),
            variant,
            batch.len() as u64,
            average,
        );

        if let Err(e) = with_timeout(
            "insight write",
            self.settings.timeout,
            self.insights.append(&insight),
        )
        .await
        {
            tracing::warn!(
                user_id = %user_id,
                variant = %variant,
                operation = "record_insight",
                error = %e,
                "Failed to record recommendation insight"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::{MockInteractionStore, MockItemStore};
    use crate::db::{ExperimentStore, MemoryStore};
    use crate::models::{DateRange, Experiment, InteractionType, Variant};

    fn service_with(store: &MemoryStore, settings: RecommendationSettings) -> RecommendationService {
        let allocator = VariantAllocator::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            None,
            settings.timeout,
        );
        RecommendationService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            allocator,
            None,
            settings,
        )
    }

    fn service(store: &MemoryStore) -> RecommendationService {
        service_with(store, RecommendationSettings::default())
    }

    async fn seed_catalog(store: &MemoryStore) -> Vec<Newsletter> {
        let items = vec![
            Newsletter::new("AI Weekly", ContentDepth::Deep, Cadence::Weekly)
                .with_categories(["Technology"])
                .with_subscribers(250_000)
                .published_at(Utc::now()),
            Newsletter::new("Market Movers", ContentDepth::Quick, Cadence::Daily)
                .with_categories(["Finance"])
                .with_subscribers(40_000)
                .published_at(Utc::now() - chrono::Duration::days(10)),
            Newsletter::new("Garden Notes", ContentDepth::Quick, Cadence::Monthly)
                .with_categories(["Lifestyle"])
                .with_subscribers(800),
        ];
        for item in &items {
            store.insert_item(item.clone()).await;
        }
        items
    }

    #[test]
    fn test_fallback_sizes() {
        assert_eq!(fallback_recommendations(5).len(), 3);
        assert_eq!(fallback_recommendations(2).len(), 2);
        assert!(fallback_recommendations(0).is_empty());

        for rec in fallback_recommendations(3) {
            assert_eq!(rec.score, 0.7);
            assert!(!rec.reasons.is_empty());
        }
    }

    #[test]
    fn test_strategy_for_variant() {
        assert_eq!(ScoringStrategy::for_variant("baseline"), ScoringStrategy::Hybrid);
        assert_eq!(ScoringStrategy::for_variant("content_based"), ScoringStrategy::ContentBased);
        assert_eq!(ScoringStrategy::for_variant("collaborative"), ScoringStrategy::Collaborative);
        assert_eq!(ScoringStrategy::for_variant("popularity"), ScoringStrategy::Popularity);
        assert_eq!(ScoringStrategy::for_variant("mystery"), ScoringStrategy::Hybrid);
    }

    #[test]
    fn test_hybrid_combine_is_capped() {
        let breakdown = ScoreBreakdown {
            category: 100.0,
            subscribers: 100.0,
            interaction_history: 100.0,
            content_depth: 100.0,
            recency: 100.0,
        };
        let weights = ScoringWeights::default();

        let total = ScoringStrategy::Hybrid.combine(0.4, &breakdown, &weights);
        assert!((total - 1.0).abs() < 1e-9);

        let content_only = ScoringStrategy::Hybrid.combine(0.0, &breakdown, &weights);
        assert!((content_only - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_collaborative_scores() {
        let me = Uuid::new_v4();
        let peer = Uuid::new_v4();
        let shared = Uuid::new_v4();
        let other = Uuid::new_v4();
        let lonely = Uuid::new_v4();

        let on_candidates = vec![
            Interaction::new(peer, shared, InteractionType::Read, None),
            Interaction::new(me, lonely, InteractionType::View, None),
        ];
        let peer_history = vec![
            Interaction::new(peer, shared, InteractionType::Read, None),
            Interaction::new(peer, other, InteractionType::View, None),
            Interaction::new(peer, other, InteractionType::View, None),
            Interaction::new(peer, other, InteractionType::View, None),
        ];

        let scores = collaborative_scores(me, &[shared, lonely], &on_candidates, &peer_history);

        assert!((scores[&shared] - 0.25).abs() < 1e-9);
        // Only the requesting reader touched it
        assert_eq!(scores[&lonely], COLLABORATIVE_FLOOR);
    }

    #[test]
    fn test_collaborative_score_is_capped() {
        let me = Uuid::new_v4();
        let peer = Uuid::new_v4();
        let item = Uuid::new_v4();
        let history = vec![Interaction::new(peer, item, InteractionType::Subscribe, None)];

        let scores = collaborative_scores(me, &[item], &history, &history);
        assert_eq!(scores[&item], COLLABORATIVE_CAP);
    }

    #[tokio::test]
    async fn test_recommend_without_user_returns_fallback() {
        let store = MemoryStore::new();
        seed_catalog(&store).await;

        let recs = service(&store)
            .recommend(None, RecommendOptions::with_limit(5))
            .await
            .unwrap();

        assert_eq!(recs.len(), 3);
        assert!(recs.iter().all(|r| r.score == 0.7));
    }

    #[tokio::test]
    async fn test_recommend_rejects_nil_user() {
        let store = MemoryStore::new();
        let result = service(&store)
            .recommend(Some(Uuid::nil()), RecommendOptions::default())
            .await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_recommend_zero_limit_is_empty() {
        let store = MemoryStore::new();
        let recs = service(&store)
            .recommend(None, RecommendOptions::with_limit(0))
            .await
            .unwrap();
        assert!(recs.is_empty());
    }

    #[tokio::test]
    async fn test_recommend_empty_catalog_returns_fallback() {
        let store = MemoryStore::new();
        let recs = service(&store)
            .recommend(Some(Uuid::new_v4()), RecommendOptions::default())
            .await
            .unwrap();
        assert_eq!(recs.len(), 3);
        assert!(recs[0].variant.is_none());
    }

    #[tokio::test]
    async fn test_recommend_ranks_matching_items_first() {
        let store = MemoryStore::new();
        seed_catalog(&store).await;
        let user = Uuid::new_v4();
        let mut profile = UserProfile::empty(user);
        profile.categories = vec!["technology".to_string()];
        profile.depth = Some(ContentDepth::Deep);
        store.insert_profile(profile).await;

        let recs = service(&store)
            .recommend(Some(user), RecommendOptions::with_limit(2))
            .await
            .unwrap();

        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].item.title, "AI Weekly");
        assert!(recs[0].score >= recs[1].score);
        assert!(recs.iter().all(|r| (0.0..=1.0).contains(&r.score)));
        assert_eq!(recs[0].variant.as_deref(), Some(BASELINE_VARIANT));
        assert!(recs[0]
            .reasons
            .iter()
            .any(|r| r.contains("categories you follow")));
    }

    #[tokio::test]
    async fn test_recommend_records_insight() {
        let store = MemoryStore::new();
        seed_catalog(&store).await;

        service(&store)
            .recommend(Some(Uuid::new_v4()), RecommendOptions::with_limit(2))
            .await
            .unwrap();

        let today = Utc::now().date_naive();
        let insights = InsightStore::query(&store, &DateRange::single(today), None)
            .await
            .unwrap();
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].variant, BASELINE_VARIANT);
        assert_eq!(insights[0].total_recommendations, 2);
    }

    #[tokio::test]
    async fn test_recommend_uses_assigned_variant() {
        let store = MemoryStore::new();
        seed_catalog(&store).await;
        let experiment = Experiment::new(
            "popularity-test",
            vec![Variant::new("popularity", 1.0, "subscriber count only")],
        );
        ExperimentStore::put(&store, &experiment).await.unwrap();

        let settings = RecommendationSettings {
            experiment_id: Some(experiment.id),
            ..RecommendationSettings::default()
        };
        let recs = service_with(&store, settings)
            .recommend(Some(Uuid::new_v4()), RecommendOptions::default())
            .await
            .unwrap();

        assert_eq!(recs[0].variant.as_deref(), Some("popularity"));
        assert_eq!(recs[0].item.title, "AI Weekly");
        assert!((recs[0].score - subscriber_fraction(250_000)).abs() < 1e-9);
    }

    fn subscriber_fraction(n: u64) -> f64 {
        crate::services::scorer::subscriber_score(n) / 100.0
    }

    #[tokio::test]
    async fn test_recommend_missing_experiment_uses_baseline() {
        let store = MemoryStore::new();
        seed_catalog(&store).await;
        let settings = RecommendationSettings {
            experiment_id: Some(Uuid::new_v4()),
            ..RecommendationSettings::default()
        };

        let recs = service_with(&store, settings)
            .recommend(Some(Uuid::new_v4()), RecommendOptions::default())
            .await
            .unwrap();

        assert_eq!(recs.len(), 3);
        assert_eq!(recs[0].variant.as_deref(), Some(BASELINE_VARIANT));
    }

    #[tokio::test]
    async fn test_recommend_item_store_failure_returns_fallback() {
        let store = MemoryStore::new();
        let mut items = MockItemStore::new();
        items
            .expect_find()
            .returning(|_| Err(AppError::StoreUnavailable("connection refused".to_string())));

        let settings = RecommendationSettings::default();
        let allocator = VariantAllocator::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            None,
            settings.timeout,
        );
        let service = RecommendationService::new(
            Arc::new(items),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            allocator,
            None,
            settings,
        );

        let recs = service
            .recommend(Some(Uuid::new_v4()), RecommendOptions::with_limit(5))
            .await
            .unwrap();
        assert_eq!(recs.len(), 3);
        assert_eq!(recs[0].reasons[0], FALLBACK_REASON);
    }

    #[tokio::test]
    async fn test_recommend_interaction_failure_returns_fallback() {
        let store = MemoryStore::new();
        seed_catalog(&store).await;
        let mut interactions = MockInteractionStore::new();
        interactions
            .expect_query()
            .returning(|_| Err(AppError::RecommendationFailed("corrupt log".to_string())));

        let settings = RecommendationSettings::default();
        let allocator = VariantAllocator::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            None,
            settings.timeout,
        );
        let service = RecommendationService::new(
            Arc::new(store.clone()),
            Arc::new(interactions),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            allocator,
            None,
            settings,
        );

        let recs = service
            .recommend(Some(Uuid::new_v4()), RecommendOptions::default())
            .await
            .unwrap();
        assert_eq!(recs.len(), 3);
        assert!(recs.iter().all(|r| r.variant.is_none()));
    }

    #[tokio::test]
    async fn test_recommend_clamps_to_max_limit() {
        let store = MemoryStore::new();
        for i in 0..8 {
            store
                .insert_item(Newsletter::new(
                    format!("Letter {}", i),
                    ContentDepth::Quick,
                    Cadence::Daily,
                ))
                .await;
        }
        let settings = RecommendationSettings {
            max_limit: 4,
            ..RecommendationSettings::default()
        };

        let recs = service_with(&store, settings)
            .recommend(Some(Uuid::new_v4()), RecommendOptions::with_limit(20))
            .await
            .unwrap();
        assert_eq!(recs.len(), 4);
    }

    #[tokio::test]
    async fn test_adopt_weights() {
        let store = MemoryStore::new();
        let service = service(&store);
        let weights = ScoringWeights {
            category: 0.5,
            ..ScoringWeights::default()
        };

        service.adopt_weights(weights).await;
        assert_eq!(service.current_weights().await, weights);
    }
}
