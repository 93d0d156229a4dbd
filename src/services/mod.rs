pub mod allocator;
pub mod engine;
pub mod insights;
pub mod interactions;
pub mod learning;
pub mod recommendations;
pub mod scorer;

pub use allocator::{VariantAllocator, BASELINE_VARIANT};
pub use engine::{Engine, Stores};
pub use insights::InsightsAggregator;
pub use interactions::InteractionRecorder;
pub use learning::{Feedback, HeuristicDecay, LearningService, WeightAdapter, WeightProposal};
pub use recommendations::{
    fallback_recommendations, RecommendationService, RecommendationSettings, ScoringStrategy,
};
pub use scorer::{ScoreBreakdown, Scorer, ScoringWeights};
