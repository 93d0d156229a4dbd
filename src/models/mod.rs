pub mod experiment;
pub mod insight;
pub mod interaction;
pub mod newsletter;
pub mod profile;
pub mod recommendation;

pub use experiment::{Assignment, Experiment, ExperimentStatus, Variant, VariantMetrics};
pub use insight::{DateRange, Insight, PerformanceSummary, VariantPerformance};
pub use interaction::{Interaction, InteractionFilter, InteractionType, Sentiment};
pub use newsletter::{Cadence, ContentDepth, ItemFilter, ItemStatus, ItemUpdate, Newsletter};
pub use profile::{
    EngagementDelta, PreferenceUpdate, ProfileUpdate, RecommendationProfile, UserProfile,
};
pub use recommendation::{RecommendOptions, RecommendationScore};
