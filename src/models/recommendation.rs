use serde::{Deserialize, Serialize};

use super::Newsletter;

/// A scored newsletter returned to the caller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationScore {
    pub item: Newsletter,
    /// Total score on the [0, 1] scale
    pub score: f64,
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default)]
    pub reasons: Vec<String>,
}

/// Options for a recommendation request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecommendOptions {
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Skip the cached candidate pool
    #[serde(default)]
    pub force_refresh: bool,
}

fn default_limit() -> usize {
    10
}

impl Default for RecommendOptions {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            force_refresh: false,
        }
    }
}

impl RecommendOptions {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }
}
