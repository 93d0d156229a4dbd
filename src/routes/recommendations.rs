use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::{
    error::AppResult,
    middleware::Caller,
    models::{RecommendOptions, RecommendationScore},
    state::AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct RecommendationRequest {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub force_refresh: bool,
}

#[derive(Debug, Serialize)]
pub struct RecommendationResponse {
    pub recommendations: Vec<RecommendationScore>,
}

/// Handler for recommendations endpoint. Anonymous callers get the
/// fallback list.
pub async fn recommend(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<RecommendationRequest>,
) -> AppResult<Json<RecommendationResponse>> {
    let user_id = caller.optional()?;
    let options = RecommendOptions {
        limit: request.limit.unwrap_or_else(|| state.engine.default_limit()),
        force_refresh: request.force_refresh,
    };

    let recommendations = state.engine.recommend(user_id, options).await?;
    Ok(Json(RecommendationResponse { recommendations }))
}
