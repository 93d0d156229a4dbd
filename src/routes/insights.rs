use axum::{
    extract::{Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::{
    error::AppResult,
    models::{DateRange, PerformanceSummary, VariantPerformance},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

pub async fn performance(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> AppResult<Json<PerformanceSummary>> {
    let range = DateRange::new(query.start, query.end)?;
    Ok(Json(state.engine.get_performance(&range).await?))
}

/// Per-variant totals for the range
pub async fn variants(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> AppResult<Json<Vec<VariantPerformance>>> {
    let range = DateRange::new(query.start, query.end)?;
    Ok(Json(state.engine.variant_breakdown(&range).await?))
}
