use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    middleware::Caller,
    models::{DateRange, Experiment},
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct AssignmentResponse {
    pub experiment_id: Uuid,
    pub user_id: Uuid,
    pub variant: String,
}

/// Optional window whose insights refresh the variant metrics first
#[derive(Debug, Default, Deserialize)]
pub struct ConcludeRequest {
    #[serde(default)]
    pub start: Option<NaiveDate>,
    #[serde(default)]
    pub end: Option<NaiveDate>,
}

impl ConcludeRequest {
    /// Parses an optional JSON body; an empty body means no range
    fn from_body(body: &[u8]) -> AppResult<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|e| AppError::InvalidInput(format!("invalid conclude body: {}", e)))
    }

    fn metrics_range(&self) -> AppResult<Option<DateRange>> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => DateRange::new(start, end).map(Some),
            (None, None) => Ok(None),
            _ => Err(AppError::InvalidInput(
                "start and end must be given together".to_string(),
            )),
        }
    }
}

pub async fn assign(
    State(state): State<AppState>,
    caller: Caller,
    Path(experiment_id): Path<Uuid>,
) -> AppResult<Json<AssignmentResponse>> {
    let user_id = caller.required()?;
    let variant = state.engine.assign_variant(user_id, experiment_id).await?;

    Ok(Json(AssignmentResponse {
        experiment_id,
        user_id,
        variant,
    }))
}

/// Concludes the experiment. The body is optional and may carry a
/// `{start, end}` metrics window.
pub async fn conclude(
    State(state): State<AppState>,
    Path(experiment_id): Path<Uuid>,
    body: Bytes,
) -> AppResult<Json<Experiment>> {
    let range = ConcludeRequest::from_body(&body)?.metrics_range()?;
    let experiment = state.engine.conclude_experiment(experiment_id, range).await?;
    Ok(Json(experiment))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_body_has_no_range() {
        let request = ConcludeRequest::from_body(b"").unwrap();
        assert!(request.metrics_range().unwrap().is_none());
        assert!(ConcludeRequest::from_body(b" \n").is_ok());
    }

    #[test]
    fn test_body_with_range() {
        let request =
            ConcludeRequest::from_body(br#"{"start":"2024-03-01","end":"2024-03-07"}"#).unwrap();
        let range = request.metrics_range().unwrap().unwrap();
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[test]
    fn test_malformed_or_partial_body_is_rejected() {
        assert!(matches!(
            ConcludeRequest::from_body(b"{not json"),
            Err(AppError::InvalidInput(_))
        ));
        let partial = ConcludeRequest::from_body(br#"{"start":"2024-03-01"}"#).unwrap();
        assert!(matches!(
            partial.metrics_range(),
            Err(AppError::InvalidInput(_))
        ));
    }
}
