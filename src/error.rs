use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("No user could be resolved for this request")]
    Unauthorized,

    #[error("Experiment not found: {0}")]
    ExperimentNotFound(Uuid),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Recommendation failed: {0}")]
    RecommendationFailed(String),
}

impl AppError {
    /// Transient failures that the orchestrator and allocator absorb into a
    /// fallback instead of surfacing to the caller.
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            AppError::StoreUnavailable(_) | AppError::RecommendationFailed(_)
        )
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::StoreUnavailable(format!("database: {}", e))
    }
}

impl From<redis::RedisError> for AppError {
    fn from(e: redis::RedisError) -> Self {
        AppError::StoreUnavailable(format!("cache: {}", e))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::ExperimentNotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::RecommendationFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degradable_errors() {
        assert!(AppError::StoreUnavailable("timeout".to_string()).is_degradable());
        assert!(AppError::RecommendationFailed("boom".to_string()).is_degradable());
        assert!(!AppError::Unauthorized.is_degradable());
        assert!(!AppError::ExperimentNotFound(Uuid::nil()).is_degradable());
        assert!(!AppError::InvalidInput("bad id".to_string()).is_degradable());
    }

    #[test]
    fn test_status_mapping() {
        let cases = vec![
            (AppError::Unauthorized, StatusCode::UNAUTHORIZED),
            (AppError::ExperimentNotFound(Uuid::new_v4()), StatusCode::NOT_FOUND),
            (AppError::InvalidInput("x".to_string()), StatusCode::BAD_REQUEST),
            (
                AppError::StoreUnavailable("x".to_string()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AppError::RecommendationFailed("x".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
