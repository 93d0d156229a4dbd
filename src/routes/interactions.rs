use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppResult, middleware::Caller, models::InteractionType, state::AppState};

#[derive(Debug, Deserialize)]
pub struct InteractionRequest {
    pub item_id: Uuid,
    pub interaction_type: InteractionType,
    #[serde(default)]
    pub duration_secs: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct InteractionResponse {
    pub id: Uuid,
}

pub async fn record(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<InteractionRequest>,
) -> AppResult<(StatusCode, Json<InteractionResponse>)> {
    let user_id = caller.required()?;
    let id = state
        .engine
        .record_interaction(
            user_id,
            request.item_id,
            request.interaction_type,
            request.duration_secs,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(InteractionResponse { id })))
}
