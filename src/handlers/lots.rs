use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::entities::inventory_batch;
use crate::errors::ServiceError;
use crate::handlers::common::validate_input;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct QuarantineRequest {
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ExpireRequest {
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:id/quarantine", post(quarantine))
        .route("/:id/release", post(release))
        .route("/:id/expire", post(expire))
}

async fn quarantine(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<QuarantineRequest>,
) -> Result<Json<inventory_batch::Model>, ServiceError> {
    validate_input(&body)?;
    Ok(Json(state.allocator.quarantine(id, &body.reason).await?))
}

async fn release(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<inventory_batch::Model>, ServiceError> {
    Ok(Json(state.allocator.release(id).await?))
}

async fn expire(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<ExpireRequest>>,
) -> Result<Json<inventory_batch::Model>, ServiceError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    validate_input(&body)?;
    Ok(Json(state.allocator.expire(id, body.reason).await?))
}
