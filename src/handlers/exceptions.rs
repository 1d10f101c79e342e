use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::entities::{exception_action, exception_item};
use crate::errors::ServiceError;
use crate::handlers::common::{clamp_limit, validate_input, ActorRequest};
use crate::services::exceptions::ExceptionFilter;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ExceptionDetail {
    #[serde(flatten)]
    pub item: exception_item::Model,
    pub actions: Vec<exception_action::Model>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_exceptions))
        .route("/:id", get(get_exception))
        .route("/:id/release", post(release))
        .route("/:id/reject", post(reject))
}

async fn list_exceptions(
    State(state): State<AppState>,
    Query(mut filter): Query<ExceptionFilter>,
) -> Result<Json<Vec<exception_item::Model>>, ServiceError> {
    filter.limit = Some(clamp_limit(filter.limit));
    Ok(Json(state.exceptions.list(&filter).await?))
}

async fn get_exception(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ExceptionDetail>, ServiceError> {
    let item = state.exceptions.get(id).await?;
    let actions = state.exceptions.actions(id).await?;
    Ok(Json(ExceptionDetail { item, actions }))
}

async fn release(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ActorRequest>,
) -> Result<Json<exception_item::Model>, ServiceError> {
    validate_input(&body)?;
    Ok(Json(
        state.exceptions.release(id, &body.actor, body.note).await?,
    ))
}

async fn reject(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ActorRequest>,
) -> Result<Json<exception_item::Model>, ServiceError> {
    validate_input(&body)?;
    Ok(Json(
        state.exceptions.reject(id, &body.actor, body.note).await?,
    ))
}
