use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::entities::outbox_event::{self, OutboxStatus};
use crate::errors::ServiceError;
use crate::handlers::common::{clamp_limit, validate_input, ActorRequest};
use crate::services::event_store::{SubmitAck, WireEvent};
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitRequest {
    pub tenant_id: Uuid,
    #[validate(length(min = 1, max = 500))]
    pub events: Vec<WireEvent>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub accepted: usize,
    pub duplicates: usize,
    pub acks: Vec<SubmitAck>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub tenant_id: Uuid,
    pub status: Option<OutboxStatus>,
    pub limit: Option<u64>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_events))
        .route("/submit", post(submit))
        .route("/:id", get(get_event))
        .route("/:id/requeue", post(requeue))
}

async fn submit(
    State(state): State<AppState>,
    Json(body): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>), ServiceError> {
    validate_input(&body)?;
    let acks = state.store.submit(body.tenant_id, body.events).await?;
    let duplicates = acks.iter().filter(|a| a.duplicate).count();
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            accepted: acks.len() - duplicates,
            duplicates,
            acks,
        }),
    ))
}

async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<outbox_event::Model>>, ServiceError> {
    let events = state
        .store
        .list(query.tenant_id, query.status, clamp_limit(query.limit))
        .await?;
    Ok(Json(events))
}

async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<outbox_event::Model>, ServiceError> {
    Ok(Json(state.store.get(id).await?))
}

async fn requeue(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ActorRequest>,
) -> Result<Json<outbox_event::Model>, ServiceError> {
    validate_input(&body)?;
    let event = state.store.get(id).await?;
    let _guard = state.locks.acquire(event.tenant_id).await;
    Ok(Json(
        state.store.requeue(id, body.actor.trim(), body.note).await?,
    ))
}
