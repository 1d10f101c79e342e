use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::services::documents::DocumentView;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:id", get(get_document))
        .route("/by-event/:event_id", get(by_event))
}

async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DocumentView>, ServiceError> {
    Ok(Json(state.documents.get(id).await?))
}

async fn by_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<DocumentView>, ServiceError> {
    state
        .documents
        .by_event(event_id)
        .await?
        .map(Json)
        .ok_or_else(|| ServiceError::NotFound(format!("no document for event {event_id}")))
}
