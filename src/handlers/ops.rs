use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::entities::job_run;
use crate::errors::ServiceError;
use crate::handlers::common::clamp_limit;
use crate::services::ops::OpsSummary;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SummaryQuery {
    pub tenant_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct JobsQuery {
    pub limit: Option<u64>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/summary", get(summary))
        .route("/jobs", get(recent_jobs))
}

async fn summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<OpsSummary>, ServiceError> {
    Ok(Json(
        state
            .ops
            .summary(&state.store, &state.exceptions, query.tenant_id)
            .await?,
    ))
}

async fn recent_jobs(
    State(state): State<AppState>,
    Query(query): Query<JobsQuery>,
) -> Result<Json<Vec<job_run::Model>>, ServiceError> {
    Ok(Json(state.ops.recent_jobs(clamp_limit(query.limit)).await?))
}
