use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::entities::recurring_journal_rule::{self, RuleState};
use crate::errors::ServiceError;
use crate::services::scheduler::SchedulerReport;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StateRequest {
    pub state: RuleState,
}

#[derive(Debug, Default, Deserialize)]
pub struct RunRequest {
    /// Defaults to today (UTC).
    pub today: Option<NaiveDate>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/run", post(run_due))
        .route("/:id/state", post(set_state))
}

async fn set_state(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<StateRequest>,
) -> Result<Json<recurring_journal_rule::Model>, ServiceError> {
    Ok(Json(state.scheduler.set_state(id, body.state).await?))
}

/// Runs the scheduler now instead of waiting for the next tick.
async fn run_due(
    State(state): State<AppState>,
    body: Option<Json<RunRequest>>,
) -> Result<Json<SchedulerReport>, ServiceError> {
    let today = body
        .and_then(|Json(b)| b.today)
        .unwrap_or_else(|| Utc::now().date_naive());
    Ok(Json(state.scheduler.run_due(today).await?))
}
