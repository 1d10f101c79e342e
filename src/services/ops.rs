//! Operational signals: heartbeats, job runs and the summary read by the
//! attention dashboard.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::entities::job_run::{self, JobStatus};
use crate::entities::worker_heartbeat;
use crate::errors::ServiceError;
use crate::services::event_store::EventStore;
use crate::services::exceptions::ExceptionService;

pub const RECURRING_JOURNALS: &str = "RECURRING_JOURNALS";
pub const EXPIRY_SWEEP: &str = "EXPIRY_SWEEP";
pub const STALE_CLAIM_REAPER: &str = "STALE_CLAIM_REAPER";

#[derive(Debug, Clone, Serialize)]
pub struct OpsSummary {
    pub generated_at: DateTime<Utc>,
    pub outbox: BTreeMap<String, u64>,
    pub open_exceptions: BTreeMap<String, u64>,
    /// Failed job runs per job code.
    pub failed_jobs: BTreeMap<String, u64>,
    pub heartbeats: Vec<worker_heartbeat::Model>,
}

#[derive(Clone)]
pub struct OpsService {
    db: Arc<DatabaseConnection>,
}

impl OpsService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn heartbeat(
        &self,
        worker_name: &str,
        details: Option<serde_json::Value>,
    ) -> Result<(), ServiceError> {
        let row = worker_heartbeat::ActiveModel {
            worker_name: Set(worker_name.to_string()),
            last_seen_at: Set(Utc::now()),
            details: Set(details),
        };
        worker_heartbeat::Entity::insert(row)
            .on_conflict(
                OnConflict::column(worker_heartbeat::Column::WorkerName)
                    .update_columns([
                        worker_heartbeat::Column::LastSeenAt,
                        worker_heartbeat::Column::Details,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await?;
        debug!(worker_name, "heartbeat");
        Ok(())
    }

    pub async fn start_job(&self, job_code: &str) -> Result<Uuid, ServiceError> {
        let run = job_run::ActiveModel {
            id: Set(Uuid::new_v4()),
            job_code: Set(job_code.to_string()),
            started_at: Set(Utc::now()),
            finished_at: Set(None),
            status: Set(JobStatus::Running),
            error: Set(None),
            details: Set(None),
        }
        .insert(&*self.db)
        .await?;
        Ok(run.id)
    }

    pub async fn finish_job(
        &self,
        run_id: Uuid,
        result: Result<serde_json::Value, String>,
    ) -> Result<(), ServiceError> {
        let (status, error, details) = match result {
            Ok(details) => (JobStatus::Succeeded, None, Some(details)),
            Err(error) => {
                warn!(%run_id, error = %error, "job run failed");
                (JobStatus::Failed, Some(error), None)
            }
        };
        job_run::ActiveModel {
            id: Set(run_id),
            finished_at: Set(Some(Utc::now())),
            status: Set(status),
            error: Set(error),
            details: Set(details),
            ..Default::default()
        }
        .update(&*self.db)
        .await?;
        Ok(())
    }

    pub async fn recent_jobs(&self, limit: u64) -> Result<Vec<job_run::Model>, ServiceError> {
        Ok(job_run::Entity::find()
            .order_by_desc(job_run::Column::StartedAt)
            .limit(limit)
            .all(&*self.db)
            .await?)
    }

    pub async fn failed_job_counts(&self) -> Result<BTreeMap<String, u64>, ServiceError> {
        let rows: Vec<(String, i64)> = job_run::Entity::find()
            .select_only()
            .column(job_run::Column::JobCode)
            .column_as(Expr::col(job_run::Column::Id).count(), "count")
            .filter(job_run::Column::Status.eq(JobStatus::Failed))
            .group_by(job_run::Column::JobCode)
            .into_tuple()
            .all(&*self.db)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(code, count)| (code, count.max(0) as u64))
            .collect())
    }

    pub async fn summary(
        &self,
        store: &EventStore,
        exceptions: &ExceptionService,
        tenant_id: Option<Uuid>,
    ) -> Result<OpsSummary, ServiceError> {
        Ok(OpsSummary {
            generated_at: Utc::now(),
            outbox: store.status_histogram(tenant_id).await?,
            open_exceptions: exceptions.open_counts(tenant_id).await?,
            failed_jobs: self.failed_job_counts().await?,
            heartbeats: worker_heartbeat::Entity::find()
                .order_by_asc(worker_heartbeat::Column::WorkerName)
                .all(&*self.db)
                .await?,
        })
    }
}
