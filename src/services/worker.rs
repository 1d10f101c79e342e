//! Worker pool and background job loop.
//!
//! Tenants are partitioned across `worker_count` tasks by a stable hash, so
//! inside one process a tenant has a single consumer. The advisory lock taken
//! by each posting transaction covers multi-process deployments.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::{counter, gauge};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::PostingConfig;
use crate::errors::ServiceError;
use crate::services::ops::{OpsService, EXPIRY_SWEEP, RECURRING_JOURNALS, STALE_CLAIM_REAPER};
use crate::services::posting::{ApplyOutcome, PostingEngine};
use crate::services::scheduler::Scheduler;
use crate::services::tenant_locks::TenantLocks;

/// Stable tenant → worker assignment.
pub fn partition_for(tenant_id: Uuid, workers: usize) -> usize {
    (tenant_id.as_u128() % workers.max(1) as u128) as usize
}

/// Tally of one drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub posted: usize,
    pub held: usize,
    pub dead: usize,
    pub retried: usize,
    pub replayed: usize,
}

impl DrainReport {
    fn record(&mut self, outcome: &ApplyOutcome) {
        match outcome {
            ApplyOutcome::Posted { .. } => self.posted += 1,
            ApplyOutcome::Held { .. } => self.held += 1,
            ApplyOutcome::Dead { .. } => self.dead += 1,
            ApplyOutcome::Retry { .. } => self.retried += 1,
            ApplyOutcome::Replayed { .. } => self.replayed += 1,
        }
    }

    fn merge(&mut self, other: &DrainReport) {
        self.posted += other.posted;
        self.held += other.held;
        self.dead += other.dead;
        self.retried += other.retried;
        self.replayed += other.replayed;
    }

    pub fn total(&self) -> usize {
        self.posted + self.held + self.dead + self.retried + self.replayed
    }
}

#[derive(Clone)]
pub struct Worker {
    engine: PostingEngine,
    scheduler: Scheduler,
    ops: OpsService,
    locks: TenantLocks,
    cfg: PostingConfig,
}

impl Worker {
    pub fn new(db: Arc<DatabaseConnection>, cfg: PostingConfig, locks: TenantLocks) -> Self {
        let engine = PostingEngine::new(db.clone(), &cfg);
        Self {
            scheduler: Scheduler::new(db.clone(), engine.allocator().clone()),
            ops: OpsService::new(db),
            engine,
            locks,
            cfg,
        }
    }

    pub fn engine(&self) -> &PostingEngine {
        &self.engine
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Applies up to `batch_limit` due events of one tenant, in order.
    #[instrument(skip(self))]
    pub async fn drain_tenant(&self, tenant_id: Uuid) -> Result<DrainReport, ServiceError> {
        let _guard = self.locks.acquire(tenant_id).await;
        let mut report = DrainReport::default();
        for _ in 0..self.cfg.batch_limit {
            match self.engine.process_next(tenant_id).await? {
                Some(outcome) => report.record(&outcome),
                None => break,
            }
        }
        if report.total() > 0 {
            debug!(?report, "drained tenant");
        }
        Ok(report)
    }

    /// One pass over every tenant with due work, or just `tenant`.
    pub async fn run_once(&self, tenant: Option<Uuid>) -> Result<DrainReport, ServiceError> {
        self.engine
            .store()
            .reset_stale_claims(Utc::now())
            .await?;
        let tenants = match tenant {
            Some(tenant_id) => vec![tenant_id],
            None => self.engine.store().tenants_with_work(Utc::now()).await?,
        };
        let mut report = DrainReport::default();
        for tenant_id in tenants {
            report.merge(&self.drain_tenant(tenant_id).await?);
        }
        Ok(report)
    }

    /// Drains until no tenant has due work left. Bounded so a retry storm
    /// cannot spin forever.
    pub async fn run_until_idle(
        &self,
        tenant: Option<Uuid>,
        max_passes: usize,
    ) -> Result<DrainReport, ServiceError> {
        let mut report = DrainReport::default();
        for _ in 0..max_passes {
            let pass = self.run_once(tenant).await?;
            if pass.total() == 0 {
                break;
            }
            report.merge(&pass);
        }
        Ok(report)
    }

    async fn run_job<F, T>(&self, job_code: &str, job: F)
    where
        F: Future<Output = Result<T, ServiceError>>,
        T: Serialize,
    {
        let run_id = match self.ops.start_job(job_code).await {
            Ok(id) => id,
            Err(err) => {
                error!(job_code, error = %err, "could not record job start");
                return;
            }
        };
        let result = job
            .await
            .map(|value| serde_json::to_value(value).unwrap_or_default())
            .map_err(|err| err.to_string());
        if result.is_err() {
            counter!("posting_engine.jobs.failed", 1, "job" => job_code.to_string());
        }
        if let Err(err) = self.ops.finish_job(run_id, result).await {
            error!(job_code, error = %err, "could not record job result");
        }
    }

    pub async fn run_recurring_journals(&self) {
        let today = Utc::now().date_naive();
        self.run_job(RECURRING_JOURNALS, self.scheduler.run_due(today))
            .await;
    }

    pub async fn run_expiry_sweep(&self) {
        let today = Utc::now().date_naive();
        self.run_job(EXPIRY_SWEEP, async {
            let enqueued = self.scheduler.enqueue_expiry_sweeps(today).await?;
            Ok(json!({ "enqueued": enqueued }))
        })
        .await;
    }

    pub async fn run_reaper(&self) {
        self.run_job(STALE_CLAIM_REAPER, async {
            let reset = self.engine.store().reset_stale_claims(Utc::now()).await?;
            Ok(json!({ "reset": reset }))
        })
        .await;
    }

    /// Spawns the partitioned pool, the job loop and the heartbeat.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let workers = self.cfg.worker_count.max(1);
        let mut handles = Vec::with_capacity(workers + 2);
        for index in 0..workers {
            let worker = self.clone();
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                worker.partition_loop(index, workers, shutdown).await;
            }));
        }
        let jobs = self.clone();
        let job_shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            jobs.job_loop(job_shutdown).await;
        }));
        handles.push(tokio::spawn(async move {
            self.heartbeat_loop(shutdown).await;
        }));
        info!(workers, "worker pool started");
        handles
    }

    async fn partition_loop(&self, index: usize, workers: usize, mut shutdown: watch::Receiver<bool>) {
        let name = format!("worker-{index}");
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.engine.store().tenants_with_work(Utc::now()).await {
                Ok(tenants) => {
                    for tenant_id in tenants
                        .into_iter()
                        .filter(|t| partition_for(*t, workers) == index)
                    {
                        if let Err(err) = self.drain_tenant(tenant_id).await {
                            error!(worker = %name, %tenant_id, error = %err, "drain failed");
                        }
                    }
                }
                Err(err) => error!(worker = %name, error = %err, "could not list tenants"),
            }
            tokio::select! {
                _ = tokio::time::sleep(self.cfg.poll_interval()) => {}
                _ = shutdown.changed() => {}
            }
        }
        info!(worker = %name, "worker stopped");
    }

    async fn job_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut recurring = tokio::time::interval(secs(self.cfg.scheduler_interval_secs));
        let mut expiry = tokio::time::interval(secs(self.cfg.expiry_sweep_interval_secs));
        let mut reaper = tokio::time::interval(secs(self.cfg.processing_lease_secs / 2));
        loop {
            tokio::select! {
                _ = recurring.tick() => self.run_recurring_journals().await,
                _ = expiry.tick() => self.run_expiry_sweep().await,
                _ = reaper.tick() => self.run_reaper().await,
                _ = shutdown.changed() => break,
            }
        }
        info!("job loop stopped");
    }

    async fn heartbeat_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut tick = tokio::time::interval(secs(self.cfg.heartbeat_interval_secs));
        let name = format!("posting-engine-{}", std::process::id());
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let details = json!({
                        "workers": self.cfg.worker_count,
                        "tenants_locked": self.locks.tracked(),
                    });
                    gauge!("posting_engine.worker.tenants_tracked", self.locks.tracked() as f64);
                    if let Err(err) = self.ops.heartbeat(&name, Some(details)).await {
                        warn!(error = %err, "heartbeat failed");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    }
}

fn secs(value: u64) -> Duration {
    Duration::from_secs(value.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitioning_is_stable_and_in_range() {
        for _ in 0..100 {
            let tenant = Uuid::new_v4();
            let slot = partition_for(tenant, 4);
            assert!(slot < 4);
            assert_eq!(slot, partition_for(tenant, 4));
        }
        assert_eq!(partition_for(Uuid::new_v4(), 0), 0);
    }

    #[test]
    fn report_tallies_outcomes() {
        let mut report = DrainReport::default();
        report.record(&ApplyOutcome::Dead {
            event_id: Uuid::nil(),
            reason: "x".into(),
        });
        report.record(&ApplyOutcome::Posted {
            event_id: Uuid::nil(),
            document_id: Uuid::nil(),
            journal_entry_id: None,
        });
        assert_eq!(report.total(), 2);
        assert_eq!(report.dead, 1);
    }
}
