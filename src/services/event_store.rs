//! Durable, per-tenant ordered log of device events.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, DbBackend,
    DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait,
};
use sea_orm::sea_query::{LockBehavior, LockType};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::PostingConfig;
use crate::db::{lock_tenant, with_transaction};
use crate::domain::hold::HoldReason;
use crate::entities::exception_action::{self, ExceptionActionKind};
use crate::entities::outbox_event::{self, Entity as OutboxEvent, OutboxStatus};
use crate::entities::processed_event;
use crate::errors::ServiceError;

/// Event as submitted by a device (or synthesised by the scheduler).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEvent {
    pub device_id: String,
    pub device_seq: i64,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitAck {
    pub device_id: String,
    pub device_seq: i64,
    pub event_id: Uuid,
    pub status: OutboxStatus,
    /// The natural key was already stored; nothing was inserted.
    pub duplicate: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: i32,
    pub base_secs: u64,
    pub cap_secs: u64,
    pub lease: Duration,
}

impl From<&PostingConfig> for RetryPolicy {
    fn from(cfg: &PostingConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts,
            base_secs: cfg.backoff_base_secs,
            cap_secs: cfg.backoff_cap_secs,
            lease: cfg.processing_lease(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from(&PostingConfig::default())
    }
}

/// Delay before retry number `attempt` (1-based):
/// `min(cap, base^(attempt-1))` plus a jitter derived from the event id, so
/// replays of the same failure schedule identically.
pub fn next_retry_delay(event_id: Uuid, attempt: i32, base_secs: u64, cap_secs: u64) -> Duration {
    let exponent = attempt.saturating_sub(1).max(0) as u32;
    let delay = base_secs
        .checked_pow(exponent)
        .unwrap_or(u64::MAX)
        .min(cap_secs);

    let window = (delay / 5).min(30);
    let jitter = if window == 0 {
        0
    } else {
        let digest = Sha256::digest(format!("{event_id}:{attempt}").as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(head) % (window + 1)
    };

    Duration::from_secs(delay.saturating_add(jitter).min(cap_secs))
}

#[derive(Clone)]
pub struct EventStore {
    db: Arc<DatabaseConnection>,
    policy: RetryPolicy,
}

impl EventStore {
    pub fn new(db: Arc<DatabaseConnection>, policy: RetryPolicy) -> Self {
        Self { db, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Accepts a batch from one tenant. Duplicates are acknowledged with the
    /// stored status and never inserted twice.
    #[instrument(skip(self, events), fields(tenant_id = %tenant_id, count = events.len()))]
    pub async fn submit(
        &self,
        tenant_id: Uuid,
        events: Vec<WireEvent>,
    ) -> Result<Vec<SubmitAck>, ServiceError> {
        for event in &events {
            if event.device_id.trim().is_empty() {
                return Err(ServiceError::ValidationError(
                    "device_id must not be empty".into(),
                ));
            }
            if event.device_seq < 0 {
                return Err(ServiceError::ValidationError(format!(
                    "device_seq must not be negative (device {})",
                    event.device_id
                )));
            }
        }

        let mut acks = Vec::with_capacity(events.len());
        for event in events {
            let ack = Self::enqueue(&*self.db, tenant_id, event, Utc::now())
                .await
                .map_err(ServiceError::db_error)?;
            if ack.duplicate {
                counter!("posting_engine.events.duplicate_submissions", 1);
            } else {
                counter!("posting_engine.events.submitted", 1);
            }
            acks.push(ack);
        }
        info!(
            accepted = acks.iter().filter(|a| !a.duplicate).count(),
            "outbox batch stored"
        );
        Ok(acks)
    }

    /// Inserts one event unless its natural key already exists.
    pub async fn enqueue<C>(
        conn: &C,
        tenant_id: Uuid,
        event: WireEvent,
        now: DateTime<Utc>,
    ) -> Result<SubmitAck, DbErr>
    where
        C: ConnectionTrait,
    {
        let id = Uuid::new_v4();
        let model = outbox_event::ActiveModel {
            id: Set(id),
            tenant_id: Set(tenant_id),
            device_id: Set(event.device_id.clone()),
            device_seq: Set(event.device_seq),
            event_type: Set(event.event_type.clone()),
            payload: Set(event.payload),
            occurred_at: Set(event.occurred_at),
            received_at: Set(now),
            status: Set(OutboxStatus::Pending),
            attempt_count: Set(0),
            next_attempt_at: Set(None),
            claimed_at: Set(None),
            processed_at: Set(None),
            last_error: Set(None),
            variance_approved: Set(false),
            updated_at: Set(now),
        };

        let inserted = OutboxEvent::insert(model)
            .on_conflict(
                OnConflict::columns([
                    outbox_event::Column::DeviceId,
                    outbox_event::Column::DeviceSeq,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;

        if inserted > 0 {
            debug!(event_id = %id, device_id = %event.device_id, device_seq = event.device_seq, "event enqueued");
            return Ok(SubmitAck {
                device_id: event.device_id,
                device_seq: event.device_seq,
                event_id: id,
                status: OutboxStatus::Pending,
                duplicate: false,
            });
        }

        let existing = OutboxEvent::find()
            .filter(outbox_event::Column::DeviceId.eq(event.device_id.as_str()))
            .filter(outbox_event::Column::DeviceSeq.eq(event.device_seq))
            .one(conn)
            .await?
            .ok_or_else(|| {
                DbErr::RecordNotFound(format!(
                    "outbox event {}:{} vanished after conflict",
                    event.device_id, event.device_seq
                ))
            })?;

        Ok(SubmitAck {
            device_id: existing.device_id,
            device_seq: existing.device_seq,
            event_id: existing.id,
            status: existing.status,
            duplicate: true,
        })
    }

    /// Claims the tenant's earliest due event, unless one is already in flight.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn claim_next(
        &self,
        tenant_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<outbox_event::Model>, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        lock_tenant(&txn, tenant_id)
            .await
            .map_err(ServiceError::db_error)?;

        let in_flight = OutboxEvent::find()
            .filter(outbox_event::Column::TenantId.eq(tenant_id))
            .filter(outbox_event::Column::Status.eq(OutboxStatus::Processing))
            .count(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        if in_flight > 0 {
            txn.rollback().await.map_err(ServiceError::db_error)?;
            return Ok(None);
        }

        let mut query = OutboxEvent::find()
            .filter(outbox_event::Column::TenantId.eq(tenant_id))
            .filter(
                Condition::any()
                    .add(outbox_event::Column::Status.eq(OutboxStatus::Pending))
                    .add(
                        Condition::all()
                            .add(outbox_event::Column::Status.eq(OutboxStatus::Failed))
                            .add(outbox_event::Column::NextAttemptAt.lte(now)),
                    ),
            )
            .order_by_asc(outbox_event::Column::ReceivedAt)
            .order_by_asc(outbox_event::Column::DeviceSeq)
            .limit(1);
        if txn.get_database_backend() == DbBackend::Postgres {
            query = query.lock_with_behavior(LockType::Update, LockBehavior::SkipLocked);
        }

        let Some(event) = query.one(&txn).await.map_err(ServiceError::db_error)? else {
            txn.rollback().await.map_err(ServiceError::db_error)?;
            return Ok(None);
        };

        let attempt = event.attempt_count + 1;
        let mut active: outbox_event::ActiveModel = event.into();
        active.status = Set(OutboxStatus::Processing);
        active.attempt_count = Set(attempt);
        active.claimed_at = Set(Some(now));
        active.updated_at = Set(now);
        let claimed = active.update(&txn).await.map_err(ServiceError::db_error)?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        debug!(event_id = %claimed.id, attempt, "event claimed");
        Ok(Some(claimed))
    }

    /// Returns `processing` claims older than the lease to `pending`.
    #[instrument(skip(self))]
    pub async fn reset_stale_claims(&self, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let lease = chrono::Duration::from_std(self.policy.lease)
            .unwrap_or_else(|_| chrono::Duration::seconds(300));
        let cutoff = now - lease;
        let result = OutboxEvent::update_many()
            .col_expr(
                outbox_event::Column::Status,
                Expr::value(OutboxStatus::Pending.as_str()),
            )
            .col_expr(outbox_event::Column::UpdatedAt, Expr::value(now))
            .filter(outbox_event::Column::Status.eq(OutboxStatus::Processing))
            .filter(outbox_event::Column::ClaimedAt.lt(cutoff))
            .exec(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected > 0 {
            warn!(count = result.rows_affected, "reset stale processing claims");
            counter!("posting_engine.events.stale_claims_reset", result.rows_affected);
        }
        Ok(result.rows_affected)
    }

    pub async fn mark_processed<C>(conn: &C, event_id: Uuid, now: DateTime<Utc>) -> Result<(), DbErr>
    where
        C: ConnectionTrait,
    {
        Self::set_status(conn, event_id, OutboxStatus::Processed, None, Some(now), now).await
    }

    pub async fn mark_held<C>(
        conn: &C,
        event_id: Uuid,
        reason: &HoldReason,
        now: DateTime<Utc>,
    ) -> Result<(), DbErr>
    where
        C: ConnectionTrait,
    {
        let message = format!("{}: {}", reason.code(), reason);
        Self::set_status(conn, event_id, OutboxStatus::Held, Some(message), None, now).await
    }

    pub async fn mark_dead<C>(
        conn: &C,
        event_id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DbErr>
    where
        C: ConnectionTrait,
    {
        Self::set_status(
            conn,
            event_id,
            OutboxStatus::Dead,
            Some(reason.to_string()),
            None,
            now,
        )
        .await
    }

    pub(crate) async fn set_status<C>(
        conn: &C,
        event_id: Uuid,
        status: OutboxStatus,
        last_error: Option<String>,
        processed_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<(), DbErr>
    where
        C: ConnectionTrait,
    {
        let mut update = OutboxEvent::update_many()
            .col_expr(outbox_event::Column::Status, Expr::value(status.as_str()))
            .col_expr(outbox_event::Column::LastError, Expr::value(last_error))
            .col_expr(outbox_event::Column::NextAttemptAt, Expr::value(Option::<DateTime<Utc>>::None))
            .col_expr(outbox_event::Column::UpdatedAt, Expr::value(now));
        if let Some(at) = processed_at {
            update = update.col_expr(outbox_event::Column::ProcessedAt, Expr::value(at));
        }
        update
            .filter(outbox_event::Column::Id.eq(event_id))
            .exec(conn)
            .await?;
        Ok(())
    }

    /// Records a transient failure: schedules a retry, or gives up once the
    /// attempt ceiling is reached. Returns the new status.
    pub async fn record_failure<C>(
        conn: &C,
        event: &outbox_event::Model,
        error: &str,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<(OutboxStatus, Option<DateTime<Utc>>), DbErr>
    where
        C: ConnectionTrait,
    {
        if event.attempt_count >= policy.max_attempts {
            let reason = format!("max attempts ({}) reached: {error}", policy.max_attempts);
            Self::mark_dead(conn, event.id, &reason, now).await?;
            return Ok((OutboxStatus::Dead, None));
        }

        let delay = next_retry_delay(event.id, event.attempt_count, policy.base_secs, policy.cap_secs);
        let next_at = now
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(0));
        OutboxEvent::update_many()
            .col_expr(
                outbox_event::Column::Status,
                Expr::value(OutboxStatus::Failed.as_str()),
            )
            .col_expr(outbox_event::Column::LastError, Expr::value(error.to_string()))
            .col_expr(outbox_event::Column::NextAttemptAt, Expr::value(next_at))
            .col_expr(outbox_event::Column::UpdatedAt, Expr::value(now))
            .filter(outbox_event::Column::Id.eq(event.id))
            .exec(conn)
            .await?;
        Ok((OutboxStatus::Failed, Some(next_at)))
    }

    /// Puts a `dead` or `failed` event back in line with a fresh attempt count.
    #[instrument(skip(self, note))]
    pub async fn requeue(
        &self,
        event_id: Uuid,
        actor: &str,
        note: Option<String>,
    ) -> Result<outbox_event::Model, ServiceError> {
        let actor = actor.to_string();
        with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                let event = OutboxEvent::find_by_id(event_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound(format!("event {event_id}")))?;

                match event.status {
                    OutboxStatus::Dead | OutboxStatus::Failed => {}
                    OutboxStatus::Held => {
                        return Err(ServiceError::InvalidOperation(
                            "held events are released through their exception".into(),
                        ))
                    }
                    other => {
                        return Err(ServiceError::InvalidOperation(format!(
                            "cannot requeue an event in status {}",
                            other.as_str()
                        )))
                    }
                }

                // A dead outcome may have been recorded by the guard; forget it
                // so the replay is applied rather than short-circuited.
                processed_event::Entity::delete_many()
                    .filter(processed_event::Column::DeviceId.eq(event.device_id.as_str()))
                    .filter(processed_event::Column::DeviceSeq.eq(event.device_seq))
                    .filter(
                        processed_event::Column::Outcome
                            .eq(processed_event::ProcessedOutcome::Dead),
                    )
                    .exec(txn)
                    .await?;

                let now = Utc::now();
                exception_action::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    exception_id: Set(None),
                    event_id: Set(event.id),
                    action: Set(ExceptionActionKind::Requeue),
                    actor: Set(actor.clone()),
                    note: Set(note),
                    created_at: Set(now),
                }
                .insert(txn)
                .await?;

                let mut active: outbox_event::ActiveModel = event.into();
                active.status = Set(OutboxStatus::Pending);
                active.attempt_count = Set(0);
                active.next_attempt_at = Set(None);
                active.claimed_at = Set(None);
                active.last_error = Set(None);
                active.updated_at = Set(now);
                let updated = active.update(txn).await?;

                info!(event_id = %updated.id, actor = %actor, "event requeued");
                counter!("posting_engine.events.requeued", 1);
                Ok(updated)
            })
        })
        .await
    }

    pub async fn get(&self, event_id: Uuid) -> Result<outbox_event::Model, ServiceError> {
        OutboxEvent::find_by_id(event_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("event {event_id}")))
    }

    pub async fn list(
        &self,
        tenant_id: Uuid,
        status: Option<OutboxStatus>,
        limit: u64,
    ) -> Result<Vec<outbox_event::Model>, ServiceError> {
        let mut query =
            OutboxEvent::find().filter(outbox_event::Column::TenantId.eq(tenant_id));
        if let Some(status) = status {
            query = query.filter(outbox_event::Column::Status.eq(status));
        }
        query
            .order_by_asc(outbox_event::Column::ReceivedAt)
            .limit(limit)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Count of events per status, optionally for one tenant.
    pub async fn status_histogram(
        &self,
        tenant_id: Option<Uuid>,
    ) -> Result<BTreeMap<String, u64>, ServiceError> {
        let mut query = OutboxEvent::find()
            .select_only()
            .column(outbox_event::Column::Status)
            .column_as(Expr::col(outbox_event::Column::Id).count(), "count")
            .group_by(outbox_event::Column::Status);
        if let Some(tenant_id) = tenant_id {
            query = query.filter(outbox_event::Column::TenantId.eq(tenant_id));
        }
        let rows: Vec<(String, i64)> = query
            .into_tuple()
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(rows
            .into_iter()
            .map(|(status, count)| (status, count.max(0) as u64))
            .collect())
    }

    /// Tenants with at least one event due now.
    pub async fn tenants_with_work(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, ServiceError> {
        OutboxEvent::find()
            .select_only()
            .column(outbox_event::Column::TenantId)
            .distinct()
            .filter(
                Condition::any()
                    .add(outbox_event::Column::Status.eq(OutboxStatus::Pending))
                    .add(
                        Condition::all()
                            .add(outbox_event::Column::Status.eq(OutboxStatus::Failed))
                            .add(outbox_event::Column::NextAttemptAt.lte(now)),
                    ),
            )
            .into_tuple::<Uuid>()
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let id = Uuid::new_v4();
        let first = next_retry_delay(id, 1, 2, 300);
        assert!(first.as_secs() <= 1, "first retry is ~1s, got {first:?}");

        let fourth = next_retry_delay(id, 4, 2, 300);
        assert!(fourth.as_secs() >= 8 && fourth.as_secs() <= 9);

        let late = next_retry_delay(id, 30, 2, 300);
        assert_eq!(late.as_secs(), 300);
    }

    #[test]
    fn jitter_is_deterministic_per_event_and_attempt() {
        let id = Uuid::new_v4();
        assert_eq!(next_retry_delay(id, 7, 2, 300), next_retry_delay(id, 7, 2, 300));
        for attempt in 1..12 {
            let base = 2u64.pow((attempt - 1) as u32).min(300);
            let window = (base / 5).min(30);
            let delay = next_retry_delay(id, attempt, 2, 300).as_secs();
            assert!(delay >= base && delay <= (base + window).min(300));
        }
    }

    #[test]
    fn status_terminality() {
        assert!(OutboxStatus::Processed.is_terminal());
        assert!(OutboxStatus::Held.is_terminal());
        assert!(OutboxStatus::Dead.is_terminal());
        assert!(!OutboxStatus::Failed.is_terminal());
        assert!(!OutboxStatus::Processing.is_terminal());
    }
}
