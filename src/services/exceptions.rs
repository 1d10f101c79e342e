//! Exception surface: held events waiting for an operator decision.
//!
//! Every hold, release and reject is appended to `exception_actions`. A
//! release hands the event back to the queue with a fresh attempt count;
//! nothing here retries an event on its own.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::{lock_tenant, with_transaction};
use crate::domain::hold::HoldReason;
use crate::entities::exception_action::{self, ExceptionActionKind};
use crate::entities::exception_item::{self, Entity as ExceptionItem, ExceptionStatus};
use crate::entities::outbox_event::{self, Entity as OutboxEvent, OutboxStatus};
use crate::errors::ServiceError;
use crate::services::event_store::EventStore;
use crate::services::tenant_locks::TenantLocks;
use crate::services::{documents, idempotency};

pub const SYSTEM_ACTOR: &str = "system";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExceptionFilter {
    pub tenant_id: Option<Uuid>,
    pub status: Option<ExceptionStatus>,
    pub reason_code: Option<String>,
    pub limit: Option<u64>,
}

async fn log_action<C>(
    conn: &C,
    exception_id: Option<Uuid>,
    event_id: Uuid,
    action: ExceptionActionKind,
    actor: &str,
    note: Option<String>,
    now: DateTime<Utc>,
) -> Result<(), DbErr>
where
    C: ConnectionTrait,
{
    exception_action::ActiveModel {
        id: Set(Uuid::new_v4()),
        exception_id: Set(exception_id),
        event_id: Set(event_id),
        action: Set(action),
        actor: Set(actor.to_string()),
        note: Set(note),
        created_at: Set(now),
    }
    .insert(conn)
    .await?;
    Ok(())
}

#[derive(Clone)]
pub struct ExceptionService {
    db: Arc<DatabaseConnection>,
    locks: TenantLocks,
}

impl ExceptionService {
    pub fn new(db: Arc<DatabaseConnection>, locks: TenantLocks) -> Self {
        Self { db, locks }
    }

    /// Opens an exception for a held event. Runs inside the caller's transaction.
    pub async fn open_hold<C>(
        conn: &C,
        event: &outbox_event::Model,
        company_id: Uuid,
        document_id: Option<Uuid>,
        reason: &HoldReason,
        now: DateTime<Utc>,
    ) -> Result<exception_item::Model, DbErr>
    where
        C: ConnectionTrait,
    {
        let item = exception_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(event.tenant_id),
            company_id: Set(reason.company_id().unwrap_or(company_id)),
            event_id: Set(event.id),
            document_id: Set(document_id),
            reason_code: Set(reason.code().to_string()),
            details: Set(reason.details()),
            status: Set(ExceptionStatus::Open),
            created_at: Set(now),
            resolved_at: Set(None),
            resolved_by: Set(None),
            resolution_note: Set(None),
        }
        .insert(conn)
        .await?;

        log_action(
            conn,
            Some(item.id),
            event.id,
            ExceptionActionKind::Hold,
            SYSTEM_ACTOR,
            Some(reason.to_string()),
            now,
        )
        .await?;
        Ok(item)
    }

    pub async fn get(&self, id: Uuid) -> Result<exception_item::Model, ServiceError> {
        ExceptionItem::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("exception {id}")))
    }

    pub async fn list(
        &self,
        filter: &ExceptionFilter,
    ) -> Result<Vec<exception_item::Model>, ServiceError> {
        let mut query = ExceptionItem::find().order_by_asc(exception_item::Column::CreatedAt);
        if let Some(tenant_id) = filter.tenant_id {
            query = query.filter(exception_item::Column::TenantId.eq(tenant_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(exception_item::Column::Status.eq(status));
        }
        if let Some(code) = filter.reason_code.as_deref() {
            query = query.filter(exception_item::Column::ReasonCode.eq(code));
        }
        Ok(query
            .limit(filter.limit.unwrap_or(100).min(1000))
            .all(&*self.db)
            .await?)
    }

    /// Open exceptions per reason code.
    pub async fn open_counts(
        &self,
        tenant_id: Option<Uuid>,
    ) -> Result<BTreeMap<String, u64>, ServiceError> {
        let mut query = ExceptionItem::find()
            .select_only()
            .column(exception_item::Column::ReasonCode)
            .column_as(Expr::col(exception_item::Column::Id).count(), "count")
            .filter(exception_item::Column::Status.eq(ExceptionStatus::Open))
            .group_by(exception_item::Column::ReasonCode);
        if let Some(tenant_id) = tenant_id {
            query = query.filter(exception_item::Column::TenantId.eq(tenant_id));
        }
        let rows: Vec<(String, i64)> = query.into_tuple().all(&*self.db).await?;
        Ok(rows
            .into_iter()
            .map(|(code, count)| (code, count.max(0) as u64))
            .collect())
    }

    pub async fn actions(
        &self,
        exception_id: Uuid,
    ) -> Result<Vec<exception_action::Model>, ServiceError> {
        Ok(exception_action::Entity::find()
            .filter(exception_action::Column::ExceptionId.eq(exception_id))
            .order_by_asc(exception_action::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Returns the held event to the queue. For a match variance the release
    /// is the approval: the draft is discarded and the next attempt posts it.
    #[instrument(skip(self, note))]
    pub async fn release(
        &self,
        exception_id: Uuid,
        actor: &str,
        note: Option<String>,
    ) -> Result<exception_item::Model, ServiceError> {
        let actor = require_actor(actor)?;
        let tenant_id = self.get(exception_id).await?.tenant_id;
        let _guard = self.locks.acquire(tenant_id).await;

        let released = with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                lock_tenant(txn, tenant_id).await?;
                let (item, event) = load_open(txn, exception_id).await?;
                let now = Utc::now();

                idempotency::forget(txn, &event.device_id, event.device_seq).await?;
                let approve_variance = item.reason_code == "MATCH_VARIANCE";
                if approve_variance {
                    documents::discard_draft(txn, event.id).await?;
                }

                let event_id = event.id;
                let mut active: outbox_event::ActiveModel = event.into();
                active.status = Set(OutboxStatus::Pending);
                active.attempt_count = Set(0);
                active.next_attempt_at = Set(None);
                active.claimed_at = Set(None);
                active.last_error = Set(None);
                if approve_variance {
                    active.variance_approved = Set(true);
                }
                active.updated_at = Set(now);
                active.update(txn).await?;

                let updated = resolve(txn, item, ExceptionStatus::Released, &actor, note.clone(), now)
                    .await?;
                log_action(
                    txn,
                    Some(updated.id),
                    event_id,
                    ExceptionActionKind::Release,
                    &actor,
                    note,
                    now,
                )
                .await?;
                Ok::<_, ServiceError>(updated)
            })
        })
        .await?;

        info!(exception_id = %released.id, event_id = %released.event_id, reason = %released.reason_code, "exception released");
        counter!("posting_engine.exceptions.released", 1);
        Ok(released)
    }

    /// Gives up on a held event: it becomes `dead` and is never applied.
    #[instrument(skip(self, note))]
    pub async fn reject(
        &self,
        exception_id: Uuid,
        actor: &str,
        note: Option<String>,
    ) -> Result<exception_item::Model, ServiceError> {
        let actor = require_actor(actor)?;
        let tenant_id = self.get(exception_id).await?.tenant_id;
        let _guard = self.locks.acquire(tenant_id).await;

        let rejected = with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                lock_tenant(txn, tenant_id).await?;
                let (item, event) = load_open(txn, exception_id).await?;
                let now = Utc::now();

                documents::discard_draft(txn, event.id).await?;
                idempotency::mark_dead(txn, &event, &item.reason_code, now).await?;
                let reason = format!("rejected by {actor}: {}", item.reason_code);
                EventStore::mark_dead(txn, event.id, &reason, now).await?;

                let updated = resolve(txn, item, ExceptionStatus::Rejected, &actor, note.clone(), now)
                    .await?;
                log_action(
                    txn,
                    Some(updated.id),
                    event.id,
                    ExceptionActionKind::Reject,
                    &actor,
                    note,
                    now,
                )
                .await?;
                Ok::<_, ServiceError>(updated)
            })
        })
        .await?;

        info!(exception_id = %rejected.id, event_id = %rejected.event_id, "exception rejected");
        counter!("posting_engine.exceptions.rejected", 1);
        Ok(rejected)
    }
}

fn require_actor(actor: &str) -> Result<String, ServiceError> {
    let actor = actor.trim();
    if actor.is_empty() {
        return Err(ServiceError::ValidationError("actor is required".into()));
    }
    Ok(actor.to_string())
}

async fn load_open<C>(
    conn: &C,
    exception_id: Uuid,
) -> Result<(exception_item::Model, outbox_event::Model), ServiceError>
where
    C: ConnectionTrait,
{
    let item = ExceptionItem::find_by_id(exception_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("exception {exception_id}")))?;
    if item.status != ExceptionStatus::Open {
        return Err(ServiceError::InvalidOperation(format!(
            "exception {exception_id} is already resolved"
        )));
    }
    let event = OutboxEvent::find_by_id(item.event_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("event {}", item.event_id)))?;
    if event.status != OutboxStatus::Held {
        return Err(ServiceError::Conflict(format!(
            "event {} is {}, not held",
            event.id,
            event.status.as_str()
        )));
    }
    Ok((item, event))
}

async fn resolve<C>(
    conn: &C,
    item: exception_item::Model,
    status: ExceptionStatus,
    actor: &str,
    note: Option<String>,
    now: DateTime<Utc>,
) -> Result<exception_item::Model, DbErr>
where
    C: ConnectionTrait,
{
    let mut active: exception_item::ActiveModel = item.into();
    active.status = Set(status);
    active.resolved_at = Set(Some(now));
    active.resolved_by = Set(Some(actor.to_string()));
    active.resolution_note = Set(note);
    active.update(conn).await
}
