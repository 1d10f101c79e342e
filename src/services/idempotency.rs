//! Idempotency guard keyed by `(device_id, device_seq)`.
//!
//! The guard row is written *first* inside the posting transaction. The unique
//! index on the natural key is what enforces at-most-once application: a
//! second writer either blocks until the first commits and then sees the
//! conflict, or finds the committed row on lookup. A conflict is a replay,
//! never an error.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::entities::outbox_event;
use crate::entities::processed_event::{self, Entity as ProcessedEvent, ProcessedOutcome};

/// Result of trying to take the guard for an event.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardClaim {
    /// This transaction owns the natural key from now on.
    Acquired,
    /// The natural key already reached an outcome; nothing may be re-executed.
    AlreadyRecorded(processed_event::Model),
}

pub async fn lookup<C>(
    conn: &C,
    device_id: &str,
    device_seq: i64,
) -> Result<Option<processed_event::Model>, DbErr>
where
    C: ConnectionTrait,
{
    ProcessedEvent::find()
        .filter(processed_event::Column::DeviceId.eq(device_id))
        .filter(processed_event::Column::DeviceSeq.eq(device_seq))
        .one(conn)
        .await
}

/// Inserts the guard row with `outcome` unless the natural key is taken.
pub async fn record<C>(
    conn: &C,
    event: &outbox_event::Model,
    outcome: ProcessedOutcome,
    reason_code: Option<&str>,
    now: DateTime<Utc>,
) -> Result<GuardClaim, DbErr>
where
    C: ConnectionTrait,
{
    let row = processed_event::ActiveModel {
        id: Set(Uuid::new_v4()),
        event_id: Set(event.id),
        tenant_id: Set(event.tenant_id),
        device_id: Set(event.device_id.clone()),
        device_seq: Set(event.device_seq),
        outcome: Set(outcome),
        document_id: Set(None),
        journal_entry_id: Set(None),
        reason_code: Set(reason_code.map(str::to_string)),
        processed_at: Set(now),
    };

    let inserted = ProcessedEvent::insert(row)
        .on_conflict(
            OnConflict::columns([
                processed_event::Column::DeviceId,
                processed_event::Column::DeviceSeq,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;

    if inserted > 0 {
        return Ok(GuardClaim::Acquired);
    }

    lookup(conn, &event.device_id, event.device_seq)
        .await?
        .map(GuardClaim::AlreadyRecorded)
        .ok_or_else(|| {
            DbErr::RecordNotFound(format!(
                "guard row {}:{} vanished after conflict",
                event.device_id, event.device_seq
            ))
        })
}

/// Attaches the produced document and journal to an acquired guard row.
pub async fn link_results<C>(
    conn: &C,
    event: &outbox_event::Model,
    document_id: Option<Uuid>,
    journal_entry_id: Option<Uuid>,
) -> Result<(), DbErr>
where
    C: ConnectionTrait,
{
    ProcessedEvent::update_many()
        .col_expr(processed_event::Column::DocumentId, Expr::value(document_id))
        .col_expr(
            processed_event::Column::JournalEntryId,
            Expr::value(journal_entry_id),
        )
        .filter(processed_event::Column::DeviceId.eq(event.device_id.as_str()))
        .filter(processed_event::Column::DeviceSeq.eq(event.device_seq))
        .exec(conn)
        .await?;
    Ok(())
}

/// Rewrites the outcome of a guard this transaction already owns.
pub async fn set_outcome<C>(
    conn: &C,
    event: &outbox_event::Model,
    outcome: ProcessedOutcome,
    reason_code: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), DbErr>
where
    C: ConnectionTrait,
{
    ProcessedEvent::update_many()
        .col_expr(processed_event::Column::Outcome, Expr::value(outcome.as_str()))
        .col_expr(
            processed_event::Column::ReasonCode,
            Expr::value(reason_code.map(str::to_string)),
        )
        .col_expr(processed_event::Column::ProcessedAt, Expr::value(now))
        .filter(processed_event::Column::DeviceId.eq(event.device_id.as_str()))
        .filter(processed_event::Column::DeviceSeq.eq(event.device_seq))
        .exec(conn)
        .await?;
    Ok(())
}

/// Drops the guard so a released hold can be applied again.
pub async fn forget<C>(conn: &C, device_id: &str, device_seq: i64) -> Result<u64, DbErr>
where
    C: ConnectionTrait,
{
    let result = ProcessedEvent::delete_many()
        .filter(processed_event::Column::DeviceId.eq(device_id))
        .filter(processed_event::Column::DeviceSeq.eq(device_seq))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

/// Converts the guard outcome to `dead`, inserting it if absent.
pub async fn mark_dead<C>(
    conn: &C,
    event: &outbox_event::Model,
    reason_code: &str,
    now: DateTime<Utc>,
) -> Result<(), DbErr>
where
    C: ConnectionTrait,
{
    match record(conn, event, ProcessedOutcome::Dead, Some(reason_code), now).await? {
        GuardClaim::Acquired => Ok(()),
        GuardClaim::AlreadyRecorded(existing) => {
            ProcessedEvent::update_many()
                .col_expr(
                    processed_event::Column::Outcome,
                    Expr::value(ProcessedOutcome::Dead.as_str()),
                )
                .col_expr(
                    processed_event::Column::ReasonCode,
                    Expr::value(reason_code.to_string()),
                )
                .col_expr(processed_event::Column::ProcessedAt, Expr::value(now))
                .filter(processed_event::Column::Id.eq(existing.id))
                .exec(conn)
                .await?;
            Ok(())
        }
    }
}
