mod common;

use assert_matches::assert_matches;
use chrono::NaiveDate;
use common::{business_date, cash_sale, event, TestApp};
use posting_engine::domain::money::from_storage;
use posting_engine::entities::document::{DocumentStatus, DocumentType};
use posting_engine::entities::exception_action::ExceptionActionKind;
use posting_engine::entities::exception_item::ExceptionStatus;
use posting_engine::entities::outbox_event::OutboxStatus;
use posting_engine::entities::period_lock;
use posting_engine::errors::ServiceError;
use posting_engine::services::posting::ApplyOutcome;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::json;
use uuid::Uuid;

async fn next(app: &TestApp) -> ApplyOutcome {
    app.state
        .worker()
        .engine()
        .process_next(app.fx.official)
        .await
        .unwrap()
        .expect("an event was due")
}

async fn post_receipt(app: &TestApp) -> Uuid {
    app.submit(vec![event(
        1,
        "goods_receipt",
        json!({
            "warehouse_id": app.fx.warehouse,
            "lines": [{
                "sku": "A",
                "qty": 10,
                "unit_cost_usd": 4,
                "batch_no": "GR-1",
                "expiry_date": "2027-01-31",
            }],
        }),
    )])
    .await;
    assert_matches!(
        next(app).await,
        ApplyOutcome::Posted { document_id, journal_entry_id: Some(_), .. } => document_id
    )
}

#[tokio::test]
async fn locked_period_holds_until_unlocked_and_released() {
    let app = TestApp::new().await;
    app.lot(app.fx.official, app.fx.item_a, "L1", None, dec!(10), dec!(4))
        .await;
    let lock_id = app
        .lock_period(
            app.fx.official,
            NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 2, 28).unwrap(),
        )
        .await;

    let acks = app.submit(vec![cash_sale(1, "A", dec!(1), dec!(10))]).await;
    let exception_id = assert_matches!(
        next(&app).await,
        ApplyOutcome::Held { reason_code, exception_id, .. } if reason_code == "PERIOD_LOCKED" => exception_id
    );
    let exception = app.state.exceptions.get(exception_id).await.unwrap();
    assert_eq!(exception.status, ExceptionStatus::Open);
    assert_eq!(exception.company_id, app.fx.official);
    assert_eq!(exception.details["date"], json!(business_date()));

    let lock = period_lock::Entity::find_by_id(lock_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    let mut active: period_lock::ActiveModel = lock.into();
    active.locked = Set(false);
    active.update(&*app.state.db).await.unwrap();

    let released = app
        .state
        .exceptions
        .release(exception_id, "controller", None)
        .await
        .unwrap();
    assert_eq!(released.status, ExceptionStatus::Released);
    assert_eq!(released.resolved_by.as_deref(), Some("controller"));

    assert_eq!(app.drain().await.posted, 1);
    assert_eq!(app.event(acks[0].event_id).await.status, OutboxStatus::Processed);

    let actions = app.state.exceptions.actions(exception_id).await.unwrap();
    let kinds: Vec<_> = actions.iter().map(|a| a.action).collect();
    assert_eq!(kinds, vec![ExceptionActionKind::Hold, ExceptionActionKind::Release]);
}

#[tokio::test]
async fn invoice_over_receipt_cost_is_parked_as_draft_then_approved() {
    let app = TestApp::new().await;
    let receipt_id = post_receipt(&app).await;

    let acks = app
        .submit(vec![event(
            2,
            "purchase_invoice",
            json!({
                "receipt_document_id": receipt_id,
                "invoice_no": "SUP-778",
                "lines": [{ "sku": "A", "qty": 10, "unit_cost_usd": 5 }],
                "tax_usd": 5.5,
            }),
        )])
        .await;
    let invoice_event = acks[0].event_id;

    let exception_id = assert_matches!(
        next(&app).await,
        ApplyOutcome::Held { reason_code, exception_id, .. } if reason_code == "MATCH_VARIANCE" => exception_id
    );
    let exception = app.state.exceptions.get(exception_id).await.unwrap();
    let draft_id = exception.document_id.expect("draft kept for review");
    let draft = app.state.documents.get(draft_id).await.unwrap();
    assert_eq!(draft.document.status, DocumentStatus::Draft);
    assert!(draft.journal.is_none());
    assert_eq!(exception.details["variances"][0]["kind"], json!("unit_cost"));

    app.state
        .exceptions
        .release(exception_id, "buyer", Some("price increase agreed".into()))
        .await
        .unwrap();
    assert_eq!(app.event(invoice_event).await.variance_approved, true);
    assert_eq!(app.drain().await.posted, 1);

    let posted = app
        .state
        .documents
        .by_event(invoice_event)
        .await
        .unwrap()
        .expect("posted invoice");
    assert_eq!(posted.document.doc_type, DocumentType::SupplierInvoice);
    assert_eq!(posted.document.status, DocumentStatus::Posted);
    assert_eq!(posted.document.doc_no, "SUP-778");
    assert_eq!(posted.document.reference_document_id, Some(receipt_id));
    assert_eq!(from_storage(posted.document.total_usd), dec!(55.5));
    assert!(posted.journal.is_some());
    assert!(app.state.documents.get(draft_id).await.is_err());
}

#[tokio::test]
async fn matching_invoice_posts_straight_through() {
    let app = TestApp::new().await;
    let receipt_id = post_receipt(&app).await;

    app.submit(vec![event(
        2,
        "purchase_invoice",
        json!({
            "receipt_document_id": receipt_id,
            "lines": [{ "sku": "A", "qty": 10, "unit_cost_usd": 4 }],
            "tax_usd": 4.4,
        }),
    )])
    .await;
    assert_matches!(next(&app).await, ApplyOutcome::Posted { journal_entry_id: Some(_), .. });
}

#[tokio::test]
async fn rejected_exception_kills_the_event() {
    let app = TestApp::new().await;
    let acks = app.submit(vec![cash_sale(1, "A", dec!(1), dec!(10))]).await;
    let exception_id = assert_matches!(
        next(&app).await,
        ApplyOutcome::Held { exception_id, .. } => exception_id
    );

    let rejected = app
        .state
        .exceptions
        .reject(exception_id, "ops", Some("duplicate till".into()))
        .await
        .unwrap();
    assert_eq!(rejected.status, ExceptionStatus::Rejected);
    assert_eq!(app.event(acks[0].event_id).await.status, OutboxStatus::Dead);

    // Resolved exceptions cannot be resolved again.
    assert_matches!(
        app.state.exceptions.release(exception_id, "ops", None).await,
        Err(ServiceError::InvalidOperation(_))
    );
    assert_eq!(app.drain().await.total(), 0);
}

#[tokio::test]
async fn release_requires_an_actor() {
    let app = TestApp::new().await;
    app.submit(vec![cash_sale(1, "A", dec!(1), dec!(10))]).await;
    let exception_id = assert_matches!(
        next(&app).await,
        ApplyOutcome::Held { exception_id, .. } => exception_id
    );
    assert_matches!(
        app.state.exceptions.release(exception_id, "  ", None).await,
        Err(ServiceError::ValidationError(_))
    );
}

#[tokio::test]
async fn dead_event_can_be_requeued() {
    let app = TestApp::new().await;
    let acks = app.submit(vec![event(1, "teleport", json!({}))]).await;
    assert_matches!(next(&app).await, ApplyOutcome::Dead { .. });

    let requeued = app
        .state
        .store
        .requeue(acks[0].event_id, "ops", Some("after fix".into()))
        .await
        .unwrap();
    assert_eq!(requeued.status, OutboxStatus::Pending);
    assert_eq!(requeued.attempt_count, 0);

    // Still invalid, so it dies again rather than replaying the old verdict.
    assert_matches!(next(&app).await, ApplyOutcome::Dead { .. });
}
