mod common;

use assert_matches::assert_matches;
use chrono::NaiveDate;
use common::{business_date, cash_sale, event, TestApp, RATE};
use posting_engine::config::ShortagePolicy;
use posting_engine::domain::money::from_storage;
use posting_engine::entities::document::{DocumentStatus, DocumentType};
use posting_engine::entities::outbox_event::{self, OutboxStatus};
use posting_engine::entities::processed_event::{self, ProcessedOutcome};
use posting_engine::entities::{customer, inventory_batch, pos_shift};
use posting_engine::services::posting::ApplyOutcome;
use rstest::rstest;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use serde_json::json;
use uuid::Uuid;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

async fn next(app: &TestApp) -> ApplyOutcome {
    app.state
        .worker()
        .engine()
        .process_next(app.fx.official)
        .await
        .unwrap()
        .expect("an event was due")
}

#[tokio::test]
async fn cash_sale_posts_invoice_stock_and_balanced_journal() {
    let app = TestApp::new().await;
    let lot = app
        .lot(app.fx.official, app.fx.item_a, "L1", Some(date(2027, 1, 1)), dec!(10), dec!(4))
        .await;

    let acks = app.submit(vec![cash_sale(42, "A", dec!(2), dec!(10))]).await;
    let event_id = acks[0].event_id;
    assert!(!acks[0].duplicate);

    let outcome = next(&app).await;
    let document_id = assert_matches!(
        outcome,
        ApplyOutcome::Posted { document_id, journal_entry_id: Some(_), .. } => document_id
    );

    let view = app.state.documents.get(document_id).await.unwrap();
    let doc = &view.document;
    assert_eq!(doc.source_event_id, event_id);
    assert_eq!(doc.doc_type, DocumentType::Invoice);
    assert_eq!(doc.status, DocumentStatus::Posted);
    assert_eq!(doc.company_id, app.fx.official);
    assert_eq!(doc.doc_date, business_date());
    assert_eq!(doc.warehouse_id, Some(app.fx.warehouse));
    assert_eq!(from_storage(doc.subtotal_usd), dec!(20));
    assert_eq!(from_storage(doc.tax_usd), dec!(2.2));
    assert_eq!(from_storage(doc.total_usd), dec!(22.2));
    assert_eq!(from_storage(doc.total_lbp), dec!(1986900));
    assert_eq!(from_storage(doc.cost_usd), dec!(8));

    assert_eq!(view.payments.len(), 1);
    assert_eq!(from_storage(view.payments[0].amount_usd), dec!(22.2));

    assert_eq!(view.stock_moves.len(), 1);
    assert_eq!(view.stock_moves[0].batch_id, Some(lot));
    assert_eq!(from_storage(view.stock_moves[0].qty_out), dec!(2));
    assert_eq!(app.on_hand(lot).await, dec!(8));

    let journal = view.journal.expect("journal posted");
    let sum = |f: fn(&posting_engine::entities::journal_line::Model) -> Decimal| {
        journal.lines.iter().map(|l| from_storage(f(l))).sum::<Decimal>()
    };
    assert_eq!(sum(|l| l.debit_usd), sum(|l| l.credit_usd));
    assert_eq!(sum(|l| l.debit_lbp), sum(|l| l.credit_lbp));
    assert_eq!(sum(|l| l.debit_usd), dec!(30.2));
    let roles: Vec<&str> = journal.lines.iter().map(|l| l.role_code.as_str()).collect();
    for role in ["CASH", "SALES", "VAT_PAYABLE", "COGS", "INVENTORY"] {
        assert!(roles.contains(&role), "missing {role} in {roles:?}");
    }

    let stored = app.event(event_id).await;
    assert_eq!(stored.status, OutboxStatus::Processed);
    assert!(stored.processed_at.is_some());
}

#[tokio::test]
async fn duplicate_submission_is_acknowledged_not_stored() {
    let app = TestApp::new().await;
    app.lot(app.fx.official, app.fx.item_a, "L1", None, dec!(10), dec!(4))
        .await;

    let first = app.submit(vec![cash_sale(7, "A", dec!(1), dec!(10))]).await;
    let second = app.submit(vec![cash_sale(7, "A", dec!(1), dec!(10))]).await;
    assert!(second[0].duplicate);
    assert_eq!(second[0].event_id, first[0].event_id);

    let report = app.drain().await;
    assert_eq!(report.posted, 1);

    let again = app.submit(vec![cash_sale(7, "A", dec!(1), dec!(10))]).await;
    assert!(again[0].duplicate);
    assert_eq!(again[0].status, OutboxStatus::Processed);
    assert_eq!(
        app.state.documents.count_for_company(app.fx.official).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn reclaimed_event_is_replayed_without_a_second_document() {
    let app = TestApp::new().await;
    let lot = app
        .lot(app.fx.official, app.fx.item_a, "L1", None, dec!(10), dec!(4))
        .await;
    let acks = app.submit(vec![cash_sale(1, "A", dec!(3), dec!(10))]).await;
    assert_matches!(next(&app).await, ApplyOutcome::Posted { .. });

    // A worker that died after commit but before acking leaves the row claimable.
    let stored = app.event(acks[0].event_id).await;
    let mut active: outbox_event::ActiveModel = stored.into();
    active.status = Set(OutboxStatus::Pending);
    active.update(&*app.state.db).await.unwrap();

    assert_matches!(
        next(&app).await,
        ApplyOutcome::Replayed { outcome: ProcessedOutcome::Processed, document_id: Some(_), .. }
    );
    assert_eq!(app.event(acks[0].event_id).await.status, OutboxStatus::Processed);
    assert_eq!(app.on_hand(lot).await, dec!(7));
    assert_eq!(
        app.state.documents.count_for_company(app.fx.official).await.unwrap(),
        1
    );
    let guards = processed_event::Entity::find()
        .filter(processed_event::Column::DeviceSeq.eq(1))
        .count(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(guards, 1);
}

#[tokio::test]
async fn earliest_expiry_is_consumed_first() {
    let app = TestApp::new().await;
    let late = app
        .lot(app.fx.official, app.fx.item_a, "LATE", Some(date(2026, 12, 1)), dec!(5), dec!(4))
        .await;
    let early = app
        .lot(app.fx.official, app.fx.item_a, "EARLY", Some(date(2026, 6, 1)), dec!(3), dec!(4))
        .await;

    app.submit(vec![cash_sale(1, "A", dec!(4), dec!(10))]).await;
    assert_eq!(app.drain().await.posted, 1);

    assert_eq!(app.on_hand(early).await, Decimal::ZERO);
    assert_eq!(app.on_hand(late).await, dec!(4));
}

#[tokio::test]
async fn quarantined_lot_is_skipped() {
    let app = TestApp::new().await;
    let late = app
        .lot(app.fx.official, app.fx.item_a, "LATE", Some(date(2026, 12, 1)), dec!(5), dec!(4))
        .await;
    let early = app
        .lot(app.fx.official, app.fx.item_a, "EARLY", Some(date(2026, 6, 1)), dec!(3), dec!(4))
        .await;
    app.state
        .allocator
        .quarantine(early, "damaged carton")
        .await
        .unwrap();

    app.submit(vec![cash_sale(1, "A", dec!(2), dec!(10))]).await;
    assert_eq!(app.drain().await.posted, 1);

    assert_eq!(app.on_hand(early).await, dec!(3));
    assert_eq!(app.on_hand(late).await, dec!(3));
}

#[tokio::test]
async fn shortage_holds_without_touching_stock() {
    let app = TestApp::new().await;
    let lot = app
        .lot(app.fx.official, app.fx.item_a, "L1", None, dec!(2), dec!(4))
        .await;
    let acks = app.submit(vec![cash_sale(1, "A", dec!(5), dec!(10))]).await;

    let exception_id = assert_matches!(
        next(&app).await,
        ApplyOutcome::Held { reason_code, exception_id, .. } if reason_code == "INVENTORY_SHORTAGE" => exception_id
    );
    assert_eq!(app.on_hand(lot).await, dec!(2));
    assert!(app.state.documents.by_event(acks[0].event_id).await.unwrap().is_none());
    assert_eq!(app.event(acks[0].event_id).await.status, OutboxStatus::Held);

    // Restock and release: the event posts on the next pass.
    app.lot(app.fx.official, app.fx.item_a, "L2", None, dec!(10), dec!(4))
        .await;
    app.state
        .exceptions
        .release(exception_id, "ops@example.com", Some("restocked".into()))
        .await
        .unwrap();
    assert_eq!(app.drain().await.posted, 1);
    assert_eq!(app.event(acks[0].event_id).await.status, OutboxStatus::Processed);
}

#[tokio::test]
async fn cart_only_one_company_sells_is_invoiced_there() {
    let app = TestApp::new().await;
    let lot = app
        .lot(app.fx.unofficial, app.fx.item_u, "U1", None, dec!(5), dec!(3))
        .await;
    let acks = app.submit(vec![cash_sale(1, "U", dec!(1), dec!(10))]).await;
    assert_eq!(app.drain().await.posted, 1);

    let view = app
        .state
        .documents
        .by_event(acks[0].event_id)
        .await
        .unwrap()
        .expect("document");
    assert_eq!(view.document.company_id, app.fx.unofficial);
    assert_eq!(view.document.origin_company_id, app.fx.official);
    assert_eq!(view.journal.expect("journal").entry.company_id, app.fx.unofficial);
    assert_eq!(app.on_hand(lot).await, dec!(4));
}

#[tokio::test]
async fn forcing_an_unlinked_company_is_ambiguous() {
    let app = TestApp::new().await;
    let stranger = Uuid::new_v4();
    app.submit(vec![event(
        1,
        "sale",
        json!({
            "lines": [{ "sku": "A", "qty": 1, "unit_price_usd": 10 }],
            "payment": "cash",
            "company": stranger.to_string(),
        }),
    )])
    .await;

    assert_matches!(
        next(&app).await,
        ApplyOutcome::Held { reason_code, .. } if reason_code == "AMBIGUOUS_COMPANY"
    );
}

#[tokio::test]
async fn item_missing_from_every_catalog_is_held() {
    let app = TestApp::new().await;
    app.submit(vec![cash_sale(1, "NOPE", dec!(1), dec!(10))]).await;
    assert_matches!(
        next(&app).await,
        ApplyOutcome::Held { reason_code, .. } if reason_code == "ITEM_NOT_FOUND"
    );
}

#[rstest]
#[case::unknown_type(event(1, "teleport", json!({})))]
#[case::malformed_payload(event(1, "sale", json!({ "lines": "none" })))]
#[case::negative_quantity(cash_sale(1, "A", dec!(-1), dec!(10)))]
#[case::oversized_return_quantity(event(
    1,
    "return",
    json!({ "lines": [{ "sku": "A", "qty": "1000000000000000000000000", "unit_price_usd": 10 }] }),
))]
#[case::oversized_price(cash_sale(1, "A", dec!(1), dec!(100000000000)))]
#[tokio::test]
async fn invalid_events_go_dead(#[case] wire: posting_engine::services::event_store::WireEvent) {
    let app = TestApp::new().await;
    let acks = app.submit(vec![wire]).await;

    assert_matches!(next(&app).await, ApplyOutcome::Dead { .. });
    let stored = app.event(acks[0].event_id).await;
    assert_eq!(stored.status, OutboxStatus::Dead);
    assert!(stored.last_error.is_some());
}

#[tokio::test]
async fn out_of_range_line_dies_and_the_worker_keeps_draining() {
    let app = TestApp::new().await;
    app.lot(app.fx.official, app.fx.item_a, "L1", None, dec!(5), dec!(4))
        .await;
    let acks = app
        .submit(vec![
            event(
                1,
                "return",
                json!({ "lines": [{ "sku": "A", "qty": "1000000000000000000000000", "unit_price_usd": 10 }] }),
            ),
            cash_sale(2, "A", dec!(1), dec!(10)),
        ])
        .await;

    let report = app.drain().await;
    assert_eq!(report.dead, 1);
    assert_eq!(report.posted, 1);
    assert_eq!(app.event(acks[0].event_id).await.status, OutboxStatus::Dead);
    assert_eq!(app.event(acks[1].event_id).await.status, OutboxStatus::Processed);
}

#[tokio::test]
async fn backorder_policy_posts_past_empty_lots() {
    let app = TestApp::with_config(|cfg| {
        cfg.posting.shortage_policy = ShortagePolicy::Backorder;
    })
    .await;
    let lot = app
        .lot(app.fx.official, app.fx.item_a, "L1", None, dec!(1), dec!(4))
        .await;

    app.submit(vec![cash_sale(1, "A", dec!(3), dec!(10))]).await;
    let document_id = assert_matches!(
        next(&app).await,
        ApplyOutcome::Posted { document_id, journal_entry_id: Some(_), .. } => document_id
    );

    let view = app.state.documents.get(document_id).await.unwrap();
    assert_eq!(view.stock_moves.len(), 2);
    let from_lot = view
        .stock_moves
        .iter()
        .find(|m| m.batch_id == Some(lot))
        .expect("lot move");
    assert_eq!(from_storage(from_lot.qty_out), dec!(1));
    let backordered = view
        .stock_moves
        .iter()
        .find(|m| m.batch_id.is_none())
        .expect("backorder move");
    assert_eq!(from_storage(backordered.qty_out), dec!(2));
    // Backordered units are costed at the catalog standard cost.
    assert_eq!(from_storage(view.document.cost_usd), dec!(12));
    assert_eq!(app.on_hand(lot).await, Decimal::ZERO);
}

#[tokio::test]
async fn backorder_with_no_stock_at_all_leaves_no_lot_behind() {
    let app = TestApp::with_config(|cfg| {
        cfg.posting.shortage_policy = ShortagePolicy::Backorder;
    })
    .await;

    let acks = app.submit(vec![cash_sale(1, "A", dec!(2), dec!(10))]).await;
    assert_eq!(app.drain().await.posted, 1);

    let view = app
        .state
        .documents
        .by_event(acks[0].event_id)
        .await
        .unwrap()
        .expect("invoice");
    assert_eq!(view.stock_moves.len(), 1);
    assert_eq!(view.stock_moves[0].batch_id, None);
    assert_eq!(from_storage(view.stock_moves[0].qty_out), dec!(2));

    // Nothing is conjured into a negative lot.
    let lots = inventory_batch::Entity::find()
        .all(&*app.state.db)
        .await
        .unwrap();
    assert!(lots.is_empty());
}

#[tokio::test]
async fn sale_on_account_raises_customer_balance_and_due_date() {
    let app = TestApp::new().await;
    app.lot(app.fx.official, app.fx.item_a, "L1", None, dec!(20), dec!(4))
        .await;
    let on_account = |seq: i64, qty: Decimal| {
        event(
            seq,
            "sale",
            json!({
                "lines": [{ "sku": "A", "qty": qty, "unit_price_usd": 10 }],
                "customer_id": app.fx.customer,
            }),
        )
    };

    let acks = app.submit(vec![on_account(1, dec!(5))]).await;
    assert_matches!(next(&app).await, ApplyOutcome::Posted { .. });

    let view = app
        .state
        .documents
        .by_event(acks[0].event_id)
        .await
        .unwrap()
        .expect("document");
    assert_eq!(view.document.due_date, Some(date(2026, 3, 12)));
    let customer = customer::Entity::find_by_id(app.fx.customer)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(from_storage(customer.credit_balance_usd), dec!(55.5));

    // 55.50 + 55.50 breaches the $100 limit.
    app.submit(vec![on_account(2, dec!(5))]).await;
    assert_matches!(
        next(&app).await,
        ApplyOutcome::Held { reason_code, .. } if reason_code == "CREDIT_LIMIT_EXCEEDED"
    );
}

#[tokio::test]
async fn shift_close_compares_counted_cash_with_expected() {
    let app = TestApp::new().await;
    app.lot(app.fx.official, app.fx.item_a, "L1", None, dec!(10), dec!(4))
        .await;
    let shift_id = Uuid::new_v4();

    app.submit(vec![
        event(
            1,
            "shift_open",
            json!({ "shift_id": shift_id, "opening_cash_usd": 50, "cashier_id": "maya" }),
        ),
        event(
            2,
            "sale",
            json!({
                "lines": [{ "sku": "A", "qty": 2, "unit_price_usd": 10 }],
                "payment": "cash",
                "shift_id": shift_id,
            }),
        ),
        event(
            3,
            "cash_movement",
            json!({ "shift_id": shift_id, "movement_type": "paid_out", "amount_usd": 5 }),
        ),
        event(
            4,
            "shift_close",
            json!({ "shift_id": shift_id, "closing_cash_usd": 67, "closing_cash_lbp": 1986900 }),
        ),
    ])
    .await;
    assert_eq!(app.drain().await.posted, 4);

    let shift = pos_shift::Entity::find_by_id(shift_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .expect("shift row");
    assert_eq!(shift.status, pos_shift::ShiftStatus::Closed);
    assert_eq!(shift.expected_cash_usd.map(from_storage), Some(dec!(67.2)));
    assert_eq!(shift.variance_usd.map(from_storage), Some(dec!(-0.2)));
    assert_eq!(shift.variance_lbp.map(from_storage), Some(dec!(0)));
}

#[tokio::test]
async fn transfer_moves_lots_between_warehouses() {
    let app = TestApp::new().await;
    let source = app
        .lot(app.fx.official, app.fx.item_a, "T1", Some(date(2026, 9, 1)), dec!(6), dec!(4))
        .await;
    let acks = app
        .submit(vec![event(
            1,
            "transfer",
            json!({
                "from_warehouse_id": app.fx.warehouse,
                "to_warehouse_id": app.fx.back_store,
                "lines": [{ "sku": "A", "qty": 4 }],
            }),
        )])
        .await;
    assert_matches!(next(&app).await, ApplyOutcome::Posted { journal_entry_id: None, .. });

    assert_eq!(app.on_hand(source).await, dec!(2));
    let view = app
        .state
        .documents
        .by_event(acks[0].event_id)
        .await
        .unwrap()
        .expect("document");
    assert_eq!(view.document.doc_type, DocumentType::StockMove);
    let inbound = view
        .stock_moves
        .iter()
        .find(|m| m.warehouse_id == app.fx.back_store)
        .expect("inbound move");
    assert_eq!(from_storage(inbound.qty_in), dec!(4));
    let mirrored = app.lot_row(inbound.batch_id.expect("lot")).await;
    assert_eq!(mirrored.batch_no.as_deref(), Some("T1"));
    assert_eq!(mirrored.expiry_date, Some(date(2026, 9, 1)));
}

#[tokio::test]
async fn return_restocks_and_refunds() {
    let app = TestApp::new().await;
    let lot = app
        .lot(app.fx.official, app.fx.item_a, "R1", None, dec!(1), dec!(4))
        .await;
    let acks = app
        .submit(vec![event(
            1,
            "return",
            json!({
                "lines": [{ "sku": "A", "qty": 1, "unit_price_usd": 10, "batch_id": lot }],
                "refund_method": "cash",
            }),
        )])
        .await;
    assert_matches!(next(&app).await, ApplyOutcome::Posted { journal_entry_id: Some(_), .. });

    assert_eq!(app.on_hand(lot).await, dec!(2));
    let view = app
        .state
        .documents
        .by_event(acks[0].event_id)
        .await
        .unwrap()
        .expect("document");
    assert_eq!(view.document.doc_type, DocumentType::Return);
    assert_eq!(from_storage(view.document.total_usd), dec!(11.1));
    assert_eq!(from_storage(view.document.total_lbp), dec!(11.1) * RATE);
}
