mod common;

use chrono::{NaiveDate, Utc};
use common::TestApp;
use posting_engine::domain::money::from_storage;
use posting_engine::entities::document::DocumentType;
use posting_engine::entities::inventory_batch::LotStatus;
use posting_engine::entities::journal_template_line::Side;
use posting_engine::entities::outbox_event::OutboxStatus;
use posting_engine::entities::recurring_journal_rule::{self, Cadence, RuleState};
use posting_engine::entities::{journal_template, journal_template_line};
use posting_engine::services::scheduler::TEMPLATE_INACTIVE;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use uuid::Uuid;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Monthly rent: expense against cash.
async fn seed_rent_rule(app: &TestApp, next_run: NaiveDate, cadence: Cadence) -> (Uuid, Uuid) {
    let db = &*app.state.db;
    let template_id = Uuid::new_v4();
    journal_template::ActiveModel {
        id: Set(template_id),
        company_id: Set(app.fx.official),
        name: Set("Shop rent".into()),
        memo: Set(Some("rent".into())),
        rate_type: Set("market".into()),
        is_active: Set(true),
    }
    .insert(db)
    .await
    .unwrap();

    for (line_no, role, side) in [
        (1, "PURCHASES_EXPENSE", Side::Debit),
        (2, "CASH", Side::Credit),
    ] {
        journal_template_line::ActiveModel {
            id: Set(Uuid::new_v4()),
            template_id: Set(template_id),
            line_no: Set(line_no),
            role_code: Set(role.into()),
            side: Set(side),
            amount_usd: Set(dec!(100)),
            amount_lbp: Set(None),
            memo: Set(None),
        }
        .insert(db)
        .await
        .unwrap();
    }

    let rule_id = Uuid::new_v4();
    recurring_journal_rule::ActiveModel {
        id: Set(rule_id),
        company_id: Set(app.fx.official),
        template_id: Set(template_id),
        cadence: Set(cadence),
        day_of_week: Set(None),
        day_of_month: Set(None),
        next_run_date: Set(next_run),
        state: Set(RuleState::Active),
        paused_reason: Set(None),
        last_run_date: Set(None),
        updated_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .unwrap();
    (template_id, rule_id)
}

async fn rule(app: &TestApp, id: Uuid) -> recurring_journal_rule::Model {
    recurring_journal_rule::Entity::find_by_id(id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn missed_daily_runs_are_caught_up_exactly_once() {
    let app = TestApp::new().await;
    let (_, rule_id) = seed_rent_rule(&app, date(2026, 2, 8), Cadence::Daily).await;

    let report = app.state.scheduler.run_due(date(2026, 2, 10)).await.unwrap();
    assert_eq!(report.enqueued, 3);
    assert_eq!(report.paused, 0);

    let stored = rule(&app, rule_id).await;
    assert_eq!(stored.next_run_date, date(2026, 2, 11));
    assert_eq!(stored.last_run_date, Some(date(2026, 2, 10)));

    // Same day again: nothing new is due.
    let again = app.state.scheduler.run_due(date(2026, 2, 10)).await.unwrap();
    assert_eq!(again.enqueued, 0);

    let drained = app.drain().await;
    assert_eq!(drained.posted, 3);
    let events = app
        .state
        .store
        .list(app.fx.official, Some(OutboxStatus::Processed), 10)
        .await
        .unwrap();
    assert_eq!(events.len(), 3);
    for event in events {
        let view = app
            .state
            .documents
            .by_event(event.id)
            .await
            .unwrap()
            .expect("manual journal");
        assert_eq!(view.document.doc_type, DocumentType::ManualJournal);
        let journal = view.journal.expect("journal");
        assert_eq!(journal.lines.len(), 2);
        let debit: Decimal = journal.lines.iter().map(|l| from_storage(l.debit_lbp)).sum();
        assert_eq!(debit, dec!(8950000));
    }
}

#[tokio::test]
async fn locked_run_dates_are_deferred_not_posted() {
    let app = TestApp::new().await;
    let (_, rule_id) = seed_rent_rule(&app, date(2026, 2, 9), Cadence::Daily).await;
    app.lock_period(app.fx.official, date(2026, 2, 9), date(2026, 2, 9))
        .await;

    let report = app.state.scheduler.run_due(date(2026, 2, 10)).await.unwrap();
    assert_eq!(report.deferred, 1);
    assert_eq!(report.enqueued, 1);
    assert_eq!(rule(&app, rule_id).await.next_run_date, date(2026, 2, 11));
}

#[tokio::test]
async fn inactive_template_pauses_the_rule() {
    let app = TestApp::new().await;
    let (template_id, rule_id) = seed_rent_rule(&app, date(2026, 2, 1), Cadence::Monthly).await;

    let template = journal_template::Entity::find_by_id(template_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    let mut active: journal_template::ActiveModel = template.into();
    active.is_active = Set(false);
    active.update(&*app.state.db).await.unwrap();

    let report = app.state.scheduler.run_due(date(2026, 2, 10)).await.unwrap();
    assert_eq!(report.enqueued, 0);
    assert_eq!(report.paused, 1);

    let paused = rule(&app, rule_id).await;
    assert_eq!(paused.state, RuleState::Paused);
    assert_eq!(paused.paused_reason.as_deref(), Some(TEMPLATE_INACTIVE));

    // Reactivation is refused while the template stays inactive.
    assert!(app
        .state
        .scheduler
        .set_state(rule_id, RuleState::Active)
        .await
        .is_err());
}

#[tokio::test]
async fn expiry_sweep_writes_off_expired_lots() {
    let app = TestApp::new().await;
    let expired = app
        .lot(app.fx.official, app.fx.item_a, "OLD", Some(date(2026, 2, 1)), dec!(2), dec!(4))
        .await;
    let fresh = app
        .lot(app.fx.official, app.fx.item_a, "NEW", Some(date(2026, 12, 1)), dec!(5), dec!(4))
        .await;

    let enqueued = app
        .state
        .scheduler
        .enqueue_expiry_sweeps(date(2026, 2, 10))
        .await
        .unwrap();
    assert_eq!(enqueued, 1);
    // A second sweep on the same day is the same event.
    assert_eq!(
        app.state
            .scheduler
            .enqueue_expiry_sweeps(date(2026, 2, 10))
            .await
            .unwrap(),
        0
    );

    assert_eq!(app.drain().await.posted, 1);

    let lot = app.lot_row(expired).await;
    assert_eq!(lot.status, LotStatus::Expired);
    assert_eq!(from_storage(lot.on_hand_qty), Decimal::ZERO);
    assert_eq!(app.on_hand(fresh).await, dec!(5));

    let events = app
        .state
        .store
        .list(app.fx.official, Some(OutboxStatus::Processed), 10)
        .await
        .unwrap();
    let view = app
        .state
        .documents
        .by_event(events[0].id)
        .await
        .unwrap()
        .expect("adjustment");
    assert_eq!(view.document.doc_type, DocumentType::InventoryAdjustment);
    assert_eq!(from_storage(view.document.cost_usd), dec!(8));
    let journal = view.journal.expect("shrinkage journal");
    assert!(journal.lines.iter().any(|l| l.role_code == "SHRINKAGE"));
}
