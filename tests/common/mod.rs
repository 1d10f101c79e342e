#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use posting_engine::{
    config::AppConfig,
    db,
    domain::money::from_storage,
    domain::roles::AccountRole,
    entities::{
        account_role_mapping, catalog_item, customer, exchange_rate, inventory_batch,
        inventory_batch::LotStatus, outbox_event, period_lock, pos_device, tax_code,
    },
    services::event_store::{SubmitAck, WireEvent},
    services::tenant_locks::TenantLocks,
    services::worker::DrainReport,
    AppState,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::{json, Value};
use std::sync::Arc;
use strum::IntoEnumIterator;
use tower::ServiceExt;
use uuid::Uuid;

pub const DEVICE: &str = "POS-1";
pub const RATE: Decimal = dec!(89500);

/// Business day every seeded event happens on.
pub fn business_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 2, 10).expect("valid date")
}

pub fn occurred_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 10, 10, 0, 0)
        .single()
        .expect("valid timestamp")
}

/// Ids of the seeded master data.
#[derive(Debug, Clone)]
pub struct Fixture {
    /// Tenant and origin company of `POS-1`.
    pub official: Uuid,
    /// Second company linked to `POS-1`; the only one selling `U`.
    pub unofficial: Uuid,
    pub warehouse: Uuid,
    pub back_store: Uuid,
    /// `A` in the official catalog, $10.00 with 11% VAT, standard cost $4.00.
    pub item_a: Uuid,
    pub item_a_unofficial: Uuid,
    /// `U`, unofficial catalog only.
    pub item_u: Uuid,
    /// Official-company customer with a $100 credit limit.
    pub customer: Uuid,
}

/// In-memory application: migrated SQLite, seeded master data and the full router.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub fx: Fixture,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(tweak: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = AppConfig::new("sqlite::memory:".to_string(), "test".to_string());
        // One connection keeps the in-memory database alive and shared.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.posting.worker_count = 1;
        tweak(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let state = AppState::new(Arc::new(pool), cfg, TenantLocks::new());
        let fx = seed(&state).await;
        let router = posting_engine::handlers::app_router(state.clone());
        Self { router, state, fx }
    }

    pub async fn submit(&self, events: Vec<WireEvent>) -> Vec<SubmitAck> {
        self.state
            .store
            .submit(self.fx.official, events)
            .await
            .expect("submit events")
    }

    /// Runs the worker for the official tenant until nothing is due.
    pub async fn drain(&self) -> DrainReport {
        self.state
            .worker()
            .run_until_idle(Some(self.fx.official), 50)
            .await
            .expect("drain outbox")
    }

    pub async fn event(&self, id: Uuid) -> outbox_event::Model {
        self.state.store.get(id).await.expect("event exists")
    }

    pub async fn lot(
        &self,
        company_id: Uuid,
        item_id: Uuid,
        batch_no: &str,
        expiry: Option<NaiveDate>,
        qty: Decimal,
        unit_cost_usd: Decimal,
    ) -> Uuid {
        let id = Uuid::new_v4();
        inventory_batch::ActiveModel {
            id: Set(id),
            company_id: Set(company_id),
            item_id: Set(item_id),
            warehouse_id: Set(self.fx.warehouse),
            batch_no: Set(Some(batch_no.to_string())),
            expiry_date: Set(expiry),
            received_at: Set(Utc::now()),
            status: Set(LotStatus::Available),
            on_hand_qty: Set(qty),
            unit_cost_usd: Set(unit_cost_usd),
            unit_cost_lbp: Set(unit_cost_usd * RATE),
            status_reason: Set(None),
            updated_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed lot");
        id
    }

    pub async fn lot_row(&self, id: Uuid) -> inventory_batch::Model {
        inventory_batch::Entity::find_by_id(id)
            .one(&*self.state.db)
            .await
            .expect("query lot")
            .expect("lot exists")
    }

    pub async fn on_hand(&self, id: Uuid) -> Decimal {
        from_storage(self.lot_row(id).await.on_hand_qty)
    }

    pub async fn lock_period(&self, company_id: Uuid, start: NaiveDate, end: NaiveDate) -> Uuid {
        let id = Uuid::new_v4();
        period_lock::ActiveModel {
            id: Set(id),
            company_id: Set(company_id),
            start_date: Set(start),
            end_date: Set(end),
            locked: Set(true),
            reason: Set(Some("month end".into())),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed period lock");
        id
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
            }
            None => Body::empty(),
        };
        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }
}

pub async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

pub fn event(seq: i64, event_type: &str, payload: Value) -> WireEvent {
    WireEvent {
        device_id: DEVICE.to_string(),
        device_seq: seq,
        event_type: event_type.to_string(),
        occurred_at: occurred_at(),
        payload,
    }
}

/// Cash sale of `qty` units of `sku` at its catalog price.
pub fn cash_sale(seq: i64, sku: &str, qty: Decimal, price: Decimal) -> WireEvent {
    event(
        seq,
        "sale",
        json!({
            "lines": [{ "sku": sku, "qty": qty, "unit_price_usd": price }],
            "payment": "cash",
        }),
    )
}

async fn seed(state: &AppState) -> Fixture {
    let conn = &*state.db;
    let fx = Fixture {
        official: Uuid::new_v4(),
        unofficial: Uuid::new_v4(),
        warehouse: Uuid::new_v4(),
        back_store: Uuid::new_v4(),
        item_a: Uuid::new_v4(),
        item_a_unofficial: Uuid::new_v4(),
        item_u: Uuid::new_v4(),
        customer: Uuid::new_v4(),
    };

    pos_device::ActiveModel {
        id: Set(DEVICE.to_string()),
        company_id: Set(fx.official),
        linked_company_ids: Set(json!([fx.unofficial.to_string()])),
        warehouse_id: Set(Some(fx.warehouse)),
        is_active: Set(true),
    }
    .insert(conn)
    .await
    .expect("seed device");

    for company in [fx.official, fx.unofficial] {
        for role in AccountRole::iter() {
            account_role_mapping::ActiveModel {
                id: Set(Uuid::new_v4()),
                company_id: Set(company),
                role_code: Set(role.to_string()),
                account_id: Set(Uuid::new_v4()),
                account_code: Set(format!("{role}-{}", &company.to_string()[..4])),
            }
            .insert(conn)
            .await
            .expect("seed account role");
        }

        exchange_rate::ActiveModel {
            id: Set(Uuid::new_v4()),
            company_id: Set(company),
            rate_date: Set(NaiveDate::from_ymd_opt(2026, 1, 1).expect("valid date")),
            rate_type: Set("market".to_string()),
            usd_to_lbp: Set(RATE),
        }
        .insert(conn)
        .await
        .expect("seed exchange rate");
    }

    let vat = Uuid::new_v4();
    tax_code::ActiveModel {
        id: Set(vat),
        company_id: Set(fx.official),
        code: Set("VAT11".to_string()),
        rate: Set(dec!(0.11)),
        is_active: Set(true),
    }
    .insert(conn)
    .await
    .expect("seed tax code");

    let items = [
        (fx.item_a, fx.official, "A", Some(vat)),
        (fx.item_a_unofficial, fx.unofficial, "A", None),
        (fx.item_u, fx.unofficial, "U", None),
    ];
    for (id, company, sku, tax_code_id) in items {
        catalog_item::ActiveModel {
            id: Set(id),
            company_id: Set(company),
            sku: Set(sku.to_string()),
            name: Set(format!("Item {sku}")),
            unit_price_usd: Set(dec!(10)),
            unit_price_lbp: Set(None),
            standard_cost_usd: Set(dec!(4)),
            standard_cost_lbp: Set(Decimal::ZERO),
            tax_code_id: Set(tax_code_id),
            is_active: Set(true),
            updated_at: Set(Utc::now()),
        }
        .insert(conn)
        .await
        .expect("seed catalog item");
    }

    customer::ActiveModel {
        id: Set(fx.customer),
        company_id: Set(fx.official),
        name: Set("Corner Pharmacy".to_string()),
        credit_limit_usd: Set(dec!(100)),
        credit_limit_lbp: Set(Decimal::ZERO),
        credit_balance_usd: Set(Decimal::ZERO),
        credit_balance_lbp: Set(Decimal::ZERO),
        payment_terms_days: Set(30),
        is_active: Set(true),
    }
    .insert(conn)
    .await
    .expect("seed customer");

    fx
}
