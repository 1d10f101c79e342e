//! The posting engine: one claimed event in, one transaction out.
//!
//! Inside the transaction the guard row is written first, then the event is
//! resolved, stock is moved, the document is built and persisted and its
//! journal posted. Any failure rolls all of it back; the outcome (retry, hold
//! or dead) is then recorded in a second, small transaction.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, NaiveDate, Utc};
use metrics::{counter, histogram};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, Set, TransactionTrait,
};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::PostingConfig;
use crate::db::lock_tenant;
use crate::domain::document::DocumentDraft;
use crate::domain::event::{CompanySelector, EventPayload, EventType, PaymentMethod};
use crate::domain::hold::HoldReason;
use crate::domain::money::{from_storage, DualAmount};
use crate::entities::document::{self, DocumentStatus, DocumentType};
use crate::entities::outbox_event::{self, OutboxStatus};
use crate::entities::pos_shift::{self, ShiftStatus};
use crate::entities::processed_event::ProcessedOutcome;
use crate::entities::{
    catalog_item, customer, document_line, document_payment, inventory_batch, journal_template,
    journal_template_line,
};
use crate::errors::{Disposition, PostingError, ServiceError};
use crate::services::allocator::{InboundLot, InventoryAllocator, StockRequest};
use crate::services::document_builder::{
    self, DocContext, ExpiredLot, InboundEffect, LineStock, MatchTolerance, ReceiptLineView,
    ResolvedRefs, ShiftTotals, TemplateView,
};
use crate::services::documents::{self, Provenance};
use crate::services::event_store::{EventStore, RetryPolicy};
use crate::services::exceptions::ExceptionService;
use crate::services::idempotency::{self, GuardClaim};
use crate::services::ledger::LedgerPoster;
use crate::services::resolver::{resolve_company, DeviceContext, Resolver};

const JOURNAL_PREFIX: &str = "JE";

/// What applying one event amounted to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ApplyOutcome {
    Posted {
        event_id: Uuid,
        document_id: Uuid,
        journal_entry_id: Option<Uuid>,
    },
    Held {
        event_id: Uuid,
        reason_code: String,
        exception_id: Uuid,
    },
    Dead {
        event_id: Uuid,
        reason: String,
    },
    Retry {
        event_id: Uuid,
        attempt: i32,
        next_attempt_at: Option<DateTime<Utc>>,
        error: String,
    },
    /// The natural key had already reached an outcome; nothing was executed.
    Replayed {
        event_id: Uuid,
        outcome: ProcessedOutcome,
        document_id: Option<Uuid>,
        journal_entry_id: Option<Uuid>,
    },
}

impl ApplyOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ApplyOutcome::Posted { .. } => "posted",
            ApplyOutcome::Held { .. } => "held",
            ApplyOutcome::Dead { .. } => "dead",
            ApplyOutcome::Retry { .. } => "retry",
            ApplyOutcome::Replayed { .. } => "replayed",
        }
    }
}

/// Everything gathered for an event before the document is built.
struct Prepared {
    payload: EventPayload,
    company_id: Uuid,
    rate: Decimal,
    refs: ResolvedRefs,
    stock: Vec<LineStock>,
}

#[derive(Clone)]
pub struct PostingEngine {
    db: Arc<DatabaseConnection>,
    store: EventStore,
    resolver: Resolver,
    allocator: InventoryAllocator,
    ledger: LedgerPoster,
    tolerance: MatchTolerance,
    policy: RetryPolicy,
}

impl PostingEngine {
    pub fn new(db: Arc<DatabaseConnection>, cfg: &PostingConfig) -> Self {
        let policy = RetryPolicy::from(cfg);
        Self {
            store: EventStore::new(db.clone(), policy),
            resolver: Resolver::new(cfg.default_rate_type.clone()),
            allocator: InventoryAllocator::new(db.clone(), cfg.shortage_policy),
            ledger: LedgerPoster::new(cfg.usd_tolerance, cfg.lbp_tolerance),
            tolerance: MatchTolerance {
                qty_pct: cfg.match_qty_tolerance_pct,
                cost_pct: cfg.match_cost_tolerance_pct,
                tax: cfg.match_tax_tolerance,
            },
            policy,
            db,
        }
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub fn allocator(&self) -> &InventoryAllocator {
        &self.allocator
    }

    /// Claims and applies the next due event of a tenant, if any.
    pub async fn process_next(&self, tenant_id: Uuid) -> Result<Option<ApplyOutcome>, ServiceError> {
        match self.store.claim_next(tenant_id, Utc::now()).await? {
            Some(event) => Ok(Some(self.apply(event).await?)),
            None => Ok(None),
        }
    }

    /// Applies a claimed event and records its outcome.
    #[instrument(skip(self, event), fields(event_id = %event.id, tenant_id = %event.tenant_id, event_type = %event.event_type))]
    pub async fn apply(&self, event: outbox_event::Model) -> Result<ApplyOutcome, ServiceError> {
        let started = Instant::now();
        let txn = self.db.begin().await?;
        let result = self.execute_in(&txn, &event).await;

        let outcome = match result {
            Ok(outcome) => match txn.commit().await {
                Ok(()) => outcome,
                Err(err) => {
                    self.settle_failure(&event, PostingError::from(err)).await?
                }
            },
            Err(err) => {
                txn.rollback().await?;
                self.settle_failure(&event, err).await?
            }
        };

        histogram!(
            "posting_engine.posting.duration",
            started.elapsed().as_secs_f64()
        );
        match &outcome {
            ApplyOutcome::Posted { document_id, .. } => {
                counter!("posting_engine.events.processed", 1);
                info!(document_id = %document_id, "event posted");
            }
            ApplyOutcome::Held { reason_code, .. } => {
                counter!("posting_engine.events.held", 1);
                warn!(reason = %reason_code, "event held");
            }
            ApplyOutcome::Dead { reason, .. } => {
                counter!("posting_engine.events.dead", 1);
                error!(reason = %reason, "event dead");
            }
            ApplyOutcome::Retry { attempt, error, .. } => {
                counter!("posting_engine.events.retried", 1);
                warn!(attempt, error = %error, "event will be retried");
            }
            ApplyOutcome::Replayed { outcome, .. } => {
                counter!("posting_engine.events.replayed", 1);
                debug!(outcome = outcome.as_str(), "event already applied");
            }
        }
        Ok(outcome)
    }

    async fn settle_failure(
        &self,
        event: &outbox_event::Model,
        err: PostingError,
    ) -> Result<ApplyOutcome, ServiceError> {
        let now = Utc::now();
        let txn = self.db.begin().await?;
        let code = err.code();
        let outcome = match err {
            PostingError::Hold(reason) => {
                if let GuardClaim::AlreadyRecorded(existing) = idempotency::record(
                    &txn,
                    event,
                    ProcessedOutcome::Held,
                    Some(code),
                    now,
                )
                .await?
                {
                    warn!(outcome = existing.outcome.as_str(), "guard present while holding");
                }
                let exception =
                    ExceptionService::open_hold(&txn, event, event.tenant_id, None, &reason, now)
                        .await?;
                EventStore::mark_held(&txn, event.id, &reason, now).await?;
                ApplyOutcome::Held {
                    event_id: event.id,
                    reason_code: code.to_string(),
                    exception_id: exception.id,
                }
            }
            err if err.disposition() == Disposition::Dead => {
                let reason = err.to_string();
                idempotency::mark_dead(&txn, event, code, now).await?;
                EventStore::mark_dead(&txn, event.id, &reason, now).await?;
                ApplyOutcome::Dead {
                    event_id: event.id,
                    reason,
                }
            }
            err => {
                let message = err.to_string();
                let (status, next_at) =
                    EventStore::record_failure(&txn, event, &message, &self.policy, now).await?;
                if status == OutboxStatus::Dead {
                    idempotency::mark_dead(&txn, event, code, now).await?;
                    ApplyOutcome::Dead {
                        event_id: event.id,
                        reason: message,
                    }
                } else {
                    ApplyOutcome::Retry {
                        event_id: event.id,
                        attempt: event.attempt_count,
                        next_attempt_at: next_at,
                        error: message,
                    }
                }
            }
        };
        txn.commit().await?;
        Ok(outcome)
    }

    async fn execute_in(
        &self,
        txn: &DatabaseTransaction,
        event: &outbox_event::Model,
    ) -> Result<ApplyOutcome, PostingError> {
        let now = Utc::now();
        lock_tenant(txn, event.tenant_id).await?;

        if let GuardClaim::AlreadyRecorded(existing) =
            idempotency::record(txn, event, ProcessedOutcome::Processed, None, now).await?
        {
            let (status, note) = match existing.outcome {
                ProcessedOutcome::Processed => (OutboxStatus::Processed, None),
                ProcessedOutcome::Held => (OutboxStatus::Held, existing.reason_code.clone()),
                ProcessedOutcome::Dead => (OutboxStatus::Dead, existing.reason_code.clone()),
            };
            let processed_at = (status == OutboxStatus::Processed).then_some(now);
            EventStore::set_status(txn, event.id, status, note, processed_at, now).await?;
            return Ok(ApplyOutcome::Replayed {
                event_id: event.id,
                outcome: existing.outcome,
                document_id: existing.document_id,
                journal_entry_id: existing.journal_entry_id,
            });
        }

        let event_type = EventType::parse(&event.event_type)?;
        let payload = EventPayload::decode(event_type, &event.payload)?;
        let device = self.resolver.device(txn, event.tenant_id, &event.device_id).await?;
        let doc_date = payload.business_date(event.occurred_at);

        let prepared = self.prepare(txn, event, &device, payload, doc_date).await?;
        let ctx = DocContext {
            event_id: event.id,
            company_id: prepared.company_id,
            origin_company_id: device.origin_company_id,
            doc_date,
            exchange_rate: prepared.rate,
        };
        let draft = document_builder::build(&ctx, &prepared.payload, &prepared.refs, &prepared.stock)?;

        let provenance = Provenance {
            source_event_id: event.id,
            origin_company_id: device.origin_company_id,
            device_id: &event.device_id,
        };

        if let Some(reason) = draft.hold.clone() {
            return self
                .park_draft(txn, event, &draft, &provenance, reason, now)
                .await;
        }

        let journal = if draft.has_ledger_impact() {
            let roles = self.resolver.account_roles(txn, draft.company_id).await?;
            self.ledger.post(&draft, &roles)?
        } else {
            None
        };

        let doc_no =
            documents::assign_doc_no(txn, draft.company_id, draft.doc_type, draft.doc_no.as_deref())
                .await?;
        let doc = documents::persist(txn, &draft, &provenance, &doc_no).await?;
        let entry_id = match journal {
            Some(journal) => {
                let journal_no = documents::next_doc_no(txn, draft.company_id, JOURNAL_PREFIX).await?;
                Some(LedgerPoster::persist(txn, doc.id, &journal_no, &journal).await?.id)
            }
            None => None,
        };

        self.apply_side_effects(txn, event, &prepared, &draft, now).await?;

        idempotency::link_results(txn, event, Some(doc.id), entry_id).await?;
        EventStore::mark_processed(txn, event.id, now).await?;
        Ok(ApplyOutcome::Posted {
            event_id: event.id,
            document_id: doc.id,
            journal_entry_id: entry_id,
        })
    }

    /// Keeps the draft for review; no stock or journal effect.
    async fn park_draft(
        &self,
        txn: &DatabaseTransaction,
        event: &outbox_event::Model,
        draft: &DocumentDraft,
        provenance: &Provenance<'_>,
        reason: HoldReason,
        now: DateTime<Utc>,
    ) -> Result<ApplyOutcome, PostingError> {
        let doc_no =
            documents::assign_doc_no(txn, draft.company_id, draft.doc_type, draft.doc_no.as_deref())
                .await?;
        let doc = documents::persist(txn, draft, provenance, &doc_no).await?;
        idempotency::set_outcome(txn, event, ProcessedOutcome::Held, Some(reason.code()), now)
            .await?;
        idempotency::link_results(txn, event, Some(doc.id), None).await?;
        let exception =
            ExceptionService::open_hold(txn, event, draft.company_id, Some(doc.id), &reason, now)
                .await?;
        EventStore::mark_held(txn, event.id, &reason, now).await?;
        Ok(ApplyOutcome::Held {
            event_id: event.id,
            reason_code: reason.code().to_string(),
            exception_id: exception.id,
        })
    }

    async fn prepare(
        &self,
        txn: &DatabaseTransaction,
        event: &outbox_event::Model,
        device: &DeviceContext,
        mut payload: EventPayload,
        doc_date: NaiveDate,
    ) -> Result<Prepared, PostingError> {
        let skus = payload.skus();
        let origin = device.origin_company_id;

        let company_id = match &payload {
            EventPayload::Sale(p) => self.pick_company(txn, device, p.company, &skus).await?,
            EventPayload::Return(p) => self.pick_company(txn, device, p.company, &skus).await?,
            _ => origin,
        };

        let mut refs = ResolvedRefs {
            tolerance: self.tolerance,
            variance_approved: event.variance_approved,
            ..ResolvedRefs::default()
        };

        let template = match &payload {
            EventPayload::JournalTemplateRun(p) => {
                Some(load_template(txn, company_id, p.template_id).await?)
            }
            _ => None,
        };

        let rate = match &payload {
            EventPayload::Sale(p) => {
                self.resolver
                    .exchange_rate(txn, company_id, doc_date, None, p.exchange_rate)
                    .await?
            }
            EventPayload::Return(p) => {
                self.resolver
                    .exchange_rate(txn, company_id, doc_date, None, p.exchange_rate)
                    .await?
            }
            EventPayload::GoodsReceipt(p) => {
                self.resolver
                    .exchange_rate(txn, company_id, doc_date, None, p.exchange_rate)
                    .await?
            }
            EventPayload::PurchaseInvoice(p) => {
                self.resolver
                    .exchange_rate(txn, company_id, doc_date, None, p.exchange_rate)
                    .await?
            }
            EventPayload::PriceChange(_) => {
                self.resolver
                    .exchange_rate(txn, company_id, doc_date, None, None)
                    .await?
            }
            EventPayload::JournalTemplateRun(_) => {
                let rate_type = template.as_ref().map(|(t, _)| t.rate_type.as_str());
                self.resolver
                    .exchange_rate(txn, company_id, doc_date, rate_type, None)
                    .await?
            }
            // Amounts arrive in both currencies or at lot cost.
            EventPayload::ShiftOpen(_)
            | EventPayload::ShiftClose(_)
            | EventPayload::CashMovement(_)
            | EventPayload::Transfer(_)
            | EventPayload::ExpirySweep(_) => self.optional_rate(txn, company_id, doc_date).await?,
        };

        if posts_to_ledger(payload.event_type()) {
            self.resolver
                .assert_period_open(txn, company_id, doc_date)
                .await?;
        }

        if !skus.is_empty() {
            refs.items = self.resolver.items(txn, company_id, &skus, rate).await?;
        }

        let customer_id = match &payload {
            EventPayload::Sale(p) => p.customer_id,
            EventPayload::Return(p) => p.customer_id,
            _ => None,
        };
        if let Some(customer_id) = customer_id {
            refs.customer = Some(self.resolver.customer(txn, customer_id).await?);
        }

        let mut stock = Vec::new();
        match &mut payload {
            EventPayload::Sale(p) => {
                p.warehouse_id = p.warehouse_id.or(device.warehouse_id);
                let warehouse_id = p
                    .warehouse_id
                    .ok_or_else(|| PostingError::validation("sale requires warehouse_id"))?;
                for line in &p.lines {
                    let item = &refs.items[&line.sku];
                    let picks = self
                        .allocator
                        .allocate_and_deduct(
                            txn,
                            &StockRequest {
                                company_id,
                                item_id: item.id,
                                sku: &line.sku,
                                warehouse_id,
                                qty: line.qty,
                                batch_no: line.batch_no.as_deref(),
                                standard_cost: item.standard_cost,
                            },
                        )
                        .await?;
                    stock.push(LineStock {
                        outbound: picks,
                        inbound: Vec::new(),
                    });
                }
            }
            EventPayload::Return(p) => {
                p.warehouse_id = p.warehouse_id.or(device.warehouse_id);
                let warehouse_id = p
                    .warehouse_id
                    .ok_or_else(|| PostingError::validation("return requires warehouse_id"))?;
                for line in &p.lines {
                    let item = &refs.items[&line.sku];
                    let unit_cost = line
                        .unit_cost_usd
                        .map(|usd| DualAmount::from_usd(usd, rate))
                        .unwrap_or(item.standard_cost);
                    let (batch_id, cost) = InventoryAllocator::restock(
                        txn,
                        line.batch_id,
                        &InboundLot {
                            company_id,
                            item_id: item.id,
                            warehouse_id,
                            batch_no: None,
                            expiry_date: None,
                            qty: line.qty,
                            unit_cost,
                        },
                    )
                    .await?;
                    stock.push(LineStock {
                        outbound: Vec::new(),
                        inbound: vec![InboundEffect {
                            batch_id,
                            warehouse_id,
                            qty: line.qty,
                            unit_cost: cost,
                        }],
                    });
                }
            }
            EventPayload::ShiftOpen(p) => {
                if pos_shift::Entity::find_by_id(p.shift_id).one(txn).await?.is_some() {
                    return Err(PostingError::validation(format!(
                        "shift {} already exists",
                        p.shift_id
                    )));
                }
            }
            EventPayload::ShiftClose(p) => {
                refs.shift = shift_totals(txn, company_id, p.shift_id).await?;
            }
            EventPayload::CashMovement(_) | EventPayload::PriceChange(_) => {}
            EventPayload::Transfer(p) => {
                for line in &p.lines {
                    let item = &refs.items[&line.sku];
                    let picks = InventoryAllocator::allocate_strict(
                        txn,
                        &StockRequest {
                            company_id,
                            item_id: item.id,
                            sku: &line.sku,
                            warehouse_id: p.from_warehouse_id,
                            qty: line.qty,
                            batch_no: None,
                            standard_cost: item.standard_cost,
                        },
                    )
                    .await?;
                    let mut inbound = Vec::with_capacity(picks.len());
                    for pick in &picks {
                        let source = match pick.batch_id {
                            Some(id) => inventory_batch::Entity::find_by_id(id).one(txn).await?,
                            None => None,
                        };
                        let batch_id = InventoryAllocator::receive(
                            txn,
                            &InboundLot {
                                company_id,
                                item_id: item.id,
                                warehouse_id: p.to_warehouse_id,
                                batch_no: source.as_ref().and_then(|l| l.batch_no.as_deref()),
                                expiry_date: source.as_ref().and_then(|l| l.expiry_date),
                                qty: pick.qty,
                                unit_cost: pick.unit_cost,
                            },
                        )
                        .await?;
                        inbound.push(InboundEffect {
                            batch_id,
                            warehouse_id: p.to_warehouse_id,
                            qty: pick.qty,
                            unit_cost: pick.unit_cost,
                        });
                    }
                    stock.push(LineStock {
                        outbound: picks,
                        inbound,
                    });
                }
            }
            EventPayload::GoodsReceipt(p) => {
                for line in &p.lines {
                    let item = &refs.items[&line.sku];
                    let unit_cost =
                        DualAmount::normalize(Some(line.unit_cost_usd), line.unit_cost_lbp, rate);
                    let batch_id = InventoryAllocator::receive(
                        txn,
                        &InboundLot {
                            company_id,
                            item_id: item.id,
                            warehouse_id: p.warehouse_id,
                            batch_no: line.batch_no.as_deref(),
                            expiry_date: line.expiry_date,
                            qty: line.qty,
                            unit_cost,
                        },
                    )
                    .await?;
                    stock.push(LineStock {
                        outbound: Vec::new(),
                        inbound: vec![InboundEffect {
                            batch_id,
                            warehouse_id: p.warehouse_id,
                            qty: line.qty,
                            unit_cost,
                        }],
                    });
                }
            }
            EventPayload::PurchaseInvoice(p) => {
                refs.receipt = receipt_lines(txn, company_id, p.receipt_document_id).await?;
            }
            EventPayload::JournalTemplateRun(_) => {
                if let Some((template, lines)) = template {
                    if !template.is_active {
                        return Err(PostingError::validation(format!(
                            "journal template {} is inactive",
                            template.id
                        )));
                    }
                    refs.template = Some(TemplateView {
                        name: template.name,
                        memo: template.memo,
                        lines,
                    });
                }
            }
            EventPayload::ExpirySweep(p) => {
                let lots = InventoryAllocator::expired_lots(txn, company_id, p.as_of).await?;
                for lot in &lots {
                    InventoryAllocator::write_off(txn, lot, &format!("expired {}", p.as_of)).await?;
                    refs.expired.push(ExpiredLot {
                        lot_id: lot.id,
                        item_id: lot.item_id,
                        warehouse_id: lot.warehouse_id,
                        batch_no: lot.batch_no.clone(),
                        qty: from_storage(lot.on_hand_qty),
                        unit_cost: DualAmount::from_storage(lot.unit_cost_usd, lot.unit_cost_lbp),
                    });
                }
            }
        }

        Ok(Prepared {
            payload,
            company_id,
            rate,
            refs,
            stock,
        })
    }

    async fn pick_company(
        &self,
        txn: &DatabaseTransaction,
        device: &DeviceContext,
        selector: CompanySelector,
        skus: &[String],
    ) -> Result<Uuid, PostingError> {
        let views = self.resolver.catalog_views(txn, &device.companies, skus).await?;
        let decision = resolve_company(selector, device.origin_company_id, &views, skus)?;
        debug!(company_id = %decision.company_id, rule = ?decision.rule, "company resolved");
        Ok(decision.into_result()?)
    }

    /// Rate for documents whose amounts need no conversion; zero when unknown.
    async fn optional_rate(
        &self,
        txn: &DatabaseTransaction,
        company_id: Uuid,
        date: NaiveDate,
    ) -> Result<Decimal, PostingError> {
        match self
            .resolver
            .exchange_rate(txn, company_id, date, None, None)
            .await
        {
            Ok(rate) => Ok(rate),
            Err(PostingError::Hold(HoldReason::MissingExchangeRate { .. })) => Ok(Decimal::ZERO),
            Err(err) => Err(err),
        }
    }

    async fn apply_side_effects(
        &self,
        txn: &DatabaseTransaction,
        event: &outbox_event::Model,
        prepared: &Prepared,
        draft: &DocumentDraft,
        now: DateTime<Utc>,
    ) -> Result<(), PostingError> {
        let company_id = prepared.company_id;

        // Credit balances move only for customers of the posting company.
        if let Some(customer) = prepared.refs.customer.as_ref() {
            if customer.company_id == company_id {
                let delta = match &prepared.payload {
                    EventPayload::Sale(_) => draft.on_account(),
                    EventPayload::Return(p) if p.refund_method == PaymentMethod::Credit => {
                        DualAmount::ZERO - draft.total
                    }
                    _ => DualAmount::ZERO,
                };
                if !delta.is_zero() {
                    customer::Entity::update_many()
                        .col_expr(
                            customer::Column::CreditBalanceUsd,
                            Expr::col(customer::Column::CreditBalanceUsd).add(delta.usd),
                        )
                        .col_expr(
                            customer::Column::CreditBalanceLbp,
                            Expr::col(customer::Column::CreditBalanceLbp).add(delta.lbp),
                        )
                        .filter(customer::Column::Id.eq(customer.id))
                        .exec(txn)
                        .await?;
                }
            } else {
                debug!(customer_id = %customer.id, %company_id, "customer belongs to another company; balance untouched");
            }
        }

        match &prepared.payload {
            EventPayload::ShiftOpen(p) => {
                pos_shift::ActiveModel {
                    id: Set(p.shift_id),
                    company_id: Set(company_id),
                    device_id: Set(event.device_id.clone()),
                    cashier_id: Set(p.cashier_id.clone()),
                    status: Set(ShiftStatus::Open),
                    opened_at: Set(event.occurred_at),
                    closed_at: Set(None),
                    opening_cash_usd: Set(p.opening_cash_usd),
                    opening_cash_lbp: Set(p.opening_cash_lbp),
                    closing_cash_usd: Set(None),
                    closing_cash_lbp: Set(None),
                    expected_cash_usd: Set(None),
                    expected_cash_lbp: Set(None),
                    variance_usd: Set(None),
                    variance_lbp: Set(None),
                    notes: Set(None),
                }
                .insert(txn)
                .await?;
            }
            EventPayload::ShiftClose(p) => {
                let expected = prepared
                    .refs
                    .shift
                    .map(|s| s.expected())
                    .unwrap_or(DualAmount::ZERO);
                let closing = DualAmount::new(p.closing_cash_usd, p.closing_cash_lbp);
                let variance = closing - expected;
                if let Some(shift) = pos_shift::Entity::find_by_id(p.shift_id).one(txn).await? {
                    let mut active: pos_shift::ActiveModel = shift.into();
                    active.status = Set(ShiftStatus::Closed);
                    active.closed_at = Set(Some(event.occurred_at));
                    active.closing_cash_usd = Set(Some(closing.usd));
                    active.closing_cash_lbp = Set(Some(closing.lbp));
                    active.expected_cash_usd = Set(Some(expected.usd));
                    active.expected_cash_lbp = Set(Some(expected.lbp));
                    active.variance_usd = Set(Some(variance.usd));
                    active.variance_lbp = Set(Some(variance.lbp));
                    active.notes = Set(p.notes.clone());
                    active.update(txn).await?;
                }
            }
            EventPayload::PriceChange(p) => {
                for line in &p.lines {
                    let mut update = catalog_item::Entity::update_many()
                        .col_expr(
                            catalog_item::Column::UnitPriceUsd,
                            Expr::value(line.unit_price_usd),
                        )
                        .col_expr(catalog_item::Column::UpdatedAt, Expr::value(now));
                    if let Some(lbp) = line.unit_price_lbp {
                        update = update.col_expr(catalog_item::Column::UnitPriceLbp, Expr::value(lbp));
                    }
                    update
                        .filter(catalog_item::Column::CompanyId.eq(company_id))
                        .filter(catalog_item::Column::Sku.eq(line.sku.as_str()))
                        .exec(txn)
                        .await?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

fn posts_to_ledger(event_type: EventType) -> bool {
    matches!(
        event_type,
        EventType::Sale
            | EventType::Return
            | EventType::GoodsReceipt
            | EventType::PurchaseInvoice
            | EventType::JournalTemplateRun
            | EventType::ExpirySweep
    )
}

async fn load_template(
    txn: &DatabaseTransaction,
    company_id: Uuid,
    template_id: Uuid,
) -> Result<(journal_template::Model, Vec<journal_template_line::Model>), PostingError> {
    let template = journal_template::Entity::find_by_id(template_id)
        .filter(journal_template::Column::CompanyId.eq(company_id))
        .one(txn)
        .await?
        .ok_or_else(|| PostingError::validation(format!("journal template {template_id} not found")))?;
    let lines = journal_template_line::Entity::find()
        .filter(journal_template_line::Column::TemplateId.eq(template_id))
        .all(txn)
        .await?
        .into_iter()
        .map(|mut line| {
            line.amount_usd = from_storage(line.amount_usd);
            line.amount_lbp = line.amount_lbp.map(from_storage);
            line
        })
        .collect();
    Ok((template, lines))
}

/// Cash the drawer should hold at close, from the shift's posted documents.
async fn shift_totals(
    txn: &DatabaseTransaction,
    company_id: Uuid,
    shift_id: Uuid,
) -> Result<Option<ShiftTotals>, PostingError> {
    let Some(shift) = pos_shift::Entity::find_by_id(shift_id)
        .filter(pos_shift::Column::CompanyId.eq(company_id))
        .filter(pos_shift::Column::Status.eq(ShiftStatus::Open))
        .one(txn)
        .await?
    else {
        return Ok(None);
    };

    let docs = document::Entity::find()
        .filter(document::Column::CompanyId.eq(company_id))
        .filter(document::Column::ShiftId.eq(shift_id))
        .filter(document::Column::Status.eq(DocumentStatus::Posted))
        .filter(document::Column::DocType.is_in([
            DocumentType::Invoice,
            DocumentType::Return,
            DocumentType::CashMovement,
        ]))
        .all(txn)
        .await?;

    let mut totals = ShiftTotals {
        opening: DualAmount::from_storage(shift.opening_cash_usd, shift.opening_cash_lbp),
        ..ShiftTotals::default()
    };
    if docs.is_empty() {
        return Ok(Some(totals));
    }

    let payments = document_payment::Entity::find()
        .filter(document_payment::Column::DocumentId.is_in(docs.iter().map(|d| d.id)))
        .filter(document_payment::Column::Method.eq(PaymentMethod::Cash.as_str()))
        .all(txn)
        .await?;
    for payment in payments {
        let amount = DualAmount::from_storage(payment.amount_usd, payment.amount_lbp);
        let Some(doc) = docs.iter().find(|d| d.id == payment.document_id) else {
            continue;
        };
        match doc.doc_type {
            DocumentType::Invoice => totals.cash_sales += amount,
            DocumentType::Return => totals.cash_refunds += amount,
            DocumentType::CashMovement => totals.movements += amount,
            _ => {}
        }
    }
    Ok(Some(totals))
}

/// Lines of a posted goods receipt, for matching a supplier invoice.
async fn receipt_lines(
    txn: &DatabaseTransaction,
    company_id: Uuid,
    receipt_id: Uuid,
) -> Result<Option<Vec<ReceiptLineView>>, PostingError> {
    let receipt = document::Entity::find_by_id(receipt_id)
        .filter(document::Column::CompanyId.eq(company_id))
        .filter(document::Column::DocType.eq(DocumentType::GoodsReceipt))
        .filter(document::Column::Status.eq(DocumentStatus::Posted))
        .one(txn)
        .await?;
    if receipt.is_none() {
        return Ok(None);
    }
    let lines = document_line::Entity::find()
        .filter(document_line::Column::DocumentId.eq(receipt_id))
        .all(txn)
        .await?;
    Ok(Some(
        lines
            .into_iter()
            .map(|l| ReceiptLineView {
                sku: l.sku.unwrap_or_default(),
                qty: from_storage(l.qty),
                unit_cost_usd: from_storage(l.unit_price_usd),
            })
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_types_are_period_checked() {
        assert!(posts_to_ledger(EventType::Sale));
        assert!(posts_to_ledger(EventType::ExpirySweep));
        assert!(!posts_to_ledger(EventType::ShiftOpen));
        assert!(!posts_to_ledger(EventType::Transfer));
        assert!(!posts_to_ledger(EventType::PriceChange));
    }

    #[test]
    fn outcome_labels() {
        let outcome = ApplyOutcome::Dead {
            event_id: Uuid::nil(),
            reason: "bad".into(),
        };
        assert_eq!(outcome.label(), "dead");
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["result"], "dead");

        let replayed = ApplyOutcome::Replayed {
            event_id: Uuid::nil(),
            outcome: ProcessedOutcome::Processed,
            document_id: None,
            journal_entry_id: None,
        };
        let json = serde_json::to_value(&replayed).unwrap();
        assert_eq!(json["result"], "replayed");
        assert_eq!(json["outcome"], "processed");
    }
}
