//! Pure event → document conversion.
//!
//! Everything the builder needs (resolved catalog entries, customer, lots
//! already moved by the allocator, receipt lines for matching) is handed in
//! by the posting engine; nothing here touches the database.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

use crate::domain::document::{
    DocumentDraft, DocumentLineDraft, ManualLine, PaymentDraft, StockEffect,
};
use crate::domain::event::{
    CashMovementPayload, EventPayload, ExpirySweepPayload, GoodsReceiptPayload,
    JournalTemplateRunPayload, PaymentInput, PaymentMethod, PriceChangePayload,
    PurchaseInvoicePayload, ReturnPayload, SalePayload, ShiftClosePayload, ShiftOpenPayload,
    TransferPayload,
};
use crate::domain::hold::{HoldReason, MatchVariance, VarianceKind};
use crate::domain::money::{Currency, DualAmount, RoundingLedger};
use crate::domain::roles::AccountRole;
use crate::entities::customer;
use crate::entities::document::{DocumentStatus, DocumentType};
use crate::entities::journal_template_line::{self, Side};
use crate::errors::PostingError;
use crate::services::allocator::Pick;
use crate::services::resolver::{ItemBook, ResolvedItem};

/// Remainders up to this many USD are absorbed by the last tender.
const SETTLEMENT_EPSILON_USD: Decimal = dec!(0.01);

/// Header facts fixed before building.
#[derive(Debug, Clone)]
pub struct DocContext {
    pub event_id: Uuid,
    pub company_id: Uuid,
    pub origin_company_id: Uuid,
    pub doc_date: NaiveDate,
    pub exchange_rate: Decimal,
}

/// Stock added to a lot on behalf of one payload line.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEffect {
    pub batch_id: Uuid,
    pub warehouse_id: Uuid,
    pub qty: Decimal,
    pub unit_cost: DualAmount,
}

/// Stock already moved for one payload line, in payload order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineStock {
    pub outbound: Vec<Pick>,
    pub inbound: Vec<InboundEffect>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchTolerance {
    pub qty_pct: Decimal,
    pub cost_pct: Decimal,
    /// Absolute, in USD.
    pub tax: Decimal,
}

impl Default for MatchTolerance {
    fn default() -> Self {
        Self {
            qty_pct: Decimal::ZERO,
            cost_pct: Decimal::ONE,
            tax: dec!(0.05),
        }
    }
}

/// A goods-receipt line as recorded, for matching.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptLineView {
    pub sku: String,
    pub qty: Decimal,
    pub unit_cost_usd: Decimal,
}

/// Cash seen by a drawer during one shift.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ShiftTotals {
    pub opening: DualAmount,
    pub cash_sales: DualAmount,
    pub cash_refunds: DualAmount,
    /// Signed sum of drawer movements.
    pub movements: DualAmount,
}

impl ShiftTotals {
    pub fn expected(&self) -> DualAmount {
        self.opening + self.cash_sales - self.cash_refunds + self.movements
    }
}

#[derive(Debug, Clone)]
pub struct TemplateView {
    pub name: String,
    pub memo: Option<String>,
    pub lines: Vec<journal_template_line::Model>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpiredLot {
    pub lot_id: Uuid,
    pub item_id: Uuid,
    pub warehouse_id: Uuid,
    pub batch_no: Option<String>,
    pub qty: Decimal,
    pub unit_cost: DualAmount,
}

/// Reference data gathered for one event.
#[derive(Debug, Clone, Default)]
pub struct ResolvedRefs {
    pub items: ItemBook,
    pub customer: Option<customer::Model>,
    pub shift: Option<ShiftTotals>,
    pub receipt: Option<Vec<ReceiptLineView>>,
    pub template: Option<TemplateView>,
    pub expired: Vec<ExpiredLot>,
    pub tolerance: MatchTolerance,
    /// An operator approved the match variance of this event.
    pub variance_approved: bool,
}

impl ResolvedRefs {
    fn item(&self, company_id: Uuid, sku: &str) -> Result<&ResolvedItem, PostingError> {
        self.items.get(sku).ok_or_else(|| {
            HoldReason::ItemNotFound {
                company_id,
                skus: vec![sku.to_string()],
            }
            .into()
        })
    }
}

/// Builds the one document an event produces.
pub fn build(
    ctx: &DocContext,
    payload: &EventPayload,
    refs: &ResolvedRefs,
    stock: &[LineStock],
) -> Result<DocumentDraft, PostingError> {
    let mut doc = match payload {
        EventPayload::Sale(p) => build_sale(ctx, p, refs, stock)?,
        EventPayload::Return(p) => build_return(ctx, p, refs, stock)?,
        EventPayload::ShiftOpen(p) => build_shift_open(ctx, p),
        EventPayload::ShiftClose(p) => build_shift_close(ctx, p, refs)?,
        EventPayload::CashMovement(p) => build_cash_movement(ctx, p),
        EventPayload::Transfer(p) => build_transfer(ctx, p, refs, stock)?,
        EventPayload::GoodsReceipt(p) => build_goods_receipt(ctx, p, refs, stock)?,
        EventPayload::PurchaseInvoice(p) => build_supplier_invoice(ctx, p, refs)?,
        EventPayload::PriceChange(p) => build_price_change(ctx, p, refs)?,
        EventPayload::JournalTemplateRun(p) => build_template_run(ctx, p, refs)?,
        EventPayload::ExpirySweep(p) => build_expiry_sweep(ctx, p, refs),
    };
    debug_assert_eq!(doc.doc_type, payload.event_type().document_type());
    doc.exchange_rate = ctx.exchange_rate;
    Ok(doc)
}

fn header(ctx: &DocContext, doc_type: DocumentType) -> DocumentDraft {
    let mut doc = DocumentDraft::new(doc_type, ctx.company_id, ctx.doc_date);
    doc.exchange_rate = ctx.exchange_rate;
    doc
}

fn outbound_effects(line_no: i32, item_id: Uuid, warehouse_id: Uuid, picks: &[Pick]) -> Vec<StockEffect> {
    picks
        .iter()
        .map(|pick| StockEffect {
            line_no,
            item_id,
            warehouse_id,
            batch_id: pick.batch_id,
            qty_in: Decimal::ZERO,
            qty_out: pick.qty,
            unit_cost: pick.unit_cost,
        })
        .collect()
}

fn inbound_effects(line_no: i32, item_id: Uuid, inbound: &[InboundEffect]) -> Vec<StockEffect> {
    inbound
        .iter()
        .map(|lot| StockEffect {
            line_no,
            item_id,
            warehouse_id: lot.warehouse_id,
            batch_id: Some(lot.batch_id),
            qty_in: lot.qty,
            qty_out: Decimal::ZERO,
            unit_cost: lot.unit_cost,
        })
        .collect()
}

/// VAT accumulated per tax code and rounded once per code.
#[derive(Debug, Default)]
struct VatBook {
    by_code: BTreeMap<Option<Uuid>, DualAmount>,
}

impl VatBook {
    fn add(&mut self, code: Option<Uuid>, exact: DualAmount) {
        *self.by_code.entry(code).or_default() += exact;
    }

    fn total(&self) -> DualAmount {
        self.by_code.values().map(|v| v.rounded()).sum()
    }
}

/// Unit amount times quantity; out-of-range lines are rejected, not posted.
fn line_value(sku: &str, unit: DualAmount, qty: Decimal) -> Result<DualAmount, PostingError> {
    unit.checked_scale(qty)
        .ok_or_else(|| PostingError::validation(format!("{sku}: line amount out of range")))
}

fn sale_lines(
    ctx: &DocContext,
    doc: &mut DocumentDraft,
    refs: &ResolvedRefs,
    lines: impl Iterator<Item = (String, Decimal, Decimal, Option<Decimal>, Decimal)>,
) -> Result<(RoundingLedger, VatBook), PostingError> {
    let mut totals = RoundingLedger::new();
    let mut vat = VatBook::default();
    for (idx, (sku, qty, price_usd, price_lbp, discount_pct)) in lines.enumerate() {
        let item = refs.item(ctx.company_id, &sku)?;
        let unit = DualAmount::normalize(Some(price_usd), price_lbp, ctx.exchange_rate);
        let factor = Decimal::ONE - discount_pct / Decimal::ONE_HUNDRED;
        let exact = line_value(&sku, unit, qty * factor)?;
        let line_total = totals.push(exact);
        let tax_exact = exact.scale(item.tax_rate);
        vat.add(item.tax_code_id, tax_exact);

        doc.lines.push(DocumentLineDraft {
            line_no: idx as i32 + 1,
            item_id: Some(item.id),
            sku: Some(item.sku.clone()),
            description: Some(item.name.clone()),
            qty,
            unit_price: unit,
            discount_pct,
            line_total,
            tax: tax_exact.rounded(),
            tax_code_id: item.tax_code_id,
            cost: DualAmount::ZERO,
        });
    }
    Ok((totals, vat))
}

fn close_totals(doc: &mut DocumentDraft, totals: &RoundingLedger, vat: &VatBook) {
    doc.subtotal = totals.total();
    doc.rounding = totals.remainder();
    doc.tax = vat.total();
    doc.total = doc.subtotal + doc.tax;
}

/// Turns tenders into applied amounts. Returns the payments and the unpaid
/// remainder that goes on account.
pub fn settle(
    total: DualAmount,
    rate: Decimal,
    payments: &[PaymentInput],
    shorthand: Option<PaymentMethod>,
) -> Result<(Vec<PaymentDraft>, DualAmount), PostingError> {
    let inputs: Vec<PaymentInput> = if !payments.is_empty() {
        payments.to_vec()
    } else if let Some(method) = shorthand {
        vec![PaymentInput {
            method,
            amount_usd: None,
            amount_lbp: None,
        }]
    } else {
        Vec::new()
    };

    let mut remaining = total;
    let mut applied = Vec::with_capacity(inputs.len());
    for input in &inputs {
        let amount = match (input.amount_usd, input.amount_lbp) {
            (None, None) => remaining.positive_part(),
            (usd, lbp) => {
                let usd = usd.unwrap_or(Decimal::ZERO);
                let lbp = lbp.unwrap_or(Decimal::ZERO);
                if usd < Decimal::ZERO || lbp < Decimal::ZERO {
                    return Err(PostingError::validation("payment amounts must not be negative"));
                }
                let lbp_in_usd = if rate.is_zero() { Decimal::ZERO } else { lbp / rate };
                let applied_usd = usd + lbp_in_usd;
                DualAmount::new(
                    Currency::Usd.round(applied_usd),
                    Currency::Lbp.round(applied_usd * rate),
                )
            }
        };
        remaining -= amount;
        applied.push(PaymentDraft {
            method: input.method,
            amount,
        });
    }

    if -remaining.usd > SETTLEMENT_EPSILON_USD {
        return Err(PostingError::validation(format!(
            "payments exceed the invoice total by {} USD",
            -remaining.usd
        )));
    }

    if remaining.usd.abs() <= SETTLEMENT_EPSILON_USD {
        if let Some(last) = applied.last_mut() {
            last.amount += remaining;
            remaining = DualAmount::ZERO;
        }
    }

    Ok((applied, remaining.positive_part()))
}

/// Credit checks for anything put on account.
fn apply_credit_terms(
    ctx: &DocContext,
    doc: &mut DocumentDraft,
    refs: &ResolvedRefs,
) -> Result<(), PostingError> {
    let exposure = doc.on_account();
    if exposure.is_zero() {
        return Ok(());
    }
    let Some(customer) = refs.customer.as_ref() else {
        return Err(PostingError::validation(
            "an unpaid balance requires customer_id",
        ));
    };

    let limit = customer.credit_limit_usd;
    let projected = customer.credit_balance_usd + exposure.usd;
    if limit > Decimal::ZERO && projected > limit {
        return Err(HoldReason::CreditLimitExceeded {
            customer_id: customer.id,
            limit_usd: limit,
            exposure_usd: projected,
        }
        .into());
    }

    if customer.payment_terms_days > 0 {
        doc.due_date = Some(ctx.doc_date + Duration::days(i64::from(customer.payment_terms_days)));
    } else {
        doc.due_date = Some(ctx.doc_date);
    }
    Ok(())
}

fn build_sale(
    ctx: &DocContext,
    p: &SalePayload,
    refs: &ResolvedRefs,
    stock: &[LineStock],
) -> Result<DocumentDraft, PostingError> {
    let mut doc = header(ctx, DocumentType::Invoice);
    doc.doc_no = p.invoice_no.clone().filter(|n| !n.trim().is_empty());
    doc.customer_id = p.customer_id;
    doc.warehouse_id = p.warehouse_id;
    doc.shift_id = p.shift_id;
    if ctx.company_id != ctx.origin_company_id {
        doc.metadata = Some(json!({ "origin_company_id": ctx.origin_company_id }));
    }

    let (totals, vat) = sale_lines(
        ctx,
        &mut doc,
        refs,
        p.lines.iter().map(|l| {
            (
                l.sku.clone(),
                l.qty,
                l.unit_price_usd,
                l.unit_price_lbp,
                l.discount_pct,
            )
        }),
    )?;
    close_totals(&mut doc, &totals, &vat);

    let warehouse_id = p
        .warehouse_id
        .ok_or_else(|| PostingError::validation("sale requires warehouse_id"))?;
    for (idx, line) in doc.lines.iter_mut().enumerate() {
        let picks = stock.get(idx).map(|s| s.outbound.as_slice()).unwrap_or(&[]);
        line.cost = picks.iter().map(Pick::cost).sum::<DualAmount>().rounded();
        if let Some(item_id) = line.item_id {
            doc.stock
                .extend(outbound_effects(line.line_no, item_id, warehouse_id, picks));
        }
    }
    doc.cost = doc.lines.iter().map(|l| l.cost).sum();

    let (payments, receivable) = settle(doc.total, ctx.exchange_rate, &p.payments, p.payment)?;
    doc.payments = payments;
    doc.receivable = receivable;
    apply_credit_terms(ctx, &mut doc, refs)?;
    Ok(doc)
}

fn build_return(
    ctx: &DocContext,
    p: &ReturnPayload,
    refs: &ResolvedRefs,
    stock: &[LineStock],
) -> Result<DocumentDraft, PostingError> {
    let mut doc = header(ctx, DocumentType::Return);
    doc.customer_id = p.customer_id;
    doc.warehouse_id = p.warehouse_id;
    doc.shift_id = p.shift_id;
    doc.reference_document_id = p.original_invoice_id;

    let (totals, vat) = sale_lines(
        ctx,
        &mut doc,
        refs,
        p.lines
            .iter()
            .map(|l| (l.sku.clone(), l.qty, l.unit_price_usd, l.unit_price_lbp, Decimal::ZERO)),
    )?;
    close_totals(&mut doc, &totals, &vat);

    for (idx, line) in doc.lines.iter_mut().enumerate() {
        let inbound = stock.get(idx).map(|s| s.inbound.as_slice()).unwrap_or(&[]);
        line.cost = inbound
            .iter()
            .map(|lot| lot.unit_cost.scale(lot.qty))
            .sum::<DualAmount>()
            .rounded();
        if let Some(item_id) = line.item_id {
            doc.stock.extend(inbound_effects(line.line_no, item_id, inbound));
        }
    }
    doc.cost = doc.lines.iter().map(|l| l.cost).sum();

    if p.refund_method == PaymentMethod::Credit && refs.customer.is_none() {
        return Err(PostingError::validation(
            "a refund on account requires customer_id",
        ));
    }
    doc.payments = vec![PaymentDraft {
        method: p.refund_method,
        amount: doc.total,
    }];
    Ok(doc)
}

fn build_shift_open(ctx: &DocContext, p: &ShiftOpenPayload) -> DocumentDraft {
    let mut doc = header(ctx, DocumentType::ShiftRecord);
    doc.shift_id = Some(p.shift_id);
    doc.total = DualAmount::new(p.opening_cash_usd, p.opening_cash_lbp);
    doc.metadata = Some(json!({
        "action": "open",
        "cashier_id": p.cashier_id,
        "opening_cash_usd": p.opening_cash_usd,
        "opening_cash_lbp": p.opening_cash_lbp,
    }));
    doc
}

fn build_shift_close(
    ctx: &DocContext,
    p: &ShiftClosePayload,
    refs: &ResolvedRefs,
) -> Result<DocumentDraft, PostingError> {
    let totals = refs
        .shift
        .ok_or_else(|| PostingError::validation(format!("shift {} is not open", p.shift_id)))?;
    let closing = DualAmount::new(p.closing_cash_usd, p.closing_cash_lbp);
    let expected = totals.expected();
    let variance = closing - expected;

    let mut doc = header(ctx, DocumentType::ShiftRecord);
    doc.shift_id = Some(p.shift_id);
    doc.memo = p.notes.clone();
    doc.total = closing;
    doc.metadata = Some(json!({
        "action": "close",
        "closing_cash_usd": closing.usd,
        "closing_cash_lbp": closing.lbp,
        "expected_cash_usd": expected.usd,
        "expected_cash_lbp": expected.lbp,
        "variance_usd": variance.usd,
        "variance_lbp": variance.lbp,
    }));
    Ok(doc)
}

fn build_cash_movement(ctx: &DocContext, p: &CashMovementPayload) -> DocumentDraft {
    let mut doc = header(ctx, DocumentType::CashMovement);
    let amount = DualAmount::new(p.amount_usd, p.amount_lbp);
    doc.shift_id = p.shift_id;
    doc.memo = p.notes.clone();
    doc.total = amount;
    doc.payments = vec![PaymentDraft {
        method: PaymentMethod::Cash,
        amount: amount.scale(p.movement_type.drawer_sign()),
    }];
    doc.metadata = Some(json!({ "movement_type": p.movement_type }));
    doc
}

fn build_transfer(
    ctx: &DocContext,
    p: &TransferPayload,
    refs: &ResolvedRefs,
    stock: &[LineStock],
) -> Result<DocumentDraft, PostingError> {
    let mut doc = header(ctx, DocumentType::StockMove);
    doc.warehouse_id = Some(p.from_warehouse_id);
    doc.counter_warehouse_id = Some(p.to_warehouse_id);

    for (idx, line) in p.lines.iter().enumerate() {
        let item = refs.item(ctx.company_id, &line.sku)?;
        let line_no = idx as i32 + 1;
        let moved = stock.get(idx).cloned().unwrap_or_default();
        let cost = moved
            .outbound
            .iter()
            .map(Pick::cost)
            .sum::<DualAmount>()
            .rounded();

        doc.stock
            .extend(outbound_effects(line_no, item.id, p.from_warehouse_id, &moved.outbound));
        doc.stock.extend(inbound_effects(line_no, item.id, &moved.inbound));
        doc.lines.push(DocumentLineDraft {
            line_no,
            item_id: Some(item.id),
            sku: Some(item.sku.clone()),
            description: Some(item.name.clone()),
            qty: line.qty,
            unit_price: DualAmount::ZERO,
            discount_pct: Decimal::ZERO,
            line_total: DualAmount::ZERO,
            tax: DualAmount::ZERO,
            tax_code_id: None,
            cost,
        });
        doc.cost += cost;
    }
    Ok(doc)
}

fn build_goods_receipt(
    ctx: &DocContext,
    p: &GoodsReceiptPayload,
    refs: &ResolvedRefs,
    stock: &[LineStock],
) -> Result<DocumentDraft, PostingError> {
    let mut doc = header(ctx, DocumentType::GoodsReceipt);
    doc.warehouse_id = Some(p.warehouse_id);
    if let Some(supplier_id) = p.supplier_id {
        doc.metadata = Some(json!({ "supplier_id": supplier_id }));
    }

    let mut totals = RoundingLedger::new();
    for (idx, line) in p.lines.iter().enumerate() {
        let item = refs.item(ctx.company_id, &line.sku)?;
        let line_no = idx as i32 + 1;
        let unit = DualAmount::normalize(Some(line.unit_cost_usd), line.unit_cost_lbp, ctx.exchange_rate);
        let value = totals.push(line_value(&line.sku, unit, line.qty)?);
        let inbound = stock.get(idx).map(|s| s.inbound.as_slice()).unwrap_or(&[]);
        doc.stock.extend(inbound_effects(line_no, item.id, inbound));
        doc.lines.push(DocumentLineDraft {
            line_no,
            item_id: Some(item.id),
            sku: Some(item.sku.clone()),
            description: Some(item.name.clone()),
            qty: line.qty,
            unit_price: unit,
            discount_pct: Decimal::ZERO,
            line_total: value,
            tax: DualAmount::ZERO,
            tax_code_id: None,
            cost: value,
        });
    }
    doc.subtotal = totals.total();
    doc.total = doc.subtotal;
    doc.cost = doc.subtotal;
    Ok(doc)
}

fn exceeds(expected: Decimal, actual: Decimal, tolerance_pct: Decimal) -> bool {
    let allowed = (expected.abs() * tolerance_pct / Decimal::ONE_HUNDRED).max(Decimal::ZERO);
    (actual - expected).abs() > allowed
}

/// Compares a supplier invoice with its goods receipt.
pub fn three_way_match(
    receipt: &[ReceiptLineView],
    invoice: &PurchaseInvoicePayload,
    items: &ItemBook,
    tolerance: &MatchTolerance,
) -> Vec<MatchVariance> {
    let mut received: BTreeMap<&str, (Decimal, Decimal)> = BTreeMap::new();
    for line in receipt {
        let entry = received.entry(line.sku.as_str()).or_default();
        entry.0 += line.qty;
        entry.1 += line.qty * line.unit_cost_usd;
    }
    let mut invoiced: BTreeMap<&str, (Decimal, Decimal)> = BTreeMap::new();
    for line in &invoice.lines {
        let entry = invoiced.entry(line.sku.as_str()).or_default();
        entry.0 += line.qty;
        entry.1 += line.qty * line.unit_cost_usd;
    }

    let mut variances = Vec::new();
    let mut expected_tax = Decimal::ZERO;
    for (sku, (qty, value)) in &invoiced {
        let tax_rate = items.get(*sku).map(|i| i.tax_rate).unwrap_or(Decimal::ZERO);
        expected_tax += value * tax_rate;

        let Some((rec_qty, rec_value)) = received.get(sku) else {
            variances.push(MatchVariance {
                sku: Some(sku.to_string()),
                kind: VarianceKind::Unmatched,
                expected: Decimal::ZERO,
                actual: *qty,
            });
            continue;
        };
        if exceeds(*rec_qty, *qty, tolerance.qty_pct) {
            variances.push(MatchVariance {
                sku: Some(sku.to_string()),
                kind: VarianceKind::Quantity,
                expected: *rec_qty,
                actual: *qty,
            });
        }
        let rec_unit = if rec_qty.is_zero() { Decimal::ZERO } else { rec_value / rec_qty };
        let inv_unit = if qty.is_zero() { Decimal::ZERO } else { value / qty };
        if exceeds(rec_unit, inv_unit, tolerance.cost_pct) {
            variances.push(MatchVariance {
                sku: Some(sku.to_string()),
                kind: VarianceKind::UnitCost,
                expected: Currency::Usd.round(rec_unit),
                actual: Currency::Usd.round(inv_unit),
            });
        }
    }

    let expected_tax = Currency::Usd.round(expected_tax);
    if (invoice.tax_usd - expected_tax).abs() > tolerance.tax {
        variances.push(MatchVariance {
            sku: None,
            kind: VarianceKind::Tax,
            expected: expected_tax,
            actual: invoice.tax_usd,
        });
    }
    variances
}

fn build_supplier_invoice(
    ctx: &DocContext,
    p: &PurchaseInvoicePayload,
    refs: &ResolvedRefs,
) -> Result<DocumentDraft, PostingError> {
    let receipt = refs.receipt.as_deref().ok_or_else(|| {
        PostingError::validation(format!("goods receipt {} not found", p.receipt_document_id))
    })?;

    let mut doc = header(ctx, DocumentType::SupplierInvoice);
    doc.doc_no = p.invoice_no.clone().filter(|n| !n.trim().is_empty());
    doc.reference_document_id = Some(p.receipt_document_id);
    if let Some(supplier_id) = p.supplier_id {
        doc.metadata = Some(json!({ "supplier_id": supplier_id }));
    }

    let mut totals = RoundingLedger::new();
    for (idx, line) in p.lines.iter().enumerate() {
        let item = refs.item(ctx.company_id, &line.sku)?;
        let unit = DualAmount::from_usd(line.unit_cost_usd, ctx.exchange_rate);
        let value = totals.push(line_value(&line.sku, unit, line.qty)?);
        doc.lines.push(DocumentLineDraft {
            line_no: idx as i32 + 1,
            item_id: Some(item.id),
            sku: Some(item.sku.clone()),
            description: Some(item.name.clone()),
            qty: line.qty,
            unit_price: unit,
            discount_pct: Decimal::ZERO,
            line_total: value,
            tax: DualAmount::ZERO,
            tax_code_id: item.tax_code_id,
            cost: value,
        });
    }
    doc.subtotal = totals.total();
    doc.tax = DualAmount::from_usd(p.tax_usd, ctx.exchange_rate).rounded();
    doc.total = doc.subtotal + doc.tax;

    let variances = three_way_match(receipt, p, &refs.items, &refs.tolerance);
    if !variances.is_empty() && !refs.variance_approved {
        doc.status = DocumentStatus::Draft;
        doc.metadata = Some(json!({
            "supplier_id": p.supplier_id,
            "variances": variances,
        }));
        doc.hold = Some(HoldReason::MatchVariance { variances });
    }
    Ok(doc)
}

fn build_price_change(
    ctx: &DocContext,
    p: &PriceChangePayload,
    refs: &ResolvedRefs,
) -> Result<DocumentDraft, PostingError> {
    let mut doc = header(ctx, DocumentType::PriceChange);
    let mut previous = serde_json::Map::new();
    for (idx, line) in p.lines.iter().enumerate() {
        if line.unit_price_usd < Decimal::ZERO {
            return Err(PostingError::validation(format!("{}: negative price", line.sku)));
        }
        let item = refs.item(ctx.company_id, &line.sku)?;
        previous.insert(
            item.sku.clone(),
            json!({ "unit_price_usd": item.unit_price_usd, "unit_price_lbp": item.unit_price_lbp }),
        );
        doc.lines.push(DocumentLineDraft {
            line_no: idx as i32 + 1,
            item_id: Some(item.id),
            sku: Some(item.sku.clone()),
            description: Some(item.name.clone()),
            qty: Decimal::ONE,
            unit_price: DualAmount::normalize(
                Some(line.unit_price_usd),
                line.unit_price_lbp,
                ctx.exchange_rate,
            ),
            discount_pct: Decimal::ZERO,
            line_total: DualAmount::ZERO,
            tax: DualAmount::ZERO,
            tax_code_id: item.tax_code_id,
            cost: DualAmount::ZERO,
        });
    }
    doc.metadata = Some(json!({ "previous": previous }));
    Ok(doc)
}

fn build_template_run(
    ctx: &DocContext,
    p: &JournalTemplateRunPayload,
    refs: &ResolvedRefs,
) -> Result<DocumentDraft, PostingError> {
    let template = refs.template.as_ref().ok_or_else(|| {
        PostingError::validation(format!("journal template {} not found", p.template_id))
    })?;
    if template.lines.is_empty() {
        return Err(PostingError::validation(format!(
            "journal template {} has no lines",
            p.template_id
        )));
    }

    let mut doc = header(ctx, DocumentType::ManualJournal);
    doc.memo = template.memo.clone().or_else(|| Some(template.name.clone()));
    doc.metadata = Some(json!({
        "rule_id": p.rule_id,
        "template_id": p.template_id,
        "run_date": p.run_date,
    }));

    let mut lines = template.lines.clone();
    lines.sort_by_key(|l| l.line_no);
    for line in lines {
        let role = AccountRole::from_str(&line.role_code).map_err(|_| {
            PostingError::validation(format!("unknown account role '{}'", line.role_code))
        })?;
        let amount =
            DualAmount::normalize(Some(line.amount_usd), line.amount_lbp, ctx.exchange_rate)
                .rounded();
        if line.side == Side::Debit {
            doc.total += amount;
        }
        doc.manual_lines.push(ManualLine {
            role,
            side: line.side,
            amount,
            memo: line.memo.clone(),
        });
    }
    doc.subtotal = doc.total;
    Ok(doc)
}

fn build_expiry_sweep(ctx: &DocContext, p: &ExpirySweepPayload, refs: &ResolvedRefs) -> DocumentDraft {
    let mut doc = header(ctx, DocumentType::InventoryAdjustment);
    doc.memo = Some(format!("expired stock as of {}", p.as_of));
    for (idx, lot) in refs.expired.iter().enumerate() {
        let line_no = idx as i32 + 1;
        let cost = lot.unit_cost.scale(lot.qty).rounded();
        doc.stock.push(StockEffect {
            line_no,
            item_id: lot.item_id,
            warehouse_id: lot.warehouse_id,
            batch_id: Some(lot.lot_id),
            qty_in: Decimal::ZERO,
            qty_out: lot.qty,
            unit_cost: lot.unit_cost,
        });
        doc.lines.push(DocumentLineDraft {
            line_no,
            item_id: Some(lot.item_id),
            sku: None,
            description: lot.batch_no.clone(),
            qty: lot.qty,
            unit_price: DualAmount::ZERO,
            discount_pct: Decimal::ZERO,
            line_total: DualAmount::ZERO,
            tax: DualAmount::ZERO,
            tax_code_id: None,
            cost,
        });
        doc.cost += cost;
    }
    doc.total = doc.cost;
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::{InvoiceCostLine, SaleLine};
    use crate::domain::CompanySelector;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    const RATE: Decimal = dec!(89500);

    fn ctx() -> DocContext {
        let company = Uuid::new_v4();
        DocContext {
            event_id: Uuid::new_v4(),
            company_id: company,
            origin_company_id: company,
            doc_date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
            exchange_rate: RATE,
        }
    }

    fn item(company_id: Uuid, sku: &str, tax_rate: Decimal) -> ResolvedItem {
        ResolvedItem {
            id: Uuid::new_v4(),
            company_id,
            sku: sku.to_string(),
            name: format!("Item {sku}"),
            unit_price_usd: dec!(5),
            unit_price_lbp: None,
            standard_cost: DualAmount::from_usd(dec!(3), RATE),
            tax_code_id: if tax_rate.is_zero() { None } else { Some(Uuid::nil()) },
            tax_rate,
        }
    }

    fn refs_with(ctx: &DocContext, items: &[(&str, Decimal)]) -> ResolvedRefs {
        let mut refs = ResolvedRefs::default();
        for (sku, rate) in items {
            refs.items.insert(sku.to_string(), item(ctx.company_id, sku, *rate));
        }
        refs
    }

    fn sale(lines: Vec<SaleLine>, payment: Option<PaymentMethod>) -> SalePayload {
        SalePayload {
            lines,
            payments: Vec::new(),
            payment,
            customer_id: None,
            warehouse_id: Some(Uuid::new_v4()),
            exchange_rate: None,
            company: CompanySelector::Auto,
            shift_id: None,
            invoice_no: None,
        }
    }

    fn line(sku: &str, qty: Decimal, price: Decimal) -> SaleLine {
        SaleLine {
            sku: sku.to_string(),
            qty,
            unit_price_usd: price,
            unit_price_lbp: None,
            discount_pct: Decimal::ZERO,
            batch_no: None,
        }
    }

    fn picks(qty: Decimal, cost: Decimal) -> LineStock {
        LineStock {
            outbound: vec![Pick {
                batch_id: Some(Uuid::new_v4()),
                qty,
                unit_cost: DualAmount::from_usd(cost, RATE),
            }],
            inbound: Vec::new(),
        }
    }

    #[test]
    fn cash_sale_settles_in_full() {
        let ctx = ctx();
        let refs = refs_with(&ctx, &[("X", Decimal::ZERO)]);
        let payload = sale(vec![line("X", dec!(2), dec!(5.00))], Some(PaymentMethod::Cash));
        let doc = build(&ctx, &EventPayload::Sale(payload), &refs, &[picks(dec!(2), dec!(3))]).unwrap();

        assert_eq!(doc.doc_type, DocumentType::Invoice);
        assert_eq!(doc.total, DualAmount::new(dec!(10.00), dec!(895000)));
        assert_eq!(doc.payments.len(), 1);
        assert_eq!(doc.payments[0].amount, doc.total);
        assert!(doc.receivable.is_zero());
        assert_eq!(doc.cost.usd, dec!(6));
        assert_eq!(doc.stock.len(), 1);
        assert_eq!(doc.stock[0].qty_out, dec!(2));
    }

    #[test]
    fn thirds_keep_their_rounding_remainder() {
        let ctx = ctx();
        let refs = refs_with(&ctx, &[("A", Decimal::ZERO), ("B", Decimal::ZERO), ("C", Decimal::ZERO)]);
        let third = dec!(1) / dec!(3);
        let payload = sale(
            vec![line("A", dec!(1), third), line("B", dec!(1), third), line("C", dec!(1), third)],
            Some(PaymentMethod::Cash),
        );
        let stock = vec![picks(dec!(1), dec!(0.1)), picks(dec!(1), dec!(0.1)), picks(dec!(1), dec!(0.1))];
        let doc = build(&ctx, &EventPayload::Sale(payload), &refs, &stock).unwrap();

        let line_sum: Decimal = doc.lines.iter().map(|l| l.line_total.usd).sum();
        assert_eq!(line_sum, dec!(0.99));
        assert_eq!(doc.rounding.usd, dec!(0.01));
        assert_eq!(line_sum + doc.rounding.usd, doc.total.usd);
        assert_eq!(doc.total.usd, dec!(1.00));
    }

    #[test]
    fn vat_and_discount_apply_per_line() {
        let ctx = ctx();
        let refs = refs_with(&ctx, &[("V", dec!(0.11))]);
        let mut discounted = line("V", dec!(1), dec!(100));
        discounted.discount_pct = dec!(10);
        let payload = sale(vec![discounted], Some(PaymentMethod::Card));
        let doc = build(&ctx, &EventPayload::Sale(payload), &refs, &[picks(dec!(1), dec!(40))]).unwrap();

        assert_eq!(doc.subtotal.usd, dec!(90.00));
        assert_eq!(doc.tax.usd, dec!(9.90));
        assert_eq!(doc.total.usd, dec!(99.90));
        assert_eq!(doc.payments[0].method, PaymentMethod::Card);
    }

    #[test]
    fn unpaid_remainder_requires_a_customer() {
        let ctx = ctx();
        let refs = refs_with(&ctx, &[("X", Decimal::ZERO)]);
        let payload = sale(vec![line("X", dec!(1), dec!(5))], None);
        assert_matches!(
            build(&ctx, &EventPayload::Sale(payload), &refs, &[picks(dec!(1), dec!(1))]),
            Err(PostingError::Validation(_))
        );
    }

    #[test]
    fn split_tender_absorbs_sub_cent_remainder() {
        let (payments, receivable) = settle(
            DualAmount::new(dec!(10.00), dec!(895000)),
            RATE,
            &[
                PaymentInput { method: PaymentMethod::Cash, amount_usd: Some(dec!(5)), amount_lbp: None },
                PaymentInput { method: PaymentMethod::Cash, amount_usd: None, amount_lbp: Some(dec!(447000)) },
            ],
            None,
        )
        .unwrap();
        assert!(receivable.is_zero());
        let paid: DualAmount = payments.iter().map(|p| p.amount).sum();
        assert_eq!(paid, DualAmount::new(dec!(10.00), dec!(895000)));
    }

    #[test]
    fn overpayment_is_rejected() {
        assert_matches!(
            settle(
                DualAmount::new(dec!(10), dec!(895000)),
                RATE,
                &[PaymentInput { method: PaymentMethod::Cash, amount_usd: Some(dec!(20)), amount_lbp: None }],
                None,
            ),
            Err(PostingError::Validation(_))
        );
    }

    #[test]
    fn credit_limit_is_enforced() {
        let ctx = ctx();
        let mut refs = refs_with(&ctx, &[("X", Decimal::ZERO)]);
        let customer_id = Uuid::new_v4();
        refs.customer = Some(customer::Model {
            id: customer_id,
            company_id: ctx.company_id,
            name: "Acme".into(),
            credit_limit_usd: dec!(50),
            credit_limit_lbp: Decimal::ZERO,
            credit_balance_usd: dec!(45),
            credit_balance_lbp: Decimal::ZERO,
            payment_terms_days: 30,
            is_active: true,
        });
        let mut payload = sale(vec![line("X", dec!(2), dec!(5))], None);
        payload.customer_id = Some(customer_id);
        assert_matches!(
            build(&ctx, &EventPayload::Sale(payload), &refs, &[picks(dec!(2), dec!(1))]),
            Err(PostingError::Hold(HoldReason::CreditLimitExceeded { .. }))
        );
    }

    #[test]
    fn match_flags_cost_and_tax_variances() {
        let ctx = ctx();
        let refs = refs_with(&ctx, &[("P", dec!(0.11))]);
        let receipt = vec![ReceiptLineView { sku: "P".into(), qty: dec!(10), unit_cost_usd: dec!(2) }];
        let invoice = PurchaseInvoicePayload {
            receipt_document_id: Uuid::new_v4(),
            supplier_id: None,
            exchange_rate: None,
            lines: vec![InvoiceCostLine { sku: "P".into(), qty: dec!(10), unit_cost_usd: dec!(2.50) }],
            tax_usd: dec!(2.20),
            invoice_no: None,
        };
        let variances = three_way_match(&receipt, &invoice, &refs.items, &MatchTolerance::default());
        let kinds: Vec<_> = variances.iter().map(|v| v.kind).collect();
        assert_eq!(kinds, vec![VarianceKind::UnitCost, VarianceKind::Tax]);

        let mut refs = refs;
        refs.receipt = Some(receipt);
        let doc = build(&ctx, &EventPayload::PurchaseInvoice(invoice.clone()), &refs, &[]).unwrap();
        assert_eq!(doc.status, DocumentStatus::Draft);
        assert_matches!(doc.hold, Some(HoldReason::MatchVariance { .. }));

        refs.variance_approved = true;
        let doc = build(&ctx, &EventPayload::PurchaseInvoice(invoice), &refs, &[]).unwrap();
        assert_eq!(doc.status, DocumentStatus::Posted);
        assert!(doc.hold.is_none());
    }

    #[test]
    fn shift_close_reports_variance() {
        let ctx = ctx();
        let mut refs = ResolvedRefs::default();
        refs.shift = Some(ShiftTotals {
            opening: DualAmount::new(dec!(100), dec!(0)),
            cash_sales: DualAmount::new(dec!(50), dec!(0)),
            cash_refunds: DualAmount::new(dec!(5), dec!(0)),
            movements: DualAmount::new(dec!(-20), dec!(0)),
        });
        let payload = ShiftClosePayload {
            shift_id: Uuid::new_v4(),
            closing_cash_usd: dec!(120),
            closing_cash_lbp: Decimal::ZERO,
            notes: None,
        };
        let doc = build(&ctx, &EventPayload::ShiftClose(payload), &refs, &[]).unwrap();
        let meta = doc.metadata.clone().unwrap();
        assert_eq!(meta["expected_cash_usd"], json!(dec!(125)));
        assert_eq!(meta["variance_usd"], json!(dec!(-5)));
        assert!(!doc.has_ledger_impact());
    }
}
