//! Event types and their wire payloads.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::roles::AccountRole;
use crate::entities::document::DocumentType;
use crate::errors::PostingError;

// Payload ceilings. Line math (qty x converted price x lines) stays far inside
// `Decimal`'s range under these.
pub const MAX_QTY: Decimal = dec!(1000000);
pub const MAX_AMOUNT_USD: Decimal = dec!(1000000000);
pub const MAX_AMOUNT_LBP: Decimal = dec!(100000000000000);
pub const MAX_EXCHANGE_RATE: Decimal = dec!(10000000);

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
    Sale,
    Return,
    ShiftOpen,
    ShiftClose,
    CashMovement,
    Transfer,
    GoodsReceipt,
    PurchaseInvoice,
    PriceChange,
    JournalTemplateRun,
    ExpirySweep,
}

impl EventType {
    pub fn parse(raw: &str) -> Result<Self, PostingError> {
        EventType::from_str(raw)
            .map_err(|_| PostingError::validation(format!("unknown event type '{raw}'")))
    }

    pub fn document_type(self) -> DocumentType {
        match self {
            EventType::Sale => DocumentType::Invoice,
            EventType::Return => DocumentType::Return,
            EventType::ShiftOpen | EventType::ShiftClose => DocumentType::ShiftRecord,
            EventType::CashMovement => DocumentType::CashMovement,
            EventType::Transfer => DocumentType::StockMove,
            EventType::GoodsReceipt => DocumentType::GoodsReceipt,
            EventType::PurchaseInvoice => DocumentType::SupplierInvoice,
            EventType::PriceChange => DocumentType::PriceChange,
            EventType::JournalTemplateRun => DocumentType::ManualJournal,
            EventType::ExpirySweep => DocumentType::InventoryAdjustment,
        }
    }
}

/// Company a sale should be invoiced under: `"auto"` or an explicit company id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CompanySelector {
    #[default]
    Auto,
    Forced(Uuid),
}

impl TryFrom<String> for CompanySelector {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("auto") {
            return Ok(CompanySelector::Auto);
        }
        Uuid::parse_str(trimmed)
            .map(CompanySelector::Forced)
            .map_err(|_| format!("company must be 'auto' or a company id, got '{trimmed}'"))
    }
}

impl From<CompanySelector> for String {
    fn from(value: CompanySelector) -> Self {
        match value {
            CompanySelector::Auto => "auto".to_string(),
            CompanySelector::Forced(id) => id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Bank,
    Credit,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Bank => "bank",
            PaymentMethod::Credit => "credit",
        }
    }

    /// Ledger role debited when the method settles a sale.
    pub fn role(&self) -> AccountRole {
        match self {
            PaymentMethod::Cash => AccountRole::Cash,
            PaymentMethod::Card | PaymentMethod::Bank => AccountRole::Bank,
            PaymentMethod::Credit => AccountRole::Ar,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleLine {
    #[serde(alias = "item")]
    pub sku: String,
    pub qty: Decimal,
    pub unit_price_usd: Decimal,
    #[serde(default)]
    pub unit_price_lbp: Option<Decimal>,
    #[serde(default)]
    pub discount_pct: Decimal,
    /// Manual lot selection; restricts allocation to lots with this number.
    #[serde(default)]
    pub batch_no: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInput {
    pub method: PaymentMethod,
    /// Both empty means "the remaining balance".
    #[serde(default)]
    pub amount_usd: Option<Decimal>,
    #[serde(default)]
    pub amount_lbp: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalePayload {
    pub lines: Vec<SaleLine>,
    #[serde(default)]
    pub payments: Vec<PaymentInput>,
    /// Shorthand for a single payment settling the full total.
    #[serde(default)]
    pub payment: Option<PaymentMethod>,
    #[serde(default)]
    pub customer_id: Option<Uuid>,
    /// Falls back to the device's default warehouse.
    #[serde(default)]
    pub warehouse_id: Option<Uuid>,
    #[serde(default)]
    pub exchange_rate: Option<Decimal>,
    #[serde(default)]
    pub company: CompanySelector,
    #[serde(default)]
    pub shift_id: Option<Uuid>,
    #[serde(default)]
    pub invoice_no: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnLine {
    #[serde(alias = "item")]
    pub sku: String,
    pub qty: Decimal,
    pub unit_price_usd: Decimal,
    #[serde(default)]
    pub unit_price_lbp: Option<Decimal>,
    /// Lot the goods go back into.
    #[serde(default)]
    pub batch_id: Option<Uuid>,
    #[serde(default)]
    pub unit_cost_usd: Option<Decimal>,
}

fn default_refund_method() -> PaymentMethod {
    PaymentMethod::Cash
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnPayload {
    pub lines: Vec<ReturnLine>,
    #[serde(default = "default_refund_method")]
    pub refund_method: PaymentMethod,
    #[serde(default)]
    pub customer_id: Option<Uuid>,
    #[serde(default)]
    pub warehouse_id: Option<Uuid>,
    #[serde(default)]
    pub exchange_rate: Option<Decimal>,
    #[serde(default)]
    pub company: CompanySelector,
    #[serde(default)]
    pub shift_id: Option<Uuid>,
    #[serde(default)]
    pub original_invoice_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftOpenPayload {
    pub shift_id: Uuid,
    #[serde(default)]
    pub opening_cash_usd: Decimal,
    #[serde(default)]
    pub opening_cash_lbp: Decimal,
    #[serde(default)]
    pub cashier_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftClosePayload {
    pub shift_id: Uuid,
    #[serde(default)]
    pub closing_cash_usd: Decimal,
    #[serde(default)]
    pub closing_cash_lbp: Decimal,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CashMovementType {
    CashIn,
    CashOut,
    PaidOut,
    SafeDrop,
    Other,
}

impl CashMovementType {
    /// Sign applied to the drawer's expected cash; `Other` is informational.
    pub fn drawer_sign(&self) -> Decimal {
        match self {
            CashMovementType::CashIn => Decimal::ONE,
            CashMovementType::CashOut | CashMovementType::PaidOut | CashMovementType::SafeDrop => {
                Decimal::NEGATIVE_ONE
            }
            CashMovementType::Other => Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashMovementPayload {
    #[serde(default)]
    pub shift_id: Option<Uuid>,
    pub movement_type: CashMovementType,
    #[serde(default)]
    pub amount_usd: Decimal,
    #[serde(default)]
    pub amount_lbp: Decimal,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QtyLine {
    #[serde(alias = "item")]
    pub sku: String,
    pub qty: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferPayload {
    pub from_warehouse_id: Uuid,
    pub to_warehouse_id: Uuid,
    pub lines: Vec<QtyLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptLine {
    #[serde(alias = "item")]
    pub sku: String,
    pub qty: Decimal,
    pub unit_cost_usd: Decimal,
    #[serde(default)]
    pub unit_cost_lbp: Option<Decimal>,
    #[serde(default)]
    pub batch_no: Option<String>,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoodsReceiptPayload {
    pub warehouse_id: Uuid,
    #[serde(default)]
    pub supplier_id: Option<Uuid>,
    #[serde(default)]
    pub exchange_rate: Option<Decimal>,
    pub lines: Vec<ReceiptLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceCostLine {
    #[serde(alias = "item")]
    pub sku: String,
    pub qty: Decimal,
    pub unit_cost_usd: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseInvoicePayload {
    pub receipt_document_id: Uuid,
    #[serde(default)]
    pub supplier_id: Option<Uuid>,
    #[serde(default)]
    pub exchange_rate: Option<Decimal>,
    pub lines: Vec<InvoiceCostLine>,
    #[serde(default)]
    pub tax_usd: Decimal,
    #[serde(default)]
    pub invoice_no: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceLine {
    #[serde(alias = "item")]
    pub sku: String,
    pub unit_price_usd: Decimal,
    #[serde(default)]
    pub unit_price_lbp: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceChangePayload {
    pub lines: Vec<PriceLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalTemplateRunPayload {
    pub rule_id: Uuid,
    pub template_id: Uuid,
    pub run_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpirySweepPayload {
    pub as_of: NaiveDate,
}

/// A decoded payload; one variant per event type.
#[derive(Debug, Clone)]
pub enum EventPayload {
    Sale(SalePayload),
    Return(ReturnPayload),
    ShiftOpen(ShiftOpenPayload),
    ShiftClose(ShiftClosePayload),
    CashMovement(CashMovementPayload),
    Transfer(TransferPayload),
    GoodsReceipt(GoodsReceiptPayload),
    PurchaseInvoice(PurchaseInvoicePayload),
    PriceChange(PriceChangePayload),
    JournalTemplateRun(JournalTemplateRunPayload),
    ExpirySweep(ExpirySweepPayload),
}

fn decode_as<T: serde::de::DeserializeOwned>(
    event_type: EventType,
    raw: &serde_json::Value,
) -> Result<T, PostingError> {
    serde_json::from_value(raw.clone())
        .map_err(|e| PostingError::validation(format!("invalid {event_type} payload: {e}")))
}

impl EventPayload {
    pub fn decode(event_type: EventType, raw: &serde_json::Value) -> Result<Self, PostingError> {
        let payload = match event_type {
            EventType::Sale => EventPayload::Sale(decode_as(event_type, raw)?),
            EventType::Return => EventPayload::Return(decode_as(event_type, raw)?),
            EventType::ShiftOpen => EventPayload::ShiftOpen(decode_as(event_type, raw)?),
            EventType::ShiftClose => EventPayload::ShiftClose(decode_as(event_type, raw)?),
            EventType::CashMovement => EventPayload::CashMovement(decode_as(event_type, raw)?),
            EventType::Transfer => EventPayload::Transfer(decode_as(event_type, raw)?),
            EventType::GoodsReceipt => EventPayload::GoodsReceipt(decode_as(event_type, raw)?),
            EventType::PurchaseInvoice => {
                EventPayload::PurchaseInvoice(decode_as(event_type, raw)?)
            }
            EventType::PriceChange => EventPayload::PriceChange(decode_as(event_type, raw)?),
            EventType::JournalTemplateRun => {
                EventPayload::JournalTemplateRun(decode_as(event_type, raw)?)
            }
            EventType::ExpirySweep => EventPayload::ExpirySweep(decode_as(event_type, raw)?),
        };
        payload.check()?;
        Ok(payload)
    }

    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::Sale(_) => EventType::Sale,
            EventPayload::Return(_) => EventType::Return,
            EventPayload::ShiftOpen(_) => EventType::ShiftOpen,
            EventPayload::ShiftClose(_) => EventType::ShiftClose,
            EventPayload::CashMovement(_) => EventType::CashMovement,
            EventPayload::Transfer(_) => EventType::Transfer,
            EventPayload::GoodsReceipt(_) => EventType::GoodsReceipt,
            EventPayload::PurchaseInvoice(_) => EventType::PurchaseInvoice,
            EventPayload::PriceChange(_) => EventType::PriceChange,
            EventPayload::JournalTemplateRun(_) => EventType::JournalTemplateRun,
            EventPayload::ExpirySweep(_) => EventType::ExpirySweep,
        }
    }

    /// The business date of the document: payload date for synthesised events,
    /// otherwise the day the event occurred on the device.
    pub fn business_date(&self, occurred_at: DateTime<Utc>) -> NaiveDate {
        match self {
            EventPayload::JournalTemplateRun(p) => p.run_date,
            EventPayload::ExpirySweep(p) => p.as_of,
            _ => occurred_at.date_naive(),
        }
    }

    /// SKUs referenced by the payload, in order, without duplicates.
    pub fn skus(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            EventPayload::Sale(p) => p.lines.iter().map(|l| l.sku.as_str()).collect(),
            EventPayload::Return(p) => p.lines.iter().map(|l| l.sku.as_str()).collect(),
            EventPayload::Transfer(p) => p.lines.iter().map(|l| l.sku.as_str()).collect(),
            EventPayload::GoodsReceipt(p) => p.lines.iter().map(|l| l.sku.as_str()).collect(),
            EventPayload::PurchaseInvoice(p) => p.lines.iter().map(|l| l.sku.as_str()).collect(),
            EventPayload::PriceChange(p) => p.lines.iter().map(|l| l.sku.as_str()).collect(),
            EventPayload::ShiftOpen(_)
            | EventPayload::ShiftClose(_)
            | EventPayload::CashMovement(_)
            | EventPayload::JournalTemplateRun(_)
            | EventPayload::ExpirySweep(_) => Vec::new(),
        };
        let mut out: Vec<String> = Vec::with_capacity(raw.len());
        for sku in raw {
            if !out.iter().any(|s| s == sku) {
                out.push(sku.to_string());
            }
        }
        out
    }

    fn check(&self) -> Result<(), PostingError> {
        fn positive(what: &str, qty: Decimal) -> Result<(), PostingError> {
            if qty <= Decimal::ZERO {
                return Err(PostingError::validation(format!(
                    "{what} quantity must be positive"
                )));
            }
            if qty > MAX_QTY {
                return Err(PostingError::validation(format!(
                    "{what} quantity exceeds {MAX_QTY}"
                )));
            }
            Ok(())
        }
        fn non_empty<T>(what: &str, lines: &[T]) -> Result<(), PostingError> {
            if lines.is_empty() {
                return Err(PostingError::validation(format!("{what} has no lines")));
            }
            Ok(())
        }
        fn amount(what: &str, value: Decimal, max: Decimal) -> Result<(), PostingError> {
            if value < Decimal::ZERO {
                return Err(PostingError::validation(format!("{what} must not be negative")));
            }
            if value > max {
                return Err(PostingError::validation(format!("{what} exceeds {max}")));
            }
            Ok(())
        }
        fn usd(what: &str, value: Decimal) -> Result<(), PostingError> {
            amount(what, value, MAX_AMOUNT_USD)
        }
        fn lbp(what: &str, value: Option<Decimal>) -> Result<(), PostingError> {
            value.map_or(Ok(()), |v| amount(what, v, MAX_AMOUNT_LBP))
        }
        fn rate(value: Option<Decimal>) -> Result<(), PostingError> {
            match value {
                Some(r) if r <= Decimal::ZERO || r > MAX_EXCHANGE_RATE => Err(
                    PostingError::validation(format!("exchange_rate must be in (0, {MAX_EXCHANGE_RATE}]")),
                ),
                _ => Ok(()),
            }
        }

        match self {
            EventPayload::Sale(p) => {
                non_empty("sale", &p.lines)?;
                rate(p.exchange_rate)?;
                for line in &p.lines {
                    positive(&line.sku, line.qty)?;
                    usd(&format!("{}: unit price", line.sku), line.unit_price_usd)?;
                    lbp(&format!("{}: unit price", line.sku), line.unit_price_lbp)?;
                    if line.discount_pct < Decimal::ZERO || line.discount_pct > Decimal::ONE_HUNDRED
                    {
                        return Err(PostingError::validation(format!(
                            "{}: discount_pct must be between 0 and 100",
                            line.sku
                        )));
                    }
                }
                for payment in &p.payments {
                    if let Some(v) = payment.amount_usd {
                        usd("payment", v)?;
                    }
                    lbp("payment", payment.amount_lbp)?;
                }
            }
            EventPayload::Return(p) => {
                non_empty("return", &p.lines)?;
                rate(p.exchange_rate)?;
                for line in &p.lines {
                    positive(&line.sku, line.qty)?;
                    usd(&format!("{}: unit price", line.sku), line.unit_price_usd)?;
                    lbp(&format!("{}: unit price", line.sku), line.unit_price_lbp)?;
                    if let Some(cost) = line.unit_cost_usd {
                        usd(&format!("{}: unit cost", line.sku), cost)?;
                    }
                }
            }
            EventPayload::Transfer(p) => {
                non_empty("transfer", &p.lines)?;
                if p.from_warehouse_id == p.to_warehouse_id {
                    return Err(PostingError::validation(
                        "transfer source and destination are the same warehouse",
                    ));
                }
                for line in &p.lines {
                    positive(&line.sku, line.qty)?;
                }
            }
            EventPayload::GoodsReceipt(p) => {
                non_empty("goods receipt", &p.lines)?;
                rate(p.exchange_rate)?;
                for line in &p.lines {
                    positive(&line.sku, line.qty)?;
                    usd(&format!("{}: unit cost", line.sku), line.unit_cost_usd)?;
                    lbp(&format!("{}: unit cost", line.sku), line.unit_cost_lbp)?;
                }
            }
            EventPayload::PurchaseInvoice(p) => {
                non_empty("purchase invoice", &p.lines)?;
                rate(p.exchange_rate)?;
                usd("tax_usd", p.tax_usd)?;
                for line in &p.lines {
                    positive(&line.sku, line.qty)?;
                    usd(&format!("{}: unit cost", line.sku), line.unit_cost_usd)?;
                }
            }
            EventPayload::PriceChange(p) => {
                non_empty("price change", &p.lines)?;
                for line in &p.lines {
                    usd(&format!("{}: unit price", line.sku), line.unit_price_usd)?;
                    lbp(&format!("{}: unit price", line.sku), line.unit_price_lbp)?;
                }
            }
            EventPayload::CashMovement(p) => {
                usd("cash movement amount", p.amount_usd)?;
                lbp("cash movement amount", Some(p.amount_lbp))?;
            }
            EventPayload::ShiftOpen(p) => {
                usd("opening cash", p.opening_cash_usd)?;
                lbp("opening cash", Some(p.opening_cash_lbp))?;
            }
            EventPayload::ShiftClose(p) => {
                usd("closing cash", p.closing_cash_usd)?;
                lbp("closing cash", Some(p.closing_cash_lbp))?;
            }
            EventPayload::JournalTemplateRun(_) | EventPayload::ExpirySweep(_) => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn decodes_device_sale() {
        let raw = json!({
            "lines": [{"item": "X", "qty": 2, "unit_price_usd": "5.00"}],
            "payment": "cash",
            "warehouse_id": Uuid::new_v4(),
        });
        let payload = EventPayload::decode(EventType::Sale, &raw).unwrap();
        match payload {
            EventPayload::Sale(sale) => {
                assert_eq!(sale.lines[0].sku, "X");
                assert_eq!(sale.lines[0].qty, dec!(2));
                assert_eq!(sale.payment, Some(PaymentMethod::Cash));
                assert_eq!(sale.company, CompanySelector::Auto);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn forced_company_parses() {
        let company = Uuid::new_v4();
        let raw = json!({
            "lines": [{"sku": "X", "qty": 1, "unit_price_usd": 1}],
            "warehouse_id": Uuid::new_v4(),
            "company": company.to_string(),
        });
        let payload = EventPayload::decode(EventType::Sale, &raw).unwrap();
        assert_matches!(payload, EventPayload::Sale(s) if s.company == CompanySelector::Forced(company));
    }

    #[test]
    fn unknown_type_and_bad_payload_are_validation_errors() {
        assert_matches!(
            EventType::parse("teleport"),
            Err(PostingError::Validation(_))
        );
        let raw = json!({"lines": "nope"});
        assert_matches!(
            EventPayload::decode(EventType::Sale, &raw),
            Err(PostingError::Validation(_))
        );
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let raw = json!({
            "lines": [{"sku": "X", "qty": 0, "unit_price_usd": 1}],
            "warehouse_id": Uuid::new_v4(),
        });
        assert_matches!(
            EventPayload::decode(EventType::Sale, &raw),
            Err(PostingError::Validation(_))
        );
    }

    #[test]
    fn magnitudes_beyond_the_ceilings_are_rejected() {
        let huge_qty = json!({
            "lines": [{"sku": "X", "qty": "1000000000000000000000000", "unit_price_usd": 10}],
        });
        assert_matches!(
            EventPayload::decode(EventType::Return, &huge_qty),
            Err(PostingError::Validation(msg)) if msg.contains("quantity")
        );

        let huge_rate = json!({
            "lines": [{"sku": "X", "qty": 1, "unit_price_usd": 10}],
            "exchange_rate": "100000000",
        });
        assert_matches!(
            EventPayload::decode(EventType::Sale, &huge_rate),
            Err(PostingError::Validation(_))
        );

        let at_ceiling = json!({
            "lines": [{"sku": "X", "qty": MAX_QTY, "unit_price_usd": MAX_AMOUNT_USD}],
        });
        assert!(EventPayload::decode(EventType::Sale, &at_ceiling).is_ok());
    }

    #[test]
    fn event_type_round_trips_through_strings() {
        assert_eq!(EventType::JournalTemplateRun.to_string(), "journal_template_run");
        assert_eq!(EventType::parse("goods_receipt").ok(), Some(EventType::GoodsReceipt));
        assert_eq!(
            EventType::ExpirySweep.document_type(),
            DocumentType::InventoryAdjustment
        );
    }

    #[test]
    fn skus_are_deduplicated_in_order() {
        let raw = json!({
            "lines": [
                {"sku": "B", "qty": 1, "unit_price_usd": 1},
                {"sku": "A", "qty": 1, "unit_price_usd": 1},
                {"sku": "B", "qty": 2, "unit_price_usd": 1}
            ],
            "warehouse_id": Uuid::new_v4(),
        });
        let payload = EventPayload::decode(EventType::Sale, &raw).unwrap();
        assert_eq!(payload.skus(), vec!["B".to_string(), "A".to_string()]);
    }
}
