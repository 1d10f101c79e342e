use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::event::PaymentMethod;
use crate::domain::hold::HoldReason;
use crate::domain::money::DualAmount;
use crate::domain::roles::AccountRole;
use crate::entities::document::{DocumentStatus, DocumentType};
use crate::entities::journal_template_line::Side;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentLineDraft {
    pub line_no: i32,
    pub item_id: Option<Uuid>,
    pub sku: Option<String>,
    pub description: Option<String>,
    pub qty: Decimal,
    pub unit_price: DualAmount,
    pub discount_pct: Decimal,
    /// Net of discount, rounded per line.
    pub line_total: DualAmount,
    pub tax: DualAmount,
    pub tax_code_id: Option<Uuid>,
    /// Total cost of the line at lot cost.
    pub cost: DualAmount,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentDraft {
    pub method: PaymentMethod,
    pub amount: DualAmount,
}

/// One lot-level inventory effect.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockEffect {
    pub line_no: i32,
    pub item_id: Uuid,
    pub warehouse_id: Uuid,
    /// Empty for backordered quantity.
    pub batch_id: Option<Uuid>,
    pub qty_in: Decimal,
    pub qty_out: Decimal,
    pub unit_cost: DualAmount,
}

/// A journal line a manual journal asks for directly, by role.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManualLine {
    pub role: AccountRole,
    pub side: Side,
    pub amount: DualAmount,
    pub memo: Option<String>,
}

/// Canonical document before persistence.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentDraft {
    pub doc_type: DocumentType,
    pub company_id: Uuid,
    pub status: DocumentStatus,
    /// Number supplied by the device; generated when absent.
    pub doc_no: Option<String>,
    pub doc_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub exchange_rate: Decimal,
    pub customer_id: Option<Uuid>,
    pub warehouse_id: Option<Uuid>,
    pub counter_warehouse_id: Option<Uuid>,
    pub shift_id: Option<Uuid>,
    pub reference_document_id: Option<Uuid>,
    pub memo: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub lines: Vec<DocumentLineDraft>,
    pub payments: Vec<PaymentDraft>,
    pub stock: Vec<StockEffect>,
    pub manual_lines: Vec<ManualLine>,
    pub subtotal: DualAmount,
    pub tax: DualAmount,
    pub total: DualAmount,
    /// `total - (subtotal + tax)` after per-line rounding.
    pub rounding: DualAmount,
    /// Inventory value moved by the document.
    pub cost: DualAmount,
    /// Unsettled part of the total, carried on AR.
    pub receivable: DualAmount,
    /// Set when the document is kept as a draft for review.
    pub hold: Option<HoldReason>,
}

impl DocumentDraft {
    pub fn new(doc_type: DocumentType, company_id: Uuid, doc_date: NaiveDate) -> Self {
        Self {
            doc_type,
            company_id,
            status: DocumentStatus::Posted,
            doc_no: None,
            doc_date,
            due_date: None,
            exchange_rate: Decimal::ZERO,
            customer_id: None,
            warehouse_id: None,
            counter_warehouse_id: None,
            shift_id: None,
            reference_document_id: None,
            memo: None,
            metadata: None,
            lines: Vec::new(),
            payments: Vec::new(),
            stock: Vec::new(),
            manual_lines: Vec::new(),
            subtotal: DualAmount::ZERO,
            tax: DualAmount::ZERO,
            total: DualAmount::ZERO,
            rounding: DualAmount::ZERO,
            cost: DualAmount::ZERO,
            receivable: DualAmount::ZERO,
            hold: None,
        }
    }

    /// Whether the document type posts to the ledger at all.
    pub fn has_ledger_impact(&self) -> bool {
        if self.status == DocumentStatus::Draft {
            return false;
        }
        match self.doc_type {
            DocumentType::Invoice
            | DocumentType::Return
            | DocumentType::GoodsReceipt
            | DocumentType::SupplierInvoice
            | DocumentType::ManualJournal
            | DocumentType::InventoryAdjustment => true,
            DocumentType::ShiftRecord
            | DocumentType::CashMovement
            | DocumentType::StockMove
            | DocumentType::PriceChange => false,
        }
    }

    pub fn paid(&self) -> DualAmount {
        self.payments.iter().map(|p| p.amount).sum()
    }

    /// Everything owed by the customer: the unpaid remainder plus tenders
    /// explicitly put on account.
    pub fn on_account(&self) -> DualAmount {
        self.receivable
            + self
                .payments
                .iter()
                .filter(|p| p.method == PaymentMethod::Credit)
                .map(|p| p.amount)
                .sum::<DualAmount>()
    }
}
