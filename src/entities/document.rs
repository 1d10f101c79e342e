use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Canonical document kinds produced from outbox events.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    #[sea_orm(string_value = "invoice")]
    Invoice,
    #[sea_orm(string_value = "return")]
    Return,
    #[sea_orm(string_value = "shift_record")]
    ShiftRecord,
    #[sea_orm(string_value = "cash_movement")]
    CashMovement,
    #[sea_orm(string_value = "stock_move")]
    StockMove,
    #[sea_orm(string_value = "goods_receipt")]
    GoodsReceipt,
    #[sea_orm(string_value = "supplier_invoice")]
    SupplierInvoice,
    #[sea_orm(string_value = "price_change")]
    PriceChange,
    #[sea_orm(string_value = "manual_journal")]
    ManualJournal,
    #[sea_orm(string_value = "inventory_adjustment")]
    InventoryAdjustment,
}

impl DocumentType {
    /// Prefix used for per-company document numbering.
    pub fn number_prefix(&self) -> &'static str {
        match self {
            DocumentType::Invoice => "SI",
            DocumentType::Return => "SR",
            DocumentType::ShiftRecord => "SH",
            DocumentType::CashMovement => "CM",
            DocumentType::StockMove => "ST",
            DocumentType::GoodsReceipt => "GR",
            DocumentType::SupplierInvoice => "PI",
            DocumentType::PriceChange => "PC",
            DocumentType::ManualJournal => "JV",
            DocumentType::InventoryAdjustment => "IA",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "posted")]
    Posted,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Company the document was posted under.
    pub company_id: Uuid,
    /// Tenant that emitted the source event.
    pub origin_company_id: Uuid,
    #[sea_orm(unique)]
    pub source_event_id: Uuid,
    pub doc_type: DocumentType,
    pub doc_no: String,
    pub status: DocumentStatus,
    pub doc_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub exchange_rate: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub subtotal_usd: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub subtotal_lbp: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub tax_usd: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub tax_lbp: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub total_usd: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub total_lbp: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub rounding_usd: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub rounding_lbp: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub cost_usd: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub cost_lbp: Decimal,
    pub customer_id: Option<Uuid>,
    pub warehouse_id: Option<Uuid>,
    pub counter_warehouse_id: Option<Uuid>,
    pub shift_id: Option<Uuid>,
    pub device_id: Option<String>,
    pub reference_document_id: Option<Uuid>,
    #[sea_orm(column_type = "Text", nullable)]
    pub memo: Option<String>,
    pub metadata: Option<Json>,
    pub created_at: DateTime<Utc>,
    pub posted_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::document_line::Entity")]
    Lines,
    #[sea_orm(has_many = "super::document_payment::Entity")]
    Payments,
}

impl Related<super::document_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lines.def()
    }
}

impl Related<super::document_payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
