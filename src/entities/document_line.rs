use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "document_lines")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub document_id: Uuid,
    pub line_no: i32,
    pub item_id: Option<Uuid>,
    pub sku: Option<String>,
    pub description: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub qty: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub unit_price_usd: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub unit_price_lbp: Decimal,
    #[sea_orm(column_type = "Decimal(Some((9, 6)))")]
    pub discount_pct: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub line_total_usd: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub line_total_lbp: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub tax_usd: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub tax_lbp: Decimal,
    pub tax_code_id: Option<Uuid>,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub cost_usd: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub cost_lbp: Decimal,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::document::Entity",
        from = "Column::DocumentId",
        to = "super::document::Column::Id",
        on_delete = "Cascade"
    )]
    Document,
}

impl Related<super::document::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Document.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
