use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "journal_lines")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub entry_id: Uuid,
    pub line_no: i32,
    pub account_id: Uuid,
    pub role_code: String,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub debit_usd: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub credit_usd: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub debit_lbp: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub credit_lbp: Decimal,
    pub memo: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::journal_entry::Entity",
        from = "Column::EntryId",
        to = "super::journal_entry::Column::Id",
        on_delete = "Cascade"
    )]
    Entry,
}

impl Related<super::journal_entry::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Entry.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
