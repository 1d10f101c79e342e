use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(8))")]
#[serde(rename_all = "snake_case")]
pub enum Side {
    #[sea_orm(string_value = "debit")]
    Debit,
    #[sea_orm(string_value = "credit")]
    Credit,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "journal_template_lines")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub template_id: Uuid,
    pub line_no: i32,
    pub role_code: String,
    pub side: Side,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub amount_usd: Decimal,
    /// Derived from the run-date rate when empty.
    #[sea_orm(column_type = "Decimal(Some((16, 4)))", nullable)]
    pub amount_lbp: Option<Decimal>,
    pub memo: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::journal_template::Entity",
        from = "Column::TemplateId",
        to = "super::journal_template::Column::Id",
        on_delete = "Cascade"
    )]
    Template,
}

impl Related<super::journal_template::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Template.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
