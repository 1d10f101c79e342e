use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "customers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Owning company. Other companies may sell to the customer but never mutate it.
    pub company_id: Uuid,
    pub name: String,
    /// Zero means no limit.
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub credit_limit_usd: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub credit_limit_lbp: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub credit_balance_usd: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub credit_balance_lbp: Decimal,
    pub payment_terms_days: i32,
    pub is_active: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
