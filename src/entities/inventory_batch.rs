use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Status of a lot. Only `Available` lots are eligible for allocation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum LotStatus {
    #[sea_orm(string_value = "available")]
    Available,
    #[sea_orm(string_value = "quarantine")]
    Quarantine,
    #[sea_orm(string_value = "expired")]
    Expired,
}

impl LotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LotStatus::Available => "available",
            LotStatus::Quarantine => "quarantine",
            LotStatus::Expired => "expired",
        }
    }

    /// Expired is terminal; everything else may move between the two live states
    /// or into expiry.
    pub fn can_transition_to(&self, next: LotStatus) -> bool {
        matches!(
            (self, next),
            (LotStatus::Available, LotStatus::Quarantine)
                | (LotStatus::Quarantine, LotStatus::Available)
                | (LotStatus::Quarantine, LotStatus::Expired)
                | (LotStatus::Available, LotStatus::Expired)
        )
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_batches")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub company_id: Uuid,
    pub item_id: Uuid,
    pub warehouse_id: Uuid,
    pub batch_no: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub received_at: DateTime<Utc>,
    pub status: LotStatus,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub on_hand_qty: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub unit_cost_usd: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub unit_cost_lbp: Decimal,
    #[sea_orm(column_type = "Text", nullable)]
    pub status_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
