use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum ProcessedOutcome {
    #[sea_orm(string_value = "processed")]
    Processed,
    #[sea_orm(string_value = "held")]
    Held,
    #[sea_orm(string_value = "dead")]
    Dead,
}

impl ProcessedOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessedOutcome::Processed => "processed",
            ProcessedOutcome::Held => "held",
            ProcessedOutcome::Dead => "dead",
        }
    }
}

/// Guard row: one per `(device_id, device_seq)` that reached a terminal outcome.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "processed_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub event_id: Uuid,
    pub tenant_id: Uuid,
    pub device_id: String,
    pub device_seq: i64,
    pub outcome: ProcessedOutcome,
    pub document_id: Option<Uuid>,
    pub journal_entry_id: Option<Uuid>,
    pub reason_code: Option<String>,
    pub processed_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
