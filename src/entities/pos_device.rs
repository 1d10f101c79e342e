use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "pos_devices")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Origin company of every event the device emits.
    pub company_id: Uuid,
    /// JSON array of company ids the device may invoice under.
    pub linked_company_ids: Json,
    pub warehouse_id: Option<Uuid>,
    pub is_active: bool,
}

impl Model {
    /// Linked companies, origin first, without duplicates.
    pub fn candidate_companies(&self) -> Vec<Uuid> {
        let mut out = vec![self.company_id];
        if let Some(ids) = self.linked_company_ids.as_array() {
            for id in ids.iter().filter_map(|v| v.as_str()) {
                if let Ok(id) = Uuid::parse_str(id) {
                    if !out.contains(&id) {
                        out.push(id);
                    }
                }
            }
        }
        out
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
