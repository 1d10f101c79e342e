use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::hold::HoldReason;

/// Closed vocabulary of account roles a company maps to its chart of accounts.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
    strum::EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountRole {
    Ar,
    Ap,
    Cash,
    Bank,
    Sales,
    SalesReturns,
    VatPayable,
    VatRecoverable,
    Inventory,
    Cogs,
    InvAdj,
    Rounding,
    IntercoAr,
    IntercoAp,
    Grni,
    Shrinkage,
    PurchasesExpense,
    OpeningStock,
    OpeningBalance,
}

/// Role to account lookup for one company.
#[derive(Debug, Clone, Default)]
pub struct AccountRoleMap {
    company_id: Uuid,
    accounts: HashMap<AccountRole, Uuid>,
}

impl AccountRoleMap {
    pub fn new(company_id: Uuid) -> Self {
        Self {
            company_id,
            accounts: HashMap::new(),
        }
    }

    pub fn with(mut self, role: AccountRole, account_id: Uuid) -> Self {
        self.accounts.insert(role, account_id);
        self
    }

    pub fn insert(&mut self, role: AccountRole, account_id: Uuid) {
        self.accounts.insert(role, account_id);
    }

    pub fn company_id(&self) -> Uuid {
        self.company_id
    }

    pub fn get(&self, role: AccountRole) -> Option<Uuid> {
        self.accounts.get(&role).copied()
    }

    pub fn require(&self, role: AccountRole) -> Result<Uuid, HoldReason> {
        self.get(role).ok_or(HoldReason::MissingAccountMapping {
            company_id: self.company_id,
            role,
        })
    }
}
