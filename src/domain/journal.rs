use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::money::DualAmount;
use crate::domain::roles::AccountRole;

/// Journal line before account resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleLine {
    pub role: AccountRole,
    pub debit: DualAmount,
    pub credit: DualAmount,
    pub memo: Option<String>,
}

impl RoleLine {
    pub fn debit(role: AccountRole, amount: DualAmount, memo: Option<String>) -> Self {
        Self::signed(role, amount, memo)
    }

    pub fn credit(role: AccountRole, amount: DualAmount, memo: Option<String>) -> Self {
        Self::signed(role, -amount, memo)
    }

    /// Positive amounts debit, negative amounts credit, per currency.
    pub fn signed(role: AccountRole, amount: DualAmount, memo: Option<String>) -> Self {
        let debit = amount.positive_part();
        let credit = (-amount).positive_part();
        Self {
            role,
            debit,
            credit,
            memo,
        }
    }

    pub fn net(&self) -> DualAmount {
        self.debit - self.credit
    }

    pub fn is_zero(&self) -> bool {
        self.debit.is_zero() && self.credit.is_zero()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JournalLineDraft {
    pub role: AccountRole,
    pub account_id: Uuid,
    pub debit: DualAmount,
    pub credit: DualAmount,
    pub memo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JournalDraft {
    pub company_id: Uuid,
    pub entry_date: NaiveDate,
    pub exchange_rate: Decimal,
    pub memo: Option<String>,
    pub lines: Vec<JournalLineDraft>,
}

impl JournalDraft {
    pub fn total_debit(&self) -> DualAmount {
        self.lines.iter().map(|l| l.debit).sum()
    }

    pub fn total_credit(&self) -> DualAmount {
        self.lines.iter().map(|l| l.credit).sum()
    }

    /// Debits equal credits in each currency independently.
    pub fn is_balanced(&self) -> bool {
        self.total_debit() == self.total_credit()
    }
}
