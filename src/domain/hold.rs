use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::roles::AccountRole;

/// Which part of a supplier invoice disagreed with its goods receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarianceKind {
    Quantity,
    UnitCost,
    Tax,
    /// Invoiced SKU absent from the receipt.
    Unmatched,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchVariance {
    pub sku: Option<String>,
    pub kind: VarianceKind,
    pub expected: Decimal,
    pub actual: Decimal,
}

/// Business-rule reasons that park an event for an operator.
///
/// Serialized with a `code` tag so exception rows carry the stable code
/// alongside the details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HoldReason {
    #[error("no account mapped to role {role} in company {company_id}")]
    MissingAccountMapping { company_id: Uuid, role: AccountRole },

    #[error("items not in the catalog of company {company_id}: {}", skus.join(", "))]
    ItemNotFound { company_id: Uuid, skus: Vec<String> },

    #[error("company {requested} is not linked to the emitting device")]
    AmbiguousCompany {
        requested: Uuid,
        candidates: Vec<Uuid>,
    },

    #[error("insufficient stock for {sku}: requested {requested}, available {available}")]
    InventoryShortage {
        item_id: Uuid,
        sku: String,
        requested: Decimal,
        available: Decimal,
    },

    #[error("journal out of balance by {usd} USD / {lbp} LBP")]
    PostingImbalance { usd: Decimal, lbp: Decimal },

    #[error("supplier invoice does not match receipt ({} variance(s))", variances.len())]
    MatchVariance { variances: Vec<MatchVariance> },

    #[error("period is locked for company {company_id} on {date}")]
    PeriodLocked { company_id: Uuid, date: NaiveDate },

    #[error("no {rate_type} exchange rate for company {company_id} on {date}")]
    MissingExchangeRate {
        company_id: Uuid,
        date: NaiveDate,
        rate_type: String,
    },

    #[error("credit limit exceeded for customer {customer_id}: limit {limit_usd}, exposure {exposure_usd}")]
    CreditLimitExceeded {
        customer_id: Uuid,
        limit_usd: Decimal,
        exposure_usd: Decimal,
    },
}

impl HoldReason {
    pub fn code(&self) -> &'static str {
        match self {
            HoldReason::MissingAccountMapping { .. } => "MISSING_ACCOUNT_MAPPING",
            HoldReason::ItemNotFound { .. } => "ITEM_NOT_FOUND",
            HoldReason::AmbiguousCompany { .. } => "AMBIGUOUS_COMPANY",
            HoldReason::InventoryShortage { .. } => "INVENTORY_SHORTAGE",
            HoldReason::PostingImbalance { .. } => "POSTING_IMBALANCE",
            HoldReason::MatchVariance { .. } => "MATCH_VARIANCE",
            HoldReason::PeriodLocked { .. } => "PERIOD_LOCKED",
            HoldReason::MissingExchangeRate { .. } => "MISSING_EXCHANGE_RATE",
            HoldReason::CreditLimitExceeded { .. } => "CREDIT_LIMIT_EXCEEDED",
        }
    }

    /// Company the condition was detected in, when the reason names one.
    pub fn company_id(&self) -> Option<Uuid> {
        match self {
            HoldReason::MissingAccountMapping { company_id, .. }
            | HoldReason::ItemNotFound { company_id, .. }
            | HoldReason::PeriodLocked { company_id, .. }
            | HoldReason::MissingExchangeRate { company_id, .. } => Some(*company_id),
            HoldReason::AmbiguousCompany { requested, .. } => Some(*requested),
            HoldReason::InventoryShortage { .. }
            | HoldReason::PostingImbalance { .. }
            | HoldReason::MatchVariance { .. }
            | HoldReason::CreditLimitExceeded { .. } => None,
        }
    }

    /// Details persisted on the exception row.
    pub fn details(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({ "code": self.code() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn details_carry_the_code_tag() {
        let reason = HoldReason::InventoryShortage {
            item_id: Uuid::nil(),
            sku: "X".into(),
            requested: dec!(5),
            available: dec!(2),
        };
        let details = reason.details();
        assert_eq!(details["code"], "INVENTORY_SHORTAGE");
        assert_eq!(details["sku"], "X");
        assert_eq!(reason.code(), "INVENTORY_SHORTAGE");
    }

    #[test]
    fn codes_match_serialized_tags() {
        let reasons = vec![
            HoldReason::PostingImbalance {
                usd: dec!(1),
                lbp: dec!(0),
            },
            HoldReason::PeriodLocked {
                company_id: Uuid::nil(),
                date: NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
            },
            HoldReason::MatchVariance { variances: vec![] },
        ];
        for reason in reasons {
            assert_eq!(reason.details()["code"], reason.code());
        }
    }
}
