//! Document → balanced journal entry.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectionTrait, DbErr, Set};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::document::DocumentDraft;
use crate::domain::hold::HoldReason;
use crate::domain::journal::{JournalDraft, JournalLineDraft, RoleLine};
use crate::domain::money::DualAmount;
use crate::domain::roles::{AccountRole, AccountRoleMap};
use crate::entities::document::DocumentType;
use crate::entities::journal_template_line::Side;
use crate::entities::{journal_entry, journal_line};

#[derive(Debug, Clone, Copy)]
pub struct LedgerPoster {
    tolerance: DualAmount,
}

impl LedgerPoster {
    pub fn new(usd_tolerance: Decimal, lbp_tolerance: Decimal) -> Self {
        Self {
            tolerance: DualAmount::new(usd_tolerance, lbp_tolerance),
        }
    }

    /// Posting template per document type, in role terms.
    pub fn expand(doc: &DocumentDraft) -> Vec<RoleLine> {
        if !doc.has_ledger_impact() {
            return Vec::new();
        }
        let revenue = doc.subtotal - doc.rounding;
        let mut lines = Vec::new();

        match doc.doc_type {
            DocumentType::Invoice => {
                for payment in &doc.payments {
                    lines.push(RoleLine::debit(
                        payment.method.role(),
                        payment.amount,
                        Some(format!("{} tender", payment.method.as_str())),
                    ));
                }
                lines.push(RoleLine::debit(AccountRole::Ar, doc.receivable, None));
                lines.push(RoleLine::credit(AccountRole::Sales, revenue, None));
                lines.push(RoleLine::credit(AccountRole::VatPayable, doc.tax, None));
                lines.push(RoleLine::credit(
                    AccountRole::Rounding,
                    doc.rounding,
                    Some("line rounding".into()),
                ));
                lines.push(RoleLine::debit(AccountRole::Cogs, doc.cost, None));
                lines.push(RoleLine::credit(AccountRole::Inventory, doc.cost, None));
            }
            DocumentType::Return => {
                lines.push(RoleLine::debit(AccountRole::SalesReturns, revenue, None));
                lines.push(RoleLine::debit(AccountRole::VatPayable, doc.tax, None));
                lines.push(RoleLine::debit(
                    AccountRole::Rounding,
                    doc.rounding,
                    Some("line rounding".into()),
                ));
                for payment in &doc.payments {
                    lines.push(RoleLine::credit(
                        payment.method.role(),
                        payment.amount,
                        Some(format!("{} refund", payment.method.as_str())),
                    ));
                }
                lines.push(RoleLine::debit(AccountRole::Inventory, doc.cost, None));
                lines.push(RoleLine::credit(AccountRole::Cogs, doc.cost, None));
            }
            DocumentType::GoodsReceipt => {
                lines.push(RoleLine::debit(AccountRole::Inventory, doc.total, None));
                lines.push(RoleLine::credit(AccountRole::Grni, doc.total, None));
            }
            DocumentType::SupplierInvoice => {
                lines.push(RoleLine::debit(AccountRole::Grni, doc.subtotal, None));
                lines.push(RoleLine::debit(AccountRole::VatRecoverable, doc.tax, None));
                lines.push(RoleLine::credit(AccountRole::Ap, doc.total, None));
            }
            DocumentType::ManualJournal => {
                for line in &doc.manual_lines {
                    lines.push(match line.side {
                        Side::Debit => RoleLine::debit(line.role, line.amount, line.memo.clone()),
                        Side::Credit => RoleLine::credit(line.role, line.amount, line.memo.clone()),
                    });
                }
            }
            DocumentType::InventoryAdjustment => {
                lines.push(RoleLine::debit(AccountRole::Shrinkage, doc.cost, None));
                lines.push(RoleLine::credit(AccountRole::Inventory, doc.cost, None));
            }
            DocumentType::ShiftRecord
            | DocumentType::CashMovement
            | DocumentType::StockMove
            | DocumentType::PriceChange => {}
        }

        lines.retain(|l| !l.is_zero());
        lines
    }

    /// Closes any per-currency residual through ROUNDING when it is within
    /// tolerance; anything larger is an imbalance.
    pub fn balance(&self, lines: &mut Vec<RoleLine>) -> Result<(), HoldReason> {
        let net: DualAmount = lines.iter().map(RoleLine::net).sum();
        if net.is_zero() {
            return Ok(());
        }
        if net.usd.abs() > self.tolerance.usd || net.lbp.abs() > self.tolerance.lbp {
            warn!(usd = %net.usd, lbp = %net.lbp, "journal out of balance beyond tolerance");
            return Err(HoldReason::PostingImbalance {
                usd: net.usd,
                lbp: net.lbp,
            });
        }
        debug!(usd = %net.usd, lbp = %net.lbp, "closing residual through rounding");
        lines.push(RoleLine::signed(
            AccountRole::Rounding,
            -net,
            Some("currency rounding".into()),
        ));
        Ok(())
    }

    /// Full posting: template, balance, role → account.
    /// `None` when the document carries no ledger effect.
    pub fn post(
        &self,
        doc: &DocumentDraft,
        roles: &AccountRoleMap,
    ) -> Result<Option<JournalDraft>, HoldReason> {
        let mut lines = Self::expand(doc);
        if lines.is_empty() {
            return Ok(None);
        }
        self.balance(&mut lines)?;

        let mut resolved = Vec::with_capacity(lines.len());
        for line in lines {
            resolved.push(JournalLineDraft {
                account_id: roles.require(line.role)?,
                role: line.role,
                debit: line.debit,
                credit: line.credit,
                memo: line.memo,
            });
        }

        let journal = JournalDraft {
            company_id: doc.company_id,
            entry_date: doc.doc_date,
            exchange_rate: doc.exchange_rate,
            memo: doc.memo.clone(),
            lines: resolved,
        };
        if !journal.is_balanced() {
            let net = journal.total_debit() - journal.total_credit();
            return Err(HoldReason::PostingImbalance {
                usd: net.usd,
                lbp: net.lbp,
            });
        }
        Ok(Some(journal))
    }

    pub async fn persist<C>(
        conn: &C,
        document_id: Uuid,
        journal_no: &str,
        journal: &JournalDraft,
    ) -> Result<journal_entry::Model, DbErr>
    where
        C: ConnectionTrait,
    {
        let totals = journal.total_debit();
        let entry = journal_entry::ActiveModel {
            id: Set(Uuid::new_v4()),
            company_id: Set(journal.company_id),
            document_id: Set(document_id),
            journal_no: Set(journal_no.to_string()),
            entry_date: Set(journal.entry_date),
            exchange_rate: Set(journal.exchange_rate),
            memo: Set(journal.memo.clone()),
            total_debit_usd: Set(totals.usd),
            total_debit_lbp: Set(totals.lbp),
            created_at: Set(Utc::now()),
        }
        .insert(conn)
        .await?;

        for (idx, line) in journal.lines.iter().enumerate() {
            journal_line::ActiveModel {
                id: Set(Uuid::new_v4()),
                entry_id: Set(entry.id),
                line_no: Set(idx as i32 + 1),
                account_id: Set(line.account_id),
                role_code: Set(line.role.to_string()),
                debit_usd: Set(line.debit.usd),
                credit_usd: Set(line.credit.usd),
                debit_lbp: Set(line.debit.lbp),
                credit_lbp: Set(line.credit.lbp),
                memo: Set(line.memo.clone()),
            }
            .insert(conn)
            .await?;
        }
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::{EventPayload, PaymentMethod, SaleLine, SalePayload};
    use crate::domain::CompanySelector;
    use crate::services::allocator::Pick;
    use crate::services::document_builder::{build, DocContext, LineStock, ResolvedRefs};
    use crate::services::resolver::ResolvedItem;
    use assert_matches::assert_matches;
    use chrono::NaiveDate;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use strum::IntoEnumIterator;

    fn full_map(company: Uuid) -> AccountRoleMap {
        let mut map = AccountRoleMap::new(company);
        for role in AccountRole::iter() {
            map.insert(role, Uuid::new_v4());
        }
        map
    }

    fn sale_doc(prices: &[(Decimal, Decimal, Decimal)], rate: Decimal) -> DocumentDraft {
        let company = Uuid::new_v4();
        let ctx = DocContext {
            event_id: Uuid::new_v4(),
            company_id: company,
            origin_company_id: company,
            doc_date: NaiveDate::from_ymd_opt(2026, 5, 2).unwrap(),
            exchange_rate: rate,
        };
        let mut refs = ResolvedRefs::default();
        let mut lines = Vec::new();
        let mut stock = Vec::new();
        for (idx, (price, qty, tax)) in prices.iter().enumerate() {
            let sku = format!("SKU{idx}");
            refs.items.insert(
                sku.clone(),
                ResolvedItem {
                    id: Uuid::new_v4(),
                    company_id: company,
                    sku: sku.clone(),
                    name: sku.clone(),
                    unit_price_usd: *price,
                    unit_price_lbp: None,
                    standard_cost: DualAmount::ZERO,
                    tax_code_id: Some(Uuid::from_u128(idx as u128 % 2)),
                    tax_rate: *tax,
                },
            );
            lines.push(SaleLine {
                sku,
                qty: *qty,
                unit_price_usd: *price,
                unit_price_lbp: None,
                discount_pct: Decimal::ZERO,
                batch_no: None,
            });
            stock.push(LineStock {
                outbound: vec![Pick {
                    batch_id: Some(Uuid::new_v4()),
                    qty: *qty,
                    unit_cost: DualAmount::from_usd(price / dec!(3), rate),
                }],
                inbound: Vec::new(),
            });
        }
        let payload = SalePayload {
            lines,
            payments: Vec::new(),
            payment: Some(PaymentMethod::Cash),
            customer_id: None,
            warehouse_id: Some(Uuid::new_v4()),
            exchange_rate: None,
            company: CompanySelector::Auto,
            shift_id: None,
            invoice_no: None,
        };
        build(&ctx, &EventPayload::Sale(payload), &refs, &stock).unwrap()
    }

    #[test]
    fn cash_sale_posts_cash_sales_cogs_inventory() {
        let doc = sale_doc(&[(dec!(5.00), dec!(2), Decimal::ZERO)], dec!(89500));
        let roles = full_map(doc.company_id);
        let journal = LedgerPoster::new(dec!(0.05), dec!(5000))
            .post(&doc, &roles)
            .unwrap()
            .unwrap();

        let by_role = |role: AccountRole| {
            journal
                .lines
                .iter()
                .filter(|l| l.role == role)
                .fold(DualAmount::ZERO, |acc, l| acc + l.debit - l.credit)
        };
        assert_eq!(by_role(AccountRole::Cash).usd, dec!(10.00));
        assert_eq!(by_role(AccountRole::Sales).usd, dec!(-10.00));
        assert!(by_role(AccountRole::Cogs).usd > Decimal::ZERO);
        assert_eq!(by_role(AccountRole::Cogs), -by_role(AccountRole::Inventory));
        assert!(journal.is_balanced());
    }

    #[test]
    fn missing_role_mapping_holds() {
        let doc = sale_doc(&[(dec!(5.00), dec!(1), Decimal::ZERO)], dec!(89500));
        let roles = AccountRoleMap::new(doc.company_id).with(AccountRole::Cash, Uuid::new_v4());
        assert_matches!(
            LedgerPoster::new(dec!(0.05), dec!(5000)).post(&doc, &roles),
            Err(HoldReason::MissingAccountMapping { role: AccountRole::Sales, .. })
        );
    }

    #[test]
    fn residual_beyond_tolerance_is_an_imbalance() {
        let poster = LedgerPoster::new(dec!(0.05), dec!(5000));
        let mut lines = vec![
            RoleLine::debit(AccountRole::Cash, DualAmount::new(dec!(10), dec!(895000)), None),
            RoleLine::credit(AccountRole::Sales, DualAmount::new(dec!(9), dec!(895000)), None),
        ];
        assert_matches!(
            poster.balance(&mut lines),
            Err(HoldReason::PostingImbalance { usd, .. }) if usd == dec!(1)
        );

        let mut lines = vec![
            RoleLine::debit(AccountRole::Cash, DualAmount::new(dec!(10), dec!(895000)), None),
            RoleLine::credit(AccountRole::Sales, DualAmount::new(dec!(9.99), dec!(894999)), None),
        ];
        poster.balance(&mut lines).unwrap();
        let rounding = lines.last().unwrap();
        assert_eq!(rounding.role, AccountRole::Rounding);
        assert_eq!(rounding.credit, DualAmount::new(dec!(0.01), dec!(1)));
    }

    #[test]
    fn operational_documents_have_no_journal() {
        let mut doc = sale_doc(&[(dec!(1), dec!(1), Decimal::ZERO)], dec!(89500));
        doc.doc_type = DocumentType::StockMove;
        assert!(LedgerPoster::expand(&doc).is_empty());
    }

    proptest! {
        #[test]
        fn every_posted_sale_balances_per_currency(
            lines in proptest::collection::vec(
                (1_000u32..100_000, 1u32..20, prop_oneof![Just(0u32), Just(11u32), Just(5u32)]),
                1..6,
            ),
            rate in 1u32..100_000,
        ) {
            let prices: Vec<(Decimal, Decimal, Decimal)> = lines
                .iter()
                .map(|(cents, qty, pct)| {
                    (
                        Decimal::new(i64::from(*cents), 3),
                        Decimal::from(*qty),
                        Decimal::from(*pct) / dec!(100),
                    )
                })
                .collect();
            let doc = sale_doc(&prices, Decimal::from(rate));
            let roles = full_map(doc.company_id);
            let journal = LedgerPoster::new(dec!(0.05), dec!(5000))
                .post(&doc, &roles)
                .unwrap()
                .unwrap();
            let debit = journal.total_debit();
            let credit = journal.total_credit();
            prop_assert_eq!(debit.usd, credit.usd);
            prop_assert_eq!(debit.lbp, credit.lbp);
        }
    }
}
