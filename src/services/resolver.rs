//! Catalog and account resolution for one event.
//!
//! Company selection is a pure function over explicit inputs
//! ([`resolve_company`]); the database side only gathers those inputs.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
};
use serde::Serialize;
use std::str::FromStr;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::event::CompanySelector;
use crate::domain::hold::HoldReason;
use crate::domain::money::{from_storage, DualAmount};
use crate::domain::roles::{AccountRole, AccountRoleMap};
use crate::entities::{
    account_role_mapping, catalog_item, customer, exchange_rate, period_lock, pos_device,
    tax_code,
};
use crate::errors::PostingError;

/// SKUs one company's catalog offers, restricted to those asked about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogView {
    pub company_id: Uuid,
    pub skus: HashSet<String>,
}

impl CatalogView {
    pub fn new<I, S>(company_id: Uuid, skus: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            company_id,
            skus: skus.into_iter().map(Into::into).collect(),
        }
    }

    fn contains_all(&self, cart: &[String]) -> bool {
        cart.iter().all(|sku| self.skus.contains(sku))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionRule {
    Forced,
    UniqueCatalog,
    Origin,
}

/// Which company a cart resolves to, plus the SKUs that company lacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyDecision {
    pub company_id: Uuid,
    pub rule: ResolutionRule,
    pub missing: Vec<String>,
}

impl CompanyDecision {
    /// Missing items park the event instead of posting a partial document.
    pub fn into_result(self) -> Result<Uuid, HoldReason> {
        if self.missing.is_empty() {
            Ok(self.company_id)
        } else {
            Err(HoldReason::ItemNotFound {
                company_id: self.company_id,
                skus: self.missing,
            })
        }
    }
}

/// Picks the invoicing company for a cart.
///
/// `catalogs` are the companies the device may sell under, origin included.
/// A forced company outside that set is an ambiguity, not a silent override.
pub fn resolve_company(
    selector: CompanySelector,
    origin: Uuid,
    catalogs: &[CatalogView],
    cart: &[String],
) -> Result<CompanyDecision, HoldReason> {
    let missing_in = |company_id: Uuid| -> Vec<String> {
        let view = catalogs.iter().find(|c| c.company_id == company_id);
        cart.iter()
            .filter(|sku| view.map_or(true, |v| !v.skus.contains(*sku)))
            .cloned()
            .collect()
    };

    if let CompanySelector::Forced(requested) = selector {
        if requested != origin && !catalogs.iter().any(|c| c.company_id == requested) {
            return Err(HoldReason::AmbiguousCompany {
                requested,
                candidates: catalogs.iter().map(|c| c.company_id).collect(),
            });
        }
        return Ok(CompanyDecision {
            company_id: requested,
            rule: ResolutionRule::Forced,
            missing: missing_in(requested),
        });
    }

    if !cart.is_empty() {
        let mut covering = catalogs.iter().filter(|c| c.contains_all(cart));
        if let (Some(only), None) = (covering.next(), covering.next()) {
            return Ok(CompanyDecision {
                company_id: only.company_id,
                rule: ResolutionRule::UniqueCatalog,
                missing: Vec::new(),
            });
        }
    }

    Ok(CompanyDecision {
        company_id: origin,
        rule: ResolutionRule::Origin,
        missing: missing_in(origin),
    })
}

/// Where an event came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceContext {
    pub origin_company_id: Uuid,
    pub companies: Vec<Uuid>,
    pub warehouse_id: Option<Uuid>,
}

/// Catalog entry with its tax rate, as seen by the builder.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedItem {
    pub id: Uuid,
    pub company_id: Uuid,
    pub sku: String,
    pub name: String,
    pub unit_price_usd: Decimal,
    pub unit_price_lbp: Option<Decimal>,
    pub standard_cost: DualAmount,
    pub tax_code_id: Option<Uuid>,
    /// Fraction, e.g. `0.11` for 11% VAT.
    pub tax_rate: Decimal,
}

pub type ItemBook = HashMap<String, ResolvedItem>;

#[derive(Debug, Clone)]
pub struct Resolver {
    default_rate_type: String,
}

impl Resolver {
    pub fn new(default_rate_type: impl Into<String>) -> Self {
        Self {
            default_rate_type: default_rate_type.into(),
        }
    }

    pub fn default_rate_type(&self) -> &str {
        &self.default_rate_type
    }

    /// Device registry lookup. Unknown devices sell only under the tenant.
    pub async fn device<C>(
        &self,
        conn: &C,
        tenant_id: Uuid,
        device_id: &str,
    ) -> Result<DeviceContext, DbErr>
    where
        C: ConnectionTrait,
    {
        let device = pos_device::Entity::find_by_id(device_id.to_string())
            .one(conn)
            .await?;
        let Some(device) = device.filter(|d| d.is_active) else {
            return Ok(DeviceContext {
                origin_company_id: tenant_id,
                companies: vec![tenant_id],
                warehouse_id: None,
            });
        };

        if device.company_id != tenant_id {
            warn!(device_id, %tenant_id, device_company = %device.company_id, "device registered under another company");
        }
        let mut companies = vec![tenant_id];
        for company in device.candidate_companies() {
            if !companies.contains(&company) {
                companies.push(company);
            }
        }
        Ok(DeviceContext {
            origin_company_id: tenant_id,
            companies,
            warehouse_id: device.warehouse_id,
        })
    }

    pub async fn catalog_views<C>(
        &self,
        conn: &C,
        companies: &[Uuid],
        skus: &[String],
    ) -> Result<Vec<CatalogView>, DbErr>
    where
        C: ConnectionTrait,
    {
        if skus.is_empty() {
            return Ok(companies
                .iter()
                .map(|c| CatalogView::new(*c, Vec::<String>::new()))
                .collect());
        }
        let rows = catalog_item::Entity::find()
            .filter(catalog_item::Column::CompanyId.is_in(companies.iter().copied()))
            .filter(catalog_item::Column::Sku.is_in(skus.iter().cloned()))
            .filter(catalog_item::Column::IsActive.eq(true))
            .all(conn)
            .await?;

        let mut by_company: BTreeMap<Uuid, HashSet<String>> = BTreeMap::new();
        for row in rows {
            by_company.entry(row.company_id).or_default().insert(row.sku);
        }
        Ok(companies
            .iter()
            .map(|company| CatalogView {
                company_id: *company,
                skus: by_company.remove(company).unwrap_or_default(),
            })
            .collect())
    }

    /// Loads every SKU from one company's catalog, holding on any gap.
    pub async fn items<C>(
        &self,
        conn: &C,
        company_id: Uuid,
        skus: &[String],
        rate: Decimal,
    ) -> Result<ItemBook, PostingError>
    where
        C: ConnectionTrait,
    {
        let rows = catalog_item::Entity::find()
            .filter(catalog_item::Column::CompanyId.eq(company_id))
            .filter(catalog_item::Column::Sku.is_in(skus.iter().cloned()))
            .filter(catalog_item::Column::IsActive.eq(true))
            .all(conn)
            .await?;

        let tax_ids: Vec<Uuid> = rows.iter().filter_map(|r| r.tax_code_id).collect();
        let rates: HashMap<Uuid, Decimal> = if tax_ids.is_empty() {
            HashMap::new()
        } else {
            tax_code::Entity::find()
                .filter(tax_code::Column::Id.is_in(tax_ids))
                .filter(tax_code::Column::IsActive.eq(true))
                .all(conn)
                .await?
                .into_iter()
                .map(|t| (t.id, from_storage(t.rate)))
                .collect()
        };

        let mut book = ItemBook::with_capacity(rows.len());
        for row in rows {
            let tax_rate = row
                .tax_code_id
                .and_then(|id| rates.get(&id).copied())
                .unwrap_or(Decimal::ZERO);
            let standard_cost = if row.standard_cost_lbp.is_zero() {
                DualAmount::from_usd(from_storage(row.standard_cost_usd), rate)
            } else {
                DualAmount::from_storage(row.standard_cost_usd, row.standard_cost_lbp)
            };
            book.insert(
                row.sku.clone(),
                ResolvedItem {
                    id: row.id,
                    company_id: row.company_id,
                    sku: row.sku,
                    name: row.name,
                    unit_price_usd: from_storage(row.unit_price_usd),
                    unit_price_lbp: row.unit_price_lbp.map(from_storage),
                    standard_cost,
                    tax_code_id: row.tax_code_id.filter(|id| rates.contains_key(id)),
                    tax_rate,
                },
            );
        }

        let missing: Vec<String> = skus
            .iter()
            .filter(|sku| !book.contains_key(*sku))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(HoldReason::ItemNotFound {
                company_id,
                skus: missing,
            }
            .into());
        }
        Ok(book)
    }

    pub async fn account_roles<C>(&self, conn: &C, company_id: Uuid) -> Result<AccountRoleMap, DbErr>
    where
        C: ConnectionTrait,
    {
        let rows = account_role_mapping::Entity::find()
            .filter(account_role_mapping::Column::CompanyId.eq(company_id))
            .all(conn)
            .await?;
        let mut map = AccountRoleMap::new(company_id);
        for row in rows {
            match AccountRole::from_str(&row.role_code) {
                Ok(role) => map.insert(role, row.account_id),
                Err(_) => warn!(%company_id, role_code = %row.role_code, "ignoring unknown account role"),
            }
        }
        Ok(map)
    }

    /// Rate for a document: an explicit payload rate wins, then the rate of
    /// the day, then the latest earlier rate.
    pub async fn exchange_rate<C>(
        &self,
        conn: &C,
        company_id: Uuid,
        date: NaiveDate,
        rate_type: Option<&str>,
        payload_rate: Option<Decimal>,
    ) -> Result<Decimal, PostingError>
    where
        C: ConnectionTrait,
    {
        if let Some(rate) = payload_rate {
            if rate <= Decimal::ZERO {
                return Err(PostingError::validation("exchange_rate must be positive"));
            }
            return Ok(rate);
        }

        let rate_type = rate_type.unwrap_or(&self.default_rate_type);
        let found = exchange_rate::Entity::find()
            .filter(exchange_rate::Column::CompanyId.eq(company_id))
            .filter(exchange_rate::Column::RateType.eq(rate_type))
            .filter(exchange_rate::Column::RateDate.lte(date))
            .order_by_desc(exchange_rate::Column::RateDate)
            .one(conn)
            .await?;

        match found {
            Some(row) => {
                if row.rate_date != date {
                    debug!(%company_id, %date, rate_date = %row.rate_date, "using latest earlier exchange rate");
                }
                Ok(from_storage(row.usd_to_lbp))
            }
            None => Err(HoldReason::MissingExchangeRate {
                company_id,
                date,
                rate_type: rate_type.to_string(),
            }
            .into()),
        }
    }

    pub async fn assert_period_open<C>(
        &self,
        conn: &C,
        company_id: Uuid,
        date: NaiveDate,
    ) -> Result<(), PostingError>
    where
        C: ConnectionTrait,
    {
        let locks = period_lock::Entity::find()
            .filter(period_lock::Column::CompanyId.eq(company_id))
            .filter(period_lock::Column::Locked.eq(true))
            .filter(period_lock::Column::StartDate.lte(date))
            .filter(period_lock::Column::EndDate.gte(date))
            .all(conn)
            .await?;
        if locks.iter().any(|l| l.covers(date)) {
            return Err(HoldReason::PeriodLocked { company_id, date }.into());
        }
        Ok(())
    }

    pub async fn customer<C>(
        &self,
        conn: &C,
        customer_id: Uuid,
    ) -> Result<customer::Model, PostingError>
    where
        C: ConnectionTrait,
    {
        customer::Entity::find_by_id(customer_id)
            .one(conn)
            .await?
            .filter(|c| c.is_active)
            .ok_or_else(|| PostingError::validation(format!("unknown customer {customer_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn cart(skus: &[&str]) -> Vec<String> {
        skus.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn auto_picks_the_only_catalog_carrying_the_cart() {
        let official = Uuid::new_v4();
        let unofficial = Uuid::new_v4();
        let catalogs = vec![
            CatalogView::new(official, ["A"]),
            CatalogView::new(unofficial, ["A", "U"]),
        ];

        let decision =
            resolve_company(CompanySelector::Auto, official, &catalogs, &cart(&["U"])).unwrap();
        assert_eq!(decision.company_id, unofficial);
        assert_eq!(decision.rule, ResolutionRule::UniqueCatalog);
        assert!(decision.missing.is_empty());
    }

    #[test]
    fn auto_with_two_covering_catalogs_stays_on_origin() {
        let official = Uuid::new_v4();
        let unofficial = Uuid::new_v4();
        let catalogs = vec![
            CatalogView::new(official, ["A"]),
            CatalogView::new(unofficial, ["A"]),
        ];
        let decision =
            resolve_company(CompanySelector::Auto, unofficial, &catalogs, &cart(&["A"])).unwrap();
        assert_eq!(decision.company_id, unofficial);
        assert_eq!(decision.rule, ResolutionRule::Origin);
    }

    #[test]
    fn forced_company_missing_an_item_is_flagged() {
        let official = Uuid::new_v4();
        let unofficial = Uuid::new_v4();
        let catalogs = vec![
            CatalogView::new(official, ["A"]),
            CatalogView::new(unofficial, ["U"]),
        ];
        let decision = resolve_company(
            CompanySelector::Forced(official),
            unofficial,
            &catalogs,
            &cart(&["A", "U"]),
        )
        .unwrap();
        assert_eq!(decision.rule, ResolutionRule::Forced);
        assert_eq!(decision.missing, vec!["U".to_string()]);
        assert_matches!(
            decision.into_result(),
            Err(HoldReason::ItemNotFound { company_id, skus }) if company_id == official && skus == vec!["U".to_string()]
        );
    }

    #[test]
    fn forced_company_not_linked_to_device_is_ambiguous() {
        let origin = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let catalogs = vec![CatalogView::new(origin, ["A"])];
        assert_matches!(
            resolve_company(CompanySelector::Forced(stranger), origin, &catalogs, &cart(&["A"])),
            Err(HoldReason::AmbiguousCompany { requested, .. }) if requested == stranger
        );
    }

    #[test]
    fn nothing_covers_falls_back_to_origin_with_missing_items() {
        let origin = Uuid::new_v4();
        let other = Uuid::new_v4();
        let catalogs = vec![
            CatalogView::new(origin, ["A"]),
            CatalogView::new(other, ["B"]),
        ];
        let decision =
            resolve_company(CompanySelector::Auto, origin, &catalogs, &cart(&["A", "B"])).unwrap();
        assert_eq!(decision.company_id, origin);
        assert_eq!(decision.missing, vec!["B".to_string()]);
    }
}
