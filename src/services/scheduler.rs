//! Recurring journals and expiry sweeps.
//!
//! The scheduler never posts anything itself. It synthesises outbox events
//! with deterministic natural keys, so running it twice for the same day is a
//! duplicate submission rather than a double posting.

use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate, Utc};
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::db::with_transaction;
use crate::domain::event::{EventType, ExpirySweepPayload, JournalTemplateRunPayload};
use crate::entities::recurring_journal_rule::{self, Cadence, Entity as Rule, RuleState};
use crate::entities::{journal_template, period_lock};
use crate::errors::ServiceError;
use crate::services::allocator::InventoryAllocator;
use crate::services::event_store::{EventStore, WireEvent};

/// A rule never generates more than this many runs in one pass.
pub const MAX_CATCH_UP_RUNS: usize = 31;

pub const TEMPLATE_INACTIVE: &str = "template_inactive";
pub const MANUAL_PAUSE: &str = "manual";

pub fn recurring_device_id(rule_id: Uuid) -> String {
    format!("scheduler:recurring:{rule_id}")
}

pub fn expiry_device_id(tenant_id: Uuid) -> String {
    format!("scheduler:expiry:{tenant_id}")
}

/// Day number used as the device sequence of synthesised events.
pub fn day_seq(date: NaiveDate) -> i64 {
    i64::from(date.num_days_from_ce())
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

/// The run after `current`.
///
/// Weekly rules land on `day_of_week` (ISO, Monday = 1) and monthly rules on
/// `day_of_month`, clamped to the length of the month. Without an anchor the
/// rule keeps the weekday or day of `current`.
pub fn advance_next_run_date(
    cadence: Cadence,
    current: NaiveDate,
    day_of_week: Option<i32>,
    day_of_month: Option<i32>,
) -> NaiveDate {
    match cadence {
        Cadence::Daily => current + Duration::days(1),
        Cadence::Weekly => {
            let target = day_of_week
                .filter(|d| (1..=7).contains(d))
                .map(|d| d as u32)
                .unwrap_or_else(|| current.weekday().number_from_monday());
            let today = current.weekday().number_from_monday();
            let ahead = (target + 7 - today) % 7;
            current + Duration::days(if ahead == 0 { 7 } else { i64::from(ahead) })
        }
        Cadence::Monthly => {
            let (year, month) = if current.month() == 12 {
                (current.year() + 1, 1)
            } else {
                (current.year(), current.month() + 1)
            };
            let wanted = day_of_month
                .filter(|d| (1..=31).contains(d))
                .map(|d| d as u32)
                .unwrap_or_else(|| current.day());
            let day = wanted.min(days_in_month(year, month));
            NaiveDate::from_ymd_opt(year, month, day).unwrap_or(current + Duration::days(28))
        }
    }
}

/// What one pass over a rule decided.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RulePlan {
    /// Dates to synthesise a template run for, oldest first.
    pub runs: Vec<NaiveDate>,
    /// Dates skipped because their period is locked.
    pub deferred: Vec<NaiveDate>,
    pub next_run_date: NaiveDate,
    pub last_run_date: Option<NaiveDate>,
    pub pause: Option<&'static str>,
}

/// Pure state transition of a rule for `today`.
pub fn evaluate_rule<F>(
    rule: &recurring_journal_rule::Model,
    template_active: bool,
    today: NaiveDate,
    is_locked: F,
) -> RulePlan
where
    F: Fn(NaiveDate) -> bool,
{
    let mut plan = RulePlan {
        next_run_date: rule.next_run_date,
        last_run_date: rule.last_run_date,
        ..RulePlan::default()
    };
    if rule.state != RuleState::Active {
        return plan;
    }
    if !template_active {
        plan.pause = Some(TEMPLATE_INACTIVE);
        return plan;
    }

    let mut steps = 0;
    while plan.next_run_date <= today && steps < MAX_CATCH_UP_RUNS {
        steps += 1;
        let date = plan.next_run_date;
        if is_locked(date) {
            plan.deferred.push(date);
            plan.next_run_date = date + Duration::days(1);
            continue;
        }
        plan.runs.push(date);
        plan.last_run_date = Some(date);
        plan.next_run_date =
            advance_next_run_date(rule.cadence, date, rule.day_of_week, rule.day_of_month);
    }
    plan
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerReport {
    pub enqueued: usize,
    pub duplicates: usize,
    pub deferred: usize,
    pub paused: usize,
}

#[derive(Clone)]
pub struct Scheduler {
    db: Arc<DatabaseConnection>,
    allocator: InventoryAllocator,
}

impl Scheduler {
    pub fn new(db: Arc<DatabaseConnection>, allocator: InventoryAllocator) -> Self {
        Self { db, allocator }
    }

    /// Synthesises every template run that is due on or before `today`.
    #[instrument(skip(self))]
    pub async fn run_due(&self, today: NaiveDate) -> Result<SchedulerReport, ServiceError> {
        let rules = Rule::find()
            .filter(recurring_journal_rule::Column::State.eq(RuleState::Active))
            .filter(recurring_journal_rule::Column::NextRunDate.lte(today))
            .order_by_asc(recurring_journal_rule::Column::NextRunDate)
            .all(&*self.db)
            .await?;

        let mut report = SchedulerReport::default();
        for rule in rules {
            let outcome = self.run_rule(rule, today).await?;
            report.enqueued += outcome.enqueued;
            report.duplicates += outcome.duplicates;
            report.deferred += outcome.deferred;
            report.paused += outcome.paused;
        }
        if report.enqueued > 0 || report.paused > 0 {
            info!(
                enqueued = report.enqueued,
                deferred = report.deferred,
                paused = report.paused,
                "recurring journals scheduled"
            );
        }
        Ok(report)
    }

    async fn run_rule(
        &self,
        rule: recurring_journal_rule::Model,
        today: NaiveDate,
    ) -> Result<SchedulerReport, ServiceError> {
        let template_active = journal_template::Entity::find_by_id(rule.template_id)
            .one(&*self.db)
            .await?
            .map(|t| t.is_active)
            .unwrap_or(false);
        let locks = period_lock::Entity::find()
            .filter(period_lock::Column::CompanyId.eq(rule.company_id))
            .filter(period_lock::Column::Locked.eq(true))
            .all(&*self.db)
            .await?;

        let plan = evaluate_rule(&rule, template_active, today, |date| {
            locks.iter().any(|l| l.covers(date))
        });
        for date in &plan.deferred {
            warn!(rule_id = %rule.id, run_date = %date, "period locked; recurring run deferred");
        }

        with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                let now = Utc::now();
                let mut report = SchedulerReport {
                    deferred: plan.deferred.len(),
                    ..SchedulerReport::default()
                };
                for run_date in &plan.runs {
                    let payload = JournalTemplateRunPayload {
                        rule_id: rule.id,
                        template_id: rule.template_id,
                        run_date: *run_date,
                    };
                    let ack = EventStore::enqueue(
                        txn,
                        rule.company_id,
                        WireEvent {
                            device_id: recurring_device_id(rule.id),
                            device_seq: day_seq(*run_date),
                            event_type: EventType::JournalTemplateRun.to_string(),
                            occurred_at: now,
                            payload: serde_json::to_value(&payload)?,
                        },
                        now,
                    )
                    .await?;
                    if ack.duplicate {
                        report.duplicates += 1;
                    } else {
                        report.enqueued += 1;
                    }
                }

                let rule_id = rule.id;
                let mut active: recurring_journal_rule::ActiveModel = rule.into();
                active.next_run_date = Set(plan.next_run_date);
                active.last_run_date = Set(plan.last_run_date);
                if let Some(reason) = plan.pause {
                    active.state = Set(RuleState::Paused);
                    active.paused_reason = Set(Some(reason.to_string()));
                    report.paused = 1;
                    warn!(rule_id = %rule_id, reason, "recurring rule paused");
                }
                active.updated_at = Set(now);
                active.update(txn).await?;
                Ok::<_, ServiceError>(report)
            })
        })
        .await
    }

    /// Manual toggle. Activating a rule whose template is inactive is refused.
    #[instrument(skip(self))]
    pub async fn set_state(
        &self,
        rule_id: Uuid,
        state: RuleState,
    ) -> Result<recurring_journal_rule::Model, ServiceError> {
        let rule = Rule::find_by_id(rule_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("recurring rule {rule_id}")))?;

        if state == RuleState::Active {
            let template_active = journal_template::Entity::find_by_id(rule.template_id)
                .one(&*self.db)
                .await?
                .map(|t| t.is_active)
                .unwrap_or(false);
            if !template_active {
                return Err(ServiceError::InvalidOperation(format!(
                    "template {} is inactive",
                    rule.template_id
                )));
            }
        }

        let mut active: recurring_journal_rule::ActiveModel = rule.into();
        active.state = Set(state);
        active.paused_reason = Set(match state {
            RuleState::Active => None,
            RuleState::Paused => Some(MANUAL_PAUSE.to_string()),
        });
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;
        info!(rule_id = %updated.id, state = ?updated.state, "recurring rule state changed");
        Ok(updated)
    }

    /// One sweep event per tenant holding expired stock on `today`.
    #[instrument(skip(self))]
    pub async fn enqueue_expiry_sweeps(&self, today: NaiveDate) -> Result<usize, ServiceError> {
        let tenants = self.allocator.companies_with_expired_stock(today).await?;
        let mut enqueued = 0;
        for tenant_id in tenants {
            let payload = serde_json::to_value(ExpirySweepPayload { as_of: today })?;
            let ack = EventStore::enqueue(
                &*self.db,
                tenant_id,
                WireEvent {
                    device_id: expiry_device_id(tenant_id),
                    device_seq: day_seq(today),
                    event_type: EventType::ExpirySweep.to_string(),
                    occurred_at: Utc::now(),
                    payload,
                },
                Utc::now(),
            )
            .await?;
            if !ack.duplicate {
                enqueued += 1;
            }
        }
        if enqueued > 0 {
            info!(enqueued, as_of = %today, "expiry sweeps enqueued");
            counter!("posting_engine.scheduler.expiry_sweeps", enqueued as u64);
        }
        Ok(enqueued)
    }
}
