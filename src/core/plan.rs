//! Installment plan builder - dated, percentage-sized slices of a level's tuition.
//!
//! A plan belongs to one level and one payment type. Its entries are numbered `1..N`
//! without gaps and their percentages may not exceed 100 % (with 0.01 % slack for
//! rounding). Percentage arithmetic that has to be exact is done in basis points.
//!
//! Every write to a plan runs in a database transaction while holding that plan's
//! lock from [`PlanLocks`], so two concurrent additions cannot both pass the
//! percentage cap.

use crate::{
    config::{AcademicCalendar, DefaultPlanConfig},
    core::{
        format::{
            FULL_BASIS_POINTS, PERCENTAGE_TOLERANCE_BASIS_POINTS, from_basis_points,
            parse_due_date, percentage_of, round_percentage, share_of, to_basis_points,
        },
        level::{fee_schedule, require_level},
    },
    entities::{
        InstallmentPlanEntry, Payment, PaymentCategory, PaymentType, SchoolClass, Student,
        installment_plan_entry, payment, school_class, student,
    },
    errors::{Error, Result},
};
use chrono::NaiveDate;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, PoisonError},
};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, instrument};

type PlanKey = (i64, PaymentType);

/// Per-plan write locks, keyed by level and payment type.
///
/// Cloning shares the underlying lock table.
#[derive(Debug, Clone, Default)]
pub struct PlanLocks {
    inner: Arc<Mutex<HashMap<PlanKey, Arc<tokio::sync::Mutex<()>>>>>,
}

impl PlanLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to one plan. Other plans are unaffected.
    pub async fn acquire(&self, level_id: i64, payment_type: PaymentType) -> OwnedMutexGuard<()> {
        let lock = {
            let mut table = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(table.entry((level_id, payment_type)).or_default())
        };
        lock.lock_owned().await
    }
}

/// Both plans of a level.
#[derive(Debug, Clone, Serialize)]
pub struct LevelInstallments {
    /// Plan of assigned students, in installment order
    pub assigned: Vec<installment_plan_entry::Model>,
    /// Plan of non-assigned students, in installment order
    pub non_assigned: Vec<installment_plan_entry::Model>,
}

/// Input for appending an entry to a plan.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPlanEntry {
    /// Plan to append to
    pub payment_type: PaymentType,
    /// Amount due
    pub amount: i64,
    /// Due date as supplied by the client
    pub due_date: String,
    /// Share of the installment base, 0-100
    pub percentage: f64,
}

/// Editable fields of an existing entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanEntryUpdate {
    /// New amount; the percentage is recomputed from it
    #[serde(default)]
    pub amount: Option<i64>,
    /// New due date
    #[serde(default)]
    pub due_date: Option<String>,
}

/// Sum of the entries' percentages in basis points.
#[must_use]
pub fn cumulative_basis_points(entries: &[installment_plan_entry::Model]) -> i64 {
    entries
        .iter()
        .map(|entry| to_basis_points(entry.percentage))
        .sum()
}

fn check_percentage_cap(total_basis_points: i64) -> Result<()> {
    if total_basis_points > FULL_BASIS_POINTS + PERCENTAGE_TOLERANCE_BASIS_POINTS {
        return Err(Error::validation(format!(
            "installment percentages would total {:.2}%, above the 100% limit",
            from_basis_points(total_basis_points)
        )));
    }
    Ok(())
}

fn proportional_basis_points(amounts: &[i64], total: i64, round_nearest: bool) -> Vec<i64> {
    let denominator = i128::from(total);
    let mut points: Vec<i64> = amounts[..amounts.len() - 1]
        .iter()
        .map(|amount| {
            let scaled = i128::from(*amount) * i128::from(FULL_BASIS_POINTS);
            let value = if round_nearest {
                (scaled * 2 + denominator).div_euclid(denominator * 2)
            } else {
                scaled.div_euclid(denominator)
            };
            i64::try_from(value).unwrap_or(FULL_BASIS_POINTS)
        })
        .collect();
    let assigned: i64 = points.iter().sum();
    points.push(FULL_BASIS_POINTS - assigned);
    points
}

/// Percentages proportional to `amounts`, rounded to two decimals, with the last
/// entry absorbing the rounding remainder so the set totals exactly 100.00.
///
/// When nearest rounding would leave the last entry negative (many tiny leading
/// amounts and a zero last amount) the leading shares are truncated instead.
///
/// # Errors
/// Returns a validation error when amounts are negative or sum to zero.
pub fn rescale_percentages(amounts: &[i64]) -> Result<Vec<f64>> {
    if amounts.is_empty() {
        return Ok(Vec::new());
    }
    if let Some(amount) = amounts.iter().copied().find(|amount| *amount < 0) {
        return Err(Error::InvalidAmount { amount });
    }
    let total: i64 = amounts.iter().sum();
    if total <= 0 {
        return Err(Error::validation(
            "cannot recalculate percentages: installment amounts sum to zero",
        ));
    }

    let mut points = proportional_basis_points(amounts, total, true);
    if points.last().is_some_and(|last| *last < 0) {
        points = proportional_basis_points(amounts, total, false);
    }
    Ok(points.into_iter().map(from_basis_points).collect())
}

/// Splits `base` according to `basis_points`; the last share absorbs rounding so
/// the amounts sum to `base` exactly.
#[must_use]
pub fn split_by_basis_points(base: i64, basis_points: &[i64]) -> Vec<i64> {
    let Some((_, leading)) = basis_points.split_last() else {
        return Vec::new();
    };
    let mut amounts: Vec<i64> = leading.iter().map(|bp| share_of(base, *bp)).collect();
    let assigned: i64 = amounts.iter().sum();
    amounts.push(base - assigned);
    amounts
}

/// Entries of one plan in installment order.
pub async fn plan_entries<C>(
    db: &C,
    level_id: i64,
    payment_type: PaymentType,
) -> Result<Vec<installment_plan_entry::Model>>
where
    C: ConnectionTrait,
{
    InstallmentPlanEntry::find()
        .filter(installment_plan_entry::Column::LevelId.eq(level_id))
        .filter(installment_plan_entry::Column::PaymentType.eq(payment_type))
        .order_by_asc(installment_plan_entry::Column::InstallmentNumber)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Both plans of a level.
pub async fn list_level_installments(
    db: &DatabaseConnection,
    level_id: i64,
) -> Result<LevelInstallments> {
    require_level(db, level_id).await?;
    Ok(LevelInstallments {
        assigned: plan_entries(db, level_id, PaymentType::Assigned).await?,
        non_assigned: plan_entries(db, level_id, PaymentType::NonAssigned).await?,
    })
}

async fn require_entry<C>(db: &C, entry_id: i64) -> Result<installment_plan_entry::Model>
where
    C: ConnectionTrait,
{
    InstallmentPlanEntry::find_by_id(entry_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Installment plan entry", entry_id))
}

/// Appends an entry to a plan with the next installment number.
///
/// Rejects negative amounts, unparsable dates, percentages outside 0-100, levels
/// whose registration fee covers the whole tuition, and additions that push the
/// plan past 100.01 %.
#[instrument(skip(db, locks))]
pub async fn add_entry(
    db: &DatabaseConnection,
    locks: &PlanLocks,
    level_id: i64,
    input: NewPlanEntry,
) -> Result<installment_plan_entry::Model> {
    if input.amount < 0 {
        return Err(Error::InvalidAmount {
            amount: input.amount,
        });
    }
    let due_date = parse_due_date(&input.due_date)?;
    if !input.percentage.is_finite() || !(0.0..=100.0).contains(&input.percentage) {
        return Err(Error::validation(format!(
            "percentage must be between 0 and 100, got {}",
            input.percentage
        )));
    }
    // Stored at the precision the cap is checked at
    let percentage = round_percentage(input.percentage);

    let level = require_level(db, level_id).await?;
    if fee_schedule(&level, input.payment_type).installment_base() <= 0 {
        return Err(Error::validation(format!(
            "level {} is fully covered by its registration fee",
            level.name
        )));
    }

    let _guard = locks.acquire(level_id, input.payment_type).await;
    let txn = db.begin().await?;

    let existing = plan_entries(&txn, level_id, input.payment_type).await?;
    check_percentage_cap(cumulative_basis_points(&existing) + to_basis_points(percentage))?;

    let next_number = existing
        .last()
        .map_or(1, |entry| entry.installment_number + 1);
    let entry = installment_plan_entry::ActiveModel {
        level_id: Set(level_id),
        payment_type: Set(input.payment_type),
        installment_number: Set(next_number),
        amount: Set(input.amount),
        due_date: Set(due_date),
        percentage: Set(percentage),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;
    info!(
        level_id,
        payment_type = %entry.payment_type,
        installment_number = entry.installment_number,
        "Added installment plan entry"
    );
    Ok(entry)
}

/// Edits the amount and/or due date of an entry. A new amount recomputes the
/// percentage against the level's installment base and must respect the cap.
#[instrument(skip(db, locks))]
pub async fn update_entry(
    db: &DatabaseConnection,
    locks: &PlanLocks,
    entry_id: i64,
    update: PlanEntryUpdate,
) -> Result<installment_plan_entry::Model> {
    if let Some(amount) = update.amount.filter(|amount| *amount < 0) {
        return Err(Error::InvalidAmount { amount });
    }
    let due_date = update.due_date.as_deref().map(parse_due_date).transpose()?;

    let located = require_entry(db, entry_id).await?;
    let _guard = locks
        .acquire(located.level_id, located.payment_type)
        .await;
    let txn = db.begin().await?;

    let entry = require_entry(&txn, entry_id).await?;
    let mut active: installment_plan_entry::ActiveModel = entry.clone().into();

    if let Some(amount) = update.amount {
        let level = require_level(&txn, entry.level_id).await?;
        let base = fee_schedule(&level, entry.payment_type).installment_base();
        let percentage = percentage_of(amount, base);

        let siblings = plan_entries(&txn, entry.level_id, entry.payment_type).await?;
        let others: i64 = siblings
            .iter()
            .filter(|sibling| sibling.id != entry.id)
            .map(|sibling| to_basis_points(sibling.percentage))
            .sum();
        check_percentage_cap(others + to_basis_points(percentage))?;

        active.amount = Set(amount);
        active.percentage = Set(percentage);
    }
    if let Some(date) = due_date {
        active.due_date = Set(date);
    }

    let updated = active.update(&txn).await?;
    txn.commit().await?;
    info!(entry_id, "Updated installment plan entry");
    Ok(updated)
}

/// Moves installment payments of the plan's students along with a removal.
///
/// Rows on later installments follow their entry down one number. Rows on the
/// removed installment must already be cancelled by reversals; such pairs go back
/// to the initial bucket as [`PaymentCategory::Finalization`], where they net to
/// zero. Returns the rows changed.
///
/// Fails with a validation error when a live payment still targets the removed
/// installment.
async fn follow_renumbering<C>(
    db: &C,
    level_id: i64,
    payment_type: PaymentType,
    removed_number: i32,
) -> Result<usize>
where
    C: ConnectionTrait,
{
    let class_ids: Vec<i64> = SchoolClass::find()
        .filter(school_class::Column::LevelId.eq(level_id))
        .all(db)
        .await?
        .into_iter()
        .map(|class| class.id)
        .collect();
    if class_ids.is_empty() {
        return Ok(0);
    }
    let student_ids: Vec<i64> = Student::find()
        .filter(student::Column::ClassId.is_in(class_ids))
        .filter(student::Column::PaymentType.eq(payment_type))
        .all(db)
        .await?
        .into_iter()
        .map(|student| student.id)
        .collect();
    if student_ids.is_empty() {
        return Ok(0);
    }

    let affected = Payment::find()
        .filter(payment::Column::StudentId.is_in(student_ids))
        .filter(payment::Column::Category.eq(PaymentCategory::Installment))
        .filter(payment::Column::InstallmentNumber.gte(removed_number))
        .all(db)
        .await?;

    let reversed: HashSet<i64> = affected
        .iter()
        .filter_map(|row| row.reverses_payment_id)
        .collect();
    if let Some(live) = affected.iter().find(|row| {
        row.installment_number == Some(removed_number)
            && row.reverses_payment_id.is_none()
            && !reversed.contains(&row.id)
    }) {
        return Err(Error::validation(format!(
            "installment {removed_number} has payment {} from student {}; reverse it before removing the installment",
            live.id, live.student_id
        )));
    }

    let mut moved = 0;
    for row in &affected {
        let Some(number) = row.installment_number else {
            continue;
        };
        let mut active: payment::ActiveModel = row.clone().into();
        if number == removed_number {
            active.category = Set(PaymentCategory::Finalization);
            active.installment_number = Set(None);
        } else {
            active.installment_number = Set(Some(number - 1));
        }
        active.update(db).await?;
        moved += 1;
        debug!(
            payment_id = row.id,
            student_id = row.student_id,
            from_installment = number,
            "Moved payment after plan entry removal"
        );
    }
    Ok(moved)
}

/// Deletes an entry and renumbers the rest of its plan to `1..N`, keeping their
/// relative order.
///
/// Payments of the plan's students are re-tagged in the same transaction so they
/// keep pointing at the installment they paid for. An installment that still has
/// live payments cannot be removed.
#[instrument(skip(db, locks))]
pub async fn remove_entry(db: &DatabaseConnection, locks: &PlanLocks, entry_id: i64) -> Result<()> {
    let located = require_entry(db, entry_id).await?;
    let _guard = locks
        .acquire(located.level_id, located.payment_type)
        .await;
    let txn = db.begin().await?;

    let entry = require_entry(&txn, entry_id).await?;
    let (level_id, payment_type) = (entry.level_id, entry.payment_type);
    let removed_number = entry.installment_number;
    let moved_payments = follow_renumbering(&txn, level_id, payment_type, removed_number).await?;
    entry.delete(&txn).await?;

    let remaining = plan_entries(&txn, level_id, payment_type).await?;
    for (position, sibling) in (1_i32..).zip(remaining) {
        if sibling.installment_number != position {
            let mut active: installment_plan_entry::ActiveModel = sibling.into();
            active.installment_number = Set(position);
            active.update(&txn).await?;
        }
    }

    txn.commit().await?;
    info!(
        entry_id,
        level_id,
        payment_type = %payment_type,
        moved_payments,
        "Removed installment plan entry"
    );
    Ok(())
}

/// Rescales every percentage of a plan from the entries' amounts so the plan
/// totals exactly 100 %. Returns the updated plan.
#[instrument(skip(db, locks))]
pub async fn recalculate_percentages(
    db: &DatabaseConnection,
    locks: &PlanLocks,
    level_id: i64,
    payment_type: PaymentType,
) -> Result<Vec<installment_plan_entry::Model>> {
    require_level(db, level_id).await?;
    let _guard = locks.acquire(level_id, payment_type).await;
    let txn = db.begin().await?;

    let entries = plan_entries(&txn, level_id, payment_type).await?;
    let amounts: Vec<i64> = entries.iter().map(|entry| entry.amount).collect();
    let percentages = rescale_percentages(&amounts)?;

    let mut updated = Vec::with_capacity(entries.len());
    for (entry, percentage) in entries.into_iter().zip(percentages) {
        let mut active: installment_plan_entry::ActiveModel = entry.into();
        active.percentage = Set(percentage);
        updated.push(active.update(&txn).await?);
    }

    txn.commit().await?;
    debug!(level_id, payment_type = %payment_type, entries = updated.len(), "Recalculated percentages");
    Ok(updated)
}

/// Creates the configured default plan (40/30/30 unless configured otherwise) when
/// the plan is empty, dated one term apart from the start of the academic year that
/// contains `today`.
///
/// Returns the existing entries untouched when the plan already has some, and an
/// empty list when the registration fee covers the whole tuition.
#[instrument(skip(db, locks, calendar, split))]
pub async fn create_default_plan(
    db: &DatabaseConnection,
    locks: &PlanLocks,
    level_id: i64,
    payment_type: PaymentType,
    calendar: &AcademicCalendar,
    split: &DefaultPlanConfig,
    today: NaiveDate,
) -> Result<Vec<installment_plan_entry::Model>> {
    let level = require_level(db, level_id).await?;
    let base = fee_schedule(&level, payment_type).installment_base();
    if base <= 0 {
        info!(level_id, payment_type = %payment_type, "Registration fee covers tuition, no default plan");
        return Ok(Vec::new());
    }

    let _guard = locks.acquire(level_id, payment_type).await;
    let txn = db.begin().await?;

    let existing = plan_entries(&txn, level_id, payment_type).await?;
    if !existing.is_empty() {
        return Ok(existing);
    }

    let basis_points: Vec<i64> = split.percentages.iter().copied().map(to_basis_points).collect();
    let amounts = split_by_basis_points(base, &basis_points);
    let due_dates = calendar.term_due_dates(amounts.len(), today)?;

    let mut created = Vec::with_capacity(amounts.len());
    for (((number, amount), due_date), percentage) in (1_i32..)
        .zip(amounts)
        .zip(due_dates)
        .zip(split.percentages.iter().copied().map(round_percentage))
    {
        let entry = installment_plan_entry::ActiveModel {
            level_id: Set(level_id),
            payment_type: Set(payment_type),
            installment_number: Set(number),
            amount: Set(amount),
            due_date: Set(due_date),
            percentage: Set(percentage),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        created.push(entry);
    }

    txn.commit().await?;
    info!(level_id, payment_type = %payment_type, entries = created.len(), "Created default plan");
    Ok(created)
}
