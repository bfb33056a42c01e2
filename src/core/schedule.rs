//! Student installment schedules - carry-forward and surplus derivation.
//!
//! A student's schedule is never stored. Every read instantiates the plan of the
//! student's level and track, attaches the student's installment payments, and walks
//! the installments once in number order:
//!
//! 1. `amount_with_carried_over = amount + carry`
//! 2. what is still owed after direct payments is covered by the surplus pool first
//! 3. whatever remains on an installment whose due date has passed is carried into
//!    the next installment
//!
//! The walk is a pure function of its inputs, so running it twice gives the same
//! schedule.

use crate::{
    core::{
        format::days_overdue,
        level::fee_schedule,
        roster::require_class,
        surplus::{SurplusPool, initial_fees_paid},
    },
    entities::{
        InstallmentPlanEntry, Level, PaymentCategory, PaymentType, SchoolClass,
        installment_plan_entry, level, payment, school_class, student,
    },
    errors::{Error, Result},
};
use chrono::NaiveDate;
use sea_orm::{QueryOrder, prelude::*};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, instrument};

/// One plan entry instantiated for one student.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentInstallment {
    /// Plan entry this installment comes from
    pub entry_id: i64,
    /// Position in the plan, 1-based
    pub installment_number: i32,
    /// Amount the plan asks for
    pub amount: i64,
    /// Due date
    pub due_date: NaiveDate,
    /// Share of the installment base
    pub percentage: f64,
    /// Payments booked against this installment, reversals included
    pub payments: Vec<payment::Model>,
    /// Net of `payments`, never negative
    pub total_paid: i64,
    /// Unpaid balance rolled in from the previous installment
    pub carried_over_amount: i64,
    /// `amount + carried_over_amount`
    pub amount_with_carried_over: i64,
    /// Part of the initial-fee surplus used on this installment
    pub surplus_applied: i64,
    /// Paid beyond `amount_with_carried_over`
    pub overpaid: i64,
    /// Still owed after payments and surplus
    pub remaining_with_carried_over: i64,
    /// Nothing left to pay
    pub is_paid: bool,
    /// Past due with something left to pay
    pub is_overdue: bool,
    /// Whole days past the due date while overdue, otherwise 0
    pub days_overdue: i64,
}

/// Walks `plan` in installment order, applying payments, surplus and carry-forward.
///
/// Only installment-category payments with a number are attached; other categories
/// and legacy surplus transfers are ignored here. Surplus is drawn from `pool`, which
/// keeps whatever could not be placed.
#[must_use]
pub fn derive_installments(
    plan: &[installment_plan_entry::Model],
    payments: &[payment::Model],
    pool: &mut SurplusPool,
    today: NaiveDate,
) -> Vec<StudentInstallment> {
    let mut by_number: HashMap<i32, Vec<payment::Model>> = HashMap::new();
    for payment in payments
        .iter()
        .filter(|payment| payment.category == PaymentCategory::Installment)
    {
        if let Some(number) = payment.installment_number {
            by_number.entry(number).or_default().push(payment.clone());
        }
    }

    let mut ordered: Vec<&installment_plan_entry::Model> = plan.iter().collect();
    ordered.sort_by_key(|entry| entry.installment_number);

    let mut carry = 0;
    ordered
        .into_iter()
        .map(|entry| {
            let payments = by_number
                .remove(&entry.installment_number)
                .unwrap_or_default();
            let total_paid = payments
                .iter()
                .map(payment::Model::effective_amount)
                .sum::<i64>()
                .max(0);

            let amount_with_carried_over = entry.amount + carry;
            let owed = (amount_with_carried_over - total_paid).max(0);
            let overpaid = (total_paid - amount_with_carried_over).max(0);
            let surplus_applied = pool.draw(owed);
            let remaining = owed - surplus_applied;

            let past_due = entry.due_date < today;
            let is_overdue = past_due && remaining > 0;
            let installment = StudentInstallment {
                entry_id: entry.id,
                installment_number: entry.installment_number,
                amount: entry.amount,
                due_date: entry.due_date,
                percentage: entry.percentage,
                payments,
                total_paid,
                carried_over_amount: carry,
                amount_with_carried_over,
                surplus_applied,
                overpaid,
                remaining_with_carried_over: remaining,
                is_paid: remaining <= 0,
                is_overdue,
                days_overdue: if is_overdue {
                    days_overdue(entry.due_date, today)
                } else {
                    0
                },
            };

            carry = if past_due { remaining } else { 0 };
            installment
        })
        .collect()
}

/// Everything the school knows about one student's tuition, derived on read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentAccount {
    /// Student ID
    pub student_id: i64,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// School registration number
    pub registration_number: String,
    /// Class ID
    pub class_id: i64,
    /// Class name
    pub class_name: String,
    /// Level ID
    pub level_id: i64,
    /// Level name
    pub level_name: String,
    /// Tuition track
    pub payment_type: PaymentType,
    /// Whether the track is the assigned one
    pub is_assigned: bool,
    /// Tuition owed for the year
    pub tuition_fee: i64,
    /// Registration fee, part of the tuition
    pub registration_fee: i64,
    /// Net paid into the initial bucket
    pub initial_fees_paid: i64,
    /// Initial-bucket money beyond the registration fee
    pub surplus_from_initial: i64,
    /// `max(0, tuition_fee - registration_fee)`
    pub total_installments_due: i64,
    /// Net paid against installments
    pub total_installments_paid: i64,
    /// `max(0, due - paid - surplus)`
    pub remaining_balance: i64,
    /// Surplus that no installment could absorb
    pub unallocated_surplus: i64,
    /// Net installment payments aimed at numbers absent from the plan
    pub unmatched_installment_payments: i64,
    /// Installment payments beyond what their installments asked for
    pub overpaid_installments: i64,
    /// Schedule in installment order
    pub installments: Vec<StudentInstallment>,
}

impl StudentAccount {
    /// Full display name.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Sum of `surplus_applied` over the schedule.
    #[must_use]
    pub fn surplus_applied(&self) -> i64 {
        self.installments
            .iter()
            .map(|installment| installment.surplus_applied)
            .sum()
    }

    /// Installments that are overdue.
    pub fn overdue_installments(&self) -> impl Iterator<Item = &StudentInstallment> {
        self.installments
            .iter()
            .filter(|installment| installment.is_overdue)
    }

    /// Fails when the ledger holds money the schedule cannot represent: surplus left
    /// over after every installment, installment payments aimed at installments that
    /// do not exist, or more paid on an installment than it asked for.
    pub fn check_consistency(&self) -> Result<()> {
        if self.unallocated_surplus > 0 {
            return Err(Error::ReconciliationInconsistency {
                student_id: self.student_id,
                message: format!(
                    "{} of surplus could not be placed on any installment",
                    self.unallocated_surplus
                ),
            });
        }
        if self.unmatched_installment_payments != 0 {
            return Err(Error::ReconciliationInconsistency {
                student_id: self.student_id,
                message: format!(
                    "{} paid against installments missing from the plan",
                    self.unmatched_installment_payments
                ),
            });
        }
        if self.overpaid_installments > 0 {
            return Err(Error::ReconciliationInconsistency {
                student_id: self.student_id,
                message: format!(
                    "{} paid on installments beyond their amounts",
                    self.overpaid_installments
                ),
            });
        }
        Ok(())
    }
}

/// Records a student account is derived from.
#[derive(Debug, Clone, Copy)]
pub struct AccountInputs<'a> {
    /// The student
    pub student: &'a student::Model,
    /// The student's class
    pub class: &'a school_class::Model,
    /// The class's level
    pub level: &'a level::Model,
    /// Plan of the level for the student's track
    pub plan: &'a [installment_plan_entry::Model],
    /// Every payment of the student
    pub payments: &'a [payment::Model],
}

/// Derives a student's account and schedule as of `today`.
#[must_use]
pub fn derive_student_account(inputs: AccountInputs<'_>, today: NaiveDate) -> StudentAccount {
    let AccountInputs {
        student,
        class,
        level,
        plan,
        payments,
    } = inputs;

    let fees = fee_schedule(level, student.payment_type);
    let tuition_fee = student.tuition_override.unwrap_or(fees.tuition);
    let registration_fee = fees.registration_fee;

    let initial_fees_paid = initial_fees_paid(payments);
    let mut pool = SurplusPool::from_initial_fees(initial_fees_paid, registration_fee);
    let surplus_from_initial = pool.remaining();
    let installments = derive_installments(plan, payments, &mut pool, today);

    let installment_rows = || {
        payments
            .iter()
            .filter(|payment| payment.category == PaymentCategory::Installment)
    };
    let total_installments_paid = installment_rows()
        .map(payment::Model::effective_amount)
        .sum::<i64>()
        .max(0);
    let unmatched_installment_payments = installment_rows()
        .filter(|payment| {
            payment.installment_number.is_none_or(|number| {
                !plan.iter().any(|entry| entry.installment_number == number)
            })
        })
        .map(payment::Model::effective_amount)
        .sum();

    let overpaid_installments = installments
        .iter()
        .map(|installment| installment.overpaid)
        .sum();

    let total_installments_due = (tuition_fee - registration_fee).max(0);
    let remaining_balance =
        (total_installments_due - total_installments_paid - surplus_from_initial).max(0);

    StudentAccount {
        student_id: student.id,
        first_name: student.first_name.clone(),
        last_name: student.last_name.clone(),
        registration_number: student.registration_number.clone(),
        class_id: class.id,
        class_name: class.name.clone(),
        level_id: level.id,
        level_name: level.name.clone(),
        payment_type: student.payment_type,
        is_assigned: student.is_assigned(),
        tuition_fee,
        registration_fee,
        initial_fees_paid,
        surplus_from_initial,
        total_installments_due,
        total_installments_paid,
        remaining_balance,
        unallocated_surplus: pool.remaining(),
        unmatched_installment_payments,
        overpaid_installments,
        installments,
    }
}

/// Loads everything needed and derives the accounts of `students`, in the same order.
///
/// Lookups are batched: one query per table whatever the number of students.
#[instrument(skip(db, students), fields(students = students.len()))]
pub async fn load_student_accounts(
    db: &DatabaseConnection,
    students: &[student::Model],
    today: NaiveDate,
) -> Result<Vec<StudentAccount>> {
    if students.is_empty() {
        return Ok(Vec::new());
    }

    let class_ids: Vec<i64> = students.iter().map(|student| student.class_id).collect();
    let classes: HashMap<i64, school_class::Model> = SchoolClass::find()
        .filter(school_class::Column::Id.is_in(class_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|class| (class.id, class))
        .collect();

    let level_ids: Vec<i64> = classes.values().map(|class| class.level_id).collect();
    let levels: HashMap<i64, level::Model> = Level::find()
        .filter(level::Column::Id.is_in(level_ids.clone()))
        .all(db)
        .await?
        .into_iter()
        .map(|level| (level.id, level))
        .collect();

    let mut plans: HashMap<(i64, PaymentType), Vec<installment_plan_entry::Model>> =
        HashMap::new();
    for entry in InstallmentPlanEntry::find()
        .filter(installment_plan_entry::Column::LevelId.is_in(level_ids))
        .order_by_asc(installment_plan_entry::Column::InstallmentNumber)
        .all(db)
        .await?
    {
        plans
            .entry((entry.level_id, entry.payment_type))
            .or_default()
            .push(entry);
    }

    let student_ids: Vec<i64> = students.iter().map(|student| student.id).collect();
    let payments = crate::core::ledger::payments_for_students(db, &student_ids).await?;

    let mut accounts = Vec::with_capacity(students.len());
    for student in students {
        let class = classes
            .get(&student.class_id)
            .ok_or_else(|| Error::not_found("Class", student.class_id))?;
        let level = levels
            .get(&class.level_id)
            .ok_or_else(|| Error::not_found("Level", class.level_id))?;
        let plan = plans
            .get(&(level.id, student.payment_type))
            .map_or(&[][..], Vec::as_slice);
        let payments = payments.get(&student.id).map_or(&[][..], Vec::as_slice);

        accounts.push(derive_student_account(
            AccountInputs {
                student,
                class,
                level,
                plan,
                payments,
            },
            today,
        ));
    }

    debug!(accounts = accounts.len(), "Derived student accounts");
    Ok(accounts)
}

/// Accounts of every student in a class, optionally only if the class belongs to
/// `school_year`.
pub async fn class_students_with_installments(
    db: &DatabaseConnection,
    class_id: i64,
    school_year: Option<&str>,
    today: NaiveDate,
) -> Result<Vec<StudentAccount>> {
    let class = require_class(db, class_id).await?;
    if school_year.is_some_and(|year| year != class.school_year) {
        return Ok(Vec::new());
    }
    let students =
        crate::core::roster::students_in_classes(db, std::slice::from_ref(&class)).await?;
    load_student_accounts(db, &students, today).await
}

/// Account of a single student.
pub async fn student_account(
    db: &DatabaseConnection,
    student_id: i64,
    today: NaiveDate,
) -> Result<StudentAccount> {
    let student = crate::core::roster::require_student(db, student_id).await?;
    load_student_accounts(db, std::slice::from_ref(&student), today)
        .await?
        .pop()
        .ok_or_else(|| Error::not_found("Student", student_id))
}
