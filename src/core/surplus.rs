//! Surplus allocation and legacy surplus correction.
//!
//! Money paid into the initial bucket (registration, finalization, re-enrollment)
//! beyond the registration fee is surplus. It is never stored as a payment of its own:
//! schedule derivation draws from a [`SurplusPool`] to cover installments in order.
//!
//! Older versions of the system wrote that surplus as real installment payments,
//! which made the same money count twice. [`fix_surplus_for_student`] re-tags those
//! rows so they stop counting as installment payments.

use crate::{
    core::{
        ledger::payments_for_student,
        plan::plan_entries,
        roster::{list_all_students, require_class, require_student},
    },
    entities::{PaymentCategory, payment},
    errors::Result,
};
use sea_orm::{Set, TransactionTrait, prelude::*};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use tracing::{info, instrument, warn};

/// Payment method label older versions used for surplus written as installment payments.
pub const LEGACY_SURPLUS_METHOD: &str = "surplus";

/// Surplus still available to cover installments.
///
/// Draws never exceed what is left, so the total drawn is bounded by the
/// surplus the pool started with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurplusPool {
    available: i64,
}

impl SurplusPool {
    /// Pool holding whatever the initial bucket paid beyond the registration fee.
    #[must_use]
    pub const fn from_initial_fees(initial_fees_paid: i64, registration_fee: i64) -> Self {
        Self {
            available: surplus_from_initial(initial_fees_paid, registration_fee),
        }
    }

    /// Takes up to `owed` from the pool and returns the amount taken.
    pub fn draw(&mut self, owed: i64) -> i64 {
        let taken = owed.clamp(0, self.available);
        self.available -= taken;
        taken
    }

    /// Surplus not drawn yet.
    #[must_use]
    pub const fn remaining(&self) -> i64 {
        self.available
    }
}

/// `max(0, initial_fees_paid - registration_fee)`
#[must_use]
pub const fn surplus_from_initial(initial_fees_paid: i64, registration_fee: i64) -> i64 {
    let surplus = initial_fees_paid - registration_fee;
    if surplus > 0 { surplus } else { 0 }
}

/// Net amount paid into the initial bucket, never negative.
#[must_use]
pub fn initial_fees_paid(payments: &[payment::Model]) -> i64 {
    payments
        .iter()
        .filter(|payment| payment.category.is_initial())
        .map(payment::Model::effective_amount)
        .sum::<i64>()
        .max(0)
}

/// A payment row that should be re-tagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Retag {
    /// Row to change
    pub payment_id: i64,
    /// Installment the row was attached to
    pub installment_number: Option<i32>,
    /// Category the row gets
    pub category: PaymentCategory,
}

/// Rows of a student's ledger that double count surplus.
///
/// * installment rows whose method is the legacy surplus marker become
///   [`PaymentCategory::SurplusTransfer`] and stop counting anywhere;
/// * installment rows targeting a number absent from the plan go back to the
///   initial bucket as [`PaymentCategory::Finalization`], where they feed the
///   surplus pool instead.
///
/// Reversed rows and reversals are left alone so a pair keeps netting to zero.
#[must_use]
pub fn plan_retags(payments: &[payment::Model], plan_numbers: &BTreeSet<i32>) -> Vec<Retag> {
    let reversed: HashSet<i64> = payments
        .iter()
        .filter_map(|payment| payment.reverses_payment_id)
        .collect();

    payments
        .iter()
        .filter(|payment| payment.category == PaymentCategory::Installment)
        .filter(|payment| payment.reverses_payment_id.is_none() && !reversed.contains(&payment.id))
        .filter_map(|payment| {
            let category = if payment.method.trim().eq_ignore_ascii_case(LEGACY_SURPLUS_METHOD) {
                PaymentCategory::SurplusTransfer
            } else if payment
                .installment_number
                .is_none_or(|number| !plan_numbers.contains(&number))
            {
                PaymentCategory::Finalization
            } else {
                return None;
            };
            Some(Retag {
                payment_id: payment.id,
                installment_number: payment.installment_number,
                category,
            })
        })
        .collect()
}

/// Result of correcting one student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SurplusCorrection {
    /// Student that was corrected
    pub student_id: i64,
    /// Number of rows re-tagged
    pub corrections_made: usize,
    /// The individual changes
    pub retags: Vec<Retag>,
}

/// A student the batch could not correct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    /// Student concerned
    pub student_id: i64,
    /// Error message
    pub reason: String,
}

/// Outcome of a school-wide correction run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchCorrectionReport {
    /// Students whose correction committed
    pub total_students_processed: usize,
    /// Rows re-tagged across all students
    pub total_corrections_made: usize,
    /// Students that failed; their ledger is unchanged
    pub failures: Vec<BatchFailure>,
}

/// Re-tags one student's legacy surplus rows inside a single transaction.
///
/// Running it again finds nothing left to change.
#[instrument(skip(db))]
pub async fn fix_surplus_for_student(
    db: &DatabaseConnection,
    student_id: i64,
) -> Result<SurplusCorrection> {
    let txn = db.begin().await?;

    let student = require_student(&txn, student_id).await?;
    let class = require_class(&txn, student.class_id).await?;
    let plan_numbers: BTreeSet<i32> = plan_entries(&txn, class.level_id, student.payment_type)
        .await?
        .into_iter()
        .map(|entry| entry.installment_number)
        .collect();
    let payments = payments_for_student(&txn, student_id).await?;

    let retags = plan_retags(&payments, &plan_numbers);
    for retag in &retags {
        payment::ActiveModel {
            id: Set(retag.payment_id),
            category: Set(retag.category),
            installment_number: Set(None),
            ..Default::default()
        }
        .update(&txn)
        .await?;
        info!(
            student_id,
            payment_id = retag.payment_id,
            from_installment = ?retag.installment_number,
            to = ?retag.category,
            "Re-tagged legacy surplus payment"
        );
    }

    txn.commit().await?;
    Ok(SurplusCorrection {
        student_id,
        corrections_made: retags.len(),
        retags,
    })
}

/// Runs [`fix_surplus_for_student`] for every student.
///
/// Each student is corrected in its own transaction; a failure is recorded in the
/// report and the run continues with the next student.
#[instrument(skip(db))]
pub async fn fix_all_surplus(db: &DatabaseConnection) -> Result<BatchCorrectionReport> {
    let students = list_all_students(db).await?;
    let mut report = BatchCorrectionReport::default();

    for student in students {
        match fix_surplus_for_student(db, student.id).await {
            Ok(correction) => {
                report.total_students_processed += 1;
                report.total_corrections_made += correction.corrections_made;
            }
            Err(e) => {
                warn!(student_id = student.id, error = %e, "Surplus correction failed");
                report.failures.push(BatchFailure {
                    student_id: student.id,
                    reason: e.to_string(),
                });
            }
        }
    }

    info!(
        "Surplus correction: {} students, {} corrections, {} failures",
        report.total_students_processed,
        report.total_corrections_made,
        report.failures.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::ledger::reverse_payment;
    use crate::entities::{Payment, PaymentType};
    use crate::test_utils::*;
    use proptest::prelude::*;

    #[test]
    fn test_surplus_from_initial() {
        assert_eq!(surplus_from_initial(25_000, 20_000), 5_000);
        assert_eq!(surplus_from_initial(20_000, 20_000), 0);
        assert_eq!(surplus_from_initial(10_000, 20_000), 0);
    }

    #[test]
    fn test_pool_draws_in_order() {
        let mut pool = SurplusPool::from_initial_fees(70_000, 20_000);
        assert_eq!(pool.draw(40_000), 40_000);
        assert_eq!(pool.draw(30_000), 10_000);
        assert_eq!(pool.draw(30_000), 0);
        assert_eq!(pool.remaining(), 0);

        let mut pool = SurplusPool::from_initial_fees(25_000, 20_000);
        assert_eq!(pool.draw(-10), 0);
        assert_eq!(pool.remaining(), 5_000);
    }

    proptest! {
        #[test]
        fn prop_pool_never_hands_out_more_than_surplus(
            initial in 0_i64..500_000,
            fee in 0_i64..100_000,
            owed in prop::collection::vec(-1_000_i64..200_000, 0..8),
        ) {
            let mut pool = SurplusPool::from_initial_fees(initial, fee);
            let surplus = pool.remaining();
            let drawn: i64 = owed.iter().map(|o| pool.draw(*o)).sum();
            prop_assert!(drawn <= surplus);
            prop_assert!(drawn >= 0);
            prop_assert_eq!(drawn + pool.remaining(), surplus);
        }
    }

    #[tokio::test]
    async fn test_fix_surplus_retags_legacy_rows() -> Result<()> {
        let (db, student) = setup_with_planned_student(PaymentType::Assigned).await?;
        pay_registration(&db, student.id, 25_000).await?;
        let genuine = pay_installment(&db, student.id, 1, 40_000).await?;
        let marked = insert_legacy_payment(
            &db,
            student.id,
            5_000,
            LEGACY_SURPLUS_METHOD,
            PaymentCategory::Installment,
            Some(2),
        )
        .await?;
        let orphan = insert_legacy_payment(
            &db,
            student.id,
            7_000,
            "cash",
            PaymentCategory::Installment,
            Some(9),
        )
        .await?;

        let correction = fix_surplus_for_student(&db, student.id).await?;
        assert_eq!(correction.corrections_made, 2);

        let marked = Payment::find_by_id(marked.id).one(&db).await?.unwrap();
        assert_eq!(marked.category, PaymentCategory::SurplusTransfer);
        assert_eq!(marked.installment_number, None);
        let orphan = Payment::find_by_id(orphan.id).one(&db).await?.unwrap();
        assert_eq!(orphan.category, PaymentCategory::Finalization);
        let genuine_after = Payment::find_by_id(genuine.id).one(&db).await?.unwrap();
        assert_eq!(genuine_after, genuine);

        // Idempotent
        let again = fix_surplus_for_student(&db, student.id).await?;
        assert_eq!(again.corrections_made, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_fix_surplus_leaves_reversal_pairs_alone() -> Result<()> {
        let (db, student) = setup_with_planned_student(PaymentType::Assigned).await?;
        let legacy = insert_legacy_payment(
            &db,
            student.id,
            5_000,
            LEGACY_SURPLUS_METHOD,
            PaymentCategory::Installment,
            Some(1),
        )
        .await?;
        reverse_payment(&db, legacy.id, None).await?;

        let correction = fix_surplus_for_student(&db, student.id).await?;
        assert_eq!(correction.corrections_made, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_fix_surplus_unknown_student() -> Result<()> {
        let db = setup_test_db().await?;
        let result = fix_surplus_for_student(&db, 42).await;
        assert!(matches!(
            result,
            Err(crate::errors::Error::NotFound { entity: "Student", .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_fix_all_surplus_reports_totals() -> Result<()> {
        let (db, level, class) = setup_with_class().await?;
        create_test_plan(&db, level.id, PaymentType::Assigned).await?;
        let awa = create_test_student(&db, class.id, "Awa", PaymentType::Assigned).await?;
        let binta = create_test_student(&db, class.id, "Binta", PaymentType::Assigned).await?;
        create_test_student(&db, class.id, "Chérif", PaymentType::Assigned).await?;

        for student_id in [awa.id, binta.id] {
            insert_legacy_payment(
                &db,
                student_id,
                3_000,
                LEGACY_SURPLUS_METHOD,
                PaymentCategory::Installment,
                Some(1),
            )
            .await?;
        }

        let report = fix_all_surplus(&db).await?;
        assert_eq!(report.total_students_processed, 3);
        assert_eq!(report.total_corrections_made, 2);
        assert!(report.failures.is_empty());

        let report = fix_all_surplus(&db).await?;
        assert_eq!(report.total_corrections_made, 0);
        Ok(())
    }
}
