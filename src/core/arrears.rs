//! Arrears aggregation - overdue installments across a class, a level or the school.
//!
//! Reports are built from derived [`StudentAccount`]s. Each overdue installment yields
//! one record; records are then folded into one summary per student.

use crate::{
    core::{
        roster::{Scope, classes_in_scope, students_in_classes},
        schedule::{StudentAccount, load_student_accounts},
    },
    entities::PaymentType,
    errors::Result,
};
use chrono::NaiveDate;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, instrument, warn};

/// One overdue installment of one student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverdueInstallmentRecord {
    /// Student ID
    pub student_id: i64,
    /// Student display name
    pub student_name: String,
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
    /// Installment number
    pub installment_number: i32,
    /// Due date
    pub due_date: NaiveDate,
    /// Amount due including carried-over balance
    pub amount_due: i64,
    /// Paid directly plus surplus applied
    pub amount_paid: i64,
    /// Still owed
    pub remaining_amount: i64,
    /// Days past the due date
    pub days_overdue: i64,
    /// Tuition track
    pub payment_type: PaymentType,
}

/// Overdue totals of one student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentOverdueSummary {
    /// Student ID
    pub student_id: i64,
    /// Student display name
    pub student_name: String,
    /// School registration number
    pub registration_number: String,
    /// Class name
    pub class_name: String,
    /// Level name
    pub level_name: String,
    /// Tuition track
    pub payment_type: PaymentType,
    /// Sum of `amount_due` over the student's records
    pub total_due_amount: i64,
    /// Sum of `amount_paid` over the student's records
    pub total_paid_amount: i64,
    /// Sum of `remaining_amount` over the student's records
    pub total_remaining_amount: i64,
    /// Largest `days_overdue` among the student's records
    pub max_days_overdue: i64,
    /// Number of overdue installments
    pub overdue_installment_count: usize,
}

/// Overdue records (most overdue first) and per-student summaries (largest debt first).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OverdueReport {
    /// One entry per overdue installment
    pub records: Vec<OverdueInstallmentRecord>,
    /// One entry per student with arrears
    pub summaries: Vec<StudentOverdueSummary>,
}

impl OverdueReport {
    /// Sum of remaining amounts over all summaries.
    #[must_use]
    pub fn total_remaining(&self) -> i64 {
        self.summaries
            .iter()
            .map(|summary| summary.total_remaining_amount)
            .sum()
    }
}

/// Records for the overdue installments of one account, in installment order.
#[must_use]
pub fn overdue_records(account: &StudentAccount) -> Vec<OverdueInstallmentRecord> {
    account
        .overdue_installments()
        .map(|installment| OverdueInstallmentRecord {
            student_id: account.student_id,
            student_name: account.full_name(),
            registration_number: account.registration_number.clone(),
            class_id: account.class_id,
            class_name: account.class_name.clone(),
            level_id: account.level_id,
            level_name: account.level_name.clone(),
            installment_number: installment.installment_number,
            due_date: installment.due_date,
            amount_due: installment.amount_with_carried_over,
            amount_paid: installment.total_paid + installment.surplus_applied,
            remaining_amount: installment.remaining_with_carried_over,
            days_overdue: installment.days_overdue,
            payment_type: account.payment_type,
        })
        .collect()
}

/// Folds records into one summary per student, largest remaining amount first.
#[must_use]
pub fn summarize(records: &[OverdueInstallmentRecord]) -> Vec<StudentOverdueSummary> {
    let mut by_student: BTreeMap<i64, StudentOverdueSummary> = BTreeMap::new();
    for record in records {
        let summary = by_student
            .entry(record.student_id)
            .or_insert_with(|| StudentOverdueSummary {
                student_id: record.student_id,
                student_name: record.student_name.clone(),
                registration_number: record.registration_number.clone(),
                class_name: record.class_name.clone(),
                level_name: record.level_name.clone(),
                payment_type: record.payment_type,
                total_due_amount: 0,
                total_paid_amount: 0,
                total_remaining_amount: 0,
                max_days_overdue: 0,
                overdue_installment_count: 0,
            });
        summary.total_due_amount += record.amount_due;
        summary.total_paid_amount += record.amount_paid;
        summary.total_remaining_amount += record.remaining_amount;
        summary.max_days_overdue = summary.max_days_overdue.max(record.days_overdue);
        summary.overdue_installment_count += 1;
    }

    let mut summaries: Vec<StudentOverdueSummary> = by_student.into_values().collect();
    summaries.sort_by(|a, b| {
        b.total_remaining_amount
            .cmp(&a.total_remaining_amount)
            .then(a.student_id.cmp(&b.student_id))
    });
    summaries
}

/// Builds the report for already derived accounts.
///
/// Accounts failing [`StudentAccount::check_consistency`] are left out and logged;
/// they never fail the report.
#[must_use]
pub fn build_overdue_report(accounts: &[StudentAccount]) -> OverdueReport {
    let mut records = Vec::new();
    for account in accounts {
        if let Err(e) = account.check_consistency() {
            warn!(student_id = account.student_id, error = %e, "Excluding student from arrears");
            continue;
        }
        records.extend(overdue_records(account));
    }

    records.sort_by(|a, b| {
        b.days_overdue
            .cmp(&a.days_overdue)
            .then(a.student_id.cmp(&b.student_id))
            .then(a.installment_number.cmp(&b.installment_number))
    });
    let summaries = summarize(&records);
    OverdueReport { records, summaries }
}

/// Overdue report for every student in `scope`, optionally restricted to one school
/// year, as of `today`.
#[instrument(skip(db))]
pub async fn overdue_report(
    db: &DatabaseConnection,
    scope: Scope,
    school_year: Option<&str>,
    today: NaiveDate,
) -> Result<OverdueReport> {
    let classes = classes_in_scope(db, scope, school_year).await?;
    let students = students_in_classes(db, &classes).await?;
    let accounts = load_student_accounts(db, &students, today).await?;
    let report = build_overdue_report(&accounts);

    debug!(
        students = accounts.len(),
        records = report.records.len(),
        debtors = report.summaries.len(),
        "Built overdue report"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::entities::PaymentCategory;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_paid_up_student_has_no_arrears() -> Result<()> {
        let (db, student) = setup_with_planned_student(PaymentType::Assigned).await?;
        pay_registration(&db, student.id, 20_000).await?;
        pay_installment(&db, student.id, 1, 40_000).await?;

        let report = overdue_report(&db, Scope::School, None, date(2025, 11, 1)).await?;
        assert!(report.records.is_empty());
        assert!(report.summaries.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_records_use_carried_over_amounts() -> Result<()> {
        let (db, student) = setup_with_planned_student(PaymentType::Assigned).await?;
        pay_registration(&db, student.id, 25_000).await?;
        pay_installment(&db, student.id, 1, 10_000).await?;

        let report = overdue_report(&db, Scope::School, None, date(2025, 11, 1)).await?;
        assert_eq!(report.records.len(), 1);
        let record = &report.records[0];
        assert_eq!(record.installment_number, 1);
        assert_eq!(record.amount_due, 40_000);
        assert_eq!(record.amount_paid, 15_000);
        assert_eq!(record.remaining_amount, 25_000);
        assert_eq!(record.days_overdue, 31);
        assert_eq!(record.student_name, "Awa Test");
        Ok(())
    }

    #[tokio::test]
    async fn test_school_report_sorted_by_remaining_amount() -> Result<()> {
        let db = setup_test_db().await?;
        let sixth = create_test_level(&db, "6ème").await?;
        let fifth = create_custom_level(&db, "5ème", 150_000, 25_000).await?;
        create_test_plan(&db, sixth.id, PaymentType::Assigned).await?;
        create_test_plan(&db, fifth.id, PaymentType::NonAssigned).await?;

        let class_a = create_test_class(&db, sixth.id, "6ème A").await?;
        let class_b = create_test_class(&db, fifth.id, "5ème B").await?;

        // Owes most of installment 1, carried into 2
        let awa = create_test_student(&db, class_a.id, "Awa", PaymentType::Assigned).await?;
        pay_installment(&db, awa.id, 1, 5_000).await?;
        // Owes 10 000 of installment 1, carried into 2
        let binta = create_test_student(&db, class_a.id, "Binta", PaymentType::Assigned).await?;
        pay_installment(&db, binta.id, 1, 30_000).await?;
        // Owes installments 1 and 2 with carry
        let cherif =
            create_test_student(&db, class_b.id, "Chérif", PaymentType::NonAssigned).await?;
        // Paid up
        let dior = create_test_student(&db, class_b.id, "Dior", PaymentType::NonAssigned).await?;
        pay_installment(&db, dior.id, 1, 40_000).await?;
        pay_installment(&db, dior.id, 2, 30_000).await?;

        let today = date(2026, 2, 1);
        let report = overdue_report(&db, Scope::School, None, today).await?;

        let order: Vec<i64> = report.summaries.iter().map(|s| s.student_id).collect();
        assert_eq!(order, vec![cherif.id, awa.id, binta.id]);
        assert!(
            report
                .summaries
                .windows(2)
                .all(|w| w[0].total_remaining_amount >= w[1].total_remaining_amount)
        );
        assert!(
            report
                .records
                .windows(2)
                .all(|w| w[0].days_overdue >= w[1].days_overdue)
        );
        assert!(
            report
                .records
                .iter()
                .all(|r| r.days_overdue >= 0 && r.remaining_amount > 0)
        );

        let cherif_summary = &report.summaries[0];
        assert_eq!(cherif_summary.overdue_installment_count, 2);
        assert_eq!(cherif_summary.max_days_overdue, 123);
        assert_eq!(cherif_summary.level_name, "5ème");

        let by_level = overdue_report(&db, Scope::Level(sixth.id), None, today).await?;
        assert_eq!(by_level.summaries.len(), 2);
        let by_class = overdue_report(&db, Scope::Class(class_b.id), None, today).await?;
        assert_eq!(by_class.summaries.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_inconsistent_student_is_excluded() -> Result<()> {
        let (db, level, class) = setup_with_class().await?;
        create_test_plan(&db, level.id, PaymentType::Assigned).await?;
        let broken = create_test_student(&db, class.id, "Awa", PaymentType::Assigned).await?;
        insert_legacy_payment(
            &db,
            broken.id,
            40_000,
            "cash",
            PaymentCategory::Installment,
            Some(7),
        )
        .await?;
        let owing = create_test_student(&db, class.id, "Binta", PaymentType::Assigned).await?;

        let report = overdue_report(&db, Scope::Class(class.id), None, date(2025, 11, 1)).await?;
        assert_eq!(report.summaries.len(), 1);
        assert_eq!(report.summaries[0].student_id, owing.id);
        Ok(())
    }

    #[tokio::test]
    async fn test_overpaid_student_is_excluded() -> Result<()> {
        let (db, student) = setup_with_planned_student(PaymentType::Assigned).await?;
        pay_registration(&db, student.id, 20_000).await?;
        pay_installment(&db, student.id, 1, 100_000).await?;

        let report = overdue_report(&db, Scope::School, None, date(2026, 5, 1)).await?;
        assert!(report.records.is_empty());
        assert!(report.summaries.is_empty());
        assert_eq!(report.total_remaining(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_scope() -> Result<()> {
        let (db, _level, class) = setup_with_class().await?;
        let report = overdue_report(&db, Scope::Class(class.id), None, date(2025, 11, 1)).await?;
        assert_eq!(report, OverdueReport::default());
        assert_eq!(report.total_remaining(), 0);
        Ok(())
    }
}
