//! Shared test utilities for the tuition ledger.
//!
//! This module provides common helper functions for setting up test databases
//! and creating levels, classes, students, plans and payments with sensible defaults.

use crate::{
    core::{
        ledger::{self, NewPayment},
        level::{self, NewLevel},
        plan::{self, NewPlanEntry, PlanLocks},
        roster::{self, NewClass, NewStudent},
    },
    entities::{self, PaymentCategory, PaymentType, payment},
    errors::Result,
};
use chrono::NaiveDate;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};

/// School year label used by test classes.
pub const TEST_SCHOOL_YEAR: &str = "2025-2026";

/// Due dates of the standard test plan.
pub const TEST_PLAN_DUE_DATES: [&str; 3] = ["2025-10-01", "2026-01-15", "2026-04-15"];

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Shorthand for a calendar date in tests.
///
/// # Panics
/// Panics on an invalid date.
#[must_use]
pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_else(|| panic!("bad date {year}-{month}-{day}"))
}

/// Creates a test level with sensible defaults.
///
/// # Defaults
/// * tuition: 120 000 on both tracks
/// * registration fee: 20 000 on both tracks
pub async fn create_test_level(db: &DatabaseConnection, name: &str) -> Result<entities::LevelModel> {
    create_custom_level(db, name, 120_000, 20_000).await
}

/// Creates a level with the same tuition and registration fee on both tracks.
pub async fn create_custom_level(
    db: &DatabaseConnection,
    name: &str,
    tuition: i64,
    registration_fee: i64,
) -> Result<entities::LevelModel> {
    level::create_level(
        db,
        NewLevel {
            name: name.to_string(),
            ordering: 0,
            tuition_assigned: tuition,
            tuition_non_assigned: tuition,
            registration_fee_assigned: registration_fee,
            registration_fee_non_assigned: registration_fee,
        },
    )
    .await
}

/// Creates a class of `level_id` in [`TEST_SCHOOL_YEAR`].
pub async fn create_test_class(
    db: &DatabaseConnection,
    level_id: i64,
    name: &str,
) -> Result<entities::SchoolClassModel> {
    roster::create_class(
        db,
        NewClass {
            name: name.to_string(),
            level_id,
            school_year: TEST_SCHOOL_YEAR.to_string(),
        },
    )
    .await
}

/// Enrolls a test student.
///
/// # Defaults
/// * `last_name`: "Test"
/// * `registration_number`: "REG-<first_name>"
/// * `tuition_override`: None
pub async fn create_test_student(
    db: &DatabaseConnection,
    class_id: i64,
    first_name: &str,
    payment_type: PaymentType,
) -> Result<entities::StudentModel> {
    roster::create_student(
        db,
        NewStudent {
            first_name: first_name.to_string(),
            last_name: "Test".to_string(),
            registration_number: format!("REG-{first_name}"),
            class_id,
            payment_type,
            tuition_override: None,
        },
    )
    .await
}

/// Creates the standard 40/30/30 plan (40 000, 30 000, 30 000) dated
/// [`TEST_PLAN_DUE_DATES`] for one track of a level.
pub async fn create_test_plan(
    db: &DatabaseConnection,
    level_id: i64,
    payment_type: PaymentType,
) -> Result<Vec<entities::InstallmentPlanEntryModel>> {
    let locks = PlanLocks::new();
    let mut entries = Vec::new();
    for ((amount, percentage), due_date) in [(40_000, 40.0), (30_000, 30.0), (30_000, 30.0)]
        .into_iter()
        .zip(TEST_PLAN_DUE_DATES)
    {
        let entry = plan::add_entry(
            db,
            &locks,
            level_id,
            NewPlanEntry {
                payment_type,
                amount,
                due_date: due_date.to_string(),
                percentage,
            },
        )
        .await?;
        entries.push(entry);
    }
    Ok(entries)
}

/// Sets up a test environment with one level.
/// Returns (db, level).
pub async fn setup_with_level() -> Result<(DatabaseConnection, entities::LevelModel)> {
    let db = setup_test_db().await?;
    let level = create_test_level(&db, "6ème").await?;
    Ok((db, level))
}

/// Sets up a test environment with a level and one of its classes.
/// Returns (db, level, class).
pub async fn setup_with_class() -> Result<(
    DatabaseConnection,
    entities::LevelModel,
    entities::SchoolClassModel,
)> {
    let (db, level) = setup_with_level().await?;
    let class = create_test_class(&db, level.id, "6ème A").await?;
    Ok((db, level, class))
}

/// Sets up a student whose level has the standard test plan on their track.
/// Returns (db, student).
pub async fn setup_with_planned_student(
    payment_type: PaymentType,
) -> Result<(DatabaseConnection, entities::StudentModel)> {
    let (db, level, class) = setup_with_class().await?;
    create_test_plan(&db, level.id, payment_type).await?;
    let student = create_test_student(&db, class.id, "Awa", payment_type).await?;
    Ok((db, student))
}

/// Payment input for an initial-bucket category, paid in cash on 2025-09-05.
#[must_use]
pub fn initial_payment(amount: i64, category: PaymentCategory) -> NewPayment {
    NewPayment {
        amount,
        payment_date: "2025-09-05".to_string(),
        method: "cash".to_string(),
        category,
        installment_number: None,
        idempotency_key: None,
    }
}

/// Records a cash payment against an installment.
pub async fn pay_installment(
    db: &DatabaseConnection,
    student_id: i64,
    installment_number: i32,
    amount: i64,
) -> Result<payment::Model> {
    ledger::record_payment(
        db,
        student_id,
        NewPayment {
            amount,
            payment_date: "2025-10-01".to_string(),
            method: "cash".to_string(),
            category: PaymentCategory::Installment,
            installment_number: Some(installment_number),
            idempotency_key: None,
        },
    )
    .await
}

/// Records a registration fee payment.
pub async fn pay_registration(
    db: &DatabaseConnection,
    student_id: i64,
    amount: i64,
) -> Result<payment::Model> {
    ledger::record_payment(
        db,
        student_id,
        initial_payment(amount, PaymentCategory::Registration),
    )
    .await
}

/// Inserts a payment row directly, bypassing ledger validation.
/// Use this to reproduce rows written by older versions of the system.
pub async fn insert_legacy_payment(
    db: &DatabaseConnection,
    student_id: i64,
    amount: i64,
    method: &str,
    category: PaymentCategory,
    installment_number: Option<i32>,
) -> Result<payment::Model> {
    payment::ActiveModel {
        student_id: Set(student_id),
        amount: Set(amount),
        payment_date: Set(date(2025, 9, 20)),
        method: Set(method.to_string()),
        category: Set(category),
        installment_number: Set(installment_number),
        idempotency_key: Set(None),
        reverses_payment_id: Set(None),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}
