/// Levels and installment plans
pub mod levels;

/// Arrears reports and reminders
pub mod reports;

/// Classes, students, payments and surplus corrections
pub mod students;

use chrono::{NaiveDate, Utc};

/// Current UTC calendar date, the reference for due-date comparisons.
fn today() -> NaiveDate {
    Utc::now().date_naive()
}
