/// Overdue records and per-student arrears summaries
pub mod arrears;

/// Date parsing, percentage rounding and amount formatting
pub mod format;

/// Append-only payment ledger with reversals and idempotency keys
pub mod ledger;

/// Levels and their per-track fee schedules
pub mod level;

/// Installment plan entries and percentage bookkeeping
pub mod plan;

/// Arrears reminders and printable summaries
pub mod reminder;

/// Classes, students and report scopes
pub mod roster;

/// Per-student installment schedules with carry-forward
pub mod schedule;

/// Surplus allocation and legacy surplus correction
pub mod surplus;
