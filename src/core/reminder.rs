//! Arrears reminders and printable arrears summaries.
//!
//! Delivery is pluggable through [`ReminderSink`]. Reminders are dispatched one
//! student at a time, and a failed delivery is recorded without stopping the others.

use crate::{
    core::{
        arrears::{OverdueReport, StudentOverdueSummary},
        format::format_amount,
        surplus::BatchFailure,
    },
    errors::Result,
};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

/// What a reminder tells a family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArrearsReminder {
    /// Student concerned
    pub student_id: i64,
    /// Student display name
    pub student_name: String,
    /// Class name
    pub class_name: String,
    /// Total owed on overdue installments
    pub total_remaining_amount: i64,
    /// Oldest overdue installment, in days
    pub max_days_overdue: i64,
    /// Number of overdue installments
    pub overdue_installment_count: usize,
    /// Rendered message
    pub message: String,
}

impl From<&StudentOverdueSummary> for ArrearsReminder {
    fn from(summary: &StudentOverdueSummary) -> Self {
        let plural = if summary.overdue_installment_count == 1 { "" } else { "s" };
        let message = format!(
            "{} ({}) has {} overdue installment{} totalling {}, the oldest {} days late.",
            summary.student_name,
            summary.class_name,
            summary.overdue_installment_count,
            plural,
            format_amount(summary.total_remaining_amount),
            summary.max_days_overdue
        );
        Self {
            student_id: summary.student_id,
            student_name: summary.student_name.clone(),
            class_name: summary.class_name.clone(),
            total_remaining_amount: summary.total_remaining_amount,
            max_days_overdue: summary.max_days_overdue,
            overdue_installment_count: summary.overdue_installment_count,
            message,
        }
    }
}

/// Destination for reminders (mailer, SMS gateway, print queue, ...).
pub trait ReminderSink {
    /// Delivers one reminder.
    fn deliver(&self, reminder: &ArrearsReminder) -> Result<()>;
}

/// Sink that writes reminders to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReminderSink;

impl ReminderSink for TracingReminderSink {
    fn deliver(&self, reminder: &ArrearsReminder) -> Result<()> {
        info!(
            student_id = reminder.student_id,
            amount = reminder.total_remaining_amount,
            "Reminder: {}",
            reminder.message
        );
        Ok(())
    }
}

/// Outcome of a reminder run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// Reminders delivered
    pub sent: usize,
    /// Students whose reminder failed
    pub failures: Vec<BatchFailure>,
}

/// Sends one reminder per summary to `sink`.
pub fn dispatch_reminders<S>(summaries: &[StudentOverdueSummary], sink: &S) -> DispatchReport
where
    S: ReminderSink + ?Sized,
{
    let mut report = DispatchReport::default();
    for summary in summaries {
        let reminder = ArrearsReminder::from(summary);
        match sink.deliver(&reminder) {
            Ok(()) => report.sent += 1,
            Err(e) => {
                warn!(student_id = summary.student_id, error = %e, "Reminder delivery failed");
                report.failures.push(BatchFailure {
                    student_id: summary.student_id,
                    reason: e.to_string(),
                });
            }
        }
    }
    info!(
        "Dispatched {} reminders, {} failed",
        report.sent,
        report.failures.len()
    );
    report
}

/// Renders a report as printable text, one line per debtor.
#[must_use]
pub fn format_arrears_summary(report: &OverdueReport, today: NaiveDate) -> String {
    let mut lines = vec![
        format!(
            "Arrears as of {} - {} students, {} overdue installments",
            today.format("%d/%m/%Y"),
            report.summaries.len(),
            report.records.len()
        ),
        format!("  Total outstanding: {}", format_amount(report.total_remaining())),
        String::new(),
    ];

    lines.extend(report.summaries.iter().map(|summary| {
        format!(
            "  {} - {} ({}) | {} due, {} paid, {} outstanding | {} installments, max {} days",
            summary.student_name,
            summary.class_name,
            summary.level_name,
            format_amount(summary.total_due_amount),
            format_amount(summary.total_paid_amount),
            format_amount(summary.total_remaining_amount),
            summary.overdue_installment_count,
            summary.max_days_overdue
        )
    }));

    let mut text = lines.join("\n");
    text.push('\n');
    text
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::entities::PaymentType;
    use crate::errors::Error;
    use std::cell::RefCell;

    fn summary(student_id: i64, remaining: i64) -> StudentOverdueSummary {
        StudentOverdueSummary {
            student_id,
            student_name: format!("Student {student_id}"),
            registration_number: format!("R-{student_id}"),
            class_name: "6ème A".to_string(),
            level_name: "6ème".to_string(),
            payment_type: PaymentType::Assigned,
            total_due_amount: remaining,
            total_paid_amount: 0,
            total_remaining_amount: remaining,
            max_days_overdue: 31,
            overdue_installment_count: 1,
        }
    }

    /// Records deliveries and refuses one student.
    struct RecordingSink {
        refuse: i64,
        delivered: RefCell<Vec<i64>>,
    }

    impl ReminderSink for RecordingSink {
        fn deliver(&self, reminder: &ArrearsReminder) -> Result<()> {
            if reminder.student_id == self.refuse {
                return Err(Error::validation("no contact address"));
            }
            self.delivered.borrow_mut().push(reminder.student_id);
            Ok(())
        }
    }

    #[test]
    fn test_reminder_message() {
        let reminder = ArrearsReminder::from(&summary(7, 125_000));
        assert_eq!(
            reminder.message,
            "Student 7 (6ème A) has 1 overdue installment totalling 125 000, the oldest 31 days late."
        );
    }

    #[test]
    fn test_dispatch_continues_after_failure() {
        let sink = RecordingSink {
            refuse: 2,
            delivered: RefCell::new(Vec::new()),
        };
        let summaries = vec![summary(1, 100), summary(2, 90), summary(3, 80)];

        let report = dispatch_reminders(&summaries, &sink);
        assert_eq!(report.sent, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].student_id, 2);
        assert_eq!(*sink.delivered.borrow(), vec![1, 3]);
    }

    #[test]
    fn test_tracing_sink_accepts_everything() {
        let report = dispatch_reminders(&[summary(1, 100)], &TracingReminderSink);
        assert_eq!(report.sent, 1);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_format_arrears_summary() {
        let report = OverdueReport {
            records: Vec::new(),
            summaries: vec![summary(1, 40_000), summary(2, 10_000)],
        };
        let text = format_arrears_summary(&report, NaiveDate::from_ymd_opt(2025, 11, 1).unwrap());

        assert!(text.starts_with("Arrears as of 01/11/2025 - 2 students, 0 overdue installments\n"));
        assert!(text.contains("Total outstanding: 50 000"));
        assert!(text.contains("Student 1 - 6ème A (6ème) | 40 000 due, 0 paid, 40 000 outstanding"));
        assert_eq!(text.lines().count(), 5);
    }
}
