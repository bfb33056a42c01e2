//! Shared formatting and validation helpers.
//!
//! Percentages are handled in two representations: `f64` percent for storage and
//! display, and integer basis points (hundredths of a percent) wherever sums must be
//! exact. Amounts are whole currency units.

use crate::errors::{Error, Result};
use chrono::{DateTime, NaiveDate};

/// Basis points in 100 %.
pub const FULL_BASIS_POINTS: i64 = 10_000;

/// Slack allowed on a plan's cumulative percentage, in basis points (0.01 %).
pub const PERCENTAGE_TOLERANCE_BASIS_POINTS: i64 = 1;

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d"];

/// Parses a calendar date supplied by a client.
///
/// Accepts `YYYY-MM-DD`, `DD/MM/YYYY`, `YYYY/MM/DD` and RFC 3339 timestamps (the time
/// of day is discarded).
pub fn parse_due_date(input: &str) -> Result<NaiveDate> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::validation("due date is required"));
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(trimmed)
                .ok()
                .map(|timestamp| timestamp.date_naive())
        })
        .ok_or_else(|| Error::validation(format!("unparsable due date: {trimmed:?}")))
}

/// Rounds a percentage to two decimals.
#[must_use]
pub fn round_percentage(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Converts a percentage to basis points, rounding to the nearest point.
#[must_use]
#[allow(clippy::cast_possible_truncation)] // percentages are bounded well inside i64
pub fn to_basis_points(percentage: f64) -> i64 {
    (percentage * 100.0).round() as i64
}

/// Converts basis points back to a percentage.
#[must_use]
#[allow(clippy::cast_precision_loss)] // basis points never exceed 2^52
pub fn from_basis_points(basis_points: i64) -> f64 {
    basis_points as f64 / 100.0
}

/// Share of `base` represented by `amount`, in percent rounded to two decimals.
/// A non-positive base yields 0.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn percentage_of(amount: i64, base: i64) -> f64 {
    if base <= 0 {
        return 0.0;
    }
    round_percentage(amount as f64 / base as f64 * 100.0)
}

/// Amount corresponding to `basis_points` of `base`, rounded to the nearest unit.
#[must_use]
pub fn share_of(base: i64, basis_points: i64) -> i64 {
    let scaled = i128::from(base) * i128::from(basis_points);
    let denominator = i128::from(FULL_BASIS_POINTS);
    let rounded = (scaled + denominator / 2).div_euclid(denominator);
    i64::try_from(rounded).unwrap_or(i64::MAX)
}

/// Whole days from `due_date` to `today`, floored at zero.
#[must_use]
pub fn days_overdue(due_date: NaiveDate, today: NaiveDate) -> i64 {
    today.signed_duration_since(due_date).num_days().max(0)
}

/// Formats an amount with space-separated thousands, e.g. `120 000`.
#[must_use]
pub fn format_amount(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(digit);
    }
    if amount < 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;

    #[test]
    fn test_parse_due_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 10, 1).unwrap();
        assert_eq!(parse_due_date("2025-10-01").unwrap(), expected);
        assert_eq!(parse_due_date(" 01/10/2025 ").unwrap(), expected);
        assert_eq!(parse_due_date("2025/10/01").unwrap(), expected);
        assert_eq!(parse_due_date("2025-10-01T08:30:00Z").unwrap(), expected);
    }

    #[test]
    fn test_parse_due_date_rejects_garbage() {
        assert!(matches!(
            parse_due_date("next tuesday"),
            Err(Error::Validation { .. })
        ));
        assert!(matches!(parse_due_date(""), Err(Error::Validation { .. })));
        assert!(matches!(
            parse_due_date("2025-02-30"),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn test_percentage_helpers() {
        assert_eq!(round_percentage(33.333_333), 33.33);
        assert_eq!(to_basis_points(100.02), 10_002);
        assert_eq!(to_basis_points(33.33), 3_333);
        assert_eq!(from_basis_points(4_000), 40.0);
        assert_eq!(percentage_of(40_000, 100_000), 40.0);
        assert_eq!(percentage_of(1, 3), 33.33);
        assert_eq!(percentage_of(10, 0), 0.0);
    }

    #[test]
    fn test_share_of_rounds_half_up() {
        assert_eq!(share_of(100_000, 4_000), 40_000);
        assert_eq!(share_of(101, 5_000), 51);
        assert_eq!(share_of(0, 3_000), 0);
    }

    #[test]
    fn test_days_overdue_floors_at_zero() {
        let due = NaiveDate::from_ymd_opt(2025, 10, 1).unwrap();
        let later = NaiveDate::from_ymd_opt(2025, 10, 11).unwrap();
        let earlier = NaiveDate::from_ymd_opt(2025, 9, 20).unwrap();
        assert_eq!(days_overdue(due, later), 10);
        assert_eq!(days_overdue(due, earlier), 0);
        assert_eq!(days_overdue(due, due), 0);
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(0), "0");
        assert_eq!(format_amount(950), "950");
        assert_eq!(format_amount(120_000), "120 000");
        assert_eq!(format_amount(1_234_567), "1 234 567");
        assert_eq!(format_amount(-40_000), "-40 000");
    }
}
