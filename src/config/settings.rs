//! Application configuration loading from config.toml
//!
//! The file describes the HTTP bind address, the academic calendar used to date
//! default installment plans, the default plan split, and the levels to seed on
//! first run. Every section is optional and falls back to sensible defaults.

use crate::errors::{Error, Result};
use chrono::{Datelike, Months, NaiveDate};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Academic calendar used for default plan due dates
    #[serde(default)]
    pub calendar: AcademicCalendar,
    /// Split used by the default installment plan
    #[serde(default)]
    pub default_plan: DefaultPlanConfig,
    /// Levels to seed when missing from the database
    #[serde(default)]
    pub levels: Vec<LevelConfig>,
}

/// HTTP server settings
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Socket address the API listens on
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1:3000".to_string()
}

/// Academic calendar: the month the school year starts and the length of a term.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct AcademicCalendar {
    /// Month (1-12) in which the school year starts
    #[serde(default = "default_start_month")]
    pub start_month: u32,
    /// Number of months between two default installments
    #[serde(default = "default_term_months")]
    pub term_months: u32,
}

impl Default for AcademicCalendar {
    fn default() -> Self {
        Self {
            start_month: default_start_month(),
            term_months: default_term_months(),
        }
    }
}

const fn default_start_month() -> u32 {
    9
}

const fn default_term_months() -> u32 {
    3
}

impl AcademicCalendar {
    /// First day of the academic year that contains `today`.
    ///
    /// A date before the start month belongs to the year that started the
    /// previous calendar year.
    pub fn academic_year_start(&self, today: NaiveDate) -> Result<NaiveDate> {
        let year = if today.month() >= self.start_month {
            today.year()
        } else {
            today.year() - 1
        };
        NaiveDate::from_ymd_opt(year, self.start_month, 1).ok_or_else(|| Error::Config {
            message: format!("invalid academic start month {}", self.start_month),
        })
    }

    /// `count` due dates one term apart, starting at the academic year start.
    pub fn term_due_dates(&self, count: usize, today: NaiveDate) -> Result<Vec<NaiveDate>> {
        let start = self.academic_year_start(today)?;
        (0..count)
            .map(|index| {
                let offset = u32::try_from(index)
                    .ok()
                    .and_then(|i| i.checked_mul(self.term_months))
                    .ok_or_else(|| Error::validation("too many installments"))?;
                start
                    .checked_add_months(Months::new(offset))
                    .ok_or_else(|| Error::validation("installment due date out of range"))
            })
            .collect()
    }
}

/// Split of the default installment plan, in percent of the installment base.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DefaultPlanConfig {
    /// One percentage per default installment
    #[serde(default = "default_percentages")]
    pub percentages: Vec<f64>,
}

impl Default for DefaultPlanConfig {
    fn default() -> Self {
        Self {
            percentages: default_percentages(),
        }
    }
}

fn default_percentages() -> Vec<f64> {
    vec![40.0, 30.0, 30.0]
}

/// Fee schedule of a level to seed
#[derive(Debug, Deserialize, Clone)]
pub struct LevelConfig {
    /// Display name of the level
    pub name: String,
    /// Position in listings
    #[serde(default)]
    pub ordering: i32,
    /// Tuition for assigned students
    pub tuition_assigned: i64,
    /// Tuition for non-assigned students
    pub tuition_non_assigned: i64,
    /// Registration fee for assigned students
    pub registration_fee_assigned: i64,
    /// Registration fee for non-assigned students
    pub registration_fee_non_assigned: i64,
}

impl AppConfig {
    /// Checks cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if !(1..=12).contains(&self.calendar.start_month) {
            return Err(Error::Config {
                message: format!(
                    "calendar.start_month must be 1-12, got {}",
                    self.calendar.start_month
                ),
            });
        }
        if self.calendar.term_months == 0 {
            return Err(Error::Config {
                message: "calendar.term_months must be at least 1".to_string(),
            });
        }
        let percentages = &self.default_plan.percentages;
        if percentages.is_empty() || percentages.iter().any(|p| !(0.0..=100.0).contains(p)) {
            return Err(Error::Config {
                message: "default_plan.percentages must be non-empty values in 0-100"
                    .to_string(),
            });
        }
        let total: f64 = percentages.iter().sum();
        if (total - 100.0).abs() > 0.01 {
            return Err(Error::Config {
                message: format!("default_plan.percentages must sum to 100, got {total}"),
            });
        }
        Ok(())
    }
}

/// Loads and validates configuration from a TOML file
///
/// # Errors
/// Returns an error if the file cannot be read, the TOML syntax is invalid, or the
/// values fail [`AppConfig::validate`].
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    debug!("Loading configuration from {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path_ref.display()),
    })?;

    let config: AppConfig = toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse {}: {e}", path_ref.display()),
    })?;
    config.validate()?;
    Ok(config)
}

/// Loads configuration from `TUITION_CONFIG` (default `./config.toml`).
///
/// A missing file is not an error: the built-in defaults are used and no levels
/// are seeded.
pub fn load_default_config() -> Result<AppConfig> {
    let path = std::env::var("TUITION_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    if Path::new(&path).exists() {
        load_config(&path)
    } else {
        warn!("No configuration file at {}, using defaults", path);
        Ok(AppConfig::default())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
            [server]
            bind_address = "0.0.0.0:8080"

            [calendar]
            start_month = 10
            term_months = 4

            [default_plan]
            percentages = [50.0, 50.0]

            [[levels]]
            name = "6ème"
            ordering = 1
            tuition_assigned = 120000
            tuition_non_assigned = 150000
            registration_fee_assigned = 20000
            registration_fee_non_assigned = 25000
        "#;

        let config: AppConfig = toml::from_str(toml_str).unwrap();
        config.validate().unwrap();
        assert_eq!(config.server.bind_address, "0.0.0.0:8080");
        assert_eq!(config.calendar.start_month, 10);
        assert_eq!(config.calendar.term_months, 4);
        assert_eq!(config.default_plan.percentages, vec![50.0, 50.0]);
        assert_eq!(config.levels.len(), 1);
        assert_eq!(config.levels[0].name, "6ème");
        assert_eq!(config.levels[0].registration_fee_non_assigned, 25000);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        config.validate().unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:3000");
        assert_eq!(config.calendar, AcademicCalendar::default());
        assert_eq!(config.default_plan.percentages, vec![40.0, 30.0, 30.0]);
        assert!(config.levels.is_empty());
    }

    #[test]
    fn test_validate_rejects_bad_split() {
        let config: AppConfig = toml::from_str(
            r"
            [default_plan]
            percentages = [40.0, 30.0]
            ",
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn test_validate_rejects_bad_month() {
        let config: AppConfig = toml::from_str(
            r"
            [calendar]
            start_month = 13
            ",
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn test_academic_year_start() {
        let calendar = AcademicCalendar::default();
        let in_autumn = NaiveDate::from_ymd_opt(2025, 10, 17).unwrap();
        let in_spring = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let expected = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();

        assert_eq!(calendar.academic_year_start(in_autumn).unwrap(), expected);
        assert_eq!(calendar.academic_year_start(in_spring).unwrap(), expected);
    }

    #[test]
    fn test_term_due_dates_are_one_term_apart() {
        let calendar = AcademicCalendar::default();
        let today = NaiveDate::from_ymd_opt(2025, 9, 15).unwrap();
        let dates = calendar.term_due_dates(3, today).unwrap();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 12, 1).unwrap(),
                NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            ]
        );
    }
}
