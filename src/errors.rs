//! Unified error type for the tuition ledger.
//!
//! Every fallible operation in the crate returns [`Result`]. Variants are grouped by how
//! the HTTP layer surfaces them: validation problems are the caller's fault, missing
//! records are reported as such, and everything else is an internal failure.

use thiserror::Error;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or out-of-range input (bad date, percentage cap exceeded, ...).
    #[error("Validation error: {message}")]
    Validation {
        /// Human-readable reason the input was rejected
        message: String,
    },

    /// A monetary amount was negative or otherwise unusable.
    #[error("Invalid amount: {amount}")]
    InvalidAmount {
        /// The offending amount
        amount: i64,
    },

    /// A referenced level, plan entry, class, student or payment does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record that was looked up
        entity: &'static str,
        /// Identifier used for the lookup
        id: String,
    },

    /// Derived state for a student cannot be represented consistently
    /// (for example surplus money with no installment left to absorb it).
    #[error("Reconciliation inconsistency for student {student_id}: {message}")]
    ReconciliationInconsistency {
        /// Student whose ledger is inconsistent
        student_id: i64,
        /// Description of the anomaly
        message: String,
    },

    /// Configuration could not be read or parsed.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration problem
        message: String,
    },

    /// Database layer failure.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// I/O failure (config file, socket binding).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing or malformed environment variable.
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),
}

impl Error {
    /// Shorthand for building a [`Error::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Shorthand for building a [`Error::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns true for errors caused by caller input rather than system state.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::InvalidAmount { .. })
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
