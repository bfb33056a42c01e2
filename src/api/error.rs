//! Maps crate errors to JSON error responses.

use crate::errors::Error;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

impl Error {
    /// Short machine-readable name of the error kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::InvalidAmount { .. } => "invalid_amount",
            Self::NotFound { .. } => "not_found",
            Self::ReconciliationInconsistency { .. } => "reconciliation_inconsistency",
            Self::Config { .. } => "config",
            Self::Database(_) => "database",
            Self::Io(_) => "io",
            Self::EnvVar(_) => "environment",
        }
    }

    /// HTTP status the error is reported with.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } | Self::InvalidAmount { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        let body = json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            Error::validation("bad").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::InvalidAmount { amount: -1 }.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::not_found("Student", 1).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::ReconciliationInconsistency {
                student_id: 1,
                message: "x".to_string()
            }
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_response_status() {
        let response = Error::not_found("Level", 9).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
