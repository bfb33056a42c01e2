//! HTTP layer - axum router over the core operations.
//!
//! Handlers are thin: they parse the request, call into [`crate::core`], and let
//! [`crate::errors::Error`] turn failures into JSON error responses.

/// Error to HTTP response mapping
pub mod error;
/// Request handlers grouped by resource
pub mod handlers;

use crate::{
    config::AppConfig,
    core::{
        plan::PlanLocks,
        reminder::{ReminderSink, TracingReminderSink},
    },
};
use axum::{
    Router,
    routing::{get, patch, post},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared state available to all handlers.
pub struct AppState {
    /// Database connection for all database operations
    pub database: DatabaseConnection,
    /// Write locks of installment plans
    pub locks: PlanLocks,
    /// Loaded application configuration
    pub config: Arc<AppConfig>,
    /// Where arrears reminders are sent
    pub reminders: Arc<dyn ReminderSink + Send + Sync>,
}

impl AppState {
    /// Creates state that logs reminders instead of sending them.
    #[must_use]
    pub fn new(database: DatabaseConnection, config: Arc<AppConfig>) -> Self {
        Self {
            database,
            locks: PlanLocks::new(),
            config,
            reminders: Arc::new(TracingReminderSink),
        }
    }

    /// Replaces the reminder destination.
    #[must_use]
    pub fn with_reminder_sink(mut self, sink: Arc<dyn ReminderSink + Send + Sync>) -> Self {
        self.reminders = sink;
        self
    }
}

/// Builds the application router.
pub fn router(state: Arc<AppState>) -> Router {
    use handlers::{levels, reports, students};

    Router::new()
        .route("/levels", get(levels::list).post(levels::create))
        .route(
            "/levels/:level_id/installments",
            get(levels::installments).post(levels::add_installment),
        )
        .route(
            "/levels/:level_id/installments/default",
            post(levels::default_installments),
        )
        .route(
            "/levels/:level_id/installments/recalculate",
            post(levels::recalculate),
        )
        .route(
            "/installments/:entry_id",
            patch(levels::update_installment).delete(levels::remove_installment),
        )
        .route("/classes", post(students::create_class))
        .route("/classes/:class_id/students", get(students::class_students))
        .route("/students", post(students::enroll))
        .route("/students/:student_id", get(students::account))
        .route(
            "/students/:student_id/payments",
            get(students::payments).post(students::record_payment),
        )
        .route("/payments/:payment_id/reversal", post(students::reverse_payment))
        .route("/students/:student_id/fix-surplus", post(students::fix_surplus))
        .route("/fix-all-surplus", post(students::fix_all_surplus))
        .route("/reports/overdue", get(reports::overdue))
        .route("/reports/overdue/summary", get(reports::overdue_summary))
        .route("/reports/overdue/reminders", post(reports::send_reminders))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
