//! Arrears report handlers.

use super::today;
use crate::{
    api::AppState,
    core::{
        arrears::{self, OverdueReport},
        reminder::{self, DispatchReport},
        roster::Scope,
    },
    errors::{Error, Result},
};
use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use std::sync::Arc;

/// Part of the school a report covers.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    /// One class, `scope_id` is the class ID
    Class,
    /// One level, `scope_id` is the level ID
    Level,
    /// Whole school
    School,
}

/// `?scope=class|level|school&scope_id=&school_year=`
#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    /// Kind of scope
    pub scope: ScopeKind,
    /// Class or level ID, required unless the scope is the school
    pub scope_id: Option<i64>,
    /// Restricts the report to classes of one school year
    pub school_year: Option<String>,
}

impl ReportQuery {
    /// Resolves the query into a [`Scope`].
    pub fn scope(&self) -> Result<Scope> {
        match (self.scope, self.scope_id) {
            (ScopeKind::Class, Some(id)) => Ok(Scope::Class(id)),
            (ScopeKind::Level, Some(id)) => Ok(Scope::Level(id)),
            (ScopeKind::School, _) => Ok(Scope::School),
            (kind, None) => Err(Error::validation(format!(
                "scope_id is required for a {kind:?} report"
            ))),
        }
    }
}

async fn build_report(state: &AppState, query: &ReportQuery) -> Result<OverdueReport> {
    arrears::overdue_report(
        &state.database,
        query.scope()?,
        query.school_year.as_deref(),
        today(),
    )
    .await
}

/// `GET /reports/overdue`
pub async fn overdue(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<OverdueReport>> {
    Ok(Json(build_report(&state, &query).await?))
}

/// `GET /reports/overdue/summary` - printable text.
pub async fn overdue_summary(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReportQuery>,
) -> Result<String> {
    let report = build_report(&state, &query).await?;
    Ok(reminder::format_arrears_summary(&report, today()))
}

/// `POST /reports/overdue/reminders`
pub async fn send_reminders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<DispatchReport>> {
    let report = build_report(&state, &query).await?;
    Ok(Json(reminder::dispatch_reminders(
        &report.summaries,
        state.reminders.as_ref(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_resolution() {
        let query = |scope, scope_id| ReportQuery {
            scope,
            scope_id,
            school_year: None,
        };
        assert_eq!(query(ScopeKind::Class, Some(3)).scope().ok(), Some(Scope::Class(3)));
        assert_eq!(query(ScopeKind::Level, Some(4)).scope().ok(), Some(Scope::Level(4)));
        assert_eq!(query(ScopeKind::School, None).scope().ok(), Some(Scope::School));
        assert!(matches!(
            query(ScopeKind::Level, None).scope(),
            Err(Error::Validation { .. })
        ));
    }
}
