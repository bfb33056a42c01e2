//! Class, student, payment and surplus correction handlers.

use super::today;
use crate::{
    api::AppState,
    core::{
        ledger::{self, NewPayment},
        roster::{self, NewClass, NewStudent},
        schedule::{self, StudentAccount},
        surplus::{self, BatchCorrectionReport, SurplusCorrection},
    },
    entities::{PaymentModel, SchoolClassModel, StudentModel},
    errors::Result,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use std::sync::Arc;

/// Optional school year filter.
#[derive(Debug, Default, Deserialize)]
pub struct SchoolYearQuery {
    /// e.g. `2025-2026`
    pub school_year: Option<String>,
}

/// Body of a reversal request.
#[derive(Debug, Default, Deserialize)]
pub struct ReversalRequest {
    /// Why the payment is cancelled
    #[serde(default)]
    pub reason: Option<String>,
}

/// `POST /classes`
pub async fn create_class(
    State(state): State<Arc<AppState>>,
    Json(input): Json<NewClass>,
) -> Result<(StatusCode, Json<SchoolClassModel>)> {
    let class = roster::create_class(&state.database, input).await?;
    Ok((StatusCode::CREATED, Json(class)))
}

/// `GET /classes/:class_id/students`
pub async fn class_students(
    State(state): State<Arc<AppState>>,
    Path(class_id): Path<i64>,
    Query(query): Query<SchoolYearQuery>,
) -> Result<Json<Vec<StudentAccount>>> {
    let accounts = schedule::class_students_with_installments(
        &state.database,
        class_id,
        query.school_year.as_deref(),
        today(),
    )
    .await?;
    Ok(Json(accounts))
}

/// `POST /students`
pub async fn enroll(
    State(state): State<Arc<AppState>>,
    Json(input): Json<NewStudent>,
) -> Result<(StatusCode, Json<StudentModel>)> {
    let student = roster::create_student(&state.database, input).await?;
    Ok((StatusCode::CREATED, Json(student)))
}

/// `GET /students/:student_id`
pub async fn account(
    State(state): State<Arc<AppState>>,
    Path(student_id): Path<i64>,
) -> Result<Json<StudentAccount>> {
    Ok(Json(
        schedule::student_account(&state.database, student_id, today()).await?,
    ))
}

/// `GET /students/:student_id/payments`
pub async fn payments(
    State(state): State<Arc<AppState>>,
    Path(student_id): Path<i64>,
) -> Result<Json<Vec<PaymentModel>>> {
    roster::require_student(&state.database, student_id).await?;
    Ok(Json(
        ledger::payments_for_student(&state.database, student_id).await?,
    ))
}

/// `POST /students/:student_id/payments`
pub async fn record_payment(
    State(state): State<Arc<AppState>>,
    Path(student_id): Path<i64>,
    Json(input): Json<NewPayment>,
) -> Result<(StatusCode, Json<PaymentModel>)> {
    let payment = ledger::record_payment(&state.database, student_id, input).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

/// `POST /payments/:payment_id/reversal`
pub async fn reverse_payment(
    State(state): State<Arc<AppState>>,
    Path(payment_id): Path<i64>,
    body: Option<Json<ReversalRequest>>,
) -> Result<(StatusCode, Json<PaymentModel>)> {
    let reason = body.and_then(|Json(request)| request.reason);
    let reversal = ledger::reverse_payment(&state.database, payment_id, reason).await?;
    Ok((StatusCode::CREATED, Json(reversal)))
}

/// `POST /students/:student_id/fix-surplus`
pub async fn fix_surplus(
    State(state): State<Arc<AppState>>,
    Path(student_id): Path<i64>,
) -> Result<Json<SurplusCorrection>> {
    Ok(Json(
        surplus::fix_surplus_for_student(&state.database, student_id).await?,
    ))
}

/// `POST /fix-all-surplus`
pub async fn fix_all_surplus(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BatchCorrectionReport>> {
    Ok(Json(surplus::fix_all_surplus(&state.database).await?))
}
