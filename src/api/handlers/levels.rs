//! Level and installment plan handlers.

use super::today;
use crate::{
    api::AppState,
    core::{
        level::{self, NewLevel},
        plan::{self, LevelInstallments, NewPlanEntry, PlanEntryUpdate},
    },
    entities::{InstallmentPlanEntryModel, LevelModel, PaymentType},
    errors::Result,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use std::sync::Arc;

/// Body naming one of a level's two plans.
#[derive(Debug, Deserialize)]
pub struct PlanSelector {
    /// Plan to act on
    pub payment_type: PaymentType,
}

/// `GET /levels`
pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<LevelModel>>> {
    Ok(Json(level::list_levels(&state.database).await?))
}

/// `POST /levels`
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(input): Json<NewLevel>,
) -> Result<(StatusCode, Json<LevelModel>)> {
    let level = level::create_level(&state.database, input).await?;
    Ok((StatusCode::CREATED, Json(level)))
}

/// `GET /levels/:level_id/installments`
pub async fn installments(
    State(state): State<Arc<AppState>>,
    Path(level_id): Path<i64>,
) -> Result<Json<LevelInstallments>> {
    Ok(Json(
        plan::list_level_installments(&state.database, level_id).await?,
    ))
}

/// `POST /levels/:level_id/installments`
pub async fn add_installment(
    State(state): State<Arc<AppState>>,
    Path(level_id): Path<i64>,
    Json(input): Json<NewPlanEntry>,
) -> Result<(StatusCode, Json<InstallmentPlanEntryModel>)> {
    let entry = plan::add_entry(&state.database, &state.locks, level_id, input).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// `POST /levels/:level_id/installments/default`
pub async fn default_installments(
    State(state): State<Arc<AppState>>,
    Path(level_id): Path<i64>,
    Json(selector): Json<PlanSelector>,
) -> Result<Json<Vec<InstallmentPlanEntryModel>>> {
    let entries = plan::create_default_plan(
        &state.database,
        &state.locks,
        level_id,
        selector.payment_type,
        &state.config.calendar,
        &state.config.default_plan,
        today(),
    )
    .await?;
    Ok(Json(entries))
}

/// `POST /levels/:level_id/installments/recalculate`
pub async fn recalculate(
    State(state): State<Arc<AppState>>,
    Path(level_id): Path<i64>,
    Json(selector): Json<PlanSelector>,
) -> Result<Json<Vec<InstallmentPlanEntryModel>>> {
    let entries = plan::recalculate_percentages(
        &state.database,
        &state.locks,
        level_id,
        selector.payment_type,
    )
    .await?;
    Ok(Json(entries))
}

/// `PATCH /installments/:entry_id`
pub async fn update_installment(
    State(state): State<Arc<AppState>>,
    Path(entry_id): Path<i64>,
    Json(update): Json<PlanEntryUpdate>,
) -> Result<Json<InstallmentPlanEntryModel>> {
    let entry = plan::update_entry(&state.database, &state.locks, entry_id, update).await?;
    Ok(Json(entry))
}

/// `DELETE /installments/:entry_id`
pub async fn remove_installment(
    State(state): State<Arc<AppState>>,
    Path(entry_id): Path<i64>,
) -> Result<StatusCode> {
    plan::remove_entry(&state.database, &state.locks, entry_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
