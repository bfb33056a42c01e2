//! Level business logic - fee schedules of academic levels.
//!
//! A level holds tuition and registration fees for both tuition tracks. The
//! installment base of a track is what remains of the tuition once the registration
//! fee is paid; it is what installment plans split.

use crate::{
    config::LevelConfig,
    entities::{Level, PaymentType, level},
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, Set, prelude::*};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// Input for creating a level.
#[derive(Debug, Clone, Deserialize)]
pub struct NewLevel {
    /// Display name
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

impl From<&LevelConfig> for NewLevel {
    fn from(config: &LevelConfig) -> Self {
        Self {
            name: config.name.clone(),
            ordering: config.ordering,
            tuition_assigned: config.tuition_assigned,
            tuition_non_assigned: config.tuition_non_assigned,
            registration_fee_assigned: config.registration_fee_assigned,
            registration_fee_non_assigned: config.registration_fee_non_assigned,
        }
    }
}

/// Fees that apply to one tuition track of a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeSchedule {
    /// Yearly tuition
    pub tuition: i64,
    /// Registration fee, part of the tuition
    pub registration_fee: i64,
}

impl FeeSchedule {
    /// Amount split across installments. Zero or negative means the registration
    /// fee alone covers the level.
    #[must_use]
    pub const fn installment_base(&self) -> i64 {
        self.tuition - self.registration_fee
    }
}

/// Tuition and registration fee of `level` for the given track.
#[must_use]
pub const fn fee_schedule(level: &level::Model, payment_type: PaymentType) -> FeeSchedule {
    match payment_type {
        PaymentType::Assigned => FeeSchedule {
            tuition: level.tuition_assigned,
            registration_fee: level.registration_fee_assigned,
        },
        PaymentType::NonAssigned => FeeSchedule {
            tuition: level.tuition_non_assigned,
            registration_fee: level.registration_fee_non_assigned,
        },
    }
}

fn validate_new_level(input: &NewLevel) -> Result<()> {
    if input.name.trim().is_empty() {
        return Err(Error::validation("Level name cannot be empty"));
    }

    for amount in [
        input.tuition_assigned,
        input.tuition_non_assigned,
        input.registration_fee_assigned,
        input.registration_fee_non_assigned,
    ] {
        if amount < 0 {
            return Err(Error::InvalidAmount { amount });
        }
    }

    if input.registration_fee_assigned > input.tuition_assigned {
        return Err(Error::validation(format!(
            "assigned registration fee {} exceeds tuition {}",
            input.registration_fee_assigned, input.tuition_assigned
        )));
    }
    if input.registration_fee_non_assigned > input.tuition_non_assigned {
        return Err(Error::validation(format!(
            "non-assigned registration fee {} exceeds tuition {}",
            input.registration_fee_non_assigned, input.tuition_non_assigned
        )));
    }
    Ok(())
}

/// Creates a level after checking that amounts are non-negative and that each
/// registration fee fits inside the matching tuition.
#[instrument(skip(db))]
pub async fn create_level(db: &DatabaseConnection, input: NewLevel) -> Result<level::Model> {
    validate_new_level(&input)?;

    let level = level::ActiveModel {
        name: Set(input.name.trim().to_string()),
        ordering: Set(input.ordering),
        tuition_assigned: Set(input.tuition_assigned),
        tuition_non_assigned: Set(input.tuition_non_assigned),
        registration_fee_assigned: Set(input.registration_fee_assigned),
        registration_fee_non_assigned: Set(input.registration_fee_non_assigned),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!(level_id = level.id, name = %level.name, "Created level");
    Ok(level)
}

/// All levels in display order.
pub async fn list_levels(db: &DatabaseConnection) -> Result<Vec<level::Model>> {
    Level::find()
        .order_by_asc(level::Column::Ordering)
        .order_by_asc(level::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Finds a level by ID, returning None if it does not exist.
pub async fn get_level_by_id<C>(db: &C, level_id: i64) -> Result<Option<level::Model>>
where
    C: ConnectionTrait,
{
    Level::find_by_id(level_id).one(db).await.map_err(Into::into)
}

/// Like [`get_level_by_id`] but a missing level is a [`Error::NotFound`].
pub async fn require_level<C>(db: &C, level_id: i64) -> Result<level::Model>
where
    C: ConnectionTrait,
{
    get_level_by_id(db, level_id)
        .await?
        .ok_or_else(|| Error::not_found("Level", level_id))
}

/// Finds a level by its exact name.
pub async fn get_level_by_name(
    db: &DatabaseConnection,
    name: &str,
) -> Result<Option<level::Model>> {
    Level::find()
        .filter(level::Column::Name.eq(name))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Creates every configured level that is not in the database yet.
/// Returns the number of levels created.
pub async fn seed_levels(db: &DatabaseConnection, levels: &[LevelConfig]) -> Result<usize> {
    let mut created = 0;
    for config in levels {
        if get_level_by_name(db, config.name.trim()).await?.is_some() {
            continue;
        }
        create_level(db, NewLevel::from(config)).await?;
        created += 1;
    }
    info!("Seeded {} of {} configured levels", created, levels.len());
    Ok(created)
}
