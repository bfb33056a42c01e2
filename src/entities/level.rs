//! Level entity - An academic grade tier with its own fee schedule.
//!
//! Each level carries tuition and registration fees for both tuition tracks
//! (assigned and non-assigned). Amounts are whole currency units.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Level database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "levels")]
pub struct Model {
    /// Unique identifier for the level
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name (e.g. "5ème")
    pub name: String,
    /// Position of the level in listings
    pub ordering: i32,
    /// Yearly tuition for assigned students
    pub tuition_assigned: i64,
    /// Yearly tuition for non-assigned students
    pub tuition_non_assigned: i64,
    /// Registration fee for assigned students
    pub registration_fee_assigned: i64,
    /// Registration fee for non-assigned students
    pub registration_fee_non_assigned: i64,
}

/// Defines relationships between Level and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One level has many plan entries
    #[sea_orm(has_many = "super::installment_plan_entry::Entity")]
    InstallmentPlanEntries,
    /// One level has many classes
    #[sea_orm(has_many = "super::school_class::Entity")]
    SchoolClasses,
}

impl Related<super::installment_plan_entry::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InstallmentPlanEntries.def()
    }
}

impl Related<super::school_class::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SchoolClasses.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
