//! Installment plan entry entity - One dated slice of a level's tuition.
//!
//! Entries are scoped to a level and a payment type. Within that scope
//! `installment_number` is 1-based and contiguous; it is the authoritative order
//! for carry-forward and surplus allocation.

use super::sea_orm_active_enums::PaymentType;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Installment plan entry database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "installment_plan_entries")]
pub struct Model {
    /// Unique identifier for the entry
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Level this entry belongs to
    pub level_id: i64,
    /// Tuition track this entry belongs to
    pub payment_type: PaymentType,
    /// Position within the level+type plan, starting at 1
    pub installment_number: i32,
    /// Amount due for this installment
    pub amount: i64,
    /// Calendar date the installment falls due
    pub due_date: Date,
    /// Share of the installment base (tuition minus registration fee), 0-100
    pub percentage: f64,
}

/// Defines relationships between `InstallmentPlanEntry` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each entry belongs to one level
    #[sea_orm(
        belongs_to = "super::level::Entity",
        from = "Column::LevelId",
        to = "super::level::Column::Id"
    )]
    Level,
}

impl Related<super::level::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Level.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
