//! Student entity - Identity and tuition track of an enrolled student.
//!
//! Balances are never stored here; they are derived from the level, the plan
//! and the payment ledger on every read.

use super::sea_orm_active_enums::PaymentType;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Student database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "students")]
pub struct Model {
    /// Unique identifier for the student
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// School registration number
    pub registration_number: String,
    /// Class the student is enrolled in
    pub class_id: i64,
    /// Tuition track
    pub payment_type: PaymentType,
    /// Explicit tuition replacing the level amount, if negotiated
    pub tuition_override: Option<i64>,
}

impl Model {
    /// Whether the student follows the assigned tuition track.
    #[must_use]
    pub fn is_assigned(&self) -> bool {
        self.payment_type == PaymentType::Assigned
    }

    /// "First Last" display name.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Defines relationships between Student and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each student belongs to one class
    #[sea_orm(
        belongs_to = "super::school_class::Entity",
        from = "Column::ClassId",
        to = "super::school_class::Column::Id"
    )]
    SchoolClass,
    /// One student has many payments
    #[sea_orm(has_many = "super::payment::Entity")]
    Payments,
}

impl Related<super::school_class::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SchoolClass.def()
    }
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
