//! Payment entity - Append-only ledger of money received from students.
//!
//! Amounts are always positive. A correction is a new row whose
//! `reverses_payment_id` points at the original; its effective amount is negative.
//! `installment_number` is set only for rows in the installment category.

use super::sea_orm_active_enums::PaymentCategory;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Payment database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    /// Unique identifier for the payment
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Student who paid
    pub student_id: i64,
    /// Amount received, always positive
    pub amount: i64,
    /// Calendar date the money was received
    pub payment_date: Date,
    /// Free-form payment method (`"cash"`, `"transfer"`, ...)
    pub method: String,
    /// Bucket the payment is booked against
    pub category: PaymentCategory,
    /// Target installment when `category` is installment
    pub installment_number: Option<i32>,
    /// Client-generated key used to deduplicate retried submissions
    #[sea_orm(unique)]
    pub idempotency_key: Option<String>,
    /// Original payment this row compensates, if it is a reversal
    pub reverses_payment_id: Option<i64>,
    /// When the row was recorded
    pub created_at: DateTimeUtc,
}

impl Model {
    /// Signed contribution of this row: reversals count negatively.
    #[must_use]
    pub const fn effective_amount(&self) -> i64 {
        if self.reverses_payment_id.is_some() {
            -self.amount
        } else {
            self.amount
        }
    }
}

/// Defines relationships between Payment and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each payment belongs to one student
    #[sea_orm(
        belongs_to = "super::student::Entity",
        from = "Column::StudentId",
        to = "super::student::Column::Id"
    )]
    Student,
}

impl Related<super::student::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Student.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
