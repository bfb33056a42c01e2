//! String-backed enums shared by several entities.

use sea_orm::entity::prelude::*;
use sea_orm::sea_query::StringLen;
use serde::{Deserialize, Serialize};

/// Tuition track of a student. Each level carries independent fees and an
/// independent installment plan for both tracks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    /// Student with an assigned classroom placement
    #[sea_orm(string_value = "assigned")]
    Assigned,
    /// Student without an assigned placement
    #[sea_orm(string_value = "non_assigned")]
    NonAssigned,
}

impl PaymentType {
    /// Stable lowercase label, identical to the stored value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Assigned => "assigned",
            Self::NonAssigned => "non_assigned",
        }
    }
}

impl std::fmt::Display for PaymentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bucket a payment is booked against.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum PaymentCategory {
    /// Registration fee (initial bucket)
    #[sea_orm(string_value = "registration")]
    Registration,
    /// Registration finalization (initial bucket)
    #[sea_orm(string_value = "finalization")]
    Finalization,
    /// Re-enrollment of a returning student (initial bucket)
    #[sea_orm(string_value = "re_enrollment")]
    ReEnrollment,
    /// Payment against a numbered installment
    #[sea_orm(string_value = "installment")]
    Installment,
    /// Legacy row that persisted an already-derived surplus allocation.
    /// Kept for audit, ignored by every computation.
    #[sea_orm(string_value = "surplus_transfer")]
    SurplusTransfer,
}

impl PaymentCategory {
    /// Registration, finalization and re-enrollment form the initial bucket.
    #[must_use]
    pub const fn is_initial(self) -> bool {
        matches!(
            self,
            Self::Registration | Self::Finalization | Self::ReEnrollment
        )
    }
}
