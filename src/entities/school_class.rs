//! School class entity - A group of students of one level in one school year.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// School class database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "school_classes")]
pub struct Model {
    /// Unique identifier for the class
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name (e.g. "5ème A")
    pub name: String,
    /// Level whose fee schedule applies to the class
    pub level_id: i64,
    /// School year label, e.g. `"2025-2026"`
    pub school_year: String,
}

/// Defines relationships between `SchoolClass` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each class belongs to one level
    #[sea_orm(
        belongs_to = "super::level::Entity",
        from = "Column::LevelId",
        to = "super::level::Column::Id"
    )]
    Level,
    /// One class has many students
    #[sea_orm(has_many = "super::student::Entity")]
    Students,
}

impl Related<super::level::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Level.def()
    }
}

impl Related<super::student::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Students.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
