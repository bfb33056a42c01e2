//! Roster business logic - classes and the students enrolled in them.
//!
//! The roster is the input side of every derivation: a student's class ties them to a
//! level, and the level to a fee schedule and installment plan.

use crate::{
    core::level::require_level,
    entities::{PaymentType, SchoolClass, Student, school_class, student},
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, Set, prelude::*};
use serde::Deserialize;
use tracing::info;

/// Input for creating a class.
#[derive(Debug, Clone, Deserialize)]
pub struct NewClass {
    /// Display name
    pub name: String,
    /// Level of the class
    pub level_id: i64,
    /// School year label
    pub school_year: String,
}

/// Input for enrolling a student.
#[derive(Debug, Clone, Deserialize)]
pub struct NewStudent {
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// School registration number
    pub registration_number: String,
    /// Class to enroll into
    pub class_id: i64,
    /// Tuition track
    pub payment_type: PaymentType,
    /// Negotiated tuition replacing the level amount
    #[serde(default)]
    pub tuition_override: Option<i64>,
}

/// Which part of the school a query covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// A single class
    Class(i64),
    /// Every class of a level
    Level(i64),
    /// The whole school
    School,
}

/// Creates a class attached to an existing level.
pub async fn create_class(
    db: &DatabaseConnection,
    input: NewClass,
) -> Result<school_class::Model> {
    if input.name.trim().is_empty() {
        return Err(Error::validation("Class name cannot be empty"));
    }
    if input.school_year.trim().is_empty() {
        return Err(Error::validation("School year cannot be empty"));
    }
    require_level(db, input.level_id).await?;

    let class = school_class::ActiveModel {
        name: Set(input.name.trim().to_string()),
        level_id: Set(input.level_id),
        school_year: Set(input.school_year.trim().to_string()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!(class_id = class.id, level_id = class.level_id, "Created class");
    Ok(class)
}

/// Finds a class by ID or fails with [`Error::NotFound`].
pub async fn require_class<C>(db: &C, class_id: i64) -> Result<school_class::Model>
where
    C: ConnectionTrait,
{
    SchoolClass::find_by_id(class_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Class", class_id))
}

/// Enrolls a student in an existing class.
pub async fn create_student(
    db: &DatabaseConnection,
    input: NewStudent,
) -> Result<student::Model> {
    if input.first_name.trim().is_empty() || input.last_name.trim().is_empty() {
        return Err(Error::validation("Student names cannot be empty"));
    }
    if let Some(amount) = input.tuition_override.filter(|amount| *amount < 0) {
        return Err(Error::InvalidAmount { amount });
    }
    require_class(db, input.class_id).await?;

    let student = student::ActiveModel {
        first_name: Set(input.first_name.trim().to_string()),
        last_name: Set(input.last_name.trim().to_string()),
        registration_number: Set(input.registration_number.trim().to_string()),
        class_id: Set(input.class_id),
        payment_type: Set(input.payment_type),
        tuition_override: Set(input.tuition_override),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!(student_id = student.id, class_id = student.class_id, "Enrolled student");
    Ok(student)
}

/// Finds a student by ID or fails with [`Error::NotFound`].
pub async fn require_student<C>(db: &C, student_id: i64) -> Result<student::Model>
where
    C: ConnectionTrait,
{
    Student::find_by_id(student_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Student", student_id))
}

/// Every student in the school, ordered by ID.
pub async fn list_all_students(db: &DatabaseConnection) -> Result<Vec<student::Model>> {
    Student::find()
        .order_by_asc(student::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Classes covered by `scope`, optionally restricted to one school year.
///
/// Fails with [`Error::NotFound`] when the scope names a class or level that does
/// not exist.
pub async fn classes_in_scope(
    db: &DatabaseConnection,
    scope: Scope,
    school_year: Option<&str>,
) -> Result<Vec<school_class::Model>> {
    let mut query = SchoolClass::find();
    match scope {
        Scope::Class(class_id) => {
            require_class(db, class_id).await?;
            query = query.filter(school_class::Column::Id.eq(class_id));
        }
        Scope::Level(level_id) => {
            require_level(db, level_id).await?;
            query = query.filter(school_class::Column::LevelId.eq(level_id));
        }
        Scope::School => {}
    }
    if let Some(year) = school_year {
        query = query.filter(school_class::Column::SchoolYear.eq(year));
    }

    query
        .order_by_asc(school_class::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Students enrolled in `classes`, ordered by family then given name.
pub async fn students_in_classes(
    db: &DatabaseConnection,
    classes: &[school_class::Model],
) -> Result<Vec<student::Model>> {
    if classes.is_empty() {
        return Ok(Vec::new());
    }
    let class_ids: Vec<i64> = classes.iter().map(|class| class.id).collect();

    Student::find()
        .filter(student::Column::ClassId.is_in(class_ids))
        .order_by_asc(student::Column::LastName)
        .order_by_asc(student::Column::FirstName)
        .all(db)
        .await
        .map_err(Into::into)
}
