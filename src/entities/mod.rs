//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the persisted records: levels, plan entries, classes,
//! students and the payment ledger. Everything else (student accounts, installment
//! balances, arrears) is derived from them on read.

pub mod installment_plan_entry;
pub mod level;
pub mod payment;
pub mod school_class;
pub mod sea_orm_active_enums;
pub mod student;

// Re-export specific types to avoid conflicts
pub use installment_plan_entry::{
    Column as InstallmentPlanEntryColumn, Entity as InstallmentPlanEntry,
    Model as InstallmentPlanEntryModel,
};
pub use level::{Column as LevelColumn, Entity as Level, Model as LevelModel};
pub use payment::{Column as PaymentColumn, Entity as Payment, Model as PaymentModel};
pub use school_class::{
    Column as SchoolClassColumn, Entity as SchoolClass, Model as SchoolClassModel,
};
pub use sea_orm_active_enums::{PaymentCategory, PaymentType};
pub use student::{Column as StudentColumn, Entity as Student, Model as StudentModel};
