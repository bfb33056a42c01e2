//! `tuition-ledger` - tuition installments, surplus reconciliation and arrears
//!
//! This crate tracks what each student owes for the school year, splits it into dated
//! installments per level, reconciles payments (including surplus paid with the
//! initial fees) against those installments, and reports arrears by class, level or
//! school through an HTTP API.

#![deny(
    unsafe_code,
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::private_intra_doc_links,
)]
#![warn(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    // Money and ledger code must not panic or compare floats loosely
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::float_cmp,
    clippy::dbg_macro,
    clippy::todo,
    clippy::clone_on_ref_ptr,
    future_incompatible,
    rust_2018_idioms,
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

/// HTTP interface - router, handlers and shared state
pub mod api;
/// Configuration management for database and application settings
pub mod config;
/// Core business logic - plans, payments, surplus, schedules and arrears
pub mod core;
/// SeaORM entity definitions for database tables
pub mod entities;
/// Unified error types and result handling
pub mod errors;

#[cfg(test)]
pub mod test_utils;
