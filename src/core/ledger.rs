//! Payment ledger - append-only record of money received from students.
//!
//! Rows are never edited or deleted. A mistake is corrected with a reversal: a new
//! row pointing at the original whose effective amount is negative. Clients may send
//! an idempotency key so a retried submission returns the row already recorded
//! instead of booking the money twice.

use crate::{
    core::{
        format::parse_due_date,
        plan::plan_entries,
        roster::{require_class, require_student},
    },
    entities::{Payment, PaymentCategory, payment},
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{info, instrument, warn};

/// Input for recording a payment.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPayment {
    /// Amount received, strictly positive
    pub amount: i64,
    /// Date the money was received
    pub payment_date: String,
    /// Payment method label
    pub method: String,
    /// Bucket to book against
    pub category: PaymentCategory,
    /// Target installment, required for the installment category
    #[serde(default)]
    pub installment_number: Option<i32>,
    /// Client-generated deduplication key
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

fn same_submission(existing: &payment::Model, student_id: i64, input: &NewPayment) -> bool {
    existing.student_id == student_id
        && existing.amount == input.amount
        && existing.category == input.category
        && existing.installment_number == input.installment_number
}

async fn find_by_idempotency_key<C>(db: &C, key: &str) -> Result<Option<payment::Model>>
where
    C: ConnectionTrait,
{
    Payment::find()
        .filter(payment::Column::IdempotencyKey.eq(key))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Records a payment for a student.
///
/// Installment payments must name an installment that exists in the student's plan;
/// initial-bucket payments must not name one. Legacy surplus transfers cannot be
/// recorded directly. A repeated idempotency key returns the original row when the
/// payload matches and is rejected otherwise.
#[instrument(skip(db))]
pub async fn record_payment(
    db: &DatabaseConnection,
    student_id: i64,
    input: NewPayment,
) -> Result<payment::Model> {
    if input.amount <= 0 {
        return Err(Error::InvalidAmount {
            amount: input.amount,
        });
    }
    let payment_date = parse_due_date(&input.payment_date)?;
    match (input.category, input.installment_number) {
        (PaymentCategory::SurplusTransfer, _) => {
            return Err(Error::validation(
                "surplus transfers are derived and cannot be recorded",
            ));
        }
        (PaymentCategory::Installment, None) => {
            return Err(Error::validation(
                "installment payments require an installment number",
            ));
        }
        (category, Some(_)) if category.is_initial() => {
            return Err(Error::validation(
                "initial fee payments cannot target an installment",
            ));
        }
        _ => {}
    }
    let key = input
        .idempotency_key
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(ToString::to_string);

    let txn = db.begin().await?;

    if let Some(existing) = match &key {
        Some(key) => find_by_idempotency_key(&txn, key).await?,
        None => None,
    } {
        if same_submission(&existing, student_id, &input) {
            info!(payment_id = existing.id, "Duplicate submission, returning recorded payment");
            return Ok(existing);
        }
        return Err(Error::validation(
            "idempotency key already used for a different payment",
        ));
    }

    let student = require_student(&txn, student_id).await?;
    if let Some(number) = input.installment_number {
        let class = require_class(&txn, student.class_id).await?;
        let plan = plan_entries(&txn, class.level_id, student.payment_type).await?;
        if !plan.iter().any(|entry| entry.installment_number == number) {
            return Err(Error::validation(format!(
                "installment {number} does not exist in the student's plan"
            )));
        }
    }

    let recorded = payment::ActiveModel {
        student_id: Set(student_id),
        amount: Set(input.amount),
        payment_date: Set(payment_date),
        method: Set(input.method.trim().to_string()),
        category: Set(input.category),
        installment_number: Set(input.installment_number),
        idempotency_key: Set(key),
        reverses_payment_id: Set(None),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;
    info!(
        payment_id = recorded.id,
        student_id,
        amount = recorded.amount,
        category = ?recorded.category,
        "Recorded payment"
    );
    Ok(recorded)
}

/// Records a compensating entry cancelling `payment_id`.
///
/// The reversal copies the original's bucket so every derived total nets to zero.
/// Reversals cannot themselves be reversed, and a payment is reversed at most once.
#[instrument(skip(db))]
pub async fn reverse_payment(
    db: &DatabaseConnection,
    payment_id: i64,
    reason: Option<String>,
) -> Result<payment::Model> {
    let txn = db.begin().await?;

    let original = Payment::find_by_id(payment_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("Payment", payment_id))?;
    if original.reverses_payment_id.is_some() {
        return Err(Error::validation("a reversal cannot be reversed"));
    }
    let already_reversed = Payment::find()
        .filter(payment::Column::ReversesPaymentId.eq(payment_id))
        .one(&txn)
        .await?;
    if already_reversed.is_some() {
        return Err(Error::validation(format!(
            "payment {payment_id} is already reversed"
        )));
    }

    let now = chrono::Utc::now();
    let method = reason.map_or_else(
        || format!("reversal of {}", original.method),
        |reason| format!("reversal: {}", reason.trim()),
    );
    let reversal = payment::ActiveModel {
        student_id: Set(original.student_id),
        amount: Set(original.amount),
        payment_date: Set(now.date_naive()),
        method: Set(method),
        category: Set(original.category),
        installment_number: Set(original.installment_number),
        idempotency_key: Set(None),
        reverses_payment_id: Set(Some(original.id)),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;
    warn!(
        payment_id,
        reversal_id = reversal.id,
        student_id = reversal.student_id,
        amount = reversal.amount,
        "Payment reversed"
    );
    Ok(reversal)
}

/// A student's payments in the order they were received.
pub async fn payments_for_student<C>(db: &C, student_id: i64) -> Result<Vec<payment::Model>>
where
    C: ConnectionTrait,
{
    Payment::find()
        .filter(payment::Column::StudentId.eq(student_id))
        .order_by_asc(payment::Column::PaymentDate)
        .order_by_asc(payment::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Payments of several students, grouped by student ID.
pub async fn payments_for_students(
    db: &DatabaseConnection,
    student_ids: &[i64],
) -> Result<HashMap<i64, Vec<payment::Model>>> {
    let mut grouped: HashMap<i64, Vec<payment::Model>> = HashMap::new();
    if student_ids.is_empty() {
        return Ok(grouped);
    }

    let payments = Payment::find()
        .filter(payment::Column::StudentId.is_in(student_ids.to_vec()))
        .order_by_asc(payment::Column::PaymentDate)
        .order_by_asc(payment::Column::Id)
        .all(db)
        .await?;
    for payment in payments {
        grouped.entry(payment.student_id).or_default().push(payment);
    }
    Ok(grouped)
}
