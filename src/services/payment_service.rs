//! Payment service.
//!
//! # Atomicity Guarantees
//!
//! Paying for a reservation locks the reservation row, records the
//! payment, confirms the reservation and queues the user's notifications in
//! one transaction. A second payment for the same reservation waits on the
//! lock and then sees the completed payment.

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        notification::{NewNotification, TYPE_PAYMENT_COMPLETED, TYPE_RESERVATION_CONFIRMED},
        pagination::{Filters, Page, collect_page},
        parking_lot::RevenueReport,
        payment::{CreatePaymentRequest, Payment},
        reservation::{Reservation, STATUS_PENDING},
    },
    services::{
        notification_service,
        versioned::{BUMP_VERSION, VersionStamp, VersionedUpdate},
    },
};

/// Pay for a reservation.
///
/// # Process
///
/// 1. Lock the caller's reservation (`FOR UPDATE`)
/// 2. Reject it unless pending or confirmed and not already paid
/// 3. Insert the payment as `completed` for the reservation's total
/// 4. Move a pending reservation to `confirmed`
/// 5. Notify the user
///
/// # Errors
///
/// - `NotFound`: Reservation does not exist or belongs to someone else
/// - `Conflict`: Reservation cannot be paid in its current state
/// - `Duplicate`: `transaction_id` already used
pub async fn create(
    pool: &DbPool,
    user_id: Uuid,
    request: CreatePaymentRequest,
) -> Result<Payment, AppError> {
    let mut tx = pool.begin().await?;

    let reservation = sqlx::query_as::<_, Reservation>(
        "SELECT * FROM reservations WHERE id = $1 AND user_id = $2 FOR UPDATE",
    )
    .bind(request.reservation_id)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("reservation"))?;

    if !reservation.is_modifiable() {
        return Err(AppError::Conflict(format!(
            "reservation cannot be paid while {}",
            reservation.status
        )));
    }

    let already_paid: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM payments WHERE reservation_id = $1 AND status = 'completed')",
    )
    .bind(reservation.id)
    .fetch_one(&mut *tx)
    .await?;

    if already_paid {
        return Err(AppError::Conflict(
            "reservation has already been paid".to_string(),
        ));
    }

    let payment = sqlx::query_as::<_, Payment>(
        r#"
        INSERT INTO payments (
            reservation_id, user_id, amount_cents, currency, payment_method,
            status, transaction_id, payment_date
        )
        VALUES ($1, $2, $3, $4, $5, 'completed', $6, NOW())
        RETURNING *
        "#,
    )
    .bind(reservation.id)
    .bind(user_id)
    .bind(reservation.total_amount_cents)
    .bind(&request.currency)
    .bind(&request.payment_method)
    .bind(&request.transaction_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(AppError::from_write)?;

    let mut notices = vec![
        NewNotification::new(
            user_id,
            TYPE_PAYMENT_COMPLETED,
            "Payment received",
            format!(
                "We received your payment of {} {}",
                format_amount(payment.amount_cents),
                payment.currency
            ),
        )
        .with_data(json!({ "payment_id": payment.id, "reservation_id": reservation.id })),
    ];

    if reservation.status == STATUS_PENDING {
        let sql = format!(
            "UPDATE reservations SET status = 'confirmed', {BUMP_VERSION} WHERE id = $1"
        );
        sqlx::query(&sql).bind(reservation.id).execute(&mut *tx).await?;

        notices.push(
            NewNotification::new(
                user_id,
                TYPE_RESERVATION_CONFIRMED,
                "Reservation confirmed",
                format!(
                    "Your reservation starting {} is confirmed",
                    reservation.start_time.format("%Y-%m-%d %H:%M UTC")
                ),
            )
            .with_data(json!({ "reservation_id": reservation.id })),
        );
    }

    notification_service::insert_all(&mut *tx, &notices).await?;

    tx.commit().await?;

    tracing::info!(
        payment_id = %payment.id,
        reservation_id = %reservation.id,
        amount_cents = payment.amount_cents,
        "payment completed"
    );
    Ok(payment)
}

/// "12.50" for 1250 cents.
fn format_amount(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    format!("{sign}{}.{:02}", cents / 100, cents % 100)
}

pub async fn get(pool: &DbPool, user_id: Uuid, id: Uuid) -> Result<Payment, AppError> {
    sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("payment"))
}

pub async fn list(
    pool: &DbPool,
    user_id: Uuid,
    filters: &Filters,
) -> Result<Page<Payment>, AppError> {
    let sql = format!(
        r#"
        SELECT count(*) OVER() AS total_records, *
        FROM payments
        WHERE user_id = $1
        ORDER BY {}
        LIMIT $2 OFFSET $3
        "#,
        filters.order_by()
    );

    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(filters.limit())
        .bind(filters.offset())
        .fetch_all(pool)
        .await?;

    Ok(collect_page(rows, filters)?)
}

/// Latest payment made against one of the caller's reservations.
pub async fn for_reservation(
    pool: &DbPool,
    user_id: Uuid,
    reservation_id: Uuid,
) -> Result<Payment, AppError> {
    sqlx::query_as::<_, Payment>(
        r#"
        SELECT * FROM payments
        WHERE reservation_id = $1 AND user_id = $2
        ORDER BY payment_date DESC, id ASC
        LIMIT 1
        "#,
    )
    .bind(reservation_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("payment"))
}

pub async fn update(
    pool: &DbPool,
    payment: &Payment,
    expected_version: i32,
) -> Result<VersionStamp, AppError> {
    VersionedUpdate::table("payments")
        .set("status", payment.status.clone())
        .set("transaction_id", payment.transaction_id.clone())
        .execute(pool, payment.id, expected_version)
        .await
}

/// Completed payments for reservations at a lot, in `[from, to)`.
pub async fn revenue_for_lot(
    pool: &DbPool,
    parking_lot_id: Uuid,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<RevenueReport, AppError> {
    let (total_revenue_cents, payment_count): (i64, i64) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(payments.amount_cents), 0)::BIGINT, COUNT(payments.id)
        FROM payments
        INNER JOIN reservations ON reservations.id = payments.reservation_id
        WHERE reservations.parking_lot_id = $1
          AND payments.status = 'completed'
          AND payments.payment_date >= $2
          AND payments.payment_date < $3
        "#,
    )
    .bind(parking_lot_id)
    .bind(from)
    .bind(to)
    .fetch_one(pool)
    .await?;

    Ok(RevenueReport {
        parking_lot_id,
        from,
        to,
        total_revenue_cents,
        payment_count,
    })
}

#[cfg(test)]
mod tests {
    use super::format_amount;

    #[test]
    fn amounts_render_with_two_decimals() {
        assert_eq!(format_amount(1250), "12.50");
        assert_eq!(format_amount(7), "0.07");
        assert_eq!(format_amount(0), "0.00");
        assert_eq!(format_amount(-300), "-3.00");
    }
}
