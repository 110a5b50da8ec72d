//! Reservation service - booking, status transitions and expiry.
//!
//! # Atomicity Guarantees
//!
//! A reservation and the spot it names change together: claiming, moving
//! and releasing the spot happen in the same database transaction as the
//! reservation write. Status transitions are single conditional `UPDATE`s
//! guarded on the current status, so two concurrent cancels cannot both
//! succeed.

use chrono::Utc;
use serde_json::json;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        notification::{NewNotification, TYPE_RESERVATION_CANCELLED},
        pagination::{Filters, Page, collect_page},
        reservation::{
            self, CreateReservationRequest, MODIFIABLE_STATUSES, Reservation, STATUS_ACTIVE,
            STATUS_CONFIRMED,
        },
    },
    services::{
        notification_service, parking_spot_service, vehicle_service,
        versioned::{BUMP_VERSION, VersionedUpdate},
    },
};

/// Book a stay.
///
/// # Process
///
/// 1. Check the vehicle belongs to the caller
/// 2. Read the lot's hourly rate (lot must be active)
/// 3. Claim the named spot, if any, with a conditional update
/// 4. Insert the reservation as `pending` with the computed total
///
/// # Errors
///
/// - `NotFound`: Vehicle, lot or spot not found
/// - `Conflict`: Named spot is already reserved or occupied
pub async fn create(
    pool: &DbPool,
    user_id: Uuid,
    request: CreateReservationRequest,
) -> Result<Reservation, AppError> {
    let mut tx = pool.begin().await?;

    vehicle_service::get(&mut *tx, user_id, request.vehicle_id).await?;
    let hourly_rate_cents = active_lot_rate(&mut *tx, request.parking_lot_id).await?;

    if let Some(spot_id) = request.parking_spot_id {
        parking_spot_service::reserve(&mut *tx, spot_id, request.parking_lot_id).await?;
    }

    let total_amount_cents =
        reservation::total_cents(hourly_rate_cents, request.start_time, request.end_time);

    let reservation = sqlx::query_as::<_, Reservation>(
        r#"
        INSERT INTO reservations (
            user_id, vehicle_id, parking_lot_id, parking_spot_id,
            start_time, end_time, status, total_amount_cents
        )
        VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(request.vehicle_id)
    .bind(request.parking_lot_id)
    .bind(request.parking_spot_id)
    .bind(request.start_time)
    .bind(request.end_time)
    .bind(total_amount_cents)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        reservation_id = %reservation.id,
        total_amount_cents,
        "reservation created"
    );
    Ok(reservation)
}

async fn active_lot_rate(conn: &mut PgConnection, parking_lot_id: Uuid) -> Result<i64, AppError> {
    sqlx::query_scalar("SELECT hourly_rate_cents FROM parking_lots WHERE id = $1 AND is_active")
        .bind(parking_lot_id)
        .fetch_optional(conn)
        .await?
        .ok_or(AppError::NotFound("parking lot"))
}

/// The caller's reservations, optionally restricted to one status.
pub async fn list(
    pool: &DbPool,
    user_id: Uuid,
    status: Option<&str>,
    filters: &Filters,
) -> Result<Page<Reservation>, AppError> {
    let sql = format!(
        r#"
        SELECT count(*) OVER() AS total_records, *
        FROM reservations
        WHERE user_id = $1 AND ($2::TEXT IS NULL OR status = $2)
        ORDER BY {}
        LIMIT $3 OFFSET $4
        "#,
        filters.order_by()
    );

    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(status)
        .bind(filters.limit())
        .bind(filters.offset())
        .fetch_all(pool)
        .await?;

    Ok(collect_page(rows, filters)?)
}

/// Confirmed or in-progress reservations at a lot, for its owner.
pub async fn list_active_for_lot(
    pool: &DbPool,
    parking_lot_id: Uuid,
    filters: &Filters,
) -> Result<Page<Reservation>, AppError> {
    let sql = format!(
        r#"
        SELECT count(*) OVER() AS total_records, *
        FROM reservations
        WHERE parking_lot_id = $1 AND status = ANY($2)
        ORDER BY {}
        LIMIT $3 OFFSET $4
        "#,
        filters.order_by()
    );

    let rows = sqlx::query(&sql)
        .bind(parking_lot_id)
        .bind([STATUS_CONFIRMED, STATUS_ACTIVE].as_slice())
        .bind(filters.limit())
        .bind(filters.offset())
        .fetch_all(pool)
        .await?;

    Ok(collect_page(rows, filters)?)
}

pub async fn get(pool: &DbPool, user_id: Uuid, id: Uuid) -> Result<Reservation, AppError> {
    sqlx::query_as::<_, Reservation>("SELECT * FROM reservations WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("reservation"))
}

/// Write back a patched reservation.
///
/// `current` is the row the patch was applied to. When the spot changes,
/// the old one is released and the new one claimed in the same
/// transaction as the versioned write; the total is recomputed from the
/// lot's current hourly rate.
///
/// # Errors
///
/// - `Conflict`: Reservation is no longer pending/confirmed, or the new spot is taken
/// - `EditConflict`: `expected_version` is stale
pub async fn update(
    pool: &DbPool,
    current: &Reservation,
    updated: &Reservation,
    expected_version: i32,
) -> Result<Reservation, AppError> {
    if !current.is_modifiable() {
        return Err(AppError::Conflict(format!(
            "reservation cannot be modified while {}",
            current.status
        )));
    }

    let mut tx = pool.begin().await?;

    if current.parking_spot_id != updated.parking_spot_id {
        if let Some(old_spot) = current.parking_spot_id {
            parking_spot_service::release(&mut *tx, old_spot).await?;
        }
        if let Some(new_spot) = updated.parking_spot_id {
            parking_spot_service::reserve(&mut *tx, new_spot, current.parking_lot_id).await?;
        }
    }

    let hourly_rate_cents: i64 =
        sqlx::query_scalar("SELECT hourly_rate_cents FROM parking_lots WHERE id = $1")
            .bind(current.parking_lot_id)
            .fetch_one(&mut *tx)
            .await?;
    let total_amount_cents =
        reservation::total_cents(hourly_rate_cents, updated.start_time, updated.end_time);

    let stamp = VersionedUpdate::table("reservations")
        .set("start_time", updated.start_time)
        .set("end_time", updated.end_time)
        .set("parking_spot_id", updated.parking_spot_id)
        .set("total_amount_cents", total_amount_cents)
        .execute(&mut *tx, current.id, expected_version)
        .await?;

    tx.commit().await?;

    Ok(Reservation {
        total_amount_cents,
        version: stamp.version,
        updated_at: stamp.updated_at,
        ..updated.clone()
    })
}

/// pending | confirmed → cancelled. Releases the spot and notifies the user.
pub async fn cancel(pool: &DbPool, user_id: Uuid, id: Uuid) -> Result<Reservation, AppError> {
    let mut tx = pool.begin().await?;

    let reservation = transition(
        &mut *tx,
        user_id,
        id,
        MODIFIABLE_STATUSES,
        "status = 'cancelled'",
        "cancelled",
    )
    .await?;

    if let Some(spot_id) = reservation.parking_spot_id {
        parking_spot_service::release(&mut *tx, spot_id).await?;
    }

    notification_service::insert(
        &mut *tx,
        &NewNotification::new(
            user_id,
            TYPE_RESERVATION_CANCELLED,
            "Reservation cancelled",
            format!(
                "Your reservation starting {} has been cancelled",
                reservation.start_time.format("%Y-%m-%d %H:%M UTC")
            ),
        )
        .with_data(json!({ "reservation_id": reservation.id })),
    )
    .await?;

    tx.commit().await?;

    tracing::info!(reservation_id = %id, "reservation cancelled");
    Ok(reservation)
}

/// confirmed → active, stamping `actual_start_time`.
pub async fn check_in(pool: &DbPool, user_id: Uuid, id: Uuid) -> Result<Reservation, AppError> {
    let mut conn = pool.acquire().await?;

    transition(
        &mut *conn,
        user_id,
        id,
        &[STATUS_CONFIRMED],
        "status = 'active', actual_start_time = NOW()",
        "checked in",
    )
    .await
}

/// active → completed, stamping `actual_end_time` and freeing the spot.
pub async fn check_out(pool: &DbPool, user_id: Uuid, id: Uuid) -> Result<Reservation, AppError> {
    let mut tx = pool.begin().await?;

    let reservation = transition(
        &mut *tx,
        user_id,
        id,
        &[STATUS_ACTIVE],
        "status = 'completed', actual_end_time = NOW()",
        "checked out",
    )
    .await?;

    if let Some(spot_id) = reservation.parking_spot_id {
        parking_spot_service::vacate(&mut *tx, spot_id).await?;
    }

    tx.commit().await?;

    Ok(reservation)
}

/// Expire confirmed reservations whose end time has passed and release
/// their spots. Returns how many reservations expired.
pub async fn expire_overdue(pool: &DbPool) -> Result<u64, AppError> {
    let mut tx = pool.begin().await?;

    let sql = format!(
        r#"
        UPDATE reservations SET status = 'expired', {BUMP_VERSION}
        WHERE status = 'confirmed' AND end_time < $1
        RETURNING parking_spot_id
        "#
    );
    let spots: Vec<Option<Uuid>> = sqlx::query_scalar(&sql)
        .bind(Utc::now())
        .fetch_all(&mut *tx)
        .await?;

    let expired = spots.len() as u64;
    let spot_ids: Vec<Uuid> = spots.into_iter().flatten().collect();
    parking_spot_service::release_all(&mut *tx, &spot_ids).await?;

    tx.commit().await?;

    Ok(expired)
}

/// Move a reservation owned by `user_id` out of one of `from` by applying
/// `set` (a constant SQL fragment).
///
/// # Errors
///
/// - `NotFound`: No such reservation for this user
/// - `Conflict`: Reservation is not in any of the `from` statuses
async fn transition(
    conn: &mut PgConnection,
    user_id: Uuid,
    id: Uuid,
    from: &[&str],
    set: &'static str,
    action: &str,
) -> Result<Reservation, AppError> {
    let sql = format!(
        r#"
        UPDATE reservations SET {set}, {BUMP_VERSION}
        WHERE id = $1 AND user_id = $2 AND status = ANY($3)
        RETURNING *
        "#
    );
    let updated = sqlx::query_as::<_, Reservation>(&sql)
        .bind(id)
        .bind(user_id)
        .bind(from)
        .fetch_optional(&mut *conn)
        .await?;

    if let Some(reservation) = updated {
        return Ok(reservation);
    }

    let status: Option<String> =
        sqlx::query_scalar("SELECT status FROM reservations WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(conn)
            .await?;

    match status {
        Some(status) => Err(AppError::Conflict(format!(
            "reservation cannot be {action} while {status}"
        ))),
        None => Err(AppError::NotFound("reservation")),
    }
}
