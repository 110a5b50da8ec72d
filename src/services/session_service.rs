//! Parking session service - check-in, check-out, violations.

use chrono::Utc;
use serde_json::json;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        notification::{NewNotification, TYPE_VIOLATION_ALERT},
        pagination::{Filters, Page, collect_page},
        parking_session::{
            CreateSessionRequest, ParkingSession, STATUS_ACTIVE, STATUS_COMPLETED, STATUS_VIOLATED,
        },
        reservation::{self, Reservation, STATUS_CONFIRMED},
    },
    services::{
        notification_service, parking_spot_service, vehicle_service,
        versioned::{BUMP_VERSION, VersionedUpdate},
    },
};

/// Start a session on a spot.
///
/// # Process
///
/// 1. Check the vehicle (and reservation, if given) belong to the caller;
///    a reservation must still be pending or confirmed
/// 2. Occupy the spot with a conditional update; a spot reserved by the
///    given reservation may be occupied, any other reserved spot may not
/// 3. Insert the session and move a confirmed reservation to `active`
///
/// # Errors
///
/// - `NotFound`: Vehicle, reservation or spot not found
/// - `Conflict`: Spot already occupied or reserved for someone else, or the
///   reservation was cancelled, completed or expired
pub async fn create(
    pool: &DbPool,
    user_id: Uuid,
    request: CreateSessionRequest,
) -> Result<ParkingSession, AppError> {
    let mut tx = pool.begin().await?;

    vehicle_service::get(&mut *tx, user_id, request.vehicle_id).await?;

    let reservation = match request.reservation_id {
        Some(reservation_id) => Some(
            sqlx::query_as::<_, Reservation>(
                "SELECT * FROM reservations WHERE id = $1 AND user_id = $2 FOR UPDATE",
            )
            .bind(reservation_id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AppError::NotFound("reservation"))?,
        ),
        None => None,
    };

    if let Some(reservation) = reservation.as_ref().filter(|r| !r.is_modifiable()) {
        return Err(AppError::Conflict(format!(
            "reservation cannot start a session while {}",
            reservation.status
        )));
    }

    let holds_reservation = reservation
        .as_ref()
        .is_some_and(|r| r.parking_spot_id == Some(request.parking_spot_id));
    parking_spot_service::occupy(&mut *tx, request.parking_spot_id, holds_reservation).await?;

    let session = sqlx::query_as::<_, ParkingSession>(
        r#"
        INSERT INTO parking_sessions (reservation_id, user_id, vehicle_id, parking_spot_id, check_in_time, status)
        VALUES ($1, $2, $3, $4, NOW(), 'active')
        RETURNING *
        "#,
    )
    .bind(request.reservation_id)
    .bind(user_id)
    .bind(request.vehicle_id)
    .bind(request.parking_spot_id)
    .fetch_one(&mut *tx)
    .await?;

    if let Some(reservation) = reservation.filter(|r| r.status == STATUS_CONFIRMED) {
        let sql = format!(
            r#"
            UPDATE reservations SET status = 'active', actual_start_time = NOW(), {BUMP_VERSION}
            WHERE id = $1 AND status = 'confirmed'
            "#
        );
        sqlx::query(&sql).bind(reservation.id).execute(&mut *tx).await?;
    }

    tx.commit().await?;

    tracing::info!(session_id = %session.id, spot_id = %session.parking_spot_id, "session started");
    Ok(session)
}

pub async fn list(
    pool: &DbPool,
    user_id: Uuid,
    filters: &Filters,
) -> Result<Page<ParkingSession>, AppError> {
    let sql = format!(
        r#"
        SELECT count(*) OVER() AS total_records, *
        FROM parking_sessions
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

pub async fn list_active(pool: &DbPool, user_id: Uuid) -> Result<Vec<ParkingSession>, AppError> {
    let sessions = sqlx::query_as::<_, ParkingSession>(
        r#"
        SELECT * FROM parking_sessions
        WHERE user_id = $1 AND status = 'active'
        ORDER BY check_in_time DESC, id ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(sessions)
}

/// Sessions on any spot of a lot, for its owner.
pub async fn list_for_lot(
    pool: &DbPool,
    parking_lot_id: Uuid,
    filters: &Filters,
) -> Result<Page<ParkingSession>, AppError> {
    let sql = format!(
        r#"
        SELECT count(*) OVER() AS total_records, *
        FROM parking_sessions
        WHERE parking_spot_id IN (SELECT id FROM parking_spots WHERE parking_lot_id = $1)
        ORDER BY {}
        LIMIT $2 OFFSET $3
        "#,
        filters.order_by()
    );

    let rows = sqlx::query(&sql)
        .bind(parking_lot_id)
        .bind(filters.limit())
        .bind(filters.offset())
        .fetch_all(pool)
        .await?;

    Ok(collect_page(rows, filters)?)
}

pub async fn get(pool: &DbPool, user_id: Uuid, id: Uuid) -> Result<ParkingSession, AppError> {
    sqlx::query_as::<_, ParkingSession>(
        "SELECT * FROM parking_sessions WHERE id = $1 AND user_id = $2",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("parking session"))
}

/// Correct the check-out time of a completed session and bill it again.
///
/// # Errors
///
/// - `Conflict`: Session is still active or marked as a violation
/// - `EditConflict`: `expected_version` is stale
pub async fn update(
    pool: &DbPool,
    session: &ParkingSession,
    expected_version: i32,
) -> Result<ParkingSession, AppError> {
    if session.status != STATUS_COMPLETED {
        return Err(AppError::Conflict(format!(
            "parking session cannot be corrected while {}; check it out instead",
            session.status
        )));
    }
    let check_out_time = session
        .check_out_time
        .ok_or_else(|| anyhow::anyhow!("completed session {} has no check-out time", session.id))?;

    let mut tx = pool.begin().await?;

    let hourly_rate_cents = hourly_rate_for_spot(&mut tx, session.parking_spot_id).await?;
    let minutes = reservation::billable_minutes(session.check_in_time, check_out_time);
    let amount = reservation::total_cents(hourly_rate_cents, session.check_in_time, check_out_time);
    let minutes = i32::try_from(minutes).unwrap_or(i32::MAX);

    let stamp = VersionedUpdate::table("parking_sessions")
        .set("check_out_time", check_out_time)
        .set("total_duration_minutes", minutes)
        .set("total_amount_cents", amount)
        .execute(&mut *tx, session.id, expected_version)
        .await?;

    tx.commit().await?;

    Ok(ParkingSession {
        total_duration_minutes: Some(minutes),
        total_amount_cents: Some(amount),
        version: stamp.version,
        updated_at: stamp.updated_at,
        ..session.clone()
    })
}

async fn hourly_rate_for_spot(conn: &mut PgConnection, spot_id: Uuid) -> Result<i64, AppError> {
    let rate = sqlx::query_scalar(
        r#"
        SELECT parking_lots.hourly_rate_cents
        FROM parking_spots
        INNER JOIN parking_lots ON parking_lots.id = parking_spots.parking_lot_id
        WHERE parking_spots.id = $1
        "#,
    )
    .bind(spot_id)
    .fetch_one(conn)
    .await?;

    Ok(rate)
}

/// End a session and bill it.
///
/// Duration is whole minutes rounded up; the amount is the lot's hourly
/// rate times whole hours rounded up. The spot is freed and a linked
/// active reservation completes.
///
/// # Errors
///
/// - `NotFound`: No such session for this user
/// - `Conflict`: Session already completed
pub async fn check_out(pool: &DbPool, user_id: Uuid, id: Uuid) -> Result<ParkingSession, AppError> {
    let mut tx = pool.begin().await?;

    let session = sqlx::query_as::<_, ParkingSession>(
        "SELECT * FROM parking_sessions WHERE id = $1 AND user_id = $2 FOR UPDATE",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("parking session"))?;

    if session.status != STATUS_ACTIVE && session.status != STATUS_VIOLATED {
        return Err(AppError::Conflict(format!(
            "parking session cannot be checked out while {}",
            session.status
        )));
    }

    let hourly_rate_cents = hourly_rate_for_spot(&mut tx, session.parking_spot_id).await?;

    let check_out_time = Utc::now();
    let minutes = reservation::billable_minutes(session.check_in_time, check_out_time);
    let amount = reservation::total_cents(hourly_rate_cents, session.check_in_time, check_out_time);

    let sql = format!(
        r#"
        UPDATE parking_sessions
        SET status = 'completed', check_out_time = $2, total_duration_minutes = $3,
            total_amount_cents = $4, {BUMP_VERSION}
        WHERE id = $1
        RETURNING *
        "#
    );
    let session = sqlx::query_as::<_, ParkingSession>(&sql)
        .bind(id)
        .bind(check_out_time)
        .bind(i32::try_from(minutes).unwrap_or(i32::MAX))
        .bind(amount)
        .fetch_one(&mut *tx)
        .await?;

    parking_spot_service::vacate(&mut *tx, session.parking_spot_id).await?;

    if let Some(reservation_id) = session.reservation_id {
        let sql = format!(
            r#"
            UPDATE reservations SET status = 'completed', actual_end_time = $2, {BUMP_VERSION}
            WHERE id = $1 AND status = 'active'
            "#
        );
        sqlx::query(&sql)
            .bind(reservation_id)
            .bind(check_out_time)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    tracing::info!(session_id = %id, minutes, amount_cents = amount, "session checked out");
    Ok(session)
}

/// Fetch a session on one of `owner_id`'s lots.
pub async fn get_for_lot_owner(
    pool: &DbPool,
    owner_id: Uuid,
    id: Uuid,
) -> Result<ParkingSession, AppError> {
    sqlx::query_as::<_, ParkingSession>(
        r#"
        SELECT parking_sessions.*
        FROM parking_sessions
        INNER JOIN parking_spots ON parking_spots.id = parking_sessions.parking_spot_id
        INNER JOIN parking_lots ON parking_lots.id = parking_spots.parking_lot_id
        WHERE parking_sessions.id = $1 AND parking_lots.owner_id = $2
        "#,
    )
    .bind(id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("parking session"))
}

/// active → violated, raised by the lot owner. The driver gets a
/// `violation_alert`.
///
/// # Errors
///
/// - `NotFound`: Session not on one of the owner's lots
/// - `Conflict`: Session is not active
pub async fn mark_violation(
    pool: &DbPool,
    owner_id: Uuid,
    id: Uuid,
) -> Result<ParkingSession, AppError> {
    let session = get_for_lot_owner(pool, owner_id, id).await?;

    let mut tx = pool.begin().await?;

    let sql = format!(
        r#"
        UPDATE parking_sessions SET status = 'violated', {BUMP_VERSION}
        WHERE id = $1 AND status = 'active'
        RETURNING *
        "#
    );
    let session = sqlx::query_as::<_, ParkingSession>(&sql)
        .bind(session.id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            AppError::Conflict(format!(
                "parking session cannot be marked violated while {}",
                session.status
            ))
        })?;

    notification_service::insert(&mut *tx, &violation_notice(&session)).await?;

    tx.commit().await?;

    tracing::info!(session_id = %id, "session marked as violation");
    Ok(session)
}

/// Flag active sessions whose reservation window has closed and alert
/// their drivers. Returns how many sessions were flagged.
pub async fn mark_overtime(pool: &DbPool) -> Result<u64, AppError> {
    let mut tx = pool.begin().await?;

    let sql = format!(
        r#"
        UPDATE parking_sessions SET status = 'violated', {BUMP_VERSION}
        WHERE status = 'active'
          AND reservation_id IN (SELECT id FROM reservations WHERE end_time < NOW())
        RETURNING *
        "#
    );
    let sessions = sqlx::query_as::<_, ParkingSession>(&sql)
        .fetch_all(&mut *tx)
        .await?;

    notify_all(&mut tx, &sessions).await?;

    tx.commit().await?;

    Ok(sessions.len() as u64)
}

async fn notify_all(conn: &mut PgConnection, sessions: &[ParkingSession]) -> Result<(), AppError> {
    let notices: Vec<NewNotification> = sessions.iter().map(violation_notice).collect();
    notification_service::insert_all(conn, &notices).await?;
    Ok(())
}

fn violation_notice(session: &ParkingSession) -> NewNotification {
    NewNotification::new(
        session.user_id,
        TYPE_VIOLATION_ALERT,
        "Parking violation",
        "Your parking session has been flagged as a violation. Please move your vehicle or contact the lot operator.",
    )
    .with_data(json!({
        "session_id": session.id,
        "parking_spot_id": session.parking_spot_id,
    }))
}
