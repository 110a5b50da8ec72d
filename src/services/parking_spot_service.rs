//! Parking spot service.
//!
//! Besides CRUD, this module owns the spot state flags. `reserve`,
//! `occupy`, `release` and `vacate` are single conditional statements meant
//! to run inside the caller's transaction, so a spot is claimed together
//! with the reservation or session that claims it.

use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        pagination::{Filters, Page, collect_page},
        parking_spot::{CreateParkingSpotRequest, ParkingSpot},
    },
    services::versioned::{BUMP_VERSION, VersionStamp, VersionedUpdate},
};

pub async fn create(
    pool: &DbPool,
    parking_lot_id: Uuid,
    request: CreateParkingSpotRequest,
) -> Result<ParkingSpot, AppError> {
    let mut conn = pool.acquire().await?;
    insert(&mut *conn, parking_lot_id, &request).await
}

/// Insert every spot or none.
///
/// # Errors
///
/// - `Duplicate`: A spot number repeats within the batch or already exists
///   in the lot. Nothing is inserted.
pub async fn bulk_create(
    pool: &DbPool,
    parking_lot_id: Uuid,
    requests: &[CreateParkingSpotRequest],
) -> Result<Vec<ParkingSpot>, AppError> {
    let mut tx = pool.begin().await?;

    let mut spots = Vec::with_capacity(requests.len());
    for request in requests {
        spots.push(insert(&mut *tx, parking_lot_id, request).await?);
    }

    tx.commit().await?;

    tracing::info!(parking_lot_id = %parking_lot_id, count = spots.len(), "spots created");
    Ok(spots)
}

async fn insert(
    conn: &mut PgConnection,
    parking_lot_id: Uuid,
    request: &CreateParkingSpotRequest,
) -> Result<ParkingSpot, AppError> {
    sqlx::query_as::<_, ParkingSpot>(
        r#"
        INSERT INTO parking_spots (parking_lot_id, spot_number, spot_type)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(parking_lot_id)
    .bind(&request.spot_number)
    .bind(&request.spot_type)
    .fetch_one(conn)
    .await
    .map_err(AppError::from_write)
}

pub async fn list_for_lot(
    pool: &DbPool,
    parking_lot_id: Uuid,
    filters: &Filters,
) -> Result<Page<ParkingSpot>, AppError> {
    let sql = format!(
        r#"
        SELECT count(*) OVER() AS total_records, *
        FROM parking_spots
        WHERE parking_lot_id = $1
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

/// Spots that can be booked right now, optionally of one type.
pub async fn list_available(
    pool: &DbPool,
    parking_lot_id: Uuid,
    spot_type: Option<&str>,
) -> Result<Vec<ParkingSpot>, AppError> {
    let spots = sqlx::query_as::<_, ParkingSpot>(
        r#"
        SELECT *
        FROM parking_spots
        WHERE parking_lot_id = $1
          AND is_active
          AND NOT is_occupied
          AND NOT is_reserved
          AND ($2::TEXT IS NULL OR spot_type = $2)
        ORDER BY spot_number ASC, id ASC
        "#,
    )
    .bind(parking_lot_id)
    .bind(spot_type)
    .fetch_all(pool)
    .await?;

    Ok(spots)
}

pub async fn get(pool: &DbPool, id: Uuid) -> Result<ParkingSpot, AppError> {
    sqlx::query_as::<_, ParkingSpot>("SELECT * FROM parking_spots WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("parking spot"))
}

/// Fetch a spot only if its lot is managed by `owner_id`.
pub async fn get_owned(pool: &DbPool, owner_id: Uuid, id: Uuid) -> Result<ParkingSpot, AppError> {
    sqlx::query_as::<_, ParkingSpot>(
        r#"
        SELECT parking_spots.*
        FROM parking_spots
        INNER JOIN parking_lots ON parking_lots.id = parking_spots.parking_lot_id
        WHERE parking_spots.id = $1 AND parking_lots.owner_id = $2
        "#,
    )
    .bind(id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("parking spot"))
}

pub async fn update(
    pool: &DbPool,
    spot: &ParkingSpot,
    expected_version: i32,
) -> Result<VersionStamp, AppError> {
    VersionedUpdate::table("parking_spots")
        .set("spot_number", spot.spot_number.clone())
        .set("spot_type", spot.spot_type.clone())
        .set("is_active", spot.is_active)
        .set("is_occupied", spot.is_occupied)
        .set("is_reserved", spot.is_reserved)
        .execute(pool, spot.id, expected_version)
        .await
}

pub async fn delete(pool: &DbPool, owner_id: Uuid, id: Uuid) -> Result<(), AppError> {
    let deleted = sqlx::query(
        r#"
        DELETE FROM parking_spots
        WHERE id = $1
          AND parking_lot_id IN (SELECT id FROM parking_lots WHERE owner_id = $2)
        "#,
    )
    .bind(id)
    .bind(owner_id)
    .execute(pool)
    .await
    .map_err(|err| AppError::from_delete(err, "parking spot"))?
    .rows_affected();

    if deleted == 0 {
        return Err(AppError::NotFound("parking spot"));
    }

    Ok(())
}

/// Mark a free spot of `parking_lot_id` as reserved.
///
/// # Errors
///
/// - `NotFound`: Spot does not exist in this lot
/// - `Conflict`: Spot is inactive, reserved or occupied
pub async fn reserve(
    conn: &mut PgConnection,
    id: Uuid,
    parking_lot_id: Uuid,
) -> Result<(), AppError> {
    let sql = format!(
        r#"
        UPDATE parking_spots SET is_reserved = true, {BUMP_VERSION}
        WHERE id = $1
          AND parking_lot_id = $2
          AND is_active
          AND NOT is_reserved
          AND NOT is_occupied
        "#
    );
    let claimed = sqlx::query(&sql)
        .bind(id)
        .bind(parking_lot_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    if claimed == 0 {
        return Err(unavailable(conn, id, Some(parking_lot_id)).await);
    }

    Ok(())
}

/// Mark a spot as occupied.
///
/// A reserved spot can only be occupied by the holder of that reservation,
/// signalled by `holds_reservation`; occupying it clears the reserved flag.
///
/// # Errors
///
/// - `NotFound`: No such spot
/// - `Conflict`: Spot is inactive, occupied, or reserved for someone else
pub async fn occupy(
    conn: &mut PgConnection,
    id: Uuid,
    holds_reservation: bool,
) -> Result<Uuid, AppError> {
    let sql = format!(
        r#"
        UPDATE parking_spots SET is_occupied = true, is_reserved = false, {BUMP_VERSION}
        WHERE id = $1
          AND is_active
          AND NOT is_occupied
          AND (NOT is_reserved OR $2)
        RETURNING parking_lot_id
        "#
    );
    let parking_lot_id: Option<Uuid> = sqlx::query_scalar(&sql)
        .bind(id)
        .bind(holds_reservation)
        .fetch_optional(&mut *conn)
        .await?;

    match parking_lot_id {
        Some(parking_lot_id) => Ok(parking_lot_id),
        None => Err(unavailable(conn, id, None).await),
    }
}

/// Clear the reserved flag. A no-op if the spot was not reserved.
pub async fn release(conn: &mut PgConnection, id: Uuid) -> Result<(), AppError> {
    let sql = format!(
        "UPDATE parking_spots SET is_reserved = false, {BUMP_VERSION} WHERE id = $1 AND is_reserved"
    );
    sqlx::query(&sql).bind(id).execute(conn).await?;
    Ok(())
}

/// Release every spot in `ids` at once.
pub async fn release_all(conn: &mut PgConnection, ids: &[Uuid]) -> Result<u64, AppError> {
    if ids.is_empty() {
        return Ok(0);
    }

    let sql = format!(
        r#"
        UPDATE parking_spots SET is_reserved = false, {BUMP_VERSION}
        WHERE id = ANY($1) AND is_reserved
        "#
    );
    let released = sqlx::query(&sql)
        .bind(ids)
        .execute(conn)
        .await?
        .rows_affected();

    Ok(released)
}

/// Clear both flags when a vehicle leaves.
pub async fn vacate(conn: &mut PgConnection, id: Uuid) -> Result<(), AppError> {
    let sql = format!(
        r#"
        UPDATE parking_spots SET is_occupied = false, is_reserved = false, {BUMP_VERSION}
        WHERE id = $1 AND (is_occupied OR is_reserved)
        "#
    );
    sqlx::query(&sql).bind(id).execute(conn).await?;
    Ok(())
}

/// Explain why a conditional claim matched nothing.
async fn unavailable(conn: &mut PgConnection, id: Uuid, parking_lot_id: Option<Uuid>) -> AppError {
    let exists = sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM parking_spots
            WHERE id = $1 AND ($2::UUID IS NULL OR parking_lot_id = $2)
        )
        "#,
    )
    .bind(id)
    .bind(parking_lot_id)
    .fetch_one(conn)
    .await;

    match exists {
        Ok(true) => AppError::Conflict("parking spot is not available".to_string()),
        Ok(false) => AppError::NotFound("parking spot"),
        Err(err) => AppError::Database(err),
    }
}
