//! Parking lot service - listings, geo search, owner management.

use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        pagination::{Filters, Page, collect_page},
        parking_lot::{
            AvailabilityResponse, CreateParkingLotRequest, NearbyParkingLot, ParkingLot,
            SearchQuery,
        },
    },
    services::versioned::{VersionStamp, VersionedUpdate},
};

/// Mean Earth radius used by the haversine search.
const EARTH_RADIUS_KM: f64 = 6371.0;

const MAX_SEARCH_RESULTS: i64 = 100;

pub async fn create(
    pool: &DbPool,
    owner_id: Uuid,
    request: CreateParkingLotRequest,
) -> Result<ParkingLot, AppError> {
    let lot = sqlx::query_as::<_, ParkingLot>(
        r#"
        INSERT INTO parking_lots (
            owner_id, name, address, latitude, longitude, total_spots,
            hourly_rate_cents, daily_rate_cents, monthly_rate_cents, open_time, close_time
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING *
        "#,
    )
    .bind(owner_id)
    .bind(request.name)
    .bind(request.address)
    .bind(request.latitude)
    .bind(request.longitude)
    .bind(request.total_spots)
    .bind(request.hourly_rate_cents)
    .bind(request.daily_rate_cents)
    .bind(request.monthly_rate_cents)
    .bind(request.open_time)
    .bind(request.close_time)
    .fetch_one(pool)
    .await?;

    tracing::info!(parking_lot_id = %lot.id, owner_id = %owner_id, "parking lot created");
    Ok(lot)
}

/// Active lots, for the public listing.
pub async fn list_active(pool: &DbPool, filters: &Filters) -> Result<Page<ParkingLot>, AppError> {
    let sql = format!(
        r#"
        SELECT count(*) OVER() AS total_records, *
        FROM parking_lots
        WHERE is_active
        ORDER BY {}
        LIMIT $1 OFFSET $2
        "#,
        filters.order_by()
    );

    let rows = sqlx::query(&sql)
        .bind(filters.limit())
        .bind(filters.offset())
        .fetch_all(pool)
        .await?;

    Ok(collect_page(rows, filters)?)
}

/// Every lot owned by `owner_id`, active or not.
pub async fn list_for_owner(
    pool: &DbPool,
    owner_id: Uuid,
    filters: &Filters,
) -> Result<Page<ParkingLot>, AppError> {
    let sql = format!(
        r#"
        SELECT count(*) OVER() AS total_records, *
        FROM parking_lots
        WHERE owner_id = $1
        ORDER BY {}
        LIMIT $2 OFFSET $3
        "#,
        filters.order_by()
    );

    let rows = sqlx::query(&sql)
        .bind(owner_id)
        .bind(filters.limit())
        .bind(filters.offset())
        .fetch_all(pool)
        .await?;

    Ok(collect_page(rows, filters)?)
}

/// Active lots within `radius_km` of a point, nearest first.
///
/// # Distance
///
/// Great-circle distance by the spherical law of cosines. `LEAST(1.0, ...)`
/// clamps rounding error so `acos` never sees a value above 1 when the
/// query point coincides with a lot.
pub async fn search(pool: &DbPool, query: &SearchQuery) -> Result<Vec<NearbyParkingLot>, AppError> {
    let lots = sqlx::query_as::<_, NearbyParkingLot>(
        r#"
        SELECT *
        FROM (
            SELECT parking_lots.*,
                   $1 * acos(LEAST(1.0,
                       cos(radians($2)) * cos(radians(latitude))
                       * cos(radians(longitude) - radians($3))
                       + sin(radians($2)) * sin(radians(latitude))
                   )) AS distance_km
            FROM parking_lots
            WHERE is_active
        ) nearby
        WHERE distance_km <= $4
        ORDER BY distance_km ASC, id ASC
        LIMIT $5
        "#,
    )
    .bind(EARTH_RADIUS_KM)
    .bind(query.latitude)
    .bind(query.longitude)
    .bind(query.radius_km)
    .bind(MAX_SEARCH_RESULTS)
    .fetch_all(pool)
    .await?;

    Ok(lots)
}

/// # Errors
///
/// - `NotFound`: No lot with this id
pub async fn get(pool: &DbPool, id: Uuid) -> Result<ParkingLot, AppError> {
    sqlx::query_as::<_, ParkingLot>("SELECT * FROM parking_lots WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("parking lot"))
}

/// Fetch a lot only if `owner_id` manages it. Used to guard every owner
/// operation on the lot and its spots.
///
/// # Errors
///
/// - `NotFound`: Unknown lot, or owned by someone else
pub async fn get_owned(pool: &DbPool, owner_id: Uuid, id: Uuid) -> Result<ParkingLot, AppError> {
    sqlx::query_as::<_, ParkingLot>("SELECT * FROM parking_lots WHERE id = $1 AND owner_id = $2")
        .bind(id)
        .bind(owner_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("parking lot"))
}

pub async fn update(
    pool: &DbPool,
    lot: &ParkingLot,
    expected_version: i32,
) -> Result<VersionStamp, AppError> {
    VersionedUpdate::table("parking_lots")
        .set("name", lot.name.clone())
        .set("address", lot.address.clone())
        .set("latitude", lot.latitude)
        .set("longitude", lot.longitude)
        .set("total_spots", lot.total_spots)
        .set("hourly_rate_cents", lot.hourly_rate_cents)
        .set("daily_rate_cents", lot.daily_rate_cents)
        .set("monthly_rate_cents", lot.monthly_rate_cents)
        .set("open_time", lot.open_time)
        .set("close_time", lot.close_time)
        .set("is_active", lot.is_active)
        .execute(pool, lot.id, expected_version)
        .await
}

/// Delete a lot together with its spots (cascade).
pub async fn delete(pool: &DbPool, owner_id: Uuid, id: Uuid) -> Result<(), AppError> {
    let deleted = sqlx::query("DELETE FROM parking_lots WHERE id = $1 AND owner_id = $2")
        .bind(id)
        .bind(owner_id)
        .execute(pool)
        .await
        .map_err(|err| AppError::from_delete(err, "parking lot"))?
        .rows_affected();

    if deleted == 0 {
        return Err(AppError::NotFound("parking lot"));
    }

    tracing::info!(parking_lot_id = %id, "parking lot deleted");
    Ok(())
}

/// Count spots that are active, unoccupied and unreserved.
pub async fn availability(pool: &DbPool, id: Uuid) -> Result<AvailabilityResponse, AppError> {
    let lot = get(pool, id).await?;

    let available_spots: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM parking_spots
        WHERE parking_lot_id = $1
          AND is_active
          AND NOT is_occupied
          AND NOT is_reserved
        "#,
    )
    .bind(id)
    .fetch_one(pool)
    .await?;

    Ok(AvailabilityResponse {
        parking_lot_id: lot.id,
        total_spots: lot.total_spots,
        available_spots,
    })
}
