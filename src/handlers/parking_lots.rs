//! Parking lot HTTP handlers.
//!
//! Listing, search, detail and availability are public. Creating a lot makes
//! the caller its owner; only the owner may change or delete it.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthUser,
    models::{
        pagination::{Filters, ListQuery, Page},
        parking_lot::{
            AvailabilityResponse, CreateParkingLotRequest, NearbyParkingLot, ParkingLot,
            SORT_SAFELIST, SearchQuery, UpdateParkingLotRequest,
        },
        validation::Validator,
    },
    services::parking_lot_service,
};

/// Create a parking lot owned by the caller.
///
/// # Endpoint
///
/// `POST /v1/parking-lots`
///
/// # Response
///
/// - **Success (201 Created)**: The lot, active, `version` 1
/// - **Error (422)**: Coordinates, capacity, rates or hours out of range
pub async fn create_parking_lot(
    State(pool): State<DbPool>,
    user: AuthUser,
    Json(request): Json<CreateParkingLotRequest>,
) -> Result<(StatusCode, Json<ParkingLot>), AppError> {
    let mut v = Validator::new();
    request.validate(&mut v);
    v.finish()?;

    let lot = parking_lot_service::create(&pool, user.id, request).await?;

    Ok((StatusCode::CREATED, Json(lot)))
}

/// `GET /v1/parking-lots` - active lots, paginated.
pub async fn list_parking_lots(
    State(pool): State<DbPool>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<ParkingLot>>, AppError> {
    let filters = Filters::from_query(query, "id", SORT_SAFELIST)?;
    let page = parking_lot_service::list_active(&pool, &filters).await?;
    Ok(Json(page))
}

/// `GET /v1/parking-lots/mine` - every lot the caller owns, active or not.
pub async fn list_my_parking_lots(
    State(pool): State<DbPool>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<ParkingLot>>, AppError> {
    let filters = Filters::from_query(query, "id", SORT_SAFELIST)?;
    let page = parking_lot_service::list_for_owner(&pool, user.id, &filters).await?;
    Ok(Json(page))
}

/// Find active lots near a point.
///
/// # Endpoint
///
/// `GET /v1/parking-lots/search?latitude=40.7128&longitude=-74.006&radius_km=2`
///
/// `radius_km` defaults to 5 and may not exceed 100. Results are ordered by
/// distance and carry a `distance_km` field.
pub async fn search_parking_lots(
    State(pool): State<DbPool>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<NearbyParkingLot>>, AppError> {
    let mut v = Validator::new();
    query.validate(&mut v);
    v.finish()?;

    let lots = parking_lot_service::search(&pool, &query).await?;
    Ok(Json(lots))
}

pub async fn get_parking_lot(
    State(pool): State<DbPool>,
    Path(id): Path<Uuid>,
) -> Result<Json<ParkingLot>, AppError> {
    let lot = parking_lot_service::get(&pool, id).await?;
    Ok(Json(lot))
}

/// Partially update a lot the caller owns.
///
/// # Endpoint
///
/// `PATCH /v1/parking-lots/{id}`
///
/// # Request Body
///
/// ```json
/// { "version": 2, "hourly_rate_cents": 300, "daily_rate_cents": null }
/// ```
///
/// # Response
///
/// - **Success (200 OK)**: Updated lot
/// - **Error (404)**: Not found, or owned by someone else
/// - **Error (409)**: Stale `version`
/// - **Error (422)**: Merged lot failed validation
pub async fn update_parking_lot(
    State(pool): State<DbPool>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateParkingLotRequest>,
) -> Result<Json<ParkingLot>, AppError> {
    let mut lot = parking_lot_service::get_owned(&pool, user.id, id).await?;
    let expected_version = request.version;
    request.apply(&mut lot);

    let mut v = Validator::new();
    lot.validate(&mut v);
    v.finish()?;

    let stamp = parking_lot_service::update(&pool, &lot, expected_version).await?;
    lot.version = stamp.version;
    lot.updated_at = stamp.updated_at;

    Ok(Json(lot))
}

pub async fn delete_parking_lot(
    State(pool): State<DbPool>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    parking_lot_service::delete(&pool, user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /v1/parking-lots/{id}/availability`
pub async fn get_availability(
    State(pool): State<DbPool>,
    Path(id): Path<Uuid>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let availability = parking_lot_service::availability(&pool, id).await?;
    Ok(Json(availability))
}
