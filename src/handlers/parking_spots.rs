//! Parking spot HTTP handlers.
//!
//! Reads are public. Writes require the caller to own the spot's lot; a
//! lot or spot owned by someone else answers 404.

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
        parking_spot::{
            AvailableSpotsQuery, BulkCreateSpotsRequest, CreateParkingSpotRequest, ParkingSpot,
            SORT_SAFELIST, SPOT_TYPES, UpdateParkingSpotRequest,
        },
        validation::Validator,
    },
    services::{parking_lot_service, parking_spot_service},
};

/// `POST /v1/parking-lots/{id}/spots`
pub async fn create_spot(
    State(pool): State<DbPool>,
    user: AuthUser,
    Path(lot_id): Path<Uuid>,
    Json(request): Json<CreateParkingSpotRequest>,
) -> Result<(StatusCode, Json<ParkingSpot>), AppError> {
    let mut v = Validator::new();
    request.validate(&mut v);
    v.finish()?;

    let lot = parking_lot_service::get_owned(&pool, user.id, lot_id).await?;
    let spot = parking_spot_service::create(&pool, lot.id, request).await?;

    Ok((StatusCode::CREATED, Json(spot)))
}

/// Create many spots at once.
///
/// # Endpoint
///
/// `POST /v1/parking-lots/{id}/spots/bulk`
///
/// # Request Body
///
/// ```json
/// { "spots": [{ "spot_number": "A-1" }, { "spot_number": "A-2", "spot_type": "electric" }] }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**: Every created spot
/// - **Error (409)**: A spot number is already used; nothing is created
/// - **Error (422)**: Empty batch, more than 500 entries, or an invalid entry
pub async fn bulk_create_spots(
    State(pool): State<DbPool>,
    user: AuthUser,
    Path(lot_id): Path<Uuid>,
    Json(request): Json<BulkCreateSpotsRequest>,
) -> Result<(StatusCode, Json<Vec<ParkingSpot>>), AppError> {
    let mut v = Validator::new();
    request.validate(&mut v);
    v.finish()?;

    let lot = parking_lot_service::get_owned(&pool, user.id, lot_id).await?;
    let spots = parking_spot_service::bulk_create(&pool, lot.id, &request.spots).await?;

    Ok((StatusCode::CREATED, Json(spots)))
}

pub async fn list_spots(
    State(pool): State<DbPool>,
    Path(lot_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<ParkingSpot>>, AppError> {
    let filters = Filters::from_query(query, "spot_number", SORT_SAFELIST)?;
    let lot = parking_lot_service::get(&pool, lot_id).await?;
    let page = parking_spot_service::list_for_lot(&pool, lot.id, &filters).await?;
    Ok(Json(page))
}

/// `GET /v1/parking-lots/{id}/spots/available?spot_type=electric`
pub async fn list_available_spots(
    State(pool): State<DbPool>,
    Path(lot_id): Path<Uuid>,
    Query(query): Query<AvailableSpotsQuery>,
) -> Result<Json<Vec<ParkingSpot>>, AppError> {
    if let Some(spot_type) = &query.spot_type {
        let mut v = Validator::new();
        v.check_permitted(spot_type, SPOT_TYPES, "spot_type");
        v.finish()?;
    }

    let lot = parking_lot_service::get(&pool, lot_id).await?;
    let spots =
        parking_spot_service::list_available(&pool, lot.id, query.spot_type.as_deref()).await?;
    Ok(Json(spots))
}

pub async fn get_spot(
    State(pool): State<DbPool>,
    Path(id): Path<Uuid>,
) -> Result<Json<ParkingSpot>, AppError> {
    let spot = parking_spot_service::get(&pool, id).await?;
    Ok(Json(spot))
}

/// `PATCH /v1/parking-spots/{id}` (lot owner, versioned)
pub async fn update_spot(
    State(pool): State<DbPool>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateParkingSpotRequest>,
) -> Result<Json<ParkingSpot>, AppError> {
    let mut spot = parking_spot_service::get_owned(&pool, user.id, id).await?;
    let expected_version = request.version;
    request.apply(&mut spot);

    let mut v = Validator::new();
    spot.validate(&mut v);
    v.finish()?;

    let stamp = parking_spot_service::update(&pool, &spot, expected_version).await?;
    spot.version = stamp.version;
    spot.updated_at = stamp.updated_at;

    Ok(Json(spot))
}

pub async fn delete_spot(
    State(pool): State<DbPool>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    parking_spot_service::delete(&pool, user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
