//! Vehicle HTTP handlers.
//!
//! All endpoints require an activated account and only ever see the caller's own
//! vehicles; another user's vehicle id answers 404.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::ActivatedUser,
    models::{
        pagination::{Filters, ListQuery, Page},
        validation::Validator,
        vehicle::{CreateVehicleRequest, SORT_SAFELIST, UpdateVehicleRequest, Vehicle},
    },
    services::vehicle_service,
};

/// Register a vehicle.
///
/// # Endpoint
///
/// `POST /v1/vehicles`
///
/// # Response
///
/// - **Success (201 Created)**: The vehicle, `version` 1
/// - **Error (409)**: License plate already registered
/// - **Error (422)**: Validation failed
pub async fn create_vehicle(
    State(pool): State<DbPool>,
    ActivatedUser(user): ActivatedUser,
    Json(request): Json<CreateVehicleRequest>,
) -> Result<(StatusCode, Json<Vehicle>), AppError> {
    let mut v = Validator::new();
    request.validate(&mut v);
    v.finish()?;

    let vehicle = vehicle_service::create(&pool, user.id, request).await?;

    Ok((StatusCode::CREATED, Json(vehicle)))
}

/// `GET /v1/vehicles?page=&page_size=&sort=`
pub async fn list_vehicles(
    State(pool): State<DbPool>,
    ActivatedUser(user): ActivatedUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<Vehicle>>, AppError> {
    let filters = Filters::from_query(query, "id", SORT_SAFELIST)?;
    let page = vehicle_service::list(&pool, user.id, &filters).await?;
    Ok(Json(page))
}

pub async fn get_vehicle(
    State(pool): State<DbPool>,
    ActivatedUser(user): ActivatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vehicle>, AppError> {
    let vehicle = vehicle_service::get(&pool, user.id, id).await?;
    Ok(Json(vehicle))
}

/// Partially update a vehicle.
///
/// # Endpoint
///
/// `PATCH /v1/vehicles/{id}`
///
/// # Request Body
///
/// ```json
/// { "version": 1, "color": "Red" }
/// ```
///
/// # Response
///
/// - **Success (200 OK)**: Updated vehicle, `version` incremented by one
/// - **Error (409)**: Stale `version`, or plate taken
pub async fn update_vehicle(
    State(pool): State<DbPool>,
    ActivatedUser(user): ActivatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateVehicleRequest>,
) -> Result<Json<Vehicle>, AppError> {
    let mut vehicle = vehicle_service::get(&pool, user.id, id).await?;
    let expected_version = request.version;
    request.apply(&mut vehicle);

    let mut v = Validator::new();
    vehicle.validate(&mut v);
    v.finish()?;

    let stamp = vehicle_service::update(&pool, &vehicle, expected_version).await?;
    vehicle.version = stamp.version;
    vehicle.updated_at = stamp.updated_at;

    Ok(Json(vehicle))
}

pub async fn delete_vehicle(
    State(pool): State<DbPool>,
    ActivatedUser(user): ActivatedUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    vehicle_service::delete(&pool, user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `PUT /v1/vehicles/{id}/set-default`
///
/// Clears the flag on the caller's other vehicles in the same transaction.
pub async fn set_default(
    State(pool): State<DbPool>,
    ActivatedUser(user): ActivatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vehicle>, AppError> {
    let vehicle = vehicle_service::set_default(&pool, user.id, id).await?;
    Ok(Json(vehicle))
}
