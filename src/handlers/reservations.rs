//! Reservation HTTP handlers.
//!
//! This module implements the booking endpoints:
//! - POST /v1/reservations - Book a stay
//! - GET /v1/reservations - The caller's reservations, optional `?status=`
//! - GET /v1/reservations/{id} - One reservation
//! - PATCH /v1/reservations/{id} - Move times or spot (versioned)
//! - POST /v1/reservations/{id}/cancel | check-in | check-out - Status transitions
//! - GET /v1/parking-lots/{id}/reservations/active - Lot owner view

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthUser,
    models::{
        pagination::{Filters, ListQuery, Page},
        reservation::{
            self, CreateReservationRequest, Reservation, SORT_SAFELIST, StatusFilter,
            UpdateReservationRequest,
        },
        validation::Validator,
    },
    services::{parking_lot_service, reservation_service},
};

/// Book a stay at a lot.
///
/// # Endpoint
///
/// `POST /v1/reservations`
///
/// # Request Body
///
/// ```json
/// {
///   "vehicle_id": "550e8400-e29b-41d4-a716-446655440000",
///   "parking_lot_id": "660e8400-e29b-41d4-a716-446655440001",
///   "parking_spot_id": "770e8400-e29b-41d4-a716-446655440002",
///   "start_time": "2026-01-10T09:00:00Z",
///   "end_time": "2026-01-10T11:30:00Z"
/// }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**: Reservation in `pending`, total for 3 billable hours
/// - **Error (404)**: Vehicle not the caller's, lot inactive, or spot not in the lot
/// - **Error (409)**: Spot already reserved or occupied
/// - **Error (422)**: Start in the past, end before start, or longer than 30 days
pub async fn create_reservation(
    State(pool): State<DbPool>,
    user: AuthUser,
    Json(request): Json<CreateReservationRequest>,
) -> Result<(StatusCode, Json<Reservation>), AppError> {
    let mut v = Validator::new();
    request.validate(&mut v, Utc::now());
    v.finish()?;

    let reservation = reservation_service::create(&pool, user.id, request).await?;

    Ok((StatusCode::CREATED, Json(reservation)))
}

pub async fn list_reservations(
    State(pool): State<DbPool>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
    Query(status): Query<StatusFilter>,
) -> Result<Json<Page<Reservation>>, AppError> {
    let mut v = Validator::new();
    status.validate(&mut v);
    v.finish()?;

    let filters = Filters::from_query(query, "-start_time", SORT_SAFELIST)?;
    let page =
        reservation_service::list(&pool, user.id, status.status.as_deref(), &filters).await?;
    Ok(Json(page))
}

pub async fn get_reservation(
    State(pool): State<DbPool>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Reservation>, AppError> {
    let reservation = reservation_service::get(&pool, user.id, id).await?;
    Ok(Json(reservation))
}

/// Move a pending or confirmed reservation.
///
/// # Endpoint
///
/// `PATCH /v1/reservations/{id}`
///
/// # Request Body
///
/// ```json
/// { "version": 3, "end_time": "2026-01-10T12:00:00Z", "parking_spot_id": null }
/// ```
///
/// The total is recomputed. Changing `parking_spot_id` releases the old
/// spot and claims the new one atomically; `null` gives the spot up.
///
/// # Response
///
/// - **Success (200 OK)**: Updated reservation, `version` incremented
/// - **Error (409)**: Stale `version`, reservation no longer modifiable, or new spot taken
pub async fn update_reservation(
    State(pool): State<DbPool>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateReservationRequest>,
) -> Result<Json<Reservation>, AppError> {
    let current = reservation_service::get(&pool, user.id, id).await?;
    let expected_version = request.version;
    let times_changed = request.start_time.is_some() || request.end_time.is_some();

    let mut updated = current.clone();
    request.apply(&mut updated);

    if times_changed {
        let mut v = Validator::new();
        reservation::check_window(&mut v, updated.start_time, updated.end_time, Utc::now());
        v.finish()?;
    }

    let reservation =
        reservation_service::update(&pool, &current, &updated, expected_version).await?;
    Ok(Json(reservation))
}

/// `POST /v1/reservations/{id}/cancel`
pub async fn cancel_reservation(
    State(pool): State<DbPool>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Reservation>, AppError> {
    let reservation = reservation_service::cancel(&pool, user.id, id).await?;
    Ok(Json(reservation))
}

/// `POST /v1/reservations/{id}/check-in`
pub async fn check_in(
    State(pool): State<DbPool>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Reservation>, AppError> {
    let reservation = reservation_service::check_in(&pool, user.id, id).await?;
    Ok(Json(reservation))
}

/// `POST /v1/reservations/{id}/check-out`
pub async fn check_out(
    State(pool): State<DbPool>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Reservation>, AppError> {
    let reservation = reservation_service::check_out(&pool, user.id, id).await?;
    Ok(Json(reservation))
}

/// Confirmed and in-progress reservations at a lot the caller owns.
pub async fn list_active_for_lot(
    State(pool): State<DbPool>,
    user: AuthUser,
    Path(lot_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<Reservation>>, AppError> {
    let filters = Filters::from_query(query, "start_time", SORT_SAFELIST)?;
    let lot = parking_lot_service::get_owned(&pool, user.id, lot_id).await?;
    let page = reservation_service::list_active_for_lot(&pool, lot.id, &filters).await?;
    Ok(Json(page))
}
