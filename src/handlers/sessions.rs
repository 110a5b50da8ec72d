//! Parking session HTTP handlers.

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
        parking_session::{
            CreateSessionRequest, ParkingSession, SORT_SAFELIST, UpdateSessionRequest,
        },
        validation::Validator,
    },
    services::{parking_lot_service, session_service},
};

/// Park on a spot.
///
/// # Endpoint
///
/// `POST /v1/sessions`
///
/// # Request Body
///
/// ```json
/// {
///   "vehicle_id": "550e8400-e29b-41d4-a716-446655440000",
///   "parking_spot_id": "770e8400-e29b-41d4-a716-446655440002",
///   "reservation_id": null
/// }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**: Session in `active`
/// - **Error (404)**: Vehicle, reservation or spot not found
/// - **Error (409)**: Spot occupied, inactive, or reserved for another booking
pub async fn start_session(
    State(pool): State<DbPool>,
    user: AuthUser,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<ParkingSession>), AppError> {
    let session = session_service::create(&pool, user.id, request).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn list_sessions(
    State(pool): State<DbPool>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<ParkingSession>>, AppError> {
    let filters = Filters::from_query(query, "-check_in_time", SORT_SAFELIST)?;
    let page = session_service::list(&pool, user.id, &filters).await?;
    Ok(Json(page))
}

pub async fn list_active_sessions(
    State(pool): State<DbPool>,
    user: AuthUser,
) -> Result<Json<Vec<ParkingSession>>, AppError> {
    let sessions = session_service::list_active(&pool, user.id).await?;
    Ok(Json(sessions))
}

pub async fn get_session(
    State(pool): State<DbPool>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ParkingSession>, AppError> {
    let session = session_service::get(&pool, user.id, id).await?;
    Ok(Json(session))
}

/// `PATCH /v1/sessions/{id}` - versioned correction of a completed session's
/// `check_out_time`; duration and amount are billed again.
pub async fn update_session(
    State(pool): State<DbPool>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateSessionRequest>,
) -> Result<Json<ParkingSession>, AppError> {
    let mut session = session_service::get(&pool, user.id, id).await?;
    let expected_version = request.version;
    request.apply(&mut session);

    let mut v = Validator::new();
    session.validate(&mut v);
    v.finish()?;

    let session = session_service::update(&pool, &session, expected_version).await?;

    Ok(Json(session))
}

/// `POST /v1/sessions/{id}/check-out`
///
/// Bills whole minutes (rounded up) at the lot's hourly rate per started
/// hour and frees the spot.
pub async fn check_out(
    State(pool): State<DbPool>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ParkingSession>, AppError> {
    let session = session_service::check_out(&pool, user.id, id).await?;
    Ok(Json(session))
}

/// `POST /v1/sessions/{id}/violation` (lot owner)
pub async fn mark_violation(
    State(pool): State<DbPool>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ParkingSession>, AppError> {
    let session = session_service::mark_violation(&pool, user.id, id).await?;
    Ok(Json(session))
}

/// `GET /v1/parking-lots/{id}/sessions` (lot owner)
pub async fn list_for_lot(
    State(pool): State<DbPool>,
    user: AuthUser,
    Path(lot_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<ParkingSession>>, AppError> {
    let filters = Filters::from_query(query, "-check_in_time", SORT_SAFELIST)?;
    let lot = parking_lot_service::get_owned(&pool, user.id, lot_id).await?;
    let page = session_service::list_for_lot(&pool, lot.id, &filters).await?;
    Ok(Json(page))
}
