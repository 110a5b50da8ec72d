//! Payment HTTP handlers.

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
        parking_lot::{RevenueQuery, RevenueReport},
        payment::{CreatePaymentRequest, Payment, SORT_SAFELIST, UpdatePaymentRequest},
        validation::Validator,
    },
    services::{parking_lot_service, payment_service},
};

/// Pay for a reservation.
///
/// # Endpoint
///
/// `POST /v1/payments`
///
/// # Request Body
///
/// ```json
/// {
///   "reservation_id": "550e8400-e29b-41d4-a716-446655440000",
///   "payment_method": "card",
///   "transaction_id": "ch_3N8x2a"
/// }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**: Payment in `completed` for the reservation total;
///   a pending reservation is now `confirmed`
/// - **Error (404)**: Reservation not found or not the caller's
/// - **Error (409)**: Already paid, reservation not payable, or duplicate `transaction_id`
pub async fn create_payment(
    State(pool): State<DbPool>,
    user: AuthUser,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<Payment>), AppError> {
    let mut v = Validator::new();
    request.validate(&mut v);
    v.finish()?;

    let payment = payment_service::create(&pool, user.id, request).await?;

    Ok((StatusCode::CREATED, Json(payment)))
}

pub async fn list_payments(
    State(pool): State<DbPool>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<Payment>>, AppError> {
    let filters = Filters::from_query(query, "-payment_date", SORT_SAFELIST)?;
    let page = payment_service::list(&pool, user.id, &filters).await?;
    Ok(Json(page))
}

pub async fn get_payment(
    State(pool): State<DbPool>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Payment>, AppError> {
    let payment = payment_service::get(&pool, user.id, id).await?;
    Ok(Json(payment))
}

/// `GET /v1/reservations/{id}/payment` - latest payment for the reservation.
pub async fn get_reservation_payment(
    State(pool): State<DbPool>,
    user: AuthUser,
    Path(reservation_id): Path<Uuid>,
) -> Result<Json<Payment>, AppError> {
    let payment = payment_service::for_reservation(&pool, user.id, reservation_id).await?;
    Ok(Json(payment))
}

/// `PATCH /v1/payments/{id}` (versioned: `status`, `transaction_id`)
pub async fn update_payment(
    State(pool): State<DbPool>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdatePaymentRequest>,
) -> Result<Json<Payment>, AppError> {
    let mut payment = payment_service::get(&pool, user.id, id).await?;
    let expected_version = request.version;
    request.apply(&mut payment);

    let mut v = Validator::new();
    payment.validate(&mut v);
    v.finish()?;

    let stamp = payment_service::update(&pool, &payment, expected_version).await?;
    payment.version = stamp.version;
    payment.updated_at = stamp.updated_at;

    Ok(Json(payment))
}

/// Revenue of a lot the caller owns.
///
/// # Endpoint
///
/// `GET /v1/parking-lots/{id}/revenue?from=2026-01-01T00:00:00Z&to=2026-02-01T00:00:00Z`
///
/// Sums completed payments with `from <= payment_date < to`.
pub async fn lot_revenue(
    State(pool): State<DbPool>,
    user: AuthUser,
    Path(lot_id): Path<Uuid>,
    Query(query): Query<RevenueQuery>,
) -> Result<Json<RevenueReport>, AppError> {
    let mut v = Validator::new();
    query.validate(&mut v);
    v.finish()?;

    let lot = parking_lot_service::get_owned(&pool, user.id, lot_id).await?;
    let report = payment_service::revenue_for_lot(&pool, lot.id, query.from, query.to).await?;
    Ok(Json(report))
}
