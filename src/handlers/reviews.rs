//! Review HTTP handlers.
//!
//! Per-lot listings and the rating summary are public; writing requires a
//! user, and a user may review each lot once.

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
        review::{CreateReviewRequest, RatingSummary, Review, SORT_SAFELIST, UpdateReviewRequest},
        validation::Validator,
    },
    services::review_service,
};

/// `POST /v1/parking-lots/{id}/reviews`
///
/// - **Success (201 Created)**
/// - **Error (404)**: Unknown lot
/// - **Error (409)**: Caller already reviewed this lot
/// - **Error (422)**: Rating outside 1..=5 or comment over 1000 characters
pub async fn create_review(
    State(pool): State<DbPool>,
    user: AuthUser,
    Path(lot_id): Path<Uuid>,
    Json(request): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<Review>), AppError> {
    let mut v = Validator::new();
    request.validate(&mut v);
    v.finish()?;

    let review = review_service::create(&pool, user.id, lot_id, request).await?;

    Ok((StatusCode::CREATED, Json(review)))
}

pub async fn list_for_lot(
    State(pool): State<DbPool>,
    Path(lot_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<Review>>, AppError> {
    let filters = Filters::from_query(query, "-created_at", SORT_SAFELIST)?;
    let page = review_service::list_for_lot(&pool, lot_id, &filters).await?;
    Ok(Json(page))
}

pub async fn rating_summary(
    State(pool): State<DbPool>,
    Path(lot_id): Path<Uuid>,
) -> Result<Json<RatingSummary>, AppError> {
    let summary = review_service::rating_summary(&pool, lot_id).await?;
    Ok(Json(summary))
}

pub async fn list_my_reviews(
    State(pool): State<DbPool>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<Review>>, AppError> {
    let filters = Filters::from_query(query, "-created_at", SORT_SAFELIST)?;
    let page = review_service::list_for_user(&pool, user.id, &filters).await?;
    Ok(Json(page))
}

pub async fn get_review(
    State(pool): State<DbPool>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Review>, AppError> {
    let review = review_service::get(&pool, user.id, id).await?;
    Ok(Json(review))
}

pub async fn update_review(
    State(pool): State<DbPool>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateReviewRequest>,
) -> Result<Json<Review>, AppError> {
    let mut review = review_service::get(&pool, user.id, id).await?;
    let expected_version = request.version;
    request.apply(&mut review);

    let mut v = Validator::new();
    review.validate(&mut v);
    v.finish()?;

    let stamp = review_service::update(&pool, &review, expected_version).await?;
    review.version = stamp.version;
    review.updated_at = stamp.updated_at;

    Ok(Json(review))
}

pub async fn delete_review(
    State(pool): State<DbPool>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    review_service::delete(&pool, user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
