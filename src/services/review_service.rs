//! Review service.

use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        pagination::{Filters, Page, collect_page},
        review::{CreateReviewRequest, RatingSummary, Review},
    },
    services::{
        parking_lot_service,
        versioned::{VersionStamp, VersionedUpdate},
    },
};

/// # Errors
///
/// - `NotFound`: Lot does not exist
/// - `Duplicate`: The user already reviewed this lot
pub async fn create(
    pool: &DbPool,
    user_id: Uuid,
    parking_lot_id: Uuid,
    request: CreateReviewRequest,
) -> Result<Review, AppError> {
    parking_lot_service::get(pool, parking_lot_id).await?;

    let review = sqlx::query_as::<_, Review>(
        r#"
        INSERT INTO reviews (user_id, parking_lot_id, rating, comment)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(parking_lot_id)
    .bind(request.rating)
    .bind(request.comment)
    .fetch_one(pool)
    .await
    .map_err(AppError::from_write)?;

    tracing::info!(review_id = %review.id, parking_lot_id = %parking_lot_id, "review created");
    Ok(review)
}

pub async fn list_for_lot(
    pool: &DbPool,
    parking_lot_id: Uuid,
    filters: &Filters,
) -> Result<Page<Review>, AppError> {
    let sql = format!(
        r#"
        SELECT count(*) OVER() AS total_records, *
        FROM reviews
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

pub async fn list_for_user(
    pool: &DbPool,
    user_id: Uuid,
    filters: &Filters,
) -> Result<Page<Review>, AppError> {
    let sql = format!(
        r#"
        SELECT count(*) OVER() AS total_records, *
        FROM reviews
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

pub async fn get(pool: &DbPool, user_id: Uuid, id: Uuid) -> Result<Review, AppError> {
    sqlx::query_as::<_, Review>("SELECT * FROM reviews WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("review"))
}

pub async fn update(
    pool: &DbPool,
    review: &Review,
    expected_version: i32,
) -> Result<VersionStamp, AppError> {
    VersionedUpdate::table("reviews")
        .set("rating", review.rating)
        .set("comment", review.comment.clone())
        .execute(pool, review.id, expected_version)
        .await
}

pub async fn delete(pool: &DbPool, user_id: Uuid, id: Uuid) -> Result<(), AppError> {
    let deleted = sqlx::query("DELETE FROM reviews WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?
        .rows_affected();

    if deleted == 0 {
        return Err(AppError::NotFound("review"));
    }

    Ok(())
}

/// Average rating and per-star counts for a lot.
pub async fn rating_summary(pool: &DbPool, parking_lot_id: Uuid) -> Result<RatingSummary, AppError> {
    parking_lot_service::get(pool, parking_lot_id).await?;

    let counts = sqlx::query_as::<_, (i32, i64)>(
        r#"
        SELECT rating, COUNT(*)
        FROM reviews
        WHERE parking_lot_id = $1
        GROUP BY rating
        "#,
    )
    .bind(parking_lot_id)
    .fetch_all(pool)
    .await?;

    Ok(RatingSummary::from_counts(parking_lot_id, &counts))
}
