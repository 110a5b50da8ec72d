//! Notification service.
//!
//! Other services insert notifications inside their own transactions with
//! [`insert`] / [`insert_all`], so a notification exists exactly when the
//! business change that caused it was committed.

use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        notification::{NewNotification, Notification},
        pagination::{Filters, Page, collect_page},
    },
};

pub async fn insert(
    conn: &mut PgConnection,
    notification: &NewNotification,
) -> Result<Notification, AppError> {
    let notification = sqlx::query_as::<_, Notification>(
        r#"
        INSERT INTO notifications (user_id, type, title, message, data)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(notification.user_id)
    .bind(notification.kind)
    .bind(&notification.title)
    .bind(&notification.message)
    .bind(&notification.data)
    .fetch_one(conn)
    .await?;

    Ok(notification)
}

/// Insert several notifications on an open connection or transaction.
pub async fn insert_all(
    conn: &mut PgConnection,
    notifications: &[NewNotification],
) -> Result<Vec<Notification>, AppError> {
    let mut inserted = Vec::with_capacity(notifications.len());
    for notification in notifications {
        inserted.push(insert(&mut *conn, notification).await?);
    }
    Ok(inserted)
}

/// Insert a batch in its own transaction: all rows are stored or none.
pub async fn bulk_insert(
    pool: &DbPool,
    notifications: &[NewNotification],
) -> Result<Vec<Notification>, AppError> {
    let mut tx = pool.begin().await?;
    let inserted = insert_all(&mut *tx, notifications).await?;
    tx.commit().await?;

    Ok(inserted)
}

pub async fn list(
    pool: &DbPool,
    user_id: Uuid,
    unread_only: bool,
    filters: &Filters,
) -> Result<Page<Notification>, AppError> {
    let sql = format!(
        r#"
        SELECT count(*) OVER() AS total_records, *
        FROM notifications
        WHERE user_id = $1 AND (NOT $2 OR NOT is_read)
        ORDER BY {}
        LIMIT $3 OFFSET $4
        "#,
        filters.order_by()
    );

    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(unread_only)
        .bind(filters.limit())
        .bind(filters.offset())
        .fetch_all(pool)
        .await?;

    Ok(collect_page(rows, filters)?)
}

pub async fn unread_count(pool: &DbPool, user_id: Uuid) -> Result<i64, AppError> {
    let count = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND NOT is_read",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

pub async fn mark_read(pool: &DbPool, user_id: Uuid, id: Uuid) -> Result<Notification, AppError> {
    sqlx::query_as::<_, Notification>(
        "UPDATE notifications SET is_read = true WHERE id = $1 AND user_id = $2 RETURNING *",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("notification"))
}

/// Returns how many notifications changed state.
pub async fn mark_all_read(pool: &DbPool, user_id: Uuid) -> Result<u64, AppError> {
    let updated =
        sqlx::query("UPDATE notifications SET is_read = true WHERE user_id = $1 AND NOT is_read")
            .bind(user_id)
            .execute(pool)
            .await?
            .rows_affected();

    Ok(updated)
}

pub async fn delete(pool: &DbPool, user_id: Uuid, id: Uuid) -> Result<(), AppError> {
    let deleted = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?
        .rows_affected();

    if deleted == 0 {
        return Err(AppError::NotFound("notification"));
    }

    Ok(())
}

pub async fn delete_all(pool: &DbPool, user_id: Uuid) -> Result<u64, AppError> {
    let deleted = sqlx::query("DELETE FROM notifications WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?
        .rows_affected();

    Ok(deleted)
}

/// Remove notifications older than `days` for every user.
pub async fn delete_older_than(pool: &DbPool, days: i32) -> Result<u64, AppError> {
    let deleted = sqlx::query(
        "DELETE FROM notifications WHERE created_at < NOW() - make_interval(days => $1)",
    )
    .bind(days)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(deleted)
}
