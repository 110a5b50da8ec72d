//! Notification HTTP handlers. Notifications are not versioned.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthUser,
    models::{
        notification::{Notification, NotificationFilter, SORT_SAFELIST, UnreadCount},
        pagination::{Filters, ListQuery, Page},
    },
    services::notification_service,
};

/// `GET /v1/notifications?unread_only=true&page=1`
pub async fn list_notifications(
    State(pool): State<DbPool>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
    Query(filter): Query<NotificationFilter>,
) -> Result<Json<Page<Notification>>, AppError> {
    let filters = Filters::from_query(query, "-created_at", SORT_SAFELIST)?;
    let page = notification_service::list(&pool, user.id, filter.unread_only, &filters).await?;
    Ok(Json(page))
}

pub async fn unread_count(
    State(pool): State<DbPool>,
    user: AuthUser,
) -> Result<Json<UnreadCount>, AppError> {
    let unread_count = notification_service::unread_count(&pool, user.id).await?;
    Ok(Json(UnreadCount { unread_count }))
}

pub async fn mark_read(
    State(pool): State<DbPool>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>, AppError> {
    let notification = notification_service::mark_read(&pool, user.id, id).await?;
    Ok(Json(notification))
}

/// Responds with `{"updated": n}`.
pub async fn mark_all_read(
    State(pool): State<DbPool>,
    user: AuthUser,
) -> Result<Json<Value>, AppError> {
    let updated = notification_service::mark_all_read(&pool, user.id).await?;
    Ok(Json(json!({ "updated": updated })))
}

pub async fn delete_notification(
    State(pool): State<DbPool>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    notification_service::delete(&pool, user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Responds with `{"deleted": n}`.
pub async fn delete_all_notifications(
    State(pool): State<DbPool>,
    user: AuthUser,
) -> Result<Json<Value>, AppError> {
    let deleted = notification_service::delete_all(&pool, user.id).await?;
    Ok(Json(json!({ "deleted": deleted })))
}
