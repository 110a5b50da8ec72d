//! In-app notifications.
//!
//! Notifications are written by the services as side effects of business
//! events (payment, cancellation, violations) and are not versioned: the
//! only client-side change is marking them read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::validation::Validator;

pub const TYPE_RESERVATION_REMINDER: &str = "reservation_reminder";
pub const TYPE_PAYMENT_DUE: &str = "payment_due";
pub const TYPE_SESSION_EXPIRING: &str = "session_expiring";
pub const TYPE_RESERVATION_CONFIRMED: &str = "reservation_confirmed";
pub const TYPE_RESERVATION_CANCELLED: &str = "reservation_cancelled";
pub const TYPE_PAYMENT_COMPLETED: &str = "payment_completed";
pub const TYPE_VIOLATION_ALERT: &str = "violation_alert";

pub const TYPES: &[&str] = &[
    TYPE_RESERVATION_REMINDER,
    TYPE_PAYMENT_DUE,
    TYPE_SESSION_EXPIRING,
    TYPE_RESERVATION_CONFIRMED,
    TYPE_RESERVATION_CANCELLED,
    TYPE_PAYMENT_COMPLETED,
    TYPE_VIOLATION_ALERT,
];

pub const SORT_SAFELIST: &[&str] = &["id", "created_at", "-id", "-created_at"];

/// Notifications older than this are removed by housekeeping.
pub const RETENTION_DAYS: i32 = 90;

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Stored in the `type` column.
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    /// Free-form context such as the related reservation id.
    pub data: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// A notification about to be inserted.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub kind: &'static str,
    pub title: String,
    pub message: String,
    pub data: Option<Value>,
}

impl NewNotification {
    pub fn new(
        user_id: Uuid,
        kind: &'static str,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            kind,
            title: title.into(),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn validate(&self, v: &mut Validator) {
        v.check_permitted(self.kind, TYPES, "type");
        v.check_required_text(&self.title, "title", 100);
        v.check_required_text(&self.message, "message", 500);
    }
}

/// `?unread_only=true` on `GET /v1/notifications`.
#[derive(Debug, Default, Deserialize)]
pub struct NotificationFilter {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub unread_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_attaches_data() {
        let n = NewNotification::new(
            Uuid::nil(),
            TYPE_PAYMENT_COMPLETED,
            "Payment received",
            "Your payment of 7.50 USD was received",
        )
        .with_data(json!({ "payment_id": Uuid::nil() }));

        assert!(n.data.is_some());
        let mut v = Validator::new();
        n.validate(&mut v);
        assert!(v.is_valid());
    }

    #[test]
    fn overlong_title_is_rejected() {
        let n = NewNotification::new(Uuid::nil(), TYPE_VIOLATION_ALERT, "x".repeat(101), "m");
        let mut v = Validator::new();
        n.validate(&mut v);
        assert!(!v.is_valid());
    }

    #[test]
    fn kind_serializes_as_type() {
        let notification = Notification {
            id: Uuid::nil(),
            user_id: Uuid::nil(),
            kind: TYPE_VIOLATION_ALERT.to_string(),
            title: "Overstay".into(),
            message: "Your session ran past its reservation".into(),
            is_read: false,
            data: None,
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(&notification).unwrap();
        assert_eq!(json["type"], "violation_alert");
        assert!(json.get("kind").is_none());
    }
}
