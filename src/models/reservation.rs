//! Reservation data models, request types and billing arithmetic.
//!
//! # Lifecycle
//!
//! ```text
//! pending ──pay──▶ confirmed ──check-in──▶ active ──check-out──▶ completed
//!    │                 │  └──────past end_time──────▶ expired
//!    └─────cancel──────┴──▶ cancelled
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{patch::Patch, validation::Validator};

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_CONFIRMED: &str = "confirmed";
pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_CANCELLED: &str = "cancelled";
pub const STATUS_EXPIRED: &str = "expired";

pub const STATUSES: &[&str] = &[
    STATUS_PENDING,
    STATUS_CONFIRMED,
    STATUS_ACTIVE,
    STATUS_COMPLETED,
    STATUS_CANCELLED,
    STATUS_EXPIRED,
];

/// Statuses in which times and spot may still be changed or the booking cancelled.
pub const MODIFIABLE_STATUSES: &[&str] = &[STATUS_PENDING, STATUS_CONFIRMED];

pub const SORT_SAFELIST: &[&str] = &[
    "id",
    "start_time",
    "end_time",
    "status",
    "created_at",
    "-id",
    "-start_time",
    "-end_time",
    "-status",
    "-created_at",
];

/// How far in the past a new reservation may start.
pub const START_GRACE_MINUTES: i64 = 5;
pub const MAX_LENGTH_DAYS: i64 = 30;

/// Represents a reservation record from the database.
///
/// `total_amount_cents` is fixed when the reservation is created or its
/// times change; payments charge exactly this amount.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Reservation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub vehicle_id: Uuid,
    pub parking_lot_id: Uuid,
    pub parking_spot_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub actual_start_time: Option<DateTime<Utc>>,
    pub actual_end_time: Option<DateTime<Utc>>,
    pub status: String,
    pub total_amount_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
}

impl Reservation {
    pub fn is_modifiable(&self) -> bool {
        MODIFIABLE_STATUSES.contains(&self.status.as_str())
    }
}

/// Check a booking window against `now`.
pub fn check_window(
    v: &mut Validator,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    now: DateTime<Utc>,
) {
    v.check(end_time > start_time, "end_time", "must be after start time");
    v.check(
        start_time > now - Duration::minutes(START_GRACE_MINUTES),
        "start_time",
        "cannot be in the past",
    );
    v.check(
        end_time - start_time <= Duration::days(MAX_LENGTH_DAYS),
        "end_time",
        "reservation cannot be longer than 30 days",
    );
}

/// Whole hours between `start` and `end`, rounded up. Zero for empty spans.
pub fn billable_hours(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let seconds = (end - start).num_seconds().max(0);
    (seconds + 3599) / 3600
}

/// Whole minutes between `start` and `end`, rounded up.
pub fn billable_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let seconds = (end - start).num_seconds().max(0);
    (seconds + 59) / 60
}

pub fn total_cents(hourly_rate_cents: i64, start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    hourly_rate_cents.saturating_mul(billable_hours(start, end))
}

/// Request body for `POST /v1/reservations`.
///
/// # JSON Example
///
/// ```json
/// {
///   "vehicle_id": "550e8400-e29b-41d4-a716-446655440000",
///   "parking_lot_id": "660e8400-e29b-41d4-a716-446655440001",
///   "parking_spot_id": null,
///   "start_time": "2026-01-10T09:00:00Z",
///   "end_time": "2026-01-10T11:30:00Z"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateReservationRequest {
    pub vehicle_id: Uuid,
    pub parking_lot_id: Uuid,
    pub parking_spot_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl CreateReservationRequest {
    pub fn validate(&self, v: &mut Validator, now: DateTime<Utc>) {
        check_window(v, self.start_time, self.end_time, now);
    }
}

/// Request body for `PATCH /v1/reservations/{id}`.
#[derive(Debug, Deserialize)]
pub struct UpdateReservationRequest {
    pub version: i32,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub parking_spot_id: Patch<Uuid>,
}

impl UpdateReservationRequest {
    pub fn apply(self, reservation: &mut Reservation) {
        if let Some(start_time) = self.start_time {
            reservation.start_time = start_time;
        }
        if let Some(end_time) = self.end_time {
            reservation.end_time = end_time;
        }
        self.parking_spot_id.apply_to(&mut reservation.parking_spot_id);
    }
}

/// Optional `?status=` filter on reservation listings.
#[derive(Debug, Default, Deserialize)]
pub struct StatusFilter {
    pub status: Option<String>,
}

impl StatusFilter {
    pub fn validate(&self, v: &mut Validator) {
        if let Some(status) = &self.status {
            v.check_permitted(status, STATUSES, "status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 10, h, m, s).unwrap()
    }

    #[test]
    fn partial_hours_round_up() {
        assert_eq!(billable_hours(at(9, 0, 0), at(11, 30, 0)), 3);
        assert_eq!(billable_hours(at(9, 0, 0), at(10, 0, 0)), 1);
        assert_eq!(billable_hours(at(9, 0, 0), at(9, 0, 1)), 1);
        assert_eq!(billable_hours(at(9, 0, 0), at(9, 0, 0)), 0);
    }

    #[test]
    fn total_is_rate_times_rounded_hours() {
        assert_eq!(total_cents(250, at(9, 0, 0), at(11, 30, 0)), 750);
    }

    #[test]
    fn minutes_round_up() {
        assert_eq!(billable_minutes(at(9, 0, 0), at(9, 44, 1)), 45);
        assert_eq!(billable_minutes(at(9, 0, 0), at(9, 45, 0)), 45);
    }

    #[test]
    fn window_rules() {
        let now = at(9, 0, 0);

        let mut v = Validator::new();
        check_window(&mut v, at(8, 56, 0), at(10, 0, 0), now);
        assert!(v.is_valid(), "start within the grace period is allowed");

        let mut v = Validator::new();
        check_window(&mut v, at(8, 50, 0), at(10, 0, 0), now);
        assert!(!v.is_valid());

        let mut v = Validator::new();
        check_window(&mut v, at(10, 0, 0), at(10, 0, 0), now);
        assert!(!v.is_valid());

        let mut v = Validator::new();
        check_window(&mut v, at(10, 0, 0), at(10, 0, 0) + Duration::days(31), now);
        assert!(!v.is_valid());
    }

    #[test]
    fn clearing_spot_through_patch() {
        let now = at(9, 0, 0);
        let mut reservation = Reservation {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            vehicle_id: Uuid::new_v4(),
            parking_lot_id: Uuid::new_v4(),
            parking_spot_id: Some(Uuid::new_v4()),
            start_time: at(10, 0, 0),
            end_time: at(12, 0, 0),
            actual_start_time: None,
            actual_end_time: None,
            status: STATUS_CONFIRMED.to_string(),
            total_amount_cents: 500,
            created_at: now,
            updated_at: now,
            version: 3,
        };

        let patch: UpdateReservationRequest =
            serde_json::from_str(r#"{ "version": 3, "parking_spot_id": null }"#).unwrap();
        patch.apply(&mut reservation);

        assert_eq!(reservation.parking_spot_id, None);
        assert!(reservation.is_modifiable());
    }
}
