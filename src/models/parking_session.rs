//! Parking session data models and API request types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::validation::Validator;

pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_VIOLATED: &str = "violated";

pub const STATUSES: &[&str] = &[STATUS_ACTIVE, STATUS_COMPLETED, STATUS_VIOLATED];

pub const SORT_SAFELIST: &[&str] = &[
    "id",
    "check_in_time",
    "check_out_time",
    "status",
    "-id",
    "-check_in_time",
    "-check_out_time",
    "-status",
];

/// A vehicle physically occupying a spot.
///
/// Sessions may stand alone (drive-up parking) or follow a reservation.
/// Duration and amount are filled in at check-out.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ParkingSession {
    pub id: Uuid,
    pub reservation_id: Option<Uuid>,
    pub user_id: Uuid,
    pub vehicle_id: Uuid,
    pub parking_spot_id: Uuid,
    pub check_in_time: DateTime<Utc>,
    pub check_out_time: Option<DateTime<Utc>>,
    pub status: String,
    pub total_duration_minutes: Option<i32>,
    pub total_amount_cents: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
}

impl ParkingSession {
    pub fn validate(&self, v: &mut Validator) {
        v.check_permitted(&self.status, STATUSES, "status");
        if self.status == STATUS_COMPLETED {
            v.check(
                self.check_out_time.is_some(),
                "check_out_time",
                "must be provided for a completed session",
            );
        }
        if let Some(check_out_time) = self.check_out_time {
            v.check(
                check_out_time > self.check_in_time,
                "check_out_time",
                "must be after check-in time",
            );
        }
    }
}

/// Request body for `POST /v1/sessions`.
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub vehicle_id: Uuid,
    pub parking_spot_id: Uuid,
    pub reservation_id: Option<Uuid>,
}

/// Request body for `PATCH /v1/sessions/{id}`.
///
/// Corrects the check-out time of a completed session. Status only moves
/// through check-out and violation, so it is not accepted here.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateSessionRequest {
    pub version: i32,
    pub check_out_time: Option<DateTime<Utc>>,
}

impl UpdateSessionRequest {
    pub fn apply(self, session: &mut ParkingSession) {
        if let Some(check_out_time) = self.check_out_time {
            session.check_out_time = Some(check_out_time);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session() -> ParkingSession {
        let now = Utc::now();
        ParkingSession {
            id: Uuid::new_v4(),
            reservation_id: None,
            user_id: Uuid::new_v4(),
            vehicle_id: Uuid::new_v4(),
            parking_spot_id: Uuid::new_v4(),
            check_in_time: now,
            check_out_time: None,
            status: STATUS_ACTIVE.to_string(),
            total_duration_minutes: None,
            total_amount_cents: None,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    #[test]
    fn check_out_before_check_in_is_rejected() {
        let mut session = session();
        let patch = UpdateSessionRequest {
            version: 1,
            check_out_time: Some(session.check_in_time - Duration::minutes(1)),
        };
        patch.apply(&mut session);

        let mut v = Validator::new();
        session.validate(&mut v);
        assert!(!v.is_valid());
    }

    #[test]
    fn status_cannot_be_patched() {
        let result = serde_json::from_str::<UpdateSessionRequest>(
            r#"{ "version": 2, "status": "completed" }"#,
        );
        assert!(result.is_err());

        let request: UpdateSessionRequest =
            serde_json::from_str(r#"{ "version": 2, "check_out_time": "2026-01-10T12:00:00Z" }"#)
                .unwrap();
        assert!(request.check_out_time.is_some());
    }

    #[test]
    fn completed_session_needs_a_check_out_time() {
        let mut session = session();
        session.status = STATUS_COMPLETED.to_string();

        let mut v = Validator::new();
        session.validate(&mut v);
        assert!(!v.is_valid());
    }

    #[test]
    fn unknown_status_is_rejected() {
        let mut session = session();
        session.status = "parked".to_string();

        let mut v = Validator::new();
        session.validate(&mut v);
        assert!(!v.is_valid());
    }
}
