//! Parking spot data models and API request types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::validation::Validator;

pub const SPOT_TYPES: &[&str] = &["regular", "handicapped", "electric", "compact"];

pub const SORT_SAFELIST: &[&str] = &[
    "id",
    "spot_number",
    "spot_type",
    "-id",
    "-spot_number",
    "-spot_type",
];

pub const MAX_BULK_SPOTS: usize = 500;

/// Represents a parking spot record from the database.
///
/// `is_reserved` and `is_occupied` are only flipped by conditional updates
/// guarded on their current value, so two callers can never both claim the
/// same spot.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ParkingSpot {
    pub id: Uuid,
    pub parking_lot_id: Uuid,
    /// Unique within the lot (`parking_spots_lot_spot_number_key`).
    pub spot_number: String,
    pub spot_type: String,
    pub is_occupied: bool,
    pub is_reserved: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
}

impl ParkingSpot {
    pub fn validate(&self, v: &mut Validator) {
        check_fields(v, &self.spot_number, &self.spot_type);
    }
}

fn check_fields(v: &mut Validator, spot_number: &str, spot_type: &str) {
    v.check_required_text(spot_number, "spot_number", 20);
    v.check_permitted(spot_type, SPOT_TYPES, "spot_type");
}

/// Request body for `POST /v1/parking-lots/{id}/spots`.
///
/// ```json
/// { "spot_number": "A-12", "spot_type": "electric" }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct CreateParkingSpotRequest {
    pub spot_number: String,

    #[serde(default = "default_spot_type")]
    pub spot_type: String,
}

fn default_spot_type() -> String {
    "regular".to_string()
}

impl CreateParkingSpotRequest {
    pub fn validate(&self, v: &mut Validator) {
        check_fields(v, &self.spot_number, &self.spot_type);
    }
}

/// Request body for `POST /v1/parking-lots/{id}/spots/bulk`.
#[derive(Debug, Deserialize)]
pub struct BulkCreateSpotsRequest {
    pub spots: Vec<CreateParkingSpotRequest>,
}

impl BulkCreateSpotsRequest {
    /// Validate the batch; per-spot failures are reported for the first bad
    /// entry under `spots`.
    pub fn validate(&self, v: &mut Validator) {
        v.check(!self.spots.is_empty(), "spots", "must contain at least one spot");
        v.check(
            self.spots.len() <= MAX_BULK_SPOTS,
            "spots",
            "must not contain more than 500 spots",
        );

        for (index, spot) in self.spots.iter().enumerate() {
            let mut item = Validator::new();
            spot.validate(&mut item);
            if !item.is_valid() {
                v.add_error("spots", &format!("entry {index} is invalid"));
                break;
            }
        }
    }
}

/// Request body for `PATCH /v1/parking-spots/{id}`.
#[derive(Debug, Deserialize)]
pub struct UpdateParkingSpotRequest {
    pub version: i32,
    pub spot_number: Option<String>,
    pub spot_type: Option<String>,
    pub is_active: Option<bool>,
    pub is_occupied: Option<bool>,
    pub is_reserved: Option<bool>,
}

impl UpdateParkingSpotRequest {
    pub fn apply(self, spot: &mut ParkingSpot) {
        if let Some(spot_number) = self.spot_number {
            spot.spot_number = spot_number;
        }
        if let Some(spot_type) = self.spot_type {
            spot.spot_type = spot_type;
        }
        if let Some(is_active) = self.is_active {
            spot.is_active = is_active;
        }
        if let Some(is_occupied) = self.is_occupied {
            spot.is_occupied = is_occupied;
        }
        if let Some(is_reserved) = self.is_reserved {
            spot.is_reserved = is_reserved;
        }
    }
}

/// Query string for `GET /v1/parking-lots/{id}/spots/available`.
#[derive(Debug, Deserialize)]
pub struct AvailableSpotsQuery {
    pub spot_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spot_type_defaults_to_regular() {
        let request: CreateParkingSpotRequest =
            serde_json::from_str(r#"{ "spot_number": "A-1" }"#).unwrap();
        assert_eq!(request.spot_type, "regular");
    }

    #[test]
    fn empty_bulk_request_is_rejected() {
        let mut v = Validator::new();
        BulkCreateSpotsRequest { spots: vec![] }.validate(&mut v);
        assert!(!v.is_valid());
    }

    #[test]
    fn bulk_request_reports_first_bad_entry() {
        let spots = vec![
            CreateParkingSpotRequest {
                spot_number: "A-1".into(),
                spot_type: "regular".into(),
            },
            CreateParkingSpotRequest {
                spot_number: "".into(),
                spot_type: "regular".into(),
            },
            CreateParkingSpotRequest {
                spot_number: "A-3".into(),
                spot_type: "hovercraft".into(),
            },
        ];

        let mut v = Validator::new();
        BulkCreateSpotsRequest { spots }.validate(&mut v);
        let Err(crate::error::AppError::Validation(errors)) = v.finish() else {
            panic!("expected validation error");
        };
        assert_eq!(errors.get("spots"), Some("entry 1 is invalid"));
    }

    #[test]
    fn oversized_bulk_request_is_rejected() {
        let spots = (0..=MAX_BULK_SPOTS)
            .map(|i| CreateParkingSpotRequest {
                spot_number: format!("S-{i}"),
                spot_type: "regular".into(),
            })
            .collect();

        let mut v = Validator::new();
        BulkCreateSpotsRequest { spots }.validate(&mut v);
        assert!(!v.is_valid());
    }
}
