//! Vehicle data models and API request types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::validation::Validator;

pub const VEHICLE_TYPES: &[&str] = &["car", "motorcycle", "truck", "suv", "van"];

/// Sort keys accepted by `GET /v1/vehicles`.
pub const SORT_SAFELIST: &[&str] = &[
    "id",
    "license_plate",
    "make",
    "model",
    "created_at",
    "-id",
    "-license_plate",
    "-make",
    "-model",
    "-created_at",
];

/// Represents a vehicle record from the database.
///
/// # Database Table
///
/// Maps to the `vehicles` table. License plates are unique across all users
/// (`vehicles_license_plate_key`); at most one vehicle per user has
/// `is_default` set.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Vehicle {
    pub id: Uuid,

    /// Owner. Every query filters on it so users only see their own vehicles.
    pub user_id: Uuid,

    pub license_plate: String,

    pub make: String,

    pub model: String,

    pub color: String,

    /// One of [`VEHICLE_TYPES`].
    pub vehicle_type: String,

    pub is_default: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    pub version: i32,
}

impl Vehicle {
    pub fn validate(&self, v: &mut Validator) {
        check_fields(
            v,
            &self.license_plate,
            &self.make,
            &self.model,
            &self.color,
            &self.vehicle_type,
        );
    }
}

fn check_fields(
    v: &mut Validator,
    license_plate: &str,
    make: &str,
    model: &str,
    color: &str,
    vehicle_type: &str,
) {
    v.check_required_text(license_plate, "license_plate", 20);
    v.check_required_text(make, "make", 50);
    v.check_required_text(model, "model", 50);
    v.check_required_text(color, "color", 30);
    v.check_permitted(vehicle_type, VEHICLE_TYPES, "vehicle_type");
}

/// Request body for `POST /v1/vehicles`.
///
/// # JSON Example
///
/// ```json
/// {
///   "license_plate": "CAB-1234",
///   "make": "Toyota",
///   "model": "Corolla",
///   "color": "Blue",
///   "vehicle_type": "car",
///   "is_default": true
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateVehicleRequest {
    pub license_plate: String,
    pub make: String,
    pub model: String,
    pub color: String,
    pub vehicle_type: String,

    #[serde(default)]
    pub is_default: bool,
}

impl CreateVehicleRequest {
    pub fn validate(&self, v: &mut Validator) {
        check_fields(
            v,
            &self.license_plate,
            &self.make,
            &self.model,
            &self.color,
            &self.vehicle_type,
        );
    }
}

/// Request body for `PATCH /v1/vehicles/{id}`.
///
/// Default selection goes through `PUT /v1/vehicles/{id}/set-default` so
/// the other vehicles are cleared in the same transaction.
#[derive(Debug, Deserialize)]
pub struct UpdateVehicleRequest {
    pub version: i32,
    pub license_plate: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub color: Option<String>,
    pub vehicle_type: Option<String>,
}

impl UpdateVehicleRequest {
    pub fn apply(self, vehicle: &mut Vehicle) {
        if let Some(license_plate) = self.license_plate {
            vehicle.license_plate = license_plate;
        }
        if let Some(make) = self.make {
            vehicle.make = make;
        }
        if let Some(model) = self.model {
            vehicle.model = model;
        }
        if let Some(color) = self.color {
            vehicle.color = color;
        }
        if let Some(vehicle_type) = self.vehicle_type {
            vehicle.vehicle_type = vehicle_type;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[test]
    fn unknown_vehicle_type_is_rejected() {
        let request = CreateVehicleRequest {
            license_plate: "CAB-1234".into(),
            make: "Toyota".into(),
            model: "Corolla".into(),
            color: "Blue".into(),
            vehicle_type: "spaceship".into(),
            is_default: false,
        };
        let mut v = Validator::new();
        request.validate(&mut v);

        let Err(AppError::Validation(errors)) = v.finish() else {
            panic!("expected validation error");
        };
        assert_eq!(
            errors.get("vehicle_type"),
            Some("must be one of: car, motorcycle, truck, suv, van")
        );
    }

    #[test]
    fn long_plate_fails_after_patch() {
        let now = Utc::now();
        let mut vehicle = Vehicle {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            license_plate: "CAB-1234".into(),
            make: "Toyota".into(),
            model: "Corolla".into(),
            color: "Blue".into(),
            vehicle_type: "car".into(),
            is_default: false,
            created_at: now,
            updated_at: now,
            version: 1,
        };

        let patch: UpdateVehicleRequest =
            serde_json::from_str(r#"{ "version": 1, "license_plate": "ABCDEFGHIJKLMNOPQRSTUVWXYZ" }"#)
                .unwrap();
        patch.apply(&mut vehicle);

        let mut v = Validator::new();
        vehicle.validate(&mut v);
        assert!(!v.is_valid());
        assert_eq!(vehicle.make, "Toyota");
    }
}
