//! QR code records and the identity payload they carry.
//!
//! The payload is a snapshot taken at issuance. Later profile or vehicle
//! edits do not change what an already-issued code verifies to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{user::User, validation::Validator, vehicle::Vehicle};

pub const PURPOSES: &[&str] = &["parking", "identification", "emergency"];

pub const DEFAULT_EXPIRY_HOURS: i64 = 24;
pub const MAX_EXPIRY_HOURS: i64 = 168;

/// Represents a `qr_codes` row.
///
/// # Lifecycle
///
/// A row is created active. It stops verifying when either `expires_at`
/// passes or a newer code is issued for the same user (which clears
/// `is_active`). The database allows at most one active row per user.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct QrCode {
    pub id: Uuid,
    pub user_id: Uuid,
    pub vehicle_id: Uuid,
    /// 32 URL-safe characters, unique (`qr_codes_code_key`).
    pub code: String,
    /// Serialized [`QrCodeData`].
    pub data: String,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
}

/// Snapshot embedded in a code and returned on verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrCodeData {
    pub user_profile: UserProfile,
    pub vehicle: VehicleData,
    pub qr_info: QrCodeInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub mobile_number: Option<String>,
    pub email: String,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            mobile_number: user.mobile_number.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleData {
    pub id: Uuid,
    pub license_plate: String,
    pub make: String,
    pub model: String,
    pub color: String,
    pub vehicle_type: String,
}

impl From<&Vehicle> for VehicleData {
    fn from(vehicle: &Vehicle) -> Self {
        Self {
            id: vehicle.id,
            license_plate: vehicle.license_plate.clone(),
            make: vehicle.make.clone(),
            model: vehicle.model.clone(),
            color: vehicle.color.clone(),
            vehicle_type: vehicle.vehicle_type.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrCodeInfo {
    pub code: String,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub purpose: String,
}

/// Request body for `POST /v1/qr-codes/generate`.
///
/// # JSON Example
///
/// ```json
/// {
///   "vehicle_id": "550e8400-e29b-41d4-a716-446655440000",
///   "expiry_hours": 12,
///   "purpose": "parking"
/// }
/// ```
///
/// # Validation
///
/// - `purpose`: one of `parking`, `identification`, `emergency`
/// - `expiry_hours`: optional, 1 to 168 (7 days), defaults to 24
#[derive(Debug, Deserialize)]
pub struct GenerateQrCodeRequest {
    pub vehicle_id: Uuid,

    #[serde(default = "default_expiry_hours")]
    pub expiry_hours: i64,

    pub purpose: String,
}

fn default_expiry_hours() -> i64 {
    DEFAULT_EXPIRY_HOURS
}

impl GenerateQrCodeRequest {
    pub fn validate(&self, v: &mut Validator) {
        v.check_permitted(&self.purpose, PURPOSES, "purpose");
        v.check(
            (1..=MAX_EXPIRY_HOURS).contains(&self.expiry_hours),
            "expiry_hours",
            "must be between 1 and 168 hours (7 days)",
        );
    }
}

/// Request body for `POST /v1/qr-codes/verify`.
#[derive(Debug, Deserialize)]
pub struct VerifyQrCodeRequest {
    #[serde(default)]
    pub code: String,
}

impl VerifyQrCodeRequest {
    pub fn validate(&self, v: &mut Validator) {
        v.check(!self.code.is_empty(), "code", "must be provided");
    }
}

/// Everything the caller needs after issuing a code.
#[derive(Debug, Serialize)]
pub struct IssuedQrCode {
    pub qr_code: QrCode,
    pub qr_data: QrCodeData,
    pub image_url: String,
    pub verify_url: String,
}

/// Response body for `POST /v1/qr-codes/generate` (201 Created).
#[derive(Debug, Serialize)]
pub struct GenerateQrCodeResponse {
    #[serde(flatten)]
    pub issued: IssuedQrCode,
    pub message: &'static str,
}

/// Response body for `POST /v1/qr-codes/verify`.
#[derive(Debug, Serialize)]
pub struct VerifyQrCodeResponse {
    pub qr_data: QrCodeData,
    pub message: &'static str,
}

/// Response body for `GET /v1/qr-codes`.
#[derive(Debug, Serialize)]
pub struct QrCodeList {
    pub count: usize,
    pub qr_codes: Vec<QrCode>,
}

impl From<Vec<QrCode>> for QrCodeList {
    fn from(qr_codes: Vec<QrCode>) -> Self {
        Self {
            count: qr_codes.len(),
            qr_codes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_defaults_to_24_hours() {
        let request: GenerateQrCodeRequest = serde_json::from_str(
            r#"{ "vehicle_id": "550e8400-e29b-41d4-a716-446655440000", "purpose": "parking" }"#,
        )
        .unwrap();

        assert_eq!(request.expiry_hours, 24);
        let mut v = Validator::new();
        request.validate(&mut v);
        assert!(v.is_valid());
    }

    #[test]
    fn expiry_and_purpose_bounds() {
        for (hours, purpose, ok) in [
            (1, "parking", true),
            (168, "emergency", true),
            (0, "parking", false),
            (169, "identification", false),
            (24, "valet", false),
        ] {
            let request = GenerateQrCodeRequest {
                vehicle_id: Uuid::nil(),
                expiry_hours: hours,
                purpose: purpose.to_string(),
            };
            let mut v = Validator::new();
            request.validate(&mut v);
            assert_eq!(v.is_valid(), ok, "{hours}h {purpose}");
        }
    }

    #[test]
    fn missing_code_fails_validation_not_deserialization() {
        let request: VerifyQrCodeRequest = serde_json::from_str("{}").unwrap();
        let mut v = Validator::new();
        request.validate(&mut v);
        assert!(!v.is_valid());
    }

    #[test]
    fn payload_survives_a_storage_round_trip() {
        let now = Utc::now();
        let data = QrCodeData {
            user_profile: UserProfile {
                id: Uuid::new_v4(),
                username: "ada".into(),
                first_name: Some("Ada".into()),
                last_name: None,
                mobile_number: None,
                email: "ada@example.com".into(),
            },
            vehicle: VehicleData {
                id: Uuid::new_v4(),
                license_plate: "CAB-1234".into(),
                make: "Toyota".into(),
                model: "Corolla".into(),
                color: "Blue".into(),
                vehicle_type: "car".into(),
            },
            qr_info: QrCodeInfo {
                code: "A".repeat(32),
                generated_at: now,
                expires_at: now + chrono::Duration::hours(1),
                purpose: "parking".into(),
            },
        };

        let stored = serde_json::to_string(&data).unwrap();
        let restored: QrCodeData = serde_json::from_str(&stored).unwrap();
        assert_eq!(restored, data);
    }
}
