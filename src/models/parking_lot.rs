//! Parking lot data models and API request/response types.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{patch::Patch, validation::Validator};

pub const SORT_SAFELIST: &[&str] = &[
    "id",
    "name",
    "hourly_rate_cents",
    "total_spots",
    "created_at",
    "-id",
    "-name",
    "-hourly_rate_cents",
    "-total_spots",
    "-created_at",
];

pub const MAX_SEARCH_RADIUS_KM: f64 = 100.0;

/// Represents a parking lot record from the database.
///
/// # Rates
///
/// All rates are stored as `i64` cents. Only the hourly rate is mandatory;
/// it is also what reservations and sessions are billed with.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ParkingLot {
    pub id: Uuid,

    /// User that manages the lot and its spots.
    pub owner_id: Uuid,

    pub name: String,

    pub address: String,

    pub latitude: f64,

    pub longitude: f64,

    pub total_spots: i32,

    pub hourly_rate_cents: i64,

    pub daily_rate_cents: Option<i64>,

    pub monthly_rate_cents: Option<i64>,

    pub open_time: NaiveTime,

    pub close_time: NaiveTime,

    /// Inactive lots are hidden from public listings and refuse reservations.
    pub is_active: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    pub version: i32,
}

impl ParkingLot {
    pub fn validate(&self, v: &mut Validator) {
        LotFields {
            name: &self.name,
            address: &self.address,
            latitude: self.latitude,
            longitude: self.longitude,
            total_spots: self.total_spots,
            hourly_rate_cents: self.hourly_rate_cents,
            daily_rate_cents: self.daily_rate_cents,
            monthly_rate_cents: self.monthly_rate_cents,
            open_time: self.open_time,
            close_time: self.close_time,
        }
        .validate(v);
    }
}

struct LotFields<'a> {
    name: &'a str,
    address: &'a str,
    latitude: f64,
    longitude: f64,
    total_spots: i32,
    hourly_rate_cents: i64,
    daily_rate_cents: Option<i64>,
    monthly_rate_cents: Option<i64>,
    open_time: NaiveTime,
    close_time: NaiveTime,
}

impl LotFields<'_> {
    fn validate(&self, v: &mut Validator) {
        v.check_required_text(self.name, "name", 100);
        v.check_required_text(self.address, "address", 255);
        v.check_range(self.latitude, -90.0, 90.0, "latitude");
        v.check_range(self.longitude, -180.0, 180.0, "longitude");
        v.check_range(self.total_spots, 1, 10_000, "total_spots");
        v.check_range(self.hourly_rate_cents, 0, 100_000, "hourly_rate_cents");
        if let Some(daily) = self.daily_rate_cents {
            v.check_range(daily, 0, 1_000_000, "daily_rate_cents");
        }
        if let Some(monthly) = self.monthly_rate_cents {
            v.check_range(monthly, 0, 10_000_000, "monthly_rate_cents");
        }
        v.check(
            self.close_time > self.open_time,
            "close_time",
            "must be after open_time",
        );
    }
}

/// Request body for `POST /v1/parking-lots`.
///
/// # JSON Example
///
/// ```json
/// {
///   "name": "Main Street Garage",
///   "address": "12 Main Street",
///   "latitude": 6.9271,
///   "longitude": 79.8612,
///   "total_spots": 120,
///   "hourly_rate_cents": 250,
///   "daily_rate_cents": 1800,
///   "open_time": "06:00:00",
///   "close_time": "23:00:00"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateParkingLotRequest {
    pub name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub total_spots: i32,
    pub hourly_rate_cents: i64,
    pub daily_rate_cents: Option<i64>,
    pub monthly_rate_cents: Option<i64>,
    pub open_time: NaiveTime,
    pub close_time: NaiveTime,
}

impl CreateParkingLotRequest {
    pub fn validate(&self, v: &mut Validator) {
        LotFields {
            name: &self.name,
            address: &self.address,
            latitude: self.latitude,
            longitude: self.longitude,
            total_spots: self.total_spots,
            hourly_rate_cents: self.hourly_rate_cents,
            daily_rate_cents: self.daily_rate_cents,
            monthly_rate_cents: self.monthly_rate_cents,
            open_time: self.open_time,
            close_time: self.close_time,
        }
        .validate(v);
    }
}

/// Request body for `PATCH /v1/parking-lots/{id}`.
#[derive(Debug, Deserialize)]
pub struct UpdateParkingLotRequest {
    pub version: i32,
    pub name: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub total_spots: Option<i32>,
    pub hourly_rate_cents: Option<i64>,
    #[serde(default)]
    pub daily_rate_cents: Patch<i64>,
    #[serde(default)]
    pub monthly_rate_cents: Patch<i64>,
    pub open_time: Option<NaiveTime>,
    pub close_time: Option<NaiveTime>,
    pub is_active: Option<bool>,
}

impl UpdateParkingLotRequest {
    pub fn apply(self, lot: &mut ParkingLot) {
        if let Some(name) = self.name {
            lot.name = name;
        }
        if let Some(address) = self.address {
            lot.address = address;
        }
        if let Some(latitude) = self.latitude {
            lot.latitude = latitude;
        }
        if let Some(longitude) = self.longitude {
            lot.longitude = longitude;
        }
        if let Some(total_spots) = self.total_spots {
            lot.total_spots = total_spots;
        }
        if let Some(rate) = self.hourly_rate_cents {
            lot.hourly_rate_cents = rate;
        }
        self.daily_rate_cents.apply_to(&mut lot.daily_rate_cents);
        self.monthly_rate_cents.apply_to(&mut lot.monthly_rate_cents);
        if let Some(open_time) = self.open_time {
            lot.open_time = open_time;
        }
        if let Some(close_time) = self.close_time {
            lot.close_time = close_time;
        }
        if let Some(is_active) = self.is_active {
            lot.is_active = is_active;
        }
    }
}

/// Query string for `GET /v1/parking-lots/search`.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "default_radius_km")]
    pub radius_km: f64,
}

fn default_radius_km() -> f64 {
    5.0
}

impl SearchQuery {
    pub fn validate(&self, v: &mut Validator) {
        v.check_range(self.latitude, -90.0, 90.0, "latitude");
        v.check_range(self.longitude, -180.0, 180.0, "longitude");
        v.check(
            self.radius_km > 0.0 && self.radius_km <= MAX_SEARCH_RADIUS_KM,
            "radius_km",
            "must be greater than 0 and at most 100",
        );
    }
}

/// A search hit: the lot plus its great-circle distance from the query point.
#[derive(Debug, sqlx::FromRow, Serialize)]
pub struct NearbyParkingLot {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub lot: ParkingLot,

    pub distance_km: f64,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub parking_lot_id: Uuid,
    pub total_spots: i32,
    pub available_spots: i64,
}

/// Query string for `GET /v1/parking-lots/{id}/revenue`.
#[derive(Debug, Deserialize)]
pub struct RevenueQuery {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl RevenueQuery {
    pub fn validate(&self, v: &mut Validator) {
        v.check(self.to > self.from, "to", "must be after from");
    }
}

#[derive(Debug, Serialize)]
pub struct RevenueReport {
    pub parking_lot_id: Uuid,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub total_revenue_cents: i64,
    pub payment_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    fn request() -> CreateParkingLotRequest {
        serde_json::from_str(
            r#"{
                "name": "Main Street Garage",
                "address": "12 Main Street",
                "latitude": 6.9271,
                "longitude": 79.8612,
                "total_spots": 120,
                "hourly_rate_cents": 250,
                "open_time": "06:00:00",
                "close_time": "23:00:00"
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn valid_lot_passes() {
        let mut v = Validator::new();
        request().validate(&mut v);
        assert!(v.is_valid());
    }

    #[test]
    fn closing_before_opening_is_rejected() {
        let mut req = request();
        req.close_time = NaiveTime::from_hms_opt(5, 0, 0).unwrap();

        let mut v = Validator::new();
        req.validate(&mut v);
        let Err(AppError::Validation(errors)) = v.finish() else {
            panic!("expected validation error");
        };
        assert_eq!(errors.get("close_time"), Some("must be after open_time"));
    }

    #[test]
    fn coordinates_and_rates_are_bounded() {
        let mut req = request();
        req.latitude = 91.0;
        req.hourly_rate_cents = -1;
        req.monthly_rate_cents = Some(10_000_001);

        let mut v = Validator::new();
        req.validate(&mut v);
        let Err(AppError::Validation(errors)) = v.finish() else {
            panic!("expected validation error");
        };
        assert!(errors.get("latitude").is_some());
        assert!(errors.get("hourly_rate_cents").is_some());
        assert!(errors.get("monthly_rate_cents").is_some());
        assert!(errors.get("longitude").is_none());
    }

    #[test]
    fn search_radius_must_be_positive_and_bounded() {
        for (radius, ok) in [(0.0, false), (0.5, true), (100.0, true), (100.1, false)] {
            let query = SearchQuery {
                latitude: 0.0,
                longitude: 0.0,
                radius_km: radius,
            };
            let mut v = Validator::new();
            query.validate(&mut v);
            assert_eq!(v.is_valid(), ok, "radius {radius}");
        }
    }
}
