//! Review data models and the per-lot rating summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{patch::Patch, validation::Validator};

pub const SORT_SAFELIST: &[&str] = &[
    "id",
    "rating",
    "created_at",
    "-id",
    "-rating",
    "-created_at",
];

/// A user's rating of a parking lot. One per user per lot
/// (`reviews_user_lot_key`).
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Review {
    pub id: Uuid,
    pub user_id: Uuid,
    pub parking_lot_id: Uuid,
    pub rating: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
}

impl Review {
    pub fn validate(&self, v: &mut Validator) {
        check_fields(v, self.rating, self.comment.as_deref());
    }
}

fn check_fields(v: &mut Validator, rating: i32, comment: Option<&str>) {
    v.check_range(rating, 1, 5, "rating");
    if let Some(comment) = comment {
        v.check(
            comment.chars().count() <= 1000,
            "comment",
            "must not be more than 1000 characters long",
        );
    }
}

/// Request body for `POST /v1/parking-lots/{id}/reviews`.
#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    pub rating: i32,
    pub comment: Option<String>,
}

impl CreateReviewRequest {
    pub fn validate(&self, v: &mut Validator) {
        check_fields(v, self.rating, self.comment.as_deref());
    }
}

/// Request body for `PATCH /v1/reviews/{id}`.
#[derive(Debug, Deserialize)]
pub struct UpdateReviewRequest {
    pub version: i32,
    pub rating: Option<i32>,
    #[serde(default)]
    pub comment: Patch<String>,
}

impl UpdateReviewRequest {
    pub fn apply(self, review: &mut Review) {
        if let Some(rating) = self.rating {
            review.rating = rating;
        }
        self.comment.apply_to(&mut review.comment);
    }
}

/// Response body for `GET /v1/parking-lots/{id}/rating`.
///
/// ```json
/// {
///   "parking_lot_id": "550e8400-e29b-41d4-a716-446655440000",
///   "average": 4.25,
///   "total": 4,
///   "distribution": { "1": 0, "2": 0, "3": 1, "4": 1, "5": 2 }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct RatingSummary {
    pub parking_lot_id: Uuid,
    pub average: f64,
    pub total: i64,
    pub distribution: BTreeMap<i32, i64>,
}

impl RatingSummary {
    /// Build a summary from `(rating, count)` pairs. Ratings with no reviews
    /// still appear with a zero count.
    pub fn from_counts(parking_lot_id: Uuid, counts: &[(i32, i64)]) -> Self {
        let mut distribution: BTreeMap<i32, i64> = (1..=5).map(|rating| (rating, 0)).collect();
        for &(rating, count) in counts {
            if let Some(slot) = distribution.get_mut(&rating) {
                *slot += count;
            }
        }

        let total: i64 = distribution.values().sum();
        let weighted: i64 = distribution
            .iter()
            .map(|(rating, count)| i64::from(*rating) * count)
            .sum();
        let average = if total == 0 {
            0.0
        } else {
            weighted as f64 / total as f64
        };

        Self {
            parking_lot_id,
            average,
            total,
            distribution,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_fills_missing_ratings_and_averages() {
        let summary = RatingSummary::from_counts(Uuid::nil(), &[(5, 2), (4, 1), (3, 1)]);

        assert_eq!(summary.total, 4);
        assert!((summary.average - 4.25).abs() < f64::EPSILON);
        assert_eq!(summary.distribution.len(), 5);
        assert_eq!(summary.distribution[&1], 0);
        assert_eq!(summary.distribution[&5], 2);
    }

    #[test]
    fn summary_of_no_reviews_is_zero() {
        let summary = RatingSummary::from_counts(Uuid::nil(), &[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.average, 0.0);
    }

    #[test]
    fn distribution_serializes_with_string_keys() {
        let summary = RatingSummary::from_counts(Uuid::nil(), &[(2, 3)]);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["distribution"]["2"], 3);
    }

    #[test]
    fn rating_must_be_between_one_and_five() {
        for (rating, ok) in [(0, false), (1, true), (5, true), (6, false)] {
            let mut v = Validator::new();
            CreateReviewRequest {
                rating,
                comment: None,
            }
            .validate(&mut v);
            assert_eq!(v.is_valid(), ok, "rating {rating}");
        }
    }
}
