//! Payment data models and API request types.
//!
//! Amounts are `i64` cents, copied from the reservation at payment time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{patch::Patch, validation::Validator};

pub const METHODS: &[&str] = &["card", "cash", "digital_wallet"];

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_FAILED: &str = "failed";
pub const STATUS_REFUNDED: &str = "refunded";

pub const STATUSES: &[&str] = &[STATUS_PENDING, STATUS_COMPLETED, STATUS_FAILED, STATUS_REFUNDED];

pub const SORT_SAFELIST: &[&str] = &[
    "id",
    "amount_cents",
    "payment_date",
    "status",
    "-id",
    "-amount_cents",
    "-payment_date",
    "-status",
];

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Payment {
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub user_id: Uuid,
    pub amount_cents: i64,
    /// ISO 4217 code, e.g. "USD".
    pub currency: String,
    pub payment_method: String,
    pub status: String,
    /// Processor reference, unique when present (`payments_transaction_id_key`).
    pub transaction_id: Option<String>,
    pub payment_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
}

impl Payment {
    pub fn validate(&self, v: &mut Validator) {
        v.check_permitted(&self.status, STATUSES, "status");
        if let Some(transaction_id) = &self.transaction_id {
            v.check_required_text(transaction_id, "transaction_id", 100);
        }
    }
}

fn check_currency(v: &mut Validator, currency: &str) {
    v.check(
        currency.len() == 3 && currency.chars().all(|c| c.is_ascii_uppercase()),
        "currency",
        "must be a valid 3-letter currency code",
    );
}

/// Request body for `POST /v1/payments`.
///
/// # JSON Example
///
/// ```json
/// {
///   "reservation_id": "550e8400-e29b-41d4-a716-446655440000",
///   "payment_method": "card",
///   "currency": "USD",
///   "transaction_id": "ch_3N8x2a"
/// }
/// ```
///
/// # Validation
///
/// - `payment_method`: one of `card`, `cash`, `digital_wallet`
/// - `currency`: optional, defaults to "USD"
#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub reservation_id: Uuid,

    pub payment_method: String,

    #[serde(default = "default_currency")]
    pub currency: String,

    pub transaction_id: Option<String>,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl CreatePaymentRequest {
    pub fn validate(&self, v: &mut Validator) {
        v.check_permitted(&self.payment_method, METHODS, "payment_method");
        check_currency(v, &self.currency);
        if let Some(transaction_id) = &self.transaction_id {
            v.check_required_text(transaction_id, "transaction_id", 100);
        }
    }
}

/// Request body for `PATCH /v1/payments/{id}`.
#[derive(Debug, Deserialize)]
pub struct UpdatePaymentRequest {
    pub version: i32,
    pub status: Option<String>,
    #[serde(default)]
    pub transaction_id: Patch<String>,
}

impl UpdatePaymentRequest {
    pub fn apply(self, payment: &mut Payment) {
        if let Some(status) = self.status {
            payment.status = status;
        }
        self.transaction_id.apply_to(&mut payment.transaction_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_defaults_to_usd() {
        let request: CreatePaymentRequest = serde_json::from_str(
            r#"{ "reservation_id": "550e8400-e29b-41d4-a716-446655440000", "payment_method": "cash" }"#,
        )
        .unwrap();

        assert_eq!(request.currency, "USD");
        let mut v = Validator::new();
        request.validate(&mut v);
        assert!(v.is_valid());
    }

    #[test]
    fn bad_method_and_currency_are_reported() {
        let request = CreatePaymentRequest {
            reservation_id: Uuid::nil(),
            payment_method: "cheque".into(),
            currency: "us".into(),
            transaction_id: None,
        };
        let mut v = Validator::new();
        request.validate(&mut v);

        let Err(crate::error::AppError::Validation(errors)) = v.finish() else {
            panic!("expected validation error");
        };
        assert!(errors.get("payment_method").is_some());
        assert_eq!(
            errors.get("currency"),
            Some("must be a valid 3-letter currency code")
        );
    }
}
