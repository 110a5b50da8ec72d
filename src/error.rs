//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::models::validation::ValidationErrors;

/// Application-wide error type.
///
/// # Error Categories
///
/// - **Server Errors**: database, filesystem, serialization and rendering failures
/// - **Authentication Errors**: missing, invalid or expired bearer tokens
/// - **Resource Errors**: requested resources not found (or not owned by the caller)
/// - **Conflicts**: stale versions and uniqueness violations
/// - **Validation Errors**: invalid request data, reported per field
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error, timeout).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored or outgoing JSON payload could not be (de)serialized.
    #[error("Payload error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("QR rendering error: {0}")]
    QrRender(#[from] qrcode::types::QrError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),

    /// The endpoint needs an authenticated user and none was supplied.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("You must be authenticated to access this resource")]
    AuthenticationRequired,

    /// Bearer token is unknown, malformed or expired.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid or missing authentication token")]
    InvalidToken,

    /// Email/password pair did not match.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid authentication credentials")]
    InvalidCredentials,

    /// Requested resource does not exist or does not belong to the caller.
    ///
    /// Returns HTTP 404 Not Found. The payload names the resource kind.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Lookup of a time-limited credential matched nothing live. Unknown,
    /// expired and revoked credentials share this answer.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("{0} not found or expired")]
    NotFoundOrExpired(&'static str),

    /// The caller is authenticated but has not activated their account.
    ///
    /// Returns HTTP 403 Forbidden.
    #[error("Your user account must be activated to access this resource")]
    InactiveAccount,

    /// Version supplied by the caller no longer matches the stored row.
    ///
    /// Returns HTTP 409 Conflict.
    #[error("Unable to update the record due to an edit conflict, please try again")]
    EditConflict,

    /// A uniqueness constraint rejected the write.
    ///
    /// Returns HTTP 409 Conflict.
    #[error("{0}")]
    Duplicate(String),

    /// The resource is not in a state that allows the operation (a spot is
    /// already taken, a reservation was already cancelled).
    ///
    /// Returns HTTP 409 Conflict.
    #[error("{0}")]
    Conflict(String),

    /// One or more fields failed validation.
    ///
    /// Returns HTTP 422 Unprocessable Entity with a per-field map.
    #[error("Request failed validation")]
    Validation(ValidationErrors),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::AuthenticationRequired
            | AppError::InvalidToken
            | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::InactiveAccount => StatusCode::FORBIDDEN,
            AppError::NotFound(_) | AppError::NotFoundOrExpired(_) => StatusCode::NOT_FOUND,
            AppError::EditConflict | AppError::Duplicate(_) | AppError::Conflict(_) => {
                StatusCode::CONFLICT
            }
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Database(_)
            | AppError::Io(_)
            | AppError::Payload(_)
            | AppError::QrRender(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::AuthenticationRequired => "authentication_required",
            AppError::InvalidToken => "invalid_authentication_token",
            AppError::InvalidCredentials => "invalid_credentials",
            AppError::InactiveAccount => "inactive_account",
            AppError::NotFound(_) | AppError::NotFoundOrExpired(_) => "not_found",
            AppError::EditConflict => "edit_conflict",
            AppError::Duplicate(_) => "duplicate",
            AppError::Conflict(_) => "conflict",
            AppError::Validation(_) => "validation_failed",
            AppError::Database(_)
            | AppError::Io(_)
            | AppError::Payload(_)
            | AppError::QrRender(_)
            | AppError::Internal(_) => "internal_error",
        }
    }
}

/// Name of the unique constraint a failed write tripped, if any.
pub fn unique_violation(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => db_err.constraint(),
        _ => None,
    }
}

impl AppError {
    /// Map an INSERT/UPDATE failure, turning known unique constraints into
    /// [`AppError::Duplicate`] with a message the client can act on.
    pub fn from_write(err: sqlx::Error) -> Self {
        let message = match unique_violation(&err) {
            Some("users_email_key") => "a user with this email address already exists",
            Some("vehicles_license_plate_key") => {
                "a vehicle with this license plate already exists"
            }
            Some("parking_spots_lot_spot_number_key") => {
                "a spot with this number already exists in the parking lot"
            }
            Some("reviews_user_lot_key") => "you have already reviewed this parking lot",
            Some("payments_transaction_id_key") => {
                "a payment with this transaction id already exists"
            }
            Some("qr_codes_one_active_per_user") => {
                "another QR code was issued for this user at the same time"
            }
            _ => return AppError::Database(err),
        };
        AppError::Duplicate(message.to_string())
    }

    /// Map a DELETE failure. A row still referenced by reservations,
    /// sessions or payments answers 409 instead of 500.
    pub fn from_delete(err: sqlx::Error, resource: &str) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                AppError::Conflict(format!("{resource} is still referenced by booking history"))
            }
            _ => AppError::Database(err),
        }
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
///
/// Validation failures add a `fields` object mapping each rejected field to
/// its message. Server errors are logged here and answered with a generic
/// message so no internals leak to the client.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let body = match &self {
            AppError::Validation(fields) => json!({
                "error": {
                    "code": code,
                    "message": self.to_string(),
                    "fields": fields,
                }
            }),
            _ if status == StatusCode::INTERNAL_SERVER_ERROR => {
                tracing::error!(error = %self, "request failed");
                json!({
                    "error": {
                        "code": code,
                        "message": "An internal error occurred"
                    }
                })
            }
            _ => json!({
                "error": { "code": code, "message": self.to_string() }
            }),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::validation::Validator;

    #[test]
    fn status_codes_follow_the_taxonomy() {
        assert_eq!(AppError::NotFound("vehicle").status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::EditConflict.status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::Duplicate("a vehicle with this license plate already exists".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(AppError::InvalidToken.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::Database(sqlx::Error::RowNotFound).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn not_found_message_names_the_resource() {
        assert_eq!(AppError::NotFound("parking lot").to_string(), "parking lot not found");
        assert_eq!(
            AppError::NotFoundOrExpired("QR code").to_string(),
            "QR code not found or expired"
        );
        assert_eq!(
            AppError::NotFoundOrExpired("QR code").status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn inactive_account_is_forbidden() {
        assert_eq!(AppError::InactiveAccount.status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::InactiveAccount.code(), "inactive_account");
    }

    #[test]
    fn validation_errors_map_to_422() {
        let mut v = Validator::new();
        v.check(false, "email", "must be provided");
        let err = v.finish().unwrap_err();

        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn non_database_errors_are_not_unique_violations() {
        assert_eq!(unique_violation(&sqlx::Error::RowNotFound), None);
    }
}
