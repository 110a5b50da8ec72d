//! User data models and API request/response types.
//!
//! This module defines:
//! - `User`: Database entity, including the password hash
//! - `RegisterUserRequest`, `UpdateProfileRequest`, `ChangePasswordRequest`,
//!   `CompleteProfileRequest` and the token-driven activation and password
//!   reset bodies
//! - `UserResponse`: what clients see (never the password hash)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{patch::Patch, token, validation::Validator};

pub const ROLE_NORMAL: &str = "normal";
pub const ROLES: &[&str] = &[ROLE_NORMAL, "owner", "admin"];

/// Represents a user record from the database.
///
/// # Database Table
///
/// Maps to the `users` table. Emails are stored lower-cased and are unique
/// (`users_email_key`).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,

    pub email: String,

    pub username: String,

    /// Argon2 PHC string. Never leaves the service layer.
    pub password_hash: String,

    pub first_name: Option<String>,

    pub last_name: Option<String>,

    pub mobile_number: Option<String>,

    /// One of [`ROLES`].
    pub role: String,

    /// Set once the emailed activation token is redeemed. Vehicles and QR
    /// codes need an activated account.
    pub activated: bool,

    /// Set by `POST /v1/users/complete-profile`, which can run only once.
    pub has_completed_onboarding: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Optimistic-concurrency version, starts at 1.
    pub version: i32,
}

impl User {
    /// Validate profile fields after a patch has been applied.
    pub fn validate(&self, v: &mut Validator) {
        v.check_email(&self.email);
        validate_username(v, &self.username);

        for (field, value, max) in [
            ("first_name", &self.first_name, 100),
            ("last_name", &self.last_name, 100),
            ("mobile_number", &self.mobile_number, 20),
        ] {
            if let Some(value) = value {
                v.check_required_text(value, field, max);
            }
        }
        v.check_permitted(&self.role, ROLES, "role");
    }
}

pub fn validate_username(v: &mut Validator, username: &str) {
    v.check_required_text(username, "username", 500);
}

pub fn validate_password(v: &mut Validator, password: &str, field: &'static str) {
    v.check(!password.is_empty(), field, "must be provided");
    v.check(password.len() >= 8, field, "must be at least 8 bytes long");
    v.check(password.len() <= 72, field, "must not be more than 72 bytes long");
}

/// Request body for `POST /v1/users`.
///
/// # JSON Example
///
/// ```json
/// {
///   "username": "ada",
///   "email": "ada@example.com",
///   "password": "correct horse battery"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct RegisterUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl RegisterUserRequest {
    pub fn validate(&self, v: &mut Validator) {
        validate_username(v, &self.username);
        v.check_email(&self.email);
        validate_password(v, &self.password, "password");
    }
}

/// Request body for `POST /v1/auth/tokens/authentication`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(&self, v: &mut Validator) {
        v.check_email(&self.email);
        v.check(!self.password.is_empty(), "password", "must be provided");
    }
}

/// Request body for `PATCH /v1/users/profile`.
///
/// `version` is the value from the last profile the client fetched. Name
/// and mobile fields are nullable: send `null` to clear them.
#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub version: i32,

    pub username: Option<String>,

    pub email: Option<String>,

    #[serde(default)]
    pub first_name: Patch<String>,

    #[serde(default)]
    pub last_name: Patch<String>,

    #[serde(default)]
    pub mobile_number: Patch<String>,
}

impl UpdateProfileRequest {
    /// Merge the requested changes into `user`.
    pub fn apply(self, user: &mut User) {
        if let Some(username) = self.username {
            user.username = username;
        }
        if let Some(email) = self.email {
            user.email = email.to_lowercase();
        }
        self.first_name.apply_to(&mut user.first_name);
        self.last_name.apply_to(&mut user.last_name);
        self.mobile_number.apply_to(&mut user.mobile_number);
    }
}

/// Request body for `PUT /v1/users/password`.
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub version: i32,
}

impl ChangePasswordRequest {
    pub fn validate(&self, v: &mut Validator) {
        v.check(
            !self.current_password.is_empty(),
            "current_password",
            "must be provided",
        );
        validate_password(v, &self.new_password, "new_password");
    }
}

/// Request body for `POST /v1/users/complete-profile`.
#[derive(Debug, Deserialize)]
pub struct CompleteProfileRequest {
    pub first_name: String,
    pub last_name: String,
    pub mobile_number: Option<String>,
}

impl CompleteProfileRequest {
    pub fn validate(&self, v: &mut Validator) {
        v.check_required_text(&self.first_name, "first_name", 100);
        v.check_required_text(&self.last_name, "last_name", 100);
        if let Some(mobile_number) = &self.mobile_number {
            v.check_required_text(mobile_number, "mobile_number", 20);
        }
    }
}

/// Request body for `PUT /v1/users/activated`.
#[derive(Debug, Deserialize)]
pub struct ActivateUserRequest {
    pub token: String,
}

impl ActivateUserRequest {
    pub fn validate(&self, v: &mut Validator) {
        token::validate_plaintext(v, &self.token);
    }
}

/// Request body for `POST /v1/auth/tokens/password-reset-request`.
#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

/// Request body for `PUT /v1/users/password-reset`.
#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub password: String,
    pub token: String,
}

impl ResetPasswordRequest {
    pub fn validate(&self, v: &mut Validator) {
        validate_password(v, &self.password, "password");
        token::validate_plaintext(v, &self.token);
    }
}

/// Response body for user endpoints.
///
/// # JSON Example
///
/// ```json
/// {
///   "id": "550e8400-e29b-41d4-a716-446655440000",
///   "email": "ada@example.com",
///   "username": "ada",
///   "first_name": "Ada",
///   "last_name": null,
///   "mobile_number": null,
///   "role": "normal",
///   "activated": true,
///   "has_completed_onboarding": false,
///   "created_at": "2026-01-10T10:00:00Z",
///   "updated_at": "2026-01-10T10:00:00Z",
///   "version": 1
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub mobile_number: Option<String>,
    pub role: String,
    pub activated: bool,
    pub has_completed_onboarding: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
}

/// Convert database User to API UserResponse.
///
/// This transformation drops `password_hash`.
impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            mobile_number: user.mobile_number,
            role: user.role,
            activated: user.activated,
            has_completed_onboarding: user.has_completed_onboarding,
            created_at: user.created_at,
            updated_at: user.updated_at,
            version: user.version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: "grace@example.com".to_string(),
            username: "grace".to_string(),
            password_hash: "$argon2id$v=19$...".to_string(),
            first_name: Some("Grace".to_string()),
            last_name: Some("Hopper".to_string()),
            mobile_number: Some("+15550100".to_string()),
            role: ROLE_NORMAL.to_string(),
            activated: true,
            has_completed_onboarding: false,
            created_at: now,
            updated_at: now,
            version: 2,
        }
    }

    #[test]
    fn profile_patch_clears_and_replaces_fields() {
        let request: UpdateProfileRequest = serde_json::from_str(
            r#"{ "version": 2, "email": "Grace@Example.COM", "mobile_number": null }"#,
        )
        .unwrap();

        let mut user = user();
        request.apply(&mut user);

        assert_eq!(user.email, "grace@example.com");
        assert_eq!(user.mobile_number, None);
        assert_eq!(user.first_name.as_deref(), Some("Grace"));
        assert_eq!(user.username, "grace");
    }

    #[test]
    fn version_is_required_on_profile_updates() {
        let result = serde_json::from_str::<UpdateProfileRequest>(r#"{ "username": "g" }"#);
        assert!(result.is_err());
    }

    #[test]
    fn short_password_is_rejected() {
        let request = RegisterUserRequest {
            username: "ada".into(),
            email: "ada@example.com".into(),
            password: "short".into(),
        };
        let mut v = Validator::new();
        request.validate(&mut v);

        let Err(crate::error::AppError::Validation(errors)) = v.finish() else {
            panic!("expected validation error");
        };
        assert_eq!(errors.get("password"), Some("must be at least 8 bytes long"));
    }

    #[test]
    fn complete_profile_needs_both_names() {
        let request: CompleteProfileRequest =
            serde_json::from_str(r#"{ "first_name": "Grace", "last_name": " " }"#).unwrap();
        let mut v = Validator::new();
        request.validate(&mut v);

        let Err(crate::error::AppError::Validation(errors)) = v.finish() else {
            panic!("expected validation error");
        };
        assert_eq!(errors.get("last_name"), Some("must be provided"));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn reset_password_checks_token_and_password() {
        let request = ResetPasswordRequest {
            password: "short".into(),
            token: "not-a-token".into(),
        };
        let mut v = Validator::new();
        request.validate(&mut v);

        let Err(crate::error::AppError::Validation(errors)) = v.finish() else {
            panic!("expected validation error");
        };
        assert!(errors.get("password").is_some());
        assert!(errors.get("token").is_some());
    }

    #[test]
    fn response_omits_password_hash() {
        let json = serde_json::to_value(UserResponse::from(user())).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["version"], 2);
        assert_eq!(json["activated"], true);
    }
}
