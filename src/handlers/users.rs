//! User and token HTTP handlers.
//!
//! This module implements the account-related API endpoints:
//! - POST /v1/users - Register a new user and email an activation token
//! - PUT /v1/users/activated - Redeem the activation token
//! - POST /v1/auth/tokens/authentication - Exchange credentials for a bearer token
//! - POST /v1/auth/tokens/password-reset-request - Email a password-reset token
//! - PUT /v1/users/password-reset - Set a new password with that token
//! - GET /v1/users/profile - The caller's profile
//! - PATCH /v1/users/profile - Versioned profile update
//! - POST /v1/users/complete-profile - One-time onboarding (activated users)
//! - PUT /v1/users/password - Versioned password change

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::{
    app::AppState,
    db::DbPool,
    error::AppError,
    middleware::auth::{ActivatedUser, AuthUser},
    models::{
        token::{SCOPE_AUTHENTICATION, TokenResponse},
        user::{
            ActivateUserRequest, ChangePasswordRequest, CompleteProfileRequest, LoginRequest,
            PasswordResetRequest, RegisterUserRequest, ResetPasswordRequest,
            UpdateProfileRequest, UserResponse,
        },
        validation::Validator,
    },
    services::{
        mailer::{self, Mailer, Message},
        user_service,
        versioned::VersionStamp,
    },
};

/// `{"message": "..."}` for endpoints with nothing else to return.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// Response body for `POST /v1/users/complete-profile`.
#[derive(Debug, Serialize)]
pub struct CompleteProfileResponse {
    pub user: UserResponse,
    pub message: &'static str,
}

/// Register a new user.
///
/// # Endpoint
///
/// `POST /v1/users`
///
/// # Request Body
///
/// ```json
/// {
///   "username": "ada",
///   "email": "ada@example.com",
///   "password": "correct horse battery"
/// }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**: The new user, without the password hash and
///   with `activated: false`. The activation token goes out by email.
/// - **Error (409)**: Email already registered
/// - **Error (422)**: Validation failed
pub async fn register(
    State(pool): State<DbPool>,
    State(mailer): State<Arc<dyn Mailer>>,
    Json(request): Json<RegisterUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    let mut v = Validator::new();
    request.validate(&mut v);
    v.finish()?;

    let (user, activation_token) = user_service::register(&pool, request).await?;

    mailer::deliver(
        mailer.as_ref(),
        &user.email,
        &Message::Welcome {
            username: &user.username,
            activation_token: &activation_token,
        },
    );

    Ok((StatusCode::CREATED, Json(user.into())))
}

/// Activate the account an activation token was issued for.
///
/// # Endpoint
///
/// `PUT /v1/users/activated`
///
/// # Request Body
///
/// ```json
/// { "token": "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08" }
/// ```
///
/// # Response
///
/// - **Success (200 OK)**: The activated user
/// - **Error (422)**: Malformed, unknown or expired token (`token` field)
pub async fn activate_user(
    State(pool): State<DbPool>,
    Json(request): Json<ActivateUserRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let mut v = Validator::new();
    request.validate(&mut v);
    v.finish()?;

    let user = user_service::activate(&pool, &request.token).await?;

    Ok(Json(user.into()))
}

/// Email a password-reset token to an activated account.
///
/// # Endpoint
///
/// `POST /v1/auth/tokens/password-reset-request`
///
/// # Response
///
/// - **Success (202 Accepted)**: `{"message": "..."}`; the token is valid for 45 minutes
/// - **Error (422)**: Invalid email, no such user, or account not activated
pub async fn create_password_reset_token(
    State(pool): State<DbPool>,
    State(mailer): State<Arc<dyn Mailer>>,
    Json(request): Json<PasswordResetRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    let mut v = Validator::new();
    v.check_email(&request.email);
    v.finish()?;

    let (user, reset_token) = user_service::request_password_reset(&pool, &request.email).await?;

    mailer::deliver(
        mailer.as_ref(),
        &user.email,
        &Message::PasswordReset {
            reset_token: &reset_token,
        },
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: "an email will be sent to you containing password reset instructions",
        }),
    ))
}

/// `PUT /v1/users/password-reset` with `{password, token}`.
pub async fn reset_password(
    State(pool): State<DbPool>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let mut v = Validator::new();
    request.validate(&mut v);
    v.finish()?;

    user_service::reset_password(&pool, &request.token, request.password).await?;

    Ok(Json(MessageResponse {
        message: "your password was successfully reset",
    }))
}

/// Exchange email and password for a bearer token.
///
/// # Endpoint
///
/// `POST /v1/auth/tokens/authentication`
///
/// # Response
///
/// - **Success (201 Created)**: `{"authentication_token": {"token", "expiry"}}`
/// - **Error (401)**: `invalid_credentials`
///
/// The plaintext token is only ever returned here. Send it back as
/// `Authorization: Bearer <token>`.
pub async fn create_authentication_token(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), AppError> {
    let mut v = Validator::new();
    request.validate(&mut v);
    v.finish()?;

    let token = user_service::authenticate(
        &state.pool,
        &request.email,
        &request.password,
        state.token_ttl,
        SCOPE_AUTHENTICATION,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(token.into())))
}

pub async fn get_profile(
    State(pool): State<DbPool>,
    user: AuthUser,
) -> Result<Json<UserResponse>, AppError> {
    let user = user_service::get(&pool, user.id).await?;
    Ok(Json(user.into()))
}

/// Partially update the caller's profile.
///
/// # Endpoint
///
/// `PATCH /v1/users/profile`
///
/// # Request Body
///
/// ```json
/// { "version": 3, "first_name": "Ada", "mobile_number": null }
/// ```
///
/// Omitted fields keep their stored value; `null` clears a nullable field.
///
/// # Response
///
/// - **Success (200 OK)**: Updated profile with the incremented `version`
/// - **Error (409)**: `edit_conflict` when `version` is stale, `duplicate` for a taken email
/// - **Error (422)**: Merged profile failed validation
pub async fn update_profile(
    State(pool): State<DbPool>,
    user: AuthUser,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let mut stored = user_service::get(&pool, user.id).await?;
    let expected_version = request.version;
    request.apply(&mut stored);

    let mut v = Validator::new();
    stored.validate(&mut v);
    v.finish()?;

    let stamp = user_service::update_profile(&pool, &stored, expected_version).await?;
    stored.version = stamp.version;
    stored.updated_at = stamp.updated_at;

    Ok(Json(stored.into()))
}

/// One-time onboarding: set first and last name, optionally a mobile number.
///
/// # Endpoint
///
/// `POST /v1/users/complete-profile` (activated users only)
///
/// # Response
///
/// - **Success (200 OK)**: `{"user": {...}, "message": "profile completed successfully"}`
/// - **Error (403)**: Account not activated
/// - **Error (409)**: Profile already completed
/// - **Error (422)**: Validation failed
pub async fn complete_profile(
    State(pool): State<DbPool>,
    ActivatedUser(user): ActivatedUser,
    Json(request): Json<CompleteProfileRequest>,
) -> Result<Json<CompleteProfileResponse>, AppError> {
    let mut v = Validator::new();
    request.validate(&mut v);
    v.finish()?;

    let user = user_service::complete_profile(&pool, user.id, request).await?;

    Ok(Json(CompleteProfileResponse {
        user: user.into(),
        message: "profile completed successfully",
    }))
}

/// `PUT /v1/users/password`
///
/// Responds with the new `version` and `updated_at`.
pub async fn change_password(
    State(pool): State<DbPool>,
    user: AuthUser,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<VersionStamp>, AppError> {
    let mut v = Validator::new();
    request.validate(&mut v);
    v.finish()?;

    let stamp = user_service::change_password(
        &pool,
        user.id,
        request.current_password,
        request.new_password,
        request.version,
    )
    .await?;

    Ok(Json(stamp))
}
