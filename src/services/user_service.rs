//! User service - registration, activation, credentials and tokens.
//!
//! Password hashing uses Argon2id with default parameters. Hashing and
//! verification are CPU-bound and run on the blocking thread pool.

use anyhow::Context;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sqlx::PgConnection;
use tokio::task;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        token::{self, SCOPE_ACTIVATION, SCOPE_PASSWORD_RESET, Token, hash_token},
        user::{CompleteProfileRequest, RegisterUserRequest, User},
        validation::{Validator, field_error},
    },
    services::versioned::{BUMP_VERSION, VersionStamp, VersionedUpdate},
};

/// Create a new, not yet activated user with the `normal` role, together
/// with the activation token to email them.
///
/// # Errors
///
/// - `Duplicate`: Email address already registered
/// - `Database`: Database error occurred
pub async fn register(
    pool: &DbPool,
    request: RegisterUserRequest,
) -> Result<(User, Token), AppError> {
    let password_hash = hash_password(request.password).await?;

    let mut tx = pool.begin().await?;

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (email, username, password_hash)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(request.email.to_lowercase())
    .bind(request.username)
    .bind(password_hash)
    .fetch_one(&mut *tx)
    .await
    .map_err(AppError::from_write)?;

    let activation = Token::generate(user.id, token::activation_ttl(), SCOPE_ACTIVATION);
    insert_token(&mut tx, &activation).await?;

    tx.commit().await?;

    tracing::info!(user_id = %user.id, "user registered");
    Ok((user, activation))
}

/// Redeem an activation token.
///
/// Every activation token of the user is spent, so a second copy of the
/// email cannot be replayed.
///
/// # Errors
///
/// - `Validation`: Token unknown, expired or already used (`token` field)
pub async fn activate(pool: &DbPool, plaintext: &str) -> Result<User, AppError> {
    let mut tx = pool.begin().await?;

    let Some(user) = lock_for_token(&mut tx, SCOPE_ACTIVATION, plaintext).await? else {
        return Err(field_error("token", "invalid or expired activation token"));
    };

    let sql = format!("UPDATE users SET activated = true, {BUMP_VERSION} WHERE id = $1 RETURNING *");
    let user = sqlx::query_as::<_, User>(&sql)
        .bind(user.id)
        .fetch_one(&mut *tx)
        .await?;

    delete_tokens(&mut tx, SCOPE_ACTIVATION, user.id).await?;

    tx.commit().await?;

    tracing::info!(user_id = %user.id, "user activated");
    Ok(user)
}

/// Issue a password-reset token for an activated account.
///
/// # Errors
///
/// - `Validation`: No user with that email, or the account is not activated
pub async fn request_password_reset(
    pool: &DbPool,
    email: &str,
) -> Result<(User, Token), AppError> {
    let Some(user) = find_by_email(pool, email).await? else {
        return Err(field_error("email", "no matching email address found"));
    };
    if !user.activated {
        return Err(field_error("email", "user account must be activated"));
    }

    let reset = Token::generate(user.id, token::password_reset_ttl(), SCOPE_PASSWORD_RESET);
    let mut conn = pool.acquire().await?;
    insert_token(&mut conn, &reset).await?;

    tracing::info!(user_id = %user.id, "password reset requested");
    Ok((user, reset))
}

/// Set a new password using a password-reset token, then spend every reset
/// token of that user.
///
/// # Errors
///
/// - `Validation`: Token unknown, expired or already used (`token` field)
pub async fn reset_password(
    pool: &DbPool,
    plaintext: &str,
    new_password: String,
) -> Result<(), AppError> {
    let password_hash = hash_password(new_password).await?;

    let mut tx = pool.begin().await?;

    let Some(user) = lock_for_token(&mut tx, SCOPE_PASSWORD_RESET, plaintext).await? else {
        return Err(field_error("token", "invalid or expired password reset token"));
    };

    let sql = format!("UPDATE users SET password_hash = $2, {BUMP_VERSION} WHERE id = $1");
    sqlx::query(&sql)
        .bind(user.id)
        .bind(password_hash)
        .execute(&mut *tx)
        .await?;

    delete_tokens(&mut tx, SCOPE_PASSWORD_RESET, user.id).await?;

    tx.commit().await?;

    tracing::info!(user_id = %user.id, "password reset");
    Ok(())
}

/// Fill in the caller's names once, right after activation.
///
/// # Errors
///
/// - `Conflict`: Profile was already completed
pub async fn complete_profile(
    pool: &DbPool,
    user_id: Uuid,
    request: CompleteProfileRequest,
) -> Result<User, AppError> {
    let sql = format!(
        r#"
        UPDATE users
        SET first_name = $2, last_name = $3, mobile_number = $4,
            has_completed_onboarding = true, {BUMP_VERSION}
        WHERE id = $1 AND NOT has_completed_onboarding
        RETURNING *
        "#
    );
    let updated = sqlx::query_as::<_, User>(&sql)
        .bind(user_id)
        .bind(request.first_name)
        .bind(request.last_name)
        .bind(request.mobile_number)
        .fetch_optional(pool)
        .await?;

    match updated {
        Some(user) => {
            tracing::info!(user_id = %user.id, "profile completed");
            Ok(user)
        }
        None => {
            get(pool, user_id).await?;
            Err(AppError::Conflict(
                "profile has already been completed".to_string(),
            ))
        }
    }
}

async fn insert_token(conn: &mut PgConnection, token: &Token) -> Result<(), AppError> {
    sqlx::query("INSERT INTO tokens (hash, user_id, expiry, scope) VALUES ($1, $2, $3, $4)")
        .bind(&token.hash)
        .bind(token.user_id)
        .bind(token.expiry)
        .bind(token.scope)
        .execute(conn)
        .await?;
    Ok(())
}

async fn delete_tokens(conn: &mut PgConnection, scope: &str, user_id: Uuid) -> Result<u64, AppError> {
    let deleted = sqlx::query("DELETE FROM tokens WHERE scope = $1 AND user_id = $2")
        .bind(scope)
        .bind(user_id)
        .execute(conn)
        .await?
        .rows_affected();
    Ok(deleted)
}

/// Like [`get_for_token`], but locks the user row for the caller's
/// transaction.
async fn lock_for_token(
    conn: &mut PgConnection,
    scope: &str,
    plaintext: &str,
) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT users.*
        FROM users
        INNER JOIN tokens ON tokens.user_id = users.id
        WHERE tokens.hash = $1
          AND tokens.scope = $2
          AND tokens.expiry > NOW()
        FOR UPDATE OF users
        "#,
    )
    .bind(hash_token(plaintext))
    .bind(scope)
    .fetch_optional(conn)
    .await?;

    Ok(user)
}

/// Check an email/password pair and issue a bearer token.
///
/// # Process
///
/// 1. Look up the user by email
/// 2. Verify the password against the stored Argon2 hash
/// 3. Store the SHA-256 of a fresh token and return the plaintext
///
/// # Errors
///
/// - `InvalidCredentials`: Unknown email or wrong password (indistinguishable)
pub async fn authenticate(
    pool: &DbPool,
    email: &str,
    password: &str,
    ttl: chrono::Duration,
    scope: &'static str,
) -> Result<Token, AppError> {
    let Some(user) = find_by_email(pool, email).await? else {
        tracing::warn!("login failed: unknown email");
        return Err(AppError::InvalidCredentials);
    };

    if !verify_password(user.password_hash.clone(), password.to_string()).await? {
        tracing::warn!(user_id = %user.id, "login failed: wrong password");
        return Err(AppError::InvalidCredentials);
    }

    let token = Token::generate(user.id, ttl, scope);
    let mut conn = pool.acquire().await?;
    insert_token(&mut conn, &token).await?;

    tracing::info!(user_id = %user.id, "authentication token issued");
    Ok(token)
}

/// Resolve an unexpired token plaintext to its user.
pub async fn get_for_token(
    pool: &DbPool,
    scope: &str,
    plaintext: &str,
) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT users.*
        FROM users
        INNER JOIN tokens ON tokens.user_id = users.id
        WHERE tokens.hash = $1
          AND tokens.scope = $2
          AND tokens.expiry > NOW()
        "#,
    )
    .bind(hash_token(plaintext))
    .bind(scope)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

pub async fn get(pool: &DbPool, id: Uuid) -> Result<User, AppError> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("user"))
}

async fn find_by_email(pool: &DbPool, email: &str) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(email.to_lowercase())
        .fetch_optional(pool)
        .await?;

    Ok(user)
}

/// Write back the profile fields of `user`.
///
/// # Errors
///
/// - `EditConflict`: `expected_version` is stale
/// - `Duplicate`: New email belongs to another user
pub async fn update_profile(
    pool: &DbPool,
    user: &User,
    expected_version: i32,
) -> Result<VersionStamp, AppError> {
    VersionedUpdate::table("users")
        .set("username", user.username.clone())
        .set("email", user.email.clone())
        .set("first_name", user.first_name.clone())
        .set("last_name", user.last_name.clone())
        .set("mobile_number", user.mobile_number.clone())
        .execute(pool, user.id, expected_version)
        .await
}

/// Replace the password after checking the current one.
///
/// # Errors
///
/// - `Validation`: `current_password` does not match
/// - `EditConflict`: `expected_version` is stale
pub async fn change_password(
    pool: &DbPool,
    user_id: Uuid,
    current_password: String,
    new_password: String,
    expected_version: i32,
) -> Result<VersionStamp, AppError> {
    let user = get(pool, user_id).await?;

    if !verify_password(user.password_hash, current_password).await? {
        let mut v = Validator::new();
        v.add_error("current_password", "is incorrect");
        v.finish()?;
    }

    let password_hash = hash_password(new_password).await?;
    let stamp = VersionedUpdate::table("users")
        .set("password_hash", password_hash)
        .execute(pool, user_id, expected_version)
        .await?;

    tracing::info!(user_id = %user_id, "password changed");
    Ok(stamp)
}

async fn hash_password(password: String) -> Result<String, AppError> {
    let hash = task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| anyhow::anyhow!("failed to hash password: {e}"))
    })
    .await
    .context("password hashing task panicked")??;

    Ok(hash)
}

async fn verify_password(password_hash: String, password: String) -> Result<bool, AppError> {
    let is_valid = task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&password_hash)
            .map_err(|e| anyhow::anyhow!("invalid password hash format: {e}"))?;

        Ok::<bool, anyhow::Error>(
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
        )
    })
    .await
    .context("password verification task panicked")??;

    Ok(is_valid)
}
