//! Bearer token authentication middleware.
//!
//! This middleware runs on every request to:
//! 1. Read the token from the `Authorization: Bearer <token>` header
//! 2. Resolve it to a user through the stored SHA-256 hash
//! 3. Attach the [`AuthUser`] principal to the request
//!
//! A request without the header passes through anonymously; handlers that
//! need a user take [`AuthUser`] as an extractor, which rejects anonymous
//! requests with 401.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderValue, header, request::Parts},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        token::{self, SCOPE_AUTHENTICATION},
        user::User,
    },
    services::user_service,
};

/// The authenticated principal, passed explicitly to services.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub role: String,
    pub activated: bool,
}

impl From<User> for AuthUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            role: user.role,
            activated: user.activated,
        }
    }
}

/// Authentication middleware function.
///
/// # Flow
///
/// 1. No `Authorization` header: continue anonymously
/// 2. Header present but not `Bearer <64 hex chars>`: 401 `invalid_authentication_token`
/// 3. Token unknown or expired: 401 `invalid_authentication_token`
/// 4. Otherwise insert [`AuthUser`] into the request extensions
///
/// Every response carries `Vary: Authorization`.
pub async fn authenticate(
    State(pool): State<DbPool>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(header::AUTHORIZATION)
        .map(|value| value.to_str().map_err(|_| AppError::InvalidToken))
        .transpose()?;

    if let Some(header) = header {
        let plaintext = bearer_token(header).ok_or(AppError::InvalidToken)?;

        let user = user_service::get_for_token(&pool, SCOPE_AUTHENTICATION, plaintext)
            .await?
            .ok_or(AppError::InvalidToken)?;

        request.extensions_mut().insert(AuthUser::from(user));
    }

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("authorization"));

    Ok(response)
}

/// Extract a well-formed token from an `Authorization` header value.
fn bearer_token(header: &str) -> Option<&str> {
    let plaintext = header.strip_prefix("Bearer ")?;
    token::is_well_formed(plaintext).then_some(plaintext)
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AppError::AuthenticationRequired)
    }
}

/// An [`AuthUser`] whose account is activated.
///
/// Rejects anonymous callers with 401 and inactive accounts with 403
/// `inactive_account`.
#[derive(Debug, Clone)]
pub struct ActivatedUser(pub AuthUser);

impl<S> FromRequestParts<S> for ActivatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.activated {
            return Err(AppError::InactiveAccount);
        }
        Ok(Self(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn auth_user(activated: bool) -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            email: "ada@example.com".to_string(),
            username: "ada".to_string(),
            role: "normal".to_string(),
            activated,
        }
    }

    async fn extract_activated(user: Option<AuthUser>) -> Result<ActivatedUser, AppError> {
        let (mut parts, ()) = Request::new(()).into_parts();
        if let Some(user) = user {
            parts.extensions.insert(user);
        }
        ActivatedUser::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn activated_user_requires_an_activated_account() {
        let ActivatedUser(user) = extract_activated(Some(auth_user(true))).await.unwrap();
        assert!(user.activated);

        let err = extract_activated(Some(auth_user(false))).await.unwrap_err();
        assert!(matches!(err, AppError::InactiveAccount));

        let err = extract_activated(None).await.unwrap_err();
        assert!(matches!(err, AppError::AuthenticationRequired));
    }

    #[test]
    fn bearer_token_requires_prefix_and_hex_body() {
        let token = "a".repeat(64);

        assert_eq!(bearer_token(&format!("Bearer {token}")), Some(token.as_str()));
        assert_eq!(bearer_token(&token), None);
        assert_eq!(bearer_token(&format!("Basic {token}")), None);
        assert_eq!(bearer_token("Bearer short"), None);
        assert_eq!(bearer_token(&format!("Bearer {}", "z".repeat(64))), None);
    }
}
