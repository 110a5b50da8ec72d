//! Bearer, activation and password-reset tokens.
//!
//! The plaintext is handed out exactly once; the database only ever sees
//! its SHA-256 hash.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::validation::Validator;

pub const SCOPE_ACTIVATION: &str = "activation";
pub const SCOPE_AUTHENTICATION: &str = "authentication";
pub const SCOPE_PASSWORD_RESET: &str = "password-reset";

/// Hex-encoded length of a 32-byte token.
pub const TOKEN_LENGTH: usize = 64;

pub fn activation_ttl() -> chrono::Duration {
    chrono::Duration::days(3)
}

pub fn password_reset_ttl() -> chrono::Duration {
    chrono::Duration::minutes(45)
}

#[derive(Debug, Clone)]
pub struct Token {
    pub plaintext: String,
    pub hash: String,
    pub user_id: Uuid,
    pub expiry: DateTime<Utc>,
    pub scope: &'static str,
}

impl Token {
    /// Draw 32 random bytes and hex-encode them.
    pub fn generate(user_id: Uuid, ttl: chrono::Duration, scope: &'static str) -> Self {
        let plaintext = hex::encode(rand::random::<[u8; 32]>());
        let hash = hash_token(&plaintext);

        Self {
            plaintext,
            hash,
            user_id,
            expiry: Utc::now() + ttl,
            scope,
        }
    }
}

pub fn is_well_formed(plaintext: &str) -> bool {
    plaintext.len() == TOKEN_LENGTH && plaintext.bytes().all(|b| b.is_ascii_hexdigit())
}

pub fn validate_plaintext(v: &mut Validator, plaintext: &str) {
    v.check(!plaintext.is_empty(), "token", "must be provided");
    v.check(
        is_well_formed(plaintext),
        "token",
        "must be 64 hexadecimal characters",
    );
}

/// Hex SHA-256 of a token plaintext, the form stored in `tokens.hash`.
pub fn hash_token(plaintext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hex::encode(hasher.finalize())
}

/// Response body for `POST /v1/auth/tokens/authentication`.
///
/// ```json
/// {
///   "authentication_token": {
///     "token": "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08",
///     "expiry": "2026-01-11T10:00:00Z"
///   }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub authentication_token: IssuedToken,
}

#[derive(Debug, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expiry: DateTime<Utc>,
}

impl From<Token> for TokenResponse {
    fn from(token: Token) -> Self {
        Self {
            authentication_token: IssuedToken {
                token: token.plaintext,
                expiry: token.expiry,
            },
        }
    }
}
