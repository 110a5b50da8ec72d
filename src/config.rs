//! Application configuration management.
//!
//! Configuration is read from environment variables with the `envy` crate,
//! after an optional `.env` file has been loaded.

use serde::Deserialize;
use std::{path::PathBuf, time::Duration};

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `DB_MAX_CONNECTIONS` (optional): pool size, defaults to 5
/// - `DB_QUERY_TIMEOUT_SECS` (optional): per-statement timeout, defaults to 3
/// - `QR_STORAGE_DIR` (optional): directory for rendered QR images
/// - `QR_VERIFY_BASE_URL` (optional): URL encoded into every QR image
/// - `AUTH_TOKEN_TTL_HOURS` (optional): bearer token lifetime, defaults to 24
/// - `HOUSEKEEPING_INTERVAL_SECS` (optional): 0 disables the cleanup task
/// - `CORS_TRUSTED_ORIGINS` (optional): comma-separated origins
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_max_connections")]
    pub db_max_connections: u32,

    #[serde(default = "default_query_timeout_secs")]
    pub db_query_timeout_secs: u64,

    #[serde(default = "default_qr_storage_dir")]
    pub qr_storage_dir: PathBuf,

    #[serde(default = "default_qr_verify_base_url")]
    pub qr_verify_base_url: String,

    #[serde(default = "default_token_ttl_hours")]
    pub auth_token_ttl_hours: i64,

    #[serde(default = "default_housekeeping_interval_secs")]
    pub housekeeping_interval_secs: u64,

    #[serde(default)]
    pub cors_trusted_origins: String,
}

fn default_port() -> u16 {
    3000
}

fn default_max_connections() -> u32 {
    5
}

fn default_query_timeout_secs() -> u64 {
    3
}

fn default_qr_storage_dir() -> PathBuf {
    PathBuf::from("./qr_codes")
}

fn default_qr_verify_base_url() -> String {
    "https://spotlinkio.com/verify".to_string()
}

fn default_token_ttl_hours() -> i64 {
    24
}

fn default_housekeeping_interval_secs() -> u64 {
    300
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Field names are converted automatically: qr_storage_dir -> QR_STORAGE_DIR
        envy::from_env::<Config>()
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.db_query_timeout_secs)
    }

    /// `None` when the housekeeping task is disabled.
    pub fn housekeeping_interval(&self) -> Option<Duration> {
        (self.housekeeping_interval_secs > 0)
            .then(|| Duration::from_secs(self.housekeeping_interval_secs))
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.auth_token_ttl_hours)
    }

    /// Trusted CORS origins, trimmed, with empty entries dropped.
    pub fn trusted_origins(&self) -> Vec<String> {
        self.cors_trusted_origins
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect()
    }
}
