//! HTTP middleware components.
//!
//! Middleware are functions that run before route handlers.
//! They can:
//! - Authenticate requests
//! - Modify request/response
//! - Short-circuit requests (reject invalid tokens)

/// Bearer token authentication middleware and the `AuthUser` extractor
pub mod auth;
