//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Extracts the caller, path, query and JSON body
//! 2. Validates input and delegates to a service
//! 3. Returns a JSON response and status code
pub mod health;
pub mod notifications;
pub mod parking_lots;
pub mod parking_spots;
pub mod payments;
pub mod qr_codes;
pub mod reservations;
pub mod reviews;
pub mod sessions;
pub mod users;
pub mod vehicles;
