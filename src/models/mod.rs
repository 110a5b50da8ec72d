//! Data models representing database entities.
//!
//! This module contains the row types that map to database tables, the
//! request/response bodies built around them, and the shared request
//! plumbing (partial updates, pagination, validation).

/// Parking lot model and geo search types
pub mod parking_lot;
/// Parking session model
pub mod parking_session;
/// Parking spot model
pub mod parking_spot;
/// Payment model
pub mod payment;
/// Reservation model and billing arithmetic
pub mod reservation;
/// Review model and rating summary
pub mod review;
/// In-app notification model
pub mod notification;
/// QR code record and identity payload
pub mod qr_code;
/// Bearer token model
pub mod token;
/// User account model
pub mod user;
/// Vehicle model
pub mod vehicle;

pub mod pagination;
pub mod patch;
pub mod validation;
