//! SpotLink API library crate.
//!
//! Parking reservation backend: users and their vehicles, lots and spots,
//! reservations, on-site sessions, payments, reviews, notifications and
//! QR identity codes. Every mutable record carries a `version` and is
//! updated with optimistic concurrency control.

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
