//! Business logic services.
//!
//! Services contain core business logic separated from HTTP handlers.
//! They own every SQL statement, transaction and state transition; handlers
//! only parse, validate and shape responses.

pub mod housekeeping;
pub mod mailer;
pub mod notification_service;
pub mod parking_lot_service;
pub mod parking_spot_service;
pub mod payment_service;
pub mod qr_service;
pub mod reservation_service;
pub mod review_service;
pub mod session_service;
pub mod user_service;
pub mod vehicle_service;
pub mod versioned;
