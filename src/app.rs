//! Router construction and shared application state.

use std::sync::Arc;

use axum::{
    Router,
    extract::FromRef,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{delete, get, post, put},
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    db::DbPool,
    handlers::{
        health, notifications, parking_lots, parking_spots, payments, qr_codes, reservations,
        reviews, sessions, users, vehicles,
    },
    middleware::auth,
    services::{mailer::Mailer, qr_service::QrSettings},
};

/// State shared by every handler. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub qr: Arc<QrSettings>,
    pub mailer: Arc<dyn Mailer>,
    pub token_ttl: chrono::Duration,
}

impl FromRef<AppState> for DbPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Arc<QrSettings> {
    fn from_ref(state: &AppState) -> Self {
        state.qr.clone()
    }
}

impl FromRef<AppState> for Arc<dyn Mailer> {
    fn from_ref(state: &AppState) -> Self {
        state.mailer.clone()
    }
}

/// Build the full API router.
///
/// Authentication runs on every route: it only rejects requests carrying a
/// bad token. Whether a route needs a user is decided by its handler taking
/// an `AuthUser`, or an `ActivatedUser` for vehicles, QR codes and
/// onboarding.
pub fn router(state: AppState, trusted_origins: &[String]) -> Router {
    let api = Router::new()
        // Users and tokens
        .route("/users", post(users::register))
        .route("/users/activated", put(users::activate_user))
        .route("/users/password-reset", put(users::reset_password))
        .route(
            "/users/profile",
            get(users::get_profile).patch(users::update_profile),
        )
        .route("/users/complete-profile", post(users::complete_profile))
        .route("/users/password", put(users::change_password))
        .route(
            "/auth/tokens/authentication",
            post(users::create_authentication_token),
        )
        .route(
            "/auth/tokens/password-reset-request",
            post(users::create_password_reset_token),
        )
        // Vehicles
        .route(
            "/vehicles",
            post(vehicles::create_vehicle).get(vehicles::list_vehicles),
        )
        .route(
            "/vehicles/{id}",
            get(vehicles::get_vehicle)
                .patch(vehicles::update_vehicle)
                .delete(vehicles::delete_vehicle),
        )
        .route("/vehicles/{id}/set-default", put(vehicles::set_default))
        // Parking lots
        .route(
            "/parking-lots",
            get(parking_lots::list_parking_lots).post(parking_lots::create_parking_lot),
        )
        .route("/parking-lots/search", get(parking_lots::search_parking_lots))
        .route("/parking-lots/mine", get(parking_lots::list_my_parking_lots))
        .route(
            "/parking-lots/{id}",
            get(parking_lots::get_parking_lot)
                .patch(parking_lots::update_parking_lot)
                .delete(parking_lots::delete_parking_lot),
        )
        .route(
            "/parking-lots/{id}/availability",
            get(parking_lots::get_availability),
        )
        .route("/parking-lots/{id}/revenue", get(payments::lot_revenue))
        .route(
            "/parking-lots/{id}/reservations/active",
            get(reservations::list_active_for_lot),
        )
        .route("/parking-lots/{id}/sessions", get(sessions::list_for_lot))
        .route(
            "/parking-lots/{id}/reviews",
            get(reviews::list_for_lot).post(reviews::create_review),
        )
        .route("/parking-lots/{id}/rating", get(reviews::rating_summary))
        // Parking spots
        .route(
            "/parking-lots/{id}/spots",
            get(parking_spots::list_spots).post(parking_spots::create_spot),
        )
        .route(
            "/parking-lots/{id}/spots/available",
            get(parking_spots::list_available_spots),
        )
        .route("/parking-lots/{id}/spots/bulk", post(parking_spots::bulk_create_spots))
        .route(
            "/parking-spots/{id}",
            get(parking_spots::get_spot)
                .patch(parking_spots::update_spot)
                .delete(parking_spots::delete_spot),
        )
        // Reservations
        .route(
            "/reservations",
            post(reservations::create_reservation).get(reservations::list_reservations),
        )
        .route(
            "/reservations/{id}",
            get(reservations::get_reservation).patch(reservations::update_reservation),
        )
        .route("/reservations/{id}/cancel", post(reservations::cancel_reservation))
        .route("/reservations/{id}/check-in", post(reservations::check_in))
        .route("/reservations/{id}/check-out", post(reservations::check_out))
        .route("/reservations/{id}/payment", get(payments::get_reservation_payment))
        // Parking sessions
        .route(
            "/sessions",
            post(sessions::start_session).get(sessions::list_sessions),
        )
        .route("/sessions/active", get(sessions::list_active_sessions))
        .route(
            "/sessions/{id}",
            get(sessions::get_session).patch(sessions::update_session),
        )
        .route("/sessions/{id}/check-out", post(sessions::check_out))
        .route("/sessions/{id}/violation", post(sessions::mark_violation))
        // Payments
        .route(
            "/payments",
            post(payments::create_payment).get(payments::list_payments),
        )
        .route(
            "/payments/{id}",
            get(payments::get_payment).patch(payments::update_payment),
        )
        // Reviews
        .route("/reviews", get(reviews::list_my_reviews))
        .route(
            "/reviews/{id}",
            get(reviews::get_review)
                .patch(reviews::update_review)
                .delete(reviews::delete_review),
        )
        // Notifications
        .route(
            "/notifications",
            get(notifications::list_notifications).delete(notifications::delete_all_notifications),
        )
        .route("/notifications/unread-count", get(notifications::unread_count))
        .route("/notifications/read-all", post(notifications::mark_all_read))
        .route("/notifications/{id}/read", post(notifications::mark_read))
        .route(
            "/notifications/{id}",
            delete(notifications::delete_notification),
        )
        // QR codes
        .route("/qr-codes", get(qr_codes::list_qr_codes))
        .route("/qr-codes/generate", post(qr_codes::generate_qr_code))
        .route("/qr-codes/verify", post(qr_codes::verify_qr_code))
        .route("/qr-images/{filename}", get(qr_codes::get_qr_image));

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/v1", api)
        .layer(axum_middleware::from_fn_with_state(
            state.pool.clone(),
            auth::authenticate,
        ))
        .layer(cors(trusted_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Permissive CORS when no origins are configured, otherwise only the
/// listed origins.
fn cors(trusted_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if trusted_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = trusted_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}
