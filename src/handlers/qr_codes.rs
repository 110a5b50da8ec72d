//! QR code HTTP handlers.
//!
//! This module implements:
//! - POST /v1/qr-codes/generate - Issue a code for one of the caller's vehicles (activated users)
//! - POST /v1/qr-codes/verify - Resolve a code (public)
//! - GET /v1/qr-codes - The caller's active codes (activated users)
//! - GET /v1/qr-images/{filename} - Stored PNG (public)

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::ActivatedUser,
    models::{
        qr_code::{
            GenerateQrCodeRequest, GenerateQrCodeResponse, QrCodeList, VerifyQrCodeRequest,
            VerifyQrCodeResponse,
        },
        validation::Validator,
    },
    services::qr_service::{self, QrSettings},
};

/// Issue a QR code.
///
/// # Endpoint
///
/// `POST /v1/qr-codes/generate`
///
/// # Request Body
///
/// ```json
/// {
///   "vehicle_id": "550e8400-e29b-41d4-a716-446655440000",
///   "expiry_hours": 12,
///   "purpose": "parking"
/// }
/// ```
///
/// Any code the caller already holds is deactivated first, so at most one
/// is active per user.
///
/// # Response
///
/// - **Success (201 Created)**: Stored code, its payload, `image_url` and `verify_url`
/// - **Error (404)**: Vehicle not found or not the caller's
/// - **Error (422)**: Unknown purpose or `expiry_hours` outside 1..=168
pub async fn generate_qr_code(
    State(pool): State<DbPool>,
    State(settings): State<Arc<QrSettings>>,
    ActivatedUser(user): ActivatedUser,
    Json(request): Json<GenerateQrCodeRequest>,
) -> Result<(StatusCode, Json<GenerateQrCodeResponse>), AppError> {
    let mut v = Validator::new();
    request.validate(&mut v);
    v.finish()?;

    let issued = qr_service::issue(&pool, &settings, user.id, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(GenerateQrCodeResponse {
            issued,
            message: "QR code generated successfully",
        }),
    ))
}

/// `POST /v1/qr-codes/verify` with `{"code": "..."}`.
///
/// Unknown, expired and deactivated codes all answer 404 "QR code not found
/// or expired".
pub async fn verify_qr_code(
    State(pool): State<DbPool>,
    Json(request): Json<VerifyQrCodeRequest>,
) -> Result<Json<VerifyQrCodeResponse>, AppError> {
    let mut v = Validator::new();
    request.validate(&mut v);
    v.finish()?;

    let qr_data = qr_service::verify(&pool, &request.code).await?;

    Ok(Json(VerifyQrCodeResponse {
        qr_data,
        message: "QR code verified successfully",
    }))
}

pub async fn list_qr_codes(
    State(pool): State<DbPool>,
    ActivatedUser(user): ActivatedUser,
) -> Result<Json<QrCodeList>, AppError> {
    let codes = qr_service::list_active(&pool, user.id).await?;
    Ok(Json(QrCodeList::from(codes)))
}

pub async fn get_qr_image(
    State(settings): State<Arc<QrSettings>>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let bytes = qr_service::read_image(&settings, &filename).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        bytes,
    ))
}
