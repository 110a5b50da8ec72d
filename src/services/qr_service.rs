//! QR code service - issuance, verification and image storage.
//!
//! # Atomicity Guarantees
//!
//! Issuance locks the user row first, so two concurrent issuances for the
//! same user run one after the other. Deactivating the old codes, inserting
//! the new one and writing its PNG happen before the commit; if rendering
//! fails the transaction rolls back and the previous code stays active.
//!
//! Only live codes keep an image on disk. A failed commit removes the new
//! PNG, and images of deactivated or expired codes are deleted once the
//! change is committed.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{Duration, Utc};
use qrcode::{EcLevel, QrCode as QrMatrix};
use tokio::task;
use url::Url;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        qr_code::{
            GenerateQrCodeRequest, IssuedQrCode, QrCode, QrCodeData, QrCodeInfo, UserProfile,
            VehicleData,
        },
        user::User,
    },
    services::{vehicle_service, versioned::BUMP_VERSION},
};

pub const CODE_LENGTH: usize = 32;

const CODE_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Attempts at drawing a code that is not already taken.
const CODE_ATTEMPTS: usize = 2;

const IMAGE_MIN_SIZE: u32 = 256;

/// Where images are written and what URL they encode.
#[derive(Debug, Clone)]
pub struct QrSettings {
    pub storage_dir: PathBuf,
    pub verify_base_url: Url,
}

impl QrSettings {
    pub fn verify_url(&self, code: &str) -> String {
        let mut url = self.verify_base_url.clone();
        url.query_pairs_mut().append_pair("code", code);
        url.to_string()
    }

    fn image_path(&self, filename: &str) -> PathBuf {
        self.storage_dir.join(filename)
    }
}

pub fn image_filename(code: &str) -> String {
    format!("qr_{code}.png")
}

/// Draw a random code of [`CODE_LENGTH`] URL-safe characters.
///
/// Each character takes the low six bits of one random byte, so every
/// character of the 64-letter alphabet is equally likely.
pub fn generate_code() -> String {
    rand::random::<[u8; CODE_LENGTH]>()
        .iter()
        .map(|byte| char::from(CODE_ALPHABET[usize::from(byte & 63)]))
        .collect()
}

/// A single path component that cannot leave the storage directory.
pub fn is_bare_filename(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

/// Issue a new code for one of the caller's vehicles.
///
/// # Process
///
/// 1. Lock the user row (`FOR UPDATE`)
/// 2. Load the vehicle, scoped to the user
/// 3. Deactivate the user's active codes
/// 4. Insert the new code with its payload snapshot, redrawing once on a
///    code collision
/// 5. Render the PNG into the storage directory
/// 6. Commit
///
/// # Errors
///
/// - `NotFound`: User or vehicle not found
/// - `QrRender` / `Internal`: Image could not be produced or written
pub async fn issue(
    pool: &DbPool,
    settings: &QrSettings,
    user_id: Uuid,
    request: GenerateQrCodeRequest,
) -> Result<IssuedQrCode, AppError> {
    let mut tx = pool.begin().await?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("user"))?;

    let vehicle = vehicle_service::get(&mut *tx, user_id, request.vehicle_id).await?;

    let sql = format!(
        r#"
        UPDATE qr_codes SET is_active = false, {BUMP_VERSION}
        WHERE user_id = $1 AND is_active
        RETURNING code
        "#
    );
    let deactivated: Vec<String> = sqlx::query_scalar(&sql)
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;

    let generated_at = Utc::now();
    let expires_at = generated_at + Duration::hours(request.expiry_hours);

    let mut issued = None;
    for _ in 0..CODE_ATTEMPTS {
        let code = generate_code();
        let qr_data = QrCodeData {
            user_profile: UserProfile::from(&user),
            vehicle: VehicleData::from(&vehicle),
            qr_info: QrCodeInfo {
                code: code.clone(),
                generated_at,
                expires_at,
                purpose: request.purpose.clone(),
            },
        };

        let inserted = sqlx::query_as::<_, QrCode>(
            r#"
            INSERT INTO qr_codes (user_id, vehicle_id, code, data, expires_at, is_active)
            VALUES ($1, $2, $3, $4, $5, true)
            ON CONFLICT (code) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(vehicle.id)
        .bind(&code)
        .bind(serde_json::to_string(&qr_data)?)
        .bind(expires_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::from_write)?;

        if let Some(qr_code) = inserted {
            issued = Some((qr_code, qr_data));
            break;
        }
        tracing::warn!("QR code collision, drawing again");
    }

    let (qr_code, qr_data) = issued.context("could not draw an unused QR code")?;

    let verify_url = settings.verify_url(&qr_code.code);
    let filename = image_filename(&qr_code.code);
    let image_path = settings.image_path(&filename);
    render_png(verify_url.clone(), image_path.clone()).await?;

    if let Err(err) = tx.commit().await {
        remove_image(&image_path).await;
        return Err(err.into());
    }

    remove_images(settings, &deactivated).await;

    tracing::info!(
        qr_code_id = %qr_code.id,
        user_id = %user_id,
        deactivated = deactivated.len(),
        purpose = %request.purpose,
        "QR code issued"
    );

    Ok(IssuedQrCode {
        qr_code,
        qr_data,
        image_url: format!("/v1/qr-images/{filename}"),
        verify_url,
    })
}

async fn render_png(contents: String, path: PathBuf) -> Result<(), AppError> {
    task::spawn_blocking(move || write_png(&contents, &path))
        .await
        .context("QR render task failed")?
}

fn write_png(contents: &str, path: &Path) -> Result<(), AppError> {
    let matrix = QrMatrix::with_error_correction_level(contents.as_bytes(), EcLevel::M)?;
    matrix
        .render::<image::Luma<u8>>()
        .min_dimensions(IMAGE_MIN_SIZE, IMAGE_MIN_SIZE)
        .build()
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Resolve a code to the payload captured when it was issued.
///
/// # Errors
///
/// - `NotFoundOrExpired`: Unknown, expired or deactivated code; the three
///   are not told apart
pub async fn verify(pool: &DbPool, code: &str) -> Result<QrCodeData, AppError> {
    let data: String = sqlx::query_scalar(
        "SELECT data FROM qr_codes WHERE code = $1 AND is_active AND expires_at > NOW()",
    )
    .bind(code)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFoundOrExpired("QR code"))?;

    Ok(serde_json::from_str(&data)?)
}

/// The caller's active, unexpired codes, newest first.
pub async fn list_active(pool: &DbPool, user_id: Uuid) -> Result<Vec<QrCode>, AppError> {
    let codes = sqlx::query_as::<_, QrCode>(
        r#"
        SELECT * FROM qr_codes
        WHERE user_id = $1 AND is_active AND expires_at > NOW()
        ORDER BY created_at DESC, id ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(codes)
}

/// Deactivate every expired code and delete its image. Returns how many
/// rows changed.
pub async fn cleanup_expired(pool: &DbPool, settings: &QrSettings) -> Result<u64, AppError> {
    let sql = format!(
        r#"
        UPDATE qr_codes SET is_active = false, {BUMP_VERSION}
        WHERE is_active AND expires_at <= NOW()
        RETURNING code
        "#
    );
    let expired: Vec<String> = sqlx::query_scalar(&sql).fetch_all(pool).await?;

    remove_images(settings, &expired).await;

    Ok(expired.len() as u64)
}

async fn remove_images(settings: &QrSettings, codes: &[String]) {
    for code in codes {
        remove_image(&settings.image_path(&image_filename(code))).await;
    }
}

/// Best effort: a leftover image is only served, never trusted.
async fn remove_image(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!(error = %err, path = %path.display(), "failed to remove QR image"),
    }
}

/// Read a stored PNG by its bare filename.
///
/// # Errors
///
/// - `NotFound`: Name is not a bare filename, or no such file
pub async fn read_image(settings: &QrSettings, filename: &str) -> Result<Vec<u8>, AppError> {
    if !is_bare_filename(filename) {
        return Err(AppError::NotFound("QR image"));
    }

    match tokio::fs::read(settings.image_path(filename)).await {
        Ok(bytes) => Ok(bytes),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            Err(AppError::NotFound("QR image"))
        }
        Err(err) => Err(err.into()),
    }
}
