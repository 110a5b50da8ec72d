//! Periodic cleanup task.
//!
//! Nothing depends on this running: every read already filters out expired
//! QR codes and the like. The task only keeps stored state tidy.

use std::{sync::Arc, time::Duration};

use tokio::{task::JoinHandle, time};

use crate::{
    db::DbPool,
    models::notification::RETENTION_DAYS,
    services::{
        notification_service,
        qr_service::{self, QrSettings},
        reservation_service, session_service,
    },
};

/// Run [`run_once`] every `period` until the runtime shuts down.
pub fn spawn(pool: DbPool, qr: Arc<QrSettings>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            run_once(&pool, &qr).await;
        }
    })
}

/// One cleanup pass. Each step is independent; a failing step is logged and
/// the rest still run.
pub async fn run_once(pool: &DbPool, qr: &QrSettings) {
    match qr_service::cleanup_expired(pool, qr).await {
        Ok(0) => {}
        Ok(count) => tracing::info!(count, "deactivated expired QR codes"),
        Err(err) => tracing::error!(error = %err, "QR code cleanup failed"),
    }

    match reservation_service::expire_overdue(pool).await {
        Ok(0) => {}
        Ok(count) => tracing::info!(count, "expired overdue reservations"),
        Err(err) => tracing::error!(error = %err, "reservation expiry failed"),
    }

    match session_service::mark_overtime(pool).await {
        Ok(0) => {}
        Ok(count) => tracing::info!(count, "flagged overtime sessions"),
        Err(err) => tracing::error!(error = %err, "overtime session check failed"),
    }

    match notification_service::delete_older_than(pool, RETENTION_DAYS).await {
        Ok(0) => {}
        Ok(count) => tracing::info!(count, "deleted old notifications"),
        Err(err) => tracing::error!(error = %err, "notification cleanup failed"),
    }
}
