//! SpotLink API server.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Prepare the QR image directory
//! 5. Start the housekeeping task
//! 6. Build the router and serve until Ctrl-C

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use url::Url;

use spotlink_api::{
    app::{self, AppState},
    config::Config,
    db,
    services::{housekeeping, mailer::LogMailer, qr_service::QrSettings},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG, defaults to "info"
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(
        &config.database_url,
        config.db_max_connections,
        config.query_timeout(),
    )
    .await?;
    tracing::info!(
        max_connections = config.db_max_connections,
        "Database pool created"
    );

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    tokio::fs::create_dir_all(&config.qr_storage_dir)
        .await
        .with_context(|| format!("cannot create {}", config.qr_storage_dir.display()))?;

    let verify_base_url = Url::parse(&config.qr_verify_base_url)
        .with_context(|| format!("invalid QR_VERIFY_BASE_URL {}", config.qr_verify_base_url))?;

    let qr = Arc::new(QrSettings {
        storage_dir: config.qr_storage_dir.clone(),
        verify_base_url,
    });

    if let Some(period) = config.housekeeping_interval() {
        housekeeping::spawn(pool.clone(), qr.clone(), period);
        tracing::info!(period_secs = period.as_secs(), "Housekeeping scheduled");
    }

    let state = AppState {
        pool,
        qr,
        mailer: Arc::new(LogMailer),
        token_ttl: config.token_ttl(),
    };
    let router = app::router(state, &config.trusted_origins());

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
