//! Watermark Relay Web Server.
//!
//! This binary:
//! - Receives inbound email webhooks
//! - Resolves the tenant and watermarks PDF attachments
//! - Relays the watermarked documents to the tenant's destination address
//!
//! Collaborator clients are built once here and shared by every request.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::Client;
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use relay::relay::{RelayIdentity, ResendMailer};
use relay::storage::SupabaseStorage;
use relay::tenant::SupabaseDirectory;
use relay::watermark::{build_watermarker, HttpWatermarkApi};
use relay::{web, AppState, Config, Pipeline};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("relay_server_starting");

    // Load configuration
    let config = Config::from_env();
    config.validate().context("Invalid configuration")?;
    info!(
        port = config.port,
        watermark_mode = config.watermark_mode.as_str(),
        attribution_source = ?config.attribution_source,
        subject_mode = ?config.subject_mode,
        poll_interval_ms = config.job_poll_interval.as_millis() as u64,
        poll_max_attempts = config.job_poll_max_attempts,
        watermark_api_key_set = config.watermark_api_key.is_some(),
        "config_loaded"
    );

    // One pooled HTTP client for every collaborator
    let client = Client::builder()
        .pool_max_idle_per_host(32)
        .timeout(config.request_timeout())
        .build()
        .context("Failed to create HTTP client")?;

    let directory = Arc::new(SupabaseDirectory::new(
        client.clone(),
        &config.supabase_url,
        &config.supabase_service_key,
        &config.tenant_table,
    ));
    let storage = Arc::new(SupabaseStorage::new(
        client.clone(),
        &config.supabase_url,
        &config.supabase_service_key,
        &config.staging_bucket,
    ));
    let api = Arc::new(HttpWatermarkApi::new(
        client.clone(),
        &config.watermark_api_url,
        config.watermark_api_key.clone(),
        config.request_timeout(),
    ));
    let mailer = Arc::new(ResendMailer::new(
        client,
        &config.resend_api_url,
        &config.resend_api_key,
    ));

    let watermarker = build_watermarker(&config, api, storage);
    info!(variant = watermarker.variant(), "watermarker_selected");

    let pipeline = Pipeline::new(
        directory,
        watermarker,
        mailer,
        RelayIdentity {
            from_address: config.relay_from_address.clone(),
            from_name: config.relay_from_name.clone(),
            subject_mode: config.subject_mode,
        },
        config.attribution_source,
    );

    // Build the router
    let app = web::router(AppState::new(pipeline), config.max_body_bytes);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "relay_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("relay_server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("relay_server_shutting_down");
}
