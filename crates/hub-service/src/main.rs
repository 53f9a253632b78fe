//! QuestHub realtime hub
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize tracing and the Prometheus metrics recorder
//! 3. Connect the membership store (Postgres)
//! 4. Spawn the hub task
//! 5. Serve HTTP (WebSocket acceptor, producers, health, metrics)
//! 6. Wait for shutdown signal, then cancel the root token

#![warn(clippy::pedantic)]

use std::sync::Arc;

use hub_service::actors::{ConnectionSettings, HubHandle, HubSettings};
use hub_service::config::Config;
use hub_service::identity::HeaderIdentityResolver;
use hub_service::membership::PgMembershipStore;
use hub_service::observability::{init_metrics_recorder, HealthState};
use hub_service::routes::{build_routes, AppState};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Configuration first so the log format can follow it
    let config = Config::from_env()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "hub_service=debug,tower_http=debug".into());
    if config.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    info!("Starting QuestHub realtime hub");
    info!(
        bind_address = %config.bind_address,
        command_buffer = config.command_buffer,
        outbound_buffer = config.outbound_buffer,
        ping_interval_seconds = config.ping_interval_seconds,
        idle_timeout_seconds = config.idle_timeout_seconds,
        write_timeout_seconds = config.write_timeout_seconds,
        membership_timeout_ms = config.membership_timeout_ms,
        "Configuration loaded successfully"
    );

    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;

    info!("Connecting to membership store...");
    let membership = PgMembershipStore::connect(&config.postgres_url, config.db_max_connections)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to connect to Postgres");
            e
        })?;
    info!("Membership store connected");

    let identity = HeaderIdentityResolver::new(&config.identity_header)?;

    let root_token = CancellationToken::new();
    let (hub, hub_task) = HubHandle::spawn(
        HubSettings {
            command_buffer: config.command_buffer,
            membership_timeout: config.membership_timeout(),
        },
        Arc::new(membership),
        root_token.child_token(),
    );

    // Readiness also reports unready once the hub loop stops
    let health_state = Arc::new(HealthState::new(hub.clone()));

    let state = Arc::new(AppState {
        hub,
        identity: Arc::new(identity),
        connection_settings: ConnectionSettings {
            outbound_buffer: config.outbound_buffer,
            ping_interval: config.ping_interval(),
            idle_timeout: config.idle_timeout(),
            write_timeout: config.write_timeout(),
        },
        max_message_bytes: config.max_message_bytes,
    });

    let app = build_routes(state, Arc::clone(&health_state), prometheus_handle);

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .map_err(|e| {
            error!(error = %e, bind_address = %config.bind_address, "Failed to bind listener");
            e
        })?;
    info!(addr = %listener.local_addr()?, "Hub listening");

    let server_token = root_token.child_token();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_token.cancelled().await })
            .await
    });

    health_state.set_ready();

    shutdown_signal().await;
    info!("Shutdown signal received, initiating graceful shutdown...");

    health_state.set_not_ready();
    // Stops the hub loop, which closes every connection's outbound buffer
    root_token.cancel();

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "HTTP server error during shutdown"),
        Err(e) => warn!(error = %e, "HTTP server task failed"),
    }
    if let Err(e) = hub_task.await {
        error!(error = %e, "Hub task panicked");
    }

    info!("Hub shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
