//! Signaling Relay
//!
//! WebSocket signaling server for two-party peer-to-peer calls.
//!
//! # Servers
//!
//! - WebSocket server for client signaling (default: 0.0.0.0:3044)
//! - HTTP server for health, metrics and room inspection (default: 0.0.0.0:8081)
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize Prometheus metrics recorder
//! 3. Build the Authorization Gate client, if configured
//! 4. Spawn the signaling actor (`SignalingActorHandle`)
//! 5. Bind and start the health server
//! 6. Bind and start the WebSocket server, then mark ready
//! 7. Wait for shutdown signal

#![warn(clippy::pedantic)]
#![allow(clippy::too_many_lines)] // main.rs orchestrates startup, naturally longer

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use signaling_service::actors::SignalingActorHandle;
use signaling_service::config::Config;
use signaling_service::gate::{AuthorizationGate, HttpAuthorizationGate};
use signaling_service::observability::metrics::init_metrics_recorder;
use signaling_service::observability::{health_router, rooms_router, HealthState};
use signaling_service::transport::{ws_router, WsSettings};
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Time allowed for sockets to flush their close frames after cancellation.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration first so the log format can follow it
    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {e}");
        e
    })?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "signaling_service=debug,tower_http=info".into());
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

    info!("Starting Signaling Relay");
    info!(
        instance_id = %config.instance_id,
        bind_address = %config.bind_address,
        health_bind_address = %config.health_bind_address,
        gate_enabled = config.auth_gate_url.is_some(),
        auth_gate_timeout_ms = config.auth_gate_timeout.as_millis(),
        outbound_buffer = config.outbound_buffer,
        max_message_bytes = config.max_message_bytes,
        "Configuration loaded successfully"
    );

    // Must happen before any metrics are recorded
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;
    info!("Prometheus metrics recorder initialized");

    let gate: Option<Arc<dyn AuthorizationGate>> = match &config.auth_gate_url {
        Some(url) => {
            let gate = HttpAuthorizationGate::new(url, config.auth_gate_timeout).map_err(|e| {
                error!(error = %e, "Failed to build Authorization Gate client");
                e
            })?;
            Some(Arc::new(gate))
        }
        None => {
            warn!("AUTH_GATE_URL not set - every join will be admitted");
            None
        }
    };

    let health_state = Arc::new(HealthState::new());

    let actor = SignalingActorHandle::new(
        config.instance_id.clone(),
        gate,
        config.auth_gate_timeout,
    );
    info!("Signaling actor started");

    let shutdown_token = actor.child_token();

    // Health server: liveness, readiness, metrics and room inspection
    let health_addr: SocketAddr = config.health_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.health_bind_address, "Invalid health bind address");
        format!("Invalid health bind address: {e}")
    })?;

    let metrics_router = Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let handle = prometheus_handle.clone();
            async move { handle.render() }
        }),
    );

    let health_app = health_router(Arc::clone(&health_state))
        .merge(rooms_router(actor.clone()))
        .merge(metrics_router)
        .layer(TraceLayer::new_for_http());

    // Bind listeners BEFORE spawning to fail fast on bind errors
    let health_listener = tokio::net::TcpListener::bind(health_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %health_addr, "Failed to bind health server");
            format!("Failed to bind health server to {health_addr}: {e}")
        })?;

    let health_shutdown_token = shutdown_token.child_token();
    let health_server = tokio::spawn(async move {
        info!(addr = %health_addr, "Health server starting");
        let server = axum::serve(health_listener, health_app).with_graceful_shutdown(async move {
            health_shutdown_token.cancelled().await;
            info!("Health server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Health server failed");
        }
    });

    // WebSocket server
    let ws_addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.bind_address, "Invalid WebSocket bind address");
        format!("Invalid WebSocket bind address: {e}")
    })?;

    let ws_app = ws_router(
        actor.clone(),
        WsSettings {
            outbound_buffer: config.outbound_buffer,
            max_message_bytes: config.max_message_bytes,
        },
    );

    let ws_listener = tokio::net::TcpListener::bind(ws_addr).await.map_err(|e| {
        error!(error = %e, addr = %ws_addr, "Failed to bind WebSocket server");
        format!("Failed to bind WebSocket server to {ws_addr}: {e}")
    })?;

    let ws_shutdown_token = shutdown_token.child_token();
    let ws_server = tokio::spawn(async move {
        info!(addr = %ws_addr, "WebSocket server starting");
        let server = axum::serve(ws_listener, ws_app).with_graceful_shutdown(async move {
            ws_shutdown_token.cancelled().await;
            info!("WebSocket server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "WebSocket server failed");
        }
    });

    health_state.set_ready();
    info!("Signaling Relay running - press Ctrl+C to shutdown");

    shutdown_signal().await;
    info!("Shutdown signal received, initiating graceful shutdown...");

    // Stop advertising readiness before closing sockets
    health_state.set_not_ready();

    // Cancels every connection token and both servers
    actor.cancel();

    if tokio::time::timeout(DRAIN_GRACE, async {
        let _ = ws_server.await;
        let _ = health_server.await;
    })
    .await
    .is_err()
    {
        warn!(
            grace_secs = DRAIN_GRACE.as_secs(),
            "Servers did not stop within grace period"
        );
    }

    info!("Signaling Relay shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
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
