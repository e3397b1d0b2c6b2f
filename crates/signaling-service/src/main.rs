//! Signaling Service
//!
//! WebSocket call signaling and presence server for the campus assistant.
//!
//! # Servers
//!
//! - HTTP/WebSocket server for client signaling (default: 0.0.0.0:8080)
//! - HTTP server for health endpoints and metrics (default: 0.0.0.0:8081)
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize tracing
//! 3. Initialize Prometheus metrics recorder
//! 4. Select the call record store (Redis when `REDIS_URL` is set)
//! 5. Build the signaling service
//! 6. Start health HTTP server (liveness, readiness, metrics)
//! 7. Start signaling server
//! 8. Wait for shutdown signal

#![warn(clippy::pedantic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use common::secret::ExposeSecret;
use signaling_service::appointments::{AppointmentRepository, InMemoryAppointmentRepository};
use signaling_service::config::Config;
use signaling_service::observability::{health_router, init_metrics_recorder, HealthState};
use signaling_service::service::SignalingService;
use signaling_service::store::{CallStore, InMemoryCallStore, RedisCallStore};
use signaling_service::transport::signaling_router;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Upper bound on waiting for sockets and call actors to wind down.
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll interval while draining.
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "signaling_service=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    info!("Starting Signaling Service");
    info!(
        instance_id = %config.instance_id,
        bind_address = %config.bind_address,
        health_bind_address = %config.health_bind_address,
        redis_store = config.redis_url.is_some(),
        call_idle_timeout_seconds = config.call_idle_timeout_seconds,
        "Configuration loaded"
    );

    // Initialize Prometheus metrics recorder
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to initialize metrics recorder");
        e
    })?;
    info!("Metrics recorder initialized");

    let health_state = Arc::new(HealthState::new());

    // Select call record store
    let store: Arc<dyn CallStore> = match &config.redis_url {
        Some(url) => {
            let store = RedisCallStore::connect(url.expose_secret()).await.map_err(|e| {
                error!(error = %e, "Failed to connect to Redis");
                e
            })?;
            info!("Using Redis call store");
            Arc::new(store)
        }
        None => {
            warn!("REDIS_URL not set, using in-process call store");
            Arc::new(InMemoryCallStore::new())
        }
    };

    let appointments: Arc<dyn AppointmentRepository> =
        Arc::new(InMemoryAppointmentRepository::new());

    let shutdown_token = CancellationToken::new();
    let service = Arc::new(SignalingService::new(
        &config,
        store,
        appointments,
        shutdown_token.clone(),
    ));

    // Start health HTTP server (MUST succeed - fail startup if it doesn't)
    let health_addr: SocketAddr = config.health_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.health_bind_address, "Invalid health bind address");
        format!("Invalid health bind address: {e}")
    })?;

    // Bind listener BEFORE spawning to fail fast on bind errors
    let health_listener = tokio::net::TcpListener::bind(health_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %health_addr, "Failed to bind health server");
            format!("Failed to bind health server to {health_addr}: {e}")
        })?;
    info!(addr = %health_addr, "Health server bound successfully");

    let health_app = health_router(Arc::clone(&health_state), Some(prometheus_handle));
    let health_shutdown_token = shutdown_token.clone();
    let health_task = tokio::spawn(async move {
        let server = axum::serve(health_listener, health_app).with_graceful_shutdown(async move {
            health_shutdown_token.cancelled().await;
        });
        if let Err(e) = server.await {
            error!(error = %e, "Health server failed");
        }
    });

    // Start signaling server
    let bind_addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.bind_address, "Invalid bind address");
        format!("Invalid bind address: {e}")
    })?;
    let listener = tokio::net::TcpListener::bind(bind_addr).await.map_err(|e| {
        error!(error = %e, addr = %bind_addr, "Failed to bind signaling server");
        format!("Failed to bind signaling server to {bind_addr}: {e}")
    })?;

    let app = signaling_router(Arc::clone(&service));
    let signaling_shutdown_token = shutdown_token.clone();
    let signaling_task = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            signaling_shutdown_token.cancelled().await;
        });
        if let Err(e) = server.await {
            error!(error = %e, "Signaling server failed");
        }
    });
    info!(addr = %bind_addr, "Signaling server started");

    health_state.set_ready();

    // Wait for shutdown signal
    info!("Signaling Service running - press Ctrl+C to shutdown");
    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");
    health_state.set_not_ready();

    // Closes every socket and stops every call actor
    service.shutdown();

    let drained = tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, async {
        while service.metrics().connection_count() > 0
            || service.supervisor().active_calls().await > 0
        {
            tokio::time::sleep(SHUTDOWN_POLL_INTERVAL).await;
        }
    })
    .await;
    if drained.is_err() {
        warn!(
            connections = service.metrics().connection_count(),
            calls = service.supervisor().active_calls().await,
            "Drain timed out"
        );
    }

    let _ = tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, async {
        let _ = signaling_task.await;
        let _ = health_task.await;
    })
    .await;

    info!("Signaling Service shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. This is acceptable because
/// without signal handlers, we cannot gracefully shut down the service.
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
