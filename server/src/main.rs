//! Spotlight Server - Main entry point.
//!
//! This binary starts the Spotlight API server with:
//! - Structured JSON logging for production
//! - Database migrations on startup
//! - Graceful shutdown handling (SIGTERM/SIGINT)
//! - Background rate limiter cleanup
//!
//! # Configuration
//!
//! See [`spotlight_server::config`] for environment variable configuration.
//!
//! # Example
//!
//! ```bash
//! # Local development
//! JWT_SECRET=dev-secret LOCAL_DEV=true cargo run --bin spotlight-server
//!
//! # Production mode
//! JWT_SECRET="long-random-secret" \
//! GOOGLE_CLIENT_ID="1234.apps.googleusercontent.com" \
//! DATABASE_URL="sqlite:///var/lib/spotlight/spotlight.db?mode=rwc" \
//! PORT=8080 \
//! cargo run --release --bin spotlight-server
//! ```

use std::net::SocketAddr;
use std::process::ExitCode;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use spotlight_server::config::Config;
use spotlight_server::routes::{create_router, AppState};

/// Cleanup interval for stale rate limiter entries (30 seconds).
const RATE_LIMITER_CLEANUP_INTERVAL: Duration = Duration::from_secs(30);

/// Graceful shutdown timeout for in-flight requests (30 seconds).
const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Failed to load configuration");
            eprintln!("Error: {err}");
            eprintln!();
            eprintln!("Required environment variables:");
            eprintln!("  JWT_SECRET             - Secret used to sign bearer tokens");
            eprintln!();
            eprintln!("Optional environment variables:");
            eprintln!("  PORT                   - HTTP server port (default: 8080)");
            eprintln!("  DATABASE_URL           - SQLite URL (default: sqlite://spotlight.db?mode=rwc)");
            eprintln!("  GOOGLE_CLIENT_ID       - Enables Google sign-in");
            eprintln!("  FIREBASE_PROJECT_ID    - Enables Firebase sign-in");
            eprintln!("  UPLOAD_DIR             - Directory for uploaded images (default: uploads)");
            eprintln!("  CORS_ALLOWED_ORIGINS   - Comma-separated list of allowed origins");
            eprintln!("  RATE_LIMIT_PER_MINUTE  - Requests per client and path (default: 100)");
            eprintln!("  LOCAL_DEV              - Skip rate limiting and security headers ('true')");
            eprintln!("  RUST_LOG               - Log level filter (default: info)");
            return ExitCode::from(1);
        }
    };

    info!(
        port = config.port,
        local_dev = config.local_dev,
        identity_provider = config.has_identity_provider(),
        cors_origin_count = config.cors_allowed_origins.len(),
        "Spotlight server starting"
    );
    if !config.has_identity_provider() {
        warn!("No identity provider configured, Google sign-in is disabled");
    }

    let port = config.port;
    let state = match AppState::new(config).await {
        Ok(state) => state,
        Err(err) => {
            error!(error = %err, "Failed to initialize server");
            return ExitCode::from(1);
        }
    };

    let cleanup_handle = state
        .rate_limiter
        .spawn_cleanup_task(RATE_LIMITER_CLEANUP_INTERVAL);
    info!(
        interval_secs = RATE_LIMITER_CLEANUP_INTERVAL.as_secs(),
        "Rate limiter cleanup task started"
    );

    let app = create_router(state);

    let bind_addr = format!("0.0.0.0:{port}");
    let listener = match TcpListener::bind(&bind_addr).await {
        Ok(listener) => {
            info!(port, address = %bind_addr, "Server listening");
            listener
        }
        Err(err) => {
            error!(
                error = %err,
                address = %bind_addr,
                "Failed to bind to address"
            );
            return ExitCode::from(1);
        }
    };

    // Connection info feeds the per-client rate limiter.
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal());

    info!("Server ready to accept connections");

    if let Err(err) = server.await {
        error!(error = %err, "Server error");
        return ExitCode::from(1);
    }

    info!("Server shutting down gracefully");

    cleanup_handle.abort();
    info!("Rate limiter cleanup task stopped");

    info!("Server shutdown complete");
    ExitCode::SUCCESS
}

/// Initialize structured logging with tracing.
///
/// JSON output, filtered by `RUST_LOG` with a default of `info`.
fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,axum::rejection=trace"));

    let json_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_level(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .init();
}

/// Creates a future that resolves when a shutdown signal is received.
///
/// Listens for:
/// - SIGTERM (container orchestrator shutdown)
/// - SIGINT (Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }

    // axum stops accepting connections here and lets in-flight ones finish.
    info!(
        timeout_secs = GRACEFUL_SHUTDOWN_TIMEOUT.as_secs(),
        "Waiting for in-flight requests to complete"
    );
}
