//! # wavestream - Main Application Entry Point
//!
//! An actix-web server that serves one WAV asset over plain HTTP and streams
//! WAV assets over two WebSocket endpoints with different framing.
//!
//! ## Key Rust Concepts Used:
//! - **async/await**: every file read and socket write suspends instead of blocking
//! - **actors**: each WebSocket session is an independent actix actor
//! - **channels**: pipeline stages talk through bounded tokio mpsc queues
//! - **Result<T, E>**: errors propagate with `?` up to `main`
//!
//! ## Application Architecture:
//! - **config**: layered configuration (defaults, config.toml, environment)
//! - **state**: shared state, connection registry and metrics
//! - **dispatcher**: route table and upgrade dispatch
//! - **websocket**: the per-connection streaming session actor
//! - **audio**: container parsing, re-encoding, framing and the pipeline
//! - **handlers**: plain HTTP asset endpoint
//! - **health**: service status endpoint
//! - **tls**: optional certificate loading
//! - **error**: error types and HTTP error responses

mod audio;
mod config;
mod dispatcher;
mod error;
mod handlers;
mod health;
mod state;
mod tls;
mod websocket;

#[cfg(test)]
mod test_support;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use config::AppConfig;
use state::AppState;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// The main application entry point.
///
/// ## What this function does:
/// 1. **Loads configuration** from files and environment variables
/// 2. **Loads TLS material** if present, falling back to plain transport
/// 3. **Binds the listener**: the only failure that aborts startup
/// 4. **Waits for a shutdown signal**, closes live sessions, stops the server
#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting wavestream v{}", env!("CARGO_PKG_VERSION"));
    info!(
        http_asset = %config.assets.http_asset,
        chunks_asset = %config.assets.chunks_asset,
        stream_asset = %config.assets.stream_asset,
        read_buffer_size = config.streaming.read_buffer_size,
        "Configuration loaded"
    );

    // Certificate problems never stop the server, they only disable TLS
    let tls_config = match tls::load_server_config(&config.tls) {
        Ok(tls_config) => tls_config,
        Err(e) => {
            warn!("TLS disabled, certificate material unusable: {:#}", e);
            None
        }
    };

    let app_state = AppState::new(config.clone()).with_tls(tls_config.is_some());
    let registry = app_state.registry.clone();
    let bind_addr = config.bind_addr();
    let data = web::Data::new(app_state);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET"])
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(data.clone())
            .wrap(cors)
            .wrap(TracingLogger::default())
            .configure(dispatcher::configure)
    })
    .disable_signals();

    let server = match tls_config {
        Some(tls_config) => {
            info!("Starting HTTPS server on {}", bind_addr);
            server.bind_rustls_0_23(&bind_addr, tls_config)?
        }
        None => {
            info!("Starting HTTP server on {}", bind_addr);
            server.bind(&bind_addr)?
        }
    }
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        signal = wait_for_shutdown() => {
            signal?;
            info!("Shutdown signal received, closing sessions...");
            registry.shutdown();
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize the tracing (logging) system.
///
/// ## Environment Variables:
/// - `RUST_LOG`: e.g. "debug" or "wavestream=trace"
/// - If not set, defaults to "wavestream=debug,actix_web=info"
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wavestream=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}

/// Resolve on SIGTERM or SIGINT (Ctrl+C).
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = sigint.recv() => info!("Received SIGINT"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C");
    Ok(())
}
