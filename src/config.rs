//! # Configuration Management
//!
//! This module handles loading and managing server configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP__ prefix)
//! - Default values (built into the code)
//!
//! ## Key Rust Concepts Used:
//! - **Serde**: converts between these structs and the layered `config` sources
//! - **derive macros**: Debug, Clone, Serialize, Deserialize generated for every section
//! - **Option<T>**: `tls.cert_dir` is only set when the operator wants an explicit directory
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST`, `PORT` and `LOCAL_HTTPS` (deployment-style variables)
//! 2. Environment variables (APP__SERVER__PORT, APP__STREAMING__READ_BUFFER_SIZE, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration, grouped by concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub assets: AssetConfig,
    pub streaming: StreamingConfig,
    pub tls: TlsConfig,
}

/// Listening address.
///
/// ## Common values:
/// - `host = "0.0.0.0"`: accept connections on every interface (default)
/// - `host = "127.0.0.1"`: local development only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// The static audio files served by each endpoint.
///
/// Every session opens its own read handle on these paths, so they can be
/// shared by any number of concurrent sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetConfig {
    /// Streamed verbatim by `GET /httpstream.wav`
    pub http_asset: String,
    /// Re-encoded chunk by chunk on `/wavechunks1`
    pub chunks_asset: String,
    /// Announced once then streamed as raw PCM on `/wavestream2`
    pub stream_asset: String,
}

/// Pipeline tuning.
///
/// ## Fields:
/// - `read_buffer_size`: bytes requested per file read; each read becomes at most one PCM chunk
/// - `channel_capacity`: bound of the queues between pipeline stages
/// - `close_on_complete`: send a normal Close frame once the source is exhausted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    pub read_buffer_size: usize,
    pub channel_capacity: usize,
    pub close_on_complete: bool,
}

/// Certificate lookup. When `cert_dir` is unset the directory is
/// `$HOME/sslcerts`, or `$HOME/localhost-sslcerts` with `local_https`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    pub cert_dir: Option<String>,
    pub local_https: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            assets: AssetConfig {
                http_asset: "assets/test.wav".to_string(),
                chunks_asset: "assets/test.wav".to_string(),
                stream_asset: "assets/test2.wav".to_string(),
            },
            streaming: StreamingConfig {
                read_buffer_size: 64 * 1024, // same granularity as a default file read stream
                channel_capacity: 16,
                close_on_complete: false,
            },
            tls: TlsConfig {
                cert_dir: None,
                local_https: false,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP__SERVER__PORT=3000`: override server port
    /// - `APP__STREAMING__CLOSE_ON_COMPLETE=true`: close sockets when the asset ends
    /// - `APP__TLS__CERT_DIR=/etc/wavestream/certs`: explicit certificate directory
    /// - `PORT=3000`, `HOST=127.0.0.1`: deployment platform conventions
    /// - `LOCAL_HTTPS=1`: look for certificates under `~/localhost-sslcerts`
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            // Double underscore so field names like read_buffer_size survive
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        if env::var_os("LOCAL_HTTPS").is_some_and(|v| !v.is_empty()) {
            settings = settings.set_override("tls.local_https", true)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.streaming.read_buffer_size == 0 {
            return Err(anyhow::anyhow!("Read buffer size must be greater than 0"));
        }

        if self.streaming.channel_capacity == 0 {
            return Err(anyhow::anyhow!("Channel capacity must be greater than 0"));
        }

        for (name, path) in [
            ("http_asset", &self.assets.http_asset),
            ("chunks_asset", &self.assets.chunks_asset),
            ("stream_asset", &self.assets.stream_asset),
        ] {
            if path.trim().is_empty() {
                return Err(anyhow::anyhow!("Asset path {} cannot be empty", name));
            }
        }

        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl TlsConfig {
    /// Directory holding `privkey.pem`, `fullchain.pem` and optionally `chain.pem`.
    ///
    /// Returns None when no explicit directory is configured and `$HOME` is unset.
    pub fn resolve_cert_dir(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.cert_dir {
            return Some(PathBuf::from(dir));
        }

        let home = env::var_os("HOME")?;
        let leaf = if self.local_https { "localhost-sslcerts" } else { "sslcerts" };
        Some(PathBuf::from(home).join(leaf))
    }
}
