//! # Transport Dispatcher
//!
//! Wires every endpoint of the server and decides, once per upgrade request,
//! which streaming session (if any) serves it.
//!
//! ## Endpoints:
//! - `GET /httpstream.wav`: the raw asset over plain HTTP
//! - `GET /health`: service status and counters
//! - `/wavechunks1` (upgrade): re-encoded chunks, one playable WAV per message
//! - `/wavestream2` (upgrade): JSON format announcement, then raw PCM
//!
//! Upgrade requests for any other path get a bare `404 Not Found` with
//! `Connection: close` and no body, and no session is created.

use crate::audio::framer::StreamMode;
use crate::config::AssetConfig;
use crate::error::AppError;
use crate::health;
use crate::handlers;
use crate::state::AppState;
use crate::websocket::StreamingSocket;
use actix_web::http::header;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use std::path::PathBuf;
use tracing::{info, warn};

/// What an upgrade path resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    WaveChunks,
    WaveStream,
    Reject,
}

/// Exact-match upgrade paths. Anything not listed is `Route::Reject`.
pub const ROUTES: &[(&str, Route)] = &[("/wavechunks1", Route::WaveChunks), ("/wavestream2", Route::WaveStream)];

impl Route {
    pub fn resolve(path: &str) -> Route {
        ROUTES
            .iter()
            .find(|(candidate, _)| *candidate == path)
            .map(|(_, route)| *route)
            .unwrap_or(Route::Reject)
    }

    pub fn mode(self) -> Option<StreamMode> {
        match self {
            Route::WaveChunks => Some(StreamMode::ReEncodedChunks),
            Route::WaveStream => Some(StreamMode::RawHeaderThenPcm),
            Route::Reject => None,
        }
    }

    /// The asset a session on this route streams.
    pub fn asset(self, assets: &AssetConfig) -> Option<PathBuf> {
        match self {
            Route::WaveChunks => Some(PathBuf::from(&assets.chunks_asset)),
            Route::WaveStream => Some(PathBuf::from(&assets.stream_asset)),
            Route::Reject => None,
        }
    }
}

/// Register every route on the application.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/httpstream.wav", web::get().to(handlers::stream_asset))
        .route("/health", web::get().to(health::health_check))
        .default_service(web::to(dispatch));
}

fn is_upgrade(req: &HttpRequest) -> bool {
    req.headers()
        .get(header::UPGRADE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case("websocket"))
}

/// Fallback for everything not served by a plain HTTP route.
async fn dispatch(req: HttpRequest, stream: web::Payload, state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    if !is_upgrade(&req) {
        return Err(AppError::NotFound(format!("no resource at {}", req.path())).into());
    }

    let route = Route::resolve(req.path());
    let (Some(mode), Some(source)) = (route.mode(), route.asset(&state.config.assets)) else {
        warn!(
            path = %req.path(),
            peer = ?req.connection_info().peer_addr(),
            "rejecting upgrade for unknown path"
        );
        return Ok(HttpResponse::NotFound().force_close().finish());
    };

    info!(
        path = %req.path(),
        mode = %mode,
        peer = ?req.connection_info().peer_addr(),
        "accepting websocket upgrade"
    );

    let session = StreamingSocket::new(mode, source, state.get_ref().clone());
    ws::start(session, &req, stream)
}
