//! # Plain HTTP Asset Endpoint
//!
//! `GET /httpstream.wav` streams the configured asset byte for byte. The file
//! is never parsed. The body stream owns the file handle, so a client that
//! disconnects mid-transfer drops the stream and with it the handle.

use crate::audio::pipeline::read_chunks;
use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use std::io::ErrorKind;
use tokio::fs::File;
use tracing::{info, warn};

pub async fn stream_asset(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let path = &state.config.assets.http_asset;

    let file = File::open(path).await.map_err(|err| {
        warn!(path = %path, error = %err, "cannot open http asset");
        match err.kind() {
            ErrorKind::NotFound => AppError::NotFound(format!("asset {} does not exist", path)),
            _ => AppError::Internal(format!("asset {} is unreadable: {}", path, err)),
        }
    })?;

    state.record_asset_request();
    info!(path = %path, "streaming http asset");

    let body = read_chunks(file, state.config.streaming.read_buffer_size);
    Ok(HttpResponse::Ok()
        .content_type("audio/wav")
        .keep_alive()
        .streaming(body))
}
