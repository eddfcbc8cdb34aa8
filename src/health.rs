use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port,
            "tls": state.tls_enabled
        },
        "sessions": {
            "active": metrics.active_sessions(),
            "started": metrics.sessions_started,
            "completed": metrics.sessions_completed,
            "aborted": metrics.sessions_aborted
        },
        "traffic": {
            "frames_sent": metrics.frames_sent,
            "bytes_sent": metrics.bytes_sent,
            "asset_requests": metrics.asset_requests
        },
        "streaming": {
            "read_buffer_size": config.streaming.read_buffer_size,
            "channel_capacity": config.streaming.channel_capacity,
            "close_on_complete": config.streaming.close_on_complete
        }
    }))
}
