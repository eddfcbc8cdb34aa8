//! # Error Handling
//!
//! Error types for the streaming server, split by who sees them:
//!
//! - **ParseError**: the container bytes could not be decoded as a WAV stream.
//! - **StreamError**: anything that ends one session's pipeline early
//!   (unreadable source, malformed header, encoding or transport failure).
//!   These never leave the session that produced them.
//! - **AppError**: failures of plain HTTP handlers, converted into JSON
//!   responses through actix's `ResponseError` trait.
//!
//! ## Rust Concepts:
//! - **enum variants with data**: each failure carries the detail needed to log it
//! - **Display + std::error::Error**: lets these types flow through `?` and `anyhow`
//! - **From impls**: `?` converts parser and I/O errors into `StreamError` automatically

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Ways a WAV container can fail to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The stream did not start with `RIFF` or `RIFX`.
    NotRiff([u8; 4]),

    /// The RIFF form type was something other than `WAVE`.
    NotWave([u8; 4]),

    /// The `fmt ` chunk was too short or described an impossible format.
    InvalidFormat(String),

    /// A `data` chunk appeared before any `fmt ` chunk.
    DataBeforeFormat,

    /// A second `fmt ` chunk appeared after the format was already emitted.
    DuplicateFormat,

    /// The source ended before the data section started.
    UnexpectedEof(&'static str),

    /// The source ended inside a data section that declared more bytes.
    Truncated { missing: u64 },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::NotRiff(tag) => {
                write!(f, "not a RIFF container (found {:?})", String::from_utf8_lossy(tag))
            }
            ParseError::NotWave(tag) => {
                write!(f, "RIFF form type is not WAVE (found {:?})", String::from_utf8_lossy(tag))
            }
            ParseError::InvalidFormat(msg) => write!(f, "invalid fmt chunk: {}", msg),
            ParseError::DataBeforeFormat => write!(f, "data chunk found before fmt chunk"),
            ParseError::DuplicateFormat => write!(f, "more than one fmt chunk"),
            ParseError::UnexpectedEof(stage) => write!(f, "unexpected end of stream while reading {}", stage),
            ParseError::Truncated { missing } => {
                write!(f, "data section truncated, {} declared bytes missing", missing)
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Errors that end a single streaming session.
///
/// ## Session impact:
/// - **SourceRead**: the asset is missing or unreadable; the session is closed
/// - **Parse**: the pipeline stops, the socket stays open with no more frames
/// - **Encode**: a chunk could not be wrapped into a standalone container
/// - **Transport**: the socket failed; the session is torn down
#[derive(Debug)]
pub enum StreamError {
    SourceRead(std::io::Error),
    Parse(ParseError),
    Encode(String),
    Transport(String),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::SourceRead(err) => write!(f, "source read error: {}", err),
            StreamError::Parse(err) => write!(f, "parse error: {}", err),
            StreamError::Encode(msg) => write!(f, "encode error: {}", msg),
            StreamError::Transport(msg) => write!(f, "transport error: {}", msg),
        }
    }
}

impl std::error::Error for StreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StreamError::SourceRead(err) => Some(err),
            StreamError::Parse(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ParseError> for StreamError {
    fn from(err: ParseError) -> Self {
        StreamError::Parse(err)
    }
}

/// Errors returned from plain HTTP handlers.
///
/// ## HTTP Status Code Mapping:
/// - NotFound → 404 (asset file missing, unknown path)
/// - Internal → 500
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

/// JSON error body:
/// ```json
/// { "error": { "type": "not_found", "message": "...", "timestamp": "2025-01-01T12:00:00Z" } }
/// ```
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = match self {
            AppError::NotFound(msg) => (actix_web::http::StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::Internal(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                msg.clone(),
            ),
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn test_parse_error_converts_into_stream_error() {
        let err: StreamError = ParseError::DataBeforeFormat.into();
        assert!(matches!(err, StreamError::Parse(ParseError::DataBeforeFormat)));
        assert_eq!(err.to_string(), "parse error: data chunk found before fmt chunk");
    }

    #[test]
    fn test_not_riff_message_shows_tag() {
        let err = ParseError::NotRiff(*b"OggS");
        assert!(err.to_string().contains("OggS"));
    }

    #[test]
    fn test_app_error_status_codes() {
        let not_found = AppError::NotFound("assets/test.wav".to_string());
        assert_eq!(not_found.error_response().status(), StatusCode::NOT_FOUND);

        let internal = AppError::from(anyhow::anyhow!("boom"));
        assert_eq!(internal.error_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
