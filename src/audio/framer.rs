//! # Framing Strategies
//!
//! Turns parser events into the frames a socket session puts on the wire.
//! Two strategies exist, one per WebSocket endpoint:
//!
//! | Mode | Endpoint | On format | On chunk |
//! |------|----------|-----------|----------|
//! | `ReEncodedChunks` | `/wavechunks1` | nothing | `StandaloneWav` (header + chunk) |
//! | `RawHeaderThenPcm` | `/wavestream2` | `FormatAnnouncement` | `RawPcm` (chunk as is) |
//!
//! Both are strictly 1:1 per chunk and preserve chunk order.

use crate::audio::encoder::encode_standalone;
use crate::audio::format::{AudioFormat, FormatAnnouncement};
use crate::audio::parser::ParseEvent;
use crate::error::StreamError;
use actix_web::web::Bytes;
use std::fmt;
use std::sync::Arc;

/// The unit sent over the wire.
#[derive(Debug, Clone)]
pub enum Frame {
    /// A complete WAV file holding exactly one chunk
    StandaloneWav(Bytes),
    /// The stream's format, sent once before any `RawPcm`
    FormatAnnouncement(Arc<AudioFormat>),
    /// Bare PCM bytes, meaningless without the preceding announcement
    RawPcm(Bytes),
}

/// How a frame is carried by a WebSocket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WirePayload {
    Text(String),
    Binary(Bytes),
}

impl Frame {
    pub fn into_payload(self) -> Result<WirePayload, StreamError> {
        match self {
            Frame::StandaloneWav(bytes) | Frame::RawPcm(bytes) => Ok(WirePayload::Binary(bytes)),
            Frame::FormatAnnouncement(format) => serde_json::to_string(&FormatAnnouncement::new(&format))
                .map(WirePayload::Text)
                .map_err(|e| StreamError::Encode(format!("format announcement: {}", e))),
        }
    }
}

/// Which framing strategy a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    ReEncodedChunks,
    RawHeaderThenPcm,
}

impl StreamMode {
    pub fn framer(self) -> Box<dyn Framer> {
        match self {
            StreamMode::ReEncodedChunks => Box::new(ChunkReEncoder),
            StreamMode::RawHeaderThenPcm => Box::new(RawStreamFramer::default()),
        }
    }
}

impl fmt::Display for StreamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamMode::ReEncodedChunks => write!(f, "wave-chunks"),
            StreamMode::RawHeaderThenPcm => write!(f, "wave-stream"),
        }
    }
}

/// A framing stage: consumes parser events in order, yields at most one frame per event.
pub trait Framer: Send {
    fn frame(&mut self, event: ParseEvent) -> Result<Option<Frame>, StreamError>;
}

/// Mode A: every chunk becomes its own playable WAV file.
#[derive(Debug, Default)]
pub struct ChunkReEncoder;

impl Framer for ChunkReEncoder {
    fn frame(&mut self, event: ParseEvent) -> Result<Option<Frame>, StreamError> {
        match event {
            // Every frame carries its own header, nothing to announce
            ParseEvent::Format(_) => Ok(None),
            ParseEvent::Chunk(chunk) => {
                let frame = encode_standalone(chunk.format(), chunk.data())?;
                Ok(Some(Frame::StandaloneWav(frame)))
            }
        }
    }
}

/// Mode B: announce the format once, then forward chunks untouched.
#[derive(Debug, Default)]
pub struct RawStreamFramer {
    announced: bool,
}

impl Framer for RawStreamFramer {
    fn frame(&mut self, event: ParseEvent) -> Result<Option<Frame>, StreamError> {
        match event {
            ParseEvent::Format(format) => {
                self.announced = true;
                Ok(Some(Frame::FormatAnnouncement(format)))
            }
            ParseEvent::Chunk(chunk) => {
                if !self.announced {
                    return Err(StreamError::Encode("raw PCM chunk before format announcement".to_string()));
                }
                Ok(Some(Frame::RawPcm(chunk.into_data())))
            }
        }
    }
}
