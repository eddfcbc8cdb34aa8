//! # WebSocket Streaming Session
//!
//! One `StreamingSocket` actor per accepted upgrade. It owns the connection
//! and one running [`Pipeline`], and turns every frame the pipeline produces
//! into exactly one WebSocket message.
//!
//! ## Message Flow:
//! - **Server → Client**: frames from the pipeline, in production order.
//!   `FormatAnnouncement` goes out as a text message, everything else as binary.
//! - **Client → Server**: logged with the session id and otherwise ignored.
//!
//! ## Session Lifecycle:
//! `Created → Streaming → {Completed | Aborted}`
//!
//! - **Completed**: the source ran out normally
//! - **Aborted**: source read error, malformed container, client close,
//!   protocol error or server shutdown
//!
//! Stopping the actor drops the frame receiver, which is what stops the
//! pipeline and releases the asset's file handle.
//!
//! ## Actor Model:
//! The frame channel is attached with `ctx.add_stream`, so frames and
//! inbound messages are both handled on the actor's own mailbox and never
//! block each other.

use crate::audio::framer::{Frame, StreamMode, WirePayload};
use crate::audio::pipeline::{FrameResult, Pipeline, PipelineConfig};
use crate::error::StreamError;
use crate::state::{AppState, Shutdown};
use actix::prelude::*;
use actix_web_actors::ws;
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Streaming,
    Completed,
    Aborted,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Aborted)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Created => write!(f, "created"),
            SessionState::Streaming => write!(f, "streaming"),
            SessionState::Completed => write!(f, "completed"),
            SessionState::Aborted => write!(f, "aborted"),
        }
    }
}

/// WebSocket actor binding one connection to one streaming pipeline.
pub struct StreamingSocket {
    /// Correlates every log line of this connection
    id: Uuid,
    mode: StreamMode,
    /// Asset this session reads, opened by the pipeline on start
    source: PathBuf,
    app: AppState,
    state: SessionState,
    /// Key in the connection registry while the actor is alive
    registration: Option<u64>,
    frames_sent: u64,
    bytes_sent: u64,
    started_at: Instant,
}

impl StreamingSocket {
    pub fn new(mode: StreamMode, source: PathBuf, app: AppState) -> Self {
        Self {
            id: Uuid::new_v4(),
            mode,
            source,
            app,
            state: SessionState::Created,
            registration: None,
            frames_sent: 0,
            bytes_sent: 0,
            started_at: Instant::now(),
        }
    }

    /// Move to a terminal state once. Later calls are ignored.
    fn finish(&mut self, outcome: SessionState) {
        if self.state.is_terminal() {
            return;
        }
        self.state = outcome;
        self.app.record_session_finished(outcome == SessionState::Completed);

        info!(
            session_id = %self.id,
            mode = %self.mode,
            state = %outcome,
            frames = self.frames_sent,
            bytes = self.bytes_sent,
            elapsed_ms = self.started_at.elapsed().as_millis() as u64,
            "session finished"
        );
    }

    fn send_frame(&mut self, frame: Frame, ctx: &mut ws::WebsocketContext<Self>) -> Result<(), StreamError> {
        let len = match frame.into_payload()? {
            WirePayload::Text(text) => {
                let len = text.len();
                ctx.text(text);
                len
            }
            WirePayload::Binary(bytes) => {
                let len = bytes.len();
                ctx.binary(bytes);
                len
            }
        };

        self.frames_sent += 1;
        self.bytes_sent += len as u64;
        self.app.record_frame_sent(len);
        Ok(())
    }

    /// Close the socket and stop the actor.
    fn abort(&mut self, ctx: &mut ws::WebsocketContext<Self>, code: ws::CloseCode, description: &str) {
        ctx.close(Some(ws::CloseReason {
            code,
            description: Some(description.to_string()),
        }));
        self.finish(SessionState::Aborted);
        ctx.stop();
    }
}

impl Actor for StreamingSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.registration = Some(self.app.registry.register(ctx.address().recipient()));
        self.app.record_session_started();

        let config = PipelineConfig::from(&self.app.config.streaming);
        let pipeline = Pipeline::spawn(self.source.clone(), self.mode, config);
        self.state = SessionState::Streaming;

        info!(
            session_id = %self.id,
            mode = %self.mode,
            source = %self.source.display(),
            "session started"
        );

        let session_id = self.id;
        actix::spawn(async move {
            if let Ok(outcome) = pipeline.source_task.await {
                debug!(session_id = %session_id, ?outcome, "source task ended");
            }
        });

        ctx.add_stream(ReceiverStream::new(pipeline.frames));
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some(registration) = self.registration.take() {
            self.app.registry.deregister(registration);
        }
        self.finish(SessionState::Aborted);
        debug!(session_id = %self.id, "session stopped");
    }
}

/// Frames coming out of the pipeline.
impl StreamHandler<FrameResult> for StreamingSocket {
    fn handle(&mut self, item: FrameResult, ctx: &mut Self::Context) {
        if self.state.is_terminal() {
            return;
        }

        match item.and_then(|frame| self.send_frame(frame, ctx)) {
            Ok(()) => {}
            Err(StreamError::SourceRead(err)) => {
                error!(session_id = %self.id, source = %self.source.display(), error = %err, "asset unreadable");
                self.abort(ctx, ws::CloseCode::Error, "audio source unavailable");
            }
            Err(err) => {
                // Pipeline is gone but the client may keep talking
                warn!(session_id = %self.id, error = %err, "stream aborted, socket stays open");
                self.finish(SessionState::Aborted);
            }
        }
    }

    /// The pipeline has nothing more to send.
    fn finished(&mut self, ctx: &mut Self::Context) {
        // Aborted streams already decided whether the socket stays open
        if self.state != SessionState::Streaming {
            return;
        }
        self.finish(SessionState::Completed);

        if self.app.config.streaming.close_on_complete {
            ctx.close(Some(ws::CloseCode::Normal.into()));
            ctx.stop();
        }
    }
}

/// Messages from the client.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for StreamingSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                info!(session_id = %self.id, message = %text, "client message");
            }
            Ok(ws::Message::Binary(data)) => {
                info!(session_id = %self.id, bytes = data.len(), "client binary message");
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Close(reason)) => {
                info!(session_id = %self.id, ?reason, "client closed connection");
                ctx.close(reason);
                self.finish(SessionState::Aborted);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!(session_id = %self.id, "unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                let err = StreamError::Transport(err.to_string());
                error!(session_id = %self.id, error = %err, "websocket failure");
                self.finish(SessionState::Aborted);
                ctx.stop();
            }
        }
    }
}

impl Handler<Shutdown> for StreamingSocket {
    type Result = ();

    fn handle(&mut self, _msg: Shutdown, ctx: &mut Self::Context) {
        debug!(session_id = %self.id, "closing for server shutdown");
        self.abort(ctx, ws::CloseCode::Away, "server shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!SessionState::Created.is_terminal());
        assert!(!SessionState::Streaming.is_terminal());
        assert!(SessionState::Completed.is_terminal());
        assert!(SessionState::Aborted.is_terminal());
    }

    #[test]
    fn test_new_session_is_created() {
        let session = StreamingSocket::new(
            StreamMode::RawHeaderThenPcm,
            PathBuf::from("assets/test2.wav"),
            AppState::new(Default::default()),
        );
        assert_eq!(session.state, SessionState::Created);
        assert_eq!(session.state.to_string(), "created");
    }

    #[test]
    fn test_finish_only_counts_once() {
        let app = AppState::new(Default::default());
        let mut session = StreamingSocket::new(StreamMode::ReEncodedChunks, PathBuf::from("x.wav"), app.clone());
        session.state = SessionState::Streaming;

        session.finish(SessionState::Completed);
        session.finish(SessionState::Aborted);

        assert_eq!(session.state, SessionState::Completed);
        let metrics = app.get_metrics_snapshot();
        assert_eq!(metrics.sessions_completed, 1);
        assert_eq!(metrics.sessions_aborted, 0);
    }
}
