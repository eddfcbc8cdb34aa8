//! # Streaming Pipeline
//!
//! Connects a source file to a socket session through two tasks and two
//! bounded channels:
//!
//! ```text
//! file ──read──▶ [source task: WavParser] ──ParseEvent──▶ [framer task: Framer] ──Frame──▶ session
//! ```
//!
//! Ordering is FIFO end to end. Errors travel in-band as the last item.
//! Dropping the frame receiver is the cancellation signal: the framer task
//! notices the closed channel and exits, which closes the event channel, which
//! stops the source task before its next read and drops the file handle.

use crate::audio::framer::{Frame, Framer, StreamMode};
use crate::audio::parser::{ParseEvent, WavParser};
use crate::config::StreamingConfig;
use crate::error::StreamError;
use actix_web::web::Bytes;
use futures_util::{stream, Stream, StreamExt};
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub type EventResult = Result<ParseEvent, StreamError>;
pub type FrameResult = Result<Frame, StreamError>;

#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub read_buffer_size: usize,
    pub channel_capacity: usize,
}

impl From<&StreamingConfig> for PipelineConfig {
    fn from(config: &StreamingConfig) -> Self {
        Self {
            read_buffer_size: config.read_buffer_size,
            channel_capacity: config.channel_capacity,
        }
    }
}

/// How the source task ended, with the number of non-empty reads it performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    Completed { reads: u64 },
    Cancelled { reads: u64 },
    Failed { reads: u64 },
}

pub struct Pipeline {
    pub frames: mpsc::Receiver<FrameResult>,
    pub source_task: JoinHandle<PipelineOutcome>,
}

impl Pipeline {
    /// Start reading `source` and framing it for `mode`.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn spawn(source: PathBuf, mode: StreamMode, config: PipelineConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.channel_capacity);
        let (frame_tx, frame_rx) = mpsc::channel(config.channel_capacity);

        let source_task = tokio::spawn(run_source(source, config.read_buffer_size, event_tx));
        tokio::spawn(run_framer(mode.framer(), event_rx, frame_tx));

        Self {
            frames: frame_rx,
            source_task,
        }
    }
}

/// Read an open file as a stream of pieces of at most `buffer_size` bytes.
///
/// The file is dropped as soon as the stream ends, errors, or is dropped.
pub fn read_chunks(file: File, buffer_size: usize) -> impl Stream<Item = std::io::Result<Bytes>> {
    stream::unfold(Some(file), move |state| async move {
        let mut file = state?;
        let mut buf = vec![0u8; buffer_size];
        match file.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(Bytes::from(buf)), Some(file)))
            }
            Err(err) => Some((Err(err), None)),
        }
    })
}

async fn run_source(path: PathBuf, buffer_size: usize, tx: mpsc::Sender<EventResult>) -> PipelineOutcome {
    let file = match File::open(&path).await {
        Ok(file) => file,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "cannot open source asset");
            let _ = tx.send(Err(StreamError::SourceRead(err))).await;
            return PipelineOutcome::Failed { reads: 0 };
        }
    };

    let mut pieces = std::pin::pin!(read_chunks(file, buffer_size));
    let mut parser = WavParser::new();
    let mut reads = 0u64;

    loop {
        let next = tokio::select! {
            biased;
            _ = tx.closed() => {
                debug!(path = %path.display(), reads, "consumer gone, stopping source");
                return PipelineOutcome::Cancelled { reads };
            }
            next = pieces.next() => next,
        };

        let piece = match next {
            None => break,
            Some(Ok(piece)) => piece,
            Some(Err(err)) => {
                warn!(path = %path.display(), error = %err, "source read failed");
                let _ = tx.send(Err(StreamError::SourceRead(err))).await;
                return PipelineOutcome::Failed { reads };
            }
        };
        reads += 1;

        let events = match parser.push(piece) {
            Ok(events) => events,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "malformed container");
                let _ = tx.send(Err(err.into())).await;
                return PipelineOutcome::Failed { reads };
            }
        };

        for event in events {
            if tx.send(Ok(event)).await.is_err() {
                return PipelineOutcome::Cancelled { reads };
            }
        }
    }

    match parser.finish() {
        Ok(()) => {
            debug!(path = %path.display(), reads, data_bytes = parser.data_bytes(), "source exhausted");
            PipelineOutcome::Completed { reads }
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "container ended early");
            let _ = tx.send(Err(err.into())).await;
            PipelineOutcome::Failed { reads }
        }
    }
}

async fn run_framer(
    mut framer: Box<dyn Framer>,
    mut events: mpsc::Receiver<EventResult>,
    frames: mpsc::Sender<FrameResult>,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = frames.closed() => return,
            event = events.recv() => event,
        };

        let Some(event) = event else {
            return;
        };

        let item = match event.and_then(|event| framer.frame(event)) {
            Ok(Some(frame)) => Ok(frame),
            Ok(None) => continue,
            Err(err) => Err(err),
        };

        let failed = item.is_err();
        if frames.send(item).await.is_err() || failed {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::format::AudioFormat;
    use crate::audio::parser::PcmChunk;
    use crate::error::ParseError;
    use crate::test_support::{pcm_ramp, remove_fixture, wav_bytes, write_fixture};
    use std::time::Duration;

    async fn drain(mut pipeline: Pipeline) -> (Vec<FrameResult>, PipelineOutcome) {
        let mut items = Vec::new();
        while let Some(item) = pipeline.frames.recv().await {
            items.push(item);
        }
        (items, pipeline.source_task.await.unwrap())
    }

    fn config(read_buffer_size: usize) -> PipelineConfig {
        PipelineConfig {
            read_buffer_size,
            channel_capacity: 4,
        }
    }

    #[actix_web::test]
    async fn test_read_chunks_follows_buffer_size() {
        let bytes: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let path = write_fixture(&bytes);

        let file = File::open(&path).await.unwrap();
        let pieces: Vec<Bytes> = read_chunks(file, 300).map(|p| p.unwrap()).collect().await;

        assert_eq!(pieces.iter().map(|p| p.len()).collect::<Vec<_>>(), vec![300, 300, 300, 100]);
        assert_eq!(pieces.concat(), bytes);
        remove_fixture(&path);
    }

    #[actix_web::test]
    async fn test_raw_stream_pipeline_announces_then_forwards() {
        let format = AudioFormat::pcm(8000, 1, 16);
        let data = pcm_ramp(300);
        let path = write_fixture(&wav_bytes(&format, &data));

        let (items, outcome) = drain(Pipeline::spawn(path.clone(), StreamMode::RawHeaderThenPcm, config(128))).await;

        let mut frames = items.into_iter().map(|item| item.unwrap());
        match frames.next() {
            Some(Frame::FormatAnnouncement(announced)) => assert_eq!(*announced, format),
            other => panic!("expected announcement first, got {:?}", other),
        }
        let mut streamed = Vec::new();
        for frame in frames {
            match frame {
                Frame::RawPcm(bytes) => streamed.extend_from_slice(&bytes),
                other => panic!("unexpected frame {:?}", other),
            }
        }
        assert_eq!(streamed, data);
        // 44 + 600 bytes in 128-byte reads
        assert_eq!(outcome, PipelineOutcome::Completed { reads: 6 });
        remove_fixture(&path);
    }

    #[actix_web::test]
    async fn test_chunk_pipeline_emits_one_file_per_read() {
        let format = AudioFormat::pcm(8000, 1, 16);
        let data = pcm_ramp(42);
        let path = write_fixture(&wav_bytes(&format, &data));

        let (items, outcome) = drain(Pipeline::spawn(path.clone(), StreamMode::ReEncodedChunks, config(64))).await;
        assert_eq!(outcome, PipelineOutcome::Completed { reads: 2 });

        let mut reassembled = Vec::new();
        for item in &items {
            let Ok(Frame::StandaloneWav(bytes)) = item else {
                panic!("unexpected item {:?}", item);
            };
            let mut parser = WavParser::new();
            for event in parser.push(bytes.clone()).unwrap() {
                match event {
                    ParseEvent::Format(parsed) => assert_eq!(*parsed, format),
                    ParseEvent::Chunk(chunk) => reassembled.extend_from_slice(chunk.data()),
                }
            }
        }
        assert_eq!(items.len(), 2);
        assert_eq!(reassembled, data);
        remove_fixture(&path);
    }

    #[actix_web::test]
    async fn test_missing_source_fails_in_band() {
        let path = std::env::temp_dir().join("wavestream-does-not-exist.wav");
        let (items, outcome) = drain(Pipeline::spawn(path, StreamMode::ReEncodedChunks, config(64))).await;

        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(StreamError::SourceRead(_))));
        assert_eq!(outcome, PipelineOutcome::Failed { reads: 0 });
    }

    #[actix_web::test]
    async fn test_malformed_header_ends_stream_with_parse_error() {
        let path = write_fixture(b"ID3\x04 this is an mp3, not a wave file");
        let (items, outcome) = drain(Pipeline::spawn(path.clone(), StreamMode::RawHeaderThenPcm, config(64))).await;

        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(StreamError::Parse(ParseError::NotRiff(_)))));
        assert_eq!(outcome, PipelineOutcome::Failed { reads: 1 });
        remove_fixture(&path);
    }

    #[actix_web::test]
    async fn test_truncated_data_reports_after_delivered_frames() {
        let format = AudioFormat::pcm(8000, 1, 16);
        let bytes = wav_bytes(&format, &pcm_ramp(100));
        let path = write_fixture(&bytes[..bytes.len() - 10]);

        let (items, outcome) = drain(Pipeline::spawn(path.clone(), StreamMode::RawHeaderThenPcm, config(4096))).await;

        assert_eq!(items.len(), 3);
        assert!(matches!(items[0], Ok(Frame::FormatAnnouncement(_))));
        assert!(matches!(items[1], Ok(Frame::RawPcm(_))));
        assert!(matches!(items[2], Err(StreamError::Parse(ParseError::Truncated { missing: 10 }))));
        assert_eq!(outcome, PipelineOutcome::Failed { reads: 1 });
        remove_fixture(&path);
    }

    #[actix_web::test]
    async fn test_dropping_receiver_stops_reading_and_releases_file() {
        let format = AudioFormat::pcm(8000, 1, 16);
        let path = write_fixture(&wav_bytes(&format, &pcm_ramp(32 * 1024)));
        let total_reads = (44 + 64 * 1024) / 256 + 1;

        let mut pipeline = Pipeline::spawn(
            path.clone(),
            StreamMode::ReEncodedChunks,
            PipelineConfig {
                read_buffer_size: 256,
                channel_capacity: 1,
            },
        );

        let first = pipeline.frames.recv().await.unwrap();
        assert!(matches!(first, Ok(Frame::StandaloneWav(_))));
        drop(pipeline.frames);

        let outcome = tokio::time::timeout(Duration::from_secs(5), pipeline.source_task)
            .await
            .expect("source task did not stop after cancellation")
            .unwrap();

        match outcome {
            PipelineOutcome::Cancelled { reads } => assert!(reads < 16 && reads < total_reads, "read {} pieces", reads),
            other => panic!("expected cancellation, got {:?}", other),
        }
        remove_fixture(&path);
    }

    #[actix_web::test]
    async fn test_framer_stage_stops_on_error() {
        let (event_tx, event_rx) = mpsc::channel(4);
        let (frame_tx, mut frame_rx) = mpsc::channel(4);
        let format = std::sync::Arc::new(AudioFormat::pcm(8000, 1, 16));

        event_tx.send(Ok(ParseEvent::Format(format.clone()))).await.unwrap();
        event_tx.send(Err(StreamError::Encode("boom".to_string()))).await.unwrap();
        event_tx
            .send(Ok(ParseEvent::Chunk(PcmChunk::new(format, Bytes::from_static(&[0, 0])))))
            .await
            .unwrap();

        run_framer(StreamMode::RawHeaderThenPcm.framer(), event_rx, frame_tx).await;

        assert!(matches!(frame_rx.recv().await, Some(Ok(Frame::FormatAnnouncement(_)))));
        assert!(matches!(frame_rx.recv().await, Some(Err(StreamError::Encode(_)))));
        assert!(frame_rx.recv().await.is_none());
    }
}
