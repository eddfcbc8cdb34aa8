//! # Audio Framing Module
//!
//! Everything between the asset file on disk and the frames a socket sends.
//!
//! ## Key Components:
//! - **format**: the immutable `AudioFormat` descriptor and its JSON announcement
//! - **parser**: incremental RIFF/RIFX WAVE decoder producing format + PCM chunk events
//! - **encoder**: wraps one PCM chunk into a standalone, playable WAV file
//! - **framer**: the two framing strategies and the `Frame` sum type
//! - **pipeline**: source and framer tasks joined by bounded channels

pub mod encoder;
pub mod format;
pub mod framer;
pub mod parser;
pub mod pipeline;
