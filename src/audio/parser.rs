//! # Incremental WAV Container Parser
//!
//! Push-based, single-pass decoder for RIFF/RIFX WAVE streams. Bytes are fed
//! in whatever pieces the source produced them in; the parser emits exactly one
//! `ParseEvent::Format` when the `fmt ` chunk is complete, then one
//! `ParseEvent::Chunk` per pushed piece that carries bytes of the data section.
//! Chunk boundaries therefore follow the read granularity of the source, not
//! sample frames.
//!
//! ## Container layout handled:
//! ```text
//! "RIFF"|"RIFX"  u32 size  "WAVE"
//!   "fmt "  u32 len  audio_format channels sample_rate byte_rate block_align bit_depth [ext...]
//!   <other chunks, skipped, word aligned>
//!   "data"  u32 len  <pcm bytes...>
//! ```
//! WAVE_FORMAT_EXTENSIBLE headers are reported with the tag from their
//! sub-format GUID, so downstream stages only ever see plain encoding tags.
//!
//! A data length of `0xFFFFFFFF` means the writer did not know the length and
//! the data runs to the end of the stream. Anything after a bounded data
//! section is ignored.

use crate::audio::format::{AudioFormat, Endianness, WAVE_FORMAT_EXTENSIBLE};
use crate::error::ParseError;
use actix_web::web::Bytes;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::sync::Arc;
use tracing::debug;

const RIFF_HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;
const MIN_FMT_LEN: u32 = 16;
const MAX_FMT_LEN: u32 = 4096;
/// fmt body size once the 22-byte extensible extension is included
const EXTENSIBLE_FMT_LEN: usize = 40;
/// Offset of the sub-format GUID inside an extensible fmt body
const SUB_FORMAT_OFFSET: usize = 24;

/// Data length written by encoders that stream without knowing the final size.
pub const UNBOUNDED_DATA_LEN: u32 = u32::MAX;

/// A run of raw sample bytes, tagged with the format of the parse that produced it.
#[derive(Debug, Clone)]
pub struct PcmChunk {
    format: Arc<AudioFormat>,
    data: Bytes,
}

impl PcmChunk {
    pub fn new(format: Arc<AudioFormat>, data: Bytes) -> Self {
        Self { format, data }
    }

    pub fn format(&self) -> &Arc<AudioFormat> {
        &self.format
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn into_data(self) -> Bytes {
        self.data
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// What the parser produces, in order: one `Format`, then zero or more `Chunk`s.
#[derive(Debug, Clone)]
pub enum ParseEvent {
    Format(Arc<AudioFormat>),
    Chunk(PcmChunk),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    RiffHeader,
    ChunkHeader,
    /// Accumulating a fmt chunk body of this many bytes (pad included)
    Format { len: usize },
    /// Discarding the rest of an uninteresting chunk
    Skip { remaining: u64 },
    /// Inside the data section; None when unbounded
    Data { remaining: Option<u64> },
    /// Data section finished, everything else is ignored
    Done,
}

pub struct WavParser {
    state: State,
    endianness: Endianness,
    header: Vec<u8>,
    format: Option<Arc<AudioFormat>>,
    data_bytes: u64,
}

impl Default for WavParser {
    fn default() -> Self {
        Self::new()
    }
}

impl WavParser {
    pub fn new() -> Self {
        Self {
            state: State::RiffHeader,
            endianness: Endianness::Little,
            header: Vec::with_capacity(64),
            format: None,
            data_bytes: 0,
        }
    }

    /// Total data-section bytes emitted so far.
    pub fn data_bytes(&self) -> u64 {
        self.data_bytes
    }

    /// Feed the next piece of the stream.
    ///
    /// Returns the events this piece completed. At most one `Chunk` is returned
    /// per call because a WAV stream carries a single data section.
    pub fn push(&mut self, mut input: Bytes) -> Result<Vec<ParseEvent>, ParseError> {
        let mut events = Vec::new();

        while !input.is_empty() {
            match self.state {
                State::RiffHeader => {
                    if !self.fill(&mut input, RIFF_HEADER_LEN) {
                        break;
                    }
                    self.read_riff_header()?;
                }
                State::ChunkHeader => {
                    if !self.fill(&mut input, CHUNK_HEADER_LEN) {
                        break;
                    }
                    self.read_chunk_header()?;
                }
                State::Format { len } => {
                    if !self.fill(&mut input, len) {
                        break;
                    }
                    let format = self.read_format()?;
                    events.push(ParseEvent::Format(format));
                }
                State::Skip { remaining } => {
                    let take = remaining.min(input.len() as u64);
                    let _ = input.split_to(take as usize);
                    self.state = if take == remaining {
                        State::ChunkHeader
                    } else {
                        State::Skip { remaining: remaining - take }
                    };
                }
                State::Data { remaining } => {
                    let Some(format) = self.format.clone() else {
                        return Err(ParseError::DataBeforeFormat);
                    };

                    let take = match remaining {
                        Some(left) => left.min(input.len() as u64) as usize,
                        None => input.len(),
                    };
                    let data = input.split_to(take);
                    self.data_bytes += take as u64;

                    if let Some(left) = remaining {
                        let left = left - take as u64;
                        self.state = if left == 0 {
                            State::Done
                        } else {
                            State::Data { remaining: Some(left) }
                        };
                    }

                    events.push(ParseEvent::Chunk(PcmChunk::new(format, data)));
                }
                State::Done => {
                    input.clear();
                }
            }
        }

        Ok(events)
    }

    /// Signal end of stream. Fails when the stream stopped before or inside
    /// a bounded data section.
    pub fn finish(&self) -> Result<(), ParseError> {
        match self.state {
            State::Done | State::Data { remaining: None } => Ok(()),
            State::Data { remaining: Some(missing) } => Err(ParseError::Truncated { missing }),
            State::RiffHeader => Err(ParseError::UnexpectedEof("RIFF header")),
            State::ChunkHeader | State::Format { .. } | State::Skip { .. } => {
                if self.format.is_none() {
                    Err(ParseError::UnexpectedEof("fmt chunk"))
                } else {
                    Err(ParseError::UnexpectedEof("data chunk"))
                }
            }
        }
    }

    /// Move bytes from `input` into the header buffer until it holds `needed`.
    fn fill(&mut self, input: &mut Bytes, needed: usize) -> bool {
        let want = needed.saturating_sub(self.header.len());
        let take = want.min(input.len());
        self.header.extend_from_slice(&input.split_to(take));
        self.header.len() >= needed
    }

    fn read_riff_header(&mut self) -> Result<(), ParseError> {
        let tag = four_cc(&self.header[0..4]);
        self.endianness = match &tag {
            b"RIFF" => Endianness::Little,
            b"RIFX" => Endianness::Big,
            _ => return Err(ParseError::NotRiff(tag)),
        };

        let form = four_cc(&self.header[8..12]);
        if &form != b"WAVE" {
            return Err(ParseError::NotWave(form));
        }

        self.header.clear();
        self.state = State::ChunkHeader;
        Ok(())
    }

    fn read_chunk_header(&mut self) -> Result<(), ParseError> {
        let id = four_cc(&self.header[0..4]);
        let len = self.u32_at(4);
        self.header.clear();

        self.state = match &id {
            b"fmt " => {
                if self.format.is_some() {
                    return Err(ParseError::DuplicateFormat);
                }
                if !(MIN_FMT_LEN..=MAX_FMT_LEN).contains(&len) {
                    return Err(ParseError::InvalidFormat(format!(
                        "fmt chunk is {} bytes, expected {}..={}",
                        len, MIN_FMT_LEN, MAX_FMT_LEN
                    )));
                }
                State::Format { len: padded(len) as usize }
            }
            b"data" => {
                if self.format.is_none() {
                    return Err(ParseError::DataBeforeFormat);
                }
                debug!(data_len = len, "data section started");
                match len {
                    UNBOUNDED_DATA_LEN => State::Data { remaining: None },
                    0 => State::Done,
                    len => State::Data { remaining: Some(len as u64) },
                }
            }
            _ => {
                debug!(chunk = %String::from_utf8_lossy(&id), len, "skipping chunk");
                State::Skip { remaining: padded(len) }
            }
        };
        Ok(())
    }

    fn read_format(&mut self) -> Result<Arc<AudioFormat>, ParseError> {
        let mut audio_format = self.u16_at(0);
        if audio_format == WAVE_FORMAT_EXTENSIBLE {
            if self.header.len() < EXTENSIBLE_FMT_LEN {
                return Err(ParseError::InvalidFormat(format!(
                    "extensible fmt chunk is {} bytes, expected at least {}",
                    self.header.len(),
                    EXTENSIBLE_FMT_LEN
                )));
            }
            // First GUID field holds the plain format tag in its low 16 bits
            audio_format = self.u32_at(SUB_FORMAT_OFFSET) as u16;
        }
        let channels = self.u16_at(2);
        let sample_rate = self.u32_at(4);
        let byte_rate = self.u32_at(8);
        let block_align = self.u16_at(12);
        let bit_depth = self.u16_at(14);
        self.header.clear();

        if channels == 0 {
            return Err(ParseError::InvalidFormat("channel count is 0".to_string()));
        }
        if sample_rate == 0 {
            return Err(ParseError::InvalidFormat("sample rate is 0".to_string()));
        }
        if bit_depth == 0 {
            return Err(ParseError::InvalidFormat("bit depth is 0".to_string()));
        }

        let format = Arc::new(AudioFormat {
            audio_format,
            endianness: self.endianness,
            channels,
            sample_rate,
            byte_rate,
            block_align,
            bit_depth,
            signed: bit_depth != 8,
        });

        debug!(
            encoding = format.encoding(),
            sample_rate,
            channels,
            bit_depth,
            endianness = ?self.endianness,
            "format parsed"
        );

        self.format = Some(format.clone());
        self.state = State::ChunkHeader;
        Ok(format)
    }

    fn u16_at(&self, offset: usize) -> u16 {
        let bytes = &self.header[offset..offset + 2];
        match self.endianness {
            Endianness::Little => LittleEndian::read_u16(bytes),
            Endianness::Big => BigEndian::read_u16(bytes),
        }
    }

    fn u32_at(&self, offset: usize) -> u32 {
        let bytes = &self.header[offset..offset + 4];
        match self.endianness {
            Endianness::Little => LittleEndian::read_u32(bytes),
            Endianness::Big => BigEndian::read_u32(bytes),
        }
    }
}

fn four_cc(bytes: &[u8]) -> [u8; 4] {
    let mut tag = [0u8; 4];
    tag.copy_from_slice(&bytes[..4]);
    tag
}

/// RIFF chunks are word aligned: odd lengths carry one pad byte.
fn padded(len: u32) -> u64 {
    len as u64 + (len & 1) as u64
}
