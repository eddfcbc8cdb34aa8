//! # Audio Format Descriptor
//!
//! The immutable description of a WAV stream's samples, produced once per
//! parse and shared (behind an `Arc`) with every chunk taken from that parse.
//! Serialized with camelCase keys because the raw-stream endpoint sends it to
//! browsers as its first, JSON, message.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// `audioFormat` tag for integer PCM.
pub const WAVE_FORMAT_PCM: u16 = 0x0001;

/// `audioFormat` tag for 32/64-bit IEEE floats.
pub const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;

/// `audioFormat` tag for WAVE_FORMAT_EXTENSIBLE headers.
pub const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Byte order of the container, `RIFF` (little) or `RIFX` (big).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Endianness {
    #[serde(rename = "LE")]
    Little,
    #[serde(rename = "BE")]
    Big,
}

impl Endianness {
    /// The four-byte container tag for this byte order.
    pub fn riff_tag(self) -> &'static [u8; 4] {
        match self {
            Endianness::Little => b"RIFF",
            Endianness::Big => b"RIFX",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFormat {
    /// Encoding tag from the fmt chunk (1 = PCM, 3 = IEEE float, ...).
    /// Extensible headers carry their sub-format's tag here.
    pub audio_format: u16,
    pub endianness: Endianness,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bit_depth: u16,
    /// 8-bit WAV samples are unsigned, every other depth is signed
    pub signed: bool,
}

impl AudioFormat {
    /// Little-endian integer PCM with derived byte rate and block alignment.
    #[cfg(test)]
    pub fn pcm(sample_rate: u32, channels: u16, bit_depth: u16) -> Self {
        let block_align = channels * bit_depth.div_ceil(8);
        Self {
            audio_format: WAVE_FORMAT_PCM,
            endianness: Endianness::Little,
            channels,
            sample_rate,
            byte_rate: sample_rate * block_align as u32,
            block_align,
            bit_depth,
            signed: bit_depth != 8,
        }
    }

    /// Human-readable encoding name, used in logs.
    pub fn encoding(&self) -> &'static str {
        match self.audio_format {
            WAVE_FORMAT_PCM => "pcm",
            WAVE_FORMAT_IEEE_FLOAT => "ieee_float",
            WAVE_FORMAT_EXTENSIBLE => "extensible",
            0x0006 => "alaw",
            0x0007 => "mulaw",
            _ => "unknown",
        }
    }
}

/// The control message that precedes raw PCM on the raw-stream endpoint.
///
/// Wire form: `{"format": {"audioFormat": 1, "endianness": "LE", ...}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatAnnouncement {
    pub format: AudioFormat,
}

impl FormatAnnouncement {
    pub fn new(format: &Arc<AudioFormat>) -> Self {
        Self {
            format: AudioFormat::clone(format),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm_derives_rates() {
        let format = AudioFormat::pcm(44100, 2, 16);
        assert_eq!(format.block_align, 4);
        assert_eq!(format.byte_rate, 176_400);
        assert!(format.signed);
        assert_eq!(format.encoding(), "pcm");

        let eight_bit = AudioFormat::pcm(8000, 1, 8);
        assert!(!eight_bit.signed);
        assert_eq!(eight_bit.block_align, 1);
    }

    #[test]
    fn test_announcement_wire_shape() {
        let format = Arc::new(AudioFormat::pcm(16000, 1, 16));
        let json = serde_json::to_value(FormatAnnouncement::new(&format)).unwrap();

        assert_eq!(json["format"]["audioFormat"], 1);
        assert_eq!(json["format"]["endianness"], "LE");
        assert_eq!(json["format"]["sampleRate"], 16000);
        assert_eq!(json["format"]["byteRate"], 32000);
        assert_eq!(json["format"]["blockAlign"], 2);
        assert_eq!(json["format"]["bitDepth"], 16);
        assert_eq!(json["format"]["signed"], true);
    }
}
