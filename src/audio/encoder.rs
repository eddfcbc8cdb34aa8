//! Wraps a single PCM chunk into a minimal standalone WAV file.
//!
//! The output is a canonical 44-byte header (RIFF or RIFX, following the
//! source) plus the chunk's bytes, so a receiver can play or save each frame
//! without any other session state. The fmt chunk is always the plain
//! 16-byte form; extensible sources arrive here already resolved to their
//! sub-format tag by the parser.

use crate::audio::format::{AudioFormat, Endianness};
use crate::error::StreamError;
use actix_web::web::Bytes;
use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};
use std::io::Write;

/// Size of the header written in front of every chunk.
pub const STANDALONE_HEADER_LEN: usize = 44;

const FMT_CHUNK_LEN: u32 = 16;

/// Build `header + pcm` for one chunk.
///
/// Odd-length payloads get a trailing zero pad byte so the RIFF size stays
/// word aligned; the data length field still reports the true payload size.
pub fn encode_standalone(format: &AudioFormat, pcm: &[u8]) -> Result<Bytes, StreamError> {
    let data_len = u32::try_from(pcm.len())
        .ok()
        .filter(|len| *len <= u32::MAX - 1 - (STANDALONE_HEADER_LEN as u32))
        .ok_or_else(|| StreamError::Encode(format!("chunk of {} bytes does not fit a WAV header", pcm.len())))?;

    let pad = (data_len & 1) as usize;
    let mut out = Vec::with_capacity(STANDALONE_HEADER_LEN + pcm.len() + pad);

    let written = match format.endianness {
        Endianness::Little => write_header::<LittleEndian>(&mut out, format, data_len),
        Endianness::Big => write_header::<BigEndian>(&mut out, format, data_len),
    };
    written.map_err(|e| StreamError::Encode(e.to_string()))?;

    out.extend_from_slice(pcm);
    if pad == 1 {
        out.push(0);
    }

    Ok(Bytes::from(out))
}

fn write_header<B: ByteOrder>(out: &mut Vec<u8>, format: &AudioFormat, data_len: u32) -> std::io::Result<()> {
    // RIFF size covers everything after the 8-byte RIFF header, pad included
    let riff_len = (STANDALONE_HEADER_LEN as u32 - 8) + data_len + (data_len & 1);

    out.write_all(format.endianness.riff_tag())?;
    out.write_u32::<B>(riff_len)?;
    out.write_all(b"WAVE")?;

    out.write_all(b"fmt ")?;
    out.write_u32::<B>(FMT_CHUNK_LEN)?;
    out.write_u16::<B>(format.audio_format)?;
    out.write_u16::<B>(format.channels)?;
    out.write_u32::<B>(format.sample_rate)?;
    out.write_u32::<B>(format.byte_rate)?;
    out.write_u16::<B>(format.block_align)?;
    out.write_u16::<B>(format.bit_depth)?;

    out.write_all(b"data")?;
    out.write_u32::<B>(data_len)?;
    Ok(())
}
