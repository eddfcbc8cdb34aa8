//! Fixture builders shared by unit tests.
//!
//! Containers are assembled here by hand rather than through the encoder so
//! parser and encoder tests do not vouch for each other.

use crate::audio::format::{AudioFormat, Endianness, WAVE_FORMAT_EXTENSIBLE};
use crate::config::AppConfig;
use crate::dispatcher;
use crate::state::AppState;
use actix_web::dev::ServerHandle;
use actix_web::{web, App, HttpServer};
use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};
use std::net::{SocketAddr, TcpListener};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// `n` 16-bit little-endian samples of a rising ramp.
pub fn pcm_ramp(n: usize) -> Vec<u8> {
    (0..n)
        .flat_map(|i| ((i as i16).wrapping_mul(37).wrapping_sub(1000)).to_le_bytes())
        .collect()
}

/// The 16-byte body of a `fmt ` chunk for `format`.
pub fn fmt_body(format: &AudioFormat) -> Vec<u8> {
    match format.endianness {
        Endianness::Little => fmt_body_in::<LittleEndian>(format),
        Endianness::Big => fmt_body_in::<BigEndian>(format),
    }
}

fn fmt_body_in<B: ByteOrder>(format: &AudioFormat) -> Vec<u8> {
    let mut body = Vec::with_capacity(16);
    body.write_u16::<B>(format.audio_format).unwrap();
    body.write_u16::<B>(format.channels).unwrap();
    body.write_u32::<B>(format.sample_rate).unwrap();
    body.write_u32::<B>(format.byte_rate).unwrap();
    body.write_u16::<B>(format.block_align).unwrap();
    body.write_u16::<B>(format.bit_depth).unwrap();
    body
}

/// A 40-byte WAVE_FORMAT_EXTENSIBLE `fmt ` body whose sub-format is `sub_format`.
pub fn extensible_fmt_body(format: &AudioFormat, sub_format: u16) -> Vec<u8> {
    let mut base = format.clone();
    base.audio_format = WAVE_FORMAT_EXTENSIBLE;
    let mut body = fmt_body(&base);
    match format.endianness {
        Endianness::Little => extension_in::<LittleEndian>(&mut body, format, sub_format),
        Endianness::Big => extension_in::<BigEndian>(&mut body, format, sub_format),
    }
    body
}

fn extension_in<B: ByteOrder>(body: &mut Vec<u8>, format: &AudioFormat, sub_format: u16) {
    body.write_u16::<B>(22).unwrap();
    body.write_u16::<B>(format.bit_depth).unwrap();
    body.write_u32::<B>(if format.channels == 2 { 0x3 } else { 0x4 }).unwrap();
    body.write_u32::<B>(u32::from(sub_format)).unwrap();
    body.extend_from_slice(&[0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0xAA, 0x00, 0x38, 0x9B, 0x71]);
}

/// A RIFF (or RIFX) WAVE container holding `chunks` in the given order.
pub fn riff(endianness: Endianness, chunks: &[(&[u8; 4], &[u8])]) -> Vec<u8> {
    let mut body = b"WAVE".to_vec();
    for (id, data) in chunks {
        body.extend_from_slice(*id);
        write_u32(&mut body, endianness, data.len() as u32);
        body.extend_from_slice(data);
        if data.len() % 2 == 1 {
            body.push(0);
        }
    }

    let mut out = endianness.riff_tag().to_vec();
    write_u32(&mut out, endianness, body.len() as u32);
    out.extend_from_slice(&body);
    out
}

/// Canonical 44-byte-header WAV file.
pub fn wav_bytes(format: &AudioFormat, data: &[u8]) -> Vec<u8> {
    let fmt = fmt_body(format);
    riff(format.endianness, &[(b"fmt ", fmt.as_slice()), (b"data", data)])
}

fn write_u32(out: &mut Vec<u8>, endianness: Endianness, value: u32) {
    match endianness {
        Endianness::Little => out.write_u32::<LittleEndian>(value).unwrap(),
        Endianness::Big => out.write_u32::<BigEndian>(value).unwrap(),
    }
}

/// Write `bytes` to a uniquely named file in the temp dir.
pub fn write_fixture(bytes: &[u8]) -> PathBuf {
    let path = std::env::temp_dir().join(format!("wavestream-{}.wav", Uuid::new_v4()));
    std::fs::write(&path, bytes).unwrap();
    path
}

pub fn remove_fixture(path: &Path) {
    let _ = std::fs::remove_file(path);
}

/// Default configuration with every asset pointing at `path`.
pub fn config_with_assets(path: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    let path = path.display().to_string();
    config.assets.http_asset = path.clone();
    config.assets.chunks_asset = path.clone();
    config.assets.stream_asset = path;
    config
}

/// Run the full route table on an ephemeral localhost port.
pub fn spawn_server(state: AppState) -> (SocketAddr, ServerHandle) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let data = web::Data::new(state);

    let server = HttpServer::new(move || App::new().app_data(data.clone()).configure(dispatcher::configure))
        .workers(1)
        .disable_signals()
        .listen(listener)
        .unwrap()
        .run();

    let handle = server.handle();
    actix_web::rt::spawn(server);
    (addr, handle)
}
