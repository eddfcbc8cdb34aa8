//! # TLS Certificate Loading
//!
//! The server speaks HTTPS/WSS when certificate material is present in the
//! configured directory and plain HTTP/WS otherwise.
//!
//! ## Expected files:
//! - `privkey.pem`: the server's private key
//! - `fullchain.pem`: leaf certificate followed by intermediates
//! - `chain.pem` (optional): extra intermediates not already in `fullchain.pem`

use crate::config::TlsConfig;
use anyhow::{anyhow, Context, Result};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Build a rustls server config from the certificate directory.
///
/// Returns `Ok(None)` when the directory or the required files do not exist,
/// and an error when they exist but cannot be used.
pub fn load_server_config(config: &TlsConfig) -> Result<Option<ServerConfig>> {
    let Some(dir) = config.resolve_cert_dir() else {
        debug!("no certificate directory configured");
        return Ok(None);
    };

    let key_path = dir.join("privkey.pem");
    let cert_path = dir.join("fullchain.pem");
    if !key_path.is_file() || !cert_path.is_file() {
        debug!(dir = %dir.display(), "no certificate material found");
        return Ok(None);
    }

    let mut chain = read_certs(&cert_path)?;
    if chain.is_empty() {
        return Err(anyhow!("{} contains no certificates", cert_path.display()));
    }

    let extra_path = dir.join("chain.pem");
    if extra_path.is_file() {
        for cert in read_certs(&extra_path)? {
            if !chain.contains(&cert) {
                chain.push(cert);
            }
        }
    }

    let key = read_key(&key_path)?;

    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let server_config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .context("no usable TLS protocol versions")?
        .with_no_client_auth()
        .with_single_cert(chain, key)
        .context("certificate and private key do not form a valid identity")?;

    info!(dir = %dir.display(), "loaded TLS certificates");
    Ok(Some(server_config))
}

fn read_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = BufReader::new(File::open(path).with_context(|| format!("opening {}", path.display()))?);
    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("parsing certificates in {}", path.display()))
}

fn read_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let mut reader = BufReader::new(File::open(path).with_context(|| format!("opening {}", path.display()))?);
    rustls_pemfile::private_key(&mut reader)
        .with_context(|| format!("parsing private key in {}", path.display()))?
        .ok_or_else(|| anyhow!("{} contains no private key", path.display()))
}
