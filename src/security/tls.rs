// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! TLS upgrade of an already-connected socket (`spec.md` §4.H: "if SSL
//! is negotiated, the remainder of the session runs over TLS").
//! Certificate loading and the `rustls::ServerConfig`/`ClientConfig`
//! themselves are `config.rs`'s concern; this module only performs the
//! handshake and exposes the peer certificate hash used as SRP/SCRAM
//! channel-binding material.

use super::{Error, Result};
use sha2::{Digest, Sha256};
use std::net::TcpStream;
use std::sync::Arc;

/// A TLS server acceptor bound to one `ServerConfig`.
pub struct TlsAcceptor {
    config: Arc<rustls::ServerConfig>,
}

impl TlsAcceptor {
    #[must_use]
    pub fn new(config: Arc<rustls::ServerConfig>) -> Self {
        Self { config }
    }

    /// Completes the server side of the TLS handshake over `stream`,
    /// returning a readable/writable session plus the channel-binding
    /// hash spec.md mixes into the SRP/SCRAM proofs.
    pub fn accept(&self, stream: TcpStream) -> Result<(rustls::StreamOwned<rustls::ServerConnection, TcpStream>, Vec<u8>)> {
        let mut conn = rustls::ServerConnection::new(self.config.clone()).map_err(|e| Error::Tls(e.to_string()))?;
        let mut raw = stream.try_clone()?;
        while conn.is_handshaking() {
            if conn.wants_write() {
                conn.write_tls(&mut raw).map_err(Error::Io)?;
            }
            if conn.wants_read() {
                conn.read_tls(&mut raw).map_err(Error::Io)?;
                conn.process_new_packets().map_err(|e| Error::Tls(e.to_string()))?;
            }
        }
        let binding = channel_binding(conn.peer_certificates());
        Ok((rustls::StreamOwned::new(conn, stream), binding))
    }
}

/// A TLS client connector bound to one `ClientConfig`.
pub struct TlsConnector {
    config: Arc<rustls::ClientConfig>,
}

impl TlsConnector {
    #[must_use]
    pub fn new(config: Arc<rustls::ClientConfig>) -> Self {
        Self { config }
    }

    pub fn connect(
        &self,
        server_name: rustls_pki_types::ServerName<'static>,
        stream: TcpStream,
    ) -> Result<(rustls::StreamOwned<rustls::ClientConnection, TcpStream>, Vec<u8>)> {
        let mut conn = rustls::ClientConnection::new(self.config.clone(), server_name).map_err(|e| Error::Tls(e.to_string()))?;
        let mut raw = stream.try_clone()?;
        while conn.is_handshaking() {
            if conn.wants_write() {
                conn.write_tls(&mut raw).map_err(Error::Io)?;
            }
            if conn.wants_read() {
                conn.read_tls(&mut raw).map_err(Error::Io)?;
                conn.process_new_packets().map_err(|e| Error::Tls(e.to_string()))?;
            }
        }
        let binding = channel_binding(conn.peer_certificates());
        Ok((rustls::StreamOwned::new(conn, stream), binding))
    }
}

/// Hashes the leaf certificate so it can be folded into the SRP `x`
/// derivation or an equivalent channel-binding input; absent a peer
/// certificate (no client-cert TLS), returns an empty binding.
fn channel_binding(peer_certs: Option<&[rustls_pki_types::CertificateDer<'_>]>) -> Vec<u8> {
    match peer_certs.and_then(<[_]>::first) {
        Some(cert) => Sha256::digest(cert.as_ref()).to_vec(),
        None => Vec::new(),
    }
}
