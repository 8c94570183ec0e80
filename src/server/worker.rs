// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! One connection's life cycle: handshake, optional TLS upgrade,
//! authentication, then handing off to [`crate::session::Session`]
//! (`spec.md` §4.J: "accepts a connection, drives it through the fixed
//! handshake and pluggable authentication, then constructs a `Session`
//! bound to that connection's catalog view").

use super::cancel::TcpCancelSignal;
use super::registry::ConnectionRegistry;
use super::stream::ClientStream;
use super::ServerOptions;
use crate::security;
use crate::session::Session;
use crate::wire::opcodes::ServerResponse;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Drives one accepted connection to completion. Errors are logged by
/// the caller; this never panics across a connection boundary.
pub fn serve(raw: TcpStream, options: Arc<ServerOptions>, connections: Arc<ConnectionRegistry>) -> super::Result<()> {
    let peer = raw.peer_addr()?;
    let (handle, _registration) = connections.register(peer);

    let mut raw_ref = &raw;
    let handshake = security::handshake::server_handshake(&mut raw_ref, options.config.require_ssl)?;

    let cancel_source = raw.try_clone()?;

    let result = if handshake.effective_use_ssl {
        let acceptor = options.tls_acceptor.as_ref().ok_or(security::Error::TlsNotConfigured)?;
        let (tls, channel_binding) = acceptor.accept(raw)?;
        authenticate_and_run(ClientStream::Tls(Box::new(tls)), &options, &handle, &channel_binding, &cancel_source)
    } else {
        authenticate_and_run(ClientStream::Plain(raw), &options, &handle, b"", &cancel_source)
    };

    if let Err(err) = &result {
        log::warn!("connection {} from {peer} ended with an error: {err}", handle.id);
    }
    result
}

fn authenticate_and_run(
    mut stream: ClientStream,
    options: &Arc<ServerOptions>,
    handle: &Arc<super::registry::ConnectionHandle>,
    channel_binding: &[u8],
    cancel_source: &TcpStream,
) -> super::Result<()> {
    let outcome = match security::server_authenticate(&mut stream, options.credentials.as_ref(), &options.resumes, channel_binding) {
        Ok(outcome) => outcome,
        Err(err) => return Err(err.into()),
    };
    handle.set_user(outcome.user.clone());

    let mut session = Session::new(&options.catalog, outcome.user);
    let mut cancel = TcpCancelSignal::new(cancel_source, CANCEL_POLL_INTERVAL);

    match session.run(&mut stream, &mut cancel) {
        Ok(()) => Ok(()),
        Err(err) => {
            // best-effort: the peer may already have closed the socket
            let _ = crate::wire::io::write_u8(&mut stream, ServerResponse::UnhandledException.as_byte());
            Err(err.into())
        }
    }
}
