// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The fixed connection handshake (`spec.md` §4.H, §6.2): magic number,
//! SSL negotiation, and (if SSL is enabled) the TLS upgrade.

use super::{Error, Result};
use crate::wire::{io, PROTOCOL_MAGIC};
use std::io::{Read, Write};

/// Outcome of the pre-TLS handshake exchange.
pub struct HandshakeOutcome {
    pub effective_use_ssl: bool,
}

/// Server side: reads the client's magic + `use_ssl` byte, decides
/// whether to force SSL on, and replies.
pub fn server_handshake(stream: &mut (impl Read + Write), require_ssl: bool) -> Result<HandshakeOutcome> {
    let magic = io::read_u64(stream)?;
    let client_wants_ssl = io::read_bool(stream)?;

    if magic != PROTOCOL_MAGIC {
        io::write_u8(stream, HandshakeResponseByte::UnknownProtocol as u8)?;
        return Err(Error::UnknownProtocolVersion);
    }

    let effective_use_ssl = client_wants_ssl || require_ssl;

    io::write_u8(stream, HandshakeResponseByte::KnownProtocol as u8)?;
    io::write_bool(stream, effective_use_ssl)?;

    Ok(HandshakeOutcome { effective_use_ssl })
}

/// Client side: sends the magic + its SSL preference, and reads back the
/// server's decision.
pub fn client_handshake(stream: &mut (impl Read + Write), want_ssl: bool) -> Result<HandshakeOutcome> {
    io::write_u64(stream, PROTOCOL_MAGIC)?;
    io::write_bool(stream, want_ssl)?;

    let response = io::read_u8(stream)?;
    if response != HandshakeResponseByte::KnownProtocol as u8 {
        return Err(Error::UnknownProtocolVersion);
    }
    let effective_use_ssl = io::read_bool(stream)?;
    Ok(HandshakeOutcome { effective_use_ssl })
}

#[repr(u8)]
enum HandshakeResponseByte {
    KnownProtocol = 101,
    UnknownProtocol = 102,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn client_and_server_agree_on_ssl_when_server_requires_it() {
        let mut wire = Vec::new();
        {
            let mut client_side = &mut wire;
            io::write_u64(&mut client_side, PROTOCOL_MAGIC).expect("write magic");
            io::write_bool(&mut client_side, false).expect("write use_ssl");
        }

        let mut cursor = std::io::Cursor::new(wire);
        let outcome = server_handshake(&mut cursor, true).expect("server handshake");
        assert!(outcome.effective_use_ssl);
    }
}
