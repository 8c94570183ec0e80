// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Errors raised by the secure handshake (component H).
///
/// Per `spec.md` §7 ("AuthenticationFailed: any handshake mismatch...no
/// information leaked about which step failed"), every variant maps to
/// the same wire-level rejection; the variants exist for server-side
/// logging only and must never be serialized verbatim to the client.
#[derive(Debug)]
pub enum Error {
    UnknownProtocolVersion,
    UnsupportedAuthMode(u8),
    AuthenticationFailed,
    ResumeTicketExpired,
    ResumeTicketUnknown,
    TlsNotConfigured,
    Tls(String),
    Wire(crate::wire::Error),
    Io(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownProtocolVersion => write!(f, "unknown protocol version"),
            Self::UnsupportedAuthMode(b) => write!(f, "unsupported auth mode byte {b:#04x}"),
            Self::AuthenticationFailed => write!(f, "authentication failed"),
            Self::ResumeTicketExpired => write!(f, "resume ticket expired"),
            Self::ResumeTicketUnknown => write!(f, "resume ticket unknown"),
            Self::TlsNotConfigured => write!(f, "client requires TLS but no server certificate is configured"),
            Self::Tls(reason) => write!(f, "TLS error: {reason}"),
            Self::Wire(e) => write!(f, "wire error: {e}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<crate::wire::Error> for Error {
    fn from(value: crate::wire::Error) -> Self {
        Self::Wire(value)
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
