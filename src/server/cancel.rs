// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The concrete [`crate::session::CancelSignal`] for a live TCP
//! connection: a short read-timeout poll of the raw socket for an
//! in-flight `CancelRead` opcode, without a second thread racing the
//! session loop for the same bytes.
//!
//! A companion thread was considered and rejected: a clone of a
//! [`TcpStream`] shares the same receive buffer as the original, so a
//! background reader would just as easily steal the bytes of the
//! *next* root/database command once `Read` completes normally.
//! Instead, [`TcpCancelSignal::is_canceled`] flips the stream to a short
//! read timeout only for the duration of its own peek and restores the
//! stream's normal (usually blocking) timeout before returning, so a
//! `Session` spanning many commands can hold one [`TcpCancelSignal`] for
//! its whole lifetime without any other read on the stream ever
//! observing a spurious timeout.
//!
//! This only observes the plaintext wire: for a TLS-upgraded connection
//! the peeked bytes are ciphertext and will essentially never alias the
//! `CancelRead` opcode, so cancellation over TLS is presently
//! deadline-only (see `DESIGN.md`).

use crate::session::CancelSignal;
use crate::wire::opcodes::DatabaseCommand;
use std::io::Read as _;
use std::net::TcpStream;
use std::time::Duration;

/// Polls `stream` for a `CancelRead` opcode, pausing the calling thread
/// for at most `poll_interval` per call.
pub struct TcpCancelSignal<'a> {
    stream: &'a TcpStream,
    poll_interval: Duration,
}

impl<'a> TcpCancelSignal<'a> {
    #[must_use]
    pub fn new(stream: &'a TcpStream, poll_interval: Duration) -> Self {
        Self { stream, poll_interval }
    }
}

impl CancelSignal for TcpCancelSignal<'_> {
    fn is_canceled(&mut self) -> bool {
        let resting_timeout = self.stream.read_timeout().ok().flatten();
        if self.stream.set_read_timeout(Some(self.poll_interval)).is_err() {
            return false;
        }

        let mut byte = [0u8; 1];
        let canceled = match self.stream.peek(&mut byte) {
            Ok(1) if byte[0] == DatabaseCommand::CancelRead as u8 => {
                let mut discard = [0u8; 1];
                let mut reader = self.stream;
                reader.read_exact(&mut discard).is_ok()
            }
            Ok(_) | Err(_) => false,
        };

        let _ = self.stream.set_read_timeout(resting_timeout);
        canceled
    }
}
