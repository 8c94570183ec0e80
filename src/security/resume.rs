// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Session-resume tickets (`spec.md` §4.H, mode 255; glossary "Resume
//! ticket"). A successful non-resume handshake mints a fresh
//! `(resume_ticket, session_secret)` pair; resuming derives a MAC from
//! the stored secret and the exchanged nonces and compares it in
//! constant time via `subtle`.
//!
//! `spec.md` §9 flags the source's resume-ticket lifetime as unbounded
//! and asks the target to specify a maximum age. This crate defaults to
//! 24 hours (the value the design note itself suggests) and makes it a
//! configurable field on [`ResumeRegistry`] rather than a constant, so a
//! host process can tighten it.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use subtle::ConstantTimeEq;

use super::{Error, Result};

/// Default maximum age of a resume ticket before it must fall back to a
/// full re-authentication (`spec.md` §9's suggested 24h).
pub const DEFAULT_MAX_TICKET_AGE: Duration = Duration::from_secs(24 * 60 * 60);

pub struct Ticket {
    pub id: [u8; 16],
    pub session_secret: [u8; 32],
    issued_at: Instant,
}

/// Server-side table of outstanding resume tickets, consumed once per
/// successful resume (`spec.md` glossary: "consumable once by the
/// client").
pub struct ResumeRegistry {
    tickets: RwLock<HashMap<[u8; 16], Ticket>>,
    max_age: Duration,
}

impl Default for ResumeRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TICKET_AGE)
    }
}

impl ResumeRegistry {
    #[must_use]
    pub fn new(max_age: Duration) -> Self {
        Self { tickets: RwLock::new(HashMap::new()), max_age }
    }

    /// Mints a fresh ticket after a successful full authentication.
    /// `rand::rng()` hands out a thread-local generator, so unlike the
    /// tickets table this needs no lock of its own: it is never stored,
    /// only drawn from fresh on each call (`ThreadRng` is not `Send`, so
    /// a server shared across worker threads cannot hold one).
    pub fn issue(&self) -> Ticket {
        let mut id = [0u8; 16];
        let mut secret = [0u8; 32];
        rand::rng().fill_bytes(&mut id);
        rand::rng().fill_bytes(&mut secret);

        let ticket = Ticket { id, session_secret: secret, issued_at: Instant::now() };
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        self.tickets.write().expect("lock poisoned").insert(id, Ticket { id, session_secret: secret, issued_at: ticket.issued_at });
        ticket
    }

    /// Consumes `ticket_id` (removing it so it cannot be replayed),
    /// verifying the client's MAC over `client_nonce || server_nonce` in
    /// constant time, and returning the server's own MAC on success.
    pub fn resume(&self, ticket_id: [u8; 16], client_nonce: [u8; 16], server_nonce: [u8; 16], client_mac: &[u8]) -> Result<Vec<u8>> {
        let ticket = {
            #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
            let mut tickets = self.tickets.write().expect("lock poisoned");
            tickets.remove(&ticket_id).ok_or(Error::ResumeTicketUnknown)?
        };

        if ticket.issued_at.elapsed() > self.max_age {
            return Err(Error::ResumeTicketExpired);
        }

        let expected = mac_of(&ticket.session_secret, &client_nonce, &server_nonce);
        if !bool::from(expected.ct_eq(client_mac)) {
            return Err(Error::AuthenticationFailed);
        }

        Ok(mac_of_server(&ticket.session_secret, &client_nonce, &server_nonce))
    }
}

fn mac_of(session_secret: &[u8], client_nonce: &[u8], server_nonce: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<Sha256>::new_from_slice(session_secret).expect("HMAC accepts keys of any length");
    mac.update(b"client");
    mac.update(client_nonce);
    mac.update(server_nonce);
    mac.finalize().into_bytes().to_vec()
}

fn mac_of_server(session_secret: &[u8], client_nonce: &[u8], server_nonce: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<Sha256>::new_from_slice(session_secret).expect("HMAC accepts keys of any length");
    mac.update(b"server");
    mac.update(client_nonce);
    mac.update(server_nonce);
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn resume_with_wrong_mac_is_rejected() {
        let registry = ResumeRegistry::default();
        let ticket = registry.issue();

        let client_nonce = [1u8; 16];
        let server_nonce = [2u8; 16];
        let mut bad_mac = mac_of(&ticket.session_secret, &client_nonce, &server_nonce);
        bad_mac[0] ^= 0xFF;

        assert!(matches!(
            registry.resume(ticket.id, client_nonce, server_nonce, &bad_mac),
            Err(Error::AuthenticationFailed)
        ));
    }

    #[test]
    fn resume_with_correct_mac_returns_a_server_proof() {
        let registry = ResumeRegistry::default();
        let ticket = registry.issue();

        let client_nonce = [1u8; 16];
        let server_nonce = [2u8; 16];
        let good_mac = mac_of(&ticket.session_secret, &client_nonce, &server_nonce);

        let server_proof = registry
            .resume(ticket.id, client_nonce, server_nonce, &good_mac)
            .expect("valid resume");
        assert_eq!(server_proof, mac_of_server(&ticket.session_secret, &client_nonce, &server_nonce));
    }

    #[test]
    fn expired_ticket_is_rejected() {
        let registry = ResumeRegistry::new(Duration::from_secs(0));
        let ticket = registry.issue();
        let client_nonce = [1u8; 16];
        let server_nonce = [2u8; 16];
        let mac = mac_of(&ticket.session_secret, &client_nonce, &server_nonce);

        std::thread::sleep(Duration::from_millis(5));
        assert!(matches!(registry.resume(ticket.id, client_nonce, server_nonce, &mac), Err(Error::ResumeTicketExpired)));
    }

    #[test]
    fn ticket_cannot_be_resumed_twice() {
        let registry = ResumeRegistry::default();
        let ticket = registry.issue();
        let client_nonce = [1u8; 16];
        let server_nonce = [2u8; 16];
        let mac = mac_of(&ticket.session_secret, &client_nonce, &server_nonce);

        assert!(registry.resume(ticket.id, client_nonce, server_nonce, &mac).is_ok());
        assert!(matches!(registry.resume(ticket.id, client_nonce, server_nonce, &mac), Err(Error::ResumeTicketUnknown)));
    }
}
