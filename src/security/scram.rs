// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! RFC 5802 (SCRAM) authentication (`spec.md` §4.H, mode 3), generic
//! over the pluggable hash `{SHA-1, SHA-256, SHA-384, SHA-512}` (`spec.md`
//! S4 exercises SHA-256).

use super::{Error, Result};
use hmac::{Hmac, Mac};
use sha2::Digest;
use subtle::ConstantTimeEq;

type HmacOf<D> = Hmac<D>;

fn hmac_bytes<D: Digest + hmac::digest::core_api::BlockSizeUser + Default + Clone>(
    key: &[u8],
    data: &[u8],
) -> Vec<u8> {
    let mut mac = <HmacOf<D> as Mac>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn hash<D: Digest>(data: &[u8]) -> Vec<u8> {
    let mut hasher = D::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

fn xor(a: &[u8], b: &[u8]) -> Vec<u8> {
    a.iter().zip(b.iter()).map(|(x, y)| x ^ y).collect()
}

/// The server's stored credential record for one user (`spec.md` §6.3:
/// `{username, salt, iterations, hash-method, verifier}`).
pub struct StoredCredential<D> {
    pub salt: Vec<u8>,
    pub iterations: u32,
    pub stored_key: Vec<u8>,
    pub server_key: Vec<u8>,
    _hash: std::marker::PhantomData<D>,
}

impl<D> StoredCredential<D>
where
    D: Digest + hmac::digest::core_api::BlockSizeUser + Default + Clone,
{
    /// Derives `StoredKey`/`ServerKey` from a plaintext password the way
    /// a credentials database is provisioned (`spec.md` §6.3).
    #[must_use]
    pub fn derive(password: &[u8], salt: &[u8], iterations: u32) -> Self {
        let salted_password = pbkdf2_like(password, salt, iterations);
        let client_key = hmac_bytes::<D>(&salted_password, b"Client Key");
        let stored_key = hash::<D>(&client_key);
        let server_key = hmac_bytes::<D>(&salted_password, b"Server Key");
        Self { salt: salt.to_vec(), iterations, stored_key, server_key, _hash: std::marker::PhantomData }
    }

    /// Reconstructs an already-derived credential from its stored parts
    /// (the credentials database keeps `StoredKey`/`ServerKey`, never
    /// the plaintext password).
    #[must_use]
    pub fn from_parts(salt: Vec<u8>, iterations: u32, stored_key: Vec<u8>, server_key: Vec<u8>) -> Self {
        Self { salt, iterations, stored_key, server_key, _hash: std::marker::PhantomData }
    }
}

/// SCRAM's `Hi(password, salt, iterations)` is PBKDF2 with the same hash
/// used for HMAC (RFC 5802 §3).
fn pbkdf2_like<D>(password: &[u8], salt: &[u8], iterations: u32) -> Vec<u8>
where
    D: Digest + hmac::digest::core_api::BlockSizeUser + hmac::digest::FixedOutputReset + Default + Clone,
{
    let mut out = vec![0u8; <D as Digest>::output_size()];
    pbkdf2::pbkdf2_hmac::<D>(password, salt, iterations, &mut out);
    out
}

/// Verifies a client's final-message proof against the stored
/// credential and returns the server's signature on success, per RFC
/// 5802 §3: `ClientSignature = HMAC(StoredKey, AuthMessage)`,
/// `ClientKey = ClientProof XOR ClientSignature`, accept iff
/// `H(ClientKey) == StoredKey`.
pub fn verify_client_proof<D>(stored: &StoredCredential<D>, auth_message: &[u8], client_proof: &[u8]) -> Result<Vec<u8>>
where
    D: Digest + hmac::digest::core_api::BlockSizeUser + Default + Clone,
{
    let client_signature = hmac_bytes::<D>(&stored.stored_key, auth_message);
    let recovered_client_key = xor(client_proof, &client_signature);
    let check = hash::<D>(&recovered_client_key);

    if !bool::from(check.ct_eq(&stored.stored_key)) {
        return Err(Error::AuthenticationFailed);
    }

    Ok(hmac_bytes::<D>(&stored.server_key, auth_message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::Sha256;
    use test_log::test;

    #[test]
    fn scram_round_trip_with_sha256_s4() {
        let salt = [7u8; 32];
        let iterations = 4000;
        let credential = StoredCredential::<Sha256>::derive(b"correct horse", &salt, iterations);

        let auth_message = b"n=alice,r=client-nonce,r=client-nonce+server-nonce,s=...,i=4000,c=biws,r=client-nonce+server-nonce";

        let salted_password = pbkdf2_like::<Sha256>(b"correct horse", &salt, iterations);
        let client_key = hmac_bytes::<Sha256>(&salted_password, b"Client Key");
        let client_signature = hmac_bytes::<Sha256>(&credential.stored_key, auth_message);
        let client_proof = xor(&client_key, &client_signature);

        let server_signature = verify_client_proof(&credential, auth_message, &client_proof).expect("valid proof accepted");
        let expected_server_signature = hmac_bytes::<Sha256>(&credential.server_key, auth_message);
        assert_eq!(server_signature, expected_server_signature);
    }

    #[test]
    fn flipping_a_byte_of_the_proof_is_rejected() {
        let salt = [7u8; 32];
        let credential = StoredCredential::<Sha256>::derive(b"correct horse", &salt, 4000);
        let auth_message = b"auth-message";

        let salted_password = pbkdf2_like::<Sha256>(b"correct horse", &salt, 4000);
        let client_key = hmac_bytes::<Sha256>(&salted_password, b"Client Key");
        let client_signature = hmac_bytes::<Sha256>(&credential.stored_key, auth_message);
        let mut client_proof = xor(&client_key, &client_signature);
        client_proof[0] ^= 0xFF;

        assert!(verify_client_proof(&credential, auth_message, &client_proof).is_err());
    }
}
