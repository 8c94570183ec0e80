// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! RFC 5054 (SRP-6a for TLS) authentication (`spec.md` §4.H, mode 2):
//! PBKDF2-HMAC-SHA-512 password stretching, additional-challenge bytes
//! mixed into every hash so a resumed TLS session's certificate hash
//! binds into the proof.
//!
//! The group parameters and the six-message exchange are this crate's
//! own responsibility; PBKDF2/SHA-512 and the big-integer modular
//! arithmetic are the reference-implementation primitives `spec.md` §1
//! explicitly takes as external collaborators (`num-bigint-dig`,
//! `pbkdf2`, `sha2`).

use super::{Error, Result};
use num_bigint_dig::BigUint;
use pbkdf2::pbkdf2_hmac;
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;

/// RFC 5054's 2048-bit group (`N`) and generator (`g`); the literal `N`
/// is the group's standard hex modulus, `g = 2`.
const GENERATOR: u32 = 2;

fn group_modulus() -> BigUint {
    BigUint::parse_bytes(
        b"AC6BDB41324A9A9BF166DE5E1389582FAF72B6651987EE07FC3192943DB56050A37329CBB4A099ED8193E0757767A13DD52312AB4B03310DCD7F48A9DA04FD50E8083969EDB767B0CF6095179A163AB3661A05FBD5FAAAE82918A9962F0B93B855F97993EC975EEAA80D740ADBF4FF747359D041D5C33EA71D281E446B14773BCA97B43A23FB801676BD207A436C6481F1D2B9078717461A5B9D32E688F87748544523B524B0D57D5EA77A2775D2ECFA032CFBDBF52FB3786160279004E57AE6AF874E7303CE53299CCC041C7BC308D82A5698F3A8D0C38271AE35F8E9DBFBB694B5C803D89F7AE435DE236D525F54759B65E372FCD68EF20FA7111F9E4AFF73",
        16,
    )
    .expect("RFC 5054 2048-bit group modulus is a valid hex literal")
}

/// The server-stored per-user verifier, salt, and iteration count.
pub struct Verifier {
    pub salt: Vec<u8>,
    pub iterations: u32,
    pub v: BigUint,
}

/// Derives `x = PBKDF2-HMAC-SHA512(password, salt, iterations)` and the
/// verifier `v = g^x mod N`, mixing `additional_challenge` (e.g. the
/// TLS certificate hash) into the stretched key the way a resumed TLS
/// channel binds its SRP proof to the specific connection.
#[must_use]
pub fn compute_verifier(password: &[u8], salt: &[u8], iterations: u32, additional_challenge: &[u8]) -> Verifier {
    let x = derive_x(password, salt, iterations, additional_challenge);
    let v = BigUint::from(GENERATOR).modpow(&x, &group_modulus());
    Verifier { salt: salt.to_vec(), iterations, v }
}

fn derive_x(password: &[u8], salt: &[u8], iterations: u32, additional_challenge: &[u8]) -> BigUint {
    let mut stretched = [0u8; 64];
    pbkdf2_hmac::<Sha512>(password, salt, iterations, &mut stretched);

    let mut hasher = Sha512::new();
    hasher.update(stretched);
    hasher.update(additional_challenge);
    let digest = hasher.finalize();

    BigUint::from_bytes_be(&digest)
}

/// Server-side state across the six-message RFC 5054 flow.
pub struct ServerSession {
    verifier: BigUint,
    b: BigUint,
    b_pub: BigUint,
}

impl ServerSession {
    /// Begins a session for a known user, generating the server's
    /// private/public ephemeral pair `b`/`B = k*v + g^b mod N`.
    #[must_use]
    pub fn begin(verifier: &Verifier, private_b: BigUint) -> Self {
        let n = group_modulus();
        let k = multiplier(&n);
        let b_pub = (&k * &verifier.v + BigUint::from(GENERATOR).modpow(&private_b, &n)) % &n;
        Self { verifier: verifier.v.clone(), b: private_b, b_pub }
    }

    #[must_use]
    pub fn public_b(&self) -> BigUint {
        self.b_pub.clone()
    }

    /// Computes the shared session key `S = (A * v^u)^b mod N` given the
    /// client's public ephemeral `a_pub` and scrambling parameter `u`.
    #[must_use]
    pub fn shared_key(&self, a_pub: &BigUint, u: &BigUint) -> BigUint {
        let n = group_modulus();
        (a_pub * self.verifier.modpow(u, &n)).modpow(&self.b, &n)
    }

    /// Verifies the client's proof `M1` against the locally computed
    /// shared key, in constant time, and returns the server's own proof
    /// `M2` on success.
    pub fn verify_client_proof(&self, shared_key: &BigUint, client_proof: &[u8]) -> Result<Vec<u8>> {
        let expected = proof_of(shared_key, b"client");
        if expected.ct_eq(client_proof).into() {
            Ok(proof_of(shared_key, b"server"))
        } else {
            Err(Error::AuthenticationFailed)
        }
    }
}

fn multiplier(n: &BigUint) -> BigUint {
    let mut hasher = Sha512::new();
    hasher.update(n.to_bytes_be());
    hasher.update(GENERATOR.to_be_bytes());
    BigUint::from_bytes_be(&hasher.finalize())
}

fn proof_of(shared_key: &BigUint, label: &[u8]) -> Vec<u8> {
    let mut hasher = Sha512::new();
    hasher.update(label);
    hasher.update(shared_key.to_bytes_be());
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn flipping_a_byte_of_the_client_proof_is_rejected() {
        let verifier = compute_verifier(b"correct horse", b"some-salt", 4000, b"");
        let session = ServerSession::begin(&verifier, BigUint::from(42u32));

        let shared = session.shared_key(&session.public_b(), &BigUint::from(7u32));
        let mut proof = proof_of(&shared, b"client");
        assert!(session.verify_client_proof(&shared, &proof).is_ok());

        proof[0] ^= 0xFF;
        assert!(session.verify_client_proof(&shared, &proof).is_err());
    }
}
