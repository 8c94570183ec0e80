// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The configuration surface (`spec.md` §6.3) and the credentials
//! database format.
//!
//! Grounded on `spec.md` §9's "copy-on-write read-only wrapper": a
//! mutable [`ConfigBuilder`] with plain public fields, turned into an
//! immutable [`ServerConfig`] by an explicit [`ConfigBuilder::freeze`]
//! that deep-copies every field, mirroring the source's
//! "immutable-ify" settings-record operation without inheritance.

use serde::Deserialize;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One entry of `users[]` (`spec.md` §6.3).
#[derive(Debug, Clone, Deserialize)]
pub struct UserEntry {
    pub username: String,
    pub can_read: bool,
    pub can_write: bool,
    pub is_admin: bool,
}

/// One attachable database: where its archives live on disk and the
/// `(key_type, value_type)` it is bound to. Not named explicitly by
/// `spec.md` §6.3's configuration-surface list, but required to turn
/// that list into a runnable [`crate::session::Catalog`]; `bin/snapdbd`
/// is the only consumer.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub name: String,
    pub directory: PathBuf,
    pub key_type: Uuid,
    pub value_type: Uuid,
    #[serde(default = "default_block_size")]
    pub block_size: u32,
}

fn default_block_size() -> u32 {
    4096
}

/// Mutable configuration builder. Every field defaults the way
/// `spec.md` §6.3 specifies; deserializing from a partial TOML document
/// fills in any key the file omits from [`Default::default`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConfigBuilder {
    pub local_ip: IpAddr,
    pub local_port: u16,
    pub server_name: String,
    pub require_ssl: bool,
    pub default_user_can_read: bool,
    pub default_user_can_write: bool,
    pub default_user_can_is_admin: bool,
    pub users: Vec<UserEntry>,
    pub databases: Vec<DatabaseConfig>,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            local_ip: IpAddr::from([0, 0, 0, 0]),
            local_port: 38402,
            server_name: "openHistorian".to_string(),
            require_ssl: false,
            default_user_can_read: true,
            default_user_can_write: false,
            default_user_can_is_admin: false,
            users: Vec::new(),
            databases: Vec::new(),
        }
    }
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a TOML configuration file (`spec.md` §6.3's configuration
    /// surface) into a builder, falling back to documented defaults for
    /// any key the file omits.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Deep-copies every field into an immutable [`ServerConfig`]; once
    /// frozen, a config can be shared across every connection worker
    /// without interior mutability.
    #[must_use]
    pub fn freeze(&self) -> ServerConfig {
        ServerConfig {
            local_ip: self.local_ip,
            local_port: self.local_port,
            server_name: self.server_name.clone(),
            require_ssl: self.require_ssl,
            default_user_can_read: self.default_user_can_read,
            default_user_can_write: self.default_user_can_write,
            default_user_can_is_admin: self.default_user_can_is_admin,
            users: self.users.clone(),
            databases: self.databases.clone(),
        }
    }
}

/// An immutable, sharable configuration snapshot produced by
/// [`ConfigBuilder::freeze`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub local_ip: IpAddr,
    pub local_port: u16,
    pub server_name: String,
    pub require_ssl: bool,
    pub default_user_can_read: bool,
    pub default_user_can_write: bool,
    pub default_user_can_is_admin: bool,
    pub users: Vec<UserEntry>,
    pub databases: Vec<DatabaseConfig>,
}

impl ServerConfig {
    #[must_use]
    pub fn user(&self, username: &str) -> Option<&UserEntry> {
        self.users.iter().find(|u| u.username == username)
    }
}

/// One record of the credentials database (`spec.md` §6.3: "versioned
/// self-describing format ... per-record `{username, salt, iterations,
/// hash-method, verifier}`"). `hash_method` names the SCRAM digest or
/// `"srp"`; `verifier` holds the SCRAM stored/server key pair or the SRP
/// verifier, opaque to this layer.
#[derive(Debug, Clone)]
pub struct CredentialRecord {
    pub username: String,
    pub salt: Vec<u8>,
    pub iterations: u32,
    pub hash_method: String,
    pub verifier: Vec<u8>,
}

const CREDENTIALS_FORMAT_VERSION: u8 = 1;

/// Reads a credentials database file (`spec.md` §6.3's "version byte,
/// count, per-record ...").
pub fn read_credentials(path: &Path) -> std::io::Result<Vec<CredentialRecord>> {
    let mut file = std::fs::File::open(path)?;
    read_credentials_from(&mut file)
}

fn read_credentials_from(r: &mut impl std::io::Read) -> std::io::Result<Vec<CredentialRecord>> {
    use crate::wire::io;

    let version = io::read_u8(r).map_err(io_error)?;
    if version != CREDENTIALS_FORMAT_VERSION {
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, format!("unsupported credentials format version {version}")));
    }

    let count = io::read_varint32(r).map_err(io_error)?;
    let mut records = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let username = io::read_string(r).map_err(io_error)?;
        let salt = io::read_bytes(r).map_err(io_error)?;
        let iterations = io::read_varint32(r).map_err(io_error)?;
        let hash_method = io::read_string(r).map_err(io_error)?;
        let verifier = io::read_bytes(r).map_err(io_error)?;
        records.push(CredentialRecord { username, salt, iterations, hash_method, verifier });
    }
    Ok(records)
}

/// Writes a credentials database file in the same format.
pub fn write_credentials(path: &Path, records: &[CredentialRecord]) -> std::io::Result<()> {
    use crate::wire::io;

    let mut buf = Vec::new();
    io::write_u8(&mut buf, CREDENTIALS_FORMAT_VERSION).map_err(io_error)?;
    io::write_varint32(&mut buf, records.len() as u32).map_err(io_error)?;
    for record in records {
        io::write_string(&mut buf, &record.username).map_err(io_error)?;
        io::write_bytes(&mut buf, &record.salt).map_err(io_error)?;
        io::write_varint32(&mut buf, record.iterations).map_err(io_error)?;
        io::write_string(&mut buf, &record.hash_method).map_err(io_error)?;
        io::write_bytes(&mut buf, &record.verifier).map_err(io_error)?;
    }

    // Atomic publish, same pattern as the bulk-writer's archive commit.
    let folder = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::NamedTempFile::new_in(folder)?;
    std::io::Write::write_all(&mut temp, &buf)?;
    std::io::Write::flush(&mut temp)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// A [`crate::security::CredentialStore`] backed by the records loaded
/// from a credentials database file. `hash_method` selects how
/// `verifier` is interpreted: `"srp"` holds the big-endian SRP verifier
/// `v`; anything else names a SCRAM hash and `verifier` holds
/// `StoredKey || ServerKey` split at the hash's digest length.
pub struct FileCredentialStore {
    records: std::collections::HashMap<String, CredentialRecord>,
}

impl FileCredentialStore {
    /// Loads and indexes a credentials database file by username.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let records = read_credentials(path)?.into_iter().map(|r| (r.username.clone(), r)).collect();
        Ok(Self { records })
    }
}

impl crate::security::CredentialStore for FileCredentialStore {
    fn srp_verifier(&self, user: &str) -> Option<crate::security::srp::Verifier> {
        let record = self.records.get(user)?;
        if record.hash_method != "srp" {
            return None;
        }
        let v = num_bigint_dig::BigUint::from_bytes_be(&record.verifier);
        Some(crate::security::srp::Verifier { salt: record.salt.clone(), iterations: record.iterations, v })
    }

    fn scram_credential(&self, user: &str) -> Option<crate::security::scram::StoredCredential<sha2::Sha256>> {
        let record = self.records.get(user)?;
        if record.hash_method != "scram-sha256" {
            return None;
        }
        let digest_len = record.verifier.len() / 2;
        let (stored_key, server_key) = record.verifier.split_at(digest_len);
        Some(crate::security::scram::StoredCredential::from_parts(
            record.salt.clone(),
            record.iterations,
            stored_key.to_vec(),
            server_key.to_vec(),
        ))
    }

    fn user_exists(&self, user: &str) -> bool {
        self.records.contains_key(user)
    }
}

fn io_error(e: crate::wire::Error) -> std::io::Error {
    match e {
        crate::wire::Error::Io(io_err) => io_err,
        other => std::io::Error::new(std::io::ErrorKind::InvalidData, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn builder_defaults_match_the_documented_configuration_surface() {
        let builder = ConfigBuilder::new();
        assert_eq!(builder.local_port, 38402);
        assert_eq!(builder.server_name, "openHistorian");
    }

    #[test]
    fn freeze_produces_an_independent_copy() {
        let mut builder = ConfigBuilder::new();
        builder.server_name = "mutable".to_string();
        let frozen = builder.freeze();

        builder.server_name = "changed-after-freeze".to_string();
        assert_eq!(frozen.server_name, "mutable");
    }

    #[test]
    fn credentials_round_trip_through_the_versioned_format() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("credentials.db");

        let records = vec![CredentialRecord {
            username: "alice".to_string(),
            salt: vec![7u8; 32],
            iterations: 4000,
            hash_method: "scram-sha256".to_string(),
            verifier: vec![1, 2, 3, 4],
        }];
        write_credentials(&path, &records).expect("write");

        let read_back = read_credentials(&path).expect("read");
        assert_eq!(read_back.len(), 1);
        assert_eq!(read_back[0].username, "alice");
        assert_eq!(read_back[0].iterations, 4000);
    }

    #[test]
    fn file_credential_store_serves_a_scram_credential_round_tripped_through_disk() {
        use crate::security::CredentialStore;
        use crate::security::scram::StoredCredential;
        use sha2::Sha256;

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("credentials.db");

        let credential = StoredCredential::<Sha256>::derive(b"correct horse", &[7u8; 32], 4000);
        let mut verifier = credential.stored_key.clone();
        verifier.extend_from_slice(&credential.server_key);
        write_credentials(
            &path,
            &[CredentialRecord { username: "alice".to_string(), salt: credential.salt.clone(), iterations: credential.iterations, hash_method: "scram-sha256".to_string(), verifier }],
        )
        .expect("write");

        let store = FileCredentialStore::load(&path).expect("load");
        assert!(store.user_exists("alice"));
        assert!(!store.user_exists("bob"));
        let loaded = store.scram_credential("alice").expect("credential present");
        assert_eq!(loaded.stored_key, credential.stored_key);
        assert_eq!(loaded.server_key, credential.server_key);
    }
}
