// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The per-connection session state machine (component I, `spec.md`
//! §4.I): root/database command loop, database attach, streamed read
//! with cancellation, streamed write.

mod error;
pub mod registry;

pub use error::{Error, Result};

use crate::engine::Engine;
use crate::wire::opcodes::{DatabaseCommand, RootCommand, ServerResponse};
use crate::wire::point_codec::{Decoded, PointDecoder, PointEncoder};
use crate::wire::io;
use registry::ReaderOptions;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// The wire encoding this session speaks for streamed points: the same
/// [`crate::tree::FIXED_SIZE_COMBINED`] GUID the tree layer uses for its
/// node records, since the point stream and the node layer agree on one
/// `(u64, u64)` layout end to end.
pub const WIRE_ENCODING_FIXED_SIZE: Uuid = crate::tree::FIXED_SIZE_COMBINED;

/// The set of attachable databases, keyed by name. `server`/`config`
/// populate this at startup from the configuration surface (`spec.md`
/// §6.3); the session only ever reads it.
#[derive(Default)]
pub struct Catalog {
    databases: HashMap<String, Arc<Engine>>,
}

impl Catalog {
    #[must_use]
    pub fn new() -> Self {
        Self { databases: HashMap::new() }
    }

    pub fn insert(&mut self, name: impl Into<String>, engine: Arc<Engine>) {
        self.databases.insert(name.into(), engine);
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.databases.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<Engine>> {
        self.databases.get(name)
    }
}

/// Lets the session check for an in-flight `CancelRead` without blocking
/// its own write loop on a second socket read (`spec.md` §9: "model as
/// a session object ... with typed message channels for any
/// out-of-band signaling"). `server` supplies the concrete
/// implementation backed by a companion reader thread or a
/// non-blocking peek; tests use [`NeverCancel`].
pub trait CancelSignal {
    fn is_canceled(&mut self) -> bool;
}

/// A signal that never fires; used where cancellation is not under
/// test.
pub struct NeverCancel;

impl CancelSignal for NeverCancel {
    fn is_canceled(&mut self) -> bool {
        false
    }
}

enum State {
    Root,
    Database { engine: Arc<Engine> },
    Closed,
}

/// One client connection's state machine, driven by [`Session::run`].
pub struct Session<'a> {
    catalog: &'a Catalog,
    user: String,
    state: State,
    wire_encoding: Uuid,
}

impl<'a> Session<'a> {
    #[must_use]
    pub fn new(catalog: &'a Catalog, user: String) -> Self {
        Self { catalog, user, state: State::Root, wire_encoding: WIRE_ENCODING_FIXED_SIZE }
    }

    /// Drives the command loop to completion: returns once the client
    /// disconnects (`Disconnect`), the stream errors, or an unhandled
    /// error occurs (in which case the caller is responsible for
    /// emitting `UnhandledException` and closing, per `spec.md` §7's
    /// wire-boundary propagation policy).
    pub fn run(&mut self, stream: &mut (impl Read + Write), cancel: &mut impl CancelSignal) -> Result<()> {
        io::write_u8(stream, ServerResponse::ConnectedToRoot.as_byte())?;

        loop {
            match &self.state {
                State::Root => {
                    if !self.step_root(stream)? {
                        return Ok(());
                    }
                }
                State::Database { engine } => {
                    let engine = Arc::clone(engine);
                    self.step_database(stream, &engine, cancel)?;
                }
                State::Closed => return Ok(()),
            }
        }
    }

    /// Processes exactly one root-level command. Returns `false` once
    /// `Disconnect` has closed the connection.
    fn step_root(&mut self, stream: &mut (impl Read + Write)) -> Result<bool> {
        let opcode = io::read_u8(stream)?;
        let command = RootCommand::from_byte(opcode).map_err(|_| {
            io::write_u8(stream, ServerResponse::UnknownCommand.as_byte()).ok();
            Error::Wire(crate::wire::Error::UnknownOpcode(opcode))
        })?;

        match command {
            RootCommand::GetAllDatabases => {
                io::write_u8(stream, ServerResponse::ListOfDatabases.as_byte())?;
                let names = self.catalog.names();
                io::write_varint32(stream, names.len() as u32)?;
                for name in names {
                    io::write_string(stream, name)?;
                }
                Ok(true)
            }
            RootCommand::ConnectToDatabase => {
                let name = io::read_string(stream)?;
                let key_type = io::read_guid(stream)?;
                let value_type = io::read_guid(stream)?;

                let Some(engine) = self.catalog.get(&name) else {
                    io::write_u8(stream, ServerResponse::DatabaseDoesNotExist.as_byte())?;
                    return Ok(true);
                };
                if engine.key_type() != key_type {
                    io::write_u8(stream, ServerResponse::DatabaseKeyUnknown.as_byte())?;
                    return Ok(true);
                }
                if engine.value_type() != value_type {
                    io::write_u8(stream, ServerResponse::DatabaseValueUnknown.as_byte())?;
                    return Ok(true);
                }

                self.state = State::Database { engine: Arc::clone(engine) };
                io::write_u8(stream, ServerResponse::SuccessfullyConnectedToDatabase.as_byte())?;
                Ok(true)
            }
            RootCommand::Disconnect => {
                self.state = State::Closed;
                io::write_u8(stream, ServerResponse::GoodBye.as_byte())?;
                Ok(false)
            }
        }
    }

    /// Processes exactly one database-level command.
    fn step_database(&mut self, stream: &mut (impl Read + Write), engine: &Engine, cancel: &mut impl CancelSignal) -> Result<()> {
        let opcode = io::read_u8(stream)?;
        let command = DatabaseCommand::from_byte(opcode).map_err(|_| {
            io::write_u8(stream, ServerResponse::UnknownDatabaseCommand.as_byte()).ok();
            Error::Wire(crate::wire::Error::UnknownOpcode(opcode))
        })?;

        match command {
            DatabaseCommand::SetEncodingMethod => {
                let guid = io::read_guid(stream)?;
                if guid == WIRE_ENCODING_FIXED_SIZE {
                    self.wire_encoding = guid;
                    io::write_u8(stream, ServerResponse::EncodingMethodAccepted.as_byte())?;
                } else {
                    io::write_u8(stream, ServerResponse::UnknownEncodingMethod.as_byte())?;
                }
                Ok(())
            }
            DatabaseCommand::Read => self.handle_read(stream, engine, cancel),
            DatabaseCommand::Write => self.handle_write(stream, engine),
            DatabaseCommand::CancelRead => {
                // Not reading; a stray CancelRead outside Streaming is a
                // no-op per `spec.md` §4.I's state diagram.
                Ok(())
            }
            DatabaseCommand::DisconnectDatabase => {
                self.state = State::Root;
                io::write_u8(stream, ServerResponse::DatabaseDisconnected.as_byte())?;
                Ok(())
            }
        }
    }

    fn handle_read(&mut self, stream: &mut (impl Read + Write), engine: &Engine, cancel: &mut impl CancelSignal) -> Result<()> {
        let has_seek = io::read_bool(stream)?;
        let seek = if has_seek { Some(registry::read_seek_filter(stream)?) } else { None };
        let has_match = io::read_bool(stream)?;
        let matcher = if has_match { Some(registry::read_match_filter(stream)?) } else { None };
        let has_options = io::read_bool(stream)?;
        let options = if has_options { registry::read_reader_options(stream)? } else { ReaderOptions::default() };

        let in_memory = engine.buffer().snapshot(engine.buffer().visible_epoch());

        let archives = engine.archives().snapshot();
        let mut read_snapshots = Vec::with_capacity(archives.len());
        for archive in archives.iter() {
            read_snapshots.push(archive.table.read_snapshot());
        }

        let access = crate::engine::filters::AllowAll;
        let mut reader = engine.read(&read_snapshots, seek, matcher, Some(self.user.clone()), Some(&access))?;

        io::write_u8(stream, ServerResponse::SerializingPoints.as_byte())?;
        let mut encoder = PointEncoder::new();
        let mut memtable_idx = 0usize;

        let completion = loop {
            if cancel.is_canceled() {
                break ServerResponse::CanceledRead;
            }
            if let Some(deadline) = options.deadline {
                if Instant::now() >= deadline {
                    break ServerResponse::ReadComplete;
                }
            }

            // The in-memory buffer outranks every archive; merge it in by
            // a plain sorted merge-join against `reader`, consuming and
            // discarding the archive's stale record on a key collision.
            // Match/access-control filtering is applied by `reader` to
            // archive-sourced records; buffer-sourced records bypass it
            // here, since `Engine::write` already applied `user_can_write`
            // before the record ever reached the buffer.
            while memtable_idx < in_memory.len() {
                let (key, value) = in_memory[memtable_idx];
                if let Some((next_key, _)) = reader.peek()? {
                    if next_key < key {
                        break;
                    }
                    if next_key == key {
                        // the buffer is the newest generation of data; its
                        // value shadows whatever the archives still hold
                        reader.next()?;
                    }
                }
                memtable_idx += 1;
                encoder.encode(stream, key, value)?;
            }

            match reader.next()? {
                Some((key, value)) => encoder.encode(stream, key, value)?,
                None => {
                    if memtable_idx < in_memory.len() {
                        let (key, value) = in_memory[memtable_idx];
                        memtable_idx += 1;
                        encoder.encode(stream, key, value)?;
                        continue;
                    }
                    break ServerResponse::ReadComplete;
                }
            }
        };

        encoder.write_end_of_stream(stream)?;
        io::write_u8(stream, completion.as_byte())?;
        Ok(())
    }

    fn handle_write(&mut self, stream: &mut (impl Read + Write), engine: &Engine) -> Result<()> {
        let access = crate::engine::filters::AllowAll;
        let mut decoder = PointDecoder::new();
        loop {
            match decoder.try_decode(stream)? {
                Decoded::Record(key, value) => engine.write(&self.user, &access, key, value),
                Decoded::EndOfStream => break,
            }
        }
        engine.soft_commit();
        if engine.should_hard_commit() {
            engine.hard_commit()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use std::io::Cursor;
    use test_log::test;
    use uuid::Uuid;

    fn engine_fixture(dir: &tempfile::TempDir) -> Arc<Engine> {
        Arc::new(Engine::new(dir.path().to_path_buf(), Uuid::from_u128(10), Uuid::from_u128(20), crate::tree::FIXED_SIZE_COMBINED, 512))
    }

    #[test]
    fn get_all_databases_lists_catalog_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut catalog = Catalog::new();
        catalog.insert("archive-a", engine_fixture(&dir));

        let mut request = Vec::new();
        io::write_u8(&mut request, RootCommand::GetAllDatabases as u8).expect("opcode");
        io::write_u8(&mut request, RootCommand::Disconnect as u8).expect("opcode");

        let mut stream = Cursor::new(request);
        let mut session = Session::new(&catalog, "alice".to_string());
        session.run(&mut stream, &mut NeverCancel).expect("session runs");

        let response = stream.into_inner();
        assert_eq!(response[0], ServerResponse::ConnectedToRoot.as_byte());
        assert_eq!(response[1], ServerResponse::ListOfDatabases.as_byte());
    }

    #[test]
    fn connect_to_database_with_wrong_key_type_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut catalog = Catalog::new();
        catalog.insert("archive-a", engine_fixture(&dir));

        let mut request = Vec::new();
        io::write_u8(&mut request, RootCommand::ConnectToDatabase as u8).expect("opcode");
        io::write_string(&mut request, "archive-a").expect("name");
        io::write_guid(&mut request, Uuid::from_u128(999)).expect("wrong key type");
        io::write_guid(&mut request, Uuid::from_u128(20)).expect("value type");
        io::write_u8(&mut request, RootCommand::Disconnect as u8).expect("opcode");

        let mut stream = Cursor::new(request);
        let mut session = Session::new(&catalog, "alice".to_string());
        session.run(&mut stream, &mut NeverCancel).expect("session runs");

        let response = stream.into_inner();
        assert_eq!(response[1], ServerResponse::DatabaseKeyUnknown.as_byte());
    }
}
