// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! End-to-end session protocol coverage (`spec.md` §4.I, §6.2): a scripted
//! client request, driven through the public `session` API over an
//! in-memory duplex buffer, writes records to a database and reads them
//! back in order.

use snapdb::engine::Engine;
use snapdb::session::{Catalog, NeverCancel, Session};
use snapdb::wire::io;
use snapdb::wire::opcodes::{DatabaseCommand, RootCommand, ServerResponse};
use snapdb::wire::point_codec::{Decoded, PointDecoder};
use std::io::Cursor;
use std::sync::Arc;
use uuid::Uuid;

const KEY_TYPE: Uuid = Uuid::from_u128(1);
const VALUE_TYPE: Uuid = Uuid::from_u128(2);

fn catalog_with_one_database(dir: &std::path::Path) -> Catalog {
    let engine = Engine::new(dir.to_path_buf(), KEY_TYPE, VALUE_TYPE, snapdb::session::WIRE_ENCODING_FIXED_SIZE, 512);
    let mut catalog = Catalog::new();
    catalog.insert("telemetry", Arc::new(engine));
    catalog
}

#[test]
fn write_then_read_round_trips_through_a_full_session() {
    let dir = tempfile::tempdir().expect("tempdir");
    let catalog = catalog_with_one_database(dir.path());

    let mut request = Vec::new();
    io::write_u8(&mut request, RootCommand::ConnectToDatabase as u8).expect("opcode");
    io::write_string(&mut request, "telemetry").expect("name");
    io::write_guid(&mut request, KEY_TYPE).expect("key type");
    io::write_guid(&mut request, VALUE_TYPE).expect("value type");

    io::write_u8(&mut request, DatabaseCommand::Write as u8).expect("opcode");
    for i in 0..50u64 {
        io::write_u8(&mut request, 0x00).expect("continue marker");
        io::write_u64(&mut request, i).expect("key");
        io::write_u64(&mut request, i * 3).expect("value");
    }
    io::write_u8(&mut request, 0xFF).expect("end of stream");

    io::write_u8(&mut request, DatabaseCommand::Read as u8).expect("opcode");
    io::write_bool(&mut request, false).expect("no seek filter");
    io::write_bool(&mut request, false).expect("no match filter");
    io::write_bool(&mut request, false).expect("no reader options");

    io::write_u8(&mut request, DatabaseCommand::DisconnectDatabase as u8).expect("opcode");
    io::write_u8(&mut request, RootCommand::Disconnect as u8).expect("opcode");

    let mut stream = Cursor::new(request);
    let mut session = Session::new(&catalog, "alice".to_string());
    session.run(&mut stream, &mut NeverCancel).expect("session runs to completion");

    let response = stream.into_inner();
    let mut cursor = &response[..];

    assert_eq!(io::read_u8(&mut cursor).expect("connected"), ServerResponse::ConnectedToRoot.as_byte());
    assert_eq!(io::read_u8(&mut cursor).expect("db connected"), ServerResponse::SuccessfullyConnectedToDatabase.as_byte());

    // The `Write` command itself emits no response byte, per `spec.md`
    // §6.2's fire-and-forget write path; the next byte on the wire is
    // already the `Read` response.
    assert_eq!(io::read_u8(&mut cursor).expect("serializing"), ServerResponse::SerializingPoints.as_byte());

    let mut decoder = PointDecoder::new();
    let mut records = Vec::new();
    loop {
        match decoder.try_decode(&mut cursor).expect("decode point") {
            Decoded::Record(key, value) => records.push((key, value)),
            Decoded::EndOfStream => break,
        }
    }
    assert_eq!(records.len(), 50);
    assert!(records.windows(2).all(|w| w[0].0 < w[1].0), "records must arrive in ascending key order");
    assert_eq!(records[0], (0, 0));
    assert_eq!(records[49], (49, 147));

    assert_eq!(io::read_u8(&mut cursor).expect("read complete"), ServerResponse::ReadComplete.as_byte());
    assert_eq!(io::read_u8(&mut cursor).expect("db disconnected"), ServerResponse::DatabaseDisconnected.as_byte());
    assert_eq!(io::read_u8(&mut cursor).expect("goodbye"), ServerResponse::GoodBye.as_byte());
}

#[test]
fn connecting_to_an_unknown_database_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let catalog = catalog_with_one_database(dir.path());

    let mut request = Vec::new();
    io::write_u8(&mut request, RootCommand::ConnectToDatabase as u8).expect("opcode");
    io::write_string(&mut request, "does-not-exist").expect("name");
    io::write_guid(&mut request, KEY_TYPE).expect("key type");
    io::write_guid(&mut request, VALUE_TYPE).expect("value type");
    io::write_u8(&mut request, RootCommand::Disconnect as u8).expect("opcode");

    let mut stream = Cursor::new(request);
    let mut session = Session::new(&catalog, "alice".to_string());
    session.run(&mut stream, &mut NeverCancel).expect("session runs to completion");

    let response = stream.into_inner();
    assert_eq!(response[1], ServerResponse::DatabaseDoesNotExist.as_byte());
}
