// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Integration coverage for the archive table layer (`spec.md` §4.E): a
//! bulk-written archive survives a process-boundary reopen, and an
//! incrementally-edited one keeps every record visible at its pinned
//! snapshot sequence number.

use snapdb::archive::{ArchiveTable, BulkWriter};
use uuid::Uuid;

const KEY_TYPE: Uuid = Uuid::from_u128(100);
const VALUE_TYPE: Uuid = Uuid::from_u128(200);
const ENCODING: Uuid = snapdb::tree::FIXED_SIZE_COMBINED;

#[test]
fn a_bulk_written_archive_reopens_with_every_record_intact() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("bulk.snapdb");

    let mut writer = BulkWriter::create(&path, 1024, KEY_TYPE, VALUE_TYPE, ENCODING).expect("create writer");
    for i in 0..5_000u64 {
        writer.append(i, i.wrapping_mul(7)).expect("append");
    }
    writer.finish().expect("finish");

    let table = ArchiveTable::open(&path, KEY_TYPE, VALUE_TYPE).expect("reopen");
    let snapshot = table.read_snapshot();
    for i in [0u64, 1, 2_500, 4_998, 4_999] {
        assert_eq!(snapshot.try_get(i).expect("get"), Some(i.wrapping_mul(7)));
    }
    assert_eq!(snapshot.try_get(5_000).expect("get"), None);

    let mut scanned = 0u64;
    let mut scanner = snapshot.scanner().expect("scanner");
    while let Some((key, value)) = scanner.read().expect("scan step") {
        assert_eq!(value, key.wrapping_mul(7));
        scanned += 1;
    }
    assert_eq!(scanned, 5_000);
}

#[test]
fn an_edit_transaction_is_invisible_until_committed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("edit.snapdb");
    let mut table = ArchiveTable::create(&path, 512, KEY_TYPE, VALUE_TYPE, ENCODING).expect("create");

    let before = table.snapshot_sequence_number();

    let mut editor = table.edit();
    editor.insert(1, 11).expect("insert");
    editor.insert(2, 22).expect("insert");
    editor.commit().expect("commit");

    assert!(table.snapshot_sequence_number() > before);

    let snapshot = table.read_snapshot();
    assert_eq!(snapshot.try_get(1).expect("get"), Some(11));
    assert_eq!(snapshot.try_get(2).expect("get"), Some(22));
    assert_eq!(snapshot.first_record().expect("first"), Some((1, 11)));
    assert_eq!(snapshot.last_record().expect("last"), Some((2, 22)));
}
