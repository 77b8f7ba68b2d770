use super::*;
use std::fs;
use std::io::Write;
use tempfile::tempdir;

// -------------------- Helpers --------------------

fn open_in(dir: &Path) -> ValueLog {
    ValueLog::open(dir.join("vlog"), false).unwrap()
}

fn put_all(log: &mut ValueLog, entries: &[(u64, Option<&[u8]>)]) -> Vec<ValueLocator> {
    log.append(entries.iter().copied()).unwrap()
}

// -------------------- Codec --------------------

#[test]
fn record_layout_matches_format() {
    let mut buf = Vec::new();
    record::encode_into(&mut buf, 7, b"abc").unwrap();
    assert_eq!(buf.len() as u64, encoded_len(3));
    assert_eq!(buf[0], MAGIC);
    assert_eq!(u16::from_le_bytes([buf[1], buf[2]]), record_checksum(7, b"abc"));
    assert_eq!(u64::from_le_bytes(buf[3..11].try_into().unwrap()), 7);
    assert_eq!(u32::from_le_bytes(buf[11..15].try_into().unwrap()), 3);
    assert_eq!(&buf[15..18], b"abc");
    assert_eq!(buf[18], TERMINATOR);
}

#[test]
fn encode_rejects_empty_payload() {
    let mut buf = Vec::new();
    assert!(record::encode_into(&mut buf, 1, b"").is_err());
}

#[test]
fn checksum_depends_on_key_and_payload() {
    assert_ne!(record_checksum(1, b"abc"), record_checksum(2, b"abc"));
    assert_ne!(record_checksum(1, b"abc"), record_checksum(1, b"abd"));
}

#[test]
fn decode_rejects_flipped_payload_byte() {
    let mut buf = Vec::new();
    record::encode_into(&mut buf, 9, b"payload").unwrap();
    buf[16] ^= 0x01;
    let limit = buf.len() as u64;
    let got = record::decode_at(&mut &buf[..], 0, limit).unwrap();
    assert!(got.is_none());
}

// -------------------- Append / read --------------------

#[test]
fn append_and_read_back() {
    let dir = tempdir().unwrap();
    let mut log = open_in(dir.path());

    let locs = put_all(&mut log, &[(1, Some(b"one")), (2, Some(b"second"))]);
    assert_eq!(locs[0], ValueLocator::new(1, 0, 3));
    assert_eq!(locs[1], ValueLocator::new(2, encoded_len(3), 6));
    assert_eq!(log.head(), encoded_len(3) + encoded_len(6));
    assert_eq!(log.tail(), 0);

    assert_eq!(log.read(locs[0].offset, locs[0].len).unwrap(), b"one");
    assert_eq!(log.read(locs[1].offset, locs[1].len).unwrap(), b"second");
}

#[test]
fn tombstones_write_nothing() {
    let dir = tempdir().unwrap();
    let mut log = open_in(dir.path());

    let locs = put_all(&mut log, &[(1, Some(b"v")), (2, None), (3, Some(b"w"))]);
    assert!(locs[1].is_tombstone());
    assert_eq!(locs[1].offset, encoded_len(1));
    assert_eq!(locs[2].offset, encoded_len(1));
    assert_eq!(log.head(), 2 * encoded_len(1));
    assert_eq!(fs::metadata(log.path()).unwrap().len(), log.head());
}

#[test]
fn read_past_head_fails() {
    let dir = tempdir().unwrap();
    let mut log = open_in(dir.path());
    put_all(&mut log, &[(1, Some(b"abc"))]);

    match log.read(0, 100) {
        Err(VlogError::OutOfRange { .. }) => {}
        other => panic!("expected OutOfRange, got {:?}", other),
    }
}

#[test]
fn reopen_recovers_head_and_tail() {
    let dir = tempdir().unwrap();
    let head = {
        let mut log = open_in(dir.path());
        put_all(&mut log, &[(1, Some(b"a")), (2, Some(b"bb"))]);
        log.head()
    };
    let mut log = open_in(dir.path());
    assert_eq!(log.head(), head);
    assert_eq!(log.tail(), 0);
    assert_eq!(log.read(encoded_len(1), 2).unwrap(), b"bb");
}

#[test]
fn appends_after_reopen_continue_at_head() {
    let dir = tempdir().unwrap();
    {
        let mut log = open_in(dir.path());
        put_all(&mut log, &[(1, Some(b"a"))]);
    }
    let mut log = open_in(dir.path());
    let locs = put_all(&mut log, &[(2, Some(b"b"))]);
    assert_eq!(locs[0].offset, encoded_len(1));
    assert_eq!(log.read(locs[0].offset, 1).unwrap(), b"b");
}

#[test]
fn torn_append_bytes_are_dropped_before_next_append() {
    let dir = tempdir().unwrap();
    let mut log = open_in(dir.path());
    put_all(&mut log, &[(1, Some(b"a"))]);
    let head = log.head();

    // Partial record left behind by a write that failed midway.
    fs::OpenOptions::new()
        .append(true)
        .open(log.path())
        .unwrap()
        .write_all(&[MAGIC, 0x12, 0x34, 0x56])
        .unwrap();
    log.discard_torn_tail();
    assert_eq!(fs::metadata(log.path()).unwrap().len(), head);

    let locs = put_all(&mut log, &[(2, Some(b"bb"))]);
    assert_eq!(locs[0].offset, head);
    assert_eq!(log.read(locs[0].offset, locs[0].len).unwrap(), b"bb");
    assert_eq!(log.read_record(head).unwrap().key, 2);
    assert_eq!(fs::metadata(log.path()).unwrap().len(), log.head());
}

#[cfg(target_os = "linux")]
#[test]
fn failed_append_keeps_head() {
    // Every write to /dev/full fails with ENOSPC.
    let Ok(mut log) = ValueLog::open("/dev/full", false) else {
        return;
    };
    assert!(log.append([(1u64, Some(&b"x"[..]))]).is_err());
    assert_eq!(log.head(), 0);
    assert!(log.append([(2u64, None)]).is_ok());
}

// -------------------- Tail recovery --------------------

#[test]
fn garbage_prefix_is_skipped_by_tail_scan() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("vlog");

    // A fake magic byte with a bad checksum, then one real record.
    let mut bytes = vec![0u8, MAGIC, 0x12, 0x34, 0, 0, 0];
    let real_at = bytes.len() as u64;
    record::encode_into(&mut bytes, 5, b"real").unwrap();
    fs::write(&path, &bytes).unwrap();

    let mut log = ValueLog::open(&path, false).unwrap();
    assert_eq!(log.tail(), real_at);
    assert_eq!(log.head(), bytes.len() as u64);
    assert_eq!(log.read(real_at, 4).unwrap(), b"real");
}

#[test]
fn torn_final_record_does_not_move_tail() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("vlog");
    {
        let mut log = ValueLog::open(&path, false).unwrap();
        log.append([(1u64, Some(&b"first"[..]))]).unwrap();
    }
    // Simulate a crash mid-append: half a record at the end.
    let mut torn = Vec::new();
    record::encode_into(&mut torn, 2, b"second").unwrap();
    let mut data = fs::read(&path).unwrap();
    data.extend_from_slice(&torn[..torn.len() / 2]);
    fs::write(&path, &data).unwrap();

    let mut log = ValueLog::open(&path, false).unwrap();
    assert_eq!(log.tail(), 0);
    assert_eq!(log.head(), data.len() as u64);
    assert_eq!(log.read(0, 5).unwrap(), b"first");
}

#[test]
fn file_without_valid_records_has_tail_at_head() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("vlog");
    fs::write(&path, [0u8; 64]).unwrap();

    let log = ValueLog::open(&path, false).unwrap();
    assert_eq!(log.tail(), 64);
    assert_eq!(log.head(), 64);
}

// -------------------- Record iteration --------------------

#[test]
fn next_record_walks_in_order() {
    let dir = tempdir().unwrap();
    let mut log = open_in(dir.path());
    put_all(&mut log, &[(1, Some(b"a")), (2, None), (3, Some(b"ccc"))]);

    let first = log.next_record(0).unwrap().unwrap();
    assert_eq!((first.key, first.value.as_slice()), (1, &b"a"[..]));
    let second = log.next_record(first.end()).unwrap().unwrap();
    assert_eq!((second.key, second.value.as_slice()), (3, &b"ccc"[..]));
    assert!(log.next_record(second.end()).unwrap().is_none());
}

#[test]
fn next_record_walks_many_small_records() {
    let dir = tempdir().unwrap();
    let mut log = open_in(dir.path());
    let entries: Vec<(u64, Option<&[u8]>)> = (0..5000u64).map(|k| (k, Some(&b"v"[..]))).collect();
    put_all(&mut log, &entries);

    let mut pos = log.tail();
    let mut keys = Vec::new();
    while let Some(rec) = log.next_record(pos).unwrap() {
        assert_eq!(rec.offset, pos, "records are contiguous");
        keys.push(rec.key);
        pos = rec.end();
    }
    assert_eq!(keys, (0..5000u64).collect::<Vec<_>>());
    assert_eq!(pos, log.head());
}

#[test]
fn next_record_from_mid_record_finds_next_boundary() {
    let dir = tempdir().unwrap();
    let mut log = open_in(dir.path());
    put_all(&mut log, &[(1, Some(b"first")), (2, Some(b"second"))]);

    let rec = log.next_record(1).unwrap().unwrap();
    assert_eq!(rec.key, 2);
    assert_eq!(rec.offset, encoded_len(5));
    assert!(log.next_record(rec.offset + 1).unwrap().is_none());
}

#[test]
fn read_record_verifies_checksum() {
    let dir = tempdir().unwrap();
    let mut log = open_in(dir.path());
    put_all(&mut log, &[(4, Some(b"four"))]);

    let rec = log.read_record(0).unwrap();
    assert_eq!(rec.key, 4);
    assert!(matches!(log.read_record(1), Err(VlogError::Corrupt(1))));
}

// -------------------- Reclamation --------------------

#[test]
fn reclaim_moves_tail_and_rejects_old_offsets() {
    let dir = tempdir().unwrap();
    let mut log = open_in(dir.path());
    let locs = put_all(
        &mut log,
        &[(1, Some(b"one")), (2, Some(b"two")), (3, Some(b"three"))],
    );
    let head = log.head();

    log.reclaim(0, encoded_len(3) * 2).unwrap();
    assert_eq!(log.tail(), locs[2].offset);
    assert_eq!(log.head(), head, "reclaim keeps offsets stable");

    assert!(matches!(
        log.read(locs[0].offset, 3),
        Err(VlogError::Reclaimed { .. })
    ));
    assert_eq!(log.read(locs[2].offset, 5).unwrap(), b"three");
}

#[test]
fn reclaim_survives_reopen() {
    let dir = tempdir().unwrap();
    let locs = {
        let mut log = open_in(dir.path());
        let locs = put_all(&mut log, &[(1, Some(b"old")), (2, Some(b"new"))]);
        log.reclaim(0, encoded_len(3)).unwrap();
        locs
    };
    let mut log = open_in(dir.path());
    assert_eq!(log.tail(), locs[1].offset);
    assert_eq!(log.read(locs[1].offset, 3).unwrap(), b"new");
}

#[test]
fn reclaim_everything_leaves_empty_range() {
    let dir = tempdir().unwrap();
    let mut log = open_in(dir.path());
    put_all(&mut log, &[(1, Some(b"x"))]);
    let head = log.head();
    log.reclaim(0, head).unwrap();
    assert_eq!(log.tail(), head);
    assert_eq!(log.live_bytes(), 0);
    assert!(log.next_record(0).unwrap().is_none());
}

#[test]
fn reset_removes_file_and_zeroes_offsets() {
    let dir = tempdir().unwrap();
    let mut log = open_in(dir.path());
    put_all(&mut log, &[(1, Some(b"x"))]);
    log.reset().unwrap();
    assert_eq!(log.head(), 0);
    assert_eq!(log.tail(), 0);
    assert_eq!(fs::metadata(log.path()).unwrap().len(), 0);

    let locs = put_all(&mut log, &[(2, Some(b"y"))]);
    assert_eq!(locs[0].offset, 0);
}

// -------------------- fs_util --------------------

#[test]
fn deallocate_range_zeroes_bytes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("f");
    fs::write(&path, vec![0xABu8; 100]).unwrap();
    fs_util::deallocate_range(&path, 10, 20).unwrap();
    let data = fs::read(&path).unwrap();
    assert_eq!(data.len(), 100);
    assert!(data[10..30].iter().all(|b| *b == 0));
    assert!(data[..10].iter().all(|b| *b == 0xAB));
    assert!(data[30..].iter().all(|b| *b == 0xAB));
}

#[test]
fn crc16_is_stable() {
    assert_eq!(crc16(b"123456789"), crc16(b"123456789"));
    assert_ne!(crc16(b"123456789"), crc16(b"123456780"));
}
