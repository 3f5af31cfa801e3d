//! End-to-end behavior of the file stream over in-memory payloads.

use std::io::{Cursor, Read, Seek, SeekFrom};
use std::sync::Arc;

use parking_lot::Mutex;

use mpq_stream::compression::flags as method;
use mpq_stream::{FileEntry, FileFlags, MpqStream};

/// A deterministic, compressible byte pattern.
fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i / 7) % 251) as u8).collect()
}

/// Open a plain stream over raw bytes, optionally priming an encryption
/// seed for later re-encoding.
fn plain_stream(data: Vec<u8>, seed: u32) -> MpqStream<Cursor<Vec<u8>>> {
    let mut entry = FileEntry::new(0, data.len() as u32, data.len() as u32, FileFlags::EXISTS);
    if seed != 0 {
        entry.set_encryption_seed(seed);
    }
    MpqStream::from_reader(Cursor::new(data), entry, 4096).unwrap()
}

#[test]
fn test_single_unit_plain_file() {
    let content = pattern(100);
    let entry = FileEntry::new(0, 100, 100, FileFlags::SINGLE_UNIT | FileFlags::EXISTS);
    let mut stream = MpqStream::from_reader(Cursor::new(content.clone()), entry, 4096).unwrap();

    assert!(stream.is_readable());
    assert_eq!(stream.len().unwrap(), 100);

    let mut buf = vec![0u8; 200];
    assert_eq!(stream.read(&mut buf).unwrap(), 100);
    assert_eq!(&buf[..100], &content[..]);

    stream.seek(SeekFrom::Start(50)).unwrap();
    let mut buf = vec![0u8; 1000];
    assert_eq!(stream.read(&mut buf).unwrap(), 50);
    assert_eq!(&buf[..50], &content[50..]);
}

#[test]
fn test_multi_sector_zlib_file() {
    let content = pattern(10000);
    let payload = plain_stream(content.clone(), 0)
        .rebuild(FileFlags::COMPRESS, method::ZLIB, 0, 4096)
        .unwrap();

    // ceil(10000 / 4096) + 1 = 4 table entries, so the table spans 16 bytes
    // and its first entry says so.
    assert_eq!(
        u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]),
        16
    );

    let entry = FileEntry::new(
        0,
        10000,
        payload.len() as u32,
        FileFlags::COMPRESS | FileFlags::EXISTS,
    );

    // One read call crosses every sector boundary.
    let mut stream =
        MpqStream::from_reader(Cursor::new(payload.clone()), entry.clone(), 4096).unwrap();
    let mut buf = vec![0u8; 10000];
    assert_eq!(stream.read(&mut buf).unwrap(), 10000);
    assert_eq!(buf, content);

    // Seeking straight into sector 1 reads its first byte.
    let mut stream = MpqStream::from_reader(Cursor::new(payload), entry, 4096).unwrap();
    stream.seek(SeekFrom::Start(4096)).unwrap();
    let mut one = [0u8; 1];
    assert_eq!(stream.read(&mut one).unwrap(), 1);
    assert_eq!(one[0], content[4096]);
}

#[test]
fn test_seed_recovery_from_sector_table() {
    let key = mpq_crypto::file_key("war3map.doo");
    let content = pattern(10000);
    let payload = plain_stream(content.clone(), key)
        .rebuild(
            FileFlags::ENCRYPTED | FileFlags::COMPRESS,
            method::ZLIB,
            0,
            4096,
        )
        .unwrap();

    // Reopen with the seed withheld; the table's known first entry lets
    // the stream brute-force it back.
    let entry = FileEntry::new(
        0,
        10000,
        payload.len() as u32,
        FileFlags::ENCRYPTED | FileFlags::COMPRESS | FileFlags::EXISTS,
    );
    let mut stream = MpqStream::from_reader(Cursor::new(payload), entry, 4096).unwrap();

    assert!(stream.is_readable());
    assert_eq!(stream.encryption_seed(), key);
    assert_eq!(stream.base_encryption_seed(), key);

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).unwrap();
    assert_eq!(buf, content);
}

#[test]
fn test_reads_match_byte_at_a_time_reads() {
    let content = pattern(9000);
    let payload = plain_stream(content.clone(), 0)
        .rebuild(FileFlags::COMPRESS, method::ZLIB, 0, 2048)
        .unwrap();
    let entry = FileEntry::new(
        0,
        9000,
        payload.len() as u32,
        FileFlags::COMPRESS | FileFlags::EXISTS,
    );

    let mut bulk = MpqStream::from_reader(Cursor::new(payload.clone()), entry.clone(), 2048)
        .unwrap();
    let mut bulk_out = Vec::new();
    bulk.read_to_end(&mut bulk_out).unwrap();

    let mut single = MpqStream::from_reader(Cursor::new(payload), entry, 2048).unwrap();
    let mut single_out = Vec::new();
    while let Some(byte) = single.read_byte().unwrap() {
        single_out.push(byte);
    }

    assert_eq!(bulk_out, single_out);
    assert_eq!(bulk_out, content);
}

#[test]
fn test_validation_is_idempotent() {
    let content = pattern(6000);
    let payload = plain_stream(content.clone(), 0)
        .rebuild(FileFlags::COMPRESS, method::ZLIB, 0, 4096)
        .unwrap();
    let entry = FileEntry::new(
        0,
        6000,
        payload.len() as u32,
        FileFlags::COMPRESS | FileFlags::EXISTS,
    );

    let source = Arc::new(Mutex::new(Cursor::new(payload)));
    let mut first = MpqStream::open(source.clone(), entry.clone(), 4096).unwrap();
    let mut second = MpqStream::open(source, entry, 4096).unwrap();

    assert_eq!(first.is_readable(), second.is_readable());
    assert_eq!(first.len().unwrap(), second.len().unwrap());

    let mut out_first = Vec::new();
    first.read_to_end(&mut out_first).unwrap();
    let mut out_second = Vec::new();
    second.read_to_end(&mut out_second).unwrap();
    assert_eq!(out_first, out_second);
}

#[test]
fn test_two_streams_share_one_source() {
    let content_a = pattern(5000);
    let content_b: Vec<u8> = pattern(3000).iter().map(|b| b.wrapping_add(13)).collect();

    // Lay two files out back to back in one "archive".
    let payload_a = plain_stream(content_a.clone(), 0)
        .rebuild(FileFlags::COMPRESS, method::ZLIB, 0, 4096)
        .unwrap();
    let payload_b = plain_stream(content_b.clone(), 0)
        .rebuild(FileFlags::COMPRESS, method::ZLIB, 0, 4096)
        .unwrap();

    let mut archive = payload_a.clone();
    archive.extend_from_slice(&payload_b);

    let entry_a = FileEntry::new(
        0,
        5000,
        payload_a.len() as u32,
        FileFlags::COMPRESS | FileFlags::EXISTS,
    );
    let entry_b = FileEntry::new(
        payload_a.len() as u64,
        3000,
        payload_b.len() as u32,
        FileFlags::COMPRESS | FileFlags::EXISTS,
    );

    let source = Arc::new(Mutex::new(Cursor::new(archive)));
    let mut stream_a = MpqStream::open(source.clone(), entry_a, 4096).unwrap();
    let mut stream_b = MpqStream::open(source, entry_b, 4096).unwrap();

    // Interleave reads; each stream keeps its own position.
    let mut out_a = vec![0u8; 5000];
    let mut out_b = vec![0u8; 3000];
    stream_a.read_exact(&mut out_a[..2500]).unwrap();
    stream_b.read_exact(&mut out_b[..1500]).unwrap();
    stream_a.read_exact(&mut out_a[2500..]).unwrap();
    stream_b.read_exact(&mut out_b[1500..]).unwrap();

    assert_eq!(out_a, content_a);
    assert_eq!(out_b, content_b);
}

#[test]
fn test_checksum_slot_is_read_but_not_validated() {
    // Hand-build a two-sector payload with the extra table slot: four
    // entries, raw sectors, then eight bytes of (bogus) checksum data.
    let content = pattern(600);
    let mut payload = Vec::new();
    for offset in [16u32, 16 + 512, 16 + 600, 16 + 600 + 8] {
        payload.extend_from_slice(&offset.to_le_bytes());
    }
    payload.extend_from_slice(&content);
    payload.extend_from_slice(&[0xEEu8; 8]);

    let entry = FileEntry::new(
        0,
        600,
        payload.len() as u32,
        FileFlags::COMPRESS | FileFlags::SECTOR_CRC | FileFlags::EXISTS,
    );
    let mut stream = MpqStream::from_reader(Cursor::new(payload), entry, 512).unwrap();

    assert!(stream.is_readable());
    let mut out = Vec::new();
    stream.read_to_end(&mut out).unwrap();
    assert_eq!(out, content);
}

#[test]
fn test_copy_raw_round_trips_stored_payload() {
    let content = pattern(5000);
    let payload = plain_stream(content, 0)
        .rebuild(FileFlags::COMPRESS, method::ZLIB, 0, 4096)
        .unwrap();
    let entry = FileEntry::new(
        0,
        5000,
        payload.len() as u32,
        FileFlags::COMPRESS | FileFlags::EXISTS,
    );
    let stream = MpqStream::from_reader(Cursor::new(payload.clone()), entry, 4096).unwrap();

    let mut sink = Vec::new();
    stream.copy_raw_to(&mut sink).unwrap();
    assert_eq!(sink, payload);
}
