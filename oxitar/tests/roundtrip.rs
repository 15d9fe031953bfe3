//! Integration tests for writing archives and reading them back.
//!
//! Every test builds an archive in memory with `TarWriter` and checks what
//! `TarReader` recovers from it, plus selected raw header bytes.

use oxitar::prelude::*;
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use test_log::test;

fn read_all(archive: Vec<u8>) -> Vec<(Entry, Vec<u8>)> {
    let mut reader = TarReader::new(Cursor::new(archive));
    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().expect("next_entry failed") {
        let data = reader.read_entry_data().expect("payload read failed");
        entries.push((entry, data));
    }
    entries
}

// ============================================================================
// Basic Functionality Tests
// ============================================================================

#[test]
fn test_hello_world() {
    let mut writer = TarWriter::new(Vec::new());
    writer.add_file("hello.txt", b"world").unwrap();
    let archive = writer.into_inner().unwrap();

    // header, one payload block, two end blocks
    assert_eq!(archive.len(), 2048);
    assert_eq!(&archive[100..108], b"0000644\0");
    assert_eq!(&archive[124..136], b"00000000005\0");
    assert_eq!(&archive[512..517], b"world");

    let mut reader = TarReader::new(Cursor::new(archive));
    let entry = reader.next_entry().unwrap().unwrap();
    assert_eq!(entry.name(), "hello.txt");
    assert_eq!(entry.size(), 5);
    assert_eq!(entry.format(), Format::Ustar);
    assert_eq!(reader.position(), 512);

    let mut text = String::new();
    reader.read_to_string(&mut text).unwrap();
    assert_eq!(text, "world");
    assert!(reader.next_entry().unwrap().is_none());
    assert!(reader.next_entry().unwrap().is_none());
}

#[test]
fn test_empty_archive() {
    let writer = TarWriter::new(Vec::new());
    let archive = writer.into_inner().unwrap();
    assert_eq!(archive, vec![0u8; 1024]);
    assert!(read_all(archive).is_empty());

    // A stream with no end blocks at all is also empty
    assert!(read_all(Vec::new()).is_empty());
}

#[test]
fn test_every_format_roundtrip() {
    for format in [Format::V7, Format::Ustar, Format::Pax, Format::Gnu] {
        let mut writer = TarWriter::new(Vec::new());
        let mut entry = Entry::file("dir/file.bin", 700)
            .with_format(format)
            .with_mode(0o640)
            .unwrap()
            .with_owner(1000, 100)
            .with_mtime(TarTime::from_secs(1_234_567_890));
        if format != Format::V7 {
            entry.uname = Some("alice".into());
            entry.gname = Some("users".into());
        }
        let payload: Vec<u8> = (0..700u32).map(|i| (i % 251) as u8).collect();
        writer.put_entry(&entry).unwrap();
        writer.write_all(&payload).unwrap();
        writer
            .put_entry(&Entry::symlink("dir/link", "file.bin").with_format(format))
            .unwrap();

        let entries = read_all(writer.into_inner().unwrap());
        assert_eq!(entries.len(), 2, "{format}");
        let (read, data) = &entries[0];
        assert_eq!(read.name(), "dir/file.bin", "{format}");
        assert_eq!(read.mode, Some(0o640), "{format}");
        assert_eq!(read.uid, Some(1000), "{format}");
        assert_eq!(read.gid, Some(100), "{format}");
        assert_eq!(read.mtime, Some(TarTime::from_secs(1_234_567_890)), "{format}");
        assert_eq!(data, &payload, "{format}");
        assert_eq!(read.uname, entry.uname, "{format}");
        assert_eq!(read.gname, entry.gname, "{format}");
        assert!(entries[1].0.is_symlink(), "{format}");
        assert_eq!(entries[1].0.linkname(), "file.bin", "{format}");

        // A PAX entry whose fields all fit is a plain USTAR header
        let expected = match format {
            Format::Pax => Format::Ustar,
            other => other,
        };
        assert_eq!(read.format(), expected);
    }
}

#[test]
fn test_ustar_prefix_split() {
    let path = format!("{}/{}", "segment".repeat(20), "n".repeat(90));
    let mut writer = TarWriter::new(Vec::new());
    writer
        .put_entry(&Entry::file(path.clone(), 0).with_format(Format::Ustar))
        .unwrap();
    let archive = writer.into_inner().unwrap();

    assert_eq!(&archive[..90], "n".repeat(90).as_bytes());
    assert_eq!(&archive[345..485], "segment".repeat(20).as_bytes());
    let entries = read_all(archive);
    assert_eq!(entries[0].0.name(), path);
}

#[test]
fn test_partial_reads_and_skip() {
    let payload: Vec<u8> = (0..3000u32).map(|i| (i % 256) as u8).collect();
    let mut writer = TarWriter::new(Vec::new());
    writer.add_file("big", &payload).unwrap();
    writer.add_file("after", b"tail").unwrap();
    let archive = writer.into_inner().unwrap();

    let mut reader = TarReader::new(Cursor::new(archive));
    reader.next_entry().unwrap().unwrap();
    let mut small = [0u8; 7];
    reader.read_exact(&mut small).unwrap();
    assert_eq!(small, payload[..7]);
    assert_eq!(reader.skip(1000).unwrap(), 1000);
    assert_eq!(reader.remaining(), 3000 - 1007);
    let mut rest = Vec::new();
    reader.read_to_end(&mut rest).unwrap();
    assert_eq!(rest, payload[1007..]);
    assert_eq!(reader.skip(10).unwrap(), 0);

    let next = reader.next_entry().unwrap().unwrap();
    assert_eq!(next.name(), "after");
    assert_eq!(reader.read_entry_data().unwrap(), b"tail");
}

// ============================================================================
// Extension Tests
// ============================================================================

#[test]
fn test_pax_promotions() {
    let long_path = format!("{}/leaf", "p".repeat(200));
    let cases = vec![
        Entry::file(long_path.clone(), 0),
        Entry::file("uid", 0).with_owner(1 << 33, 0),
        Entry::file("nanos", 0).with_mtime(TarTime::new(1_700_000_000, 1)),
        Entry::file("before-epoch", 0).with_mtime(TarTime::new(-86_400, 250_000_000)),
        Entry::file("\u{65e5}\u{672c}\u{8a9e}.txt", 0),
        Entry::hard_link("hard", "\u{30ea}\u{30f3}\u{30af}"),
    ];

    let mut writer = TarWriter::new(Vec::new());
    for entry in &cases {
        writer.put_entry(entry).unwrap();
    }
    let entries = read_all(writer.into_inner().unwrap());
    assert_eq!(entries.len(), cases.len());

    for ((read, _), written) in entries.iter().zip(&cases) {
        assert_eq!(read.format(), Format::Pax, "{:?}", written.name());
        assert_eq!(read.name(), written.name());
        assert_eq!(read.linkname(), written.linkname());
        assert_eq!(read.uid.unwrap_or(0), written.uid.unwrap_or(0));
        assert_eq!(read.mtime.unwrap_or_default(), written.mtime.unwrap_or_default());
    }
}

#[test]
fn test_pax_extensions_roundtrip() {
    let mut entry = Entry::file("tagged", 1);
    entry
        .extensions
        .insert("SCHILY.xattr.user.mime_type".into(), "text/plain".into());
    entry.extensions.insert("LIBARCHIVE.creationtime".into(), "1".into());
    entry.atime = Some(TarTime::new(10, 5));
    entry.ctime = Some(TarTime::new(20, 0));

    let mut writer = TarWriter::new(Vec::new());
    writer.put_entry(&entry).unwrap();
    writer.write_payload(b"x").unwrap();
    let entries = read_all(writer.into_inner().unwrap());

    let read = &entries[0].0;
    assert_eq!(read.extensions, entry.extensions);
    assert_eq!(read.atime, entry.atime);
    assert_eq!(read.ctime, entry.ctime);
    assert_eq!(entries[0].1, b"x");
}

#[test]
fn test_global_header_scope() {
    let mut writer = TarWriter::new(Vec::new());
    writer
        .put_global_header(&BTreeMap::from([
            ("gname".to_string(), "staff".to_string()),
            ("comment".to_string(), "release build".to_string()),
        ]))
        .unwrap();
    writer.add_file("a", b"a").unwrap();
    writer
        .put_global_header(&BTreeMap::from([("comment".to_string(), String::new())]))
        .unwrap();
    writer.add_file("b", b"b").unwrap();
    let archive = writer.into_inner().unwrap();
    assert_eq!(archive[156], b'g');

    let mut reader = TarReader::new(Cursor::new(archive));
    let a = reader.next_entry().unwrap().unwrap();
    assert_eq!(a.gname.as_deref(), Some("staff"));
    assert_eq!(a.comment.as_deref(), Some("release build"));

    let b = reader.next_entry().unwrap().unwrap();
    assert_eq!(b.gname.as_deref(), Some("staff"));
    assert_eq!(b.comment, None);
    assert_eq!(reader.global_header().len(), 1);
}

#[test]
fn test_gnu_long_name_and_link() {
    let name = format!("{}/file", "d".repeat(150));
    let target = format!("../{}", "t".repeat(150));
    let mut writer = TarWriter::new(Vec::new());
    writer
        .put_entry(&Entry::hard_link(name.clone(), target.clone()).with_format(Format::Gnu))
        .unwrap();
    let archive = writer.into_inner().unwrap();

    // L entry, its payload, K entry, its payload, header, end
    assert_eq!(archive[156], b'L');
    assert_eq!(&archive[..13], b"././@LongLink");
    assert_eq!(archive.len(), 512 * 7);

    let entries = read_all(archive);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0.name(), name);
    assert_eq!(entries[0].0.linkname(), target);
    assert!(entries[0].0.is_hard_link());
    assert_eq!(entries[0].0.format(), Format::Gnu);
}

#[test]
fn test_gnu_base256_header_fields() {
    let mut writer = TarWriter::new(Vec::new());
    let entry = Entry::file("ids", 0)
        .with_format(Format::Gnu)
        .with_owner(u64::from(u32::MAX) + 1, 3)
        .with_mtime(TarTime::from_secs(-1));
    writer.put_entry(&entry).unwrap();
    let archive = writer.into_inner().unwrap();

    // High bit marks base-256; -1 is all ones
    assert_eq!(archive[108] & 0x80, 0x80);
    assert_eq!(&archive[136..148], &[0xFF; 12]);
    let entries = read_all(archive);
    assert_eq!(entries[0].0.uid, entry.uid);
    assert_eq!(entries[0].0.mtime, entry.mtime);
}

// ============================================================================
// Reader Options Tests
// ============================================================================

#[test]
fn test_concatenated_archives() {
    let mut first = TarWriter::new(Vec::new());
    first.add_file("first", b"1").unwrap();
    let mut second = TarWriter::new(Vec::new());
    second.add_file("second", b"2").unwrap();
    let mut archive = first.into_inner().unwrap();
    archive.extend(second.into_inner().unwrap());

    assert_eq!(read_all(archive.clone()).len(), 1);

    let options = ReadOptions::new().ignore_zeros(true);
    let mut reader = TarReader::with_options(Cursor::new(archive), options).unwrap();
    let mut names = Vec::new();
    while let Some(entry) = reader.next_entry().unwrap() {
        names.push(entry.name().to_string());
    }
    assert_eq!(names, ["first", "second"]);
}

#[test]
fn test_small_block_size() {
    let mut writer =
        TarWriter::with_options(Vec::new(), WriteOptions::new().block_size(512)).unwrap();
    writer.add_file("x", &[7u8; 1500]).unwrap();
    let archive = writer.into_inner().unwrap();

    let options = ReadOptions::new().block_size(512);
    let mut reader = TarReader::with_options(Cursor::new(archive), options).unwrap();
    reader.next_entry().unwrap().unwrap();
    assert_eq!(reader.read_entry_data().unwrap(), vec![7u8; 1500]);
}
