//! Performance benchmarks for the header field codec
//!
//! This benchmark suite evaluates:
//! - Octal and base-256 numeric field encode/decode
//! - Checksum computation and verification
//! - Full header block encode/decode per layout

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use oxitar_core::field::{self, BLOCK_SIZE, decode_number, encode_gnu_number, encode_number};
use oxitar_core::header::{GnuHeader, RawHeader, UstarHeader, V7Header};
use oxitar_core::TypeFlag;
use std::hint::black_box;

fn sample_base() -> V7Header {
    V7Header {
        name: "bench/dir/file.txt".to_string(),
        mode: Some(0o644),
        uid: Some(1000),
        gid: Some(1000),
        size: Some(123_456),
        mtime: Some(1_700_000_000),
        checksum: None,
        typeflag: TypeFlag::REGULAR,
        linkname: String::new(),
    }
}

/// Benchmark numeric field codecs
fn bench_numbers(c: &mut Criterion) {
    let mut group = c.benchmark_group("numeric_fields");

    let values = [
        ("small", 0o644i128),
        ("octal_max", 0o77777777777),
        ("base256", 1 << 40),
        ("negative", -315_619_200),
    ];

    for (label, value) in values {
        group.bench_with_input(BenchmarkId::new("encode_gnu", label), &value, |b, &v| {
            let mut buf = [0u8; 12];
            b.iter(|| {
                encode_gnu_number(black_box(v), &mut buf).unwrap();
                black_box(&buf);
            });
        });

        let mut buf = [0u8; 12];
        encode_gnu_number(value, &mut buf).unwrap();
        group.bench_with_input(BenchmarkId::new("decode", label), &buf, |b, buf| {
            b.iter(|| {
                let v: Option<i64> = decode_number(black_box(buf)).unwrap();
                black_box(v);
            });
        });
    }

    group.bench_function("encode_octal", |b| {
        let mut buf = [0u8; 8];
        b.iter(|| {
            encode_number(black_box(0o755), &mut buf).unwrap();
            black_box(&buf);
        });
    });

    group.finish();
}

/// Benchmark checksum over a populated header
fn bench_checksum(c: &mut Criterion) {
    let mut group = c.benchmark_group("checksum");
    group.throughput(Throughput::Bytes(BLOCK_SIZE as u64));

    let block = RawHeader::V7(sample_base()).encode().unwrap();

    group.bench_function("compute", |b| {
        b.iter(|| black_box(field::checksum(black_box(&block))));
    });
    group.bench_function("verify", |b| {
        b.iter(|| black_box(field::verify_checksum(black_box(&block)).unwrap()));
    });

    group.finish();
}

/// Benchmark full header encode/decode per layout
fn bench_headers(c: &mut Criterion) {
    let mut group = c.benchmark_group("header_block");
    group.throughput(Throughput::Bytes(BLOCK_SIZE as u64));

    let headers = [
        ("v7", RawHeader::V7(sample_base())),
        (
            "ustar",
            RawHeader::Ustar(UstarHeader {
                base: sample_base(),
                uname: "user".into(),
                gname: "group".into(),
                ..UstarHeader::default()
            }),
        ),
        (
            "gnu",
            RawHeader::Gnu(GnuHeader {
                base: sample_base(),
                atime: Some(1_700_000_000),
                ctime: Some(1_700_000_000),
                ..GnuHeader::default()
            }),
        ),
    ];

    for (label, header) in &headers {
        group.bench_with_input(BenchmarkId::new("encode", label), header, |b, h| {
            b.iter(|| black_box(h.encode().unwrap()));
        });

        let block = header.encode().unwrap();
        group.bench_with_input(BenchmarkId::new("decode", label), &block, |b, block| {
            b.iter(|| black_box(RawHeader::decode(black_box(block)).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_numbers, bench_checksum, bench_headers);
criterion_main!(benches);
