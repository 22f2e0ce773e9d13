// ABOUTME: Benchmarks for the frame codec's hot path: header encode/decode and payload sizing
// ABOUTME: Measures allocation-sensitive operations on the wire format, not full I/O round trips

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use peertalk::frame::{check_payload_size, FrameHeader};
use std::io::Cursor;
use std::time::Duration;

fn bench_header_encode(c: &mut Criterion) {
    let header = FrameHeader::new(101, 7, 4096);

    let mut group = c.benchmark_group("header_encode");
    group.measurement_time(Duration::from_secs(5));
    group.bench_function("encode", |b| {
        b.iter(|| {
            let mut buf = BytesMut::with_capacity(16);
            black_box(header).encode(&mut buf);
            buf
        })
    });
    group.finish();
}

fn bench_header_decode(c: &mut Criterion) {
    let header = FrameHeader::new(101, 7, 4096);
    let mut encoded = BytesMut::with_capacity(16);
    header.encode(&mut encoded);
    let encoded = encoded.freeze();

    let mut group = c.benchmark_group("header_decode");
    group.measurement_time(Duration::from_secs(5));
    group.bench_function("decode", |b| {
        b.iter(|| {
            let mut cursor = Cursor::new(black_box(encoded.as_ref()));
            FrameHeader::decode(&mut cursor).unwrap()
        })
    });
    group.finish();
}

fn bench_payload_ceiling_check(c: &mut Criterion) {
    let mut group = c.benchmark_group("payload_ceiling_check");
    group.measurement_time(Duration::from_secs(5));

    for size in [0u32, 4096, 1 << 20, 1 << 24] {
        group.bench_with_input(BenchmarkId::new("check", size), &size, |b, &size| {
            b.iter(|| check_payload_size(black_box(size), black_box(16 * 1024 * 1024)))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_header_encode,
    bench_header_decode,
    bench_payload_ceiling_check,
);
criterion_main!(benches);
