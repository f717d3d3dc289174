//! Section codec benchmark suite.
//!
//! Benchmarks encoding and decoding of transport frames:
//! - Section counts per frame: 1, 16, 128
//! - Mixed frames (data, heartbeat-ack, unknown opCode)
//!
//! Run with: cargo bench --bench codec
//! Results saved to: target/criterion/

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use serde_json::{Value, json};

use danmaku_socket::protocol::{
    DEFAULT_CODERS, HEARTBEAT_ACK, Payload, PayloadKind, Section, SectionCoder, SectionHeader,
    decode_sections, encode_sections,
};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const SECTION_COUNTS: &[usize] = &[1, 16, 128];

/// Coder absent from the default registry; decode skips its sections.
const UNREGISTERED: SectionCoder = SectionCoder::new(
    "unregistered",
    SectionHeader::new(false, 99, false),
    PayloadKind::Opaque,
);

// ============================================================================
// Fixtures
// ============================================================================

fn chat_payload(i: usize) -> Value {
    json!({
        "cmd": "DANMU_MSG:4:0:2:2:2:0",
        "info": [
            [0, 1, 25, 16777215, 1_700_000_000u64 + i as u64, 0, 0, "", 0, 0, 0, "", 0],
            format!("message number {i}"),
            [i, "viewer", 0, 0, 0, 10000, 1, ""],
        ]
    })
}

fn data_sections(count: usize) -> Vec<Section> {
    (0..count).map(|i| Section::data(chat_payload(i))).collect()
}

fn mixed_frame(count: usize) -> Vec<u8> {
    let mut sections = data_sections(count);
    sections.push(Section::new(HEARTBEAT_ACK, Payload::Bytes(vec![0, 0, 4, 210])));
    sections.push(Section::new(UNREGISTERED, Payload::Bytes(b"{}".to_vec())));
    encode_sections(&sections)
}

// ============================================================================
// Benchmark: Encode
// ============================================================================

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for &count in SECTION_COUNTS {
        let sections = data_sections(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("data", count), &sections, |b, sections| {
            b.iter(|| encode_sections(black_box(sections)));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Decode
// ============================================================================

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for &count in SECTION_COUNTS {
        let frame = mixed_frame(count);
        group.throughput(Throughput::Bytes(frame.len() as u64));
        group.bench_with_input(BenchmarkId::new("mixed", count), &frame, |b, frame| {
            b.iter(|| decode_sections(&DEFAULT_CODERS, black_box(frame)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
