//! Benchmarks for frame encoding and the streaming receiver.

use chroma_proto::frame::{encode_frame, FrameReceiver, MAX_FRAME_LEN, MAX_PAYLOAD_LEN};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_encode(c: &mut Criterion) {
    let payload: Vec<u8> = (0..MAX_PAYLOAD_LEN).map(|i| i as u8).collect();
    let mut out = [0u8; MAX_FRAME_LEN];
    c.bench_function("encode_frame_max_payload", |b| {
        b.iter(|| encode_frame(black_box(&payload), &mut out).unwrap())
    });
}

fn bench_receive(c: &mut Criterion) {
    let payload: Vec<u8> = (0..MAX_PAYLOAD_LEN).map(|i| i as u8).collect();
    let mut frame = [0u8; MAX_FRAME_LEN];
    let n = encode_frame(&payload, &mut frame).unwrap();

    c.bench_function("receive_frame_max_payload", |b| {
        let mut rx = FrameReceiver::new();
        b.iter(|| {
            let mut got = 0;
            for &byte in &frame[..n] {
                if let Some(Ok(p)) = rx.push(black_box(byte)) {
                    got = p.len();
                }
            }
            got
        })
    });
}

criterion_group!(benches, bench_encode, bench_receive);
criterion_main!(benches);
