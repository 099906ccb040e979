//! Criterion benchmarks for the frame ingest hot path.
//!
//! At 500 frames/s with 16 channels the parser has a comfortable budget, but the queue can
//! only drain if parsing plus the store update stays well below a couple of milliseconds.
//!
//! Key metrics:
//! - `parse_frame` latency by channel count
//! - `SlidingWindow::push` on a full window (every push evicts)
//! - store ingest and end-to-end frame handling, per batch of frames
//!
//! Run with: cargo bench --bench frame_ingest

use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};
use serial_daq::label::LabelCell;
use serial_daq::parser::{parse_frame, FrameParser};
use serial_daq::queue::{Frame, HandoffQueue};
use serial_daq::store::{ChannelStore, SlidingWindow};
use std::sync::Arc;

fn frame_line(channels: usize) -> Vec<u8> {
    let fields: Vec<String> = (0..channels).map(|c| (c * 37 % 1024).to_string()).collect();
    format!("{}\r\n", fields.join(",")).into_bytes()
}

fn parse_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_frame");

    for channels in [3usize, 16, 64] {
        let line = frame_line(channels);
        group.throughput(Throughput::Bytes(line.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(channels), &line, |b, line| {
            b.iter(|| parse_frame(black_box(line), ",", channels).unwrap());
        });
    }

    group.finish();
}

fn window_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("window_push");

    for capacity in [100usize, 300, 1000] {
        let mut window = SlidingWindow::new(capacity);
        for v in 0..capacity as i64 {
            window.push(v);
        }

        group.bench_function(BenchmarkId::new("full", capacity), |b| {
            b.iter(|| window.push(black_box(42)));
        });
    }

    group.finish();
}

/// The store keeps the whole history, so every batch starts from a fresh store.
fn store_ingest(c: &mut Criterion) {
    const FRAMES: usize = 1000;
    let mut group = c.benchmark_group("store_ingest");
    group.throughput(Throughput::Elements(FRAMES as u64));

    let values: Vec<i64> = (0..16).collect();
    group.bench_function("push_16ch", |b| {
        b.iter_batched(
            || ChannelStore::new(16, 300),
            |store| {
                for _ in 0..FRAMES {
                    store.push(black_box(&values), "-1".into()).unwrap();
                }
                store
            },
            BatchSize::SmallInput,
        );
    });

    let frames: Vec<Frame> = (0..FRAMES as u64)
        .map(|seq| Frame::new(seq, frame_line(16)))
        .collect();
    group.bench_function("handle_16ch", |b| {
        b.iter_batched(
            || {
                let store = Arc::new(ChannelStore::new(16, 300));
                let queue = Arc::new(HandoffQueue::new());
                FrameParser::new(queue, store, Arc::new(LabelCell::default()), ",")
            },
            |parser| {
                for frame in &frames {
                    parser.handle(black_box(frame));
                }
                parser
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, parse_latency, window_push, store_ingest);
criterion_main!(benches);
