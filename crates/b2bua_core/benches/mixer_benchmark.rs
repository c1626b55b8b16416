//! Benchmarks for the hot paths a pump thread exercises every ptime period:
//! a bridge device hand-off and one frame of silence/file playback
//! production. These are the two calls every pump makes on its 20ms tick
//! (§4.C), so they are the genuinely performance-sensitive inner loops.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use b2bua_core::{DeviceRegistry, Frame, PlaybackSource, SilenceSource};

fn benchmark_bridge_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("bridge_device_write");

    for frame_len in [160usize, 960] {
        let registry = DeviceRegistry::new();
        let device = registry.open_bridge("bench", true).unwrap();
        device.set_capture(Arc::new(|_frame: &Frame| {}));
        let frame = Frame::from_samples(vec![0i16; frame_len]);

        group.throughput(Throughput::Elements(frame_len as u64));
        group.bench_function(format!("write_{frame_len}_samples"), |b| {
            b.iter(|| device.write(black_box(&frame)));
        });
    }

    group.finish();
}

fn benchmark_silence_source(c: &mut Criterion) {
    c.bench_function("silence_source_960_samples", |b| {
        let mut source = SilenceSource;
        b.iter(|| black_box(source.write_samples(960)));
    });
}

criterion_group!(benches, benchmark_bridge_write, benchmark_silence_source);
criterion_main!(benches);
