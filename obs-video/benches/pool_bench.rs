//! Benchmarks for obs-video
//!
//! Measures the per-frame cost of the surface pool round trip and plane packing.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use obs_video::{pack_planes, upload_buffer_size, RawFrame, SurfaceKey, SurfacePool, VideoFormat};
use std::convert::Infallible;

fn bench_pool_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_round_trip");

    for in_flight in [1usize, 4, 16].iter() {
        let pool: SurfacePool<Vec<u8>> = SurfacePool::new();

        group.bench_with_input(BenchmarkId::from_parameter(in_flight), in_flight, |b, &n| {
            let mut key = 0usize;
            b.iter(|| {
                for _ in 0..n {
                    let buf = pool
                        .acquire_or_create(|| Ok::<_, Infallible>(vec![0u8; 64]))
                        .unwrap();
                    key += 1;
                    pool.lend(SurfaceKey(key), buf);
                }
                for k in key + 1 - n..=key {
                    black_box(pool.release(SurfaceKey(k)));
                }
            });
        });
    }

    group.finish();
}

fn bench_pack_nv12(c: &mut Criterion) {
    let mut group = c.benchmark_group("pack_planes");

    for (width, height) in [(1280u32, 720u32), (1920, 1080), (3840, 2160)].iter() {
        let y = vec![16u8; (*width * *height) as usize];
        let uv = vec![128u8; (*width * *height / 2) as usize];
        let frame = RawFrame::new(*width, *height, &[(&y, *width), (&uv, *width)]);
        let mut dst = vec![0u8; upload_buffer_size(VideoFormat::NV12, *width, *height)];

        group.bench_function(format!("nv12_{}x{}", width, height), |b| {
            b.iter(|| black_box(pack_planes(VideoFormat::NV12, &frame, *width, &mut dst)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_pool_round_trip, bench_pack_nv12);
criterion_main!(benches);
