//! Benchmarks for obs-amf
//!
//! Measures the session's per-frame bookkeeping against an encoder that
//! hands every surface straight back, so only our own overhead shows.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use obs_amf::backend::{EncoderComponent, InputSurface, OutputData, Variant};
use obs_amf::codec::{Codec, SurfaceFormat};
use obs_amf::color::ColorTags;
use obs_amf::props::CALLER_PTS;
use obs_amf::result::AmfResult;
use obs_amf::session::{Session, SessionConfig};
use obs_amf::timestamp::{to_caller, to_encoder};
use obs_amf::EncoderSettings;
use obs_video::{ColorRange, ColorSpace, FrameRate, SurfaceKey};
use std::collections::{HashMap, VecDeque};

struct BenchSurface {
    pts: i64,
    caller_pts: i64,
}

impl InputSurface for BenchSurface {
    fn key(&self) -> SurfaceKey {
        SurfaceKey(0)
    }

    fn set_pts(&mut self, pts: i64) {
        self.pts = pts;
    }

    fn set_property(&mut self, _name: &str, value: Variant) -> Result<(), AmfResult> {
        self.caller_pts = value.as_int().unwrap_or(0);
        Ok(())
    }
}

struct BenchOutput {
    pts: i64,
    caller_pts: i64,
    tag: i64,
    bytes: Vec<u8>,
}

impl OutputData for BenchOutput {
    fn property(&self, name: &str) -> Result<Variant, AmfResult> {
        if name == CALLER_PTS {
            Ok(Variant::Int(self.caller_pts))
        } else {
            Ok(Variant::Int(self.tag))
        }
    }

    fn pts(&self) -> i64 {
        self.pts
    }

    fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Emits one output per input with a fixed-size payload
struct Loopback {
    props: HashMap<String, Variant>,
    pending: VecDeque<BenchOutput>,
    frames: i64,
    payload: usize,
}

impl Loopback {
    fn new(payload: usize) -> Self {
        Loopback {
            props: HashMap::new(),
            pending: VecDeque::new(),
            frames: 0,
            payload,
        }
    }
}

impl EncoderComponent for Loopback {
    type Surface = BenchSurface;
    type Output = BenchOutput;

    fn set_property(&mut self, name: &str, value: Variant) -> Result<(), AmfResult> {
        self.props.insert(name.to_owned(), value);
        Ok(())
    }

    fn get_property(&self, name: &str) -> Result<Variant, AmfResult> {
        self.props.get(name).cloned().ok_or(AmfResult::NOT_FOUND)
    }

    fn caps_property(&self, _name: &str) -> Result<Variant, AmfResult> {
        Ok(Variant::Int(i64::MAX))
    }

    fn set_blob(&mut self, _name: &str, _bytes: &[u8]) -> Result<(), AmfResult> {
        Ok(())
    }

    fn get_blob(&self, _name: &str) -> Result<Vec<u8>, AmfResult> {
        Ok(vec![0, 0, 0, 1])
    }

    fn init(&mut self, _format: SurfaceFormat, _width: u32, _height: u32) -> Result<(), AmfResult> {
        Ok(())
    }

    fn reinit(&mut self, _width: u32, _height: u32) -> Result<(), AmfResult> {
        Ok(())
    }

    fn submit_input(&mut self, surface: &BenchSurface) -> AmfResult {
        self.pending.push_back(BenchOutput {
            pts: surface.pts,
            caller_pts: surface.caller_pts,
            tag: if self.frames % 60 == 0 { 0 } else { 2 },
            bytes: vec![0u8; self.payload],
        });
        self.frames += 1;
        AmfResult::OK
    }

    fn query_output(&mut self) -> (AmfResult, Option<BenchOutput>) {
        match self.pending.pop_front() {
            Some(out) => (AmfResult::OK, Some(out)),
            None => (AmfResult::REPEAT, None),
        }
    }

    fn terminate(&mut self) {}
}

fn bench_session_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("session_encode");

    for payload in [1024usize, 64 * 1024].iter() {
        let config = SessionConfig {
            codec: Codec::Avc,
            width: 1920,
            height: 1080,
            frame_rate: FrameRate::new(60, 1),
            format: SurfaceFormat::Nv12,
            color: ColorTags::new(ColorSpace::CS709, ColorRange::Partial),
            hdr_nominal_peak: 1000,
            label: Codec::Avc.label(false),
        };
        let mut session = Session::new(Loopback::new(*payload), config);
        session.configure(&EncoderSettings::default()).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(payload), payload, |b, _| {
            let mut pts = 0i64;
            b.iter(|| {
                let mut surface = BenchSurface { pts: 0, caller_pts: 0 };
                session.stamp(&mut surface, pts).unwrap();
                pts += 1;
                let packet = session.encode(&surface).unwrap();
                black_box(packet.map(|p| p.dts));
            });
        });
    }

    group.finish();
}

fn bench_timestamps(c: &mut Criterion) {
    c.bench_function("timestamp_round_trip_ntsc", |b| {
        b.iter(|| {
            let mut acc = 0i64;
            for pts in 0..1000i64 {
                acc += to_caller(to_encoder(black_box(pts), 1001), 1001);
            }
            acc
        })
    });
}

criterion_group!(benches, bench_session_encode, bench_timestamps);
criterion_main!(benches);
