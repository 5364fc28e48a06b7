//! Encoder session state machine
//!
//! Owns one configured component and drives its asynchronous protocol:
//! surfaces go in through `SubmitInput`, compressed data comes out of
//! `QueryOutput` in whatever batches the hardware produces. Output is
//! buffered here and handed to the caller one packet per encode call.
//!
//! States: `Created -> Initialized -> Encoding -> Draining -> Terminated`.

use crate::backend::{EncoderComponent, InputSurface, OutputData, Variant};
use crate::codec::{
    Codec, SurfaceFormat, AV1_ALIGNMENT_NO_RESTRICTIONS, AV1_LATENCY_MODE_NONE, CABAC_UNDEFINED,
    MAX_CONSECUTIVE_BFRAMES, USAGE_TRANSCODING,
};
use crate::color::{ColorTags, COLOR_BIT_DEPTH_10, COLOR_BIT_DEPTH_8};
use crate::error::{Error, Result};
use crate::packet::{classify, EncodedPacket};
use crate::props::CALLER_PTS;
use crate::result::AmfResult;
use crate::settings::{parse_options, EncoderSettings, RateControl, SettingsReport};
use crate::throughput::{negotiate_preset, required_throughput};
use crate::timestamp::{to_caller, to_encoder};
use obs_video::FrameRate;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Longest time a single frame may wait for the encoder to accept it
pub const SUBMIT_TIMEOUT: Duration = Duration::from_secs(5);
const SUBMIT_RETRY_DELAY: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Initialized,
    Encoding,
    Draining,
    Terminated,
}

/// Fixed stream parameters of a session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub codec: Codec,
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    pub format: SurfaceFormat,
    pub color: ColorTags,
    /// Nominal peak luminance of PQ content, in nits
    pub hdr_nominal_peak: u32,
    /// Log prefix, e.g. `texture-amf-h264: 'simple_video'`
    pub label: String,
}

fn set_logged<C: EncoderComponent>(component: &mut C, label: &str, name: &str, value: Variant) {
    if let Err(code) = component.set_property(name, value) {
        log::error!("[{}] Failed to set property '{}': {}", label, name, code);
    }
}

fn read_int(value: std::result::Result<Variant, AmfResult>) -> Option<i64> {
    value.ok().and_then(|v| v.as_int())
}

pub struct Session<C: EncoderComponent> {
    component: C,
    config: SessionConfig,
    state: SessionState,
    queue: VecDeque<C::Output>,
    /// Output behind the packet returned by the last encode call
    current: Option<C::Output>,
    header: Option<Vec<u8>>,
    dts_offset: i64,
    first_update: bool,
    submit_timeout: Duration,
    bframes_supported: bool,
    max_throughput: i64,
}

impl<C: EncoderComponent> Session<C> {
    pub fn new(component: C, config: SessionConfig) -> Self {
        Session {
            component,
            config,
            state: SessionState::Created,
            queue: VecDeque::new(),
            current: None,
            header: None,
            dts_offset: 0,
            first_update: true,
            submit_timeout: SUBMIT_TIMEOUT,
            bframes_supported: false,
            max_throughput: 0,
        }
    }

    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }

    fn set(&mut self, name: &str, value: impl Into<Variant>) {
        set_logged(&mut self.component, &self.config.label, name, value.into());
    }

    /// Apply every creation-time property, initialize the component and
    /// read back the stream header
    pub fn configure(&mut self, settings: &EncoderSettings) -> Result<SettingsReport> {
        if self.state != SessionState::Created {
            return Err(Error::Failed("encoder session is already configured"));
        }

        let codec = self.config.codec;
        let props = codec.props();
        let SessionConfig {
            width,
            height,
            frame_rate,
            format,
            color,
            ..
        } = self.config.clone();

        let required = required_throughput(width, height, frame_rate);
        if let Some(name) = props.cap_bframes {
            self.bframes_supported = self
                .component
                .caps_property(name)
                .ok()
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
        }
        self.max_throughput = read_int(self.component.caps_property(props.cap_max_throughput)).unwrap_or(0);

        // static properties
        self.set(
            props.frame_size,
            Variant::Size {
                width: width as i32,
                height: height as i32,
            },
        );
        self.set(props.usage, USAGE_TRANSCODING);
        if let Some(name) = props.alignment_mode {
            self.set(name, AV1_ALIGNMENT_NO_RESTRICTIONS);
        }
        self.set(props.quality_preset, codec.preset_value(settings.preset));
        if let Some(name) = props.color_bit_depth {
            let depth = if format.is_10bit() {
                COLOR_BIT_DEPTH_10
            } else {
                COLOR_BIT_DEPTH_8
            };
            self.set(name, depth);
        }
        self.set(props.profile, codec.profile_value(settings.profile, format));
        if let Some(name) = props.low_latency {
            self.set(name, false);
        }
        if let Some(name) = props.latency_mode {
            self.set(name, AV1_LATENCY_MODE_NONE);
        }
        if let Some(name) = props.cabac {
            self.set(name, CABAC_UNDEFINED);
        }
        if let Some(name) = props.preencode {
            self.set(name, true);
        }
        self.set(props.color_profile, color.profile);
        self.set(props.transfer_characteristic, color.transfer);
        self.set(props.color_primaries, color.primaries);
        if let Some(name) = props.full_range {
            self.set(name, color.full_range);
        }
        if let Some(name) = props.hdr_metadata {
            if let Some(metadata) = color.hdr_metadata(self.config.hdr_nominal_peak) {
                if let Err(code) = self.component.set_blob(name, bytemuck::bytes_of(&metadata)) {
                    log::error!("[{}] Failed to set HDR metadata: {}", self.config.label, code);
                }
            }
        }

        // rate control and GOP
        let mut bframes = 0;
        if codec.supports_bframes() {
            let requested = settings.clamped_bframes();
            if self.bframes_supported {
                if let (Some(max_b), Some(pattern)) = (props.max_consecutive_b, props.b_pattern) {
                    self.set(max_b, MAX_CONSECUTIVE_BFRAMES);
                    self.set(pattern, requested as i64);
                }
                bframes = requested;
            } else if requested != 0 {
                log::warn!(
                    "[{}] B-Frames set to {} but b-frames are not supported by this device",
                    self.config.label,
                    requested
                );
            }
        }

        let rc = settings.rate_control;
        self.set(props.rate_control, codec.rate_control_value(rc));
        if rc != RateControl::Cqp {
            if let Some(name) = props.enable_vbaq {
                self.set(name, true);
            }
        }
        self.apply_rate(rc, settings.bitrate * 1000, settings.cqp);
        self.set(props.enforce_hrd, true);
        if let Some(name) = props.high_motion_boost {
            self.set(name, false);
        }

        let gop_size = settings.gop_size(frame_rate);
        self.set(props.gop, gop_size);
        if settings.repeat_headers {
            if let Some(name) = props.header_spacing {
                self.set(name, gop_size);
            }
        }
        if let Some(name) = props.deblocking {
            self.set(name, true);
        }

        let preset = {
            let component = &mut self.component;
            let label = self.config.label.as_str();
            negotiate_preset(settings.preset, required, self.max_throughput, |preset, requery| {
                set_logged(
                    component,
                    label,
                    props.quality_preset,
                    Variant::Int(codec.preset_value(preset)),
                );
                if requery {
                    read_int(component.caps_property(props.cap_max_throughput))
                } else {
                    None
                }
            })
        };

        for option in parse_options(&settings.options) {
            if let Err(code) = self.component.set_property(&option.name, option.value) {
                log::warn!(
                    "[{}] Failed to apply option '{}': {}",
                    self.config.label,
                    option.name,
                    code
                );
            }
        }

        let report = SettingsReport {
            preset,
            gop_size,
            bframes,
            width,
            height,
        };
        log::info!("[{}] {}", self.config.label, settings.summary(codec, &report));

        self.component
            .init(format, width, height)
            .map_err(|code| Error::amf("AMFComponent::Init failed", code))?;

        self.set(
            props.frame_rate,
            Variant::Rate {
                num: frame_rate.num,
                den: frame_rate.den,
            },
        );

        self.header = self.component.get_blob(props.extra_data).ok();
        if self.header.is_none() {
            log::debug!("[{}] encoder has no extra data", self.config.label);
        }

        if self.bframes_supported {
            self.dts_offset = match (props.b_pattern, props.max_consecutive_b) {
                (Some(pattern), Some(max_b)) => {
                    match (
                        read_int(self.component.get_property(pattern)),
                        read_int(self.component.get_property(max_b)),
                    ) {
                        (Some(pattern), Some(_)) => pattern + 1,
                        _ => 0,
                    }
                }
                _ => 0,
            };
        }

        self.state = SessionState::Initialized;
        Ok(report)
    }

    /// Write bitrate or quality level properties for `rc`
    fn apply_rate(&mut self, rc: RateControl, bitrate: i64, qp: i64) {
        let codec = self.config.codec;
        let props = codec.props();

        if !rc.uses_qp() {
            self.set(props.target_bitrate, bitrate);
            self.set(props.peak_bitrate, bitrate);
            self.set(props.vbv_buffer_size, bitrate);

            if rc == RateControl::Cbr {
                self.set(props.filler_data, true);
            } else if codec == Codec::Av1 && matches!(rc, RateControl::Vbr | RateControl::Hqvbr) {
                self.set(props.peak_bitrate, bitrate * 3 / 2);
            }
            return;
        }

        if codec == Codec::Av1 {
            let q = qp * 4;
            self.set(props.qvbr_level, q / 4);
            if let Some(name) = props.q_index_intra {
                self.set(name, q);
            }
            if let Some(name) = props.q_index_inter {
                self.set(name, q);
            }
        } else {
            for name in [props.qp_i, props.qp_p, props.qp_b].into_iter().flatten() {
                self.set(name, qp);
            }
            self.set(props.qvbr_level, qp);
        }
    }

    /// Tag `surface` with the caller timestamp and its encoder-clock twin
    pub fn stamp(&self, surface: &mut C::Surface, pts: i64) -> Result<()> {
        surface.set_pts(to_encoder(pts, self.config.frame_rate.den));
        surface
            .set_property(CALLER_PTS, Variant::Int(pts))
            .map_err(|code| Error::amf("Failed to set surface PTS", code))
    }

    /// Submit one surface and return at most one packet
    ///
    /// The returned packet borrows encoder memory that is released on the
    /// next call.
    pub fn encode(&mut self, surface: &C::Surface) -> Result<Option<EncodedPacket<'_>>> {
        match self.state {
            SessionState::Created => return Err(Error::Failed("encoder session is not configured")),
            SessionState::Draining | SessionState::Terminated => {
                return Err(Error::Failed("encoder session is shut down"))
            }
            SessionState::Initialized | SessionState::Encoding => {}
        }
        self.state = SessionState::Encoding;
        self.current = None;

        let start = Instant::now();
        loop {
            let res = self.component.submit_input(surface);
            let accepted = if res == AmfResult::OK || res == AmfResult::NEED_MORE_INPUT {
                true
            } else if res == AmfResult::INPUT_FULL {
                std::thread::sleep(SUBMIT_RETRY_DELAY);
                if start.elapsed() >= self.submit_timeout {
                    return Err(Error::SubmitTimeout);
                }
                false
            } else {
                return Err(Error::amf("SubmitInput failed", res));
            };

            self.drain_output()?;

            if accepted {
                break;
            }
        }

        self.next_packet()
    }

    /// Query until the encoder has nothing more to hand out
    fn drain_output(&mut self) -> Result<()> {
        loop {
            let (res, data) = self.component.query_output();
            let received = data.is_some();
            if let Some(data) = data {
                self.queue.push_back(data);
            }

            if res != AmfResult::OK && res != AmfResult::REPEAT {
                return Err(Error::amf("QueryOutput failed", res));
            }
            if !received {
                return Ok(());
            }
        }
    }

    fn next_packet(&mut self) -> Result<Option<EncodedPacket<'_>>> {
        let Some(data) = self.queue.pop_front() else {
            return Ok(None);
        };

        let codec = self.config.codec;
        let fps_den = self.config.frame_rate.den;
        let dts_offset = self.dts_offset;
        let data = self.current.insert(data);

        let pts = read_int(data.property(CALLER_PTS)).unwrap_or(0);
        let tag = data
            .property(codec.props().output_type)
            .map_err(|code| Error::amf("Failed to GetProperty(): encoder output data type", code))?
            .as_int()
            .unwrap_or(-1);
        let (priority, keyframe) = classify(codec, tag);

        Ok(Some(EncodedPacket {
            data: data.bytes(),
            pts,
            dts: to_caller(data.pts(), fps_den) - dts_offset,
            priority,
            keyframe,
        }))
    }

    /// Apply a live bitrate or quality change
    ///
    /// The host pushes the creation settings once more right after
    /// creation; that first call is skipped.
    pub fn update(&mut self, settings: &EncoderSettings) -> Result<()> {
        if self.first_update {
            self.first_update = false;
            return Ok(());
        }

        self.apply_rate(settings.rate_control, settings.bitrate * 1000, settings.cqp);
        self.component
            .reinit(self.config.width, self.config.height)
            .map_err(|code| Error::amf("AMFComponent::Init failed", code))
    }

    /// Codec header (SPS/PPS, VPS or sequence header)
    pub fn extra_data(&self) -> Option<&[u8]> {
        self.header.as_deref()
    }

    pub fn dts_offset(&self) -> i64 {
        self.dts_offset
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn label(&self) -> &str {
        &self.config.label
    }

    pub fn max_throughput(&self) -> i64 {
        self.max_throughput
    }

    pub fn bframes_supported(&self) -> bool {
        self.bframes_supported
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn component(&self) -> &C {
        &self.component
    }

    /// Drop buffered output and terminate the component
    pub fn terminate(&mut self) {
        if self.state == SessionState::Terminated {
            return;
        }
        self.state = SessionState::Draining;
        self.queue.clear();
        self.current = None;
        self.component.terminate();
        self.state = SessionState::Terminated;
    }
}

impl<C: EncoderComponent> Drop for Session<C> {
    fn drop(&mut self) {
        self.terminate();
    }
}
