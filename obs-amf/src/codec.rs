//! Per-codec constants: component ids, enum values and labels

use crate::props::{self, CodecProps};
use crate::settings::{Preset, Profile, RateControl};
use obs_video::VideoFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    Avc,
    Hevc,
    Av1,
}

/// Pixel formats the encoder accepts, with their `AMF_SURFACE_FORMAT` values
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceFormat {
    Nv12 = 1,
    Bgra = 3,
    Rgba = 5,
    P010 = 10,
}

impl SurfaceFormat {
    /// Map a host video format onto an encoder surface format
    pub fn from_video(format: VideoFormat) -> Option<Self> {
        match format {
            VideoFormat::NV12 => Some(SurfaceFormat::Nv12),
            VideoFormat::P010 => Some(SurfaceFormat::P010),
            VideoFormat::RGBA => Some(SurfaceFormat::Rgba),
            _ => None,
        }
    }

    pub fn video_format(self) -> VideoFormat {
        match self {
            SurfaceFormat::Nv12 => VideoFormat::NV12,
            SurfaceFormat::P010 => VideoFormat::P010,
            SurfaceFormat::Rgba => VideoFormat::RGBA,
            SurfaceFormat::Bgra => VideoFormat::BGRA,
        }
    }

    pub fn is_10bit(self) -> bool {
        self == SurfaceFormat::P010
    }
}

pub const USAGE_TRANSCODING: i64 = 0;
pub const CABAC_UNDEFINED: i64 = 0;
pub const AV1_ALIGNMENT_NO_RESTRICTIONS: i64 = 3;
pub const AV1_LATENCY_MODE_NONE: i64 = 0;
pub const AV1_PROFILE_MAIN: i64 = 1;
pub const HEVC_PROFILE_MAIN: i64 = 1;
pub const HEVC_PROFILE_MAIN_10: i64 = 2;
pub const MAX_CONSECUTIVE_BFRAMES: i64 = 3;

impl Codec {
    /// Convert from the raw value used across the C boundary
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Codec::Avc),
            1 => Some(Codec::Hevc),
            2 => Some(Codec::Av1),
            _ => None,
        }
    }

    pub fn component_id(self) -> &'static str {
        match self {
            Codec::Avc => "AMFVideoEncoderVCE_AVC",
            Codec::Hevc => "AMFVideoEncoderHW_HEVC",
            Codec::Av1 => "AMFVideoEncoderHW_AV1",
        }
    }

    pub fn props(self) -> &'static CodecProps {
        match self {
            Codec::Avc => &props::AVC,
            Codec::Hevc => &props::HEVC,
            Codec::Av1 => &props::AV1,
        }
    }

    pub fn short_name(self) -> &'static str {
        match self {
            Codec::Avc => "h264",
            Codec::Hevc => "h265",
            Codec::Av1 => "av1",
        }
    }

    /// Encoder id used as the log prefix, e.g. `texture-amf-h264`
    pub fn label(self, fallback: bool) -> String {
        let kind = if fallback { "fallback" } else { "texture" };
        format!("{}-amf-{}", kind, self.short_name())
    }

    pub fn preset_value(self, preset: Preset) -> i64 {
        match self {
            Codec::Avc => match preset {
                Preset::Quality => 2,
                Preset::Speed => 1,
                Preset::HighQuality | Preset::Balanced => 0,
            },
            Codec::Hevc => match preset {
                Preset::Balanced => 5,
                Preset::Speed => 10,
                Preset::HighQuality | Preset::Quality => 0,
            },
            Codec::Av1 => match preset {
                Preset::HighQuality => 0,
                Preset::Quality => 30,
                Preset::Balanced => 70,
                Preset::Speed => 100,
            },
        }
    }

    pub fn rate_control_value(self, rc: RateControl) -> i64 {
        match (self, rc) {
            (_, RateControl::Cqp) => 0,
            (_, RateControl::Vbr) => 2,
            (_, RateControl::Qvbr) => 4,
            (_, RateControl::Hqvbr) => 5,
            (_, RateControl::Hqcbr) => 6,
            (Codec::Av1, RateControl::VbrLat) => 1,
            (Codec::Av1, RateControl::Cbr) => 3,
            (_, RateControl::Cbr) => 1,
            (_, RateControl::VbrLat) => 3,
        }
    }

    /// Profile written at creation; HEVC follows the surface bit depth
    pub fn profile_value(self, profile: Profile, format: SurfaceFormat) -> i64 {
        match self {
            Codec::Avc => match profile {
                Profile::Baseline => 66,
                Profile::Main => 77,
                Profile::High => 100,
                Profile::ConstrainedBaseline => 256,
                Profile::ConstrainedHigh => 257,
            },
            Codec::Hevc if format.is_10bit() => HEVC_PROFILE_MAIN_10,
            Codec::Hevc => HEVC_PROFILE_MAIN,
            Codec::Av1 => AV1_PROFILE_MAIN,
        }
    }

    /// Format the host should convert to before handing CPU frames over
    pub fn fallback_format(self, format: VideoFormat) -> VideoFormat {
        match format {
            VideoFormat::RGBA | VideoFormat::BGRA | VideoFormat::BGRX => VideoFormat::RGBA,
            VideoFormat::I010 | VideoFormat::P010 if self != Codec::Avc => VideoFormat::P010,
            _ => VideoFormat::NV12,
        }
    }

    pub fn supports_bframes(self) -> bool {
        self == Codec::Avc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_control_values() {
        use RateControl::*;
        let avc: Vec<i64> = [Cqp, Cbr, Vbr, VbrLat, Qvbr, Hqvbr, Hqcbr]
            .iter()
            .map(|rc| Codec::Avc.rate_control_value(*rc))
            .collect();
        assert_eq!(avc, vec![0, 1, 2, 3, 4, 5, 6]);
        assert_eq!(Codec::Hevc.rate_control_value(VbrLat), 3);

        let av1: Vec<i64> = [Cqp, VbrLat, Vbr, Cbr, Qvbr, Hqvbr, Hqcbr]
            .iter()
            .map(|rc| Codec::Av1.rate_control_value(*rc))
            .collect();
        assert_eq!(av1, vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_preset_values() {
        assert_eq!(Codec::Avc.preset_value(Preset::Quality), 2);
        assert_eq!(Codec::Avc.preset_value(Preset::Speed), 1);
        assert_eq!(Codec::Avc.preset_value(Preset::HighQuality), 0);
        assert_eq!(Codec::Hevc.preset_value(Preset::Balanced), 5);
        assert_eq!(Codec::Hevc.preset_value(Preset::Speed), 10);
        assert_eq!(Codec::Hevc.preset_value(Preset::HighQuality), 0);
        assert_eq!(Codec::Av1.preset_value(Preset::Balanced), 70);
    }

    #[test]
    fn test_profiles() {
        assert_eq!(Codec::Avc.profile_value(Profile::ConstrainedHigh, SurfaceFormat::Nv12), 257);
        assert_eq!(Codec::Hevc.profile_value(Profile::Baseline, SurfaceFormat::P010), 2);
        assert_eq!(Codec::Hevc.profile_value(Profile::High, SurfaceFormat::Nv12), 1);
        assert_eq!(Codec::Av1.profile_value(Profile::High, SurfaceFormat::P010), 1);
    }

    #[test]
    fn test_fallback_formats() {
        assert_eq!(Codec::Avc.fallback_format(VideoFormat::BGRX), VideoFormat::RGBA);
        assert_eq!(Codec::Avc.fallback_format(VideoFormat::P010), VideoFormat::NV12);
        assert_eq!(Codec::Hevc.fallback_format(VideoFormat::I010), VideoFormat::P010);
        assert_eq!(Codec::Av1.fallback_format(VideoFormat::I444), VideoFormat::NV12);
    }

    #[test]
    fn test_labels() {
        assert_eq!(Codec::Avc.label(false), "texture-amf-h264");
        assert_eq!(Codec::Hevc.label(true), "fallback-amf-h265");
        assert_eq!(Codec::Av1.component_id(), "AMFVideoEncoderHW_AV1");
    }
}
