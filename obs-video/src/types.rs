//! Frame description shared by the host and the encoders

use bytemuck::{Pod, Zeroable};
use std::fmt;

/// Host pixel formats, with the host's raw values
///
/// Only NV12, P010, I010 and the packed RGB formats reach an encoder; the
/// rest exist so raw values from the host round-trip unchanged.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoFormat {
    None = 0,
    I420 = 1,
    NV12 = 2,
    YVYU = 3,
    YUY2 = 4,
    UYVY = 5,
    RGBA = 6,
    BGRA = 7,
    BGRX = 8,
    Y800 = 9,
    I444 = 10,
    BGR3 = 11,
    I422 = 12,
    I40A = 13,
    I42A = 14,
    YUVA = 15,
    AYUV = 16,
    I010 = 17,
    P010 = 18,
    I210 = 19,
    I412 = 20,
    YA2L = 21,
    P216 = 22,
    P416 = 23,
    R10L = 24,
}

impl VideoFormat {
    /// Convert from the raw value used across the C boundary
    pub fn from_raw(raw: u32) -> Option<Self> {
        use VideoFormat::*;
        const ALL: [VideoFormat; 25] = [
            None, I420, NV12, YVYU, YUY2, UYVY, RGBA, BGRA, BGRX, Y800, I444, BGR3, I422, I40A,
            I42A, YUVA, AYUV, I010, P010, I210, I412, YA2L, P216, P416, R10L,
        ];
        ALL.get(raw as usize).copied()
    }

    /// 4:2:0 with 10 significant bits, the only deep formats encoders take
    pub fn is_ten_bit(self) -> bool {
        matches!(self, VideoFormat::I010 | VideoFormat::P010)
    }
}

/// Host colour space
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorSpace {
    #[default]
    Default = 0,
    CS601 = 1,
    CS709 = 2,
    SRGB = 3,
    CS2100PQ = 4,
    CS2100HLG = 5,
}

impl ColorSpace {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(ColorSpace::Default),
            1 => Some(ColorSpace::CS601),
            2 => Some(ColorSpace::CS709),
            3 => Some(ColorSpace::SRGB),
            4 => Some(ColorSpace::CS2100PQ),
            5 => Some(ColorSpace::CS2100HLG),
            _ => None,
        }
    }

    /// Rec. 2100 transfer functions need a 10-bit output
    pub fn is_hdr(self) -> bool {
        matches!(self, ColorSpace::CS2100PQ | ColorSpace::CS2100HLG)
    }
}

/// Host colour range; `Default` is treated as limited
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorRange {
    #[default]
    Default = 0,
    Partial = 1,
    Full = 2,
}

impl ColorRange {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(ColorRange::Default),
            1 => Some(ColorRange::Partial),
            2 => Some(ColorRange::Full),
            _ => None,
        }
    }
}

/// Exact frame rate as a rational. Never converted to floating point.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    pub fn is_valid(&self) -> bool {
        self.num != 0 && self.den != 0
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::new(30, 1)
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Video output info as handed over by the host
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct VideoOutputInfo {
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    pub format: u32,     // VideoFormat as u32
    pub colorspace: u32, // ColorSpace as u32
    pub range: u32,      // ColorRange as u32
}

impl VideoOutputInfo {
    pub fn frame_rate(&self) -> FrameRate {
        FrameRate::new(self.fps_num, self.fps_den)
    }

    pub fn video_format(&self) -> VideoFormat {
        VideoFormat::from_raw(self.format).unwrap_or(VideoFormat::None)
    }

    pub fn color_space(&self) -> ColorSpace {
        ColorSpace::from_raw(self.colorspace).unwrap_or_default()
    }

    pub fn color_range(&self) -> ColorRange {
        ColorRange::from_raw(self.range).unwrap_or_default()
    }
}

/// Borrowed CPU frame with explicit per-plane strides
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
    pub planes: [&'a [u8]; 4],
    pub linesize: [u32; 4],
    pub width: u32,
    pub height: u32,
}

impl<'a> RawFrame<'a> {
    /// Build a frame from up to four planes; missing planes stay empty.
    pub fn new(width: u32, height: u32, planes: &[(&'a [u8], u32)]) -> Self {
        let mut frame = RawFrame {
            planes: [&[]; 4],
            linesize: [0; 4],
            width,
            height,
        };
        for (i, (data, stride)) in planes.iter().take(4).enumerate() {
            frame.planes[i] = data;
            frame.linesize[i] = *stride;
        }
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_raw() {
        assert_eq!(VideoFormat::from_raw(2), Some(VideoFormat::NV12));
        assert_eq!(VideoFormat::from_raw(18), Some(VideoFormat::P010));
        assert_eq!(VideoFormat::from_raw(24), Some(VideoFormat::R10L));
        assert_eq!(VideoFormat::from_raw(99), None);
    }

    #[test]
    fn test_hdr_colorspaces() {
        assert!(ColorSpace::CS2100PQ.is_hdr());
        assert!(ColorSpace::CS2100HLG.is_hdr());
        assert!(!ColorSpace::SRGB.is_hdr());
        assert!(VideoFormat::P010.is_ten_bit());
        assert!(VideoFormat::I010.is_ten_bit());
        assert!(!VideoFormat::I210.is_ten_bit());
    }

    #[test]
    fn test_raw_frame_planes() {
        let y = [0u8; 16];
        let uv = [0u8; 8];
        let frame = RawFrame::new(4, 4, &[(&y, 4), (&uv, 4)]);
        assert_eq!(frame.planes[0].len(), 16);
        assert_eq!(frame.planes[1].len(), 8);
        assert!(frame.planes[2].is_empty());
        assert_eq!(frame.linesize, [4, 4, 0, 0]);
    }
}
