//! Colour tags and HDR mastering metadata

use bytemuck::{Pod, Zeroable};
use obs_video::{ColorRange, ColorSpace};

pub const COLOR_BIT_DEPTH_8: i64 = 8;
pub const COLOR_BIT_DEPTH_10: i64 = 10;

const TRANSFER_SMPTE2084: i64 = 16;
const TRANSFER_ARIB_STD_B67: i64 = 18;

/// Peak luminance assumed for HLG content, in nits
pub const HLG_PEAK_LEVEL: u32 = 1000;

/// Colour description written to the encoder's output VUI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorTags {
    pub profile: i64,
    pub primaries: i64,
    pub transfer: i64,
    pub full_range: bool,
}

impl ColorTags {
    pub fn new(space: ColorSpace, range: ColorRange) -> Self {
        let full_range = range == ColorRange::Full;
        // converter colour profiles: 601, 709, 2020, then the FULL_ variants
        let (profile, primaries, transfer) = match space {
            ColorSpace::CS601 => (0, 6, 6),
            ColorSpace::Default | ColorSpace::CS709 => (1, 1, 1),
            ColorSpace::SRGB => (1, 1, 13),
            ColorSpace::CS2100HLG => (2, 9, TRANSFER_ARIB_STD_B67),
            ColorSpace::CS2100PQ => (2, 9, TRANSFER_SMPTE2084),
        };

        ColorTags {
            profile: if full_range { profile + 3 } else { profile },
            primaries,
            transfer,
            full_range,
        }
    }

    pub fn is_pq(&self) -> bool {
        self.transfer == TRANSFER_SMPTE2084
    }

    pub fn is_hlg(&self) -> bool {
        self.transfer == TRANSFER_ARIB_STD_B67
    }

    pub fn is_hdr(&self) -> bool {
        self.is_pq() || self.is_hlg()
    }

    /// Mastering metadata for HDR output, `None` for SDR
    pub fn hdr_metadata(&self, nominal_peak: u32) -> Option<HdrMetadata> {
        if self.is_pq() {
            Some(HdrMetadata::bt2020(nominal_peak))
        } else if self.is_hlg() {
            Some(HdrMetadata::bt2020(HLG_PEAK_LEVEL))
        } else {
            None
        }
    }
}

/// Layout of `AMFHDRMetadata`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct HdrMetadata {
    pub red_primary: [u16; 2],
    pub green_primary: [u16; 2],
    pub blue_primary: [u16; 2],
    pub white_point: [u16; 2],
    pub max_mastering_luminance: u32,
    pub min_mastering_luminance: u32,
    pub max_content_light_level: u16,
    pub max_frame_average_light_level: u16,
}

const fn primary(num: u32, den: u32) -> u16 {
    (num * 50000 / den) as u16
}

const LUMINANCE_SCALE: u32 = 10000;

impl HdrMetadata {
    /// BT.2020 primaries with a D65 white point
    pub fn bt2020(peak: u32) -> Self {
        HdrMetadata {
            red_primary: [primary(17, 25), primary(8, 25)],
            green_primary: [primary(53, 200), primary(69, 100)],
            blue_primary: [primary(3, 20), primary(3, 50)],
            white_point: [primary(3127, 10000), primary(329, 1000)],
            max_mastering_luminance: peak * LUMINANCE_SCALE,
            min_mastering_luminance: 0,
            max_content_light_level: peak as u16,
            max_frame_average_light_level: peak as u16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_table() {
        let t = ColorTags::new(ColorSpace::CS601, ColorRange::Partial);
        assert_eq!((t.profile, t.primaries, t.transfer), (0, 6, 6));

        let t = ColorTags::new(ColorSpace::Default, ColorRange::Full);
        assert_eq!((t.profile, t.primaries, t.transfer), (4, 1, 1));
        assert!(t.full_range);

        let t = ColorTags::new(ColorSpace::SRGB, ColorRange::Partial);
        assert_eq!((t.profile, t.primaries, t.transfer), (1, 1, 13));

        let t = ColorTags::new(ColorSpace::CS2100HLG, ColorRange::Full);
        assert_eq!((t.profile, t.primaries, t.transfer), (5, 9, 18));
        assert!(t.is_hlg() && t.is_hdr());

        let t = ColorTags::new(ColorSpace::CS2100PQ, ColorRange::Partial);
        assert_eq!((t.profile, t.primaries, t.transfer), (2, 9, 16));
        assert!(t.is_pq());
    }

    #[test]
    fn test_hdr_metadata_layout() {
        assert_eq!(std::mem::size_of::<HdrMetadata>(), 28);

        let md = HdrMetadata::bt2020(1000);
        assert_eq!(md.red_primary, [34000, 16000]);
        assert_eq!(md.green_primary, [13250, 34500]);
        assert_eq!(md.blue_primary, [7500, 3000]);
        assert_eq!(md.white_point, [15635, 16450]);
        assert_eq!(md.max_mastering_luminance, 10_000_000);
        assert_eq!(md.max_content_light_level, 1000);

        let bytes = bytemuck::bytes_of(&md);
        assert_eq!(&bytes[..2], &34000u16.to_ne_bytes());
    }

    #[test]
    fn test_hdr_peaks() {
        let pq = ColorTags::new(ColorSpace::CS2100PQ, ColorRange::Partial);
        assert_eq!(pq.hdr_metadata(400).map(|m| m.max_frame_average_light_level), Some(400));

        let hlg = ColorTags::new(ColorSpace::CS2100HLG, ColorRange::Partial);
        assert_eq!(hlg.hdr_metadata(400).map(|m| m.max_content_light_level), Some(1000));

        let sdr = ColorTags::new(ColorSpace::CS709, ColorRange::Partial);
        assert_eq!(sdr.hdr_metadata(400), None);
    }
}
