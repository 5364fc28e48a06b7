//! User facing encoder settings
//!
//! Names are parsed case-insensitively; the defaults mirror what the host
//! shows in a fresh settings page.

use crate::backend::Variant;
use crate::codec::Codec;
use obs_video::FrameRate;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{name}'")]
pub struct UnknownName {
    pub kind: &'static str,
    pub name: String,
}

/// Rate control method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RateControl {
    Cqp,
    VbrLat,
    Vbr,
    #[default]
    Cbr,
    Qvbr,
    Hqvbr,
    Hqcbr,
}

impl RateControl {
    pub fn name(self) -> &'static str {
        match self {
            RateControl::Cqp => "CQP",
            RateControl::VbrLat => "VBR_LAT",
            RateControl::Vbr => "VBR",
            RateControl::Cbr => "CBR",
            RateControl::Qvbr => "QVBR",
            RateControl::Hqvbr => "HQVBR",
            RateControl::Hqcbr => "HQCBR",
        }
    }

    /// CQP and QVBR are driven by a quality level rather than a bitrate
    pub fn uses_qp(self) -> bool {
        matches!(self, RateControl::Cqp | RateControl::Qvbr)
    }
}

impl FromStr for RateControl {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const ALL: [RateControl; 7] = [
            RateControl::Cqp,
            RateControl::VbrLat,
            RateControl::Vbr,
            RateControl::Cbr,
            RateControl::Qvbr,
            RateControl::Hqvbr,
            RateControl::Hqcbr,
        ];
        ALL.into_iter()
            .find(|rc| rc.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownName {
                kind: "rate control",
                name: s.to_owned(),
            })
    }
}

impl fmt::Display for RateControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Quality preset, ordered from slowest to fastest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Preset {
    HighQuality,
    #[default]
    Quality,
    Balanced,
    Speed,
}

impl Preset {
    pub fn name(self) -> &'static str {
        match self {
            Preset::HighQuality => "highQuality",
            Preset::Quality => "quality",
            Preset::Balanced => "balanced",
            Preset::Speed => "speed",
        }
    }

    /// Next faster preset, if any
    pub fn faster(self) -> Option<Preset> {
        match self {
            Preset::HighQuality => Some(Preset::Quality),
            Preset::Quality => Some(Preset::Balanced),
            Preset::Balanced => Some(Preset::Speed),
            Preset::Speed => None,
        }
    }
}

impl FromStr for Preset {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Preset::HighQuality, Preset::Quality, Preset::Balanced, Preset::Speed]
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownName {
                kind: "preset",
                name: s.to_owned(),
            })
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Requested profile. Only AVC honors the choice; HEVC follows the bit
/// depth and AV1 is always main.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Profile {
    Baseline,
    Main,
    #[default]
    High,
    ConstrainedBaseline,
    ConstrainedHigh,
}

impl Profile {
    pub fn name(self) -> &'static str {
        match self {
            Profile::Baseline => "baseline",
            Profile::Main => "main",
            Profile::High => "high",
            Profile::ConstrainedBaseline => "constrained_baseline",
            Profile::ConstrainedHigh => "constrained_high",
        }
    }
}

impl FromStr for Profile {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Profile::Baseline,
            Profile::Main,
            Profile::High,
            Profile::ConstrainedBaseline,
            Profile::ConstrainedHigh,
        ]
        .into_iter()
        .find(|p| p.name().eq_ignore_ascii_case(s))
        .ok_or_else(|| UnknownName {
            kind: "profile",
            name: s.to_owned(),
        })
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub const MAX_BFRAMES: u32 = 5;
pub const DEFAULT_GOP: i64 = 250;

/// Settings the host passes at creation and, partially, on update
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderSettings {
    /// Target bitrate in kbps
    pub bitrate: i64,
    pub cqp: i64,
    pub rate_control: RateControl,
    pub preset: Preset,
    pub profile: Profile,
    /// Keyframe interval in seconds, 0 for the encoder default
    pub keyint_sec: u32,
    pub bframes: u32,
    pub repeat_headers: bool,
    /// Free-form `name=value` pairs applied verbatim
    pub options: String,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            bitrate: 2500,
            cqp: 20,
            rate_control: RateControl::Cbr,
            preset: Preset::Quality,
            profile: Profile::High,
            keyint_sec: 0,
            bframes: 0,
            repeat_headers: false,
            options: String::new(),
        }
    }
}

impl EncoderSettings {
    /// GOP length in frames
    pub fn gop_size(&self, frame_rate: FrameRate) -> i64 {
        if self.keyint_sec == 0 || frame_rate.den == 0 {
            return DEFAULT_GOP;
        }
        self.keyint_sec as i64 * frame_rate.num as i64 / frame_rate.den as i64
    }

    pub fn clamped_bframes(&self) -> u32 {
        self.bframes.min(MAX_BFRAMES)
    }

    /// Render the block logged once the encoder is configured
    pub fn summary(&self, codec: Codec, report: &SettingsReport) -> String {
        let params = if self.options.trim().is_empty() {
            "(none)"
        } else {
            self.options.as_str()
        };

        let mut out = String::from("settings:\n");
        out.push_str(&format!("\trate_control: {}\n", self.rate_control));
        out.push_str(&format!("\tbitrate:      {}\n", self.bitrate));
        out.push_str(&format!("\tcqp:          {}\n", self.cqp));
        out.push_str(&format!("\tkeyint:       {}\n", report.gop_size));
        out.push_str(&format!("\tpreset:       {}\n", report.preset));
        out.push_str(&format!("\tprofile:      {}\n", self.profile));
        if codec == Codec::Avc {
            out.push_str(&format!("\tb-frames:     {}\n", report.bframes));
        }
        out.push_str(&format!("\twidth:        {}\n", report.width));
        out.push_str(&format!("\theight:       {}\n", report.height));
        out.push_str(&format!("\tparams:       {}", params));
        out
    }
}

/// Values that are only known after negotiation with the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingsReport {
    pub preset: Preset,
    pub gop_size: i64,
    pub bframes: u32,
    pub width: u32,
    pub height: u32,
}

/// One `name=value` pair from the free-form options string
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderOption {
    pub name: String,
    pub value: Variant,
}

/// Split whitespace separated `name=value` pairs
///
/// Values become bool, integer or float when they parse as one, otherwise
/// they are passed on as strings. Tokens without `=` are skipped.
pub fn parse_options(options: &str) -> Vec<EncoderOption> {
    options
        .split_whitespace()
        .filter_map(|token| {
            let Some((name, value)) = token.split_once('=') else {
                log::warn!("ignoring option '{}': expected name=value", token);
                return None;
            };
            if name.is_empty() {
                log::warn!("ignoring option '{}': empty name", token);
                return None;
            }
            Some(EncoderOption {
                name: name.to_owned(),
                value: parse_option_value(value),
            })
        })
        .collect()
}

fn parse_option_value(value: &str) -> Variant {
    if value.eq_ignore_ascii_case("true") {
        Variant::Bool(true)
    } else if value.eq_ignore_ascii_case("false") {
        Variant::Bool(false)
    } else if let Ok(int) = value.parse::<i64>() {
        Variant::Int(int)
    } else if let Ok(float) = value.parse::<f64>() {
        Variant::Double(float)
    } else {
        Variant::Str(value.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = EncoderSettings::default();
        assert_eq!(s.bitrate, 2500);
        assert_eq!(s.cqp, 20);
        assert_eq!(s.rate_control, RateControl::Cbr);
        assert_eq!(s.preset, Preset::Quality);
        assert_eq!(s.profile, Profile::High);
    }

    #[test]
    fn test_names_are_case_insensitive() {
        assert_eq!("cqp".parse(), Ok(RateControl::Cqp));
        assert_eq!("Vbr_Lat".parse(), Ok(RateControl::VbrLat));
        assert_eq!("HQCBR".parse(), Ok(RateControl::Hqcbr));
        assert_eq!("HIGHQUALITY".parse(), Ok(Preset::HighQuality));
        assert_eq!("Constrained_High".parse(), Ok(Profile::ConstrainedHigh));
        assert!("abr".parse::<RateControl>().is_err());
    }

    #[test]
    fn test_gop_size() {
        let mut s = EncoderSettings::default();
        assert_eq!(s.gop_size(FrameRate::new(60, 1)), 250);

        s.keyint_sec = 2;
        assert_eq!(s.gop_size(FrameRate::new(60, 1)), 120);
        assert_eq!(s.gop_size(FrameRate::new(30000, 1001)), 59);
    }

    #[test]
    fn test_parse_options() {
        let opts = parse_options("  EnableVBAQ=false QPI=22 Ratio=1.5 Mode=fast junk ");
        assert_eq!(
            opts,
            vec![
                EncoderOption { name: "EnableVBAQ".into(), value: Variant::Bool(false) },
                EncoderOption { name: "QPI".into(), value: Variant::Int(22) },
                EncoderOption { name: "Ratio".into(), value: Variant::Double(1.5) },
                EncoderOption { name: "Mode".into(), value: Variant::Str("fast".into()) },
            ]
        );
        assert!(parse_options("").is_empty());
    }

    #[test]
    fn test_summary_block() {
        let s = EncoderSettings::default();
        let report = SettingsReport {
            preset: Preset::Balanced,
            gop_size: 250,
            bframes: 2,
            width: 1920,
            height: 1080,
        };

        let avc = s.summary(Codec::Avc, &report);
        assert!(avc.starts_with("settings:\n\trate_control: CBR\n"));
        assert!(avc.contains("\tpreset:       balanced\n"));
        assert!(avc.contains("\tb-frames:     2\n"));
        assert!(avc.ends_with("\tparams:       (none)"));

        let hevc = s.summary(Codec::Hevc, &report);
        assert!(!hevc.contains("b-frames"));
    }
}
