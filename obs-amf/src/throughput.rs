//! Preset downgrade when the device cannot keep up with the stream

use crate::settings::Preset;
use obs_video::FrameRate;

const MACROBLOCK_SIZE: i64 = 16;

/// Macroblocks per second the stream needs
pub fn required_throughput(width: u32, height: u32, frame_rate: FrameRate) -> i64 {
    let mb_cx = (width as i64 + MACROBLOCK_SIZE - 1) / MACROBLOCK_SIZE;
    let mb_cy = (height as i64 + MACROBLOCK_SIZE - 1) / MACROBLOCK_SIZE;
    if frame_rate.den == 0 {
        return 0;
    }
    mb_cx * mb_cy * frame_rate.num as i64 / frame_rate.den as i64
}

/// Walk the preset ladder until the advertised throughput fits
///
/// `max` is the device maximum read before any preset was applied. `apply`
/// writes a preset; when its second argument is true it also re-reads the
/// maximum, which depends on the active preset, and returns it (`None`
/// keeps the previous value).
///
/// A zero maximum means the device does not report one: the two slow
/// presets still step down once, blindly, while balanced is kept.
pub fn negotiate_preset<F>(requested: Preset, required: i64, mut max: i64, mut apply: F) -> Preset
where
    F: FnMut(Preset, bool) -> Option<i64>,
{
    let mut preset = requested;

    for slow in [Preset::HighQuality, Preset::Quality] {
        if preset != slow {
            continue;
        }
        let Some(next) = slow.faster() else { break };

        if max == 0 {
            preset = next;
            apply(preset, false);
        } else if max < required {
            preset = next;
            if let Some(updated) = apply(preset, true) {
                max = updated;
            }
        }
    }

    if preset == Preset::Balanced && max != 0 && max < required {
        preset = Preset::Speed;
        apply(preset, true);
    }

    if preset != requested {
        log::info!(
            "preset '{}' exceeds device throughput ({} < {}), using '{}'",
            requested,
            max,
            required,
            preset
        );
    }

    preset
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn table() -> HashMap<Preset, i64> {
        HashMap::from([
            (Preset::HighQuality, 0),
            (Preset::Quality, 5000),
            (Preset::Balanced, 9999),
            (Preset::Speed, 999_999),
        ])
    }

    fn run(requested: Preset, required: i64, initial: i64) -> (Preset, Vec<(Preset, bool)>) {
        let caps = table();
        let mut calls = Vec::new();
        let chosen = negotiate_preset(requested, required, initial, |p, requery| {
            calls.push((p, requery));
            requery.then(|| caps[&p])
        });
        (chosen, calls)
    }

    #[test]
    fn test_required_throughput() {
        assert_eq!(required_throughput(1920, 1080, FrameRate::new(60, 1)), 120 * 68 * 60);
        assert_eq!(required_throughput(1, 1, FrameRate::new(30000, 1001)), 29);
        assert_eq!(required_throughput(1920, 1080, FrameRate::new(60, 0)), 0);
    }

    #[test]
    fn test_table_example_lands_on_balanced() {
        let (chosen, calls) = run(Preset::HighQuality, 7000, 0);
        assert_eq!(chosen, Preset::Balanced);
        assert_eq!(calls, vec![(Preset::Quality, false), (Preset::Balanced, false)]);
    }

    #[test]
    fn test_requery_after_each_step() {
        let (chosen, calls) = run(Preset::Quality, 7000, 5000);
        assert_eq!(chosen, Preset::Balanced);
        assert_eq!(calls, vec![(Preset::Balanced, true)]);

        let (chosen, _) = run(Preset::Quality, 20_000, 5000);
        assert_eq!(chosen, Preset::Speed);
    }

    #[test]
    fn test_fast_enough_keeps_preset() {
        let (chosen, calls) = run(Preset::Quality, 4000, 5000);
        assert_eq!(chosen, Preset::Quality);
        assert!(calls.is_empty());
    }

    #[test]
    fn test_balanced_without_reported_max() {
        let (chosen, calls) = run(Preset::Balanced, 1_000_000, 0);
        assert_eq!(chosen, Preset::Balanced);
        assert!(calls.is_empty());
    }

    #[test]
    fn test_speed_is_never_changed() {
        let (chosen, calls) = run(Preset::Speed, i64::MAX, 1);
        assert_eq!(chosen, Preset::Speed);
        assert!(calls.is_empty());
    }
}
