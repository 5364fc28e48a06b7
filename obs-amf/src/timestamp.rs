//! Conversion between caller timestamps and the encoder's 100 ns clock
//!
//! Caller timestamps count frames in units of `1 / fps_den` seconds
//! scaled by `fps_num`, so only the denominator takes part.

/// Encoder ticks per second
pub const AMF_SECOND: i64 = 10_000_000;

/// Caller timestamp to encoder ticks, rounding toward negative infinity
pub fn to_encoder(ts: i64, fps_den: u32) -> i64 {
    let den = fps_den.max(1) as i128;
    (ts as i128 * AMF_SECOND as i128).div_euclid(den) as i64
}

/// Encoder ticks back to a caller timestamp, rounding up
///
/// Paired with [`to_encoder`] this is exact for every caller timestamp as
/// long as `fps_den` does not exceed [`AMF_SECOND`].
pub fn to_caller(ts: i64, fps_den: u32) -> i64 {
    let num = ts as i128 * fps_den.max(1) as i128;
    let second = AMF_SECOND as i128;
    let q = num.div_euclid(second);
    if num.rem_euclid(second) == 0 {
        q as i64
    } else {
        (q + 1) as i64
    }
}
