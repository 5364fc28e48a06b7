//! Compressed packets handed back to the caller

use crate::codec::Codec;

/// Drop priority of a packet, lowest first
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    Disposable = 0,
    Low = 1,
    High = 2,
    Highest = 3,
}

/// Map the encoder's output type tag to a priority and keyframe flag
///
/// AVC/HEVC tags are IDR, I, P, B. AV1 tags are KEY, INTRA_ONLY, INTER,
/// SWITCH, SHOW_EXISTING. Tags outside those ranges are disposable.
pub fn classify(codec: Codec, tag: i64) -> (Priority, bool) {
    let priority = match (codec, tag) {
        (_, 0) => Priority::Highest,
        (_, 1) => Priority::High,
        (_, 2) => Priority::Low,
        (_, 3) => Priority::Disposable,
        (Codec::Av1, 4) => Priority::Disposable,
        _ => Priority::Disposable,
    };
    (priority, tag == 0)
}

/// One unit of compressed video
///
/// `data` borrows from the encoder output and stays valid until the next
/// encode call on the same encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedPacket<'a> {
    pub data: &'a [u8],
    pub pts: i64,
    pub dts: i64,
    pub priority: Priority,
    pub keyframe: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_avc_hevc_table() {
        for codec in [Codec::Avc, Codec::Hevc] {
            assert_eq!(classify(codec, 0), (Priority::Highest, true));
            assert_eq!(classify(codec, 1), (Priority::High, false));
            assert_eq!(classify(codec, 2), (Priority::Low, false));
            assert_eq!(classify(codec, 3), (Priority::Disposable, false));
        }
    }

    #[test]
    fn test_av1_table() {
        assert_eq!(classify(Codec::Av1, 0), (Priority::Highest, true));
        assert_eq!(classify(Codec::Av1, 1), (Priority::High, false));
        assert_eq!(classify(Codec::Av1, 2), (Priority::Low, false));
        assert_eq!(classify(Codec::Av1, 3), (Priority::Disposable, false));
        assert_eq!(classify(Codec::Av1, 4), (Priority::Disposable, false));
    }

    #[test]
    fn test_unknown_tags() {
        assert_eq!(classify(Codec::Avc, 4), (Priority::Disposable, false));
        assert_eq!(classify(Codec::Av1, -1), (Priority::Disposable, false));
        assert_eq!(classify(Codec::Hevc, 99), (Priority::Disposable, false));
    }

    #[test]
    fn test_priority_order() {
        assert!(Priority::Highest > Priority::High);
        assert!(Priority::Low > Priority::Disposable);
    }
}
