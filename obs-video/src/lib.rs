//! OBS Video - frame description and encoder input pooling
//!
//! Shared by the hardware encoder crates:
//! - Frame format, colour and exact frame rate types
//! - Surface pool recycling encoder input resources across frames
//! - Plane packing for CPU upload buffers

pub mod plane_copy;
pub mod surface_pool;
pub mod types;

pub use plane_copy::*;
pub use surface_pool::*;
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_info_defaults() {
        let info = VideoOutputInfo {
            width: 1280,
            height: 720,
            fps_num: 0,
            fps_den: 0,
            format: 99,
            colorspace: 42,
            range: 7,
        };
        assert_eq!(info.video_format(), VideoFormat::None);
        assert_eq!(info.color_space(), ColorSpace::Default);
        assert_eq!(info.color_range(), ColorRange::Default);
        assert!(!info.frame_rate().is_valid());
    }
}
